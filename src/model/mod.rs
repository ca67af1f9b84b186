use crate::error::{NabuError, Result};
use crate::io::config::ConfigFile;
use serde::Serialize;
use std::path::Path;
use tracing::debug;

pub mod decoder;
pub mod encoder;
pub mod hotstart;
pub mod schema;
pub mod variables;

pub use decoder::{DecoderConfig, DecoderKind, DecoderParams, SpellerParams};
pub use encoder::{EncoderKind, EncoderNode, EncoderParams, HotstartParams};
pub use hotstart::{HotStart, RestoreReport, restore_all};
pub use variables::{Variable, VariableStore};

/// Section holding the model's input and output names
pub const IO_SECTION: &str = "io";
/// Section of the root encoder
pub const ENCODER_SECTION: &str = "encoder";
/// Section of the decoder
pub const DECODER_SECTION: &str = "decoder";

/// A fully resolved model configuration
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelConfig {
    /// Names of the model inputs, e.g. `features`
    pub inputs: Vec<String>,
    /// Names of the model outputs, e.g. `text`
    pub outputs: Vec<String>,
    pub encoder: EncoderNode,
    pub decoder: DecoderConfig,
}

impl ModelConfig {
    /// Validate and resolve a parsed model configuration
    pub fn from_config(config: &ConfigFile) -> Result<Self> {
        let violations = schema::check(config);
        if !violations.is_empty() {
            return Err(NabuError::Schema(violations));
        }

        let io = config.section(IO_SECTION)?;
        let inputs = io.get_list("inputs")?;
        let outputs = io.get_list("outputs")?;

        let encoder = EncoderNode::resolve(config, ENCODER_SECTION)?;
        let decoder = DecoderConfig::resolve(config, DECODER_SECTION)?;
        debug!(
            inputs = inputs.len(),
            outputs = outputs.len(),
            encoders = encoder.nodes().len(),
            "resolved model configuration"
        );

        Ok(Self {
            inputs,
            outputs,
            encoder,
            decoder,
        })
    }

    pub fn parse(text: &str) -> Result<Self> {
        Self::from_config(&ConfigFile::parse(text)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_config(&ConfigFile::load(path)?)
    }

    /// Configuration sections not reachable from `io`, `encoder` or `decoder`
    pub fn unused_sections<'a>(&self, config: &'a ConfigFile) -> Vec<&'a str> {
        let used: Vec<&str> = self
            .encoder
            .nodes()
            .iter()
            .map(|node| node.section.as_str())
            .chain([IO_SECTION, self.decoder.section.as_str()])
            .collect();
        config
            .section_names()
            .filter(|name| !used.contains(name))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = "\
[io]
inputs = features
outputs = text

[encoder]
encoder = listener
listener_units = 64
listener_layers = 2
pyramid_steps = 1

[decoder]
decoder = speller
speller_units = 64
speller_layers = 1

[orphan]
encoder = dnn
";

    #[test]
    fn test_minimal_model() {
        let model = ModelConfig::parse(MINIMAL).unwrap();
        assert_eq!(model.inputs, vec!["features"]);
        assert_eq!(model.outputs, vec!["text"]);
        assert_eq!(model.encoder.kind, EncoderKind::Listener);
        assert_eq!(model.decoder.kind, DecoderKind::Speller);
    }

    #[test]
    fn test_schema_violations_reported_together() {
        let text = MINIMAL
            .replace("listener_units = 64", "listener_units = 0")
            .replace("speller_layers = 1", "speller_layers = -1");
        match ModelConfig::parse(&text).unwrap_err() {
            NabuError::Schema(violations) => assert_eq!(violations.len(), 2),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_unused_sections() {
        let config = ConfigFile::parse(MINIMAL).unwrap();
        let model = ModelConfig::from_config(&config).unwrap();
        assert_eq!(model.unused_sections(&config), vec!["orphan"]);
    }

    #[test]
    fn test_missing_io_section() {
        let text = MINIMAL.replace("[io]", "[inout]");
        assert!(matches!(
            ModelConfig::parse(&text),
            Err(NabuError::MissingSection(name)) if name == "io"
        ));
    }
}
