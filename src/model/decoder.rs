use crate::error::{NabuError, Result};
use crate::io::config::{ConfigFile, Section};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use tracing::debug;

/// The available decoder implementations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DecoderKind {
    /// Attention-based character speller
    Speller,
    DnnDecoder,
}

impl DecoderKind {
    pub const ALL: [DecoderKind; 2] = [DecoderKind::Speller, DecoderKind::DnnDecoder];

    #[must_use]
    pub fn tag(&self) -> &'static str {
        match self {
            DecoderKind::Speller => "speller",
            DecoderKind::DnnDecoder => "dnn_decoder",
        }
    }
}

impl fmt::Display for DecoderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// Select the decoder implementation for a configuration tag
pub fn factory(decoder: &str) -> Result<DecoderKind> {
    DecoderKind::ALL
        .into_iter()
        .find(|kind| kind.tag() == decoder)
        .ok_or_else(|| NabuError::UndefinedComponent(format!("undefined decoder type: {decoder}")))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SpellerParams {
    pub speller_units: usize,
    pub speller_layers: usize,
    pub dropout: f64,
    /// Probability of feeding back a sampled output instead of the label
    pub sample_prob: f64,
    pub output_dims: Option<usize>,
}

impl SpellerParams {
    fn from_section(section: &Section) -> Result<Self> {
        let dropout = if section.contains("dropout") {
            section.get_float("dropout")?
        } else {
            1.0
        };
        let sample_prob = if section.contains("sample_prob") {
            section.get_float("sample_prob")?
        } else {
            0.0
        };
        Ok(Self {
            speller_units: section.get_usize("speller_units")?,
            speller_layers: section.get_usize("speller_layers")?,
            dropout,
            sample_prob,
            output_dims: section.get_optional_usize("output_dims")?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DecoderParams {
    Speller(SpellerParams),
    Other { settings: BTreeMap<String, String> },
}

/// A resolved decoder
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DecoderConfig {
    pub section: String,
    pub kind: DecoderKind,
    pub params: DecoderParams,
}

impl DecoderConfig {
    pub fn resolve(config: &ConfigFile, section: &str) -> Result<Self> {
        let conf = config.section(section)?;
        let kind = factory(conf.get_str("decoder")?.trim())?;
        debug!(section, %kind, "resolving decoder");

        let params = match kind {
            DecoderKind::Speller => DecoderParams::Speller(SpellerParams::from_section(conf)?),
            DecoderKind::DnnDecoder => DecoderParams::Other {
                settings: conf
                    .iter()
                    .filter(|(key, _)| *key != "decoder")
                    .map(|(key, value)| (key.to_string(), value.to_string()))
                    .collect(),
            },
        };

        Ok(Self {
            section: section.to_string(),
            kind,
            params,
        })
    }
}
