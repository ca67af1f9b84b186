//! Encoder factory and composition
//!
//! The `[encoder]` section of a model file names an encoder type. Composite
//! types refer to further sections: a `stack_encoder` lists the encoders it
//! applies in order, and a `hotstart_encoder` wraps one encoder whose
//! variables are restored from a checkpoint. Resolution turns these
//! references into a tree of [`EncoderNode`]s.

use crate::error::{NabuError, Result};
use crate::io::config::{ConfigFile, Section};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use tracing::debug;

/// Scope of the root encoder's variables
pub const ENCODER_SCOPE: &str = "encoder";

/// The available encoder implementations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EncoderKind {
    /// Pyramidal BLSTM listener
    Listener,
    /// Listener variant with a different pyramid merge
    ListenerPs,
    /// Passes its inputs through
    DummyEncoder,
    Dblstm,
    Dnn,
    BottleneckEncoder,
    /// BLSTM layers followed by DNN layers
    Bldnn,
    /// Wraps an encoder restored from a checkpoint
    HotstartEncoder,
    /// Applies several encoders in sequence
    StackEncoder,
}

impl EncoderKind {
    pub const ALL: [EncoderKind; 9] = [
        EncoderKind::Listener,
        EncoderKind::ListenerPs,
        EncoderKind::DummyEncoder,
        EncoderKind::Dblstm,
        EncoderKind::Dnn,
        EncoderKind::BottleneckEncoder,
        EncoderKind::Bldnn,
        EncoderKind::HotstartEncoder,
        EncoderKind::StackEncoder,
    ];

    /// The tag used in configuration files
    #[must_use]
    pub fn tag(&self) -> &'static str {
        match self {
            EncoderKind::Listener => "listener",
            EncoderKind::ListenerPs => "listener_ps",
            EncoderKind::DummyEncoder => "dummy_encoder",
            EncoderKind::Dblstm => "dblstm",
            EncoderKind::Dnn => "dnn",
            EncoderKind::BottleneckEncoder => "bottleneck_encoder",
            EncoderKind::Bldnn => "bldnn",
            EncoderKind::HotstartEncoder => "hotstart_encoder",
            EncoderKind::StackEncoder => "stack_encoder",
        }
    }
}

impl fmt::Display for EncoderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// Select the encoder implementation for a configuration tag
pub fn factory(encoder: &str) -> Result<EncoderKind> {
    EncoderKind::ALL
        .into_iter()
        .find(|kind| kind.tag() == encoder)
        .ok_or_else(|| NabuError::UndefinedComponent(format!("undefined encoder type: {encoder}")))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ListenerParams {
    pub listener_units: usize,
    pub listener_layers: usize,
    /// Number of pyramidal layers, each halving the sequence length
    pub pyramid_steps: u32,
    pub dropout: f64,
}

impl ListenerParams {
    fn from_section(section: &Section) -> Result<Self> {
        Ok(Self {
            listener_units: section.get_usize("listener_units")?,
            listener_layers: section.get_usize("listener_layers")?,
            pyramid_steps: get_u32(section, "pyramid_steps")?,
            dropout: float_or(section, "dropout", 1.0)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BldnnParams {
    pub blstm_units: usize,
    pub blstm_layers: usize,
    pub dnn_units: usize,
    pub dnn_layers: usize,
    /// Frames of context on each side of the current frame
    pub context: usize,
    pub output_dims: Option<usize>,
    pub dropout: f64,
    pub layer_norm: bool,
}

impl BldnnParams {
    fn from_section(section: &Section) -> Result<Self> {
        Ok(Self {
            blstm_units: section.get_usize("blstm_units")?,
            blstm_layers: section.get_usize("blstm_layers")?,
            dnn_units: section.get_usize("dnn_units")?,
            dnn_layers: section.get_usize("dnn_layers")?,
            context: usize_or(section, "context", 0)?,
            output_dims: section.get_optional_usize("output_dims")?,
            dropout: float_or(section, "dropout", 1.0)?,
            layer_norm: section.get_bool_or("layer_norm", false)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HotstartParams {
    /// The encoder whose variables are restored
    pub wrapped: Box<EncoderNode>,
    /// Directory holding the pretrained model's checkpoint
    pub modeldir: PathBuf,
    /// Whether the restored variables may be updated during training
    pub trainable: bool,
    /// Scope of the wrapped encoder's variables inside the checkpoint
    pub scope: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EncoderParams {
    Stack { encoders: Vec<EncoderNode> },
    Hotstart(HotstartParams),
    Listener(ListenerParams),
    Bldnn(BldnnParams),
    /// Settings of encoders without a typed view, already schema-checked
    Other { settings: BTreeMap<String, String> },
}

/// A resolved encoder
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EncoderNode {
    /// Section the encoder was read from
    pub section: String,
    /// Variable scope of the encoder within the model
    pub scope: String,
    pub kind: EncoderKind,
    pub params: EncoderParams,
}

impl EncoderNode {
    /// Resolve the encoder configured in `section`, placing it at the root scope
    pub fn resolve(config: &ConfigFile, section: &str) -> Result<Self> {
        let mut chain = Vec::new();
        Self::resolve_at(config, section, ENCODER_SCOPE.to_string(), &mut chain)
    }

    fn resolve_at(
        config: &ConfigFile,
        name: &str,
        scope: String,
        chain: &mut Vec<String>,
    ) -> Result<Self> {
        if chain.iter().any(|visited| visited == name) {
            let mut cycle = chain.clone();
            cycle.push(name.to_string());
            return Err(NabuError::CyclicReference(cycle));
        }
        let section = config.section(name)?;
        let kind = factory(section.get_str("encoder")?.trim())?;
        debug!(section = name, %kind, %scope, "resolving encoder");

        chain.push(name.to_string());
        let params = match kind {
            EncoderKind::StackEncoder => {
                let names = section.get_list("encoders")?;
                if names.is_empty() {
                    return Err(section.invalid("encoders", "", "at least one encoder section"));
                }
                // a section listed more than once gets one scope per position
                let encoders = names
                    .iter()
                    .enumerate()
                    .map(|(i, child)| {
                        let repeated = names.iter().filter(|other| *other == child).count() > 1;
                        let child_scope = if repeated {
                            format!("{scope}/{child}_{i}")
                        } else {
                            format!("{scope}/{child}")
                        };
                        Self::resolve_at(config, child, child_scope, chain)
                    })
                    .collect::<Result<Vec<_>>>()?;
                EncoderParams::Stack { encoders }
            }
            EncoderKind::HotstartEncoder => {
                let wrapped = section.get_str("wrapped")?.trim().to_string();
                let node =
                    Self::resolve_at(config, &wrapped, format!("{scope}/{wrapped}"), chain)?;
                EncoderParams::Hotstart(HotstartParams {
                    wrapped: Box::new(node),
                    modeldir: PathBuf::from(section.get_str("modeldir")?.trim()),
                    trainable: section.get_bool_or("trainable", false)?,
                    scope: section
                        .get_optional_str("scope")
                        .unwrap_or(ENCODER_SCOPE)
                        .trim_end_matches('/')
                        .to_string(),
                })
            }
            EncoderKind::Listener | EncoderKind::ListenerPs => {
                EncoderParams::Listener(ListenerParams::from_section(section)?)
            }
            EncoderKind::Bldnn => EncoderParams::Bldnn(BldnnParams::from_section(section)?),
            _ => EncoderParams::Other {
                settings: section
                    .iter()
                    .filter(|(key, _)| *key != "encoder")
                    .map(|(key, value)| (key.to_string(), value.to_string()))
                    .collect(),
            },
        };
        chain.pop();

        Ok(Self {
            section: name.to_string(),
            scope,
            kind,
            params,
        })
    }

    /// Direct sub-encoders
    pub fn children(&self) -> Vec<&EncoderNode> {
        match &self.params {
            EncoderParams::Stack { encoders } => encoders.iter().collect(),
            EncoderParams::Hotstart(hotstart) => vec![hotstart.wrapped.as_ref()],
            _ => Vec::new(),
        }
    }

    /// All encoders of the tree in pre-order
    pub fn nodes(&self) -> Vec<&EncoderNode> {
        let mut out = vec![self];
        for child in self.children() {
            out.extend(child.nodes());
        }
        out
    }

    /// The hot-started encoders of the tree
    pub fn hotstarts(&self) -> Vec<(&EncoderNode, &HotstartParams)> {
        self.nodes()
            .into_iter()
            .filter_map(|node| match &node.params {
                EncoderParams::Hotstart(params) => Some((node, params)),
                _ => None,
            })
            .collect()
    }

    /// Factor by which the encoder shortens its input sequence
    pub fn time_reduction(&self) -> usize {
        match &self.params {
            EncoderParams::Listener(params) => {
                2usize.saturating_pow(params.pyramid_steps)
            }
            EncoderParams::Stack { encoders } => encoders
                .iter()
                .map(EncoderNode::time_reduction)
                .fold(1usize, usize::saturating_mul),
            EncoderParams::Hotstart(params) => params.wrapped.time_reduction(),
            _ => 1,
        }
    }

    /// Length of the encoder output for an input of `input_length` frames
    ///
    /// Odd lengths are padded before adjacent frames are merged, so the result
    /// is rounded up.
    pub fn output_length(&self, input_length: usize) -> usize {
        input_length.div_ceil(self.time_reduction())
    }

    fn render(&self, depth: usize, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let indent = "  ".repeat(depth);
        write!(f, "{indent}{} [{}] scope={}", self.kind, self.section, self.scope)?;
        match &self.params {
            EncoderParams::Hotstart(params) => writeln!(
                f,
                " modeldir={} trainable={}",
                params.modeldir.display(),
                params.trainable
            )?,
            EncoderParams::Listener(params) => writeln!(
                f,
                " units={} layers={} pyramid_steps={}",
                params.listener_units, params.listener_layers, params.pyramid_steps
            )?,
            EncoderParams::Bldnn(params) => writeln!(
                f,
                " blstm={}x{} dnn={}x{}",
                params.blstm_layers, params.blstm_units, params.dnn_layers, params.dnn_units
            )?,
            _ => writeln!(f)?,
        }
        for child in self.children() {
            child.render(depth + 1, f)?;
        }
        Ok(())
    }
}

impl fmt::Display for EncoderNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.render(0, f)
    }
}

fn get_u32(section: &Section, key: &str) -> Result<u32> {
    let value = section.get_str(key)?;
    value
        .trim()
        .parse()
        .map_err(|_| section.invalid(key, value, "a non-negative integer"))
}

fn usize_or(section: &Section, key: &str, default: usize) -> Result<usize> {
    if section.contains(key) {
        section.get_usize(key)
    } else {
        Ok(default)
    }
}

fn float_or(section: &Section, key: &str, default: f64) -> Result<f64> {
    if section.contains(key) {
        section.get_float(key)
    } else {
        Ok(default)
    }
}
