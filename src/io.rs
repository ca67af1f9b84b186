pub mod config;
pub mod mapping;

use crate::error::{NabuError, Result};
use bincode::{Decode, Encode, config as bincode_config};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;
use tracing::debug;

/// Saved snapshot of model variables, keyed by `/`-separated scope names
pub type Checkpoint = BTreeMap<String, VariableData>;

/// File name of the checkpoint inside a model directory
pub const CHECKPOINT_FILE: &str = "network.ckpt";

// Serializable representation of a variable's value
#[derive(Encode, Decode, Debug, Clone, PartialEq)]
pub struct VariableData {
    pub data: Vec<f32>,
    pub shape: Vec<usize>,
}

impl VariableData {
    /// Create variable data, checking that `data` fills `shape`
    pub fn new(data: Vec<f32>, shape: &[usize]) -> Result<Self> {
        let elements: usize = shape.iter().product();
        if elements != data.len() {
            return Err(NabuError::ShapeMismatch {
                name: String::new(),
                expected: shape.to_vec(),
                actual: vec![data.len()],
            });
        }
        Ok(Self {
            data,
            shape: shape.to_vec(),
        })
    }

    pub fn zeros(shape: &[usize]) -> Self {
        Self {
            data: vec![0.0; shape.iter().product()],
            shape: shape.to_vec(),
        }
    }

    pub fn num_elements(&self) -> usize {
        self.data.len()
    }
}

/// Summary of differences between two checkpoints.
///
/// `expected` is usually a snapshot of the variables a model declares, and
/// `loaded` is what was read from disk.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CheckpointDiff {
    /// Names that exist in `expected` but are missing from `loaded`.
    pub missing_keys: Vec<String>,
    /// Names that exist in `loaded` but not in `expected`.
    pub unexpected_keys: Vec<String>,
    /// Names present in both, but with differing shapes:
    /// `(name, expected_shape, loaded_shape)`.
    pub shape_mismatches: Vec<(String, Vec<usize>, Vec<usize>)>,
}

impl CheckpointDiff {
    /// Returns true if there are no missing, unexpected, or shape-mismatched names.
    pub fn is_empty(&self) -> bool {
        self.missing_keys.is_empty()
            && self.unexpected_keys.is_empty()
            && self.shape_mismatches.is_empty()
    }
}

/// Compute a diff between an "expected" and a "loaded" checkpoint.
///
/// Purely informational, neither side is modified.
pub fn diff_checkpoint(expected: &Checkpoint, loaded: &Checkpoint) -> CheckpointDiff {
    let mut diff = CheckpointDiff::default();

    for (name, expected_var) in expected {
        match loaded.get(name) {
            None => diff.missing_keys.push(name.clone()),
            Some(actual_var) => {
                if expected_var.shape != actual_var.shape {
                    diff.shape_mismatches.push((
                        name.clone(),
                        expected_var.shape.clone(),
                        actual_var.shape.clone(),
                    ));
                }
            }
        }
    }

    for name in loaded.keys() {
        if !expected.contains_key(name) {
            diff.unexpected_keys.push(name.clone());
        }
    }

    diff
}

pub fn save_checkpoint(checkpoint: &Checkpoint, path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    let encoded = bincode::encode_to_vec(checkpoint, bincode_config::standard())
        .map_err(|e| checkpoint_error(path, e))?;
    let mut file = File::create(path)?;
    file.write_all(&encoded)?;
    debug!(path = %path.display(), variables = checkpoint.len(), "saved checkpoint");
    Ok(())
}

pub fn load_checkpoint(path: impl AsRef<Path>) -> Result<Checkpoint> {
    let path = path.as_ref();
    let mut file = File::open(path).map_err(|e| checkpoint_error(path, e))?;
    let mut buffer = Vec::new();
    file.read_to_end(&mut buffer)?;
    let (checkpoint, _): (Checkpoint, _) =
        bincode::decode_from_slice(&buffer, bincode_config::standard())
            .map_err(|e| checkpoint_error(path, e))?;
    debug!(path = %path.display(), variables = checkpoint.len(), "loaded checkpoint");
    Ok(checkpoint)
}

fn checkpoint_error(path: &Path, err: impl std::fmt::Display) -> NabuError {
    NabuError::Checkpoint {
        path: path.to_path_buf(),
        message: err.to_string(),
    }
}
