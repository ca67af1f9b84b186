use crate::model::schema::SchemaViolation;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum NabuError {
    #[error("Parse error on line {line}: {message}")]
    Parse { line: usize, message: String },

    #[error("Missing section [{0}]")]
    MissingSection(String),

    #[error("Missing key '{key}' in section [{section}]")]
    MissingKey { section: String, key: String },

    #[error("Invalid value '{value}' for {section}.{key}: expected {expected}")]
    InvalidValue {
        section: String,
        key: String,
        value: String,
        expected: String,
    },

    #[error("Configuration has {} schema violation(s): {}", .0.len(), format_violations(.0))]
    Schema(Vec<SchemaViolation>),

    #[error("{0}")]
    UndefinedComponent(String),

    #[error("Cyclic section reference: {}", .0.join(" -> "))]
    CyclicReference(Vec<String>),

    #[error("Checkpoint error at {path:?}: {message}")]
    Checkpoint { path: PathBuf, message: String },

    #[error("Shape mismatch for variable '{name}': expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        name: String,
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    #[error("No variables under scope '{scope}' in checkpoint {path:?}")]
    EmptyRestore { scope: String, path: PathBuf },

    #[error("Training error: {0}")]
    Training(String),

    #[error("Decoding error: {0}")]
    Decoding(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

fn format_violations(violations: &[SchemaViolation]) -> String {
    violations
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

pub type Result<T> = std::result::Result<T, NabuError>;
