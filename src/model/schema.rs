//! Value domains of model configuration keys
//!
//! Hyperparameters are recognised by name pattern rather than per component,
//! so every section of a model file is checked the same way regardless of
//! which encoder or decoder it configures.

use crate::io::config::{ConfigFile, Section, parse_bool};
use serde::Serialize;
use std::collections::HashSet;
use std::fmt;

/// Expected domain of a recognised key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ValueDomain {
    /// Integer >= 1 (`*_units`, `*_layers`, `output_dims`)
    PositiveInt,
    /// Integer >= 0 (`context`, `pyramid_steps`)
    NonNegativeInt,
    /// Keep probability in (0, 1] (`dropout`, `*_dropout`)
    KeepProbability,
    /// Probability in [0, 1] (`sample_prob`)
    Probability,
    /// `True` / `False` (`trainable`, `layer_norm`)
    Boolean,
    /// Non-empty string (`encoder`, `decoder`, `modeldir`)
    NonEmpty,
}

impl ValueDomain {
    /// Domain for a key, or `None` for keys that are not checked
    pub fn for_key(key: &str) -> Option<Self> {
        match key {
            "output_dims" => Some(Self::PositiveInt),
            "context" | "pyramid_steps" => Some(Self::NonNegativeInt),
            "dropout" => Some(Self::KeepProbability),
            "sample_prob" => Some(Self::Probability),
            "trainable" | "layer_norm" => Some(Self::Boolean),
            "encoder" | "decoder" | "modeldir" => Some(Self::NonEmpty),
            _ if key.ends_with("_units") || key.ends_with("_layers") => Some(Self::PositiveInt),
            _ if key.ends_with("_dropout") => Some(Self::KeepProbability),
            _ => None,
        }
    }

    pub fn accepts(self, value: &str) -> bool {
        let value = value.trim();
        match self {
            Self::PositiveInt => value.parse::<u64>().is_ok_and(|v| v >= 1),
            Self::NonNegativeInt => value.parse::<u64>().is_ok(),
            Self::KeepProbability => value.parse::<f64>().is_ok_and(|p| p > 0.0 && p <= 1.0),
            Self::Probability => value.parse::<f64>().is_ok_and(|p| (0.0..=1.0).contains(&p)),
            Self::Boolean => parse_bool(value).is_some(),
            Self::NonEmpty => !value.is_empty(),
        }
    }

    pub fn describe(self) -> &'static str {
        match self {
            Self::PositiveInt => "an integer >= 1",
            Self::NonNegativeInt => "an integer >= 0",
            Self::KeepProbability => "a keep probability in (0, 1]",
            Self::Probability => "a probability in [0, 1]",
            Self::Boolean => "True or False",
            Self::NonEmpty => "a non-empty value",
        }
    }
}

/// One key whose value falls outside its domain
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SchemaViolation {
    pub section: String,
    pub key: String,
    pub value: String,
    pub expected: String,
}

impl fmt::Display for SchemaViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{} = '{}' (expected {})",
            self.section, self.key, self.value, self.expected
        )
    }
}

/// Check one section against the key domains
pub fn check_section(section: &Section) -> Vec<SchemaViolation> {
    section
        .iter()
        .filter_map(|(key, value)| {
            let domain = ValueDomain::for_key(key)?;
            (!domain.accepts(value)).then(|| SchemaViolation {
                section: section.name().to_string(),
                key: key.to_string(),
                value: value.to_string(),
                expected: domain.describe().to_string(),
            })
        })
        .collect()
}

/// Check every section of a model configuration, collecting all violations
pub fn check(config: &ConfigFile) -> Vec<SchemaViolation> {
    let mut violations: Vec<SchemaViolation> =
        config.sections().iter().flat_map(check_section).collect();

    if let Ok(io) = config.section("io") {
        for key in ["inputs", "outputs"] {
            let Some(value) = io.get(key) else { continue };
            let mut seen = HashSet::new();
            if let Some(dup) = value.split_whitespace().find(|name| !seen.insert(*name)) {
                violations.push(SchemaViolation {
                    section: "io".to_string(),
                    key: key.to_string(),
                    value: value.to_string(),
                    expected: format!("unique names ('{dup}' repeats)"),
                });
            }
        }
    }

    violations
}
