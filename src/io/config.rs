//! INI-style configuration files
//!
//! Every component of a model (and the trainer, data and evaluator settings
//! around it) is described by a section of `key = value` pairs:
//!
//! ```text
//! # the model inputs
//! [io]
//! inputs = features
//! outputs = text
//!
//! [listener]
//! encoder = listener
//! listener_units = 256
//! ```
//!
//! Values are kept as strings and coerced when they are read, so the same
//! file format serves every consumer. Keys are case-insensitive and stored
//! lowercase; section names are kept verbatim. A `[DEFAULT]` section supplies
//! keys to every other section that does not set them itself.

use crate::error::{NabuError, Result};
use std::fmt;
use std::path::Path;
use tracing::debug;

/// Name of the pseudo-section whose keys are inherited by all sections
pub const DEFAULT_SECTION: &str = "DEFAULT";

/// Literal used by configs to mark an unset optional value
pub const NONE_LITERAL: &str = "None";

/// A named group of key/value pairs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    name: String,
    entries: Vec<(String, String)>,
}

impl Section {
    fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entries: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Keys in file order
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    /// Key/value pairs in file order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Raw value lookup, case-insensitive on the key
    pub fn get(&self, key: &str) -> Option<&str> {
        let key = key.to_ascii_lowercase();
        self.entries
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Raw value, failing with [`NabuError::MissingKey`] when absent
    pub fn get_str(&self, key: &str) -> Result<&str> {
        self.get(key).ok_or_else(|| NabuError::MissingKey {
            section: self.name.clone(),
            key: key.to_string(),
        })
    }

    pub fn get_int(&self, key: &str) -> Result<i64> {
        let value = self.get_str(key)?;
        value
            .trim()
            .parse()
            .map_err(|_| self.invalid(key, value, "an integer"))
    }

    pub fn get_usize(&self, key: &str) -> Result<usize> {
        let value = self.get_str(key)?;
        value
            .trim()
            .parse()
            .map_err(|_| self.invalid(key, value, "a non-negative integer"))
    }

    pub fn get_float(&self, key: &str) -> Result<f64> {
        let value = self.get_str(key)?;
        value
            .trim()
            .parse()
            .map_err(|_| self.invalid(key, value, "a number"))
    }

    /// Boolean literal, accepting the same spellings as Python's ConfigParser
    pub fn get_bool(&self, key: &str) -> Result<bool> {
        let value = self.get_str(key)?;
        parse_bool(value).ok_or_else(|| self.invalid(key, value, "True or False"))
    }

    /// Whitespace-separated list; an empty value is an empty list
    pub fn get_list(&self, key: &str) -> Result<Vec<String>> {
        Ok(self
            .get_str(key)?
            .split_whitespace()
            .map(str::to_string)
            .collect())
    }

    /// Like [`Section::get_usize`], but the literal `None` yields `Ok(None)`
    pub fn get_optional_usize(&self, key: &str) -> Result<Option<usize>> {
        match self.get(key).map(str::trim) {
            None => Ok(None),
            Some(NONE_LITERAL) => Ok(None),
            Some(_) => self.get_usize(key).map(Some),
        }
    }

    /// Like [`Section::get_str`], but a missing key or the literal `None` yields `None`
    pub fn get_optional_str(&self, key: &str) -> Option<&str> {
        self.get(key)
            .map(str::trim)
            .filter(|v| *v != NONE_LITERAL && !v.is_empty())
    }

    /// Boolean with a fallback for missing keys
    pub fn get_bool_or(&self, key: &str, default: bool) -> Result<bool> {
        if self.contains(key) {
            self.get_bool(key)
        } else {
            Ok(default)
        }
    }

    pub(crate) fn invalid(&self, key: &str, value: &str, expected: &str) -> NabuError {
        NabuError::InvalidValue {
            section: self.name.clone(),
            key: key.to_string(),
            value: value.to_string(),
            expected: expected.to_string(),
        }
    }

    fn insert(&mut self, key: String, value: String) {
        self.entries.push((key, value));
    }
}

pub fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// A parsed configuration file
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigFile {
    sections: Vec<Section>,
}

impl ConfigFile {
    /// Parse configuration text
    pub fn parse(text: &str) -> Result<Self> {
        let mut defaults: Option<Section> = None;
        let mut sections: Vec<Section> = Vec::new();
        // Whether the section being filled is DEFAULT
        let mut in_defaults = false;
        let mut last_key: Option<String> = None;

        for (index, raw) in text.lines().enumerate() {
            let line_no = index + 1;
            let trimmed = raw.trim();

            if trimmed.is_empty() || trimmed.starts_with('#') || trimmed.starts_with(';') {
                continue;
            }

            let current = if in_defaults {
                defaults.as_mut()
            } else {
                sections.last_mut()
            };

            // Continuation of a multi-line value
            if raw.starts_with([' ', '\t'])
                && let (Some(section), Some(key)) = (current, last_key.as_ref())
            {
                if let Some((_, value)) = section.entries.iter_mut().find(|(k, _)| k == key) {
                    if !value.is_empty() {
                        value.push('\n');
                    }
                    value.push_str(trimmed);
                }
                continue;
            }

            if let Some(rest) = trimmed.strip_prefix('[') {
                let name = rest
                    .strip_suffix(']')
                    .map(str::trim)
                    .filter(|n| !n.is_empty())
                    .ok_or_else(|| parse_error(line_no, format!("malformed section header '{trimmed}'")))?;

                last_key = None;
                if name == DEFAULT_SECTION {
                    if defaults.is_some() {
                        return Err(parse_error(line_no, "duplicate section [DEFAULT]"));
                    }
                    defaults = Some(Section::new(DEFAULT_SECTION));
                    in_defaults = true;
                } else {
                    if sections.iter().any(|s| s.name == name) {
                        return Err(parse_error(line_no, format!("duplicate section [{name}]")));
                    }
                    sections.push(Section::new(name));
                    in_defaults = false;
                }
                continue;
            }

            let Some(split) = trimmed.find(['=', ':']) else {
                return Err(parse_error(
                    line_no,
                    format!("expected 'key = value', found '{trimmed}'"),
                ));
            };
            let key = trimmed[..split].trim().to_ascii_lowercase();
            let value = trimmed[split + 1..].trim().to_string();
            if key.is_empty() {
                return Err(parse_error(line_no, "empty key"));
            }

            let section = if in_defaults {
                defaults.as_mut()
            } else {
                sections.last_mut()
            }
            .ok_or_else(|| parse_error(line_no, format!("key '{key}' outside of any section")))?;

            if section.entries.iter().any(|(k, _)| *k == key) {
                return Err(parse_error(
                    line_no,
                    format!("duplicate key '{key}' in section [{}]", section.name),
                ));
            }
            section.insert(key.clone(), value);
            last_key = Some(key);
        }

        if let Some(defaults) = defaults {
            for section in &mut sections {
                for (key, value) in &defaults.entries {
                    if !section.entries.iter().any(|(k, _)| k == key) {
                        section.insert(key.clone(), value.clone());
                    }
                }
            }
        }

        debug!(sections = sections.len(), "parsed configuration");
        Ok(Self { sections })
    }

    /// Read and parse a configuration file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        debug!(path = %path.display(), "loading configuration");
        Self::parse(&text)
    }

    /// Sections in file order, `[DEFAULT]` excluded
    pub fn sections(&self) -> &[Section] {
        &self.sections
    }

    pub fn section_names(&self) -> impl Iterator<Item = &str> {
        self.sections.iter().map(Section::name)
    }

    pub fn has_section(&self, name: &str) -> bool {
        self.sections.iter().any(|s| s.name == name)
    }

    /// Look up a section, failing with [`NabuError::MissingSection`]
    pub fn section(&self, name: &str) -> Result<&Section> {
        self.sections
            .iter()
            .find(|s| s.name == name)
            .ok_or_else(|| NabuError::MissingSection(name.to_string()))
    }
}

impl fmt::Display for ConfigFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, section) in self.sections.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            writeln!(f, "[{}]", section.name)?;
            for (key, value) in section.iter() {
                let mut lines = value.split('\n');
                writeln!(f, "{key} = {}", lines.next().unwrap_or_default())?;
                for line in lines {
                    writeln!(f, "\t{line}")?;
                }
            }
        }
        Ok(())
    }
}

fn parse_error(line: usize, message: impl Into<String>) -> NabuError {
    NabuError::Parse {
        line,
        message: message.into(),
    }
}
