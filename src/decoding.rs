//! Decoder environment
//!
//! A decoder turns a batch of inputs into token sequences for every model
//! output. Writing the results to disk and scoring them against references
//! is the same for every decoder, so those are provided methods.

use crate::error::{NabuError, Result};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;
use tracing::info;

/// Decoded token sequences per output name, one sequence per utterance
pub type Outputs = BTreeMap<String, Vec<Vec<String>>>;

pub trait Decoder {
    type Input;

    /// Decode a batch of inputs
    fn decode(&mut self, inputs: &Self::Input) -> Result<Outputs>;

    /// Write one file per output to `directory`, each line holding an
    /// utterance name followed by its tokens
    fn write(&self, outputs: &Outputs, directory: &Path, names: &[String]) -> Result<()> {
        write_outputs(outputs, directory, names)
    }

    /// Token error rate of `outputs` against `references`
    fn evaluate(&self, outputs: &Outputs, references: &Outputs) -> Result<f64> {
        error_rate(outputs, references)
    }
}

pub fn write_outputs(outputs: &Outputs, directory: &Path, names: &[String]) -> Result<()> {
    fs::create_dir_all(directory)?;
    for (output, sequences) in outputs {
        if sequences.len() != names.len() {
            return Err(NabuError::Decoding(format!(
                "output '{output}' has {} utterances but {} names were given",
                sequences.len(),
                names.len()
            )));
        }
        let path = directory.join(output);
        let mut writer = BufWriter::new(File::create(&path)?);
        for (name, tokens) in names.iter().zip(sequences) {
            if tokens.is_empty() {
                writeln!(writer, "{name}")?;
            } else {
                writeln!(writer, "{name} {}", tokens.join(" "))?;
            }
        }
        writer.flush()?;
        info!(path = %path.display(), utterances = names.len(), "wrote decoder output");
    }
    Ok(())
}

/// Levenshtein distance between two token sequences
pub fn edit_distance<T: PartialEq>(hypothesis: &[T], reference: &[T]) -> usize {
    let mut previous: Vec<usize> = (0..=reference.len()).collect();
    let mut current = vec![0; reference.len() + 1];

    for (i, hyp) in hypothesis.iter().enumerate() {
        current[0] = i + 1;
        for (j, refr) in reference.iter().enumerate() {
            let substitution = previous[j] + usize::from(hyp != refr);
            current[j + 1] = substitution.min(previous[j + 1] + 1).min(current[j] + 1);
        }
        std::mem::swap(&mut previous, &mut current);
    }
    previous[reference.len()]
}

/// Total edit distance divided by the total reference length, over every
/// output that has references
pub fn error_rate(outputs: &Outputs, references: &Outputs) -> Result<f64> {
    let mut errors = 0;
    let mut length = 0;

    for (output, refs) in references {
        let hyps = outputs.get(output).ok_or_else(|| {
            NabuError::Decoding(format!("no decoded output for reference '{output}'"))
        })?;
        if hyps.len() != refs.len() {
            return Err(NabuError::Decoding(format!(
                "output '{output}' has {} utterances, references have {}",
                hyps.len(),
                refs.len()
            )));
        }
        for (hyp, refr) in hyps.iter().zip(refs) {
            errors += edit_distance(hyp, refr);
            length += refr.len();
        }
    }

    if length == 0 {
        return Err(NabuError::Decoding("references are empty".to_string()));
    }
    Ok(errors as f64 / length as f64)
}
