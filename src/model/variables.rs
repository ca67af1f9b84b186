use crate::error::{NabuError, Result};
use crate::io::{Checkpoint, CheckpointDiff, VariableData, diff_checkpoint};
use std::collections::BTreeMap;

/// A model variable and whether the optimizer may update it
#[derive(Debug, Clone, PartialEq)]
pub struct Variable {
    pub value: VariableData,
    pub trainable: bool,
}

/// Named variables of a model
///
/// Names are `/`-separated scopes, e.g. `encoder/listener/blstm0/kernel`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VariableStore {
    variables: BTreeMap<String, Variable>,
}

impl VariableStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a variable
    pub fn insert(&mut self, name: impl Into<String>, value: VariableData, trainable: bool) {
        self.variables
            .insert(name.into(), Variable { value, trainable });
    }

    pub fn get(&self, name: &str) -> Option<&Variable> {
        self.variables.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.variables.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.variables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.variables.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Variable)> {
        self.variables.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Freeze every variable under `scope`, returning how many were changed
    pub fn mark_untrainable(&mut self, scope: &str) -> usize {
        let prefix = format!("{}/", scope.trim_end_matches('/'));
        let mut changed = 0;
        for (name, variable) in &mut self.variables {
            if name.starts_with(&prefix) && variable.trainable {
                variable.trainable = false;
                changed += 1;
            }
        }
        changed
    }

    pub fn trainable_names(&self) -> Vec<&str> {
        self.iter()
            .filter(|(_, v)| v.trainable)
            .map(|(name, _)| name)
            .collect()
    }

    pub fn untrainable_names(&self) -> Vec<&str> {
        self.iter()
            .filter(|(_, v)| !v.trainable)
            .map(|(name, _)| name)
            .collect()
    }

    /// Values of all variables as a checkpoint
    pub fn snapshot(&self) -> Checkpoint {
        self.variables
            .iter()
            .map(|(name, v)| (name.clone(), v.value.clone()))
            .collect()
    }

    /// Restore values from a checkpoint.
    ///
    /// Variables that already exist must keep their shape; new names are
    /// added. Every restored variable gets the given `trainable` flag. The
    /// returned diff lists, among others, the existing variables the
    /// checkpoint did not provide.
    pub fn restore(&mut self, checkpoint: &Checkpoint, trainable: bool) -> Result<CheckpointDiff> {
        let diff = diff_checkpoint(&self.snapshot(), checkpoint);
        if let Some((name, expected, actual)) = diff.shape_mismatches.first() {
            return Err(NabuError::ShapeMismatch {
                name: name.clone(),
                expected: expected.clone(),
                actual: actual.clone(),
            });
        }
        for (name, value) in checkpoint {
            self.insert(name.clone(), value.clone(), trainable);
        }
        Ok(diff)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> VariableStore {
        let mut store = VariableStore::new();
        store.insert("encoder/phonology/kernel", VariableData::zeros(&[2, 2]), true);
        store.insert("encoder/phonology/bias", VariableData::zeros(&[2]), true);
        store.insert("encoder/phonology2/bias", VariableData::zeros(&[2]), true);
        store.insert("decoder/speller/kernel", VariableData::zeros(&[3]), true);
        store
    }

    #[test]
    fn test_mark_untrainable_respects_scope_boundary() {
        let mut store = store();
        assert_eq!(store.mark_untrainable("encoder/phonology"), 2);
        assert_eq!(
            store.untrainable_names(),
            vec!["encoder/phonology/bias", "encoder/phonology/kernel"]
        );
        assert!(store.get("encoder/phonology2/bias").unwrap().trainable);
    }

    #[test]
    fn test_restore_overwrites_and_adds() {
        let mut store = store();
        let mut checkpoint = Checkpoint::new();
        checkpoint.insert(
            "encoder/phonology/bias".to_string(),
            VariableData::new(vec![1.0, 2.0], &[2]).unwrap(),
        );
        checkpoint.insert("encoder/phonology/extra".to_string(), VariableData::zeros(&[1]));

        let diff = store.restore(&checkpoint, false).unwrap();
        assert_eq!(diff.unexpected_keys, vec!["encoder/phonology/extra".to_string()]);
        assert_eq!(diff.missing_keys.len(), 3);

        let bias = store.get("encoder/phonology/bias").unwrap();
        assert_eq!(bias.value.data, vec![1.0, 2.0]);
        assert!(!bias.trainable);
        assert!(store.contains("encoder/phonology/extra"));
        assert_eq!(store.len(), 5);
    }

    #[test]
    fn test_restore_rejects_shape_change() {
        let mut store = store();
        let mut checkpoint = Checkpoint::new();
        checkpoint.insert("encoder/phonology/kernel".to_string(), VariableData::zeros(&[4]));
        let err = store.restore(&checkpoint, true).unwrap_err();
        assert!(matches!(err, NabuError::ShapeMismatch { name, .. } if name == "encoder/phonology/kernel"));
        // nothing was written
        assert_eq!(store.get("encoder/phonology/kernel").unwrap().value.shape, vec![2, 2]);
    }

    #[test]
    fn test_snapshot_round_trips_values() {
        let store = store();
        let snapshot = store.snapshot();
        assert_eq!(snapshot.len(), store.len());
        let mut copy = VariableStore::new();
        copy.restore(&snapshot, true).unwrap();
        assert_eq!(copy, store);
    }
}
