//! Hot-start restoration
//!
//! A `hotstart_encoder` wraps an encoder that was trained as part of another
//! model. Its variables are read from `<modeldir>/network.ckpt`, moved from
//! the scope they had in that model to the wrapped encoder's scope in this
//! one, and (unless `trainable = True`) frozen.

use crate::error::{NabuError, Result};
use crate::io::mapping::rescope;
use crate::io::{CHECKPOINT_FILE, load_checkpoint};
use crate::model::ModelConfig;
use crate::model::encoder::{EncoderNode, EncoderParams};
use crate::model::variables::VariableStore;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Restoration plan for one hot-started encoder
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HotStart {
    /// Section of the `hotstart_encoder`
    pub section: String,
    pub modeldir: PathBuf,
    /// Scope of the variables inside the checkpoint
    pub source_scope: String,
    /// Scope the variables are restored to
    pub target_scope: String,
    pub trainable: bool,
}

/// Outcome of a restoration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestoreReport {
    pub section: String,
    pub checkpoint: PathBuf,
    /// Names of the restored variables, in the model's scope
    pub restored: Vec<String>,
    /// Variables already declared under the target scope that the checkpoint lacked
    pub missing: Vec<String>,
    pub trainable: bool,
}

impl HotStart {
    /// Plan the restoration for a `hotstart_encoder` node
    pub fn from_node(node: &EncoderNode) -> Result<Self> {
        let EncoderParams::Hotstart(params) = &node.params else {
            return Err(NabuError::UndefinedComponent(format!(
                "section [{}] is a {} encoder, not a hotstart_encoder",
                node.section, node.kind
            )));
        };
        Ok(Self {
            section: node.section.clone(),
            modeldir: params.modeldir.clone(),
            source_scope: params.scope.clone(),
            target_scope: params.wrapped.scope.clone(),
            trainable: params.trainable,
        })
    }

    pub fn checkpoint_path(&self) -> PathBuf {
        checkpoint_path(&self.modeldir)
    }

    /// Load the checkpoint and restore the wrapped encoder's variables into `store`
    pub fn restore(&self, store: &mut VariableStore) -> Result<RestoreReport> {
        let path = self.checkpoint_path();
        if !self.modeldir.is_dir() {
            return Err(NabuError::Checkpoint {
                path: self.modeldir.clone(),
                message: "model directory does not exist".to_string(),
            });
        }

        let checkpoint = rescope(load_checkpoint(&path)?, &self.source_scope, &self.target_scope);
        if checkpoint.is_empty() {
            return Err(NabuError::EmptyRestore {
                scope: self.source_scope.clone(),
                path,
            });
        }

        let diff = store.restore(&checkpoint, self.trainable)?;
        if !self.trainable {
            store.mark_untrainable(&self.target_scope);
        }
        let target_prefix = format!("{}/", self.target_scope);
        let missing: Vec<String> = diff
            .missing_keys
            .into_iter()
            .filter(|name| name.starts_with(&target_prefix))
            .collect();
        if !missing.is_empty() {
            warn!(
                section = %self.section,
                missing = missing.len(),
                "checkpoint does not provide every declared variable"
            );
        }

        info!(
            section = %self.section,
            checkpoint = %path.display(),
            restored = checkpoint.len(),
            trainable = self.trainable,
            "hot-started encoder"
        );

        Ok(RestoreReport {
            section: self.section.clone(),
            checkpoint: path,
            restored: checkpoint.into_keys().collect(),
            missing,
            trainable: self.trainable,
        })
    }
}

/// Location of the checkpoint file inside a model directory
pub fn checkpoint_path(modeldir: &Path) -> PathBuf {
    modeldir.join(CHECKPOINT_FILE)
}

/// Restore every hot-started encoder of a model, outermost first
pub fn restore_all(model: &ModelConfig, store: &mut VariableStore) -> Result<Vec<RestoreReport>> {
    model
        .encoder
        .hotstarts()
        .into_iter()
        .map(|(node, _)| HotStart::from_node(node)?.restore(store))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::config::ConfigFile;
    use crate::io::{Checkpoint, VariableData, save_checkpoint};

    fn config(modeldir: &Path, trainable: &str) -> ConfigFile {
        ConfigFile::parse(&format!(
            "[encoder]\nencoder = hotstart_encoder\nwrapped = inner\nmodeldir = {}\ntrainable = {trainable}\n\
             [inner]\nencoder = dnn\nnum_units = 4\n",
            modeldir.display()
        ))
        .unwrap()
    }

    fn write_checkpoint(dir: &Path) {
        let mut checkpoint = Checkpoint::new();
        checkpoint.insert("encoder/layer0/kernel".to_string(), VariableData::zeros(&[2, 2]));
        checkpoint.insert("encoder/layer0/bias".to_string(), VariableData::zeros(&[2]));
        checkpoint.insert("decoder/out/kernel".to_string(), VariableData::zeros(&[2]));
        save_checkpoint(&checkpoint, checkpoint_path(dir)).unwrap();
    }

    #[test]
    fn test_restore_rescopes_and_freezes() {
        let dir = tempfile::tempdir().unwrap();
        write_checkpoint(dir.path());
        let root = EncoderNode::resolve(&config(dir.path(), "False"), "encoder").unwrap();

        let mut store = VariableStore::new();
        let report = HotStart::from_node(&root).unwrap().restore(&mut store).unwrap();

        assert_eq!(
            report.restored,
            vec!["encoder/inner/layer0/bias", "encoder/inner/layer0/kernel"]
        );
        assert_eq!(store.len(), 2);
        assert!(store.trainable_names().is_empty());
        assert!(!store.contains("decoder/out/kernel"));
    }

    #[test]
    fn test_frozen_hotstart_freezes_declared_variables_missing_from_checkpoint() {
        let dir = tempfile::tempdir().unwrap();
        write_checkpoint(dir.path());
        let root = EncoderNode::resolve(&config(dir.path(), "False"), "encoder").unwrap();

        let mut store = VariableStore::new();
        store.insert("encoder/inner/layer1/kernel", VariableData::zeros(&[2]), true);
        store.insert("encoder/other/kernel", VariableData::zeros(&[2]), true);
        let report = HotStart::from_node(&root).unwrap().restore(&mut store).unwrap();

        assert_eq!(report.missing, vec!["encoder/inner/layer1/kernel"]);
        assert!(!store.get("encoder/inner/layer1/kernel").unwrap().trainable);
        assert_eq!(store.trainable_names(), vec!["encoder/other/kernel"]);
    }

    #[test]
    fn test_trainable_hotstart_stays_trainable() {
        let dir = tempfile::tempdir().unwrap();
        write_checkpoint(dir.path());
        let root = EncoderNode::resolve(&config(dir.path(), "True"), "encoder").unwrap();

        let mut store = VariableStore::new();
        HotStart::from_node(&root).unwrap().restore(&mut store).unwrap();
        assert_eq!(store.trainable_names().len(), 2);
    }

    #[test]
    fn test_missing_modeldir() {
        let dir = tempfile::tempdir().unwrap();
        let absent = dir.path().join("nope");
        let root = EncoderNode::resolve(&config(&absent, "False"), "encoder").unwrap();
        let err = HotStart::from_node(&root)
            .unwrap()
            .restore(&mut VariableStore::new())
            .unwrap_err();
        assert!(matches!(err, NabuError::Checkpoint { path, .. } if path == absent));
    }

    #[test]
    fn test_no_variables_in_scope() {
        let dir = tempfile::tempdir().unwrap();
        let mut checkpoint = Checkpoint::new();
        checkpoint.insert("decoder/out/kernel".to_string(), VariableData::zeros(&[2]));
        save_checkpoint(&checkpoint, checkpoint_path(dir.path())).unwrap();

        let root = EncoderNode::resolve(&config(dir.path(), "False"), "encoder").unwrap();
        let err = HotStart::from_node(&root)
            .unwrap()
            .restore(&mut VariableStore::new())
            .unwrap_err();
        assert!(matches!(err, NabuError::EmptyRestore { .. }));
    }

    #[test]
    fn test_from_node_requires_hotstart() {
        let config = ConfigFile::parse("[encoder]\nencoder = dnn\n").unwrap();
        let root = EncoderNode::resolve(&config, "encoder").unwrap();
        assert!(HotStart::from_node(&root).is_err());
    }
}
