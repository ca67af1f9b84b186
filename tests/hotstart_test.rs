use nabu::io::CHECKPOINT_FILE;
use nabu::model::{HotStart, restore_all};
use nabu::*;
use std::path::Path;

const MODEL_CFG: &str = include_str!("../configs/model.cfg");

fn model_with_modeldir(modeldir: &Path) -> ModelConfig {
    let text = MODEL_CFG.replace(
        "modeldir = exp/phonology",
        &format!("modeldir = {}", modeldir.display()),
    );
    ModelConfig::parse(&text).unwrap()
}

/// Checkpoint of a separately trained phonology model
fn pretrained_checkpoint() -> Checkpoint {
    let mut checkpoint = Checkpoint::new();
    checkpoint.insert(
        "encoder/blstm0/kernel".to_string(),
        VariableData::new(vec![0.5; 6], &[2, 3]).unwrap(),
    );
    checkpoint.insert(
        "encoder/dnn0/bias".to_string(),
        VariableData::new(vec![0.1, 0.2], &[2]).unwrap(),
    );
    checkpoint.insert(
        "decoder/output/kernel".to_string(),
        VariableData::zeros(&[4]),
    );
    checkpoint
}

#[test]
fn test_restores_only_the_wrapped_scope() {
    let dir = tempfile::tempdir().unwrap();
    save_checkpoint(&pretrained_checkpoint(), dir.path().join(CHECKPOINT_FILE)).unwrap();
    let model = model_with_modeldir(dir.path());

    let mut store = VariableStore::new();
    store.insert("encoder/listener/kernel", VariableData::zeros(&[3]), true);
    let reports = restore_all(&model, &mut store).unwrap();

    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].section, "phonologyhs");
    assert_eq!(
        reports[0].restored,
        vec![
            "encoder/phonologyhs/phonology/blstm0/kernel",
            "encoder/phonologyhs/phonology/dnn0/bias",
        ]
    );
    assert!(!store.contains("decoder/output/kernel"));

    let bias = store.get("encoder/phonologyhs/phonology/dnn0/bias").unwrap();
    assert_eq!(bias.value.data, vec![0.1, 0.2]);
    assert!(!bias.trainable);
}

#[test]
fn test_restored_variables_are_frozen() {
    let dir = tempfile::tempdir().unwrap();
    save_checkpoint(&pretrained_checkpoint(), dir.path().join(CHECKPOINT_FILE)).unwrap();
    let model = model_with_modeldir(dir.path());

    let mut store = VariableStore::new();
    store.insert("encoder/listener/kernel", VariableData::zeros(&[3]), true);
    restore_all(&model, &mut store).unwrap();

    assert_eq!(
        nabu::training::trainable_variables(&store),
        vec!["encoder/listener/kernel"]
    );
    assert_eq!(store.untrainable_names().len(), 2);
}

#[test]
fn test_declared_variables_missing_from_checkpoint_are_frozen() {
    let dir = tempfile::tempdir().unwrap();
    let mut checkpoint = Checkpoint::new();
    checkpoint.insert(
        "encoder/blstm0/kernel".to_string(),
        VariableData::zeros(&[2, 3]),
    );
    save_checkpoint(&checkpoint, dir.path().join(CHECKPOINT_FILE)).unwrap();
    let model = model_with_modeldir(dir.path());

    let mut store = VariableStore::new();
    store.insert(
        "encoder/phonologyhs/phonology/dnn0/kernel",
        VariableData::zeros(&[4]),
        true,
    );
    let reports = restore_all(&model, &mut store).unwrap();

    assert_eq!(
        reports[0].missing,
        vec!["encoder/phonologyhs/phonology/dnn0/kernel"]
    );
    assert!(store.trainable_names().is_empty());
}

#[test]
fn test_shape_mismatch_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    save_checkpoint(&pretrained_checkpoint(), dir.path().join(CHECKPOINT_FILE)).unwrap();
    let model = model_with_modeldir(dir.path());

    let mut store = VariableStore::new();
    store.insert(
        "encoder/phonologyhs/phonology/blstm0/kernel",
        VariableData::zeros(&[3, 2]),
        true,
    );
    assert!(matches!(
        restore_all(&model, &mut store),
        Err(NabuError::ShapeMismatch { .. })
    ));
}

#[test]
fn test_missing_model_directory() {
    let dir = tempfile::tempdir().unwrap();
    let model = model_with_modeldir(&dir.path().join("does-not-exist"));
    let mut store = VariableStore::new();
    assert!(matches!(
        restore_all(&model, &mut store),
        Err(NabuError::Checkpoint { .. })
    ));
    assert!(store.is_empty());
}

#[test]
fn test_checkpoint_without_source_scope() {
    let dir = tempfile::tempdir().unwrap();
    let mut checkpoint = Checkpoint::new();
    checkpoint.insert("decoder/kernel".to_string(), VariableData::zeros(&[1]));
    save_checkpoint(&checkpoint, dir.path().join(CHECKPOINT_FILE)).unwrap();

    let model = model_with_modeldir(dir.path());
    let mut store = VariableStore::new();
    assert!(matches!(
        restore_all(&model, &mut store),
        Err(NabuError::EmptyRestore { .. })
    ));
}

#[test]
fn test_hotstart_plan() {
    let model = ModelConfig::parse(MODEL_CFG).unwrap();
    let (node, _) = model.encoder.hotstarts()[0];
    let plan = HotStart::from_node(node).unwrap();
    assert_eq!(plan.source_scope, "encoder");
    assert_eq!(plan.target_scope, "encoder/phonologyhs/phonology");
    assert_eq!(plan.checkpoint_path(), Path::new("exp/phonology").join(CHECKPOINT_FILE));
    assert!(!plan.trainable);
}
