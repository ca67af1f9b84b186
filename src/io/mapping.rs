use crate::io::Checkpoint;

pub type TransformationBox = Box<dyn Fn(&mut Checkpoint)>;

/// Builder for composable checkpoint name transformations
///
/// Used when variables trained inside one model are restored into another,
/// where the same sub-network lives under a different scope. Transformations
/// are applied in the order they are added.
///
/// # Examples
///
/// ```
/// use nabu::io::mapping::CheckpointMapper;
/// use nabu::io::{Checkpoint, VariableData};
///
/// let mut checkpoint = Checkpoint::new();
/// checkpoint.insert("encoder/blstm/kernel".into(), VariableData::zeros(&[2]));
/// checkpoint.insert("decoder/speller/kernel".into(), VariableData::zeros(&[2]));
///
/// // Move the encoder under the scope of a stacked sub-encoder
/// let mapper = CheckpointMapper::new()
///     .select_prefix("encoder/")
///     .strip_prefix("encoder/")
///     .add_prefix("encoder/phonologyhs/phonology/");
///
/// let mapped = mapper.map(checkpoint);
/// assert!(mapped.contains_key("encoder/phonologyhs/phonology/blstm/kernel"));
/// assert_eq!(mapped.len(), 1);
/// ```
pub struct CheckpointMapper {
    transformations: Vec<TransformationBox>,
}

impl CheckpointMapper {
    /// Create a new empty mapper
    #[must_use]
    pub fn new() -> Self {
        Self {
            transformations: Vec::new(),
        }
    }

    /// Rename a single variable
    ///
    /// If the name doesn't exist, this operation is a no-op.
    #[must_use]
    pub fn rename(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        let from = from.into();
        let to = to.into();

        self.transformations
            .push(Box::new(move |checkpoint: &mut Checkpoint| {
                if let Some(value) = checkpoint.remove(&from) {
                    checkpoint.insert(to.clone(), value);
                }
            }));
        self
    }

    /// Replace a leading scope on every name that has it
    ///
    /// Example: `rename_prefix("old/", "new/")` changes "old/kernel" to "new/kernel"
    #[must_use]
    pub fn rename_prefix(
        mut self,
        old_prefix: impl Into<String>,
        new_prefix: impl Into<String>,
    ) -> Self {
        let old_prefix = old_prefix.into();
        let new_prefix = new_prefix.into();

        self.transformations
            .push(Box::new(move |checkpoint: &mut Checkpoint| {
                rekey(checkpoint, |name| {
                    name.strip_prefix(&old_prefix)
                        .map(|suffix| format!("{new_prefix}{suffix}"))
                });
            }));
        self
    }

    /// Strip a prefix from every name that has it
    #[must_use]
    pub fn strip_prefix(mut self, prefix: impl Into<String>) -> Self {
        let prefix = prefix.into();

        self.transformations
            .push(Box::new(move |checkpoint: &mut Checkpoint| {
                rekey(checkpoint, |name| name.strip_prefix(&prefix).map(str::to_string));
            }));
        self
    }

    /// Add a prefix to every name
    #[must_use]
    pub fn add_prefix(mut self, prefix: impl Into<String>) -> Self {
        let prefix = prefix.into();

        self.transformations
            .push(Box::new(move |checkpoint: &mut Checkpoint| {
                rekey(checkpoint, |name| Some(format!("{prefix}{name}")));
            }));
        self
    }

    /// Keep only the names starting with `prefix`
    #[must_use]
    pub fn select_prefix(mut self, prefix: impl Into<String>) -> Self {
        let prefix = prefix.into();

        self.transformations
            .push(Box::new(move |checkpoint: &mut Checkpoint| {
                checkpoint.retain(|name, _| name.starts_with(&prefix));
            }));
        self
    }

    /// Drop the names starting with `prefix`
    #[must_use]
    pub fn exclude_prefix(mut self, prefix: impl Into<String>) -> Self {
        let prefix = prefix.into();

        self.transformations
            .push(Box::new(move |checkpoint: &mut Checkpoint| {
                checkpoint.retain(|name, _| !name.starts_with(&prefix));
            }));
        self
    }

    /// Apply all transformations to a checkpoint (in-place)
    pub fn apply(&self, checkpoint: &mut Checkpoint) {
        for transform in &self.transformations {
            transform(checkpoint);
        }
    }

    /// Apply transformations and return the new checkpoint
    #[must_use]
    pub fn map(&self, mut checkpoint: Checkpoint) -> Checkpoint {
        self.apply(&mut checkpoint);
        checkpoint
    }

    pub fn len(&self) -> usize {
        self.transformations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transformations.is_empty()
    }
}

impl Default for CheckpointMapper {
    fn default() -> Self {
        Self::new()
    }
}

/// Rename every variable for which `f` returns a new name
fn rekey(checkpoint: &mut Checkpoint, f: impl Fn(&str) -> Option<String>) {
    let updates: Vec<(String, String)> = checkpoint
        .keys()
        .filter_map(|name| f(name).map(|new_name| (name.clone(), new_name)))
        .collect();

    let mut moved = Vec::with_capacity(updates.len());
    for (old_name, new_name) in updates {
        if let Some(value) = checkpoint.remove(&old_name) {
            moved.push((new_name, value));
        }
    }
    checkpoint.extend(moved);
}

/// Move the variables under `source_scope` to `target_scope`, dropping the rest
///
/// Both scopes are given without a trailing `/`.
#[must_use]
pub fn rescope(checkpoint: Checkpoint, source_scope: &str, target_scope: &str) -> Checkpoint {
    let source = format!("{source_scope}/");
    let target = format!("{target_scope}/");
    CheckpointMapper::new()
        .select_prefix(source.clone())
        .rename_prefix(source, target)
        .map(checkpoint)
}
