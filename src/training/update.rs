use crate::model::variables::VariableStore;

/// Gradients are clipped to this magnitude before they are applied
pub const GRADIENT_CLIP: f32 = 1.0;

/// Clip every gradient element to `[-GRADIENT_CLIP, GRADIENT_CLIP]`
///
/// Returns the number of clipped elements. NaN entries are left as they are.
pub fn clip_gradients(gradients: &mut [f32]) -> usize {
    let mut clipped = 0;
    for g in gradients.iter_mut() {
        if g.abs() > GRADIENT_CLIP {
            *g = g.clamp(-GRADIENT_CLIP, GRADIENT_CLIP);
            clipped += 1;
        }
    }
    clipped
}

/// Variables the optimizer may update
///
/// Hot-started variables restored with `trainable = False` are excluded.
pub fn trainable_variables(store: &VariableStore) -> Vec<&str> {
    store.trainable_names()
}
