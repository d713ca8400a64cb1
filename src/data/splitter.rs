// ============================================================
// Layer 4 — Train/Validation Patient Splitter
// ============================================================
// Shuffles patient ids with a seeded RNG and splits them into:
//   - Training patients:   used for optimizer steps
//   - Validation patients: used for model selection ("best")
//
// The seed is stored in info.json so the same split can be
// rebuilt when a trained model is evaluated again later.
//
// Uses Fisher-Yates shuffle via rand::seq::SliceRandom.
//
// Reference: rand crate documentation

use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};

/// Shuffle `items` with `seed` and split into (train, validation).
///
/// `val_fraction` of the items (rounded) go to validation.
pub fn split_train_val<T>(mut items: Vec<T>, val_fraction: f64, seed: u64) -> (Vec<T>, Vec<T>) {
    let mut rng = StdRng::seed_from_u64(seed);
    items.shuffle(&mut rng);

    let total    = items.len();
    let n_val    = ((total as f64) * val_fraction).round() as usize;
    let split_at = total - n_val.min(total);

    // split_off(n) leaves [0..n] in `items` and returns [n..]
    let val = items.split_off(split_at);

    tracing::debug!("Patient split: {} training, {} validation", items.len(), val.len());

    (items, val)
}
