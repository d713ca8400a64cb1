// ============================================================
// Layer 3 — Core Traits (Abstractions)
// ============================================================
// The training loop and the representation extractor are
// written against these traits, never against burn types.
//
//   TimelineModel   — forward-only contract: held-out loss,
//                     per-position embeddings, parameter state
//   TrainableModel  — adds one optimizer step per batch
//   Labeler         — supplies (labels, patient_ids, offsets)
//
// Implementations:
//   - ClmbrInference → burn model on a plain backend
//   - ClmbrLearner   → burn model + AdamW on an autodiff backend
//   - SavedLabeler   → labels read from a JSON file
//   - test doubles in the ml layer's unit tests

use crate::domain::batch::{BatchEmbeddings, TimelineBatch};
use crate::domain::query::LabelData;
use crate::error::Result;

// ─── TimelineModel ────────────────────────────────────────────────────────────
pub trait TimelineModel {
    /// Length of every embedding vector
    fn embedding_size(&self) -> usize;

    /// Loss for one batch without gradient tracking or parameter mutation
    fn eval_loss(&self, batch: &TimelineBatch) -> Result<f64>;

    /// Embedding for every (example, position) of the batch
    fn embed(&self, batch: &TimelineBatch) -> Result<BatchEmbeddings>;

    /// Serialize the full parameter state
    fn save_state(&self) -> Result<Vec<u8>>;

    /// Restore a parameter state produced by `save_state`
    fn load_state(&mut self, bytes: Vec<u8>) -> Result<()>;
}

// ─── TrainableModel ───────────────────────────────────────────────────────────
pub trait TrainableModel: TimelineModel {
    /// Number of parameters that receive gradients (frozen ones excluded)
    fn num_trainable_params(&self) -> usize;

    /// Forward, backpropagate and apply one optimizer step at `lr`.
    /// Returns the batch loss measured before the update.
    fn train_step(&mut self, batch: &TimelineBatch, lr: f64) -> Result<f64>;
}

// ─── Labeler ──────────────────────────────────────────────────────────────────
pub trait Labeler {
    fn get_label_data(&self) -> Result<LabelData>;
}
