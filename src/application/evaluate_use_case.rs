// ============================================================
// Layer 2 — EvaluateUseCase
// ============================================================
// Re-scores a trained model on the extract it was trained on:
//
//   Step 1: Load model + config + info    (Layer 5 - ml)
//   Step 2: Load the timeline extract     (Layer 4 - data)
//   Step 3: Rebuild the recorded split    (Layer 4 - data)
//   Step 4: Evaluate one split, seed 0    (Layer 5 - ml)

use anyhow::{Context, Result};
use std::{path::PathBuf, sync::Arc};

use crate::data::{dataset::TimelineDataset, loader::TimelineStore};
use crate::infra::checkpoint::CheckpointManager;
use crate::ml::{pretrained::from_pretrained, trainer::Trainer};

pub struct EvaluateUseCase {
    model_dir:   PathBuf,
    timelines:   PathBuf,
    is_val:      bool,
    num_batches: Option<usize>,
}

impl EvaluateUseCase {
    pub fn new(model_dir: PathBuf, timelines: PathBuf, is_val: bool, num_batches: Option<usize>) -> Self {
        Self { model_dir, timelines, is_val, num_batches }
    }

    /// Mean held-out loss of the best checkpoint
    pub fn execute(&self) -> Result<f64> {
        let featurizer = from_pretrained(&self.model_dir)
            .with_context(|| format!("Cannot load model from '{}'", self.model_dir.display()))?;

        let checkpoints = CheckpointManager::open(&self.model_dir);
        if let Ok(best) = checkpoints.load_best_meta() {
            tracing::info!("Best checkpoint: epoch {}, val loss {:.6}", best.epoch, best.val_loss);
        }

        let store = TimelineStore::load(&self.timelines)
            .with_context(|| format!("Cannot load timelines from '{}'", self.timelines.display()))?;

        // Same extract + same seed → same split as during training
        let info = featurizer.info();
        let dataset = TimelineDataset::split(
            Arc::new(store),
            featurizer.codes(),
            info.val_fraction,
            info.split_seed,
            featurizer.config().max_days,
        );

        let loss = Trainer::new(featurizer.config(), &checkpoints)
            .evaluate(featurizer.model(), &dataset, self.is_val, self.num_batches)?;
        Ok(loss)
    }
}
