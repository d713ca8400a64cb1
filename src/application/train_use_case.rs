// ============================================================
// Layer 2 — TrainUseCase
// ============================================================
// Orchestrates a full training run in order:
//
//   Step 1: Validate the config             (Layer 3 - domain)
//   Step 2: Load the timeline extract       (Layer 4 - data)
//   Step 3: Split patients train/val        (Layer 4 - data)
//   Step 4: Build the code vocabulary       (Layer 4 - data)
//   Step 5: Save config.json + info.json    (Layer 6 - infra)
//   Step 6: Build the dataset               (Layer 4 - data)
//   Step 7: Build model + optimizer         (Layer 5 - ml)
//   Step 8: Run the training loop           (Layer 5 - ml)
//
// Reference: Rust Book §13 (Iterators and Closures)
//            Burn Book §5 (Training)

use anyhow::{Context, Result};
use std::{path::PathBuf, sync::Arc};

use crate::data::{
    dataset::TimelineDataset,
    loader::TimelineStore,
    splitter::split_train_val,
    vocab::CodeMap,
};
use crate::domain::config::{ModelConfig, ModelInfo};
use crate::infra::checkpoint::CheckpointManager;
use crate::ml::{
    backend::{default_device, TrainBackend},
    learner::build_learner,
    model::ClmbrModelConfig,
    trainer::{FitSummary, Trainer},
};

/// Everything one training run needs besides the extract itself
#[derive(Debug, Clone)]
pub struct TrainRequest {
    pub timelines:    PathBuf,
    pub config:       ModelConfig,
    /// Fraction of patients held out for validation
    pub val_fraction: f64,
    pub split_seed:   u64,
    pub use_progress: bool,
}

pub struct TrainUseCase {
    request: TrainRequest,
}

impl TrainUseCase {
    pub fn new(request: TrainRequest) -> Self {
        Self { request }
    }

    /// Execute the full training pipeline end to end
    pub fn execute(&self) -> Result<FitSummary> {
        let req = &self.request;
        let cfg = &req.config;

        // ── Step 1: Validate ──────────────────────────────────────────────────
        cfg.validate().context("Invalid model configuration")?;
        if !(0.0..1.0).contains(&req.val_fraction) {
            anyhow::bail!("val_fraction must be in [0, 1), got {}", req.val_fraction);
        }

        // ── Step 2: Load the extract ──────────────────────────────────────────
        let store = TimelineStore::load(&req.timelines)
            .with_context(|| format!("Cannot load timelines from '{}'", req.timelines.display()))?;
        if store.is_empty() {
            anyhow::bail!("No patients in '{}'", req.timelines.display());
        }

        // ── Step 3: Train / validation split ──────────────────────────────────
        let (train, val) = split_train_val(store.patient_ids().to_vec(), req.val_fraction, req.split_seed);
        tracing::info!("Split: {} train, {} validation patients", train.len(), val.len());

        // ── Step 4: Vocabulary from training patients only ────────────────────
        let codes = CodeMap::from_counts(&store.code_counts(&train));
        tracing::info!(
            "Vocabulary: {} codes, {} prediction targets",
            codes.len(),
            cfg.num_first.min(codes.len())
        );

        // ── Step 5: Save config + info for later loading ──────────────────────
        let info = ModelInfo {
            code_map:       codes.to_map(),
            val_fraction:   req.val_fraction,
            split_seed:     req.split_seed,
            train_patients: train.len(),
            val_patients:   val.len(),
        };
        let checkpoints = CheckpointManager::create(&cfg.model_dir)
            .with_context(|| format!("Cannot create model directory '{}'", cfg.model_dir))?;
        checkpoints.save_config(cfg)?;
        checkpoints.save_info(&info)?;
        tracing::info!("Model directory: {}", checkpoints.dir().display());

        // ── Step 6: Dataset ───────────────────────────────────────────────────
        let dataset = TimelineDataset::new(
            Arc::new(store), Arc::new(codes), train, val, cfg.max_days,
        );

        // ── Step 7: Model + AdamW ─────────────────────────────────────────────
        let device  = default_device();
        let layout  = ClmbrModelConfig::from_settings(cfg, &info);
        let mut learner = build_learner::<TrainBackend>(layout, cfg, &device);

        // ── Step 8: Training loop (Layer 5) ───────────────────────────────────
        let summary = Trainer::new(cfg, &checkpoints)
            .fit(&mut learner, &dataset, req.use_progress)
            .context("Training failed")?;

        Ok(summary)
    }
}
