// ============================================================
// Layer 5 — Pretrained Loader
// ============================================================
// Rebuilds a Featurizer from a trained model directory:
//
//   config.json ─┐
//   info.json  ──┼──► ClmbrModelConfig ──► ClmbrInference::new
//   best ────────┘                             │
//                                              ▼
//                                   load_state + shape check
//
// Missing or malformed config/info → Config error;
// missing, undecodable or wrongly-shaped `best` → Checkpoint error.

use std::path::Path;

use burn::prelude::Backend;

use crate::domain::traits::TimelineModel;
use crate::error::Result;
use crate::infra::checkpoint::CheckpointManager;
use crate::ml::{
    backend::{default_device, InferBackend},
    featurizer::Featurizer,
    learner::ClmbrInference,
    model::ClmbrModelConfig,
};

/// Load the best checkpoint of `model_dir` onto `device`
pub fn load_pretrained<B: Backend>(
    model_dir: impl AsRef<Path>,
    device:    &B::Device,
) -> Result<Featurizer<ClmbrInference<B>>> {
    let checkpoints = CheckpointManager::open(model_dir.as_ref());

    let config = checkpoints.load_config()?;
    config.validate()?;
    let info = checkpoints.load_info()?;

    let layout = ClmbrModelConfig::from_settings(&config, &info);
    let mut model = ClmbrInference::<B>::new(layout, device);
    model.load_state(checkpoints.load_best()?)?;

    tracing::info!(
        "Loaded model from '{}' ({} codes, size {})",
        model_dir.as_ref().display(),
        info.num_codes(),
        config.size
    );
    Ok(Featurizer::new(model, config, info))
}

/// `load_pretrained` on the accelerator when one is available
pub fn from_pretrained(model_dir: impl AsRef<Path>) -> Result<Featurizer<ClmbrInference<InferBackend>>> {
    let model_dir = model_dir.as_ref();
    load_pretrained::<InferBackend>(model_dir, &default_device()).inspect_err(|e| {
        if e.is_load_error() {
            tracing::warn!("'{}' does not hold a loadable model", model_dir.display());
        }
    })
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::loader::TimelineStore;
    use crate::domain::{
        config::{ModelConfig, ModelInfo},
        timeline::{Day, PatientTimeline},
    };
    use crate::error::ClmbrError;
    use crate::infra::checkpoint::CheckpointMeta;
    use burn::backend::NdArray;
    use std::{collections::BTreeMap, sync::Arc};

    type B = NdArray;

    fn config() -> ModelConfig {
        ModelConfig {
            size:            8,
            num_heads:       2,
            num_layers:      1,
            num_first:       2,
            max_days:        16,
            eval_batch_size: 4,
            dropout:         0.0,
            ..ModelConfig::default()
        }
    }

    fn info() -> ModelInfo {
        ModelInfo {
            code_map:       BTreeMap::from([(10, 0), (20, 1), (30, 2)]),
            val_fraction:   0.5,
            split_seed:     1,
            train_patients: 1,
            val_patients:   1,
        }
    }

    /// A model directory holding freshly initialised parameters
    fn model_dir(cfg: &ModelConfig, info: &ModelInfo) -> tempfile::TempDir {
        let tmp  = tempfile::tempdir().unwrap();
        let ckpt = CheckpointManager::create(tmp.path()).unwrap();
        ckpt.save_config(cfg).unwrap();
        ckpt.save_info(info).unwrap();
        let layout = ClmbrModelConfig::from_settings(cfg, info);
        let state  = ClmbrInference::<B>::new(layout, &Default::default()).save_state().unwrap();
        ckpt.save_best(&state, &CheckpointMeta { epoch: 0, val_loss: 1.0 }).unwrap();
        tmp
    }

    #[test]
    fn test_single_query_has_embedding_size() {
        let dir = model_dir(&config(), &info());
        let featurizer = load_pretrained::<B>(dir.path(), &Default::default()).unwrap();

        let store = Arc::new(
            TimelineStore::from_timelines(vec![PatientTimeline::new(
                42,
                vec![Day::new(0, vec![10, 20]), Day::new(1, vec![30]), Day::new(2, vec![10])],
            )])
            .unwrap(),
        );
        let out = featurizer.featurize_patients(store, &[42], &[1]).unwrap();
        assert_eq!(out.rows(), 1);
        assert_eq!(out.row(0).len(), config().size);
        assert!(!out.is_zero_row(0));
    }

    #[test]
    fn test_missing_config_is_config_error() {
        let tmp = tempfile::tempdir().unwrap();
        let err = load_pretrained::<B>(tmp.path(), &Default::default()).err().unwrap();
        assert!(matches!(err, ClmbrError::Config(_)));
        assert!(err.is_load_error());
    }

    #[test]
    fn test_missing_best_is_checkpoint_error() {
        let dir = model_dir(&config(), &info());
        std::fs::remove_file(dir.path().join("best")).unwrap();
        let err = load_pretrained::<B>(dir.path(), &Default::default()).err().unwrap();
        assert!(matches!(err, ClmbrError::Checkpoint(_)));
    }

    #[test]
    fn test_config_disagreeing_with_checkpoint_is_checkpoint_error() {
        let dir = model_dir(&config(), &info());
        // overwrite config.json with a wider model than the one saved
        let wider = ModelConfig { size: 16, ..config() };
        CheckpointManager::open(dir.path()).save_config(&wider).unwrap();
        let err = load_pretrained::<B>(dir.path(), &Default::default()).err().unwrap();
        assert!(matches!(err, ClmbrError::Checkpoint(_)));
    }
}
