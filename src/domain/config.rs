// ============================================================
// Layer 3 — Model Configuration and Metadata
// ============================================================
// Two JSON files live next to every trained model:
//
//   config.json — ModelConfig: hyperparameters. Immutable once
//                 training starts; read by the training loop
//                 and by the representation extractor.
//   info.json   — ModelInfo: facts derived from the training
//                 extract (code vocabulary, patient split).
//
// Every ModelConfig field has a serde default so a partial
// config.json (e.g. only {"size": 128}) is still valid.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::{ClmbrError, Result};

/// Number of batches used for each held-out loss estimate
pub const DEFAULT_EVAL_BATCHES: usize = 2000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Directory holding config.json, info.json, best, losses
    pub model_dir:        String,
    pub lr:               f64,
    /// Patients per training batch
    pub batch_size:       usize,
    /// Patients per evaluation / extraction batch
    pub eval_batch_size:  usize,
    /// Epochs in one warmup-linear cycle (= epochs trained by fit)
    pub epochs_per_cycle: usize,
    pub warmup_epochs:    f64,
    pub b1:               f64,
    pub b2:               f64,
    pub e:                f64,
    /// Decoupled weight decay
    pub l2:               f64,
    pub day_dropout:      f64,
    pub code_dropout:     f64,
    /// Codes with dense index below this are prediction targets
    pub num_first:        usize,
    /// Embedding size
    pub size:             usize,
    pub num_heads:        usize,
    pub num_layers:       usize,
    pub dropout:          f64,
    /// Longest window of days fed to the model
    pub max_days:         usize,
    pub eval_batches:     usize,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            model_dir:        "model".to_string(),
            lr:               1e-3,
            batch_size:       32,
            eval_batch_size:  64,
            epochs_per_cycle: 10,
            warmup_epochs:    1.0,
            b1:               0.9,
            b2:               0.999,
            e:                1e-8,
            l2:               0.01,
            day_dropout:      0.2,
            code_dropout:     0.2,
            num_first:        1000,
            size:             256,
            num_heads:        8,
            num_layers:       2,
            dropout:          0.1,
            max_days:         512,
            eval_batches:     DEFAULT_EVAL_BATCHES,
        }
    }
}

impl ModelConfig {
    /// Reject configurations the model or the schedule cannot use
    pub fn validate(&self) -> Result<()> {
        let positive = [
            ("batch_size", self.batch_size),
            ("eval_batch_size", self.eval_batch_size),
            ("epochs_per_cycle", self.epochs_per_cycle),
            ("num_first", self.num_first),
            ("size", self.size),
            ("num_heads", self.num_heads),
            ("num_layers", self.num_layers),
            ("max_days", self.max_days),
        ];
        if let Some((name, _)) = positive.iter().find(|(_, v)| *v == 0) {
            return Err(ClmbrError::Config(format!("'{name}' must be greater than zero")));
        }
        if self.size % self.num_heads != 0 {
            return Err(ClmbrError::Config(format!(
                "size ({}) must be divisible by num_heads ({})",
                self.size, self.num_heads
            )));
        }
        for (name, p) in [
            ("day_dropout", self.day_dropout),
            ("code_dropout", self.code_dropout),
            ("dropout", self.dropout),
        ] {
            if !(0.0..1.0).contains(&p) {
                return Err(ClmbrError::Config(format!("'{name}' must be in [0, 1), got {p}")));
            }
        }
        if self.warmup_epochs < 0.0 || self.warmup_epochs > self.epochs_per_cycle as f64 {
            return Err(ClmbrError::Config(format!(
                "warmup_epochs ({}) must lie within [0, epochs_per_cycle = {}]",
                self.warmup_epochs, self.epochs_per_cycle
            )));
        }
        if self.lr.is_nan() || self.lr <= 0.0 {
            return Err(ClmbrError::Config(format!("lr must be positive, got {}", self.lr)));
        }
        Ok(())
    }

    /// Fraction of total steps spent warming up
    pub fn warmup_fraction(&self) -> f64 {
        self.warmup_epochs / self.epochs_per_cycle as f64
    }
}

/// Metadata derived from the training extract
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelInfo {
    /// Raw code → dense index, dense 0 being the most frequent code
    pub code_map:       BTreeMap<u32, u32>,
    pub val_fraction:   f64,
    pub split_seed:     u64,
    pub train_patients: usize,
    pub val_patients:   usize,
}

impl ModelInfo {
    /// Size of the dense input vocabulary (excluding padding)
    pub fn num_codes(&self) -> usize {
        self.code_map.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_config_uses_defaults() {
        let cfg: ModelConfig = serde_json::from_str(r#"{"size": 64, "num_heads": 4}"#).unwrap();
        assert_eq!(cfg.size, 64);
        assert_eq!(cfg.num_heads, 4);
        assert_eq!(cfg.eval_batches, DEFAULT_EVAL_BATCHES);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_indivisible_heads() {
        let cfg = ModelConfig { size: 30, num_heads: 4, ..ModelConfig::default() };
        assert!(matches!(cfg.validate(), Err(ClmbrError::Config(_))));
    }

    #[test]
    fn test_validate_rejects_warmup_longer_than_cycle() {
        let cfg = ModelConfig { warmup_epochs: 11.0, epochs_per_cycle: 10, ..ModelConfig::default() };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_dropout_of_one() {
        let cfg = ModelConfig { day_dropout: 1.0, ..ModelConfig::default() };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_warmup_fraction() {
        let cfg = ModelConfig { warmup_epochs: 2.0, epochs_per_cycle: 8, ..ModelConfig::default() };
        assert!((cfg.warmup_fraction() - 0.25).abs() < 1e-12);
    }

    #[test]
    fn test_info_integer_keys_survive_json() {
        let info = ModelInfo {
            code_map:       [(120, 0), (7, 1)].into_iter().collect(),
            val_fraction:   0.1,
            split_seed:     3,
            train_patients: 9,
            val_patients:   1,
        };
        let back: ModelInfo = serde_json::from_str(&serde_json::to_string(&info).unwrap()).unwrap();
        assert_eq!(back, info);
        assert_eq!(back.num_codes(), 2);
    }
}
