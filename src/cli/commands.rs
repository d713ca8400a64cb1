// ============================================================
// Layer 1 — CLI Commands and Arguments
// ============================================================
// Defines the three subcommands: `train`, `evaluate` and
// `featurize`, and all their configurable flags.
//
// Hyperparameter flags are optional: each one that is given
// overrides the value from --config (if any), which in turn
// overrides the built-in defaults.
//
//   defaults  <  --config file  <  command-line flags
//
// Reference: Rust Book §12 (Building a CLI Program)

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use std::{fs, path::PathBuf};

use crate::application::train_use_case::TrainRequest;
use crate::domain::config::ModelConfig;

/// The top-level subcommands available to the user
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Train a model on a timeline extract
    Train(TrainArgs),

    /// Report the held-out loss of a trained model
    Evaluate(EvaluateArgs),

    /// Write representations for every row of a label file
    Featurize(FeaturizeArgs),
}

/// All arguments for the `train` command
#[derive(Args, Debug)]
pub struct TrainArgs {
    /// JSON-lines patient extract
    #[arg(long)]
    pub timelines: PathBuf,

    /// Output directory for config, info, best checkpoint and losses
    #[arg(long)]
    pub model_dir: Option<String>,

    /// JSON file with model hyperparameters (partial files allowed)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Fraction of patients held out for validation
    #[arg(long, default_value_t = 0.1)]
    pub val_fraction: f64,

    /// Seed for the train/validation patient split
    #[arg(long, default_value_t = 3451235)]
    pub split_seed: u64,

    /// Log every 2000 batches instead of drawing a progress bar
    #[arg(long)]
    pub no_progress: bool,

    /// Peak learning rate of the warmup-linear schedule
    #[arg(long)]
    pub lr: Option<f64>,

    /// Patients per training batch
    #[arg(long)]
    pub batch_size: Option<usize>,

    /// Patients per evaluation batch
    #[arg(long)]
    pub eval_batch_size: Option<usize>,

    /// Epochs trained (one warmup-linear cycle)
    #[arg(long)]
    pub epochs_per_cycle: Option<usize>,

    /// Epochs of linear warmup within the cycle
    #[arg(long)]
    pub warmup_epochs: Option<f64>,

    /// AdamW β1
    #[arg(long)]
    pub b1: Option<f64>,

    /// AdamW β2
    #[arg(long)]
    pub b2: Option<f64>,

    /// AdamW ε
    #[arg(long)]
    pub e: Option<f64>,

    /// Decoupled weight decay
    #[arg(long)]
    pub l2: Option<f64>,

    /// Probability of dropping a whole day from a training window
    #[arg(long)]
    pub day_dropout: Option<f64>,

    /// Probability of dropping a single input code
    #[arg(long)]
    pub code_dropout: Option<f64>,

    /// Number of most frequent codes used as prediction targets
    #[arg(long)]
    pub num_first: Option<usize>,

    /// Embedding size; must be divisible by num_heads
    #[arg(long)]
    pub size: Option<usize>,

    #[arg(long)]
    pub num_heads: Option<usize>,

    #[arg(long)]
    pub num_layers: Option<usize>,

    /// Dropout inside the encoder blocks
    #[arg(long)]
    pub dropout: Option<f64>,

    /// Longest window of days fed to the model
    #[arg(long)]
    pub max_days: Option<usize>,

    /// Batches per split used for each held-out loss
    #[arg(long)]
    pub eval_batches: Option<usize>,
}

impl TrainArgs {
    /// Layer the given flags over `base`
    pub fn apply(&self, base: ModelConfig) -> ModelConfig {
        ModelConfig {
            model_dir:        self.model_dir.clone().unwrap_or(base.model_dir),
            lr:               self.lr.unwrap_or(base.lr),
            batch_size:       self.batch_size.unwrap_or(base.batch_size),
            eval_batch_size:  self.eval_batch_size.unwrap_or(base.eval_batch_size),
            epochs_per_cycle: self.epochs_per_cycle.unwrap_or(base.epochs_per_cycle),
            warmup_epochs:    self.warmup_epochs.unwrap_or(base.warmup_epochs),
            b1:               self.b1.unwrap_or(base.b1),
            b2:               self.b2.unwrap_or(base.b2),
            e:                self.e.unwrap_or(base.e),
            l2:               self.l2.unwrap_or(base.l2),
            day_dropout:      self.day_dropout.unwrap_or(base.day_dropout),
            code_dropout:     self.code_dropout.unwrap_or(base.code_dropout),
            num_first:        self.num_first.unwrap_or(base.num_first),
            size:             self.size.unwrap_or(base.size),
            num_heads:        self.num_heads.unwrap_or(base.num_heads),
            num_layers:       self.num_layers.unwrap_or(base.num_layers),
            dropout:          self.dropout.unwrap_or(base.dropout),
            max_days:         self.max_days.unwrap_or(base.max_days),
            eval_batches:     self.eval_batches.unwrap_or(base.eval_batches),
        }
    }
}

/// Convert CLI TrainArgs into the application-layer TrainRequest.
/// Fallible because --config names a file that has to be read;
/// the application layer never sees clap types.
impl TryFrom<TrainArgs> for TrainRequest {
    type Error = anyhow::Error;

    fn try_from(a: TrainArgs) -> Result<Self> {
        let base = match &a.config {
            Some(path) => {
                let json = fs::read_to_string(path)
                    .with_context(|| format!("Cannot read config '{}'", path.display()))?;
                serde_json::from_str(&json)
                    .with_context(|| format!("Malformed config '{}'", path.display()))?
            }
            None => ModelConfig::default(),
        };

        Ok(TrainRequest {
            config:       a.apply(base),
            timelines:    a.timelines,
            val_fraction: a.val_fraction,
            split_seed:   a.split_seed,
            use_progress: !a.no_progress,
        })
    }
}

/// All arguments for the `evaluate` command
#[derive(Args, Debug)]
pub struct EvaluateArgs {
    /// Directory written by `train`
    #[arg(long)]
    pub model_dir: PathBuf,

    /// The extract the model was trained on
    #[arg(long)]
    pub timelines: PathBuf,

    /// Score the training split instead of the validation split
    #[arg(long)]
    pub train_split: bool,

    /// Cap on the number of batches (whole split when omitted)
    #[arg(long)]
    pub num_batches: Option<usize>,
}

/// All arguments for the `featurize` command
#[derive(Args, Debug)]
pub struct FeaturizeArgs {
    /// Directory written by `train`
    #[arg(long)]
    pub model_dir: PathBuf,

    /// JSON-lines patient extract
    #[arg(long)]
    pub timelines: PathBuf,

    /// JSON file with parallel labels / patient_ids / day_offsets
    #[arg(long)]
    pub labels: PathBuf,

    /// Output JSON-lines file, one row per label
    #[arg(long)]
    pub output: PathBuf,
}
