// ============================================================
// Layer 5 — Training Loop
// ============================================================
// Drives a TrainableModel over a BatchSource for one
// warmup-linear cycle:
//
//   for epoch in 0..epochs_per_cycle:
//     1. train     — fresh random seed, dropout on, one
//                    optimizer step per batch at the scheduled lr
//     2. evaluate  — seed 0, configured dropout, at most eval_batches
//                    batches of the train split and the val split
//     3. log       — append + flush the epoch block to `losses`
//     4. best      — if val loss strictly beats every earlier
//                    epoch, replace `best` (tmp file + rename)
//
// Training seeds differ per epoch; evaluation always uses seed 0
// so two evaluations of the same parameters agree.
//
// Any error from the batch source or the model aborts fit. The
// loss log and the batch loader are both released by Drop, so
// the blocks of finished epochs stay on disk.
//
// Reference: Burn Book §5, Kingma & Ba (2015) Adam

use rand::Rng;

use crate::data::stream::{BatchSource, LoaderOptions};
use crate::domain::{
    config::ModelConfig,
    traits::{TimelineModel, TrainableModel},
};
use crate::error::Result;
use crate::infra::{
    checkpoint::{CheckpointManager, CheckpointMeta},
    metrics::{EpochLosses, LossLog},
};
use crate::ml::{
    observer::{LogObserver, ProgressBarObserver, TrainingObserver},
    schedule::WarmupLinear,
};

/// Seed used for every held-out evaluation pass
pub const EVAL_SEED: u64 = 0;

/// What a finished fit produced
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FitSummary {
    pub epochs: Vec<EpochLosses>,
    /// The epoch whose parameters are in `best`
    pub best:   Option<CheckpointMeta>,
}

impl FitSummary {
    pub fn best_val_loss(&self) -> Option<f64> {
        self.best.map(|b| b.val_loss)
    }
}

pub struct Trainer<'a> {
    config:      &'a ModelConfig,
    checkpoints: &'a CheckpointManager,
}

impl<'a> Trainer<'a> {
    pub fn new(config: &'a ModelConfig, checkpoints: &'a CheckpointManager) -> Self {
        Self { config, checkpoints }
    }

    /// Train for `epochs_per_cycle` epochs, reporting through a progress
    /// bar or through periodic log lines.
    pub fn fit<M, D>(&self, model: &mut M, dataset: &D, use_progress: bool) -> Result<FitSummary>
    where
        M: TrainableModel,
        D: BatchSource,
    {
        if use_progress {
            self.fit_with_observer(model, dataset, &mut ProgressBarObserver::new())
        } else {
            self.fit_with_observer(model, dataset, &mut LogObserver)
        }
    }

    pub fn fit_with_observer<M, D>(
        &self,
        model:    &mut M,
        dataset:  &D,
        observer: &mut dyn TrainingObserver,
    ) -> Result<FitSummary>
    where
        M: TrainableModel,
        D: BatchSource,
    {
        let cfg = self.config;
        let batches_per_epoch = dataset.num_batches(cfg.batch_size, false);
        let total_steps = batches_per_epoch * cfg.epochs_per_cycle;
        let mut schedule = WarmupLinear::new(cfg.lr, cfg.warmup_fraction(), total_steps);

        tracing::info!("Trainable parameters = {}", model.num_trainable_params());
        tracing::info!("Batches per epoch = {}", batches_per_epoch);
        tracing::info!("Total batches = {}", total_steps);

        let mut loss_log = LossLog::create(self.checkpoints.losses_path())?;
        let mut summary  = FitSummary::default();
        tracing::info!("Writing losses to '{}'", loss_log.path().display());

        observer.on_training_start(cfg.epochs_per_cycle, batches_per_epoch);

        for epoch in 0..cfg.epochs_per_cycle {
            observer.on_epoch_start(epoch);
            self.train_epoch(model, dataset, &mut schedule, epoch, observer)?;

            observer.on_evaluation_start(epoch);
            let train_loss = self.evaluate(model, dataset, false, Some(cfg.eval_batches))?;
            let val_loss   = self.evaluate(model, dataset, true, Some(cfg.eval_batches))?;
            let losses = EpochLosses::new(epoch, train_loss, val_loss);

            loss_log.append(&losses)?;

            let is_best = losses.improves_on(summary.best_val_loss());
            if is_best {
                let meta = CheckpointMeta { epoch, val_loss };
                self.checkpoints.save_best(&model.save_state()?, &meta)?;
                summary.best = Some(meta);
            }

            observer.on_epoch_end(&losses, is_best);
            summary.epochs.push(losses);
        }

        observer.on_training_end();
        tracing::debug!("Optimizer steps taken: {}", schedule.steps_taken());
        Ok(summary)
    }

    fn train_epoch<M, D>(
        &self,
        model:    &mut M,
        dataset:  &D,
        schedule: &mut WarmupLinear,
        epoch:    usize,
        observer: &mut dyn TrainingObserver,
    ) -> Result<()>
    where
        M: TrainableModel,
        D: BatchSource,
    {
        let cfg  = self.config;
        let seed = rand::thread_rng().gen_range(0..100_000);
        let options = LoaderOptions::new(false, cfg.batch_size, seed, cfg.num_first)
            .with_dropout(cfg.day_dropout, cfg.code_dropout);

        let loader = dataset.loader(&options)?;
        for (i, batch) in loader.iter().enumerate() {
            let batch = batch?;
            let lr = schedule.next_lr();
            model.train_step(&batch, lr)?;
            observer.on_batch_progress(epoch, i);
        }
        Ok(())
    }

    /// Mean loss over at most `num_batches` batches of one split
    /// (the whole split when None), without touching parameters.
    /// Returns NaN when the split yields no batches.
    pub fn evaluate<M, D>(
        &self,
        model:       &M,
        dataset:     &D,
        is_val:      bool,
        num_batches: Option<usize>,
    ) -> Result<f64>
    where
        M: TimelineModel,
        D: BatchSource,
    {
        let cfg = self.config;
        let limit = num_batches.unwrap_or_else(|| dataset.num_batches(cfg.eval_batch_size, is_val));
        let options = LoaderOptions::new(is_val, cfg.eval_batch_size, EVAL_SEED, cfg.num_first)
            .with_dropout(cfg.day_dropout, cfg.code_dropout);

        let loader = dataset.loader(&options)?;
        let mut total = 0.0f64;
        let mut seen  = 0usize;
        for batch in loader.iter().take(limit) {
            total += model.eval_loss(&batch?)?;
            seen  += 1;
        }

        if seen == 0 {
            tracing::warn!(
                "No {} batches to evaluate",
                if is_val { "validation" } else { "training" }
            );
            return Ok(f64::NAN);
        }
        Ok(total / seen as f64)
    }
}
