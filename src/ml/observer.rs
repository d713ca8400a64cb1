// ============================================================
// Layer 5 — Training Observers
// ============================================================
// The training loop reports progress through TrainingObserver
// and never prints on its own.
//
//   LogObserver          — tracing lines only; a "Seen batch"
//                          line every LOG_EVERY_BATCHES batches
//   ProgressBarObserver  — one indicatif bar per epoch, plus the
//                          same per-epoch tracing summary
//
// The CLI's --no-progress flag picks between the two.
// extraction_bar is the single bar drawn while featurizing.

use indicatif::{ProgressBar, ProgressStyle};

use crate::infra::metrics::EpochLosses;

/// Training batches between "Seen batch" log lines
pub const LOG_EVERY_BATCHES: usize = 2000;

pub trait TrainingObserver {
    fn on_training_start(&mut self, _epochs: usize, _batches_per_epoch: usize) {}
    fn on_epoch_start(&mut self, _epoch: usize) {}
    /// `batch` counts from 0 within the epoch
    fn on_batch_progress(&mut self, _epoch: usize, _batch: usize) {}
    fn on_evaluation_start(&mut self, _epoch: usize) {}
    fn on_epoch_end(&mut self, _losses: &EpochLosses, _is_best: bool) {}
    fn on_training_end(&mut self) {}
}

fn log_epoch_end(losses: &EpochLosses, is_best: bool) {
    tracing::info!(
        "Epoch {} | train loss {:.6} | val loss {:.6}{}",
        losses.epoch,
        losses.train_loss,
        losses.val_loss,
        if is_best { " | new best" } else { "" },
    );
}

// ─── LogObserver ──────────────────────────────────────────────────────────────
#[derive(Debug, Default)]
pub struct LogObserver;

impl TrainingObserver for LogObserver {
    fn on_training_start(&mut self, epochs: usize, batches_per_epoch: usize) {
        tracing::info!("Training {} epochs of {} batches", epochs, batches_per_epoch);
    }

    fn on_epoch_start(&mut self, epoch: usize) {
        tracing::info!("About to start epoch {}", epoch);
    }

    fn on_batch_progress(&mut self, _epoch: usize, batch: usize) {
        if batch % LOG_EVERY_BATCHES == 0 {
            tracing::info!("Seen batch {}", batch);
        }
    }

    fn on_evaluation_start(&mut self, epoch: usize) {
        tracing::info!("Evaluating epoch {}", epoch);
    }

    fn on_epoch_end(&mut self, losses: &EpochLosses, is_best: bool) {
        log_epoch_end(losses, is_best);
    }

    fn on_training_end(&mut self) {
        tracing::info!("Training complete!");
    }
}

/// Prefix shown on the featurization bar
pub const EXTRACTION_PREFIX: &str = "Computing patient representations";

/// Bar over the batches of one extraction pass
pub fn extraction_bar(batches: usize) -> ProgressBar {
    let bar = ProgressBar::new(batches as u64);
    let style = ProgressStyle::default_bar()
        .template("  {prefix} {bar:30.cyan/black} {pos}/{len} [{elapsed}<{eta}]")
        .unwrap_or_else(|_| ProgressStyle::default_bar());
    bar.set_style(style);
    bar.set_prefix(EXTRACTION_PREFIX);
    bar
}

// ─── ProgressBarObserver ──────────────────────────────────────────────────────
#[derive(Default)]
pub struct ProgressBarObserver {
    epochs:            usize,
    batches_per_epoch: usize,
    bar:               Option<ProgressBar>,
}

impl ProgressBarObserver {
    pub fn new() -> Self {
        Self::default()
    }

    fn finish_bar(&mut self) {
        if let Some(bar) = self.bar.take() {
            bar.finish_and_clear();
        }
    }
}

impl TrainingObserver for ProgressBarObserver {
    fn on_training_start(&mut self, epochs: usize, batches_per_epoch: usize) {
        self.epochs = epochs;
        self.batches_per_epoch = batches_per_epoch;
    }

    fn on_epoch_start(&mut self, epoch: usize) {
        self.finish_bar();
        let bar = ProgressBar::new(self.batches_per_epoch as u64);
        let style = ProgressStyle::default_bar()
            .template("  {prefix} {bar:30.green/black} {pos}/{len} [{elapsed}<{eta}] {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar());
        bar.set_style(style);
        bar.set_prefix(format!("epoch {}/{}", epoch + 1, self.epochs));
        self.bar = Some(bar);
    }

    fn on_batch_progress(&mut self, _epoch: usize, _batch: usize) {
        if let Some(bar) = &self.bar {
            bar.inc(1);
        }
    }

    fn on_evaluation_start(&mut self, _epoch: usize) {
        if let Some(bar) = &self.bar {
            bar.set_message("evaluating");
        }
    }

    fn on_epoch_end(&mut self, losses: &EpochLosses, is_best: bool) {
        self.finish_bar();
        log_epoch_end(losses, is_best);
    }

    fn on_training_end(&mut self) {
        self.finish_bar();
        tracing::info!("Training complete!");
    }
}
