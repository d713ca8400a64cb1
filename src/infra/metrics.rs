// ============================================================
// Layer 6 — Loss Log
// ============================================================
// Records the held-out losses of every epoch in {model_dir}/losses.
//
// The file is truncated when training starts and one block is
// appended (and flushed) per finished epoch:
//
//   Epoch 0
//   Train loss 3.1245
//   Val loss 3.0892
//
//   Epoch 1
//   ...
//
// Because each block is flushed before the next epoch starts, a
// run that dies in epoch k still leaves blocks 0..k-1 readable.
//
// How to read the log:
//   - Both losses should fall over the cycle
//   - Val loss rising while train loss falls → overfitting
//
// Reference: Rust Book §12 (I/O and File Handling)

use serde::{Deserialize, Serialize};
use std::{
    fs::{self, File},
    io::{self, BufWriter, Write},
    path::{Path, PathBuf},
};

use crate::error::{ClmbrError, Result};

/// Held-out losses for one epoch
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EpochLosses {
    /// Epoch number (starts at 0)
    pub epoch: usize,

    /// Mean loss over up to eval_batches training batches
    pub train_loss: f64,

    /// Mean loss over up to eval_batches validation batches
    pub val_loss: f64,
}

impl EpochLosses {
    pub fn new(epoch: usize, train_loss: f64, val_loss: f64) -> Self {
        Self { epoch, train_loss, val_loss }
    }

    /// True if this epoch strictly beats the best val loss so far.
    /// The first epoch (no best yet) always qualifies.
    pub fn improves_on(&self, best_val_loss: Option<f64>) -> bool {
        best_val_loss.map_or(true, |best| self.val_loss < best)
    }
}

/// Append-only writer for the losses file
pub struct LossLog {
    path:   PathBuf,
    writer: BufWriter<File>,
}

impl LossLog {
    /// Create (or truncate) the log at `path`
    pub fn create(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let file = File::create(&path)?;
        tracing::debug!("Opened loss log '{}'", path.display());
        Ok(Self { path, writer: BufWriter::new(file) })
    }

    /// Append one epoch block and flush it to disk
    pub fn append(&mut self, losses: &EpochLosses) -> Result<()> {
        writeln!(self.writer, "Epoch {}", losses.epoch)?;
        writeln!(self.writer, "Train loss {}", losses.train_loss)?;
        writeln!(self.writer, "Val loss {}", losses.val_loss)?;
        writeln!(self.writer)?;
        self.writer.flush()?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Parse a losses file back into per-epoch records
    pub fn read(path: impl AsRef<Path>) -> Result<Vec<EpochLosses>> {
        let text = fs::read_to_string(path.as_ref())?;
        let mut out = Vec::new();
        let mut lines = text.lines().filter(|l| !l.trim().is_empty());

        while let Some(line) = lines.next() {
            let epoch = field(line, "Epoch ")?;
            let train = field(lines.next().unwrap_or_default(), "Train loss ")?;
            let val   = field(lines.next().unwrap_or_default(), "Val loss ")?;
            out.push(EpochLosses::new(epoch, train, val));
        }
        Ok(out)
    }
}

fn field<T: std::str::FromStr>(line: &str, prefix: &str) -> Result<T> {
    line.strip_prefix(prefix)
        .and_then(|v| v.trim().parse().ok())
        .ok_or_else(|| {
            ClmbrError::Io(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("malformed loss log line '{line}', expected '{prefix}<value>'"),
            ))
        })
}
