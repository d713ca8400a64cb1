// ============================================================
// Layer 6 — Checkpoint Manager
// ============================================================
// Owns the layout of a model directory:
//
//   {model_dir}/
//     config.json     ← ModelConfig, written before training
//     info.json       ← ModelInfo (code map, patient split)
//     best            ← parameter state of the best epoch so far
//     best.json       ← which epoch that was and its val loss
//     losses          ← human-readable per-epoch loss log
//     checkpoints/    ← created for per-cycle snapshots, unused by fit
//
// `best` and `best.json` are only ever replaced whole. Both are
// first staged as synced .tmp files; only then is best.json
// renamed into place, followed by best. A failed write leaves
// the previous pair untouched. A crash between the two renames
// leaves the new best.json next to the previous best, so
// best.json may name a newer epoch than the bytes in best.
//
// The parameter bytes themselves are opaque here; the ml layer
// produces and consumes them through TimelineModel.

use serde::{Deserialize, Serialize};
use std::{
    fs::{self, File},
    io::Write,
    path::{Path, PathBuf},
};

use crate::domain::config::{ModelConfig, ModelInfo};
use crate::error::{ClmbrError, Result};

const CONFIG_FILE: &str = "config.json";
const INFO_FILE: &str = "info.json";
const BEST_FILE: &str = "best";
const BEST_META_FILE: &str = "best.json";
const LOSSES_FILE: &str = "losses";
const CHECKPOINT_DIR: &str = "checkpoints";

/// Which epoch produced the saved best parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CheckpointMeta {
    pub epoch:    usize,
    pub val_loss: f64,
}

/// Reads and writes the files of one model directory.
pub struct CheckpointManager {
    dir: PathBuf,
}

impl CheckpointManager {
    /// Prepare a model directory for training.
    /// Creates the directory and its checkpoints/ subdirectory.
    pub fn create(dir: impl Into<PathBuf>) -> Result<Self> {
        let manager = Self { dir: dir.into() };
        // create_dir_all is a no-op for directories that already exist
        fs::create_dir_all(manager.checkpoint_dir())?;
        Ok(manager)
    }

    /// Open an existing model directory without touching the filesystem
    pub fn open(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn best_path(&self) -> PathBuf {
        self.dir.join(BEST_FILE)
    }

    pub fn losses_path(&self) -> PathBuf {
        self.dir.join(LOSSES_FILE)
    }

    pub fn checkpoint_dir(&self) -> PathBuf {
        self.dir.join(CHECKPOINT_DIR)
    }

    // ─── config.json / info.json ──────────────────────────────────────────────

    pub fn save_config(&self, cfg: &ModelConfig) -> Result<()> {
        let path = self.dir.join(CONFIG_FILE);
        fs::write(&path, serde_json::to_string_pretty(cfg)?)?;
        tracing::debug!("Saved model config to '{}'", path.display());
        Ok(())
    }

    /// A missing or malformed config.json is a configuration error
    pub fn load_config(&self) -> Result<ModelConfig> {
        let path = self.dir.join(CONFIG_FILE);
        let json = fs::read_to_string(&path).map_err(|e| {
            ClmbrError::Config(format!(
                "cannot read '{}': {e}. Has a model been trained in this directory?",
                path.display()
            ))
        })?;
        serde_json::from_str(&json)
            .map_err(|e| ClmbrError::Config(format!("malformed '{}': {e}", path.display())))
    }

    pub fn save_info(&self, info: &ModelInfo) -> Result<()> {
        let path = self.dir.join(INFO_FILE);
        fs::write(&path, serde_json::to_string_pretty(info)?)?;
        tracing::debug!("Saved model info to '{}'", path.display());
        Ok(())
    }

    pub fn load_info(&self) -> Result<ModelInfo> {
        let path = self.dir.join(INFO_FILE);
        let json = fs::read_to_string(&path).map_err(|e| {
            ClmbrError::Config(format!("cannot read '{}': {e}", path.display()))
        })?;
        serde_json::from_str(&json)
            .map_err(|e| ClmbrError::Config(format!("malformed '{}': {e}", path.display())))
    }

    // ─── best / best.json ─────────────────────────────────────────────────────

    /// Replace the best checkpoint with `state`, metadata first
    pub fn save_best(&self, state: &[u8], meta: &CheckpointMeta) -> Result<()> {
        let meta_path = self.dir.join(BEST_META_FILE);
        let best_path = self.best_path();

        let staged_meta = stage(&meta_path, serde_json::to_string_pretty(meta)?.as_bytes())?;
        let staged_best = match stage(&best_path, state) {
            Ok(tmp) => tmp,
            Err(e) => {
                if let Err(cleanup) = fs::remove_file(&staged_meta) {
                    tracing::warn!("Cannot remove '{}': {}", staged_meta.display(), cleanup);
                }
                return Err(e);
            }
        };

        fs::rename(&staged_meta, &meta_path)?;
        fs::rename(&staged_best, &best_path)?;
        tracing::debug!("Saved best checkpoint: epoch {}, val loss {:.6}", meta.epoch, meta.val_loss);
        Ok(())
    }

    /// Bytes of the best checkpoint. Missing or unreadable → Checkpoint error.
    pub fn load_best(&self) -> Result<Vec<u8>> {
        let path = self.best_path();
        fs::read(&path).map_err(|e| {
            ClmbrError::Checkpoint(format!("cannot read '{}': {e}", path.display()))
        })
    }

    pub fn load_best_meta(&self) -> Result<CheckpointMeta> {
        let path = self.dir.join(BEST_META_FILE);
        let json = fs::read_to_string(&path).map_err(|e| {
            ClmbrError::Checkpoint(format!("cannot read '{}': {e}", path.display()))
        })?;
        Ok(serde_json::from_str(&json)?)
    }
}

/// Write and sync `{path}.tmp`, returning its path for the rename
fn stage(path: &Path, bytes: &[u8]) -> Result<PathBuf> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    let mut file = File::create(&tmp)?;
    file.write_all(bytes)?;
    file.sync_all()?;
    Ok(tmp)
}
