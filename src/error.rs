// ============================================================
// Error Types
// ============================================================
// Typed errors for the core (data, ml, infra layers).
// The application and CLI layers wrap these in anyhow with
// file-path context, so variants here stay short and precise.
//
//   Config      — config.json / info.json missing or malformed
//   Checkpoint  — "best" artifact missing, corrupt, or the wrong shape
//   DataSource  — timeline extract, labels, or batch stream problems
//   Model       — tensor readback failures from the backend

use thiserror::Error;

/// Result alias used throughout the core layers
pub type Result<T> = std::result::Result<T, ClmbrError>;

#[derive(Error, Debug)]
pub enum ClmbrError {
    /// Missing or malformed configuration / metadata
    #[error("config error: {0}")]
    Config(String),

    /// Missing or structurally incompatible parameter snapshot
    #[error("checkpoint error: {0}")]
    Checkpoint(String),

    /// Propagated unchanged from the batch source
    #[error("data source error: {0}")]
    DataSource(String),

    /// Backend failed to produce host data
    #[error("model error: {0}")]
    Model(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ClmbrError {
    /// True for the two variants a pretrained load can fail with
    pub fn is_load_error(&self) -> bool {
        matches!(self, ClmbrError::Config(_) | ClmbrError::Checkpoint(_))
    }
}
