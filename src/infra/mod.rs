// ============================================================
// Layer 6 — Infrastructure Layer
// ============================================================
// Filesystem concerns shared by training and extraction:
//
//   checkpoint.rs — The model directory layout
//                   config.json and info.json so a trained
//                   model can be rebuilt, and the atomically
//                   replaced "best" parameter snapshot plus
//                   its best.json marker.
//
//   metrics.rs    — The per-epoch loss log
//                   One flushed "Epoch / Train loss / Val loss"
//                   block per finished epoch.
//
// Neither module knows about burn: parameters arrive here as
// opaque bytes produced by TimelineModel::save_state.
//
// Reference: Rust Book §7 (Modules)
//            Rust Book §9 (Error Handling)

/// Model directory layout and best-checkpoint persistence
pub mod checkpoint;

/// Per-epoch loss log
pub mod metrics;
