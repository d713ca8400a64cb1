// ============================================================
// Layer 3 — Domain Layer
// ============================================================
// Plain Rust structs and traits that define the core concepts
// of the system.
//
// Rules for this layer:
//   - NO burn types
//   - NO file I/O
//   - Only plain structs, enums, and traits
//
// Reference: Rust Book §5 (Structs), §10 (Traits)

// Hyperparameters (config.json) and extract metadata (info.json)
pub mod config;

// Patient timelines: ordered days of clinical codes
pub mod timeline;

// Host-side batches and per-position embeddings
pub mod batch;

// Query index (patient → offset → row) and the output matrix
pub mod query;

// Core abstractions that the ml and data layers implement
pub mod traits;
