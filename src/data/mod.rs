// ============================================================
// Layer 4 — Data Pipeline
// ============================================================
// Everything from the on-disk extract to host-side batches.
//
//   timelines.jsonl
//       │
//       ▼
//   TimelineStore     → parses one patient timeline per line
//       │
//       ▼
//   CodeMap           → raw codes → dense, frequency-ordered codes
//       │
//       ▼
//   TimelineDataset   → train/val split, or a query for extraction
//       │
//       ▼
//   TimelineBatcher   → burn Batcher: windows, dropout, next-day targets
//       │
//       ▼
//   BatchLoader       → one burn DataLoader per pass, iterated as a
//                       BatchStream by the ml layer
//
// Reference: Rust Book §13 (Iterators and Closures)
//            Burn Book §5 (Dataset and Batcher)

/// Loads the JSON-lines patient extract
pub mod loader;

/// Frequency-ordered code vocabulary
pub mod vocab;

/// Seeded train/validation patient split
pub mod splitter;

/// Windowing, dropout and target construction
pub mod batcher;

/// BatchSource contract and the per-pass BatchLoader
pub mod stream;

/// Training and extraction datasets
pub mod dataset;

/// Label files for featurization with labels
pub mod labels;
