// ============================================================
// Layer 5 — ML / Model Layer (Burn)
// ============================================================
// This layer contains ALL Burn framework specific code.
// Everything outside it sees models only through the
// TimelineModel / TrainableModel traits and parameter bytes.
//
// What's in this layer:
//
//   model.rs      — The timeline encoder
//                   • Per-day bag of code embeddings
//                   • Day-position embeddings
//                   • Causal multi-head self-attention blocks
//                   • Next-day code prediction head
//
//   batcher.rs    — TimelineBatch → padded tensors
//
//   learner.rs    — Burn model + AdamW (training) and the
//                   plain-backend model (extraction)
//
//   schedule.rs   — Warmup-linear learning-rate schedule
//
//   observer.rs   — Progress reporting for the training loop
//
//   trainer.rs    — Epoch loop, evaluation, loss log and
//                   best-checkpoint selection
//
//   featurizer.rs — Query → representation matrix
//
//   pretrained.rs — Model directory → ready Featurizer
//
// Reference: Burn Book §3 (Building Blocks)
//            Burn Book §5 (Training)
//            Vaswani et al. (2017) Attention Is All You Need
//            Steinberg et al. (2021) Language models are an
//            effective representation learning technique for
//            electronic health record data

/// Backend aliases and device selection
pub mod backend;

/// Causal transformer over patient days
pub mod model;

/// Tensor construction from host-side batches
pub mod batcher;

/// Burn-backed TimelineModel implementations
pub mod learner;

/// Warmup-linear learning rate
pub mod schedule;

/// Training progress observers
pub mod observer;

/// Training loop with evaluation and checkpointing
pub mod trainer;

/// Representation extraction
pub mod featurizer;

/// Loading a trained model directory
pub mod pretrained;
