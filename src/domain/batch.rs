// ============================================================
// Layer 3 — Batch Domain Types
// ============================================================
// Host-side batch representation exchanged between the batch
// source and the model. Nothing here knows about tensors; the
// ml layer converts a TimelineBatch into backend tensors.
//
//   TimelineBatch    — what the batch source yields
//   BatchEmbeddings  — what the model returns for a batch:
//                      one vector per (example, position)

/// One windowed patient timeline inside a batch.
/// Position p of `inputs` is the p-th day of the window.
#[derive(Debug, Clone, PartialEq)]
pub struct TimelineExample {
    pub patient_id: u64,

    /// Dense input codes per day (after code dropout)
    pub inputs: Vec<Vec<u32>>,

    /// Dense target codes of the following day.
    /// Always one shorter than `inputs`: the last day has no successor.
    pub targets: Vec<Vec<u32>>,
}

impl TimelineExample {
    pub fn days(&self) -> usize {
        self.inputs.len()
    }
}

/// A group of examples assembled for one forward pass
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TimelineBatch {
    pub examples: Vec<TimelineExample>,
}

impl TimelineBatch {
    pub fn new(examples: Vec<TimelineExample>) -> Self {
        Self { examples }
    }

    pub fn len(&self) -> usize {
        self.examples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.examples.is_empty()
    }

    pub fn patient_ids(&self) -> impl Iterator<Item = u64> + '_ {
        self.examples.iter().map(|e| e.patient_id)
    }

    /// Longest window in the batch — the padded sequence length
    pub fn max_days(&self) -> usize {
        self.examples.iter().map(TimelineExample::days).max().unwrap_or(0)
    }

    /// Widest day in the batch — the padded code-bag width (at least 1)
    pub fn max_codes_per_day(&self) -> usize {
        self.examples
            .iter()
            .flat_map(|e| e.inputs.iter().map(Vec::len))
            .max()
            .unwrap_or(0)
            .max(1)
    }
}

/// Per-position embeddings for every example of a batch.
/// Stored row-major as [example, position, dim], padded to `days`.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchEmbeddings {
    pub patient_ids: Vec<u64>,
    /// Real (unpadded) window length per example
    pub lengths:     Vec<usize>,
    pub days:        usize,
    pub dim:         usize,
    pub values:      Vec<f32>,
}

impl BatchEmbeddings {
    /// Embedding at `position` of example `example`, or None when the
    /// position lies outside that example's window.
    pub fn vector(&self, example: usize, position: usize) -> Option<&[f32]> {
        let len = *self.lengths.get(example)?;
        if position >= len {
            return None;
        }
        let start = (example * self.days + position) * self.dim;
        self.values.get(start..start + self.dim)
    }
}
