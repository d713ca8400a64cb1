// ============================================================
// Layer 4 — Batch Source Contract and Scoped Batch Loader
// ============================================================
// A BatchSource hands out one BatchLoader per train / evaluate /
// extract pass. The loader wraps a burn DataLoader built with
// that pass's seed; the stream borrows the loader:
//
//   BatchSource::loader(opts)
//       │  DataLoaderBuilder::new(batcher)
//       │      .batch_size(..).shuffle(seed).num_workers(..)
//       ▼
//   BatchLoader (owns the burn DataLoader)
//       │  .iter()
//       ▼
//   BatchStream<'_> → Iterator<Item = Result<TimelineBatch>>
//
// Both live in the caller's scope. When the pass ends (normal
// completion, early break, `?` or panic) the stream and the
// loader are dropped and burn's worker stops at its next send.

use std::sync::Arc;

use burn::data::dataloader::{DataLoader, DataLoaderIterator};

use crate::domain::batch::TimelineBatch;
use crate::error::{ClmbrError, Result};

/// Parameters for one pass over a dataset split
#[derive(Debug, Clone, PartialEq)]
pub struct LoaderOptions {
    /// Validation split when true, training split otherwise
    pub is_val:       bool,
    pub batch_size:   usize,
    /// Controls patient order, window placement and dropout sampling
    pub seed:         u64,
    pub day_dropout:  f64,
    pub code_dropout: f64,
    /// Dense codes below this are prediction targets
    pub threshold:    usize,
}

impl LoaderOptions {
    pub fn new(is_val: bool, batch_size: usize, seed: u64, threshold: usize) -> Self {
        Self { is_val, batch_size, seed, day_dropout: 0.0, code_dropout: 0.0, threshold }
    }

    pub fn with_dropout(mut self, day_dropout: f64, code_dropout: f64) -> Self {
        self.day_dropout  = day_dropout;
        self.code_dropout = code_dropout;
        self
    }
}

/// What the burn batcher emits for one group of patients.
/// burn requires loader outputs to be Clone, so failures travel
/// as a message and become a ClmbrError in the stream.
#[derive(Debug, Clone, PartialEq)]
pub enum LoadedBatch {
    Ready(TimelineBatch),
    Failed(String),
}

// ─── BatchSource ──────────────────────────────────────────────────────────────
/// Anything that can stream batches over a train/validation split
pub trait BatchSource {
    /// Batches one full pass over a split yields at `batch_size`
    fn num_batches(&self, batch_size: usize, is_val: bool) -> usize;

    /// Build the loader for one pass; dropping it releases its workers
    fn loader(&self, options: &LoaderOptions) -> Result<BatchLoader>;
}

// ─── BatchLoader ──────────────────────────────────────────────────────────────
pub struct BatchLoader {
    inner: Arc<dyn DataLoader<LoadedBatch>>,
}

impl BatchLoader {
    pub fn new(inner: Arc<dyn DataLoader<LoadedBatch>>) -> Self {
        Self { inner }
    }

    /// Start the pass. Empty batches are skipped.
    pub fn iter(&self) -> BatchStream<'_> {
        BatchStream { inner: self.inner.iter() }
    }

    /// Replay fixed batches in order, one per step
    #[cfg(test)]
    pub fn from_batches(batches: Vec<TimelineBatch>) -> Self {
        use burn::data::{dataloader::DataLoaderBuilder, dataset::InMemDataset};

        let loader = DataLoaderBuilder::new(replay::Replay)
            .batch_size(1)
            .build(InMemDataset::new(batches));
        Self::new(loader)
    }
}

// ─── BatchStream ──────────────────────────────────────────────────────────────
pub struct BatchStream<'a> {
    inner: Box<dyn DataLoaderIterator<LoadedBatch> + 'a>,
}

impl Iterator for BatchStream<'_> {
    type Item = Result<TimelineBatch>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            match self.inner.next()? {
                LoadedBatch::Ready(batch) if batch.is_empty() => continue,
                LoadedBatch::Ready(batch) => return Some(Ok(batch)),
                LoadedBatch::Failed(msg)  => return Some(Err(ClmbrError::DataSource(msg))),
            }
        }
    }
}

#[cfg(test)]
mod replay {
    use burn::data::dataloader::batcher::Batcher;

    use super::LoadedBatch;
    use crate::domain::batch::TimelineBatch;

    #[derive(Clone)]
    pub struct Replay;

    impl Batcher<TimelineBatch, LoadedBatch> for Replay {
        fn batch(&self, items: Vec<TimelineBatch>) -> LoadedBatch {
            LoadedBatch::Ready(TimelineBatch::new(
                items.into_iter().flat_map(|b| b.examples).collect(),
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::batch::TimelineExample;
    use burn::data::{
        dataloader::{batcher::Batcher, DataLoaderBuilder},
        dataset::InMemDataset,
    };

    fn batch(pid: u64) -> TimelineBatch {
        TimelineBatch::new(vec![TimelineExample {
            patient_id: pid,
            inputs:     vec![vec![0]],
            targets:    vec![],
        }])
    }

    /// Patients at or above `fail_from` fail their whole batch
    #[derive(Clone)]
    struct FailingBatcher {
        fail_from: u64,
    }

    impl Batcher<u64, LoadedBatch> for FailingBatcher {
        fn batch(&self, items: Vec<u64>) -> LoadedBatch {
            if items.iter().any(|&pid| pid >= self.fail_from) {
                return LoadedBatch::Failed("bad record".to_string());
            }
            LoadedBatch::Ready(TimelineBatch::new(items.into_iter().flat_map(|p| batch(p).examples).collect()))
        }
    }

    #[test]
    fn test_items_arrive_in_order() {
        let loader = BatchLoader::from_batches(vec![batch(1), batch(2), batch(3)]);
        let pids: Vec<u64> = loader.iter().map(|b| b.unwrap().examples[0].patient_id).collect();
        assert_eq!(pids, vec![1, 2, 3]);
    }

    #[test]
    fn test_empty_batches_are_skipped() {
        let loader = BatchLoader::from_batches(vec![batch(1), TimelineBatch::default(), batch(2)]);
        assert_eq!(loader.iter().count(), 2);
    }

    #[test]
    fn test_loader_can_be_iterated_again() {
        let loader = BatchLoader::from_batches(vec![batch(4), batch(5)]);
        assert_eq!(loader.iter().count(), 2);
        assert_eq!(loader.iter().count(), 2);
    }

    #[test]
    fn test_failures_surface_as_data_source_errors() {
        let inner = DataLoaderBuilder::new(FailingBatcher { fail_from: 2 })
            .batch_size(1)
            .num_workers(1)
            .build(InMemDataset::new(vec![0u64, 1, 2]));
        let loader = BatchLoader::new(inner);

        let mut stream = loader.iter();
        assert!(stream.next().unwrap().is_ok());
        assert!(stream.next().unwrap().is_ok());
        assert!(matches!(stream.next(), Some(Err(ClmbrError::DataSource(_)))));
        assert!(stream.next().is_none());
    }

    #[test]
    fn test_early_exit_on_error_path_drops_the_pass() {
        let consume = || -> Result<usize> {
            let inner = DataLoaderBuilder::new(FailingBatcher { fail_from: 0 })
                .batch_size(2)
                .num_workers(1)
                .build(InMemDataset::new((0u64..100).collect()));
            let loader = BatchLoader::new(inner);
            let mut n = 0;
            for b in loader.iter() {
                b?;
                n += 1;
            }
            Ok(n)
        };
        assert!(matches!(consume(), Err(ClmbrError::DataSource(_))));
    }
}
