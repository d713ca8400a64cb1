// ============================================================
// Layer 4 — Timeline Dataset (BatchSource implementation)
// ============================================================
// Two flavours share one type:
//
//   Training dataset   — patients split into train / validation;
//                        random windows, dropout from options
//   Extraction dataset — built from a query plus dummy labels;
//                        both "splits" are the queried patients
//                        and each window runs from day 0 to the
//                        patient's largest requested offset
//
// Every call to `loader` builds a fresh burn DataLoader over a
// SplitDataset that owns clones of the shared Arcs, shuffled
// with the pass's seed.

use std::{collections::HashMap, sync::Arc};

use burn::data::{dataloader::DataLoaderBuilder, dataset::Dataset};

use crate::data::{
    batcher::{TimelineBatcher, Window},
    loader::TimelineStore,
    splitter::split_train_val,
    stream::{BatchLoader, BatchSource, LoaderOptions},
    vocab::CodeMap,
};
use crate::domain::query::LabelData;
use crate::domain::timeline::PatientTimeline;
use crate::error::{ClmbrError, Result};

/// Burn worker threads per pass
pub const LOADER_WORKERS: usize = 1;

/// One patient of a split, ready for the batcher
#[derive(Debug, Clone)]
pub struct PatientItem {
    pub patient_id: u64,
    /// None when the extract has no timeline for the patient
    pub timeline:   Option<PatientTimeline>,
    pub window:     Window,
}

/// The patients of one split as a burn Dataset
pub struct SplitDataset {
    store:    Arc<TimelineStore>,
    patients: Arc<Vec<u64>>,
    horizons: Option<Arc<HashMap<u64, usize>>>,
}

impl Dataset<PatientItem> for SplitDataset {
    fn get(&self, index: usize) -> Option<PatientItem> {
        let patient_id = *self.patients.get(index)?;
        let window = match &self.horizons {
            // The window covers the last requested offset itself
            Some(h) => Window::Prefix(h.get(&patient_id).map_or(0, |&last| last.saturating_add(1))),
            None    => Window::Random,
        };
        Some(PatientItem {
            patient_id,
            timeline: self.store.get(patient_id).cloned(),
            window,
        })
    }

    fn len(&self) -> usize {
        self.patients.len()
    }
}

pub struct TimelineDataset {
    store:    Arc<TimelineStore>,
    codes:    Arc<CodeMap>,
    train:    Arc<Vec<u64>>,
    val:      Arc<Vec<u64>>,
    /// Extraction only: last requested day offset per patient
    horizons: Option<Arc<HashMap<u64, usize>>>,
    max_days: usize,
    workers:  usize,
}

impl TimelineDataset {
    /// Training dataset over explicit patient lists
    pub fn new(
        store:    Arc<TimelineStore>,
        codes:    Arc<CodeMap>,
        train:    Vec<u64>,
        val:      Vec<u64>,
        max_days: usize,
    ) -> Self {
        Self {
            store,
            codes,
            train: Arc::new(train),
            val: Arc::new(val),
            horizons: None,
            max_days,
            workers: LOADER_WORKERS,
        }
    }

    /// Training dataset with a seeded random patient split
    pub fn split(
        store:        Arc<TimelineStore>,
        codes:        Arc<CodeMap>,
        val_fraction: f64,
        seed:         u64,
        max_days:     usize,
    ) -> Self {
        let (train, val) = split_train_val(store.patient_ids().to_vec(), val_fraction, seed);
        Self::new(store, codes, train, val, max_days)
    }

    /// Extraction dataset over a query. `data` carries the labels
    /// (dummy ones for plain featurization) aligned with the query.
    pub fn for_queries(
        store:    Arc<TimelineStore>,
        codes:    Arc<CodeMap>,
        data:     &LabelData,
        max_days: usize,
    ) -> Result<Self> {
        let n = data.patient_ids.len();
        if data.day_offsets.len() != n || data.labels.len() != n {
            return Err(ClmbrError::DataSource(format!(
                "query lists differ in length: {} labels, {} patient ids, {} day offsets",
                data.labels.len(),
                n,
                data.day_offsets.len()
            )));
        }

        let mut horizons: HashMap<u64, usize> = HashMap::new();
        let mut patients = Vec::new();
        for (&pid, &offset) in data.patient_ids.iter().zip(&data.day_offsets) {
            match horizons.get_mut(&pid) {
                Some(h) => *h = (*h).max(offset),
                None => {
                    horizons.insert(pid, offset);
                    patients.push(pid);
                }
            }
        }

        let patients = Arc::new(patients);
        Ok(Self {
            store,
            codes,
            train: patients.clone(),
            val: patients,
            horizons: Some(Arc::new(horizons)),
            max_days,
            workers: LOADER_WORKERS,
        })
    }

    /// Burn worker threads used by each pass (0 runs on the caller's thread)
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn patients(&self, is_val: bool) -> &[u64] {
        if is_val { &self.val } else { &self.train }
    }

    fn split_dataset(&self, is_val: bool) -> SplitDataset {
        SplitDataset {
            store:    self.store.clone(),
            patients: if is_val { self.val.clone() } else { self.train.clone() },
            horizons: self.horizons.clone(),
        }
    }
}

impl BatchSource for TimelineDataset {
    fn num_batches(&self, batch_size: usize, is_val: bool) -> usize {
        if batch_size == 0 {
            return 0;
        }
        self.patients(is_val).len().div_ceil(batch_size)
    }

    fn loader(&self, options: &LoaderOptions) -> Result<BatchLoader> {
        if options.batch_size == 0 {
            return Err(ClmbrError::DataSource("batch size must be greater than zero".into()));
        }

        let batcher = TimelineBatcher::new(self.codes.clone(), options.clone(), self.max_days);
        let builder = DataLoaderBuilder::new(batcher)
            .batch_size(options.batch_size)
            .shuffle(options.seed);
        let builder = if self.workers > 0 { builder.num_workers(self.workers) } else { builder };
        let loader  = builder.build(self.split_dataset(options.is_val));
        Ok(BatchLoader::new(loader))
    }
}
