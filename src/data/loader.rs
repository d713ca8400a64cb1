// ============================================================
// Layer 4 — Timeline Store
// ============================================================
// Loads a patient extract from a JSON-lines file, one patient
// per line:
//
//   {"patient_id": 42, "days": [{"date_offset": 0, "codes": [120, 77]}, ...]}
//
// The whole extract is held in memory behind a HashMap keyed
// by patient id; `patient_ids()` keeps file order so splits
// and counts are reproducible.
//
// Reference: Rust Book §8 (Collections)
//            serde_json documentation

use std::{
    collections::HashMap,
    fs::File,
    io::{BufRead, BufReader},
    path::Path,
};

use crate::domain::timeline::PatientTimeline;
use crate::error::{ClmbrError, Result};

/// In-memory patient extract
#[derive(Debug, Default)]
pub struct TimelineStore {
    timelines: HashMap<u64, PatientTimeline>,
    order:     Vec<u64>,
}

impl TimelineStore {
    /// Read a JSON-lines extract. Blank lines are skipped.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| {
            ClmbrError::DataSource(format!("cannot open extract '{}': {e}", path.display()))
        })?;

        let mut timelines = Vec::new();
        for (line_no, line) in BufReader::new(file).lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let timeline: PatientTimeline = serde_json::from_str(&line).map_err(|e| {
                ClmbrError::DataSource(format!(
                    "malformed timeline at {}:{}: {e}",
                    path.display(),
                    line_no + 1
                ))
            })?;
            timelines.push(timeline);
        }

        let store = Self::from_timelines(timelines)?;
        tracing::info!("Loaded {} patient timelines from '{}'", store.len(), path.display());
        Ok(store)
    }

    /// Build a store from already-parsed timelines
    pub fn from_timelines(timelines: Vec<PatientTimeline>) -> Result<Self> {
        let mut store = Self::default();
        for t in timelines {
            let pid = t.patient_id;
            if store.timelines.insert(pid, t).is_some() {
                return Err(ClmbrError::DataSource(format!("duplicate patient id {pid} in extract")));
            }
            store.order.push(pid);
        }
        Ok(store)
    }

    pub fn get(&self, patient_id: u64) -> Option<&PatientTimeline> {
        self.timelines.get(&patient_id)
    }

    /// Patient ids in extract order
    pub fn patient_ids(&self) -> &[u64] {
        &self.order
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Raw code frequencies over the given patients
    pub fn code_counts(&self, patients: &[u64]) -> HashMap<u32, usize> {
        let mut counts = HashMap::new();
        for t in patients.iter().filter_map(|p| self.timelines.get(p)) {
            for code in t.codes() {
                *counts.entry(code).or_insert(0) += 1;
            }
        }
        counts
    }
}
