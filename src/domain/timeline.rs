// ============================================================
// Layer 3 — Patient Timeline Domain Types
// ============================================================
// A timeline is the ordered list of days on which a patient
// had clinical events. Each day carries the raw codes recorded
// that day. A "day offset" is an index into `days`, NOT a
// calendar distance: offset 3 means the fourth recorded day.
//
//   PatientTimeline { patient_id: 42, days: [
//       Day { date_offset: 0,   codes: [120, 77] },   ← offset 0
//       Day { date_offset: 14,  codes: [9] },         ← offset 1
//       Day { date_offset: 380, codes: [120, 5, 6] }, ← offset 2
//   ]}

use serde::{Deserialize, Serialize};

/// One day of a patient's record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Day {
    /// Days since the patient's first recorded event
    #[serde(default)]
    pub date_offset: i64,

    /// Raw (un-mapped) clinical codes recorded on this day
    pub codes: Vec<u32>,
}

impl Day {
    pub fn new(date_offset: i64, codes: Vec<u32>) -> Self {
        Self { date_offset, codes }
    }
}

/// The full ordered timeline of a single patient
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatientTimeline {
    pub patient_id: u64,
    pub days:       Vec<Day>,
}

impl PatientTimeline {
    pub fn new(patient_id: u64, days: Vec<Day>) -> Self {
        Self { patient_id, days }
    }

    pub fn len(&self) -> usize {
        self.days.len()
    }

    /// Iterate every raw code in the timeline
    pub fn codes(&self) -> impl Iterator<Item = u32> + '_ {
        self.days.iter().flat_map(|d| d.codes.iter().copied())
    }
}
