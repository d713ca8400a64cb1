// ============================================================
// Layer 3 — Query, Patient Index and Output Matrix
// ============================================================
// A query is two parallel lists: patient_ids[i], day_offsets[i].
// Row i of the output matrix belongs to query i.
//
// The PatientIndex is the two-level lookup used to scatter a
// streamed batch back into caller order:
//
//   patient_id ──► day_offset ──► output row
//
//   query:  [(7, 2), (3, 0), (7, 5), (7, 2)]
//   index:  7 → {2 → 3, 5 → 2}
//           3 → {0 → 1}
//
// Note the duplicate (7, 2): the later position (3) overwrites
// the earlier one (0), so row 0 is never written and stays zero.

use std::collections::{BTreeMap, HashMap};

use crate::error::{ClmbrError, Result};

/// patient → (offset → output row). Keys are unique at both levels;
/// on a duplicate (patient, offset) the last query position wins.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PatientIndex {
    rows: HashMap<u64, BTreeMap<usize, usize>>,
}

impl PatientIndex {
    /// Build the index from parallel query lists
    pub fn build(patient_ids: &[u64], day_offsets: &[usize]) -> Result<Self> {
        if patient_ids.len() != day_offsets.len() {
            return Err(ClmbrError::DataSource(format!(
                "query lists differ in length: {} patient ids vs {} day offsets",
                patient_ids.len(),
                day_offsets.len()
            )));
        }
        let mut rows: HashMap<u64, BTreeMap<usize, usize>> = HashMap::new();
        for (row, (&pid, &offset)) in patient_ids.iter().zip(day_offsets).enumerate() {
            rows.entry(pid).or_default().insert(offset, row);
        }
        Ok(Self { rows })
    }

    /// (offset, row) pairs requested for a patient, in offset order
    pub fn requests(&self, patient_id: u64) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.rows
            .get(&patient_id)
            .into_iter()
            .flat_map(|m| m.iter().map(|(&o, &r)| (o, r)))
    }

    pub fn patient_count(&self) -> usize {
        self.rows.len()
    }

    /// Number of index leaves (distinct (patient, offset) pairs)
    pub fn len(&self) -> usize {
        self.rows.values().map(BTreeMap::len).sum()
    }
}

/// Dense N × dim output matrix, row-major, zero-initialised
#[derive(Debug, Clone, PartialEq)]
pub struct Representations {
    rows:   usize,
    dim:    usize,
    values: Vec<f32>,
}

impl Representations {
    pub fn zeros(rows: usize, dim: usize) -> Self {
        Self { rows, dim, values: vec![0.0; rows * dim] }
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn row(&self, i: usize) -> &[f32] {
        &self.values[i * self.dim..(i + 1) * self.dim]
    }

    /// Overwrite row `i`. `vector` must have length `dim`.
    pub fn set_row(&mut self, i: usize, vector: &[f32]) {
        self.values[i * self.dim..(i + 1) * self.dim].copy_from_slice(vector);
    }

    #[cfg(test)]
    pub fn is_zero_row(&self, i: usize) -> bool {
        self.row(i).iter().all(|&v| v == 0.0)
    }
}

/// Labels plus the query they are aligned with
#[derive(Debug, Clone, PartialEq)]
pub struct LabelData {
    pub labels:      Vec<bool>,
    pub patient_ids: Vec<u64>,
    pub day_offsets: Vec<usize>,
}
