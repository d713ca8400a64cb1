// ============================================================
// Layer 4 — Saved Labeler
// ============================================================
// Reads a label file produced by an upstream labeling job:
//
//   {"labels": [true, false], "patient_ids": [42, 7], "day_offsets": [3, 0]}
//
// The three arrays are parallel; position i is one query.

use serde::Deserialize;
use std::{fs, path::PathBuf};

use crate::domain::{query::LabelData, traits::Labeler};
use crate::error::{ClmbrError, Result};

#[derive(Debug, Deserialize)]
struct LabelFile {
    labels:      Vec<bool>,
    patient_ids: Vec<u64>,
    day_offsets: Vec<usize>,
}

/// Labeler backed by a JSON file on disk
pub struct SavedLabeler {
    path: PathBuf,
}

impl SavedLabeler {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl Labeler for SavedLabeler {
    fn get_label_data(&self) -> Result<LabelData> {
        let json = fs::read_to_string(&self.path).map_err(|e| {
            ClmbrError::DataSource(format!("cannot read labels '{}': {e}", self.path.display()))
        })?;
        let file: LabelFile = serde_json::from_str(&json)?;

        let n = file.labels.len();
        if file.patient_ids.len() != n || file.day_offsets.len() != n {
            return Err(ClmbrError::DataSource(format!(
                "label file '{}' has {} labels, {} patient ids, {} day offsets",
                self.path.display(),
                n,
                file.patient_ids.len(),
                file.day_offsets.len()
            )));
        }

        Ok(LabelData {
            labels:      file.labels,
            patient_ids: file.patient_ids,
            day_offsets: file.day_offsets,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_reads_parallel_arrays() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        write!(f, r#"{{"labels": [true, false], "patient_ids": [42, 7], "day_offsets": [3, 0]}}"#).unwrap();

        let data = SavedLabeler::new(f.path()).get_label_data().unwrap();
        assert_eq!(data.labels, vec![true, false]);
        assert_eq!(data.patient_ids, vec![42, 7]);
        assert_eq!(data.day_offsets, vec![3, 0]);
    }

    #[test]
    fn test_uneven_arrays_rejected() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        write!(f, r#"{{"labels": [true], "patient_ids": [42, 7], "day_offsets": [3, 0]}}"#).unwrap();
        let err = SavedLabeler::new(f.path()).get_label_data().unwrap_err();
        assert!(matches!(err, ClmbrError::DataSource(_)));
    }
}
