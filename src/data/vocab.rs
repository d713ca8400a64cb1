// ============================================================
// Layer 4 — Code Vocabulary
// ============================================================
// Maps raw clinical codes to dense indices ordered by how often
// they occur in the training split: dense 0 is the most common
// code. The prediction head only scores the first `num_first`
// dense codes, so frequency order doubles as the target cutoff.

use std::collections::{BTreeMap, HashMap};

/// Raw → dense code mapping
#[derive(Debug, Clone, PartialEq)]
pub struct CodeMap {
    dense: HashMap<u32, u32>,
}

impl CodeMap {
    /// Order codes by descending count, ties broken by raw code
    pub fn from_counts(counts: &HashMap<u32, usize>) -> Self {
        let mut codes: Vec<(u32, usize)> = counts.iter().map(|(&c, &n)| (c, n)).collect();
        codes.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
        let dense = codes
            .into_iter()
            .enumerate()
            .map(|(i, (code, _))| (code, i as u32))
            .collect();
        Self { dense }
    }

    /// Rebuild from the `code_map` stored in info.json
    pub fn from_map(map: &BTreeMap<u32, u32>) -> Self {
        Self { dense: map.iter().map(|(&c, &d)| (c, d)).collect() }
    }

    /// Form stored in info.json
    pub fn to_map(&self) -> BTreeMap<u32, u32> {
        self.dense.iter().map(|(&c, &d)| (c, d)).collect()
    }

    pub fn get(&self, raw: u32) -> Option<u32> {
        self.dense.get(&raw).copied()
    }

    pub fn len(&self) -> usize {
        self.dense.len()
    }
}
