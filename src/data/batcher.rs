// ============================================================
// Layer 4 — Timeline Batcher
// ============================================================
// Turns raw patient timelines into TimelineExamples:
//
//   1. Window    — pick which days the model sees
//                  Random:   a contiguous run of ≤ max_days days
//                            at a seeded random start (training)
//                  Prefix:   days 0..n, so window position == day
//                            offset (extraction)
//   2. Map       — raw codes → dense codes, unknown codes dropped
//   3. Day drop  — remove whole days with probability day_dropout
//                  (at least one day always survives)
//   4. Targets   — position i predicts the dense codes of day i+1
//                  that fall below the threshold
//   5. Code drop — remove individual INPUT codes with probability
//                  code_dropout; targets are never dropped
//
// Each example draws from its own StdRng seeded from
// LoaderOptions::seed and the patient id, so a given seed always
// produces the same examples however burn orders or splits the
// work across its workers.

use std::sync::Arc;

use burn::data::dataloader::batcher::Batcher;
use rand::{rngs::StdRng, Rng, SeedableRng};

use crate::data::{
    dataset::PatientItem,
    stream::{LoadedBatch, LoaderOptions},
    vocab::CodeMap,
};
use crate::domain::batch::{TimelineBatch, TimelineExample};
use crate::domain::timeline::PatientTimeline;

/// Which days of a timeline become the example
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Window {
    /// Seeded random placement of at most `max_days` days
    Random,
    /// The first `n` days (further capped at `max_days`)
    Prefix(usize),
}

#[derive(Clone)]
pub struct TimelineBatcher {
    codes:    Arc<CodeMap>,
    options:  LoaderOptions,
    max_days: usize,
}

impl TimelineBatcher {
    pub fn new(codes: Arc<CodeMap>, options: LoaderOptions, max_days: usize) -> Self {
        Self { codes, options, max_days }
    }

    fn rng_for(&self, patient_id: u64) -> StdRng {
        StdRng::seed_from_u64(self.options.seed ^ patient_id.wrapping_mul(0x9E37_79B9_7F4A_7C15))
    }

    /// Targets are dense codes below this; thresholds past the
    /// u32 code space keep every code
    fn threshold(&self) -> u32 {
        u32::try_from(self.options.threshold).unwrap_or(u32::MAX)
    }

    /// Build one example, or None if the window holds no days
    pub fn example(&self, timeline: &PatientTimeline, window: Window) -> Option<TimelineExample> {
        let mut rng = self.rng_for(timeline.patient_id);
        let len = timeline.len();
        let (start, end) = match window {
            Window::Prefix(n) => (0, n.min(len).min(self.max_days)),
            Window::Random if len > self.max_days => {
                let start = rng.gen_range(0..=len - self.max_days);
                (start, start + self.max_days)
            }
            Window::Random => (0, len),
        };
        if start >= end {
            return None;
        }

        // ── Map raw → dense ──────────────────────────────────────────────────
        let mut days: Vec<Vec<u32>> = timeline.days[start..end]
            .iter()
            .map(|d| d.codes.iter().filter_map(|&c| self.codes.get(c)).collect())
            .collect();

        // ── Day dropout ──────────────────────────────────────────────────────
        let p_day = self.options.day_dropout;
        if p_day > 0.0 && days.len() > 1 {
            let keep: Vec<bool> = (0..days.len()).map(|_| !rng.gen_bool(p_day)).collect();
            if keep.iter().any(|&k| k) {
                days = days
                    .into_iter()
                    .zip(keep)
                    .filter_map(|(d, k)| k.then_some(d))
                    .collect();
            } else {
                days.truncate(1);
            }
        }

        // ── Next-day targets ─────────────────────────────────────────────────
        let threshold = self.threshold();
        let targets: Vec<Vec<u32>> = days
            .iter()
            .skip(1)
            .map(|next| {
                let mut t: Vec<u32> = next.iter().copied().filter(|&c| c < threshold).collect();
                t.sort_unstable();
                t.dedup();
                t
            })
            .collect();

        // ── Code dropout on inputs ───────────────────────────────────────────
        let p_code = self.options.code_dropout;
        let inputs = if p_code > 0.0 {
            days.into_iter()
                .map(|day| day.into_iter().filter(|_| !rng.gen_bool(p_code)).collect())
                .collect()
        } else {
            days
        };

        Some(TimelineExample { patient_id: timeline.patient_id, inputs, targets })
    }
}

impl Batcher<PatientItem, LoadedBatch> for TimelineBatcher {
    /// Batch a group of patients, skipping any that yield no example.
    /// A training patient missing from the extract fails the batch;
    /// a queried one is skipped and its rows stay zero.
    fn batch(&self, items: Vec<PatientItem>) -> LoadedBatch {
        let mut examples = Vec::with_capacity(items.len());
        for item in items {
            match (&item.timeline, item.window) {
                (Some(timeline), window) => examples.extend(self.example(timeline, window)),
                (None, Window::Prefix(_)) => {
                    tracing::warn!("Patient {} not found in extract; its rows stay zero", item.patient_id);
                }
                (None, Window::Random) => {
                    return LoadedBatch::Failed(format!(
                        "patient {} is in the split but not in the extract",
                        item.patient_id
                    ));
                }
            }
        }
        LoadedBatch::Ready(TimelineBatch::new(examples))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::timeline::Day;
    use std::collections::HashMap;

    // raw 10 → 0, 20 → 1, 30 → 2
    fn codes() -> Arc<CodeMap> {
        let counts: HashMap<u32, usize> = [(10, 3), (20, 2), (30, 1)].into_iter().collect();
        Arc::new(CodeMap::from_counts(&counts))
    }

    fn timeline_for(pid: u64, days: usize) -> PatientTimeline {
        PatientTimeline::new(
            pid,
            (0..days).map(|i| Day::new(i as i64, vec![10, 20, 30, 99])).collect(),
        )
    }

    fn timeline(days: usize) -> PatientTimeline {
        timeline_for(5, days)
    }

    fn item(timeline: PatientTimeline, window: Window) -> PatientItem {
        PatientItem { patient_id: timeline.patient_id, timeline: Some(timeline), window }
    }

    fn ready(batch: LoadedBatch) -> TimelineBatch {
        match batch {
            LoadedBatch::Ready(b) => b,
            LoadedBatch::Failed(msg) => panic!("batch failed: {msg}"),
        }
    }

    #[test]
    fn test_prefix_window_maps_codes_and_builds_targets() {
        let batcher = TimelineBatcher::new(codes(), LoaderOptions::new(true, 4, 0, 2), 100);

        let ex = batcher.example(&timeline(5), Window::Prefix(3)).unwrap();
        assert_eq!(ex.patient_id, 5);
        assert_eq!(ex.days(), 3);
        // unknown raw code 99 dropped
        assert_eq!(ex.inputs[0], vec![0, 1, 2]);
        // threshold 2 keeps dense 0 and 1 only
        assert_eq!(ex.targets, vec![vec![0, 1], vec![0, 1]]);
    }

    #[test]
    fn test_prefix_window_capped_by_timeline_and_max_days() {
        let batcher = TimelineBatcher::new(codes(), LoaderOptions::new(true, 4, 0, 3), 4);
        assert_eq!(batcher.example(&timeline(2), Window::Prefix(10)).unwrap().days(), 2);
        assert_eq!(batcher.example(&timeline(9), Window::Prefix(10)).unwrap().days(), 4);
        assert_eq!(batcher.example(&timeline(9), Window::Prefix(usize::MAX)).unwrap().days(), 4);
        assert!(batcher.example(&timeline(0), Window::Prefix(1)).is_none());
    }

    #[test]
    fn test_threshold_beyond_u32_keeps_every_code() {
        let batcher = TimelineBatcher::new(codes(), LoaderOptions::new(true, 4, 0, u32::MAX as usize + 3), 100);
        let ex = batcher.example(&timeline(3), Window::Prefix(3)).unwrap();
        assert_eq!(ex.targets, vec![vec![0, 1, 2], vec![0, 1, 2]]);
    }

    #[test]
    fn test_random_window_never_exceeds_max_days() {
        let batcher = TimelineBatcher::new(codes(), LoaderOptions::new(false, 4, 11, 3), 6);
        for pid in 0..20 {
            let ex = batcher.example(&timeline_for(pid, 30), Window::Random).unwrap();
            assert_eq!(ex.days(), 6);
            assert_eq!(ex.targets.len(), 5);
        }
    }

    #[test]
    fn test_dropout_keeps_at_least_one_day_and_targets_intact() {
        let opts    = LoaderOptions::new(false, 4, 3, 3).with_dropout(0.9, 0.9);
        let batcher = TimelineBatcher::new(codes(), opts, 50);
        for pid in 0..20 {
            let ex = batcher.example(&timeline_for(pid, 8), Window::Random).unwrap();
            assert!(ex.days() >= 1);
            assert_eq!(ex.targets.len(), ex.days() - 1);
            assert!(ex.targets.iter().all(|t| t == &vec![0, 1, 2]));
        }
    }

    #[test]
    fn test_same_seed_same_examples() {
        let opts  = LoaderOptions::new(false, 4, 42, 3).with_dropout(0.3, 0.3);
        let items = || vec![item(timeline_for(1, 40), Window::Random), item(timeline_for(2, 40), Window::Random)];
        let a = ready(TimelineBatcher::new(codes(), opts.clone(), 10).batch(items()));
        let b = ready(TimelineBatcher::new(codes(), opts, 10).batch(items()));
        assert_eq!(a, b);
        assert_eq!(a.len(), 2);
    }

    #[test]
    fn test_seed_changes_dropout_sampling() {
        let opts = |seed| LoaderOptions::new(false, 4, seed, 3).with_dropout(0.5, 0.0);
        let a = TimelineBatcher::new(codes(), opts(1), 5);
        let b = TimelineBatcher::new(codes(), opts(2), 5);
        let differs = (0..50).any(|pid| {
            let t = timeline_for(pid, 40);
            a.example(&t, Window::Random).map(|e| e.days()) != b.example(&t, Window::Random).map(|e| e.days())
        });
        assert!(differs);
    }

    #[test]
    fn test_missing_patient_fails_training_batch_but_not_query() {
        let batcher = TimelineBatcher::new(codes(), LoaderOptions::new(false, 4, 0, 3), 10);
        let missing = |window| PatientItem { patient_id: 77, timeline: None, window };

        let query = batcher.batch(vec![item(timeline(3), Window::Prefix(2)), missing(Window::Prefix(1))]);
        assert_eq!(ready(query).len(), 1);

        let train = batcher.batch(vec![item(timeline(3), Window::Random), missing(Window::Random)]);
        assert!(matches!(train, LoadedBatch::Failed(_)));
    }
}
