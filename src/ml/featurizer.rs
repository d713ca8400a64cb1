// ============================================================
// Layer 5 — Representation Extractor
// ============================================================
// Turns a query of (patient_id, day_offset) pairs into an
// N × size matrix whose row i is the model's embedding of
// patient_ids[i] as of day_offsets[i].
//
// Scatter protocol:
//
//   query ──► PatientIndex   patient → offset → row
//   query ──► TimelineDataset (dummy labels, prefix windows)
//                 │
//                 ▼  one streamed pass, any batch order
//   batch ──► model.embed ──► for each example e (patient p):
//                               for (offset, row) in index[p]:
//                                 out[row] = emb[e][offset]
//
// A requested offset outside the patient's window (beyond the
// timeline, beyond max_days, or a patient missing from the
// extract) is never written and its row stays zero. So does the
// earlier of two identical (patient, offset) pairs, because the
// index keeps only the last row for a key.

use std::sync::Arc;

use rand::Rng;

use crate::data::{
    dataset::TimelineDataset,
    loader::TimelineStore,
    stream::{BatchSource, LoaderOptions},
    vocab::CodeMap,
};
use crate::domain::{
    config::{ModelConfig, ModelInfo},
    query::{LabelData, PatientIndex, Representations},
    traits::{Labeler, TimelineModel},
};
use crate::error::{ClmbrError, Result};
use crate::ml::observer::extraction_bar;

/// Output of featurize_patients_w_labels: the matrix plus the
/// three label arrays exactly as the labeler returned them
#[derive(Debug, Clone, PartialEq)]
pub struct LabeledRepresentations {
    pub representations: Representations,
    pub labels:          Vec<bool>,
    pub patient_ids:     Vec<u64>,
    pub day_offsets:     Vec<usize>,
}

/// A trained model plus the settings it was trained with
pub struct Featurizer<M> {
    model:  M,
    config: ModelConfig,
    info:   ModelInfo,
    codes:  Arc<CodeMap>,
}

impl<M: TimelineModel> Featurizer<M> {
    pub fn new(model: M, config: ModelConfig, info: ModelInfo) -> Self {
        let codes = Arc::new(CodeMap::from_map(&info.code_map));
        Self { model, config, info, codes }
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    pub fn info(&self) -> &ModelInfo {
        &self.info
    }

    /// Vocabulary rebuilt from info.json
    pub fn codes(&self) -> Arc<CodeMap> {
        self.codes.clone()
    }

    pub fn embedding_size(&self) -> usize {
        self.model.embedding_size()
    }

    /// Representation of every (patient_ids[i], day_offsets[i]) pair
    pub fn featurize_patients(
        &self,
        store:       Arc<TimelineStore>,
        patient_ids: &[u64],
        day_offsets: &[usize],
    ) -> Result<Representations> {
        let query = LabelData {
            labels:      vec![false; patient_ids.len()],
            patient_ids: patient_ids.to_vec(),
            day_offsets: day_offsets.to_vec(),
        };
        self.featurize_query(store, query)
    }

    /// Representations for the labeler's query, returned with its labels
    pub fn featurize_patients_w_labels(
        &self,
        store:   Arc<TimelineStore>,
        labeler: &dyn Labeler,
    ) -> Result<LabeledRepresentations> {
        let data = labeler.get_label_data()?;
        let representations = self.featurize_query(store, data.clone())?;
        Ok(LabeledRepresentations {
            representations,
            labels:      data.labels,
            patient_ids: data.patient_ids,
            day_offsets: data.day_offsets,
        })
    }

    fn featurize_query(&self, store: Arc<TimelineStore>, query: LabelData) -> Result<Representations> {
        let index = PatientIndex::build(&query.patient_ids, &query.day_offsets)?;
        let rows  = query.patient_ids.len();
        tracing::debug!(
            "Featurizing {} query rows ({} distinct) over {} patients",
            rows, index.len(), index.patient_count()
        );

        let dataset = TimelineDataset::for_queries(
            store, self.codes.clone(), &query, self.config.max_days,
        )?;
        let seed    = rand::thread_rng().gen_range(0..100_000);
        let options = LoaderOptions::new(true, self.config.eval_batch_size, seed, self.config.num_first);

        scatter_embeddings(&self.model, &dataset, &options, &index, rows)
    }
}

/// Stream `source` once and scatter each batch's embeddings into
/// a zeroed `rows × embedding_size` matrix through `index`.
pub fn scatter_embeddings<M, S>(
    model:   &M,
    source:  &S,
    options: &LoaderOptions,
    index:   &PatientIndex,
    rows:    usize,
) -> Result<Representations>
where
    M: TimelineModel,
    S: BatchSource,
{
    let mut out = Representations::zeros(rows, model.embedding_size());
    let mut written = vec![false; rows];

    let bar    = extraction_bar(source.num_batches(options.batch_size, options.is_val));
    let loader = source.loader(options)?;
    for batch in loader.iter() {
        bar.inc(1);
        let embeddings = model.embed(&batch?)?;
        if embeddings.dim != out.dim() {
            return Err(ClmbrError::Model(format!(
                "model returned {}-dim embeddings, expected {}",
                embeddings.dim,
                out.dim()
            )));
        }

        for (example, &patient_id) in embeddings.patient_ids.iter().enumerate() {
            for (offset, row) in index.requests(patient_id) {
                if let Some(vector) = embeddings.vector(example, offset) {
                    out.set_row(row, vector);
                    written[row] = true;
                }
            }
        }
    }

    bar.finish_and_clear();

    let missing = written.iter().filter(|w| !**w).count();
    if missing > 0 {
        tracing::debug!("{} of {} query rows were not covered and stay zero", missing, rows);
    }
    Ok(out)
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::stream::BatchLoader;
    use crate::domain::batch::{BatchEmbeddings, TimelineBatch, TimelineExample};
    use crate::domain::timeline::{Day, PatientTimeline};
    use std::collections::BTreeMap;

    /// Embedding at position p of patient q is [q, p + 1]
    struct PositionModel {
        dim: usize,
    }

    impl TimelineModel for PositionModel {
        fn embedding_size(&self) -> usize {
            2
        }

        fn eval_loss(&self, _batch: &TimelineBatch) -> Result<f64> {
            Ok(0.0)
        }

        fn embed(&self, batch: &TimelineBatch) -> Result<BatchEmbeddings> {
            let days = batch.max_days();
            let mut values = vec![0.0; batch.len() * days * self.dim];
            for (e, ex) in batch.examples.iter().enumerate() {
                for p in 0..ex.days() {
                    let at = (e * days + p) * self.dim;
                    values[at] = ex.patient_id as f32;
                    values[at + 1] = p as f32 + 1.0;
                }
            }
            Ok(BatchEmbeddings {
                patient_ids: batch.patient_ids().collect(),
                lengths:     batch.examples.iter().map(|e| e.days()).collect(),
                days,
                dim: self.dim,
                values,
            })
        }

        fn save_state(&self) -> Result<Vec<u8>> {
            Ok(Vec::new())
        }

        fn load_state(&mut self, _bytes: Vec<u8>) -> Result<()> {
            Ok(())
        }
    }

    /// Replays fixed batches regardless of options
    struct Replay(Vec<TimelineBatch>);

    impl BatchSource for Replay {
        fn num_batches(&self, _batch_size: usize, _is_val: bool) -> usize {
            self.0.len()
        }

        fn loader(&self, _options: &LoaderOptions) -> Result<BatchLoader> {
            Ok(BatchLoader::from_batches(self.0.clone()))
        }
    }

    fn example(patient_id: u64, days: usize) -> TimelineExample {
        TimelineExample {
            patient_id,
            inputs:  vec![vec![0]; days],
            targets: vec![vec![]; days.saturating_sub(1)],
        }
    }

    fn options() -> LoaderOptions {
        LoaderOptions::new(true, 8, 0, 1)
    }

    #[test]
    fn test_rows_follow_query_order_across_batches() {
        let pids = [7, 3, 7, 9];
        let offs = [2, 0, 5, 1];
        let index = PatientIndex::build(&pids, &offs).unwrap();
        // batch order and in-batch order differ from the query
        let source = Replay(vec![
            TimelineBatch::new(vec![example(9, 1), example(7, 6)]),
            TimelineBatch::new(vec![example(3, 1)]),
        ]);

        let out = scatter_embeddings(&PositionModel { dim: 2 }, &source, &options(), &index, 4).unwrap();
        assert_eq!(out.row(0), &[7.0, 3.0]);
        assert_eq!(out.row(1), &[3.0, 1.0]);
        assert_eq!(out.row(2), &[7.0, 6.0]);
        // patient 9's window only has position 0
        assert!(out.is_zero_row(3));
    }

    #[test]
    fn test_duplicate_query_fills_only_last_row() {
        let index  = PatientIndex::build(&[4, 4], &[1, 1]).unwrap();
        let source = Replay(vec![TimelineBatch::new(vec![example(4, 3)])]);
        let out = scatter_embeddings(&PositionModel { dim: 2 }, &source, &options(), &index, 2).unwrap();
        assert!(out.is_zero_row(0));
        assert_eq!(out.row(1), &[4.0, 2.0]);
    }

    #[test]
    fn test_patient_in_several_batches() {
        let index  = PatientIndex::build(&[5, 5], &[0, 3]).unwrap();
        let source = Replay(vec![
            TimelineBatch::new(vec![example(5, 1)]),
            TimelineBatch::new(vec![example(5, 4)]),
        ]);
        let out = scatter_embeddings(&PositionModel { dim: 2 }, &source, &options(), &index, 2).unwrap();
        assert_eq!(out.row(0), &[5.0, 1.0]);
        assert_eq!(out.row(1), &[5.0, 4.0]);
    }

    #[test]
    fn test_wrong_embedding_width_is_model_error() {
        let index  = PatientIndex::build(&[1], &[0]).unwrap();
        let source = Replay(vec![TimelineBatch::new(vec![example(1, 1)])]);
        let err = scatter_embeddings(&PositionModel { dim: 3 }, &source, &options(), &index, 1).unwrap_err();
        assert!(matches!(err, ClmbrError::Model(_)));
    }

    fn featurizer() -> (Featurizer<PositionModel>, Arc<TimelineStore>) {
        let timelines = vec![
            PatientTimeline::new(1, (0..5).map(|d| Day::new(d, vec![10])).collect()),
            PatientTimeline::new(2, (0..2).map(|d| Day::new(d, vec![10, 20])).collect()),
        ];
        let store = Arc::new(TimelineStore::from_timelines(timelines).unwrap());
        let info = ModelInfo {
            code_map:       BTreeMap::from([(10, 0), (20, 1)]),
            val_fraction:   0.0,
            split_seed:     0,
            train_patients: 2,
            val_patients:   0,
        };
        let config = ModelConfig { eval_batch_size: 1, max_days: 4, ..ModelConfig::default() };
        (Featurizer::new(PositionModel { dim: 2 }, config, info), store)
    }

    #[test]
    fn test_featurize_patients_end_to_end() {
        let (f, store) = featurizer();
        // offset 4 of patient 1 is past max_days, patient 8 is unknown
        let out = f
            .featurize_patients(store, &[2, 1, 1, 8, 2], &[1, 3, 4, 0, 0])
            .unwrap();
        assert_eq!(out.rows(), 5);
        assert_eq!(out.dim(), 2);
        assert_eq!(out.row(0), &[2.0, 2.0]);
        assert_eq!(out.row(1), &[1.0, 4.0]);
        assert!(out.is_zero_row(2));
        assert!(out.is_zero_row(3));
        assert_eq!(out.row(4), &[2.0, 1.0]);
    }

    #[test]
    fn test_offset_at_usize_max_leaves_row_zero() {
        let (f, store) = featurizer();
        let out = f.featurize_patients(store, &[1, 1], &[0, usize::MAX]).unwrap();
        assert_eq!(out.row(0), &[1.0, 1.0]);
        assert!(out.is_zero_row(1));
    }

    #[test]
    fn test_featurize_length_mismatch() {
        let (f, store) = featurizer();
        let err = f.featurize_patients(store, &[1, 2], &[0]).unwrap_err();
        assert!(matches!(err, ClmbrError::DataSource(_)));
    }

    #[test]
    fn test_featurize_with_labels_returns_arrays_unchanged() {
        struct Fixed;
        impl Labeler for Fixed {
            fn get_label_data(&self) -> Result<LabelData> {
                Ok(LabelData {
                    labels:      vec![true, false],
                    patient_ids: vec![1, 2],
                    day_offsets: vec![0, 1],
                })
            }
        }

        let (f, store) = featurizer();
        let out = f.featurize_patients_w_labels(store, &Fixed).unwrap();
        assert_eq!(out.labels, vec![true, false]);
        assert_eq!(out.patient_ids, vec![1, 2]);
        assert_eq!(out.day_offsets, vec![0, 1]);
        assert_eq!(out.representations.row(0), &[1.0, 1.0]);
        assert_eq!(out.representations.row(1), &[2.0, 2.0]);
    }
}
