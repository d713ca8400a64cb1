// ============================================================
// Layer 2 — FeaturizeUseCase
// ============================================================
// Produces patient representations for a saved label file:
//
//   Step 1: Load model + config + info      (Layer 5 - ml)
//   Step 2: Load the timeline extract       (Layer 4 - data)
//   Step 3: Featurize the labeler's query   (Layer 5 - ml)
//   Step 4: Write one JSON line per row
//
// Output line format:
//   {"patient_id": 42, "day_offset": 3, "label": true, "representation": [0.12, ...]}

use anyhow::{Context, Result};
use serde::Serialize;
use std::{
    fs::File,
    io::{BufWriter, Write},
    path::{Path, PathBuf},
    sync::Arc,
};

use crate::data::{labels::SavedLabeler, loader::TimelineStore};
use crate::ml::{featurizer::LabeledRepresentations, pretrained::from_pretrained};

#[derive(Serialize)]
struct FeatureRow<'a> {
    patient_id:     u64,
    day_offset:     usize,
    label:          bool,
    representation: &'a [f32],
}

pub struct FeaturizeUseCase {
    model_dir: PathBuf,
    timelines: PathBuf,
    labels:    PathBuf,
    output:    PathBuf,
}

impl FeaturizeUseCase {
    pub fn new(model_dir: PathBuf, timelines: PathBuf, labels: PathBuf, output: PathBuf) -> Self {
        Self { model_dir, timelines, labels, output }
    }

    /// Returns the number of rows written
    pub fn execute(&self) -> Result<usize> {
        let featurizer = from_pretrained(&self.model_dir)
            .with_context(|| format!("Cannot load model from '{}'", self.model_dir.display()))?;

        let store = TimelineStore::load(&self.timelines)
            .with_context(|| format!("Cannot load timelines from '{}'", self.timelines.display()))?;

        tracing::info!("Embedding size: {}", featurizer.embedding_size());

        let labeler = SavedLabeler::new(&self.labels);
        let result = featurizer
            .featurize_patients_w_labels(Arc::new(store), &labeler)
            .with_context(|| format!("Featurization failed for labels '{}'", self.labels.display()))?;

        write_rows(&self.output, &result)
            .with_context(|| format!("Cannot write features to '{}'", self.output.display()))?;
        Ok(result.representations.rows())
    }
}

fn write_rows(path: &Path, result: &LabeledRepresentations) -> Result<()> {
    let mut out = BufWriter::new(File::create(path)?);
    for (i, ((&patient_id, &day_offset), &label)) in result
        .patient_ids
        .iter()
        .zip(&result.day_offsets)
        .zip(&result.labels)
        .enumerate()
    {
        let row = FeatureRow {
            patient_id,
            day_offset,
            label,
            representation: result.representations.row(i),
        };
        serde_json::to_writer(&mut out, &row)?;
        out.write_all(b"\n")?;
    }
    out.flush()?;
    Ok(())
}
