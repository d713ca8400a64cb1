// ============================================================
// Layer 5 — Burn-backed Timeline Models
// ============================================================
// The two TimelineModel implementations the rest of the crate
// talks to:
//
//   ClmbrLearner<B, O>   — ClmbrModel on an autodiff backend
//                          plus its AdamW optimizer state;
//                          also a TrainableModel
//   ClmbrInference<B>    — ClmbrModel on a plain backend,
//                          used by the representation extractor
//
// Both evaluate on a non-autodiff model (model.valid() for the
// learner), so dropout is off and no graph is recorded.
//
// Parameter state is a named MessagePack record held in memory;
// the checkpoint manager decides where the bytes go.
//
// Reference: Burn Book §5 (Training), §6 (Records)
//            Loshchilov & Hutter (2019) Decoupled Weight Decay

use burn::{
    module::{AutodiffModule, ModuleVisitor, ParamId},
    optim::{AdamWConfig, GradientsParams, Optimizer},
    prelude::*,
    record::{FullPrecisionSettings, NamedMpkBytesRecorder, Recorder},
    tensor::backend::AutodiffBackend,
};

use crate::domain::{
    batch::{BatchEmbeddings, TimelineBatch},
    config::ModelConfig,
    traits::{TimelineModel, TrainableModel},
};
use crate::error::{ClmbrError, Result};
use crate::ml::{
    batcher::TimelineTensorizer,
    model::{ClmbrModel, ClmbrModelConfig},
};

type StateRecorder = NamedMpkBytesRecorder<FullPrecisionSettings>;

/// Element count of the float parameters that receive gradients
#[derive(Default)]
struct TrainableCounter {
    count: usize,
}

impl<B: Backend> ModuleVisitor<B> for TrainableCounter {
    fn visit_float<const D: usize>(&mut self, _id: ParamId, tensor: &Tensor<B, D>) {
        if tensor.is_require_grad() {
            self.count += tensor.shape().num_elements();
        }
    }
}

// ─── ClmbrLearner ─────────────────────────────────────────────────────────────
pub struct ClmbrLearner<B: AutodiffBackend, O> {
    model:      ClmbrModel<B>,
    optim:      O,
    layout:     ClmbrModelConfig,
    tensorizer: TimelineTensorizer<B>,
    inner:      TimelineTensorizer<B::InnerBackend>,
    device:     B::Device,
}

/// Fresh model plus AdamW built from the configured betas, epsilon
/// and decoupled weight decay. The optimizer lives as long as the
/// learner, so its moment estimates carry across epochs.
pub fn build_learner<B: AutodiffBackend>(
    layout: ClmbrModelConfig,
    config: &ModelConfig,
    device: &B::Device,
) -> ClmbrLearner<B, impl Optimizer<ClmbrModel<B>, B>> {
    let model = layout.init::<B>(device);

    // m = β1*m + (1-β1)*g
    // v = β2*v + (1-β2)*g²
    // θ = θ - lr * (m / (√v + ε) + λθ)
    let optim = AdamWConfig::new()
        .with_beta_1(config.b1 as f32)
        .with_beta_2(config.b2 as f32)
        .with_epsilon(config.e as f32)
        .with_weight_decay(config.l2 as f32)
        .init::<B, ClmbrModel<B>>();

    tracing::info!(
        "Model ready: {} layers, size={}, {} input codes, {} targets",
        layout.num_layers, layout.size, layout.num_codes, layout.num_targets
    );

    ClmbrLearner {
        model,
        optim,
        tensorizer: TimelineTensorizer::new(device.clone(), &layout),
        inner:      TimelineTensorizer::new(device.clone(), &layout),
        device:     device.clone(),
        layout,
    }
}

impl<B: AutodiffBackend, O: Optimizer<ClmbrModel<B>, B>> TimelineModel for ClmbrLearner<B, O> {
    fn embedding_size(&self) -> usize {
        self.layout.size
    }

    fn eval_loss(&self, batch: &TimelineBatch) -> Result<f64> {
        eval_loss_on(&self.model.valid(), &self.layout, &self.inner, batch)
    }

    fn embed(&self, batch: &TimelineBatch) -> Result<BatchEmbeddings> {
        embed_on(&self.model.valid(), &self.layout, &self.inner, batch)
    }

    fn save_state(&self) -> Result<Vec<u8>> {
        state_bytes(&self.model)
    }

    fn load_state(&mut self, bytes: Vec<u8>) -> Result<()> {
        self.model = restore(self.model.clone(), bytes, &self.layout, &self.device)?;
        Ok(())
    }
}

impl<B: AutodiffBackend, O: Optimizer<ClmbrModel<B>, B>> TrainableModel for ClmbrLearner<B, O> {
    fn num_trainable_params(&self) -> usize {
        let mut counter = TrainableCounter::default();
        self.model.visit(&mut counter);
        counter.count
    }

    fn train_step(&mut self, batch: &TimelineBatch, lr: f64) -> Result<f64> {
        check_batch(&self.layout, batch)?;
        let output = self.model.forward_loss(self.tensorizer.tensors(batch));
        let loss: f64 = output.loss.clone().into_scalar().elem::<f64>();

        // Backward pass + AdamW update
        let grads = output.loss.backward();
        let grads = GradientsParams::from_grads(grads, &self.model);
        self.model = self.optim.step(lr, self.model.clone(), grads);
        Ok(loss)
    }
}

// ─── ClmbrInference ───────────────────────────────────────────────────────────
pub struct ClmbrInference<B: Backend> {
    model:      ClmbrModel<B>,
    layout:     ClmbrModelConfig,
    tensorizer: TimelineTensorizer<B>,
    device:     B::Device,
}

impl<B: Backend> ClmbrInference<B> {
    /// Randomly initialized; call load_state to restore trained weights
    pub fn new(layout: ClmbrModelConfig, device: &B::Device) -> Self {
        Self {
            model:      layout.init::<B>(device),
            tensorizer: TimelineTensorizer::new(device.clone(), &layout),
            device:     device.clone(),
            layout,
        }
    }
}

impl<B: Backend> TimelineModel for ClmbrInference<B> {
    fn embedding_size(&self) -> usize {
        self.layout.size
    }

    fn eval_loss(&self, batch: &TimelineBatch) -> Result<f64> {
        eval_loss_on(&self.model, &self.layout, &self.tensorizer, batch)
    }

    fn embed(&self, batch: &TimelineBatch) -> Result<BatchEmbeddings> {
        embed_on(&self.model, &self.layout, &self.tensorizer, batch)
    }

    fn save_state(&self) -> Result<Vec<u8>> {
        state_bytes(&self.model)
    }

    fn load_state(&mut self, bytes: Vec<u8>) -> Result<()> {
        self.model = restore(self.model.clone(), bytes, &self.layout, &self.device)?;
        Ok(())
    }
}

// ─── Shared helpers ───────────────────────────────────────────────────────────

fn check_batch(layout: &ClmbrModelConfig, batch: &TimelineBatch) -> Result<()> {
    if batch.is_empty() {
        return Err(ClmbrError::DataSource("received an empty batch".into()));
    }
    if batch.max_days() > layout.max_days {
        return Err(ClmbrError::DataSource(format!(
            "batch window of {} days exceeds max_days {}",
            batch.max_days(), layout.max_days
        )));
    }
    Ok(())
}

fn eval_loss_on<B: Backend>(
    model:      &ClmbrModel<B>,
    layout:     &ClmbrModelConfig,
    tensorizer: &TimelineTensorizer<B>,
    batch:      &TimelineBatch,
) -> Result<f64> {
    check_batch(layout, batch)?;
    let output = model.forward_loss(tensorizer.tensors(batch));
    Ok(output.loss.into_scalar().elem::<f64>())
}

fn embed_on<B: Backend>(
    model:      &ClmbrModel<B>,
    layout:     &ClmbrModelConfig,
    tensorizer: &TimelineTensorizer<B>,
    batch:      &TimelineBatch,
) -> Result<BatchEmbeddings> {
    check_batch(layout, batch)?;
    let input = tensorizer.tensors(batch);
    let embeddings = model.embed(input.codes, input.code_mask);
    let [_, days, dim] = embeddings.dims();

    let values = embeddings
        .into_data()
        .convert::<f32>()
        .to_vec::<f32>()
        .map_err(|e| ClmbrError::Model(format!("cannot read embeddings back: {e:?}")))?;

    Ok(BatchEmbeddings {
        patient_ids: batch.patient_ids().collect(),
        lengths:     batch.examples.iter().map(|e| e.days()).collect(),
        days,
        dim,
        values,
    })
}

fn state_bytes<B: Backend>(model: &ClmbrModel<B>) -> Result<Vec<u8>> {
    Recorder::<B>::record(&StateRecorder::default(), model.clone().into_record(), ())
        .map_err(|e| ClmbrError::Checkpoint(format!("cannot serialize parameters: {e:?}")))
}

/// Load `bytes` into `model` and verify the restored shapes
fn restore<B: Backend>(
    model:  ClmbrModel<B>,
    bytes:  Vec<u8>,
    layout: &ClmbrModelConfig,
    device: &B::Device,
) -> Result<ClmbrModel<B>> {
    let record = Recorder::<B>::load(&StateRecorder::default(), bytes, device)
        .map_err(|e| ClmbrError::Checkpoint(format!("cannot decode parameters: {e:?}")))?;
    let model = model.load_record(record);
    model.check_shapes(layout).map_err(ClmbrError::Checkpoint)?;
    Ok(model)
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::batch::TimelineExample;
    use burn::backend::{Autodiff, NdArray};

    type Inner = NdArray;
    type B = Autodiff<NdArray>;

    fn layout() -> ClmbrModelConfig {
        ClmbrModelConfig::new(4, 4, 6, 8, 2, 1, 0.0)
    }

    fn batch() -> TimelineBatch {
        TimelineBatch::new(vec![
            TimelineExample {
                patient_id: 10,
                inputs:     vec![vec![0, 1], vec![2], vec![0, 3]],
                targets:    vec![vec![2], vec![0, 3]],
            },
            TimelineExample {
                patient_id: 11,
                inputs:     vec![vec![1], vec![1, 2]],
                targets:    vec![vec![1, 2]],
            },
        ])
    }

    fn config() -> ModelConfig {
        ModelConfig { size: 8, num_heads: 2, num_layers: 1, dropout: 0.0, ..ModelConfig::default() }
    }

    #[test]
    fn test_trainable_params_skip_frozen_parameters() {
        let device = Default::default();
        let mut learner = build_learner::<B>(layout(), &config(), &device);
        assert!(learner.num_trainable_params() > 0);
        assert_eq!(learner.num_trainable_params(), learner.model.num_params());

        learner.model = learner.model.clone().no_grad();
        assert_eq!(learner.num_trainable_params(), 0);
    }

    #[test]
    fn test_training_steps_reduce_loss_on_one_batch() {
        let device = Default::default();
        let mut learner = build_learner::<B>(layout(), &config(), &device);
        let before = learner.eval_loss(&batch()).unwrap();
        for _ in 0..30 {
            learner.train_step(&batch(), 1e-2).unwrap();
        }
        let after = learner.eval_loss(&batch()).unwrap();
        assert!(after < before, "loss went from {before} to {after}");
    }

    #[test]
    fn test_embed_shape_and_lengths() {
        let device = Default::default();
        let model = ClmbrInference::<Inner>::new(layout(), &device);
        let emb = model.embed(&batch()).unwrap();
        assert_eq!(emb.patient_ids, vec![10, 11]);
        assert_eq!(emb.lengths, vec![3, 2]);
        assert_eq!(emb.days, 3);
        assert_eq!(emb.dim, 8);
        assert_eq!(emb.vector(1, 1).unwrap().len(), 8);
        assert!(emb.vector(1, 2).is_none());
    }

    #[test]
    fn test_state_moves_from_learner_to_inference() {
        let device = Default::default();
        let mut learner = build_learner::<B>(layout(), &config(), &device);
        learner.train_step(&batch(), 1e-2).unwrap();
        let bytes = learner.save_state().unwrap();

        let mut inference = ClmbrInference::<Inner>::new(layout(), &device);
        inference.load_state(bytes).unwrap();

        let a = learner.embed(&batch()).unwrap();
        let b = inference.embed(&batch()).unwrap();
        for (x, y) in a.values.iter().zip(&b.values) {
            assert!((x - y).abs() < 1e-5);
        }
    }

    #[test]
    fn test_wrong_layout_is_checkpoint_error() {
        let device = Default::default();
        let bytes = ClmbrInference::<Inner>::new(layout(), &device).save_state().unwrap();

        let wider = ClmbrModelConfig::new(4, 4, 6, 16, 2, 1, 0.0);
        let mut other = ClmbrInference::<Inner>::new(wider, &device);
        let err = other.load_state(bytes).unwrap_err();
        assert!(matches!(err, ClmbrError::Checkpoint(_)));
    }

    #[test]
    fn test_garbage_state_is_checkpoint_error() {
        let device = Default::default();
        let mut model = ClmbrInference::<Inner>::new(layout(), &device);
        let err = model.load_state(b"not a record".to_vec()).unwrap_err();
        assert!(matches!(err, ClmbrError::Checkpoint(_)));
    }

    #[test]
    fn test_overlong_batch_rejected() {
        let device = Default::default();
        let model = ClmbrInference::<Inner>::new(layout(), &device);
        let long = TimelineBatch::new(vec![TimelineExample {
            patient_id: 1,
            inputs:     vec![vec![0]; 7],
            targets:    vec![vec![0]; 6],
        }]);
        assert!(matches!(model.embed(&long), Err(ClmbrError::DataSource(_))));
    }
}
