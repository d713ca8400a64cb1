use burn::{
    nn::{
        attention::{generate_autoregressive_mask, MhaInput, MultiHeadAttention, MultiHeadAttentionConfig},
        Dropout, DropoutConfig,
        Embedding, EmbeddingConfig,
        LayerNorm, LayerNormConfig,
        Linear, LinearConfig,
    },
    prelude::*,
};

use crate::domain::config::{ModelConfig, ModelInfo};

// NOTE: #[derive(Config)] already generates Clone and Serialize/Deserialize
// internally — do NOT add them again or you get conflicting impls.
#[derive(Config, Debug)]
pub struct ClmbrModelConfig {
    /// Dense input vocabulary; slot `num_codes` is padding
    pub num_codes:   usize,
    /// Width of the next-day prediction head
    pub num_targets: usize,
    pub max_days:    usize,
    pub size:        usize,
    pub num_heads:   usize,
    pub num_layers:  usize,
    pub dropout:     f64,
}

impl ClmbrModelConfig {
    pub fn from_settings(config: &ModelConfig, info: &ModelInfo) -> Self {
        let num_targets = config.num_first.min(info.num_codes()).max(1);
        Self::new(
            info.num_codes(), num_targets, config.max_days,
            config.size, config.num_heads, config.num_layers, config.dropout,
        )
    }

    /// Embedding-table slot used for padding codes
    pub fn pad_code(&self) -> u32 {
        self.num_codes as u32
    }

    pub fn init<B: Backend>(&self, device: &B::Device) -> ClmbrModel<B> {
        let code_embedding     = EmbeddingConfig::new(self.num_codes + 1, self.size).init(device);
        let position_embedding = EmbeddingConfig::new(self.max_days, self.size).init(device);
        let layers: Vec<EncoderBlock<B>> = (0..self.num_layers)
            .map(|_| self.build_encoder_block(device))
            .collect();
        let final_norm      = LayerNormConfig::new(self.size).init(device);
        let prediction_head = LinearConfig::new(self.size, self.num_targets).init(device);
        let dropout         = DropoutConfig::new(self.dropout).init();
        ClmbrModel {
            code_embedding, position_embedding, layers,
            final_norm, prediction_head, dropout,
        }
    }

    fn build_encoder_block<B: Backend>(&self, device: &B::Device) -> EncoderBlock<B> {
        let self_attn   = MultiHeadAttentionConfig::new(self.size, self.num_heads)
            .with_dropout(self.dropout)
            .init(device);
        let ffn_linear1 = LinearConfig::new(self.size, 4 * self.size).init(device);
        let ffn_linear2 = LinearConfig::new(4 * self.size, self.size).init(device);
        let norm1   = LayerNormConfig::new(self.size).init(device);
        let norm2   = LayerNormConfig::new(self.size).init(device);
        let dropout = DropoutConfig::new(self.dropout).init();
        EncoderBlock { self_attn, ffn_linear1, ffn_linear2, norm1, norm2, dropout }
    }
}

#[derive(Module, Debug)]
pub struct EncoderBlock<B: Backend> {
    pub self_attn:   MultiHeadAttention<B>,
    pub ffn_linear1: Linear<B>,
    pub ffn_linear2: Linear<B>,
    pub norm1:       LayerNorm<B>,
    pub norm2:       LayerNorm<B>,
    pub dropout:     Dropout,
}

impl<B: Backend> EncoderBlock<B> {
    pub fn forward(&self, x: Tensor<B, 3>, mask: Tensor<B, 3, Bool>) -> Tensor<B, 3> {
        let attn_input  = MhaInput::self_attn(x.clone()).mask_attn(mask);
        let attn_output = self.self_attn.forward(attn_input).context;
        let x = self.norm1.forward(x + self.dropout.forward(attn_output));
        let ffn_out = self.ffn_linear2.forward(
            burn::tensor::activation::gelu(self.ffn_linear1.forward(x.clone()))
        );
        self.norm2.forward(x + self.dropout.forward(ffn_out))
    }
}

/// Day-level timeline encoder.
///
/// Each day is the mean of its code embeddings plus a position
/// embedding; causal self-attention means the vector at day i only
/// sees days 0..=i, which is what makes it usable as the patient's
/// representation "as of" day i.
#[derive(Module, Debug)]
pub struct ClmbrModel<B: Backend> {
    pub code_embedding:     Embedding<B>,
    pub position_embedding: Embedding<B>,
    pub layers:             Vec<EncoderBlock<B>>,
    pub final_norm:         LayerNorm<B>,
    pub prediction_head:    Linear<B>,
    pub dropout:            Dropout,
}

/// Tensors for one batch, padded to [batch, days, width]
pub struct TimelineTensors<B: Backend> {
    /// Dense codes, padding slot where absent — [batch, days, width]
    pub codes:       Tensor<B, 3, Int>,
    /// 1.0 for real codes — [batch, days, width]
    pub code_mask:   Tensor<B, 3>,
    /// Multi-hot next-day targets — [batch, days, num_targets]
    pub targets:     Tensor<B, 3>,
    /// 1.0 where a next day exists — [batch, days]
    pub target_mask: Tensor<B, 2>,
}

pub struct ClmbrOutput<B: Backend> {
    pub loss:       Tensor<B, 1>,
    pub embeddings: Tensor<B, 3>,
}

impl<B: Backend> ClmbrModel<B> {
    /// codes, code_mask: [batch, days, width] → embeddings: [batch, days, size]
    pub fn embed(&self, codes: Tensor<B, 3, Int>, code_mask: Tensor<B, 3>) -> Tensor<B, 3> {
        let [batch_size, days, width] = codes.dims();
        let device = codes.device();

        // Bag of codes per day: masked mean of the code embeddings
        let code_vectors = self.code_embedding.forward(codes.reshape([batch_size, days * width]));
        let size = code_vectors.dims()[2];
        let code_vectors = code_vectors.reshape([batch_size, days, width, size]);
        let mask   = code_mask.reshape([batch_size, days, width, 1]);
        let counts = mask.clone().sum_dim(2).clamp_min(1.0);
        let day_vectors = ((code_vectors * mask).sum_dim(2) / counts)
            .reshape([batch_size, days, size]);

        let positions = Tensor::<B, 1, Int>::arange(0..days as i64, &device)
            .unsqueeze::<2>()
            .expand([batch_size, days]);
        let pos_emb = self.position_embedding.forward(positions);

        let causal = generate_autoregressive_mask::<B>(batch_size, days, &device);
        let mut x = self.dropout.forward(day_vectors + pos_emb);
        for layer in &self.layers {
            x = layer.forward(x, causal.clone());
        }
        self.final_norm.forward(x)
    }

    /// Masked binary cross-entropy of next-day code prediction
    pub fn forward_loss(&self, input: TimelineTensors<B>) -> ClmbrOutput<B> {
        let TimelineTensors { codes, code_mask, targets, target_mask } = input;
        let embeddings = self.embed(codes, code_mask);

        let logits = self.prediction_head.forward(embeddings.clone()); // [batch, days, targets]
        let [batch_size, days, num_targets] = logits.dims();

        // max(x, 0) - x·y + ln(1 + e^-|x|)
        let per_code = logits.clone().clamp_min(0.0)
            - logits.clone() * targets
            + logits.abs().neg().exp().add_scalar(1.0).log();
        let per_day = per_code.sum_dim(2).reshape([batch_size, days]);

        let total = (per_day * target_mask.clone()).sum();
        let count = target_mask.sum().mul_scalar(num_targets as f32).clamp_min(1.0);

        ClmbrOutput { loss: total / count, embeddings }
    }

    /// Check restored parameters against the expected layout
    pub fn check_shapes(&self, layout: &ClmbrModelConfig) -> Result<(), String> {
        let expected = [
            ("code embedding", self.code_embedding.weight.val().dims(), [layout.num_codes + 1, layout.size]),
            ("position embedding", self.position_embedding.weight.val().dims(), [layout.max_days, layout.size]),
            ("prediction head", self.prediction_head.weight.val().dims(), [layout.size, layout.num_targets]),
        ];
        for (name, actual, want) in expected {
            if actual != want {
                return Err(format!("{name} has shape {actual:?}, expected {want:?}"));
            }
        }
        if self.layers.len() != layout.num_layers {
            return Err(format!(
                "checkpoint has {} encoder layers, expected {}",
                self.layers.len(), layout.num_layers
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type B = NdArray;

    fn layout() -> ClmbrModelConfig {
        ClmbrModelConfig::new(6, 3, 8, 8, 2, 1, 0.0)
    }

    fn inputs(device: &<B as Backend>::Device) -> TimelineTensors<B> {
        // 2 patients, 3 days, 2 codes per day; second patient has 2 real days
        let codes = Tensor::<B, 1, Int>::from_ints([0, 1, 2, 6, 3, 6, 4, 5, 0, 6, 6, 6], device)
            .reshape([2, 3, 2]);
        let code_mask = Tensor::<B, 1>::from_floats(
            [1.0, 1.0, 1.0, 0.0, 1.0, 0.0, 1.0, 1.0, 1.0, 0.0, 0.0, 0.0], device,
        ).reshape([2, 3, 2]);
        let targets = Tensor::<B, 3>::zeros([2, 3, 3], device);
        let target_mask = Tensor::<B, 1>::from_floats([1.0, 1.0, 0.0, 1.0, 0.0, 0.0], device)
            .reshape([2, 3]);
        TimelineTensors { codes, code_mask, targets, target_mask }
    }

    #[test]
    fn test_embedding_shape() {
        let device = Default::default();
        let model  = layout().init::<B>(&device);
        let input  = inputs(&device);
        let out    = model.embed(input.codes, input.code_mask);
        assert_eq!(out.dims(), [2, 3, 8]);
    }

    #[test]
    fn test_loss_is_finite_and_positive() {
        let device = Default::default();
        let model  = layout().init::<B>(&device);
        let loss: f64 = model.forward_loss(inputs(&device)).loss.into_scalar().elem::<f64>();
        assert!(loss.is_finite());
        assert!(loss > 0.0);
    }

    #[test]
    fn test_earlier_days_ignore_later_days() {
        // Changing day 2 must not move the embedding of day 0 (causal attention)
        let device = Default::default();
        let model  = layout().init::<B>(&device);

        let a = inputs(&device);
        let b = inputs(&device);
        let b_codes = Tensor::<B, 1, Int>::from_ints([0, 1, 2, 6, 5, 6, 4, 5, 0, 6, 6, 6], &device)
            .reshape([2, 3, 2]);

        let ea = model.embed(a.codes, a.code_mask).slice([0..1, 0..1, 0..8]).into_data().to_vec::<f32>().unwrap();
        let eb = model.embed(b_codes, b.code_mask).slice([0..1, 0..1, 0..8]).into_data().to_vec::<f32>().unwrap();
        for (x, y) in ea.iter().zip(&eb) {
            assert!((x - y).abs() < 1e-5);
        }
    }

    #[test]
    fn test_check_shapes_flags_wrong_layout() {
        let device = Default::default();
        let model  = layout().init::<B>(&device);
        assert!(model.check_shapes(&layout()).is_ok());

        let bigger = ClmbrModelConfig::new(6, 3, 8, 16, 2, 1, 0.0);
        assert!(model.check_shapes(&bigger).is_err());

        let deeper = ClmbrModelConfig::new(6, 3, 8, 8, 2, 2, 0.0);
        assert!(model.check_shapes(&deeper).is_err());
    }
}
