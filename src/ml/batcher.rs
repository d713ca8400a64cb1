// ============================================================
// Layer 5 — Timeline Tensorizer
// ============================================================
// Converts a host-side TimelineBatch into backend tensors.
//
// How padding works here:
//   Input:  N examples with ragged days and ragged code bags
//   Output: [N, D, W] code tensors where
//             D = longest window in the batch
//             W = widest day in the batch
//
//   Absent slots hold the padding code (num_codes) with mask 0,
//   so they never contribute to a day's mean embedding. Days past
//   an example's length have target_mask 0 and add nothing to the
//   loss; their embeddings are computed but never read back.
//
//   Flatten row-major, then reshape, as for any burn batch:
//   [e0_d0_c0, e0_d0_c1, ..., eN_dD_cW] → [N, D, W]
//
// Reference: Burn Book §4 (Batcher)

use burn::prelude::*;

use crate::domain::batch::TimelineBatch;
use crate::ml::model::{ClmbrModelConfig, TimelineTensors};

/// Holds the device and the vocabulary layout tensors are built for
#[derive(Clone, Debug)]
pub struct TimelineTensorizer<B: Backend> {
    device:      B::Device,
    pad_code:    u32,
    num_targets: usize,
}

impl<B: Backend> TimelineTensorizer<B> {
    pub fn new(device: B::Device, layout: &ClmbrModelConfig) -> Self {
        Self { device, pad_code: layout.pad_code(), num_targets: layout.num_targets }
    }

    pub fn tensors(&self, batch: &TimelineBatch) -> TimelineTensors<B> {
        let batch_size  = batch.len();
        let days        = batch.max_days();
        let width       = batch.max_codes_per_day();
        let num_targets = self.num_targets;

        let mut codes       = vec![self.pad_code as i32; batch_size * days * width];
        let mut code_mask   = vec![0.0f32; batch_size * days * width];
        let mut targets     = vec![0.0f32; batch_size * days * num_targets];
        let mut target_mask = vec![0.0f32; batch_size * days];

        for (e, example) in batch.examples.iter().enumerate() {
            for (d, day) in example.inputs.iter().enumerate() {
                let base = (e * days + d) * width;
                for (k, &code) in day.iter().enumerate() {
                    codes[base + k]     = code as i32;
                    code_mask[base + k] = 1.0;
                }
            }
            // targets[d] holds the codes of day d+1
            for (d, next) in example.targets.iter().enumerate() {
                target_mask[e * days + d] = 1.0;
                let base = (e * days + d) * num_targets;
                for &code in next {
                    if (code as usize) < num_targets {
                        targets[base + code as usize] = 1.0;
                    }
                }
            }
        }

        TimelineTensors {
            codes: Tensor::<B, 1, Int>::from_ints(codes.as_slice(), &self.device)
                .reshape([batch_size, days, width]),
            code_mask: Tensor::<B, 1>::from_floats(code_mask.as_slice(), &self.device)
                .reshape([batch_size, days, width]),
            targets: Tensor::<B, 1>::from_floats(targets.as_slice(), &self.device)
                .reshape([batch_size, days, num_targets]),
            target_mask: Tensor::<B, 1>::from_floats(target_mask.as_slice(), &self.device)
                .reshape([batch_size, days]),
        }
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::batch::TimelineExample;
    use burn::backend::NdArray;

    type B = NdArray;

    #[test]
    fn test_padding_and_masks() {
        let layout = ClmbrModelConfig::new(5, 2, 8, 4, 1, 1, 0.0);
        let tensorizer = TimelineTensorizer::<B>::new(Default::default(), &layout);

        let batch = TimelineBatch::new(vec![
            TimelineExample {
                patient_id: 1,
                inputs:     vec![vec![0, 3], vec![1]],
                targets:    vec![vec![1]],
            },
            TimelineExample { patient_id: 2, inputs: vec![vec![4]], targets: vec![] },
        ]);
        let t = tensorizer.tensors(&batch);

        assert_eq!(t.codes.dims(), [2, 2, 2]);
        let codes: Vec<i64> = t.codes.into_data().convert::<i64>().to_vec().unwrap();
        assert_eq!(codes, vec![0, 3, 1, 5, 4, 5, 5, 5]);

        let mask: Vec<f32> = t.code_mask.into_data().to_vec().unwrap();
        assert_eq!(mask, vec![1.0, 1.0, 1.0, 0.0, 1.0, 0.0, 0.0, 0.0]);

        let targets: Vec<f32> = t.targets.into_data().to_vec().unwrap();
        assert_eq!(targets, vec![0.0, 1.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0]);

        let target_mask: Vec<f32> = t.target_mask.into_data().to_vec().unwrap();
        assert_eq!(target_mask, vec![1.0, 0.0, 0.0, 0.0]);
    }
}
