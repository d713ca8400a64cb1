// ============================================================
// Layer 5 — Backend Selection
// ============================================================
// Training uses TrainBackend (Autodiff<…>) for gradients.
// Evaluation inside the training loop runs on the inner
// backend via model.valid(); extraction uses InferBackend.
//
// Built with the default `wgpu` feature this is the GPU backend;
// without it everything runs on the ndarray CPU backend.

use burn::prelude::Backend;

#[cfg(feature = "wgpu")]
pub type InferBackend = burn::backend::Wgpu;

#[cfg(not(feature = "wgpu"))]
pub type InferBackend = burn::backend::NdArray;

pub type TrainBackend = burn::backend::Autodiff<InferBackend>;

pub type Device = <InferBackend as Backend>::Device;

pub fn default_device() -> Device {
    let device = Device::default();
    tracing::info!("Using device: {:?}", device);
    device
}
