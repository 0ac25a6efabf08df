//! Compile-time backend selection.
//!
//! The GPU backend is used by default; build with
//! `--no-default-features --features ndarray` to train on the CPU instead.

use burn::{backend::Autodiff, tensor::backend::Backend};

#[cfg(feature = "wgpu")]
pub type DefaultBackend = burn::backend::Wgpu<f32, i32>;

#[cfg(all(feature = "ndarray", not(feature = "wgpu")))]
pub type DefaultBackend = burn::backend::NdArray<f32>;

#[cfg(not(any(feature = "wgpu", feature = "ndarray")))]
compile_error!("enable the `wgpu` or the `ndarray` feature");

pub type TrainingBackend = Autodiff<DefaultBackend>;

pub fn default_device() -> <DefaultBackend as Backend>::Device {
    Default::default()
}

pub fn backend_name() -> &'static str {
    if cfg!(feature = "wgpu") {
        "wgpu (GPU)"
    } else {
        "ndarray (CPU)"
    }
}
