//! Augmentation pipelines for steganalysis training.
//!
//! This module provides:
//! - Individual steps (flips, quarter turns, crops, tile shuffles, dropout,
//!   JPEG recompression, downscaling, blur) with an application probability
//! - Pipelines that sample each step once per sample and record the drawn
//!   parameters for exact replay
//! - The ALASKA2 severity presets and the obliteration pipeline
//!
//! # Target Handling
//!
//! Steps touch each tensor according to its registered [`TargetKind`]:
//! geometric steps move every category, photometric steps only touch
//! images, and steps that cannot express their effect on a category (a
//! resized crop of DCT coefficients) fail with `UnsupportedTarget` instead
//! of silently passing the tensor through.
//!
//! [`TargetKind`]: crate::target::TargetKind

mod photometric;
mod pipeline;
mod presets;
mod step;
mod structural;

pub use photometric::{downscale, gaussian_blur, jpeg_compress, resize_tensor};
pub use pipeline::{Pipeline, ReplayRecord};
pub use presets::{
    augmentations_for_level, get_augmentations, obliterate_augmentations, AugmentationConfig,
    AugmentationLevel, NATIVE_IMAGE_SIZE,
};
pub use step::{Interpolation, Op, Step, StepParams};
