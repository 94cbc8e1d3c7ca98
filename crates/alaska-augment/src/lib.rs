//! ALASKA2 Augment - Geometric augmentation for JPEG steganalysis
//!
//! This crate augments training samples made of pixel images, feature maps,
//! masks, annotations and the JPEG DCT coefficients of the same image, while
//! keeping every tensor consistent with the others. Rotations, transposes and
//! flips are applied to DCT coefficients directly in the frequency domain, so
//! no decode/re-encode cycle disturbs the embedding signal.
//!
//! # Modules
//!
//! - [`geometry`] - Dihedral transform descriptors
//! - [`dct`] - Per-block and whole-image DCT transforms
//! - [`target`] - Tensor categories, samples and per-category dispatch
//! - [`augment`] - Steps, replayable pipelines and severity presets
//! - [`tta`] - Test-time augmentation families

pub mod augment;
pub mod dct;
pub mod error;
pub mod geometry;
pub mod target;
pub mod tta;

pub use augment::{
    get_augmentations, obliterate_augmentations, AugmentationConfig, AugmentationLevel, Op,
    Pipeline, ReplayRecord, Step, StepParams,
};
pub use dct::{dct_rot90, dct_transpose, rotate_block, transpose_block, DctImage};
pub use error::{AugmentError, Result};
pub use geometry::{Descriptor, QuarterTurns};
pub use target::{Sample, TargetData, TargetKind, TargetRegistry};
pub use tta::{augment_all, d4_transforms, hv_transforms, TtaFamily};
