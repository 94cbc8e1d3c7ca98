//! Severity presets used for training, and the obliteration pipeline.
//!
//! Every preset is bound to [`TargetRegistry::alaska`], so ELA/blur/YCbCr
//! feature maps follow the image and DCT planes follow it block-exactly.

use std::fmt;
use std::str::FromStr;

use log::debug;
use serde::{Deserialize, Serialize};

use super::pipeline::Pipeline;
use super::step::{Interpolation, Op, Step};
use crate::error::{AugmentError, Result};
use crate::target::TargetRegistry;

/// Resolution of the ALASKA2 cover and stego images.
pub const NATIVE_IMAGE_SIZE: (usize, usize) = (512, 512);

/// How aggressively training samples are augmented.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum AugmentationLevel {
    None,
    Safe,
    #[default]
    Light,
    Medium,
    Hard,
}

impl AugmentationLevel {
    pub const ALL: [AugmentationLevel; 5] = [
        AugmentationLevel::None,
        AugmentationLevel::Safe,
        AugmentationLevel::Light,
        AugmentationLevel::Medium,
        AugmentationLevel::Hard,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            AugmentationLevel::None => "none",
            AugmentationLevel::Safe => "safe",
            AugmentationLevel::Light => "light",
            AugmentationLevel::Medium => "medium",
            AugmentationLevel::Hard => "hard",
        }
    }
}

impl fmt::Display for AugmentationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AugmentationLevel {
    type Err = AugmentError;

    fn from_str(s: &str) -> Result<Self> {
        let lower = s.to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|level| level.as_str() == lower)
            .ok_or_else(|| AugmentError::UnknownConfiguration(s.to_string()))
    }
}

impl TryFrom<String> for AugmentationLevel {
    type Error = AugmentError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<AugmentationLevel> for String {
    fn from(level: AugmentationLevel) -> Self {
        level.as_str().to_string()
    }
}

/// Serializable description of a training augmentation pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AugmentationConfig {
    pub level: AugmentationLevel,
    /// Target `(height, width)` of the training crops.
    pub image_size: (usize, usize),
}

impl Default for AugmentationConfig {
    fn default() -> Self {
        Self {
            level: AugmentationLevel::default(),
            image_size: NATIVE_IMAGE_SIZE,
        }
    }
}

impl AugmentationConfig {
    /// Assemble the pipeline this configuration describes.
    pub fn build(&self) -> Pipeline {
        augmentations_for_level(self.level, self.image_size)
    }
}

/// Build the preset named `level` (case-insensitive).
///
/// # Arguments
///
/// * `level` - One of `none`, `safe`, `light`, `medium`, `hard`
/// * `image_size` - Training `(height, width)`; anything other than 512x512
///   adds a leading random crop
///
/// # Errors
///
/// Returns `AugmentError::UnknownConfiguration` for any other level name.
pub fn get_augmentations(level: &str, image_size: (usize, usize)) -> Result<Pipeline> {
    Ok(augmentations_for_level(level.parse()?, image_size))
}

/// Build the preset for an already parsed level.
pub fn augmentations_for_level(level: AugmentationLevel, image_size: (usize, usize)) -> Pipeline {
    let steps = match level {
        AugmentationLevel::None => vec![Step::always(Op::NoOp)],
        AugmentationLevel::Safe => vec![
            maybe_crop(image_size),
            Step::new(Op::HorizontalFlip, 0.5),
            Step::new(Op::VerticalFlip, 0.5),
        ],
        AugmentationLevel::Light => vec![
            maybe_crop(image_size),
            Step::always(Op::RandomRotate90),
            Step::new(Op::Transpose, 0.5),
        ],
        AugmentationLevel::Medium => vec![
            maybe_crop(image_size),
            Step::always(Op::RandomRotate90),
            Step::new(Op::Transpose, 0.5),
            cutout(),
        ],
        AugmentationLevel::Hard => vec![
            maybe_crop(image_size),
            Step::new(Op::RandomRotate90, 0.5),
            Step::new(Op::Transpose, 0.5),
            Step::new(
                Op::OneOf(
                    [2, 3, 4]
                        .into_iter()
                        .map(|grid| Step::always(Op::RandomGridShuffle { grid }))
                        .collect(),
                ),
                0.1,
            ),
            cutout(),
        ],
    };

    debug!("Assembled {level} augmentations with {} steps", steps.len());
    Pipeline::with_registry(steps, TargetRegistry::alaska())
}

/// Heavy, label-destroying corruptions: exactly one of them fires.
///
/// The resized crops cannot resample DCT coefficients and the pixel-value
/// branches would leave them describing the old image, so samples carrying
/// any DCT key are rejected with `UnsupportedTarget` before a branch is
/// drawn. Drop the DCT keys from the sample before obliterating it.
pub fn obliterate_augmentations() -> Pipeline {
    let sized_crop = |interpolation| {
        Step::always(Op::RandomSizedCrop {
            min_max_height: (256, 384),
            height: NATIVE_IMAGE_SIZE.0,
            width: NATIVE_IMAGE_SIZE.1,
            interpolation,
        })
    };

    let steps = vec![Step::always(Op::OneOf(vec![
        Step::always(Op::ImageCompression {
            quality_lower: 70,
            quality_upper: 95,
        }),
        sized_crop(Interpolation::Cubic),
        sized_crop(Interpolation::Linear),
        Step::always(Op::Downscale {
            scale_min: 0.25,
            scale_max: 0.25,
        }),
        Step::always(Op::GaussianBlur { blur_limit: (5, 9) }),
    ]))];

    Pipeline::with_registry(steps, TargetRegistry::alaska())
}

fn maybe_crop((height, width): (usize, usize)) -> Step {
    if (height, width) == NATIVE_IMAGE_SIZE {
        return Step::always(Op::NoOp);
    }

    debug!("Adding RandomCrop, target image size is {height}x{width}");
    Step::always(Op::RandomCrop { height, width })
}

fn cutout() -> Step {
    Step::new(
        Op::CoarseDropout {
            max_holes: 1,
            min_height: 32,
            max_height: 256,
            min_width: 32,
            max_width: 256,
        },
        0.2,
    )
}
