//! Named bags of tensors and the per-category dispatch of transforms.
//!
//! One training sample carries several tensors that must stay aligned: the
//! pixel image, optional masks and annotations, extra feature maps (ELA,
//! blur residuals, per-channel planes) and one or more DCT coefficient
//! tensors. A [`TargetRegistry`] tags every key of a [`Sample`] with a
//! [`TargetKind`], and each kind has exactly one handler per operation.
//!
//! # Replay
//!
//! A geometric transform is sampled once per sample as a [`Descriptor`] and
//! then passed explicitly to the handler of every key, so the pixel image and
//! its DCT representation always receive the same rotation or transpose.

mod annotations;
mod geometric;
mod tensor;

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use crate::dct::DctImage;
use crate::error::{AugmentError, Result};
use crate::geometry::Descriptor;

pub use annotations::{BBox, CropWindow, Keypoint};
pub use geometric::{apply_descriptor, geometric_handler, GeometricHandler};
pub(crate) use geometric::mismatch;
pub(crate) use tensor::{check_region, PlaneBuffer};
pub use tensor::ImageTensor;

#[cfg(test)]
pub(crate) use tensor::tests::test_tensor;

pub const INPUT_IMAGE_KEY: &str = "image";
pub const INPUT_MASK_KEY: &str = "mask";
pub const INPUT_MASKS_KEY: &str = "masks";
pub const INPUT_BBOXES_KEY: &str = "bboxes";
pub const INPUT_KEYPOINTS_KEY: &str = "keypoints";

pub const INPUT_FEATURES_ELA_KEY: &str = "input_ela";
pub const INPUT_FEATURES_BLUR_KEY: &str = "input_blur";
pub const INPUT_FEATURES_CHANNEL_Y_KEY: &str = "input_channel_y";
pub const INPUT_FEATURES_CHANNEL_CB_KEY: &str = "input_channel_cb";
pub const INPUT_FEATURES_CHANNEL_CR_KEY: &str = "input_channel_cr";

pub const INPUT_DCT_KEY: &str = "input_dct";
pub const INPUT_FEATURES_DCT_Y_KEY: &str = "input_dct_y";
pub const INPUT_FEATURES_DCT_CB_KEY: &str = "input_dct_cb";
pub const INPUT_FEATURES_DCT_CR_KEY: &str = "input_dct_cr";

/// Category of a tensor; selects the handler used for every operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TargetKind {
    /// Pixel image or feature map.
    Image,
    /// Single segmentation mask.
    Mask,
    /// List of segmentation masks.
    Masks,
    /// Normalized bounding boxes.
    BBoxes,
    /// Pixel keypoints.
    Keypoints,
    /// JPEG DCT coefficients in pixel-position layout.
    Dct,
}

/// Tensor payload stored under one key of a [`Sample`].
#[derive(Debug, Clone, PartialEq)]
pub enum TargetData {
    Image(ImageTensor),
    Mask(ImageTensor),
    Masks(Vec<ImageTensor>),
    BBoxes(Vec<BBox>),
    Keypoints(Vec<Keypoint>),
    Dct(DctImage<f32>),
}

impl TargetData {
    /// The category this payload belongs to.
    pub fn kind(&self) -> TargetKind {
        match self {
            TargetData::Image(_) => TargetKind::Image,
            TargetData::Mask(_) => TargetKind::Mask,
            TargetData::Masks(_) => TargetKind::Masks,
            TargetData::BBoxes(_) => TargetKind::BBoxes,
            TargetData::Keypoints(_) => TargetKind::Keypoints,
            TargetData::Dct(_) => TargetKind::Dct,
        }
    }

    /// Spatial `(height, width)` of grid-shaped payloads.
    pub fn spatial_size(&self) -> Option<(usize, usize)> {
        match self {
            TargetData::Image(t) | TargetData::Mask(t) => Some((t.height(), t.width())),
            TargetData::Masks(masks) => masks.first().map(|t| (t.height(), t.width())),
            TargetData::Dct(d) => Some((d.height(), d.width())),
            TargetData::BBoxes(_) | TargetData::Keypoints(_) => None,
        }
    }
}

/// Maps sample keys to tensor categories.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetRegistry {
    targets: HashMap<String, TargetKind>,
}

impl Default for TargetRegistry {
    fn default() -> Self {
        let targets = [
            (INPUT_IMAGE_KEY, TargetKind::Image),
            (INPUT_MASK_KEY, TargetKind::Mask),
            (INPUT_MASKS_KEY, TargetKind::Masks),
            (INPUT_BBOXES_KEY, TargetKind::BBoxes),
            (INPUT_KEYPOINTS_KEY, TargetKind::Keypoints),
        ]
        .into_iter()
        .map(|(key, kind)| (key.to_string(), kind))
        .collect();

        Self { targets }
    }
}

impl TargetRegistry {
    /// Registry with only the built-in keys (`image`, `mask`, `masks`,
    /// `bboxes`, `keypoints`).
    pub fn new() -> Self {
        Self::default()
    }

    /// Built-in keys plus the ALASKA2 feature maps and DCT tensors.
    pub fn alaska() -> Self {
        let mut registry = Self::new();
        for key in [
            INPUT_FEATURES_ELA_KEY,
            INPUT_FEATURES_BLUR_KEY,
            INPUT_FEATURES_CHANNEL_Y_KEY,
            INPUT_FEATURES_CHANNEL_CB_KEY,
            INPUT_FEATURES_CHANNEL_CR_KEY,
        ] {
            registry.register(key, TargetKind::Image);
        }
        for key in [
            INPUT_DCT_KEY,
            INPUT_FEATURES_DCT_Y_KEY,
            INPUT_FEATURES_DCT_CB_KEY,
            INPUT_FEATURES_DCT_CR_KEY,
        ] {
            registry.register(key, TargetKind::Dct);
        }
        registry
    }

    /// Register (or re-register) an additional key.
    pub fn register(&mut self, key: impl Into<String>, kind: TargetKind) -> &mut Self {
        self.targets.insert(key.into(), kind);
        self
    }

    /// Category of `key`, if registered.
    pub fn kind_of(&self, key: &str) -> Option<TargetKind> {
        self.targets.get(key).copied()
    }

    /// Category of `key`.
    ///
    /// # Errors
    ///
    /// Returns `AugmentError::InvalidArgument` for unregistered keys.
    pub fn resolve(&self, key: &str) -> Result<TargetKind> {
        self.kind_of(key).ok_or_else(|| {
            AugmentError::InvalidArgument(format!("target key `{key}` is not registered"))
        })
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}

/// All tensors belonging to one training sample, by key.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Sample {
    targets: BTreeMap<String, TargetData>,
}

impl Sample {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, key: impl Into<String>, data: TargetData) -> Self {
        self.insert(key, data);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, data: TargetData) -> Option<TargetData> {
        self.targets.insert(key.into(), data)
    }

    pub fn get(&self, key: &str) -> Option<&TargetData> {
        self.targets.get(key)
    }

    pub fn remove(&mut self, key: &str) -> Option<TargetData> {
        self.targets.remove(key)
    }

    /// Iterate over `(key, data)` in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &TargetData)> {
        self.targets.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    /// Common `(height, width)` of every grid-shaped tensor.
    ///
    /// # Errors
    ///
    /// Returns `AugmentError::InvalidArgument` if the sample holds no
    /// grid-shaped tensor or two of them disagree.
    pub fn spatial_size(&self) -> Result<(usize, usize)> {
        let mut size = None;
        for (key, data) in &self.targets {
            let Some(current) = data.spatial_size() else {
                continue;
            };
            match size {
                None => size = Some(current),
                Some(expected) if expected != current => {
                    return Err(AugmentError::InvalidArgument(format!(
                        "target `{key}` is {}x{}, expected {}x{}",
                        current.0, current.1, expected.0, expected.1
                    )));
                }
                Some(_) => {}
            }
        }

        size.ok_or_else(|| {
            AugmentError::InvalidArgument("sample has no image-like target".to_string())
        })
    }

    /// Apply one descriptor to every tensor, routed by registered category.
    ///
    /// # Errors
    ///
    /// Fails if a key is unregistered, a payload does not match its
    /// registered category, or the sample has no spatial size.
    pub fn apply_geometric(
        &self,
        registry: &TargetRegistry,
        descriptor: Descriptor,
    ) -> Result<Self> {
        if descriptor == Descriptor::Identity {
            return Ok(self.clone());
        }

        let size = self.spatial_size()?;
        let mut output = BTreeMap::new();
        for (key, data) in &self.targets {
            let kind = registry.resolve(key)?;
            output.insert(key.clone(), apply_descriptor(kind, data, descriptor, size)?);
        }

        Ok(Self { targets: output })
    }

    /// Rebuild a sample by mapping every `(key, kind, data)` through `f`.
    pub(crate) fn try_map<F>(&self, registry: &TargetRegistry, mut f: F) -> Result<Self>
    where
        F: FnMut(&str, TargetKind, &TargetData) -> Result<TargetData>,
    {
        let mut output = BTreeMap::new();
        for (key, data) in &self.targets {
            let kind = registry.resolve(key)?;
            output.insert(key.clone(), f(key, kind, data)?);
        }
        Ok(Self { targets: output })
    }
}
