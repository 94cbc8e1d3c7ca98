//! Geometric handlers, one per target category.

use super::{TargetData, TargetKind};
use crate::dct::dct_transform;
use crate::error::{AugmentError, Result};
use crate::geometry::Descriptor;

/// Applies a descriptor to one payload of a sample whose image-like tensors
/// are `(height, width)`.
pub type GeometricHandler = fn(&TargetData, Descriptor, (usize, usize)) -> Result<TargetData>;

/// The handler registered for `kind`.
pub fn geometric_handler(kind: TargetKind) -> GeometricHandler {
    match kind {
        TargetKind::Image => image_handler,
        TargetKind::Mask => mask_handler,
        TargetKind::Masks => masks_handler,
        TargetKind::BBoxes => bboxes_handler,
        TargetKind::Keypoints => keypoints_handler,
        TargetKind::Dct => dct_handler,
    }
}

/// Dispatch `data` to the handler of its registered `kind`.
///
/// # Errors
///
/// Returns `AugmentError::InvalidArgument` if the payload does not belong to
/// `kind`.
pub fn apply_descriptor(
    kind: TargetKind,
    data: &TargetData,
    descriptor: Descriptor,
    size: (usize, usize),
) -> Result<TargetData> {
    geometric_handler(kind)(data, descriptor, size)
}

fn image_handler(data: &TargetData, d: Descriptor, _: (usize, usize)) -> Result<TargetData> {
    match data {
        TargetData::Image(t) => Ok(TargetData::Image(t.transform(d))),
        other => Err(mismatch(TargetKind::Image, other)),
    }
}

fn mask_handler(data: &TargetData, d: Descriptor, _: (usize, usize)) -> Result<TargetData> {
    match data {
        TargetData::Mask(t) => Ok(TargetData::Mask(t.transform(d))),
        other => Err(mismatch(TargetKind::Mask, other)),
    }
}

fn masks_handler(data: &TargetData, d: Descriptor, _: (usize, usize)) -> Result<TargetData> {
    match data {
        TargetData::Masks(masks) => Ok(TargetData::Masks(
            masks.iter().map(|t| t.transform(d)).collect(),
        )),
        other => Err(mismatch(TargetKind::Masks, other)),
    }
}

fn bboxes_handler(data: &TargetData, d: Descriptor, _: (usize, usize)) -> Result<TargetData> {
    match data {
        TargetData::BBoxes(boxes) => Ok(TargetData::BBoxes(
            boxes.iter().map(|b| b.transform(d)).collect(),
        )),
        other => Err(mismatch(TargetKind::BBoxes, other)),
    }
}

fn keypoints_handler(
    data: &TargetData,
    d: Descriptor,
    (rows, cols): (usize, usize),
) -> Result<TargetData> {
    match data {
        TargetData::Keypoints(points) => Ok(TargetData::Keypoints(
            points.iter().map(|p| p.transform(d, rows, cols)).collect(),
        )),
        other => Err(mismatch(TargetKind::Keypoints, other)),
    }
}

fn dct_handler(data: &TargetData, d: Descriptor, _: (usize, usize)) -> Result<TargetData> {
    match data {
        TargetData::Dct(image) => Ok(TargetData::Dct(dct_transform(image, d).into_owned())),
        other => Err(mismatch(TargetKind::Dct, other)),
    }
}

pub(crate) fn mismatch(expected: TargetKind, data: &TargetData) -> AugmentError {
    AugmentError::InvalidArgument(format!(
        "target registered as {expected:?} holds {:?} data",
        data.kind()
    ))
}
