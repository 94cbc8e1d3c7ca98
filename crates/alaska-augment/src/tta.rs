//! Test-time augmentation over the dihedral group.
//!
//! Each transform is a short sequence of descriptors applied left to right.
//! Predictions made on an augmented sample can be mapped back with
//! [`inverse_sequence`].

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::geometry::{Descriptor, QuarterTurns};
use crate::target::{Sample, TargetRegistry};

/// A set of test-time transforms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TtaFamily {
    /// Identity plus horizontal, vertical and both flips.
    Hv,
    /// All eight symmetries of the square.
    D4,
}

impl TtaFamily {
    pub fn transforms(self) -> Vec<Vec<Descriptor>> {
        match self {
            TtaFamily::Hv => hv_transforms(),
            TtaFamily::D4 => d4_transforms(),
        }
    }
}

fn rot90(k: u32) -> Descriptor {
    Descriptor::Rotate90(QuarterTurns::wrapping(k))
}

/// Identity, three quarter turns, transpose, and transpose followed by each
/// quarter turn.
pub fn d4_transforms() -> Vec<Vec<Descriptor>> {
    let mut transforms = vec![vec![Descriptor::Identity]];
    transforms.extend((1..4).map(|k| vec![rot90(k)]));
    transforms.push(vec![Descriptor::Transpose]);
    transforms.extend((1..4).map(|k| vec![Descriptor::Transpose, rot90(k)]));
    transforms
}

/// Identity, horizontal flip, vertical flip, and both flips.
pub fn hv_transforms() -> Vec<Vec<Descriptor>> {
    vec![
        vec![Descriptor::Identity],
        vec![Descriptor::HorizontalFlip],
        vec![Descriptor::VerticalFlip],
        vec![Descriptor::HorizontalFlip, Descriptor::VerticalFlip],
    ]
}

/// The sequence that undoes `sequence`.
pub fn inverse_sequence(sequence: &[Descriptor]) -> Vec<Descriptor> {
    sequence.iter().rev().map(|d| d.inverse()).collect()
}

/// Apply a descriptor sequence to every tensor of `sample`.
pub fn apply_sequence(
    sample: &Sample,
    registry: &TargetRegistry,
    sequence: &[Descriptor],
) -> Result<Sample> {
    sequence
        .iter()
        .try_fold(sample.clone(), |current, &d| current.apply_geometric(registry, d))
}

/// One augmented copy of `sample` per transform of `family`, in order.
///
/// # Errors
///
/// Fails on the first transform whose application fails (unregistered key,
/// payload/category mismatch, DCT planes off the block grid).
pub fn augment_all(
    sample: &Sample,
    registry: &TargetRegistry,
    family: TtaFamily,
) -> Result<Vec<Sample>> {
    family
        .transforms()
        .iter()
        .map(|sequence| apply_sequence(sample, registry, sequence))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dct::DctImage;
    use crate::target::{test_tensor, TargetData, INPUT_DCT_KEY, INPUT_IMAGE_KEY};

    fn sample() -> Sample {
        let dct = DctImage::new(16, 24, (0..16 * 24 * 3).map(|i| i as f32).collect()).unwrap();
        Sample::new()
            .with(INPUT_IMAGE_KEY, TargetData::Image(test_tensor(16, 24, 3)))
            .with(INPUT_DCT_KEY, TargetData::Dct(dct))
    }

    #[test]
    fn test_family_sizes() {
        assert_eq!(d4_transforms().len(), 8);
        assert_eq!(hv_transforms().len(), 4);
        assert_eq!(TtaFamily::D4.transforms(), d4_transforms());
    }

    #[test]
    fn test_d4_outputs_are_distinct() {
        let registry = TargetRegistry::alaska();
        let outputs = augment_all(&sample(), &registry, TtaFamily::D4).unwrap();

        assert_eq!(outputs.len(), 8);
        for i in 0..outputs.len() {
            for j in i + 1..outputs.len() {
                assert_ne!(outputs[i], outputs[j], "transforms {i} and {j} coincide");
            }
        }
    }

    #[test]
    fn test_inverse_restores_sample() {
        let registry = TargetRegistry::alaska();
        let input = sample();

        for sequence in d4_transforms().into_iter().chain(hv_transforms()) {
            let augmented = apply_sequence(&input, &registry, &sequence).unwrap();
            let inverse = inverse_sequence(&sequence);
            let restored = apply_sequence(&augmented, &registry, &inverse).unwrap();
            assert_eq!(restored, input, "{sequence:?}");
        }
    }

    #[test]
    fn test_hv_both_flips_is_half_turn() {
        let registry = TargetRegistry::alaska();
        let input = sample();

        let flipped = apply_sequence(&input, &registry, &hv_transforms()[3]).unwrap();
        let rotated = apply_sequence(&input, &registry, &[rot90(2)]).unwrap();
        assert_eq!(flipped, rotated);
    }

    #[test]
    fn test_family_serde() {
        assert_eq!(serde_json::to_string(&TtaFamily::D4).unwrap(), r#""d4""#);
        let family: TtaFamily = serde_json::from_str(r#""hv""#).unwrap();
        assert_eq!(family, TtaFamily::Hv);
    }
}
