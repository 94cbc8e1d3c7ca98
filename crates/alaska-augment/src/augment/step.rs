//! Pipeline steps: configuration, parameter sampling and application.
//!
//! A [`Step`] is applied in two phases. [`Step::sample`] draws every random
//! decision up front into a [`StepParams`] value, and [`Step::apply`] executes
//! those parameters against a sample. Keeping the phases apart is what makes
//! replay exact: re-applying recorded parameters never touches the RNG.

use image::imageops::FilterType;
use log::trace;
use rand::Rng;
use serde::{Deserialize, Serialize};

use super::{photometric, structural};
use crate::error::{AugmentError, Result};
use crate::geometry::Descriptor;
use crate::target::{CropWindow, Sample, TargetKind, TargetRegistry};

/// Resampling filter used when a step resizes pixel data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Interpolation {
    Nearest,
    #[default]
    Linear,
    Cubic,
}

impl Interpolation {
    /// Convert to the `image` crate's filter type.
    pub(crate) fn to_image_filter(self) -> FilterType {
        match self {
            Interpolation::Nearest => FilterType::Nearest,
            Interpolation::Linear => FilterType::Triangle,
            Interpolation::Cubic => FilterType::CatmullRom,
        }
    }
}

/// What a step does, independent of how often it fires.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Op {
    /// Leave the sample untouched.
    NoOp,
    /// Crop a `height x width` window at a block-aligned random offset.
    RandomCrop { height: usize, width: usize },
    HorizontalFlip,
    VerticalFlip,
    /// Rotate by a uniformly drawn number of quarter turns in `0..4`.
    RandomRotate90,
    Transpose,
    /// Zero out rectangular holes in images and DCT planes.
    CoarseDropout {
        max_holes: usize,
        min_height: usize,
        max_height: usize,
        min_width: usize,
        max_width: usize,
    },
    /// Split into a `grid x grid` layout and permute same-shaped tiles.
    RandomGridShuffle { grid: usize },
    /// JPEG round trip at a quality drawn from the inclusive range.
    ImageCompression { quality_lower: u8, quality_upper: u8 },
    /// Crop a random square of `min_max_height` side and resize it.
    RandomSizedCrop {
        min_max_height: (usize, usize),
        height: usize,
        width: usize,
        interpolation: Interpolation,
    },
    /// Shrink by a factor drawn from the range, then scale back up.
    Downscale { scale_min: f32, scale_max: f32 },
    /// Gaussian blur with an odd kernel size drawn from `blur_limit`.
    GaussianBlur { blur_limit: (u32, u32) },
    /// Pick exactly one child, weighted by the children's probabilities.
    OneOf(Vec<Step>),
}

impl Op {
    /// Stable name used in logs and error messages.
    pub fn name(&self) -> &'static str {
        match self {
            Op::NoOp => "NoOp",
            Op::RandomCrop { .. } => "RandomCrop",
            Op::HorizontalFlip => "HorizontalFlip",
            Op::VerticalFlip => "VerticalFlip",
            Op::RandomRotate90 => "RandomRotate90",
            Op::Transpose => "Transpose",
            Op::CoarseDropout { .. } => "CoarseDropout",
            Op::RandomGridShuffle { .. } => "RandomGridShuffle",
            Op::ImageCompression { .. } => "ImageCompression",
            Op::RandomSizedCrop { .. } => "RandomSizedCrop",
            Op::Downscale { .. } => "Downscale",
            Op::GaussianBlur { .. } => "GaussianBlur",
            Op::OneOf(_) => "OneOf",
        }
    }

    /// Name of the step that cannot carry `kind` targets, looking inside
    /// every `OneOf` branch.
    pub fn unsupported_by(&self, kind: TargetKind) -> Option<&'static str> {
        match (self, kind) {
            (Op::RandomSizedCrop { .. }, TargetKind::Dct)
            | (Op::RandomGridShuffle { .. }, TargetKind::BBoxes) => Some(self.name()),
            (Op::OneOf(steps), _) => steps.iter().find_map(|step| step.op.unsupported_by(kind)),
            _ => None,
        }
    }
}

/// An operation together with its firing probability.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    pub op: Op,
    pub p: f64,
}

/// Concrete parameters drawn for one step.
///
/// The sequence of these values for a whole pipeline is the replay record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StepParams {
    /// The probability check failed; the step left the sample untouched.
    Skipped,
    NoOp,
    Geometric(Descriptor),
    Crop(CropWindow),
    SizedCrop(CropWindow),
    /// `permutation[dst] = src` over the row-major tile list.
    GridShuffle { permutation: Vec<usize> },
    Dropout { holes: Vec<CropWindow> },
    Compression { quality: u8 },
    Downscale { scale: f32 },
    Blur { kernel: u32, sigma: f32 },
    OneOf { index: usize, params: Box<StepParams> },
}

impl StepParams {
    /// The geometric descriptor these parameters apply, if any.
    pub fn descriptor(&self) -> Option<Descriptor> {
        match self {
            StepParams::Geometric(d) => Some(*d),
            StepParams::OneOf { params, .. } => params.descriptor(),
            _ => None,
        }
    }
}

impl Step {
    pub fn new(op: Op, p: f64) -> Self {
        Self { op, p }
    }

    /// A step that always fires.
    pub fn always(op: Op) -> Self {
        Self::new(op, 1.0)
    }

    #[inline]
    pub fn name(&self) -> &'static str {
        self.op.name()
    }

    /// Draw the parameters for one application to `sample`.
    ///
    /// # Errors
    ///
    /// Returns `AugmentError::InvalidArgument` if the step configuration
    /// cannot be satisfied by the sample (e.g. a crop larger than the image)
    /// or the probability is not a finite number.
    pub fn sample<R: Rng + ?Sized>(&self, sample: &Sample, rng: &mut R) -> Result<StepParams> {
        self.check_probability()?;
        if self.p < 1.0 && !rng.random_bool(self.p.clamp(0.0, 1.0)) {
            return Ok(StepParams::Skipped);
        }
        self.sample_forced(sample, rng)
    }

    fn check_probability(&self) -> Result<()> {
        if !self.p.is_finite() {
            return Err(AugmentError::InvalidArgument(format!(
                "step `{}` has probability {}",
                self.name(),
                self.p
            )));
        }
        Ok(())
    }

    /// Draw parameters as if the probability check had passed.
    fn sample_forced<R: Rng + ?Sized>(&self, sample: &Sample, rng: &mut R) -> Result<StepParams> {
        let params = match &self.op {
            Op::NoOp => StepParams::NoOp,
            Op::RandomCrop { height, width } => StepParams::Crop(structural::sample_crop_window(
                rng,
                sample.spatial_size()?,
                *height,
                *width,
            )?),
            Op::HorizontalFlip => StepParams::Geometric(Descriptor::HorizontalFlip),
            Op::VerticalFlip => StepParams::Geometric(Descriptor::VerticalFlip),
            Op::RandomRotate90 => {
                StepParams::Geometric(Descriptor::rotate90(rng.random_range(0..4u8))?)
            }
            Op::Transpose => StepParams::Geometric(Descriptor::Transpose),
            Op::CoarseDropout {
                max_holes,
                min_height,
                max_height,
                min_width,
                max_width,
            } => StepParams::Dropout {
                holes: structural::sample_holes(
                    rng,
                    sample.spatial_size()?,
                    *max_holes,
                    (*min_height, *max_height),
                    (*min_width, *max_width),
                )?,
            },
            Op::RandomGridShuffle { grid } => StepParams::GridShuffle {
                permutation: structural::sample_permutation(rng, sample.spatial_size()?, *grid)?,
            },
            Op::ImageCompression {
                quality_lower,
                quality_upper,
            } => StepParams::Compression {
                quality: sample_inclusive(rng, *quality_lower, *quality_upper, "quality")?,
            },
            Op::RandomSizedCrop { min_max_height, .. } => StepParams::SizedCrop(
                structural::sample_sized_crop_window(rng, sample.spatial_size()?, *min_max_height)?,
            ),
            Op::Downscale {
                scale_min,
                scale_max,
            } => StepParams::Downscale {
                scale: photometric::sample_scale(rng, *scale_min, *scale_max)?,
            },
            Op::GaussianBlur { blur_limit } => {
                let kernel = photometric::sample_kernel_size(rng, *blur_limit)?;
                StepParams::Blur {
                    kernel,
                    sigma: photometric::sigma_for_kernel(kernel),
                }
            }
            Op::OneOf(steps) => {
                if steps.is_empty() {
                    StepParams::NoOp
                } else {
                    for step in steps {
                        step.check_probability()?;
                    }
                    let index = choose_weighted(rng, steps);
                    StepParams::OneOf {
                        index,
                        params: Box::new(steps[index].sample_forced(sample, rng)?),
                    }
                }
            }
        };

        Ok(params)
    }

    /// Execute previously drawn parameters.
    ///
    /// # Errors
    ///
    /// Returns `AugmentError::ReplayMismatch` if `params` were not produced
    /// by this step, and propagates any target-level failure.
    pub fn apply(
        &self,
        params: &StepParams,
        sample: &Sample,
        registry: &TargetRegistry,
    ) -> Result<Sample> {
        trace!("Applying {} with {:?}", self.name(), params);

        match (&self.op, params) {
            (_, StepParams::Skipped) | (Op::NoOp, StepParams::NoOp) => Ok(sample.clone()),
            (Op::OneOf(steps), StepParams::NoOp) if steps.is_empty() => Ok(sample.clone()),

            (Op::HorizontalFlip, StepParams::Geometric(d @ Descriptor::HorizontalFlip))
            | (Op::VerticalFlip, StepParams::Geometric(d @ Descriptor::VerticalFlip))
            | (Op::Transpose, StepParams::Geometric(d @ Descriptor::Transpose))
            | (
                Op::RandomRotate90,
                StepParams::Geometric(d @ (Descriptor::Rotate90(_) | Descriptor::Identity)),
            ) => sample.apply_geometric(registry, *d),

            (Op::RandomCrop { height, width }, StepParams::Crop(window))
                if window.height == *height && window.width == *width =>
            {
                structural::crop_sample(sample, registry, *window)
            }

            (
                Op::RandomSizedCrop {
                    height,
                    width,
                    interpolation,
                    ..
                },
                StepParams::SizedCrop(window),
            ) => structural::resized_crop_sample(
                sample,
                registry,
                *window,
                (*height, *width),
                *interpolation,
            ),

            (Op::RandomGridShuffle { grid }, StepParams::GridShuffle { permutation }) => {
                structural::grid_shuffle_sample(sample, registry, *grid, permutation)
            }

            (Op::CoarseDropout { .. }, StepParams::Dropout { holes }) => {
                structural::dropout_sample(sample, registry, holes)
            }

            (Op::ImageCompression { .. }, StepParams::Compression { quality }) => {
                photometric::map_images(sample, registry, |t| {
                    photometric::jpeg_compress(t, *quality)
                })
            }

            (Op::Downscale { .. }, StepParams::Downscale { scale }) => {
                photometric::map_images(sample, registry, |t| {
                    photometric::downscale(t, *scale)
                })
            }

            (Op::GaussianBlur { .. }, StepParams::Blur { sigma, .. }) => {
                photometric::map_images(sample, registry, |t| {
                    photometric::gaussian_blur(t, *sigma)
                })
            }

            (Op::OneOf(steps), StepParams::OneOf { index, params }) => {
                let child = steps.get(*index).ok_or_else(|| {
                    AugmentError::ReplayMismatch(format!(
                        "OneOf has {} children, record selects #{index}",
                        steps.len()
                    ))
                })?;
                child.apply(params, sample, registry)
            }

            (op, params) => Err(AugmentError::ReplayMismatch(format!(
                "{} cannot apply {params:?}",
                op.name()
            ))),
        }
    }
}

/// Uniform integer in `low..=high`.
fn sample_inclusive<R: Rng + ?Sized>(rng: &mut R, low: u8, high: u8, what: &str) -> Result<u8> {
    if low > high {
        return Err(AugmentError::InvalidArgument(format!(
            "{what} range {low}..={high} is empty"
        )));
    }
    Ok(rng.random_range(low..=high))
}

/// Index of one step, drawn with probability proportional to its `p`.
///
/// Falls back to a uniform choice when every weight is zero.
fn choose_weighted<R: Rng + ?Sized>(rng: &mut R, steps: &[Step]) -> usize {
    let total: f64 = steps.iter().map(|s| s.p.max(0.0)).sum();
    if total <= 0.0 {
        return rng.random_range(0..steps.len());
    }

    let mut target = rng.random::<f64>() * total;
    for (index, step) in steps.iter().enumerate() {
        let weight = step.p.max(0.0);
        if target < weight {
            return index;
        }
        target -= weight;
    }

    // Rounding can leave `target` marginally above the last weight
    steps.len() - 1
}

#[cfg(test)]
mod tests {
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    use super::*;
    use crate::target::{test_tensor, TargetData, INPUT_IMAGE_KEY};

    fn image_sample(size: usize) -> Sample {
        Sample::new().with(INPUT_IMAGE_KEY, TargetData::Image(test_tensor(size, size, 3)))
    }

    #[test]
    fn test_zero_probability_always_skips() {
        let step = Step::new(Op::HorizontalFlip, 0.0);
        let mut rng = StdRng::seed_from_u64(1);
        for _ in 0..20 {
            assert_eq!(
                step.sample(&image_sample(8), &mut rng).unwrap(),
                StepParams::Skipped
            );
        }
    }

    #[test]
    fn test_rotate_draws_every_factor() {
        let step = Step::always(Op::RandomRotate90);
        let mut rng = StdRng::seed_from_u64(7);
        let sample = image_sample(8);

        let mut seen = [false; 4];
        for _ in 0..200 {
            match step.sample(&sample, &mut rng).unwrap() {
                StepParams::Geometric(Descriptor::Identity) => seen[0] = true,
                StepParams::Geometric(Descriptor::Rotate90(k)) => seen[k.get() as usize] = true,
                other => panic!("unexpected params {other:?}"),
            }
        }
        assert!(seen.iter().all(|&s| s));
    }

    #[test]
    fn test_apply_rejects_foreign_params() {
        let step = Step::always(Op::HorizontalFlip);
        let registry = TargetRegistry::default();
        let result = step.apply(
            &StepParams::Geometric(Descriptor::VerticalFlip),
            &image_sample(8),
            &registry,
        );
        assert!(matches!(result, Err(AugmentError::ReplayMismatch(_))));

        let params = StepParams::Compression { quality: 90 };
        let result = step.apply(&params, &image_sample(8), &registry);
        assert!(matches!(result, Err(AugmentError::ReplayMismatch(_))));
    }

    #[test]
    fn test_one_of_respects_weights() {
        let step = Step::always(Op::OneOf(vec![
            Step::new(Op::HorizontalFlip, 0.0),
            Step::new(Op::VerticalFlip, 1.0),
        ]));
        let mut rng = StdRng::seed_from_u64(3);
        let sample = image_sample(8);

        for _ in 0..20 {
            let params = step.sample(&sample, &mut rng).unwrap();
            assert_eq!(params.descriptor(), Some(Descriptor::VerticalFlip));
        }
    }

    #[test]
    fn test_one_of_forces_child() {
        // A child with a tiny weight still fires once it is chosen
        let step = Step::always(Op::OneOf(vec![Step::new(Op::Transpose, 0.01)]));
        let mut rng = StdRng::seed_from_u64(11);
        let params = step.sample(&image_sample(8), &mut rng).unwrap();
        assert_eq!(
            params,
            StepParams::OneOf {
                index: 0,
                params: Box::new(StepParams::Geometric(Descriptor::Transpose)),
            }
        );
    }

    #[test]
    fn test_empty_one_of_is_noop() {
        let step = Step::always(Op::OneOf(Vec::new()));
        let mut rng = StdRng::seed_from_u64(0);
        let sample = image_sample(8);
        let params = step.sample(&sample, &mut rng).unwrap();
        assert_eq!(params, StepParams::NoOp);
        assert_eq!(step.apply(&params, &sample, &TargetRegistry::default()).unwrap(), sample);
    }

    #[test]
    fn test_quality_range_validation() {
        let step = Step::always(Op::ImageCompression {
            quality_lower: 95,
            quality_upper: 70,
        });
        let mut rng = StdRng::seed_from_u64(0);
        assert!(matches!(
            step.sample(&image_sample(8), &mut rng),
            Err(AugmentError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_non_finite_probability_rejected() {
        let mut rng = StdRng::seed_from_u64(0);
        let sample = image_sample(8);

        for p in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            let step = Step::new(Op::HorizontalFlip, p);
            assert!(matches!(
                step.sample(&sample, &mut rng),
                Err(AugmentError::InvalidArgument(_))
            ));

            let step = Step::always(Op::OneOf(vec![
                Step::new(Op::VerticalFlip, 1.0),
                Step::new(Op::Transpose, p),
            ]));
            assert!(matches!(
                step.sample(&sample, &mut rng),
                Err(AugmentError::InvalidArgument(_))
            ));
        }
    }

    #[test]
    fn test_unsupported_by_searches_branches() {
        let sized_crop = Op::RandomSizedCrop {
            min_max_height: (8, 16),
            height: 16,
            width: 16,
            interpolation: Interpolation::Linear,
        };
        assert_eq!(sized_crop.unsupported_by(TargetKind::Dct), Some("RandomSizedCrop"));
        assert_eq!(sized_crop.unsupported_by(TargetKind::Image), None);

        let one_of = Op::OneOf(vec![
            Step::always(Op::Downscale {
                scale_min: 0.5,
                scale_max: 0.5,
            }),
            Step::always(Op::RandomGridShuffle { grid: 2 }),
        ]);
        assert_eq!(one_of.unsupported_by(TargetKind::BBoxes), Some("RandomGridShuffle"));
        assert_eq!(one_of.unsupported_by(TargetKind::Dct), None);
        assert_eq!(Op::HorizontalFlip.unsupported_by(TargetKind::Dct), None);
    }

    #[test]
    fn test_interpolation_filters() {
        assert_eq!(Interpolation::Nearest.to_image_filter(), FilterType::Nearest);
        assert_eq!(Interpolation::Linear.to_image_filter(), FilterType::Triangle);
        assert_eq!(Interpolation::Cubic.to_image_filter(), FilterType::CatmullRom);
    }

    #[test]
    fn test_params_serde() {
        let params = StepParams::OneOf {
            index: 1,
            params: Box::new(StepParams::Crop(CropWindow {
                top: 8,
                left: 0,
                height: 16,
                width: 16,
            })),
        };
        let json = serde_json::to_string(&params).unwrap();
        let back: StepParams = serde_json::from_str(&json).unwrap();
        assert_eq!(back, params);
    }
}
