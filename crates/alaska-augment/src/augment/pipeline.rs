//! Ordered step sequences with replayable application.

use log::trace;
use rand::Rng;
use serde::{Deserialize, Serialize};

use super::step::{Step, StepParams};
use crate::error::{AugmentError, Result};
use crate::target::{Sample, TargetRegistry};

/// Parameters drawn by one run of a [`Pipeline`], one entry per step.
///
/// Serializable so a run can be stored next to its output and replayed on
/// another sample, e.g. to apply the augmentation of an image to its
/// stego counterpart.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReplayRecord {
    pub steps: Vec<StepParams>,
}

impl ReplayRecord {
    /// Names and parameters of the steps that actually fired.
    pub fn applied<'a>(
        &'a self,
        pipeline: &'a Pipeline,
    ) -> impl Iterator<Item = (&'static str, &'a StepParams)> + 'a {
        pipeline
            .steps()
            .iter()
            .zip(&self.steps)
            .filter(|(_, params)| **params != StepParams::Skipped)
            .map(|(step, params)| (step.name(), params))
    }
}

/// An ordered list of steps bound to a target registry.
#[derive(Debug, Clone, PartialEq)]
pub struct Pipeline {
    steps: Vec<Step>,
    registry: TargetRegistry,
}

impl Pipeline {
    /// Pipeline over the built-in target keys.
    pub fn new(steps: Vec<Step>) -> Self {
        Self::with_registry(steps, TargetRegistry::default())
    }

    pub fn with_registry(steps: Vec<Step>, registry: TargetRegistry) -> Self {
        Self { steps, registry }
    }

    #[inline]
    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    #[inline]
    pub fn registry(&self) -> &TargetRegistry {
        &self.registry
    }

    /// Top-level step names, in order.
    pub fn step_names(&self) -> Vec<&'static str> {
        self.steps.iter().map(Step::name).collect()
    }

    /// Run every step once, drawing fresh parameters from `rng`.
    ///
    /// # Arguments
    ///
    /// * `sample` - Input tensors; left untouched
    /// * `rng` - Source of every random decision
    ///
    /// # Returns
    ///
    /// The augmented sample and the record needed to reproduce it.
    ///
    /// # Errors
    ///
    /// Propagates the first step failure; no partial output is returned.
    pub fn apply<R: Rng + ?Sized>(
        &self,
        sample: &Sample,
        rng: &mut R,
    ) -> Result<(Sample, ReplayRecord)> {
        self.check_targets(sample)?;
        let mut current = sample.clone();
        let mut record = ReplayRecord::default();

        for step in &self.steps {
            let params = step.sample(&current, rng)?;
            current = step.apply(&params, &current, &self.registry)?;
            record.steps.push(params);
        }

        trace!("Pipeline applied {} steps", record.steps.len());
        Ok((current, record))
    }

    /// Re-apply the parameters of an earlier run without drawing randomness.
    ///
    /// # Errors
    ///
    /// Returns `AugmentError::ReplayMismatch` if the record was not produced
    /// by a pipeline with this step structure or its regions do not fit the
    /// sample.
    pub fn replay(&self, sample: &Sample, record: &ReplayRecord) -> Result<Sample> {
        self.check_targets(sample)?;
        if record.steps.len() != self.steps.len() {
            return Err(AugmentError::ReplayMismatch(format!(
                "record holds {} steps, pipeline has {}",
                record.steps.len(),
                self.steps.len()
            )));
        }

        self.steps
            .iter()
            .zip(&record.steps)
            .try_fold(sample.clone(), |current, (step, params)| {
                step.apply(params, &current, &self.registry)
            })
    }

    /// Reject samples holding a category that some step, on any branch,
    /// cannot carry. Running this before sampling keeps the outcome
    /// independent of which branch the RNG would have picked.
    fn check_targets(&self, sample: &Sample) -> Result<()> {
        for (key, _) in sample.iter() {
            let kind = self.registry.resolve(key)?;
            if let Some(step) = self.steps.iter().find_map(|s| s.op.unsupported_by(kind)) {
                return Err(AugmentError::UnsupportedTarget { step, kind });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    use super::*;
    use crate::augment::Op;
    use crate::dct::DctImage;
    use crate::geometry::Descriptor;
    use crate::target::{
        test_tensor, BBox, CropWindow, TargetData, TargetKind, INPUT_BBOXES_KEY, INPUT_DCT_KEY,
        INPUT_IMAGE_KEY,
    };

    fn sample() -> Sample {
        let dct = DctImage::new(16, 16, (0..16 * 16 * 3).map(|i| i as f32).collect()).unwrap();
        Sample::new()
            .with(INPUT_IMAGE_KEY, TargetData::Image(test_tensor(16, 16, 3)))
            .with(INPUT_DCT_KEY, TargetData::Dct(dct))
    }

    fn geometric_pipeline() -> Pipeline {
        Pipeline::with_registry(
            vec![
                Step::new(Op::RandomRotate90, 1.0),
                Step::new(Op::Transpose, 0.5),
                Step::new(Op::HorizontalFlip, 0.5),
            ],
            TargetRegistry::alaska(),
        )
    }

    #[test]
    fn test_apply_records_every_step() {
        let pipeline = geometric_pipeline();
        let mut rng = StdRng::seed_from_u64(42);
        let (_, record) = pipeline.apply(&sample(), &mut rng).unwrap();
        assert_eq!(record.steps.len(), 3);
    }

    #[test]
    fn test_replay_reproduces_output() {
        let pipeline = geometric_pipeline();
        let input = sample();

        for seed in 0..16 {
            let mut rng = StdRng::seed_from_u64(seed);
            let (output, record) = pipeline.apply(&input, &mut rng).unwrap();
            assert_eq!(pipeline.replay(&input, &record).unwrap(), output);
        }
    }

    #[test]
    fn test_same_seed_same_output() {
        let pipeline = geometric_pipeline();
        let input = sample();

        let a = pipeline.apply(&input, &mut StdRng::seed_from_u64(7)).unwrap();
        let b = pipeline.apply(&input, &mut StdRng::seed_from_u64(7)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_replay_length_mismatch() {
        let pipeline = geometric_pipeline();
        let record = ReplayRecord {
            steps: vec![StepParams::Skipped],
        };
        assert!(matches!(
            pipeline.replay(&sample(), &record),
            Err(AugmentError::ReplayMismatch(_))
        ));
    }

    #[test]
    fn test_replay_wrong_params() {
        let pipeline = geometric_pipeline();
        let record = ReplayRecord {
            steps: vec![
                StepParams::Geometric(Descriptor::Transpose),
                StepParams::Skipped,
                StepParams::Skipped,
            ],
        };
        assert!(matches!(
            pipeline.replay(&sample(), &record),
            Err(AugmentError::ReplayMismatch(_))
        ));
    }

    #[test]
    fn test_unsupported_target_rejected_before_sampling() {
        // The shuffle never fires, but bounding boxes are still refused
        let pipeline = Pipeline::new(vec![
            Step::always(Op::HorizontalFlip),
            Step::new(Op::RandomGridShuffle { grid: 2 }, 0.0),
        ]);
        let input = Sample::new()
            .with(INPUT_IMAGE_KEY, TargetData::Image(test_tensor(16, 16, 3)))
            .with(INPUT_BBOXES_KEY, TargetData::BBoxes(vec![BBox::new(0.1, 0.1, 0.5, 0.5)]));

        for seed in 0..8 {
            let result = pipeline.apply(&input, &mut StdRng::seed_from_u64(seed));
            assert!(matches!(
                result,
                Err(AugmentError::UnsupportedTarget {
                    step: "RandomGridShuffle",
                    kind: TargetKind::BBoxes,
                })
            ));
        }

        let record = ReplayRecord {
            steps: vec![StepParams::Skipped, StepParams::Skipped],
        };
        assert!(matches!(
            pipeline.replay(&input, &record),
            Err(AugmentError::UnsupportedTarget { .. })
        ));
    }

    #[test]
    fn test_replay_rejects_out_of_range_holes() {
        let pipeline = Pipeline::with_registry(
            vec![Step::always(Op::CoarseDropout {
                max_holes: 1,
                min_height: 8,
                max_height: 8,
                min_width: 8,
                max_width: 8,
            })],
            TargetRegistry::alaska(),
        );

        for hole in [
            CropWindow {
                top: usize::MAX,
                left: 0,
                height: 8,
                width: 8,
            },
            CropWindow {
                top: 8,
                left: 16,
                height: 8,
                width: 8,
            },
        ] {
            let record = ReplayRecord {
                steps: vec![StepParams::Dropout { holes: vec![hole] }],
            };
            assert!(matches!(
                pipeline.replay(&sample(), &record),
                Err(AugmentError::ReplayMismatch(_))
            ));
        }
    }

    #[test]
    fn test_applied_lists_fired_steps() {
        let pipeline = geometric_pipeline();
        let record = ReplayRecord {
            steps: vec![
                StepParams::Geometric(Descriptor::Identity),
                StepParams::Skipped,
                StepParams::Geometric(Descriptor::HorizontalFlip),
            ],
        };

        let names: Vec<_> = record.applied(&pipeline).map(|(name, _)| name).collect();
        assert_eq!(names, vec!["RandomRotate90", "HorizontalFlip"]);
    }

    #[test]
    fn test_record_serde() {
        let pipeline = geometric_pipeline();
        let input = sample();
        let (output, record) = pipeline.apply(&input, &mut StdRng::seed_from_u64(3)).unwrap();

        let json = serde_json::to_string(&record).unwrap();
        let restored: ReplayRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(pipeline.replay(&input, &restored).unwrap(), output);
    }
}
