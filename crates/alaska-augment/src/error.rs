//! Error type shared by every augmentation operation.

use thiserror::Error;

use crate::target::TargetKind;

/// Errors that can occur while transforming tensors or assembling pipelines.
#[derive(Debug, Error)]
pub enum AugmentError {
    /// A precondition on the arguments was violated (rotation factor out of
    /// range, dimensions not aligned to the 8x8 block grid, buffer size
    /// mismatch, ...).
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The requested pipeline configuration does not exist.
    #[error("Unknown augmentation configuration: {0}")]
    UnknownConfiguration(String),

    /// A step cannot express its effect on a category of tensor.
    #[error("Step `{step}` does not support {kind:?} targets")]
    UnsupportedTarget {
        step: &'static str,
        kind: TargetKind,
    },

    /// JPEG re-encoding or decoding failed.
    #[error("JPEG codec failed: {0}")]
    Codec(String),

    /// A recorded run does not line up with the pipeline replaying it.
    #[error("Replay record does not match pipeline: {0}")]
    ReplayMismatch(String),
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, AugmentError>;
