//! Error types for patchmatch-mvs.

use std::fmt;
use thiserror::Error;

/// Result alias for patchmatch-mvs operations.
pub type PatchMatchResult<T> = std::result::Result<T, PatchMatchError>;

/// Which sampling pattern a neighbor count was requested for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum NeighborRole {
    /// Neighbors that lend depth hypotheses to the center pixel.
    Propagation,
    /// Neighbors whose matching costs are aggregated around the center pixel.
    Evaluation,
}

impl fmt::Display for NeighborRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NeighborRole::Propagation => f.write_str("propagation"),
            NeighborRole::Evaluation => f.write_str("evaluation"),
        }
    }
}

/// Errors that can occur when building or running the depth estimator.
#[derive(Debug, Error)]
pub enum PatchMatchError {
    /// The neighbor count has no base offset pattern.
    #[error("unsupported {role} neighbor count: {count}")]
    UnsupportedNeighbors { role: NeighborRole, count: usize },
    /// A stage configuration value is out of range.
    #[error("invalid config for stage {stage}: {reason}")]
    InvalidStageConfig { stage: usize, reason: &'static str },
    /// The input data or parameters are invalid.
    #[error("invalid input: {0}")]
    InvalidInput(&'static str),
    /// A tensor does not have the expected shape.
    #[error("shape mismatch for {what}: expected {expected:?}, got {got:?}")]
    ShapeMismatch {
        what: &'static str,
        expected: Vec<usize>,
        got: Vec<usize>,
    },
    /// Tensors participating in one operation live on different devices.
    #[error("device mismatch: {0}")]
    DeviceMismatch(&'static str),
    /// The reference projection cannot be inverted.
    #[error("reference projection matrix is singular (batch {batch})")]
    SingularProjection { batch: usize },
    /// Reading or writing parameters failed.
    #[error("checkpoint error: {reason}")]
    Checkpoint { reason: String },
    /// Error raised by the tensor backend.
    #[error(transparent)]
    Tensor(#[from] candle_core::Error),
}
