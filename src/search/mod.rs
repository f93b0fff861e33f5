//! The per-stage PatchMatch search.
//!
//! Each stage repeats hypothesis generation, propagation from learned
//! neighbors and multi-view evaluation for a fixed number of iterations.
//! All stages share this code and differ only in their [`StageConfig`].
//!
//! [`StageConfig`]: crate::config::StageConfig

pub mod evaluation;
pub mod hypothesis;
pub mod propagation;
pub mod weights;

mod stage;

pub use evaluation::{EvaluationOutput, Regression, StageViews};
pub use stage::{PatchMatchStage, StageOutput};
