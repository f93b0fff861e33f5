//! Low-level building blocks for custom depth pipelines.
//!
//! These re-export the resampling kernels, offset patterns and per-stage
//! operations used by [`PatchMatchNet`](crate::PatchMatchNet) for callers
//! that assemble their own stage loop. Most users should prefer the
//! top-level `PatchMatchNet` and `MvsInput` types.

pub use crate::bank::{
    build_sampling_grid, evaluation_offsets, propagation_offsets, NeighborOffset, SamplingGrid,
};
pub use crate::kernel::resize::upsample_bilinear2x;
pub use crate::kernel::sample::grid_sample;
pub use crate::kernel::warp::{differentiable_warp, projection_grid, relative_projection};
pub use crate::kernel::Padding;
pub use crate::refine::confidence_map;
pub use crate::search::evaluation::{group_correlation, inverse_depth_regression};
pub use crate::search::hypothesis::{ladder_hypotheses, random_hypotheses, HypothesisGenerator};
pub use crate::search::propagation::propagate;
pub use crate::search::weights::{combine_weights, depth_weight, FeatureWeightNet};
