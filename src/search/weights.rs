//! Per-neighbor weights used when aggregating matching costs.
//!
//! The feature weight depends only on the reference features and is
//! computed once per stage. The depth weight is recomputed every iteration
//! from the current hypotheses and always detached.

use crate::bank::SamplingGrid;
use crate::image::DepthRange;
use crate::kernel::sample::grid_sample;
use crate::kernel::Padding;
use crate::nn::{CostHead, HeadActivation};
use crate::util::math::MIN_WEIGHT_SUM;
use crate::util::{PatchMatchError, PatchMatchResult};
use candle_core::{Module, Tensor};
use candle_nn::VarBuilder;

/// Learned trust in each evaluation neighbor from reference-feature
/// similarity between the neighbor and the center pixel.
#[derive(Debug, Clone)]
pub struct FeatureWeightNet {
    head: CostHead,
    groups: usize,
}

impl FeatureWeightNet {
    pub fn new(groups: usize, vb: VarBuilder) -> candle_core::Result<Self> {
        Ok(Self {
            head: CostHead::new(groups, HeadActivation::Sigmoid, vb.pp("feature_weight"))?,
            groups,
        })
    }

    /// `feature` `(B, C, H, W)` → weights `(B, N, H, W)` in `(0, 1)`.
    pub fn forward(&self, feature: &Tensor, grid: &SamplingGrid) -> PatchMatchResult<Tensor> {
        let (batch, channels, height, width) = feature.dims4()?;
        let neighbors = grid.neighbors();
        let groups = self.groups;
        if channels % groups != 0 {
            return Err(PatchMatchError::ShapeMismatch {
                what: "reference features",
                expected: vec![batch, channels - channels % groups, height, width],
                got: feature.dims().to_vec(),
            });
        }
        let per_group = channels / groups;
        let sampled = grid_sample(feature, grid.tensor(), Padding::Border)?.reshape((
            batch, groups, per_group, neighbors, height, width,
        ))?;
        let center = feature.reshape((batch, groups, per_group, 1, height, width))?;
        let similarity = sampled.broadcast_mul(&center)?.mean(2)?;
        Ok(self.head.forward(&similarity)?.squeeze(1)?)
    }
}

/// Proximity of every evaluation neighbor's hypothesis to the center's.
///
/// Hypotheses `(B, D, H, W)` are mapped to normalized inverse depth; the
/// absolute difference to each neighbor, in units of `interval_scale`, is
/// clamped to `[0, 4]` and passed through `sigmoid(2 · (2 - d))`. Returns
/// `(B, D, N, H, W)`, detached.
pub fn depth_weight(
    depth: &Tensor,
    grid: &SamplingGrid,
    range: DepthRange,
    interval_scale: f64,
) -> PatchMatchResult<Tensor> {
    let (batch, num_depth, height, width) = depth.dims4()?;
    let neighbors = grid.neighbors();
    let (inv_min, inv_max) = range.inverse();
    let span = inv_min - inv_max;

    let normalized = depth
        .detach()
        .recip()?
        .affine(1.0 / span, -inv_max / span)?;
    let sampled = grid_sample(&normalized, grid.tensor(), Padding::Border)?
        .reshape((batch, num_depth, neighbors, height, width))?;
    let distance = sampled
        .broadcast_sub(&normalized.unsqueeze(2)?)?
        .abs()?
        .affine(1.0 / interval_scale, 0.0)?
        .clamp(0f32, 4f32)?;
    let weight = candle_nn::ops::sigmoid(&distance.affine(-2.0, 4.0)?)?;
    Ok(weight.detach())
}

/// Multiplies the depth weight `(B, D, N, H, W)` with the feature weight
/// `(B, N, H, W)` and renormalizes over the neighbor axis.
pub fn combine_weights(depth_weight: &Tensor, feature_weight: &Tensor) -> PatchMatchResult<Tensor> {
    let weight = depth_weight.broadcast_mul(&feature_weight.unsqueeze(1)?)?;
    let total = weight.sum_keepdim(2)?.maximum(MIN_WEIGHT_SUM)?;
    Ok(weight.broadcast_div(&total)?)
}
