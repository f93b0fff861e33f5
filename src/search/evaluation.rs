//! Multi-view hypothesis scoring and depth regression.
//!
//! Every source view is warped onto the hypothesis volume and correlated
//! with the reference features group by group. Views are blended with
//! per-pixel view weights, the blended similarity is aggregated over the
//! learned evaluation neighborhood, and a softmax over hypotheses yields
//! the probability volume used for regression.

use crate::bank::SamplingGrid;
use crate::kernel::map_indices;
use crate::kernel::sample::grid_sample;
use crate::kernel::warp::differentiable_warp;
use crate::kernel::Padding;
use crate::nn::{CostHead, HeadActivation};
use crate::util::math::MIN_WEIGHT_SUM;
use crate::util::{PatchMatchError, PatchMatchResult};
use candle_core::{Module, Tensor};
use candle_nn::VarBuilder;

/// Reference and source features of one stage with their projections.
///
/// Projections are `(B, 4, 4)`; features are `(B, C, H, W)`.
#[derive(Clone, Copy, Debug)]
pub struct StageViews<'a> {
    pub reference: &'a Tensor,
    pub sources: &'a [Tensor],
    pub reference_projection: &'a Tensor,
    pub source_projections: &'a [Tensor],
}

impl StageViews<'_> {
    /// Number of source views; errors when features and projections disagree.
    pub fn num_sources(&self) -> PatchMatchResult<usize> {
        if self.sources.len() != self.source_projections.len() {
            return Err(PatchMatchError::ShapeMismatch {
                what: "source projections",
                expected: vec![self.sources.len()],
                got: vec![self.source_projections.len()],
            });
        }
        if self.sources.is_empty() {
            return Err(PatchMatchError::InvalidInput(
                "at least one source view is required",
            ));
        }
        Ok(self.sources.len())
    }
}

/// How the probability volume is turned into a depth.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Regression {
    /// Probability-weighted sum of hypothesis depths.
    Expectation,
    /// Continuous hypothesis index interpolated in inverse depth between
    /// the first and last hypotheses.
    InverseDepth,
}

/// Result of one evaluation call.
#[derive(Clone, Debug)]
pub struct EvaluationOutput {
    /// Regressed depth `(B, 1, H, W)`.
    pub depth: Tensor,
    /// Probability over hypotheses `(B, D, H, W)`.
    pub score: Tensor,
    /// Detached per-source-view weights `(B, V - 1, H, W)`.
    pub view_weights: Tensor,
}

/// Group-wise correlation of warped source features `(B, C, D, H, W)` with
/// reference features `(B, C, H, W)`: the mean of the element-wise product
/// within each of `groups` channel groups, `(B, G, D, H, W)`.
pub fn group_correlation(
    warped: &Tensor,
    reference: &Tensor,
    groups: usize,
) -> PatchMatchResult<Tensor> {
    let (batch, channels, num_depth, height, width) = warped.dims5()?;
    if groups == 0 || channels % groups != 0 || reference.dims4()? != (batch, channels, height, width)
    {
        return Err(PatchMatchError::ShapeMismatch {
            what: "reference features",
            expected: vec![batch, channels, height, width],
            got: reference.dims().to_vec(),
        });
    }
    let per_group = channels / groups;
    let warped = warped.reshape((batch, groups, per_group, num_depth, height, width))?;
    let reference = reference.reshape((batch, groups, per_group, 1, height, width))?;
    Ok(warped.broadcast_mul(&reference)?.mean(2)?)
}

/// Scores hypotheses against all source views of a stage.
#[derive(Debug, Clone)]
pub struct Evaluation {
    groups: usize,
    pixelwise_net: Option<CostHead>,
    similarity_net: CostHead,
    parallel: bool,
}

impl Evaluation {
    /// `with_pixelwise` builds the view-weight network; only the stage that
    /// computes view weights from scratch needs it.
    pub fn new(
        groups: usize,
        with_pixelwise: bool,
        parallel: bool,
        vb: VarBuilder,
    ) -> candle_core::Result<Self> {
        let pixelwise_net = if with_pixelwise {
            Some(CostHead::new(
                groups,
                HeadActivation::Sigmoid,
                vb.pp("pixelwise_net").pp("conv"),
            )?)
        } else {
            None
        };
        let similarity_net = CostHead::new(
            groups,
            HeadActivation::Identity,
            vb.pp("similarity_net").pp("conv"),
        )?;
        Ok(Self {
            groups,
            pixelwise_net,
            similarity_net,
            parallel,
        })
    }

    /// Per-pixel reliability `(B, 1, H, W)` of one view from its similarity
    /// volume: the maximum over hypotheses of a sigmoid head.
    fn view_weight(&self, similarity: &Tensor) -> PatchMatchResult<Tensor> {
        let net = self.pixelwise_net.as_ref().ok_or(PatchMatchError::InvalidInput(
            "view weights must be carried from a stage that computes them",
        ))?;
        Ok(net.forward(similarity)?.squeeze(1)?.max_keepdim(1)?)
    }

    /// Scores `depth` `(B, D, H, W)`.
    ///
    /// `weight` is the normalized neighbor weight `(B, D, N, H, W)`.
    /// `view_weights` `(B, V - 1, H, W)` are reused when given and computed
    /// otherwise.
    pub fn forward(
        &self,
        views: &StageViews<'_>,
        depth: &Tensor,
        grid: &SamplingGrid,
        weight: &Tensor,
        view_weights: Option<&Tensor>,
        regression: Regression,
    ) -> PatchMatchResult<EvaluationOutput> {
        let num_sources = views.num_sources()?;
        let (batch, num_depth, height, width) = depth.dims4()?;
        if let Some(carried) = view_weights {
            if carried.dims4()? != (batch, num_sources, height, width) {
                return Err(PatchMatchError::ShapeMismatch {
                    what: "view weights",
                    expected: vec![batch, num_sources, height, width],
                    got: carried.dims().to_vec(),
                });
            }
        }

        let per_view = map_indices(num_sources, self.parallel, |i| {
            let warped = differentiable_warp(
                &views.sources[i],
                &views.source_projections[i],
                views.reference_projection,
                depth,
            )?;
            let similarity = group_correlation(&warped, views.reference, self.groups)?;
            let view_weight = match view_weights {
                Some(carried) => carried.narrow(1, i, 1)?,
                None => self.view_weight(&similarity)?,
            };
            Ok((similarity, view_weight))
        })?;

        let mut similarity_sum: Option<Tensor> = None;
        let mut weight_sum: Option<Tensor> = None;
        for (similarity, view_weight) in &per_view {
            let weighted = similarity.broadcast_mul(&view_weight.unsqueeze(1)?)?;
            similarity_sum = Some(match similarity_sum {
                Some(acc) => (acc + weighted)?,
                None => weighted,
            });
            weight_sum = Some(match weight_sum {
                Some(acc) => (acc + view_weight)?,
                None => view_weight.clone(),
            });
        }
        let (similarity_sum, weight_sum) = similarity_sum
            .zip(weight_sum)
            .ok_or(PatchMatchError::InvalidInput("no source views"))?;
        let similarity = similarity_sum
            .broadcast_div(&weight_sum.maximum(MIN_WEIGHT_SUM)?.unsqueeze(1)?)?;

        let neighbors = grid.neighbors();
        let raw = self.similarity_net.forward(&similarity)?.squeeze(1)?;
        let raw = grid_sample(&raw, grid.tensor(), Padding::Border)?
            .reshape((batch, num_depth, neighbors, height, width))?;
        let raw = raw.broadcast_mul(weight)?.sum(2)?;
        let score = candle_nn::ops::log_softmax(&raw, 1)?.exp()?;

        let depth = match regression {
            Regression::Expectation => (depth * &score)?.sum_keepdim(1)?,
            Regression::InverseDepth => inverse_depth_regression(depth, &score)?,
        };

        let view_weights = match view_weights {
            Some(carried) => carried.clone(),
            None => {
                let weights: Vec<Tensor> = per_view.into_iter().map(|(_, w)| w).collect();
                Tensor::cat(&weights, 1)?.detach()
            }
        };

        Ok(EvaluationOutput {
            depth,
            score,
            view_weights,
        })
    }
}

/// Sub-hypothesis regression for a `(B, D, H, W)` ladder.
///
/// The expected index `Σ p_i · i` selects a point between the inverse
/// depths of the first and last hypotheses. A single hypothesis is
/// returned unchanged.
pub fn inverse_depth_regression(depth: &Tensor, score: &Tensor) -> PatchMatchResult<Tensor> {
    let (_, num_depth, _, _) = depth.dims4()?;
    if num_depth == 1 {
        return Ok(depth.clone());
    }
    let index = Tensor::arange(0f32, num_depth as f32, depth.device())?
        .reshape((1, num_depth, 1, 1))?;
    let index = score.broadcast_mul(&index)?.sum_keepdim(1)?;

    let inv_first = depth.narrow(1, 0, 1)?.recip()?;
    let inv_last = depth.narrow(1, num_depth - 1, 1)?.recip()?;
    let step = ((&inv_last - &inv_first)? * index.affine(1.0 / (num_depth - 1) as f64, 0.0)?)?;
    Ok((inv_first + step)?.recip()?)
}
