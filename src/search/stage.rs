//! One coarse-to-fine PatchMatch stage.

use crate::bank::{build_sampling_grid, evaluation_offsets, propagation_offsets, NeighborOffset};
use crate::config::StageConfig;
use crate::image::DepthRange;
use crate::search::evaluation::{Evaluation, Regression, StageViews};
use crate::search::hypothesis::HypothesisGenerator;
use crate::search::propagation::propagate;
use crate::search::weights::{combine_weights, depth_weight, FeatureWeightNet};
use crate::trace::{trace_event, trace_span};
use crate::util::{PatchMatchError, PatchMatchResult};
use candle_core::{Module, Tensor};
use candle_nn::{conv2d, Conv2d, Conv2dConfig, VarBuilder};
use rand::Rng;
use std::sync::Arc;

/// Output of a stage at its own resolution.
#[derive(Clone, Debug)]
pub struct StageOutput {
    /// Detached depth `(B, 1, H, W)`.
    pub depth: Tensor,
    /// Probability volume of the last iteration `(B, D, H, W)`.
    pub score: Tensor,
    /// Detached view weights `(B, V - 1, H, W)`.
    pub view_weights: Tensor,
}

/// Learned modules and offset patterns of a single stage.
#[derive(Debug, Clone)]
pub struct PatchMatchStage {
    index: usize,
    config: StageConfig,
    is_final: bool,
    propagation_conv: Option<Conv2d>,
    evaluation_conv: Conv2d,
    propagation_pattern: Arc<[NeighborOffset]>,
    evaluation_pattern: Arc<[NeighborOffset]>,
    hypotheses: HypothesisGenerator,
    evaluation: Evaluation,
    feature_weight_net: FeatureWeightNet,
}

fn offset_conv(
    in_channels: usize,
    neighbors: usize,
    range: usize,
    vb: VarBuilder,
) -> candle_core::Result<Conv2d> {
    let cfg = Conv2dConfig {
        padding: range,
        dilation: range,
        ..Default::default()
    };
    conv2d(in_channels, 2 * neighbors, 3, cfg, vb)
}

impl PatchMatchStage {
    /// Builds stage `index` (0 is the coarsest). The coarsest stage owns the
    /// view-weight network; later stages reuse its weights.
    pub fn new(
        index: usize,
        config: &StageConfig,
        is_final: bool,
        parallel: bool,
        vb: VarBuilder,
    ) -> PatchMatchResult<Self> {
        config.validate(index)?;
        let range = config.propagation_range;
        let propagation_pattern = propagation_offsets(config.propagation_neighbors, range)?;
        let evaluation_pattern =
            evaluation_offsets(config.evaluation_neighbors, config.evaluation_dilation())?;

        let propagation_conv = if config.needs_propagation(is_final) {
            Some(offset_conv(
                config.num_features,
                config.propagation_neighbors,
                range,
                vb.pp("propagation_conv"),
            )?)
        } else {
            None
        };
        let evaluation_conv = offset_conv(
            config.num_features,
            config.evaluation_neighbors,
            range,
            vb.pp("evaluation_conv"),
        )?;

        Ok(Self {
            index,
            config: config.clone(),
            is_final,
            propagation_conv,
            evaluation_conv,
            propagation_pattern,
            evaluation_pattern,
            hypotheses: HypothesisGenerator::new(config.num_samples, config.interval_scale)?,
            evaluation: Evaluation::new(
                config.group_correlations,
                index == 0,
                parallel,
                vb.pp("evaluation"),
            )?,
            feature_weight_net: FeatureWeightNet::new(
                config.group_correlations,
                vb.pp("feature_weight_net"),
            )?,
        })
    }

    pub fn config(&self) -> &StageConfig {
        &self.config
    }

    /// Runs every iteration of the stage.
    ///
    /// `depth` `(B, 1, H, W)` and `view_weights` `(B, V - 1, H, W)` come
    /// from the previous stage, already at this stage's resolution; both
    /// are absent for the coarsest stage.
    pub fn forward<R: Rng + ?Sized>(
        &self,
        views: &StageViews<'_>,
        range: DepthRange,
        depth: Option<&Tensor>,
        view_weights: Option<&Tensor>,
        rng: &mut R,
    ) -> PatchMatchResult<StageOutput> {
        let reference = views.reference;
        let (batch, channels, height, width) = reference.dims4()?;
        if channels != self.config.num_features {
            return Err(PatchMatchError::ShapeMismatch {
                what: "stage features",
                expected: vec![batch, self.config.num_features, height, width],
                got: reference.dims().to_vec(),
            });
        }
        let _span = trace_span!(
            "patchmatch_stage",
            stage = self.index,
            height = height,
            width = width
        )
        .entered();

        let propagation_grid = match &self.propagation_conv {
            Some(conv) => Some(build_sampling_grid(
                &conv.forward(reference)?,
                &self.propagation_pattern,
            )?),
            None => None,
        };
        let evaluation_grid =
            build_sampling_grid(&self.evaluation_conv.forward(reference)?, &self.evaluation_pattern)?;
        let feature_weight = self.feature_weight_net.forward(reference, &evaluation_grid)?;

        let mut depth = depth.cloned();
        let mut view_weights = view_weights.cloned();
        let mut score = None;
        let iterations = self.config.iterations;
        for iteration in 0..iterations {
            let mut hypotheses = self.hypotheses.generate(
                depth.as_ref(),
                range,
                (batch, height, width),
                reference.device(),
                rng,
            )?;
            if self.config.propagates_on(iteration, self.is_final) {
                if let Some(grid) = &propagation_grid {
                    hypotheses = propagate(&hypotheses, grid)?;
                }
            }
            let count = hypotheses.dim(1)?;
            trace_event!("hypotheses", stage = self.index, iteration = iteration, count = count);

            let weight = combine_weights(
                &depth_weight(&hypotheses, &evaluation_grid, range, self.config.interval_scale)?,
                &feature_weight,
            )?;
            let regression = if self.is_final && iteration + 1 == iterations {
                Regression::InverseDepth
            } else {
                Regression::Expectation
            };
            let out = self.evaluation.forward(
                views,
                &hypotheses,
                &evaluation_grid,
                &weight,
                view_weights.as_ref(),
                regression,
            )?;
            depth = Some(out.depth);
            score = Some(out.score);
            view_weights = Some(out.view_weights);
        }

        match (depth, score, view_weights) {
            (Some(depth), Some(score), Some(view_weights)) => Ok(StageOutput {
                depth: depth.detach(),
                score,
                view_weights,
            }),
            _ => Err(PatchMatchError::InvalidStageConfig {
                stage: self.index,
                reason: "iterations must be at least 1",
            }),
        }
    }
}
