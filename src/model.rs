//! The full estimator: feature pyramid, three PatchMatch stages, refinement.
//!
//! Features are extracted once per view. Stages run coarse to fine; the
//! depth and view weights of a stage are upsampled by 2 before the next
//! stage consumes them. The finest stage's depth is refined to input
//! resolution and its probability volume becomes the confidence map.

use crate::checkpoint::{load_safetensors, LoadReport};
use crate::config::{PatchMatchConfig, NUM_STAGES};
use crate::image::pyramid::{FeatureNet, FeaturePyramid};
use crate::image::MvsInput;
use crate::kernel::map_indices;
use crate::kernel::resize::upsample_bilinear2x;
use crate::refine::{confidence_map, Refinement};
use crate::search::{PatchMatchStage, StageViews};
use crate::trace::trace_event;
use crate::util::{PatchMatchError, PatchMatchResult};
use candle_core::{DType, Device, Tensor};
use candle_nn::{VarBuilder, VarMap};
use rand::Rng;
use std::collections::HashMap;
use std::path::Path;

/// Output of a forward pass.
#[derive(Clone, Debug)]
pub struct DepthEstimate {
    /// Refined depth `(B, H, W)` in the units of the depth range.
    pub depth: Tensor,
    /// Confidence `(B, H, W)` in `[0, 1]`.
    pub confidence: Tensor,
    /// Depth `(B, 1, h, w)` of every stage before upsampling, coarsest first.
    pub stage_depths: Vec<Tensor>,
    /// View weights `(B, V - 1, H/2, W/2)` of the finest stage.
    pub view_weights: Tensor,
}

/// Learned multi-view depth estimator.
#[derive(Debug, Clone)]
pub struct PatchMatchNet {
    config: PatchMatchConfig,
    feature: FeatureNet,
    stages: Vec<PatchMatchStage>,
    refinement: Refinement,
}

impl PatchMatchNet {
    /// Builds the network. The configuration is validated first; stage
    /// parameters live under `patch_match_3` (coarsest) to `patch_match_1`.
    pub fn new(config: PatchMatchConfig, vb: VarBuilder) -> PatchMatchResult<Self> {
        config.validate()?;
        let channels = [
            config.stages[0].num_features,
            config.stages[1].num_features,
            config.stages[2].num_features,
        ];
        let feature = FeatureNet::new(channels, vb.pp("feature"))?;
        let stages = config
            .stages
            .iter()
            .enumerate()
            .map(|(index, stage)| {
                PatchMatchStage::new(
                    index,
                    stage,
                    index + 1 == NUM_STAGES,
                    config.parallel,
                    vb.pp(format!("patch_match_{}", NUM_STAGES - index)),
                )
            })
            .collect::<PatchMatchResult<Vec<_>>>()?;
        let refinement = Refinement::new(vb.pp("refinement"))?;
        Ok(Self {
            config,
            feature,
            stages,
            refinement,
        })
    }

    /// Builds a model backed by a fresh [`VarMap`] and loads its parameters
    /// from a safetensors file. Missing entries keep their initial values
    /// and are listed in the report.
    pub fn from_checkpoint<P: AsRef<Path>>(
        config: PatchMatchConfig,
        path: P,
        name_map: &HashMap<String, String>,
        device: &Device,
    ) -> PatchMatchResult<(Self, VarMap, LoadReport)> {
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, device);
        let model = Self::new(config, vb)?;
        let report = load_safetensors(&varmap, path, name_map, device)?;
        Ok((model, varmap, report))
    }

    pub fn config(&self) -> &PatchMatchConfig {
        &self.config
    }

    /// Runs inference, drawing the initial hypotheses from the thread RNG.
    pub fn forward(&self, input: &MvsInput) -> PatchMatchResult<DepthEstimate> {
        let mut rng = rand::rng();
        self.forward_with_rng(input, &mut rng)
    }

    /// Runs inference with a caller-supplied RNG for reproducible output.
    pub fn forward_with_rng<R: Rng + ?Sized>(
        &self,
        input: &MvsInput,
        rng: &mut R,
    ) -> PatchMatchResult<DepthEstimate> {
        let num_views = input.num_views();
        let pyramids: Vec<FeaturePyramid> = map_indices(num_views, self.config.parallel, |v| {
            self.feature.extract(&input.view(v)?)
        })?;
        let range = input.depth_range();
        let projections = input.projections();

        let mut depth: Option<Tensor> = None;
        let mut view_weights: Option<Tensor> = None;
        let mut score: Option<Tensor> = None;
        let mut stage_depths = Vec::with_capacity(NUM_STAGES);
        for (index, stage) in self.stages.iter().enumerate() {
            let level = |pyramid: &FeaturePyramid| {
                pyramid
                    .level(index)
                    .cloned()
                    .ok_or(PatchMatchError::InvalidInput("feature pyramid is too shallow"))
            };
            let reference = level(&pyramids[0])?;
            let sources = pyramids[1..]
                .iter()
                .map(level)
                .collect::<PatchMatchResult<Vec<_>>>()?;
            let reference_projection = projections.view(index, 0)?;
            let source_projections = (1..num_views)
                .map(|v| projections.view(index, v))
                .collect::<PatchMatchResult<Vec<_>>>()?;
            let views = StageViews {
                reference: &reference,
                sources: &sources,
                reference_projection: &reference_projection,
                source_projections: &source_projections,
            };

            let out = stage.forward(&views, range, depth.as_ref(), view_weights.as_ref(), rng)?;
            let (_, _, height, width) = out.depth.dims4()?;
            let (min_depth, max_depth) = depth_extent(&out.depth)?;
            trace_event!(
                "stage_done",
                stage = index,
                height = height,
                width = width,
                min_depth = min_depth,
                max_depth = max_depth
            );
            stage_depths.push(out.depth.clone());

            if index + 1 < NUM_STAGES {
                depth = Some(upsample_bilinear2x(&out.depth)?);
                view_weights = Some(upsample_bilinear2x(&out.view_weights)?);
            } else {
                depth = Some(out.depth);
                view_weights = Some(out.view_weights);
            }
            score = Some(out.score);
        }

        let (depth, view_weights, score) = match (depth, view_weights, score) {
            (Some(d), Some(w), Some(s)) => (d, w, s),
            _ => return Err(PatchMatchError::InvalidInput("no stages configured")),
        };
        let refined = self.refinement.forward(&input.view(0)?, &depth, range)?;
        let confidence = confidence_map(&score)?;
        Ok(DepthEstimate {
            depth: refined,
            confidence,
            stage_depths,
            view_weights,
        })
    }
}

/// Smallest and largest value of a depth map.
fn depth_extent(depth: &Tensor) -> PatchMatchResult<(f32, f32)> {
    let flat = depth.flatten_all()?;
    Ok((
        flat.min(0)?.to_scalar::<f32>()?,
        flat.max(0)?.to_scalar::<f32>()?,
    ))
}
