//! Per-stage configuration records.
//!
//! Stages are listed in execution order, coarsest first. Each record drives
//! the same generic stage routine; there is no per-stage subtype.

use crate::bank::{evaluation_offsets, propagation_offsets};
use crate::util::{PatchMatchError, PatchMatchResult};

/// Number of pyramid stages processed by the estimator.
pub const NUM_STAGES: usize = 3;

/// Configuration of one coarse-to-fine stage.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct StageConfig {
    /// Hypothesis/propagation/evaluation cycles run in this stage.
    pub iterations: usize,
    /// Hypotheses drawn around the previous estimate (1 forwards it as is).
    pub num_samples: usize,
    /// Hypothesis spacing as a fraction of the inverse-depth range.
    pub interval_scale: f64,
    /// Dilation of the offset predictors and the propagation pattern.
    pub propagation_range: usize,
    /// Propagation neighbors: 0 (disabled), 4, 8 or 16.
    pub propagation_neighbors: usize,
    /// Evaluation neighbors including the center: 9 or 17.
    pub evaluation_neighbors: usize,
    /// Channels of the feature map consumed by this stage.
    pub num_features: usize,
    /// Channel groups used for group-wise correlation.
    pub group_correlations: usize,
}

impl StageConfig {
    /// Coarsest stage (1/8 resolution) of the reference network.
    pub fn coarse() -> Self {
        Self {
            iterations: 2,
            num_samples: 16,
            interval_scale: 0.025,
            propagation_range: 2,
            propagation_neighbors: 16,
            evaluation_neighbors: 9,
            num_features: 64,
            group_correlations: 8,
        }
    }

    /// Middle stage (1/4 resolution) of the reference network.
    pub fn middle() -> Self {
        Self {
            iterations: 2,
            num_samples: 8,
            interval_scale: 0.0125,
            propagation_range: 4,
            propagation_neighbors: 8,
            evaluation_neighbors: 9,
            num_features: 32,
            group_correlations: 8,
        }
    }

    /// Finest stage (1/2 resolution) of the reference network.
    pub fn fine() -> Self {
        Self {
            iterations: 1,
            num_samples: 8,
            interval_scale: 0.005,
            propagation_range: 6,
            propagation_neighbors: 0,
            evaluation_neighbors: 9,
            num_features: 16,
            group_correlations: 4,
        }
    }

    /// Checks ranges and neighbor counts; `stage` is only used for reporting.
    pub fn validate(&self, stage: usize) -> PatchMatchResult<()> {
        propagation_offsets(self.propagation_neighbors, self.propagation_range)?;
        evaluation_offsets(self.evaluation_neighbors, self.evaluation_dilation())?;
        let invalid = |reason| PatchMatchError::InvalidStageConfig { stage, reason };
        if self.iterations == 0 {
            return Err(invalid("iterations must be at least 1"));
        }
        if self.num_samples == 0 {
            return Err(invalid("num_samples must be at least 1"));
        }
        if !(self.interval_scale > 0.0 && self.interval_scale.is_finite()) {
            return Err(invalid("interval_scale must be positive"));
        }
        if self.propagation_range == 0 {
            return Err(invalid("propagation_range must be at least 1"));
        }
        if self.group_correlations == 0 || self.num_features % self.group_correlations != 0 {
            return Err(invalid("num_features must be a multiple of group_correlations"));
        }
        Ok(())
    }
}

impl Default for StageConfig {
    fn default() -> Self {
        Self::middle()
    }
}

/// Full estimator configuration.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct PatchMatchConfig {
    /// Stage records, coarsest (1/8) first, finest (1/2) last.
    pub stages: [StageConfig; NUM_STAGES],
    /// Run per-view work on the rayon pool (requires the `rayon` feature).
    pub parallel: bool,
}

impl Default for PatchMatchConfig {
    fn default() -> Self {
        Self {
            stages: [StageConfig::coarse(), StageConfig::middle(), StageConfig::fine()],
            parallel: false,
        }
    }
}

impl PatchMatchConfig {
    /// Validates every stage; the first failure is returned.
    pub fn validate(&self) -> PatchMatchResult<()> {
        for (index, stage) in self.stages.iter().enumerate() {
            stage.validate(index)?;
        }
        Ok(())
    }

    /// Hypothesis count of the finest stage's last evaluation.
    pub fn final_hypotheses(&self) -> usize {
        let fine = &self.stages[NUM_STAGES - 1];
        if fine.propagates_on(fine.iterations.saturating_sub(1), true) {
            fine.num_samples + fine.propagation_neighbors
        } else {
            fine.num_samples
        }
    }
}

impl StageConfig {
    /// Whether propagation runs in `iteration`. The last iteration of the
    /// final stage never propagates; it feeds inverse-depth regression.
    pub fn propagates_on(&self, iteration: usize, is_final_stage: bool) -> bool {
        self.propagation_neighbors > 0 && !(is_final_stage && iteration + 1 == self.iterations)
    }

    /// Whether the stage needs a propagation offset predictor at all.
    pub fn needs_propagation(&self, is_final_stage: bool) -> bool {
        (0..self.iterations).any(|iter| self.propagates_on(iter, is_final_stage))
    }

    /// Dilation of the evaluation pattern, one less than the propagation
    /// range.
    pub fn evaluation_dilation(&self) -> usize {
        self.propagation_range.saturating_sub(1)
    }
}
