//! Depth hypothesis generation.
//!
//! A stage either starts from nothing and scatters hypotheses randomly over
//! the inverse-depth range, forwards its previous estimate unchanged, or
//! places a centered ladder of hypotheses around the previous estimate in
//! inverse-depth space.

use crate::image::DepthRange;
use crate::util::{PatchMatchError, PatchMatchResult};
use candle_core::{Device, Tensor};
use rand::Rng;

/// Number of hypotheses drawn when no prior depth exists.
pub const RANDOM_HYPOTHESES: usize = 48;

/// Per-stage hypothesis policy.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct HypothesisGenerator {
    num_samples: usize,
    interval_scale: f64,
}

impl HypothesisGenerator {
    pub fn new(num_samples: usize, interval_scale: f64) -> PatchMatchResult<Self> {
        if num_samples == 0 {
            return Err(PatchMatchError::InvalidInput(
                "hypothesis count must be at least 1",
            ));
        }
        Ok(Self {
            num_samples,
            interval_scale,
        })
    }

    pub fn num_samples(&self) -> usize {
        self.num_samples
    }

    /// Produces `(B, D, H, W)` hypotheses.
    ///
    /// Without `previous` this draws [`RANDOM_HYPOTHESES`] random ones of
    /// shape `(batch, height, width)`. With a `(B, 1, H, W)` prior and a
    /// single sample the prior is returned detached; otherwise a ladder is
    /// built around it.
    pub fn generate<R: Rng + ?Sized>(
        &self,
        previous: Option<&Tensor>,
        range: DepthRange,
        (batch, height, width): (usize, usize, usize),
        device: &Device,
        rng: &mut R,
    ) -> PatchMatchResult<Tensor> {
        match previous {
            None => random_hypotheses(batch, height, width, range, device, rng),
            Some(depth) if self.num_samples == 1 => Ok(depth.detach()),
            Some(depth) => ladder_hypotheses(depth, range, self.num_samples, self.interval_scale),
        }
    }
}

/// One uniformly jittered hypothesis per inverse-depth bin.
///
/// Bin `k` of [`RANDOM_HYPOTHESES`] equal bins between `1 / max` and
/// `1 / min` receives `k + u`, `u ~ U[0, 1)`, so every hypothesis lies in
/// `[min, max]`.
pub fn random_hypotheses<R: Rng + ?Sized>(
    batch: usize,
    height: usize,
    width: usize,
    range: DepthRange,
    device: &Device,
    rng: &mut R,
) -> PatchMatchResult<Tensor> {
    let n = RANDOM_HYPOTHESES;
    let count = batch * n * height * width;
    let jitter: Vec<f32> = (0..count).map(|_| rng.random::<f32>()).collect();
    let jitter = Tensor::from_vec(jitter, (batch, n, height, width), device)?;
    let bins = Tensor::arange(0f32, n as f32, device)?.reshape((1, n, 1, 1))?;

    let (inv_min, inv_max) = range.inverse();
    let inverse = jitter
        .broadcast_add(&bins)?
        .affine((inv_min - inv_max) / n as f64, inv_max)?;
    Ok(inverse.recip()?)
}

/// Centered integer ladder `-(n / 2) .. n - n / 2` scaled into inverse depth
/// and added to the detached prior `(B, 1, H, W)`.
///
/// The result is clamped to the inverse-depth range before inversion.
pub fn ladder_hypotheses(
    depth: &Tensor,
    range: DepthRange,
    num_samples: usize,
    interval_scale: f64,
) -> PatchMatchResult<Tensor> {
    let (_, channels, _, _) = depth.dims4()?;
    if channels != 1 {
        return Err(PatchMatchError::ShapeMismatch {
            what: "prior depth",
            expected: vec![depth.dim(0)?, 1, depth.dim(2)?, depth.dim(3)?],
            got: depth.dims().to_vec(),
        });
    }
    let half = (num_samples / 2) as f32;
    let ladder = Tensor::arange(-half, num_samples as f32 - half, depth.device())?
        .reshape((1, num_samples, 1, 1))?;

    let (inv_min, inv_max) = range.inverse();
    let step = (inv_min - inv_max) * interval_scale;
    let inverse = depth
        .detach()
        .recip()?
        .broadcast_add(&ladder.affine(step, 0.0)?)?
        .clamp(inv_max as f32, inv_min as f32)?;
    Ok(inverse.recip()?)
}
