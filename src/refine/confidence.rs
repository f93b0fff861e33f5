//! Confidence from the final probability volume.

use crate::kernel::resize::upsample_bilinear2x;
use crate::util::PatchMatchResult;
use candle_core::{DType, Tensor};

/// Width of the probability window summed around the expected hypothesis.
pub const CONFIDENCE_WINDOW: usize = 4;

/// Confidence `(B, 2H, 2W)` in `[0, 1]` for a score volume `(B, D, H, W)`.
///
/// Probability mass is summed over a 4-wide window along the hypothesis
/// axis, padded with one zero before and two after. The window is read at
/// the expected hypothesis index (rounded, clamped to `[0, D - 1]`) and
/// upsampled by 2. The index selection runs on a detached copy.
pub fn confidence_map(score: &Tensor) -> PatchMatchResult<Tensor> {
    let (_, num_depth, _, _) = score.dims4()?;
    let padded = score.pad_with_zeros(1, 1, CONFIDENCE_WINDOW - 2)?;
    let mut window_sum = padded.narrow(1, 0, num_depth)?;
    for shift in 1..CONFIDENCE_WINDOW {
        window_sum = (window_sum + padded.narrow(1, shift, num_depth)?)?;
    }

    let detached = score.detach();
    let ladder = Tensor::arange(0f32, num_depth as f32, score.device())?
        .reshape((1, num_depth, 1, 1))?;
    let index = detached
        .broadcast_mul(&ladder)?
        .sum_keepdim(1)?
        .round()?
        .clamp(0f32, (num_depth - 1) as f32)?
        .to_dtype(DType::U32)?;

    let confidence = window_sum.contiguous()?.gather(&index.contiguous()?, 1)?;
    Ok(upsample_bilinear2x(&confidence)?
        .clamp(0f32, 1f32)?
        .squeeze(1)?)
}
