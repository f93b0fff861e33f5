//! Tensor kernels shared by the stage loop: grid sampling, bilinear
//! upsampling and cross-view warping.

use crate::util::PatchMatchResult;
use candle_core::{Device, Tensor};

/// Out-of-bounds policy for bilinear grid sampling.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Padding {
    /// Samples outside the image read zero.
    Zeros,
    /// Coordinates are clipped to the image so edges repeat.
    Border,
}

/// Row-major pixel coordinates `(x, y)` for an `height × width` grid, each
/// of length `height · width`.
pub(crate) fn pixel_coordinates(
    height: usize,
    width: usize,
    device: &Device,
) -> PatchMatchResult<(Tensor, Tensor)> {
    let xs = Tensor::arange(0f32, width as f32, device)?
        .reshape((1, width))?
        .broadcast_as((height, width))?
        .flatten_all()?;
    let ys = Tensor::arange(0f32, height as f32, device)?
        .reshape((height, 1))?
        .broadcast_as((height, width))?
        .flatten_all()?;
    Ok((xs, ys))
}

/// Runs `f` for every index in `0..count`, on the rayon pool when
/// `parallel` is set. Results keep index order.
#[cfg(feature = "rayon")]
pub(crate) fn map_indices<T, F>(count: usize, parallel: bool, f: F) -> PatchMatchResult<Vec<T>>
where
    T: Send,
    F: Fn(usize) -> PatchMatchResult<T> + Sync + Send,
{
    if parallel {
        self::rayon::map_indices_par(count, f)
    } else {
        (0..count).map(f).collect()
    }
}

/// Runs `f` for every index in `0..count`. Without the `rayon` feature the
/// `parallel` flag is ignored.
#[cfg(not(feature = "rayon"))]
pub(crate) fn map_indices<T, F>(count: usize, _parallel: bool, f: F) -> PatchMatchResult<Vec<T>>
where
    T: Send,
    F: Fn(usize) -> PatchMatchResult<T> + Sync + Send,
{
    (0..count).map(f).collect()
}

pub mod resize;
pub mod sample;
pub mod warp;

#[cfg(feature = "rayon")]
pub(crate) mod rayon;
