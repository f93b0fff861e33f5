//! Adaptive sampling grids from base patterns plus learned offsets.

use crate::bank::NeighborOffset;
use crate::kernel::pixel_coordinates;
use crate::util::math::normalize_affine;
use crate::util::{PatchMatchError, PatchMatchResult};
use candle_core::Tensor;

/// Normalized per-pixel neighbor coordinates, `(B, N·H, W, 2)`.
///
/// Row block `i` of the grid holds neighbor `i` for every pixel, so
/// sampling a `(B, C, H, W)` map with it gives `(B, C, N·H, W)`, which
/// reshapes to `(B, C, N, H, W)`.
#[derive(Clone, Debug)]
pub struct SamplingGrid {
    grid: Tensor,
    neighbors: usize,
    height: usize,
    width: usize,
}

impl SamplingGrid {
    /// The grid tensor `(B, N·H, W, 2)` in `[-1, 1]` units.
    pub fn tensor(&self) -> &Tensor {
        &self.grid
    }

    /// Number of neighbors per pixel.
    pub fn neighbors(&self) -> usize {
        self.neighbors
    }

    /// Height of the pixel grid the neighbors belong to.
    pub fn height(&self) -> usize {
        self.height
    }

    /// Width of the pixel grid the neighbors belong to.
    pub fn width(&self) -> usize {
        self.width
    }
}

/// Builds a grid from learned offsets `(B, 2N, H, W)` and a base pattern of
/// `N` entries.
///
/// Channel `2i` holds the x residual and channel `2i + 1` the y residual of
/// neighbor `i`. Each neighbor lands at
/// `(x + dx_i + off_x, y + dy_i + off_y)`, normalized per axis with
/// `coord / ((size - 1) / 2) - 1`.
pub fn build_sampling_grid(
    offset: &Tensor,
    pattern: &[NeighborOffset],
) -> PatchMatchResult<SamplingGrid> {
    let (batch, channels, height, width) = offset.dims4()?;
    let neighbors = pattern.len();
    if neighbors == 0 || channels != 2 * neighbors {
        return Err(PatchMatchError::ShapeMismatch {
            what: "learned offsets",
            expected: vec![batch, 2 * neighbors, height, width],
            got: offset.dims().to_vec(),
        });
    }

    let device = offset.device();
    let count = height * width;
    let (xs, ys) = pixel_coordinates(height, width, device)?;
    let base_x: Vec<f32> = pattern.iter().map(|o| o.dx as f32).collect();
    let base_y: Vec<f32> = pattern.iter().map(|o| o.dy as f32).collect();
    let base_x = Tensor::from_vec(base_x, (1, neighbors, 1), device)?;
    let base_y = Tensor::from_vec(base_y, (1, neighbors, 1), device)?;

    let offset = offset.reshape((batch, neighbors, 2, count))?;
    let off_x = offset.narrow(2, 0, 1)?.squeeze(2)?;
    let off_y = offset.narrow(2, 1, 1)?.squeeze(2)?;

    let x = off_x
        .broadcast_add(&base_x)?
        .broadcast_add(&xs.reshape((1, 1, count))?)?;
    let y = off_y
        .broadcast_add(&base_y)?
        .broadcast_add(&ys.reshape((1, 1, count))?)?;

    let (sx, ox) = normalize_affine(width);
    let (sy, oy) = normalize_affine(height);
    let grid = Tensor::stack(&[x.affine(sx, ox)?, y.affine(sy, oy)?], 3)?
        .reshape((batch, neighbors * height, width, 2))?;

    Ok(SamplingGrid {
        grid,
        neighbors,
        height,
        width,
    })
}
