//! Differentiable cross-view warping.
//!
//! Every reference pixel `(x, y, 1)` is rotated into the source camera,
//! scaled by each depth hypothesis, translated, and projected. Points that
//! land at or behind the source camera (`z <= 1e-3`) are replaced by the
//! fixed triple `(width, height, 1)`, which projects just past the bottom
//! right corner so zero padding yields a deterministic zero sample.
//!
//! The projection runs on detached tensors; only the resampled feature
//! values take part in gradient computation.

use crate::kernel::sample::grid_sample;
use crate::kernel::{pixel_coordinates, Padding};
use crate::util::math::normalize_affine;
use crate::util::{PatchMatchError, PatchMatchResult};
use candle_core::{DType, Tensor};
use nalgebra::Matrix4;

/// Depth at or below which a projected point counts as behind the camera.
pub const MIN_PROJECTED_DEPTH: f32 = 1e-3;

/// Relative transform `src · ref⁻¹` split into rotation `(B, 3, 3)` and
/// translation `(B, 3, 1)`.
pub fn relative_projection(
    src_proj: &Tensor,
    ref_proj: &Tensor,
) -> PatchMatchResult<(Tensor, Tensor)> {
    let src = host_matrices(src_proj)?;
    let reference = host_matrices(ref_proj)?;
    if src.len() != reference.len() {
        return Err(PatchMatchError::ShapeMismatch {
            what: "source projection batch",
            expected: vec![reference.len(), 4, 4],
            got: vec![src.len(), 4, 4],
        });
    }

    let batch = src.len();
    let mut rot = Vec::with_capacity(batch * 9);
    let mut trans = Vec::with_capacity(batch * 3);
    for (b, (src_m, ref_m)) in src.iter().zip(reference.iter()).enumerate() {
        let ref_inv = ref_m
            .try_inverse()
            .ok_or(PatchMatchError::SingularProjection { batch: b })?;
        let rel = src_m * ref_inv;
        for r in 0..3 {
            for c in 0..3 {
                rot.push(rel[(r, c)] as f32);
            }
            trans.push(rel[(r, 3)] as f32);
        }
    }

    let device = src_proj.device();
    Ok((
        Tensor::from_vec(rot, (batch, 3, 3), device)?,
        Tensor::from_vec(trans, (batch, 3, 1), device)?,
    ))
}

/// Normalized source sampling grid `(B, D·H, W, 2)` for every hypothesis.
pub fn projection_grid(
    src_proj: &Tensor,
    ref_proj: &Tensor,
    depth: &Tensor,
) -> PatchMatchResult<Tensor> {
    let (batch, num_depth, height, width) = depth.dims4()?;
    let depth = depth.detach();
    let (rot, trans) = relative_projection(src_proj, ref_proj)?;
    if rot.dim(0)? != batch {
        return Err(PatchMatchError::ShapeMismatch {
            what: "projection batch",
            expected: vec![batch, 4, 4],
            got: src_proj.dims().to_vec(),
        });
    }

    let device = depth.device();
    let count = height * width;
    let (xs, ys) = pixel_coordinates(height, width, device)?;
    let homogeneous = Tensor::stack(&[xs.clone(), ys, xs.ones_like()?], 0)?
        .unsqueeze(0)?
        .broadcast_as((batch, 3, count))?
        .contiguous()?;

    let rotated = rot.matmul(&homogeneous)?;
    let points = rotated
        .unsqueeze(2)?
        .broadcast_mul(&depth.reshape((batch, 1, num_depth, count))?)?
        .broadcast_add(&trans.reshape((batch, 3, 1, 1))?)?;

    let x = points.narrow(1, 0, 1)?.squeeze(1)?;
    let y = points.narrow(1, 1, 1)?.squeeze(1)?;
    let z = points.narrow(1, 2, 1)?.squeeze(1)?;

    let behind = z.le(MIN_PROJECTED_DEPTH)?;
    let x = behind.where_cond(&constant_like(&x, width as f64)?, &x)?;
    let y = behind.where_cond(&constant_like(&y, height as f64)?, &y)?;
    let z = behind.where_cond(&constant_like(&z, 1.0)?, &z)?;

    let (sx, ox) = normalize_affine(width);
    let (sy, oy) = normalize_affine(height);
    let gx = (x / &z)?.affine(sx, ox)?;
    let gy = (y / &z)?.affine(sy, oy)?;
    let grid = Tensor::stack(&[gx, gy], 3)?.reshape((batch, num_depth * height, width, 2))?;
    Ok(grid.detach())
}

/// Resamples `feature` `(B, C, H, W)` of a source view at every hypothesis
/// of `depth` `(B, D, H, W)`, returning `(B, C, D, H, W)` aligned with the
/// reference grid.
pub fn differentiable_warp(
    feature: &Tensor,
    src_proj: &Tensor,
    ref_proj: &Tensor,
    depth: &Tensor,
) -> PatchMatchResult<Tensor> {
    let (batch, channels, height, width) = feature.dims4()?;
    let (depth_batch, num_depth, depth_h, depth_w) = depth.dims4()?;
    if (depth_batch, depth_h, depth_w) != (batch, height, width) {
        return Err(PatchMatchError::ShapeMismatch {
            what: "depth hypotheses",
            expected: vec![batch, num_depth, height, width],
            got: depth.dims().to_vec(),
        });
    }
    let grid = projection_grid(src_proj, ref_proj, depth)?;
    Ok(grid_sample(feature, &grid, Padding::Zeros)?
        .reshape((batch, channels, num_depth, height, width))?)
}

fn constant_like(t: &Tensor, value: f64) -> PatchMatchResult<Tensor> {
    Ok(t.ones_like()?.affine(value, 0.0)?)
}

/// Reads `(B, 4, 4)` or `(B, 3, 4)` projections into host matrices.
fn host_matrices(proj: &Tensor) -> PatchMatchResult<Vec<Matrix4<f64>>> {
    let (_, rows, cols) = proj.dims3()?;
    if cols != 4 || !(rows == 3 || rows == 4) {
        return Err(PatchMatchError::ShapeMismatch {
            what: "projection matrix",
            expected: vec![proj.dim(0)?, 4, 4],
            got: proj.dims().to_vec(),
        });
    }
    let values = proj.to_dtype(DType::F64)?.to_vec3::<f64>()?;
    Ok(values
        .iter()
        .map(|m| {
            Matrix4::from_fn(|r, c| {
                if r < rows {
                    m[r][c]
                } else if c == 3 {
                    1.0
                } else {
                    0.0
                }
            })
        })
        .collect())
}
