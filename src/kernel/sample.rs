//! Bilinear grid sampling with `align_corners = false`.
//!
//! The grid holds normalized `(x, y)` pairs in `[-1, 1]` per output pixel.
//! Each pair is mapped back to pixel units with `((g + 1) * size - 1) / 2`,
//! then the four surrounding texels are blended. Texels outside the image
//! contribute zero; `Padding::Border` clips the coordinate into the image
//! first so out-of-frame samples repeat the edge instead.

use crate::kernel::Padding;
use crate::util::math::unnormalize_affine;
use crate::util::{PatchMatchError, PatchMatchResult};
use candle_core::{DType, Tensor};

/// Samples `input` `(B, C, H, W)` at `grid` `(B, Ho, Wo, 2)`.
///
/// Returns `(B, C, Ho, Wo)`. Corner indices are taken from a detached floor,
/// so gradients flow into both the sampled values and the grid coordinates.
pub fn grid_sample(input: &Tensor, grid: &Tensor, padding: Padding) -> PatchMatchResult<Tensor> {
    let (batch, channels, height, width) = input.dims4()?;
    let (grid_batch, out_h, out_w, coords) = grid.dims4()?;
    if grid_batch != batch || coords != 2 {
        return Err(PatchMatchError::ShapeMismatch {
            what: "sampling grid",
            expected: vec![batch, out_h, out_w, 2],
            got: grid.dims().to_vec(),
        });
    }
    if !input.device().same_device(grid.device()) {
        return Err(PatchMatchError::DeviceMismatch("grid_sample input and grid"));
    }

    let count = out_h * out_w;
    let grid = grid.reshape((batch, count, 2))?;
    let (sx, ox) = unnormalize_affine(width);
    let (sy, oy) = unnormalize_affine(height);
    let mut ix = grid.narrow(2, 0, 1)?.squeeze(2)?.affine(sx, ox)?;
    let mut iy = grid.narrow(2, 1, 1)?.squeeze(2)?.affine(sy, oy)?;
    if padding == Padding::Border {
        ix = ix.clamp(0f32, (width - 1) as f32)?;
        iy = iy.clamp(0f32, (height - 1) as f32)?;
    }

    let x0 = ix.detach().floor()?;
    let y0 = iy.detach().floor()?;
    let x1 = x0.affine(1.0, 1.0)?;
    let y1 = y0.affine(1.0, 1.0)?;
    let wx1 = (&ix - &x0)?;
    let wy1 = (&iy - &y0)?;
    let wx0 = wx1.affine(-1.0, 1.0)?;
    let wy0 = wy1.affine(-1.0, 1.0)?;

    let flat = input.reshape((batch, channels, height * width))?;
    let corners = [
        (&x0, &y0, (&wx0 * &wy0)?),
        (&x1, &y0, (&wx1 * &wy0)?),
        (&x0, &y1, (&wx0 * &wy1)?),
        (&x1, &y1, (&wx1 * &wy1)?),
    ];

    let mut acc: Option<Tensor> = None;
    for (cx, cy, weight) in corners {
        let valid = (in_range(cx, width)? * in_range(cy, height)?)?;
        let weight = (weight * valid)?;
        let index = cy
            .clamp(0f32, (height - 1) as f32)?
            .affine(width as f64, 0.0)?
            .add(&cx.clamp(0f32, (width - 1) as f32)?)?
            .to_dtype(DType::U32)?
            .unsqueeze(1)?
            .broadcast_as((batch, channels, count))?
            .contiguous()?;
        let values = flat.gather(&index, 2)?.broadcast_mul(&weight.unsqueeze(1)?)?;
        acc = Some(match acc {
            Some(sum) => (sum + values)?,
            None => values,
        });
    }

    let out = match acc {
        Some(sum) => sum,
        None => Tensor::zeros((batch, channels, count), input.dtype(), input.device())?,
    };
    Ok(out.reshape((batch, channels, out_h, out_w))?)
}

/// 1.0 where `0 <= coord <= size - 1`, else 0.0.
fn in_range(coord: &Tensor, size: usize) -> PatchMatchResult<Tensor> {
    let lower = coord.ge(0f32)?.to_dtype(DType::F32)?;
    let upper = coord.le((size - 1) as f32)?.to_dtype(DType::F32)?;
    Ok((lower * upper)?)
}
