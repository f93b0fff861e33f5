//! Factor-2 bilinear upsampling (`align_corners = false`).
//!
//! The interpolation is separable, so it is applied as two products with
//! small `(in, out)` interpolation matrices: first along the width, then
//! along the height. Each output is a convex blend of at most two inputs per
//! axis, so the value range of the input is preserved.

use crate::util::math::upsample_taps;
use crate::util::PatchMatchResult;
use candle_core::{Device, Tensor};

/// Upsamples `(B, C, H, W)` to `(B, C, 2H, 2W)`.
pub fn upsample_bilinear2x(input: &Tensor) -> PatchMatchResult<Tensor> {
    let (batch, channels, height, width) = input.dims4()?;
    let device = input.device();
    let planes = batch * channels;

    let along_w = interpolation_matrix(width, device)?;
    let along_h = interpolation_matrix(height, device)?;

    let rows = input
        .contiguous()?
        .reshape((planes * height, width))?
        .matmul(&along_w)?
        .reshape((planes, height, 2 * width))?;
    let cols = rows
        .transpose(1, 2)?
        .contiguous()?
        .reshape((planes * 2 * width, height))?
        .matmul(&along_h)?
        .reshape((planes, 2 * width, 2 * height))?;
    Ok(cols
        .transpose(1, 2)?
        .contiguous()?
        .reshape((batch, channels, 2 * height, 2 * width))?)
}

/// `(size, 2 * size)` matrix whose column `o` holds the taps of output `o`.
fn interpolation_matrix(size: usize, device: &Device) -> PatchMatchResult<Tensor> {
    let out_size = 2 * size;
    let mut data = vec![0f32; size * out_size];
    for o in 0..out_size {
        let (i0, i1, w1) = upsample_taps(o, size);
        data[i0 * out_size + o] += 1.0 - w1;
        data[i1 * out_size + o] += w1;
    }
    Ok(Tensor::from_vec(data, (size, out_size), device)?)
}

#[cfg(test)]
mod tests {
    use super::upsample_bilinear2x;
    use candle_core::{Device, Tensor};

    #[test]
    fn constant_plane_stays_constant() {
        let input = Tensor::ones((1, 2, 3, 4), candle_core::DType::F32, &Device::Cpu)
            .and_then(|t| t.affine(3.5, 0.0))
            .unwrap();
        let out = upsample_bilinear2x(&input).unwrap();
        assert_eq!(out.dims(), &[1, 2, 6, 8]);
        for v in out.flatten_all().unwrap().to_vec1::<f32>().unwrap() {
            assert!((v - 3.5).abs() < 1e-6);
        }
    }

    #[test]
    fn matches_reference_row() {
        let input = Tensor::from_vec(vec![0f32, 4.0], (1, 1, 1, 2), &Device::Cpu).unwrap();
        let out = upsample_bilinear2x(&input).unwrap();
        let values = out.flatten_all().unwrap().to_vec1::<f32>().unwrap();
        let expected = [0.0f32, 1.0, 3.0, 4.0, 0.0, 1.0, 3.0, 4.0];
        for (v, e) in values.iter().zip(expected.iter()) {
            assert!((v - e).abs() < 1e-6, "{values:?}");
        }
    }
}
