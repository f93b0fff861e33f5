//! Hypothesis propagation from learned spatial neighbors.

use crate::bank::SamplingGrid;
use crate::kernel::sample::grid_sample;
use crate::kernel::Padding;
use crate::util::{PatchMatchError, PatchMatchResult};
use candle_core::Tensor;

/// Appends the center hypothesis of every propagation neighbor to `depth`
/// `(B, D, H, W)` and sorts the result ascending along the hypothesis axis.
///
/// The center hypothesis is index `D / 2`; neighbors outside the image
/// repeat the border. Output is `(B, D + N, H, W)`.
pub fn propagate(depth: &Tensor, grid: &SamplingGrid) -> PatchMatchResult<Tensor> {
    let (batch, num_depth, height, width) = depth.dims4()?;
    if (grid.height(), grid.width()) != (height, width) {
        return Err(PatchMatchError::ShapeMismatch {
            what: "propagation grid",
            expected: vec![batch, grid.neighbors() * height, width, 2],
            got: grid.tensor().dims().to_vec(),
        });
    }
    let neighbors = grid.neighbors();
    let center = depth.narrow(1, num_depth / 2, 1)?;
    let borrowed = grid_sample(&center, grid.tensor(), Padding::Border)?
        .reshape((batch, neighbors, height, width))?;

    let merged = Tensor::cat(&[depth, &borrowed], 1)?
        .permute((0, 2, 3, 1))?
        .contiguous()?;
    let (sorted, _) = merged.sort_last_dim(true)?;
    Ok(sorted.permute((0, 3, 1, 2))?.contiguous()?)
}

#[cfg(test)]
mod tests {
    use super::propagate;
    use crate::bank::{build_sampling_grid, propagation_offsets};
    use candle_core::{DType, Device, Tensor};

    #[test]
    fn propagated_hypotheses_are_sorted() {
        let device = Device::Cpu;
        let values: Vec<f32> = (0..3 * 4 * 5).map(|i| ((i * 37) % 11) as f32 + 1.0).collect();
        let depth = Tensor::from_vec(values, (1, 3, 4, 5), &device).unwrap();
        let pattern = propagation_offsets(8, 1).unwrap();
        let offset = Tensor::zeros((1, 16, 4, 5), DType::F32, &device).unwrap();
        let grid = build_sampling_grid(&offset, &pattern).unwrap();

        let out = propagate(&depth, &grid).unwrap();
        assert_eq!(out.dims(), &[1, 11, 4, 5]);
        let per_pixel = out.permute((0, 2, 3, 1)).unwrap().flatten_to(2).unwrap();
        for row in per_pixel.to_vec2::<f32>().unwrap() {
            assert!(row.windows(2).all(|w| w[0] <= w[1]), "{row:?}");
        }
    }

    #[test]
    fn constant_depth_stays_constant() {
        let device = Device::Cpu;
        let depth = Tensor::ones((2, 1, 3, 3), DType::F32, &device).unwrap();
        let pattern = propagation_offsets(4, 2).unwrap();
        let offset = Tensor::zeros((2, 8, 3, 3), DType::F32, &device).unwrap();
        let grid = build_sampling_grid(&offset, &pattern).unwrap();
        let out = propagate(&depth, &grid).unwrap();
        assert_eq!(out.dims(), &[2, 5, 3, 3]);
        for v in out.flatten_all().unwrap().to_vec1::<f32>().unwrap() {
            assert!((v - 1.0).abs() < 1e-6);
        }
    }
}
