//! Scalar helpers for inverse-depth arithmetic and grid normalization.

/// Lower bound on the per-pixel sum of view weights before normalizing.
pub(crate) const MIN_WEIGHT_SUM: f64 = 1e-5;

/// Maps a pixel coordinate to `[-1, 1]` using `coord / ((size - 1) / 2) - 1`.
///
/// Returns `(scale, offset)` so callers can feed it straight into
/// `Tensor::affine`.
pub(crate) fn normalize_affine(size: usize) -> (f64, f64) {
    (2.0 / (size as f64 - 1.0), -1.0)
}

/// Maps a normalized coordinate back to pixel units (`align_corners = false`).
pub(crate) fn unnormalize_affine(size: usize) -> (f64, f64) {
    let size = size as f64;
    (size / 2.0, (size - 1.0) / 2.0)
}

/// Source index for factor-2 bilinear upsampling with `align_corners = false`.
///
/// Returns the two taps and the weight of the second one.
pub(crate) fn upsample_taps(out_index: usize, in_size: usize) -> (usize, usize, f32) {
    let src = ((out_index as f32 + 0.5) * 0.5 - 0.5).max(0.0);
    let i0 = (src.floor() as usize).min(in_size - 1);
    let i1 = if i0 + 1 < in_size { i0 + 1 } else { i0 };
    (i0, i1, src - i0 as f32)
}

/// Inverse of the near and far plane: `(1 / depth_min, 1 / depth_max)`.
pub(crate) fn inverse_range(depth_min: f64, depth_max: f64) -> (f64, f64) {
    (1.0 / depth_min, 1.0 / depth_max)
}
