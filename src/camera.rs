//! Pinhole cameras and the per-stage projection matrices derived from them.

use crate::config::NUM_STAGES;
use crate::util::{PatchMatchError, PatchMatchResult};
use candle_core::{Device, Tensor};
use nalgebra::{Matrix3, Matrix4};

/// Pinhole camera with full-resolution intrinsics and world→camera pose.
#[derive(Clone, Debug, PartialEq)]
pub struct Camera {
    pub intrinsics: Matrix3<f64>,
    pub extrinsics: Matrix4<f64>,
}

impl Camera {
    pub fn new(intrinsics: Matrix3<f64>, extrinsics: Matrix4<f64>) -> Self {
        Self {
            intrinsics,
            extrinsics,
        }
    }

    /// 4×4 projection for an image resized by `scale`.
    ///
    /// The first two rows of the intrinsics are scaled, the matrix is
    /// augmented to 4×4 and multiplied with the extrinsics.
    pub fn projection_at_scale(&self, scale: f64) -> Matrix4<f64> {
        let mut k = Matrix4::identity();
        for r in 0..3 {
            let row_scale = if r < 2 { scale } else { 1.0 };
            for c in 0..3 {
                k[(r, c)] = self.intrinsics[(r, c)] * row_scale;
            }
        }
        k * self.extrinsics
    }
}

/// Resolution factor of stage `index` (coarsest first): 1/8, 1/4, 1/2.
pub fn stage_scale(index: usize) -> f64 {
    1.0 / f64::from(1u32 << (NUM_STAGES - index))
}

/// Projection matrices for every stage, each `(B, V, 4, 4)`, coarsest
/// stage first. View 0 is the reference view.
#[derive(Clone, Debug)]
pub struct StageProjections {
    stages: Vec<Tensor>,
}

impl StageProjections {
    /// Wraps externally built `(B, V, 4, 4)` tensors (coarsest first).
    pub fn from_tensors(stages: Vec<Tensor>) -> PatchMatchResult<Self> {
        if stages.len() != NUM_STAGES {
            return Err(PatchMatchError::InvalidInput(
                "expected one projection tensor per stage",
            ));
        }
        let (batch, views, _, _) = stages[0].dims4()?;
        for stage in &stages {
            let dims = stage.dims4()?;
            if dims != (batch, views, 4, 4) {
                return Err(PatchMatchError::ShapeMismatch {
                    what: "stage projections",
                    expected: vec![batch, views, 4, 4],
                    got: stage.dims().to_vec(),
                });
            }
            if !stage.device().same_device(stages[0].device()) {
                return Err(PatchMatchError::DeviceMismatch("stage projections"));
            }
        }
        Ok(Self { stages })
    }

    /// Builds all stages from cameras indexed `[batch][view]`.
    pub fn from_cameras(cameras: &[Vec<Camera>], device: &Device) -> PatchMatchResult<Self> {
        let batch = cameras.len();
        let views = cameras.first().map_or(0, Vec::len);
        if batch == 0 || views == 0 || cameras.iter().any(|c| c.len() != views) {
            return Err(PatchMatchError::InvalidInput(
                "cameras must form a non-empty batch × view table",
            ));
        }
        let mut stages = Vec::with_capacity(NUM_STAGES);
        for index in 0..NUM_STAGES {
            let scale = stage_scale(index);
            let mut data = Vec::with_capacity(batch * views * 16);
            for camera in cameras.iter().flatten() {
                let proj = camera.projection_at_scale(scale);
                for r in 0..4 {
                    for c in 0..4 {
                        data.push(proj[(r, c)] as f32);
                    }
                }
            }
            stages.push(Tensor::from_vec(data, (batch, views, 4, 4), device)?);
        }
        Ok(Self { stages })
    }

    /// `(B, V, 4, 4)` tensor of stage `index`.
    pub fn stage(&self, index: usize) -> Option<&Tensor> {
        self.stages.get(index)
    }

    /// `(B, 4, 4)` projection of `view` at stage `index`.
    pub fn view(&self, index: usize, view: usize) -> PatchMatchResult<Tensor> {
        let stage = self.stages.get(index).ok_or(PatchMatchError::InvalidInput(
            "stage index out of range",
        ))?;
        Ok(stage.narrow(1, view, 1)?.squeeze(1)?)
    }

    /// Batch size and view count.
    pub fn dims(&self) -> PatchMatchResult<(usize, usize)> {
        let (batch, views, _, _) = self.stages[0].dims4()?;
        Ok((batch, views))
    }

    pub fn device(&self) -> &Device {
        self.stages[0].device()
    }
}
