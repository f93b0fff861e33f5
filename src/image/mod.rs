//! Input batches and the learned feature pyramid.
//!
//! `MvsInput` bundles the stacked reference/source images, the per-stage
//! projections and the depth range, and checks that they agree before any
//! network code runs. View 0 is the reference image.

use crate::camera::StageProjections;
use crate::util::{PatchMatchError, PatchMatchResult};
use candle_core::{DType, Tensor};

pub mod pyramid;

/// Smallest accepted image side; the coarsest stage then has 2 pixels.
pub const MIN_IMAGE_SIDE: usize = 16;

/// Near and far bound of the scene depth, shared by the whole batch.
///
/// Only constructible through [`DepthRange::new`], so `0 < min < max` holds
/// for every value, deserialized ones included.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(try_from = "DepthRangeFields")
)]
pub struct DepthRange {
    min: f64,
    max: f64,
}

#[cfg(feature = "serde")]
#[derive(serde::Deserialize)]
struct DepthRangeFields {
    min: f64,
    max: f64,
}

#[cfg(feature = "serde")]
impl TryFrom<DepthRangeFields> for DepthRange {
    type Error = PatchMatchError;

    fn try_from(fields: DepthRangeFields) -> PatchMatchResult<Self> {
        Self::new(fields.min, fields.max)
    }
}

impl DepthRange {
    /// Requires `0 < min < max`, both finite.
    pub fn new(min: f64, max: f64) -> PatchMatchResult<Self> {
        if !(min.is_finite() && max.is_finite()) || min <= 0.0 || max <= min {
            return Err(PatchMatchError::InvalidInput(
                "depth range must satisfy 0 < min < max",
            ));
        }
        Ok(Self { min, max })
    }

    pub fn min(&self) -> f64 {
        self.min
    }

    pub fn max(&self) -> f64 {
        self.max
    }

    /// `max - min`.
    pub fn span(&self) -> f64 {
        self.max - self.min
    }

    /// `(1 / min, 1 / max)`.
    pub fn inverse(&self) -> (f64, f64) {
        crate::util::math::inverse_range(self.min, self.max)
    }
}

/// One forward-pass worth of input.
#[derive(Clone, Debug)]
pub struct MvsInput {
    images: Tensor,
    projections: StageProjections,
    depth_range: DepthRange,
}

impl MvsInput {
    /// `images` is `(B, V, 3, H, W)` f32 with `V >= 2`; `H` and `W` must be
    /// multiples of 8 and at least [`MIN_IMAGE_SIDE`].
    pub fn new(
        images: Tensor,
        projections: StageProjections,
        depth_range: DepthRange,
    ) -> PatchMatchResult<Self> {
        let (batch, views, channels, height, width) = images.dims5()?;
        if images.dtype() != DType::F32 {
            return Err(PatchMatchError::InvalidInput("images must be f32"));
        }
        if channels != 3 {
            return Err(PatchMatchError::ShapeMismatch {
                what: "images",
                expected: vec![batch, views, 3, height, width],
                got: images.dims().to_vec(),
            });
        }
        if views < 2 {
            return Err(PatchMatchError::InvalidInput(
                "at least one source view is required",
            ));
        }
        if height % 8 != 0 || width % 8 != 0 {
            return Err(PatchMatchError::InvalidInput(
                "image height and width must be multiples of 8",
            ));
        }
        if height < MIN_IMAGE_SIDE || width < MIN_IMAGE_SIDE {
            return Err(PatchMatchError::InvalidInput("image is too small"));
        }
        let (proj_batch, proj_views) = projections.dims()?;
        if (proj_batch, proj_views) != (batch, views) {
            return Err(PatchMatchError::ShapeMismatch {
                what: "stage projections",
                expected: vec![batch, views, 4, 4],
                got: vec![proj_batch, proj_views, 4, 4],
            });
        }
        if !images.device().same_device(projections.device()) {
            return Err(PatchMatchError::DeviceMismatch("images and projections"));
        }
        Ok(Self {
            images,
            projections,
            depth_range,
        })
    }

    /// `(B, 3, H, W)` image of `view`.
    pub fn view(&self, view: usize) -> PatchMatchResult<Tensor> {
        Ok(self.images.narrow(1, view, 1)?.squeeze(1)?)
    }

    pub fn images(&self) -> &Tensor {
        &self.images
    }

    pub fn projections(&self) -> &StageProjections {
        &self.projections
    }

    pub fn depth_range(&self) -> DepthRange {
        self.depth_range
    }

    /// Number of views, reference included.
    pub fn num_views(&self) -> usize {
        self.images.dims()[1]
    }

    pub fn batch_size(&self) -> usize {
        self.images.dims()[0]
    }

    /// Full-resolution `(height, width)`.
    pub fn resolution(&self) -> (usize, usize) {
        let dims = self.images.dims();
        (dims[3], dims[4])
    }
}
