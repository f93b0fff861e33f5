//! Full-resolution refinement and the confidence map.
//!
//! Refinement lifts the half-resolution depth of the finest stage to the
//! input resolution using the reference image as guidance. The depth is
//! normalized to `[0, 1]` with the known range, a residual is predicted
//! from image and depth features, added to the bilinear upsample and the
//! result is mapped back to the depth range.

pub mod confidence;

use crate::image::DepthRange;
use crate::kernel::resize::upsample_bilinear2x;
use crate::nn::{batch_norm_eval, ConvBnReLU2d};
use crate::trace::trace_span;
use crate::util::{PatchMatchError, PatchMatchResult};
use candle_core::{Module, Tensor};
use candle_nn::{
    batch_norm, BatchNorm, BatchNormConfig, Conv2d, Conv2dConfig, ConvTranspose2d,
    ConvTranspose2dConfig, VarBuilder,
};

pub use confidence::confidence_map;

const GUIDE_CHANNELS: usize = 8;

/// Image-guided depth upsampling network.
#[derive(Debug, Clone)]
pub struct Refinement {
    conv: ConvBnReLU2d,
    deconv: [ConvBnReLU2d; 2],
    upconv: ConvTranspose2d,
    upconv_bn: BatchNorm,
    residual: ConvBnReLU2d,
    residual_out: Conv2d,
}

impl Refinement {
    pub fn new(vb: VarBuilder) -> candle_core::Result<Self> {
        let c = GUIDE_CHANNELS;
        let deconv_vb = vb.pp("deconv");
        let up_weight = deconv_vb.pp("2").get((c, c, 3, 3), "weight")?;
        let up_cfg = ConvTranspose2dConfig {
            padding: 1,
            output_padding: 1,
            stride: 2,
            ..Default::default()
        };
        let residual_vb = vb.pp("residual");
        let out_weight = residual_vb.pp("1").get((1, c, 3, 3), "weight")?;
        let out_cfg = Conv2dConfig {
            padding: 1,
            ..Default::default()
        };
        Ok(Self {
            conv: ConvBnReLU2d::same(3, c, vb.pp("conv"))?,
            deconv: [
                ConvBnReLU2d::same(1, c, deconv_vb.pp("0"))?,
                ConvBnReLU2d::same(c, c, deconv_vb.pp("1"))?,
            ],
            upconv: ConvTranspose2d::new(up_weight, None, up_cfg),
            upconv_bn: batch_norm(c, BatchNormConfig::default(), deconv_vb.pp("3"))?,
            residual: ConvBnReLU2d::same(2 * c, c, residual_vb.pp("0"))?,
            residual_out: Conv2d::new(out_weight, None, out_cfg),
        })
    }

    /// Refines `depth` `(B, 1, H/2, W/2)` guided by `image` `(B, 3, H, W)`,
    /// returning `(B, H, W)`.
    pub fn forward(
        &self,
        image: &Tensor,
        depth: &Tensor,
        range: DepthRange,
    ) -> PatchMatchResult<Tensor> {
        let (batch, _, height, width) = image.dims4()?;
        let (depth_batch, channels, depth_h, depth_w) = depth.dims4()?;
        if (depth_batch, channels, 2 * depth_h, 2 * depth_w) != (batch, 1, height, width) {
            return Err(PatchMatchError::ShapeMismatch {
                what: "refinement depth",
                expected: vec![batch, 1, height / 2, width / 2],
                got: depth.dims().to_vec(),
            });
        }
        let _span = trace_span!("refinement", height = height, width = width).entered();

        let span = range.span();
        let normalized = depth.affine(1.0 / span, -range.min() / span)?;

        let image_conv = self.conv.forward(image)?;
        let mut guided = normalized.clone();
        for block in &self.deconv {
            guided = block.forward(&guided)?;
        }
        let guided = batch_norm_eval(&self.upconv_bn, &self.upconv.forward(&guided)?)?.relu()?;

        let concat = Tensor::cat(&[&guided, &image_conv], 1)?;
        let residual = self
            .residual_out
            .forward(&self.residual.forward(&concat)?)?;
        let refined = (upsample_bilinear2x(&normalized)? + residual)?;
        Ok(refined.affine(span, range.min())?.squeeze(1)?)
    }
}
