//! Multi-scale feature extraction.
//!
//! A strided trunk reduces each image to 1/2, 1/4 and 1/8 resolution. The
//! top-down path upsamples the coarser map by exactly 2 (bilinear,
//! `align_corners = false`) and adds a 1×1 lateral projection of the trunk
//! at the finer scale. Stage-specific 1×1 projections produce the output
//! channels. The pyramid is built once per image and shared by reference
//! with every stage and iteration.

use crate::config::NUM_STAGES;
use crate::kernel::resize::upsample_bilinear2x;
use crate::nn::ConvBnReLU2d;
use crate::trace::trace_span;
use crate::util::{PatchMatchError, PatchMatchResult};
use candle_core::{Module, Tensor};
use candle_nn::{conv2d, conv2d_no_bias, Conv2d, Conv2dConfig, VarBuilder};

/// Trunk width after each strided stage (1/2, 1/4, 1/8).
const TRUNK_CHANNELS: [usize; NUM_STAGES] = [16, 32, 64];

/// Feature maps of one image batch, coarsest first.
#[derive(Clone, Debug)]
pub struct FeaturePyramid {
    levels: Vec<Tensor>,
}

impl FeaturePyramid {
    /// All levels, coarsest (1/8) first.
    pub fn levels(&self) -> &[Tensor] {
        &self.levels
    }

    /// Feature map `(B, C, h, w)` for stage `index` (coarsest first).
    pub fn level(&self, index: usize) -> Option<&Tensor> {
        self.levels.get(index)
    }
}

fn sequential(
    specs: &[(usize, usize, usize, usize, usize)],
    vb: VarBuilder,
) -> candle_core::Result<Vec<ConvBnReLU2d>> {
    specs
        .iter()
        .enumerate()
        .map(|(i, &(cin, cout, kernel, stride, padding))| {
            ConvBnReLU2d::new(cin, cout, kernel, stride, padding, vb.pp(i.to_string()))
        })
        .collect()
}

fn run(layers: &[ConvBnReLU2d], xs: &Tensor) -> candle_core::Result<Tensor> {
    layers.iter().try_fold(xs.clone(), |acc, layer| layer.forward(&acc))
}

/// Shared feature extractor applied to every view.
#[derive(Debug, Clone)]
pub struct FeatureNet {
    stage1: Vec<ConvBnReLU2d>,
    stage2: Vec<ConvBnReLU2d>,
    stage3: Vec<ConvBnReLU2d>,
    output1: Conv2d,
    output2: Conv2d,
    output3: Conv2d,
    inner1: Conv2d,
    inner2: Conv2d,
}

impl FeatureNet {
    /// `channels` lists the output channels per stage, coarsest first.
    pub fn new(channels: [usize; NUM_STAGES], vb: VarBuilder) -> candle_core::Result<Self> {
        let [c8, c4, c2] = channels;
        let [t2, t4, t8] = TRUNK_CHANNELS;
        let stage1 = sequential(
            &[
                (3, 8, 3, 1, 1),
                (8, 8, 3, 1, 1),
                (8, t2, 5, 2, 2),
                (t2, t2, 3, 1, 1),
                (t2, t2, 3, 1, 1),
            ],
            vb.pp("stage1"),
        )?;
        let stage2 = sequential(
            &[(t2, t4, 5, 2, 2), (t4, t4, 3, 1, 1), (t4, t4, 3, 1, 1)],
            vb.pp("stage2"),
        )?;
        let stage3 = sequential(
            &[(t4, t8, 5, 2, 2), (t8, t8, 3, 1, 1), (t8, t8, 3, 1, 1)],
            vb.pp("stage3"),
        )?;
        let pointwise = Conv2dConfig::default();
        Ok(Self {
            stage1,
            stage2,
            stage3,
            output1: conv2d_no_bias(t8, c2, 1, pointwise, vb.pp("output1"))?,
            output2: conv2d_no_bias(t8, c4, 1, pointwise, vb.pp("output2"))?,
            output3: conv2d_no_bias(t8, c8, 1, pointwise, vb.pp("output3"))?,
            inner1: conv2d(t2, t8, 1, pointwise, vb.pp("inner1"))?,
            inner2: conv2d(t4, t8, 1, pointwise, vb.pp("inner2"))?,
        })
    }

    /// Extracts the pyramid of a `(B, 3, H, W)` image batch.
    pub fn extract(&self, image: &Tensor) -> PatchMatchResult<FeaturePyramid> {
        let (_, channels, height, width) = image.dims4()?;
        if channels != 3 || height % 8 != 0 || width % 8 != 0 {
            return Err(PatchMatchError::InvalidInput(
                "feature extraction expects 3-channel images with sides divisible by 8",
            ));
        }
        let _span = trace_span!("feature_pyramid", height = height, width = width).entered();

        let res1 = run(&self.stage1, image)?;
        let res2 = run(&self.stage2, &res1)?;
        let res3 = run(&self.stage3, &res2)?;
        let coarse = self.output3.forward(&res3)?;

        let intra2 = (upsample_bilinear2x(&res3)? + self.inner2.forward(&res2)?)?;
        let middle = self.output2.forward(&intra2)?;

        let intra1 = (upsample_bilinear2x(&intra2)? + self.inner1.forward(&res1)?)?;
        let fine = self.output1.forward(&intra1)?;

        Ok(FeaturePyramid {
            levels: vec![coarse, middle, fine],
        })
    }
}
