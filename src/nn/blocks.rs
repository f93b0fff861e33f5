use candle_core::{Module, Result, Tensor};
use candle_nn::{
    batch_norm, conv2d_no_bias, BatchNorm, BatchNormConfig, Conv2d, Conv2dConfig, ModuleT,
    VarBuilder,
};

/// Applies batch norm in inference mode over dim 1 of an `(N, C, ...)` tensor.
pub(crate) fn batch_norm_eval(bn: &BatchNorm, xs: &Tensor) -> Result<Tensor> {
    let dims = xs.dims().to_vec();
    let flat = xs.reshape((dims[0], dims[1], ()))?;
    bn.forward_t(&flat, false)?.reshape(dims)
}

/// 2D convolution (no bias), batch norm, ReLU.
#[derive(Debug, Clone)]
pub struct ConvBnReLU2d {
    conv: Conv2d,
    bn: BatchNorm,
}

impl ConvBnReLU2d {
    pub fn new(
        in_channels: usize,
        out_channels: usize,
        kernel: usize,
        stride: usize,
        padding: usize,
        vb: VarBuilder,
    ) -> Result<Self> {
        let cfg = Conv2dConfig {
            padding,
            stride,
            ..Default::default()
        };
        let conv = conv2d_no_bias(in_channels, out_channels, kernel, cfg, vb.pp("conv"))?;
        let bn = batch_norm(out_channels, BatchNormConfig::default(), vb.pp("bn"))?;
        Ok(Self { conv, bn })
    }

    /// 3×3, stride 1, padding 1.
    pub fn same(in_channels: usize, out_channels: usize, vb: VarBuilder) -> Result<Self> {
        Self::new(in_channels, out_channels, 3, 1, 1, vb)
    }
}

impl Module for ConvBnReLU2d {
    fn forward(&self, xs: &Tensor) -> Result<Tensor> {
        batch_norm_eval(&self.bn, &self.conv.forward(xs)?)?.relu()
    }
}

/// 1×1×1 "3D" convolution acting on `(B, C, D, H, W)` volumes.
///
/// Stored with the `(out, in, 1, 1, 1)` weight layout of a 3D kernel and
/// evaluated as a 1D convolution over the flattened volume.
#[derive(Debug, Clone)]
pub struct Pointwise3d {
    weight: Tensor,
    bias: Option<Tensor>,
    out_channels: usize,
}

impl Pointwise3d {
    pub fn new(
        in_channels: usize,
        out_channels: usize,
        with_bias: bool,
        vb: VarBuilder,
    ) -> Result<Self> {
        let weight = vb
            .get((out_channels, in_channels, 1, 1, 1), "weight")?
            .reshape((out_channels, in_channels, 1))?;
        let bias = if with_bias {
            Some(vb.get(out_channels, "bias")?.reshape((1, out_channels, 1))?)
        } else {
            None
        };
        Ok(Self {
            weight,
            bias,
            out_channels,
        })
    }
}

impl Module for Pointwise3d {
    fn forward(&self, xs: &Tensor) -> Result<Tensor> {
        let dims = xs.dims().to_vec();
        let flat = xs.reshape((dims[0], dims[1], ()))?;
        let mut out = flat.conv1d(&self.weight, 0, 1, 1, 1)?;
        if let Some(bias) = &self.bias {
            out = out.broadcast_add(bias)?;
        }
        let mut out_dims = dims;
        out_dims[1] = self.out_channels;
        out.reshape(out_dims)
    }
}

/// Pointwise 3D convolution (no bias), batch norm, ReLU.
#[derive(Debug, Clone)]
pub struct ConvBnReLU3d {
    conv: Pointwise3d,
    bn: BatchNorm,
}

impl ConvBnReLU3d {
    pub fn new(in_channels: usize, out_channels: usize, vb: VarBuilder) -> Result<Self> {
        let conv = Pointwise3d::new(in_channels, out_channels, false, vb.pp("conv"))?;
        let bn = batch_norm(out_channels, BatchNormConfig::default(), vb.pp("bn"))?;
        Ok(Self { conv, bn })
    }
}

impl Module for ConvBnReLU3d {
    fn forward(&self, xs: &Tensor) -> Result<Tensor> {
        batch_norm_eval(&self.bn, &self.conv.forward(xs)?)?.relu()
    }
}

/// Output nonlinearity of a [`CostHead`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HeadActivation {
    Identity,
    Sigmoid,
}

/// `G → 16 → 8 → 1` pointwise stack over per-group similarity volumes.
///
/// Children are named `0`, `1`, `2` under the given prefix.
#[derive(Debug, Clone)]
pub struct CostHead {
    first: ConvBnReLU3d,
    second: ConvBnReLU3d,
    out: Pointwise3d,
    activation: HeadActivation,
}

impl CostHead {
    pub fn new(groups: usize, activation: HeadActivation, vb: VarBuilder) -> Result<Self> {
        Ok(Self {
            first: ConvBnReLU3d::new(groups, 16, vb.pp("0"))?,
            second: ConvBnReLU3d::new(16, 8, vb.pp("1"))?,
            out: Pointwise3d::new(8, 1, true, vb.pp("2"))?,
            activation,
        })
    }
}

impl Module for CostHead {
    fn forward(&self, xs: &Tensor) -> Result<Tensor> {
        let out = self
            .out
            .forward(&self.second.forward(&self.first.forward(xs)?)?)?;
        match self.activation {
            HeadActivation::Identity => Ok(out),
            HeadActivation::Sigmoid => candle_nn::ops::sigmoid(&out),
        }
    }
}
