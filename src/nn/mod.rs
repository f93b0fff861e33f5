//! Learned building blocks.
//!
//! Every block implements [`candle_core::Module`], which is the only thing
//! the rest of the crate relies on: "apply learned transform T to a tensor".
//! Parameter names follow the reference network (`conv`, `bn`, numbered
//! children for sequential stacks) so checkpoints map one to one.

mod blocks;

pub(crate) use blocks::batch_norm_eval;
pub use blocks::{ConvBnReLU2d, ConvBnReLU3d, CostHead, HeadActivation, Pointwise3d};
