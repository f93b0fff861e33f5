//! patchmatch-mvs estimates dense depth and confidence for a reference
//! image from several calibrated source images.
//!
//! A learned feature pyramid feeds three coarse-to-fine PatchMatch stages.
//! Each stage generates depth hypotheses, borrows more from learned
//! neighbors, scores them by warping source features across views, and
//! regresses a depth. The finest estimate is refined to full resolution
//! and a confidence map is derived from its probability volume. Tensors
//! are `candle` tensors; per-view work can run on rayon via the `rayon`
//! feature.

pub mod bank;
pub mod camera;
pub mod checkpoint;
pub mod config;
pub mod image;
pub mod kernel;
pub mod lowlevel;
mod model;
pub mod nn;
pub mod refine;
pub mod search;
mod trace;
pub mod util;

pub use camera::{Camera, StageProjections};
pub use checkpoint::{load_into, load_safetensors, save_safetensors, LoadReport};
pub use config::{PatchMatchConfig, StageConfig, NUM_STAGES};
pub use image::pyramid::{FeatureNet, FeaturePyramid};
pub use image::{DepthRange, MvsInput};
pub use model::{DepthEstimate, PatchMatchNet};
pub use util::{NeighborRole, PatchMatchError, PatchMatchResult};
