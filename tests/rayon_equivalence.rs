#![cfg(feature = "rayon")]

use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use nalgebra::{Matrix3, Matrix4, Vector3};
use patchmatch_mvs::{
    Camera, DepthRange, MvsInput, PatchMatchConfig, PatchMatchNet, StageProjections,
};
use rand::rngs::StdRng;
use rand::SeedableRng;

fn make_input(size: usize, views: usize) -> MvsInput {
    let f = size as f64;
    let k = Matrix3::new(f, 0.0, f / 2.0, 0.0, f, f / 2.0, 0.0, 0.0, 1.0);
    let cameras: Vec<Camera> = (0..views)
        .map(|v| {
            let pose = Matrix4::new_translation(&Vector3::new(0.05 * v as f64, 0.0, 0.0));
            Camera::new(k, pose)
        })
        .collect();
    let projections = StageProjections::from_cameras(&[cameras], &Device::Cpu).unwrap();
    let data: Vec<f32> = (0..views * 3 * size * size)
        .map(|i| ((i * 31) % 97) as f32 / 97.0)
        .collect();
    let images = Tensor::from_vec(data, (1, views, 3, size, size), &Device::Cpu).unwrap();
    MvsInput::new(images, projections, DepthRange::new(0.5, 5.0).unwrap()).unwrap()
}

fn run(parallel: bool) -> Vec<f32> {
    let config = PatchMatchConfig {
        parallel,
        ..PatchMatchConfig::default()
    };
    let model = PatchMatchNet::new(config, VarBuilder::zeros(DType::F32, &Device::Cpu)).unwrap();
    let estimate = model
        .forward_with_rng(&make_input(32, 4), &mut StdRng::seed_from_u64(17))
        .unwrap();
    estimate.depth.flatten_all().unwrap().to_vec1::<f32>().unwrap()
}

#[test]
fn parallel_matches_sequential() {
    let sequential = run(false);
    let parallel = run(true);
    assert_eq!(sequential.len(), parallel.len());
    for (a, b) in sequential.iter().zip(parallel.iter()) {
        assert!((a - b).abs() < 1e-4, "{a} vs {b}");
    }
}
