use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use nalgebra::{Matrix3, Matrix4, Vector3};
use patchmatch_mvs::{
    Camera, DepthRange, MvsInput, PatchMatchConfig, PatchMatchNet, StageProjections,
};
use rand::rngs::StdRng;
use rand::SeedableRng;

fn make_cameras(size: usize, views: usize) -> Vec<Vec<Camera>> {
    let f = size as f64;
    let c = (size as f64 - 1.0) / 2.0;
    let k = Matrix3::new(f, 0.0, c, 0.0, f, c, 0.0, 0.0, 1.0);
    let cameras = (0..views)
        .map(|v| {
            let baseline = 0.1 * v as f64 * if v % 2 == 0 { 1.0 } else { -1.0 };
            let pose = Matrix4::new_translation(&Vector3::new(baseline, 0.0, 0.0));
            Camera::new(k, pose)
        })
        .collect();
    vec![cameras]
}

fn make_images(views: usize, size: usize) -> Tensor {
    let mut data = Vec::with_capacity(views * 3 * size * size);
    for v in 0..views {
        for ch in 0..3 {
            for y in 0..size {
                for x in 0..size {
                    let value = ((x * 13) ^ (y * 7) ^ (x * y + v + ch)) & 0xFF;
                    data.push(value as f32 / 255.0);
                }
            }
        }
    }
    Tensor::from_vec(data, (1, views, 3, size, size), &Device::Cpu).unwrap()
}

fn make_input(size: usize, views: usize) -> MvsInput {
    let projections = StageProjections::from_cameras(&make_cameras(size, views), &Device::Cpu)
        .unwrap();
    let range = DepthRange::new(0.1, 10.0).unwrap();
    MvsInput::new(make_images(views, size), projections, range).unwrap()
}

fn zero_model(config: PatchMatchConfig) -> PatchMatchNet {
    let vb = VarBuilder::zeros(DType::F32, &Device::Cpu);
    PatchMatchNet::new(config, vb).unwrap()
}

#[test]
fn zero_weights_give_finite_depth_in_range() {
    let model = zero_model(PatchMatchConfig::default());
    let input = make_input(32, 3);
    let mut rng = StdRng::seed_from_u64(42);
    let estimate = model.forward_with_rng(&input, &mut rng).unwrap();

    assert_eq!(estimate.depth.dims(), &[1, 32, 32]);
    assert_eq!(estimate.confidence.dims(), &[1, 32, 32]);
    for d in estimate.depth.flatten_all().unwrap().to_vec1::<f32>().unwrap() {
        assert!(d.is_finite());
        assert!((0.1 - 1e-4..=10.0 + 1e-3).contains(&d), "depth {d}");
    }
    for c in estimate.confidence.flatten_all().unwrap().to_vec1::<f32>().unwrap() {
        assert!((0.0..=1.0).contains(&c), "confidence {c}");
    }
}

#[test]
fn stage_outputs_double_in_resolution() {
    let model = zero_model(PatchMatchConfig::default());
    let input = make_input(32, 3);
    let mut rng = StdRng::seed_from_u64(1);
    let estimate = model.forward_with_rng(&input, &mut rng).unwrap();

    let dims: Vec<Vec<usize>> = estimate
        .stage_depths
        .iter()
        .map(|t| t.dims().to_vec())
        .collect();
    assert_eq!(
        dims,
        vec![vec![1, 1, 4, 4], vec![1, 1, 8, 8], vec![1, 1, 16, 16]]
    );
    assert_eq!(estimate.view_weights.dims(), &[1, 2, 16, 16]);
    for w in estimate.view_weights.flatten_all().unwrap().to_vec1::<f32>().unwrap() {
        assert!((0.0..=1.0).contains(&w));
    }
}

#[test]
fn seeded_runs_are_reproducible() {
    let model = zero_model(PatchMatchConfig::default());
    let input = make_input(16, 2);
    let first = model
        .forward_with_rng(&input, &mut StdRng::seed_from_u64(9))
        .unwrap();
    let second = model
        .forward_with_rng(&input, &mut StdRng::seed_from_u64(9))
        .unwrap();
    let a = first.depth.flatten_all().unwrap().to_vec1::<f32>().unwrap();
    let b = second.depth.flatten_all().unwrap().to_vec1::<f32>().unwrap();
    assert_eq!(a, b);
}

#[test]
fn thread_rng_forward_runs() {
    let model = zero_model(PatchMatchConfig::default());
    let input = make_input(16, 2);
    let estimate = model.forward(&input).unwrap();
    assert_eq!(estimate.depth.dims(), &[1, 16, 16]);
}

#[test]
fn wide_evaluation_neighborhoods_run() {
    let mut config = PatchMatchConfig::default();
    for stage in config.stages.iter_mut() {
        stage.evaluation_neighbors = 17;
    }
    config.stages[1].propagation_neighbors = 4;
    let model = zero_model(config);
    let input = make_input(16, 3);
    let estimate = model
        .forward_with_rng(&input, &mut StdRng::seed_from_u64(3))
        .unwrap();
    for d in estimate.depth.flatten_all().unwrap().to_vec1::<f32>().unwrap() {
        assert!(d.is_finite());
    }
}

#[test]
fn mismatched_projections_are_rejected() {
    let projections = StageProjections::from_cameras(&make_cameras(32, 2), &Device::Cpu).unwrap();
    let range = DepthRange::new(0.1, 10.0).unwrap();
    assert!(MvsInput::new(make_images(3, 32), projections, range).is_err());
}

#[test]
fn unaligned_images_are_rejected() {
    let projections = StageProjections::from_cameras(&make_cameras(20, 2), &Device::Cpu).unwrap();
    let range = DepthRange::new(0.1, 10.0).unwrap();
    assert!(MvsInput::new(make_images(2, 20), projections, range).is_err());
}

#[test]
fn batched_non_square_input_keeps_rows_and_columns_apart() {
    let (height, width, views) = (16usize, 40usize, 3usize);
    let k = Matrix3::new(40.0, 0.0, 19.5, 0.0, 40.0, 7.5, 0.0, 0.0, 1.0);
    let cameras: Vec<Vec<Camera>> = (0..2)
        .map(|b| {
            (0..views)
                .map(|v| {
                    let shift = 0.05 * (v + b) as f64;
                    Camera::new(k, Matrix4::new_translation(&Vector3::new(shift, -shift, 0.0)))
                })
                .collect()
        })
        .collect();
    let projections = StageProjections::from_cameras(&cameras, &Device::Cpu).unwrap();

    let mut data = Vec::with_capacity(2 * views * 3 * height * width);
    for b in 0..2 {
        for v in 0..views {
            for ch in 0..3 {
                for y in 0..height {
                    for x in 0..width {
                        let value = ((x * 11) ^ (y * 5) ^ (x + y * b + v + ch)) & 0xFF;
                        data.push(value as f32 / 255.0);
                    }
                }
            }
        }
    }
    let images = Tensor::from_vec(data, (2, views, 3, height, width), &Device::Cpu).unwrap();
    let range = DepthRange::new(0.5, 6.0).unwrap();
    let input = MvsInput::new(images, projections, range).unwrap();
    assert_eq!(input.batch_size(), 2);
    assert_eq!(input.resolution(), (16, 40));

    let model = zero_model(PatchMatchConfig::default());
    let estimate = model
        .forward_with_rng(&input, &mut StdRng::seed_from_u64(17))
        .unwrap();
    assert_eq!(estimate.depth.dims(), &[2, 16, 40]);
    assert_eq!(estimate.confidence.dims(), &[2, 16, 40]);
    let dims: Vec<Vec<usize>> = estimate
        .stage_depths
        .iter()
        .map(|t| t.dims().to_vec())
        .collect();
    assert_eq!(
        dims,
        vec![vec![2, 1, 2, 5], vec![2, 1, 4, 10], vec![2, 1, 8, 20]]
    );
    assert_eq!(estimate.view_weights.dims(), &[2, 2, 8, 20]);
    for d in estimate.depth.flatten_all().unwrap().to_vec1::<f32>().unwrap() {
        assert!(d.is_finite());
        assert!((0.5 - 1e-4..=6.0 + 1e-3).contains(&d), "depth {d}");
    }
}

#[test]
fn empty_depth_ranges_are_rejected() {
    assert!(DepthRange::new(0.0, 10.0).is_err());
    assert!(DepthRange::new(-1.0, 10.0).is_err());
    assert!(DepthRange::new(4.0, 4.0).is_err());
    assert!(DepthRange::new(5.0, 2.0).is_err());
    assert!(DepthRange::new(0.1, f64::INFINITY).is_err());
    let range = DepthRange::new(0.1, 10.0).unwrap();
    assert_eq!((range.min(), range.max()), (0.1, 10.0));
}
