use candle_core::{DType, Device, Tensor};
use patchmatch_mvs::lowlevel::{
    differentiable_warp, grid_sample, projection_grid, upsample_bilinear2x, Padding,
};

fn identity(batch: usize) -> Tensor {
    Tensor::eye(4, DType::F32, &Device::Cpu)
        .unwrap()
        .unsqueeze(0)
        .unwrap()
        .repeat((batch, 1, 1))
        .unwrap()
}

#[test]
fn degenerate_points_land_off_frame() {
    let (height, width) = (4usize, 6usize);
    let depth = Tensor::zeros((1, 2, height, width), DType::F32, &Device::Cpu).unwrap();
    let grid = projection_grid(&identity(1), &identity(1), &depth).unwrap();
    let values = grid.flatten_all().unwrap().to_vec1::<f32>().unwrap();
    let off_x = width as f32 / ((width as f32 - 1.0) / 2.0) - 1.0;
    let off_y = height as f32 / ((height as f32 - 1.0) / 2.0) - 1.0;
    for pair in values.chunks(2) {
        assert!(pair[0].is_finite() && pair[1].is_finite());
        assert!((pair[0] - off_x).abs() < 1e-5);
        assert!((pair[1] - off_y).abs() < 1e-5);
    }

    let feature = Tensor::ones((1, 3, height, width), DType::F32, &Device::Cpu).unwrap();
    let warped = differentiable_warp(&feature, &identity(1), &identity(1), &depth).unwrap();
    assert_eq!(warped.dims(), &[1, 3, 2, height, width]);
    for v in warped.flatten_all().unwrap().to_vec1::<f32>().unwrap() {
        assert_eq!(v, 0.0);
    }
}

#[test]
fn valid_warp_keeps_interior_values() {
    let (height, width) = (6usize, 8usize);
    let feature = Tensor::ones((1, 2, height, width), DType::F32, &Device::Cpu).unwrap();
    let depth = Tensor::ones((1, 3, height, width), DType::F32, &Device::Cpu)
        .unwrap()
        .affine(2.5, 0.0)
        .unwrap();
    let warped = differentiable_warp(&feature, &identity(1), &identity(1), &depth).unwrap();
    let interior = warped
        .narrow(3, 1, height - 2)
        .unwrap()
        .narrow(4, 1, width - 2)
        .unwrap()
        .flatten_all()
        .unwrap()
        .to_vec1::<f32>()
        .unwrap();
    for v in interior {
        assert!((v - 1.0).abs() < 1e-5, "{v}");
    }
}

#[test]
fn upsampling_doubles_size_and_keeps_range() {
    let values: Vec<f32> = (0..2 * 3 * 5).map(|i| ((i * 7) % 11) as f32 / 10.0).collect();
    let input = Tensor::from_vec(values, (1, 2, 3, 5), &Device::Cpu).unwrap();
    let up = upsample_bilinear2x(&input).unwrap();
    assert_eq!(up.dims(), &[1, 2, 6, 10]);
    for v in up.flatten_all().unwrap().to_vec1::<f32>().unwrap() {
        assert!((0.0..=1.0 + 1e-6).contains(&v));
    }
}

#[test]
fn border_padding_repeats_edges() {
    let input = Tensor::from_vec(vec![1f32, 2.0, 3.0, 4.0], (1, 1, 2, 2), &Device::Cpu).unwrap();
    let grid = Tensor::from_vec(vec![-3f32, -3.0, 3.0, 3.0], (1, 1, 2, 2), &Device::Cpu).unwrap();
    let border = grid_sample(&input, &grid, Padding::Border).unwrap();
    assert_eq!(border.flatten_all().unwrap().to_vec1::<f32>().unwrap(), vec![1.0, 4.0]);
    let zeros = grid_sample(&input, &grid, Padding::Zeros).unwrap();
    assert_eq!(zeros.flatten_all().unwrap().to_vec1::<f32>().unwrap(), vec![0.0, 0.0]);
}
