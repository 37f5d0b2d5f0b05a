#![allow(dead_code)]

use klt_image::{Image, ImageError};

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Smooth synthetic texture in `[0, 1]`, well conditioned at every pyramid level.
pub fn texture(x: f32, y: f32) -> f32 {
    let v = 128.0
        + 50.0 * (0.35 * x).sin() * (0.27 * y).cos()
        + 30.0 * (0.21 * (x + y)).sin()
        + 20.0 * (0.11 * x - 0.07 * y).cos();
    v / 255.0
}

/// The texture translated by `(dx, dy)` pixels.
pub fn textured_frame(width: usize, height: usize, dx: f32, dy: f32) -> Result<Image<f32, 1>, ImageError> {
    Image::from_size_fn([width, height].into(), |x, y, _| {
        texture(x as f32 - dx, y as f32 - dy)
    })
}

/// A checkerboard in `[0, 1]` with square cells.
pub fn checkerboard(width: usize, height: usize, cell: usize) -> Result<Image<f32, 1>, ImageError> {
    Image::from_size_fn([width, height].into(), |x, y, _| {
        if (x / cell + y / cell) % 2 == 0 {
            0.8
        } else {
            0.1
        }
    })
}

pub fn chebyshev(a: (f32, f32), b: (f32, f32)) -> f32 {
    (a.0 - b.0).abs().max((a.1 - b.1).abs())
}
