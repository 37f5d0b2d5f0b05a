use klt_image::{Image, ImageError};

use super::kernels::ConvolutionKernel;
use crate::parallel::ExecutionStrategy;

fn check_same_size(src: &Image<f32, 1>, dst: &Image<f32, 1>) -> Result<(), ImageError> {
    if src.size() != dst.size() {
        return Err(ImageError::InvalidImageSize(
            src.cols(),
            src.rows(),
            dst.cols(),
            dst.rows(),
        ));
    }
    Ok(())
}

/// Convolve every row of an image with a kernel.
///
/// The leftmost and rightmost `radius` columns are set to zero. The kernel is
/// applied as a true convolution, i.e. reversed.
///
/// # Arguments
///
/// * `src` - The source image.
/// * `dst` - The destination image, same size as the source.
/// * `kernel` - The kernel to apply.
/// * `strategy` - How rows are scheduled.
pub fn convolve_horizontal(
    src: &Image<f32, 1>,
    dst: &mut Image<f32, 1>,
    kernel: &ConvolutionKernel,
    strategy: ExecutionStrategy,
) -> Result<(), ImageError> {
    check_same_size(src, dst)?;

    let cols = src.cols();
    let radius = kernel.radius();
    let taps = kernel.as_slice();

    strategy.for_each_row(dst.as_slice_mut(), cols, |y, dst_row| {
        let src_row = src.row(y);
        dst_row.fill(0.0);
        for x in radius..cols.saturating_sub(radius) {
            let window = &src_row[x - radius..=x + radius];
            dst_row[x] = window
                .iter()
                .zip(taps.iter().rev())
                .fold(0.0, |acc, (p, k)| acc + p * k);
        }
    });

    Ok(())
}

/// Convolve every column of an image with a kernel.
///
/// The topmost and bottommost `radius` rows are set to zero. The kernel is
/// applied as a true convolution, i.e. reversed.
///
/// # Arguments
///
/// * `src` - The source image.
/// * `dst` - The destination image, same size as the source.
/// * `kernel` - The kernel to apply.
/// * `strategy` - How rows are scheduled.
pub fn convolve_vertical(
    src: &Image<f32, 1>,
    dst: &mut Image<f32, 1>,
    kernel: &ConvolutionKernel,
    strategy: ExecutionStrategy,
) -> Result<(), ImageError> {
    check_same_size(src, dst)?;

    let cols = src.cols();
    let rows = src.rows();
    let radius = kernel.radius();
    let taps = kernel.as_slice();

    strategy.for_each_row(dst.as_slice_mut(), cols, |y, dst_row| {
        if y < radius || y + radius >= rows {
            dst_row.fill(0.0);
            return;
        }
        for (x, out) in dst_row.iter_mut().enumerate() {
            *out = taps
                .iter()
                .rev()
                .enumerate()
                .fold(0.0, |acc, (j, k)| acc + src.at(x, y - radius + j) * k);
        }
    });

    Ok(())
}

/// Apply a separable filter: `kernel_x` along the rows, then `kernel_y` along the columns.
///
/// # Arguments
///
/// * `src` - The source image.
/// * `dst` - The destination image, same size as the source.
/// * `kernel_x` - The horizontal kernel.
/// * `kernel_y` - The vertical kernel.
/// * `strategy` - How rows are scheduled.
pub fn separable_filter(
    src: &Image<f32, 1>,
    dst: &mut Image<f32, 1>,
    kernel_x: &ConvolutionKernel,
    kernel_y: &ConvolutionKernel,
    strategy: ExecutionStrategy,
) -> Result<(), ImageError> {
    check_same_size(src, dst)?;

    let mut tmp = Image::from_size_val(src.size(), 0.0f32)?;
    convolve_horizontal(src, &mut tmp, kernel_x, strategy)?;
    convolve_vertical(&tmp, dst, kernel_y, strategy)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::kernels::GaussianKernels;
    use approx::assert_relative_eq;

    #[test]
    fn convolve_horizontal_zero_border() -> Result<(), Box<dyn std::error::Error>> {
        let src = Image::<f32, 1>::from_size_val([9, 3].into(), 5.0)?;
        let mut dst = Image::from_size_val(src.size(), -1.0)?;
        let k = GaussianKernels::new(1.0)?;

        convolve_horizontal(&src, &mut dst, &k.gauss, ExecutionStrategy::Serial)?;

        let r = k.gauss.radius();
        for y in 0..3 {
            for x in 0..9 {
                if x < r || x >= 9 - r {
                    assert_eq!(dst.at(x, y), 0.0);
                } else {
                    assert_relative_eq!(dst.at(x, y), 5.0, epsilon = 1e-4);
                }
            }
        }

        Ok(())
    }

    #[test]
    fn convolve_vertical_reverses_kernel() -> Result<(), Box<dyn std::error::Error>> {
        // a ramp along y has unit slope under the derivative kernel
        let src = Image::<f32, 1>::from_size_fn([3, 15].into(), |_, y, _| y as f32)?;
        let mut dst = Image::from_size_val(src.size(), 0.0)?;
        let k = GaussianKernels::new(1.0)?;

        convolve_vertical(&src, &mut dst, &k.gauss_deriv, ExecutionStrategy::Serial)?;

        let r = k.gauss_deriv.radius();
        assert_eq!(dst.at(1, r - 1), 0.0);
        assert_relative_eq!(dst.at(1, 7), 1.0, epsilon = 1e-4);
        assert_eq!(dst.at(1, 15 - r), 0.0);

        Ok(())
    }

    #[test]
    fn kernel_wider_than_image() -> Result<(), Box<dyn std::error::Error>> {
        let src = Image::<f32, 1>::from_size_val([4, 4].into(), 1.0)?;
        let mut dst = Image::from_size_val(src.size(), 1.0)?;
        let k = GaussianKernels::new(2.0)?;

        separable_filter(&src, &mut dst, &k.gauss, &k.gauss, ExecutionStrategy::Serial)?;
        assert!(dst.as_slice().iter().all(|v| *v == 0.0));

        Ok(())
    }

    #[test]
    fn separable_filter_strategies_agree() -> Result<(), Box<dyn std::error::Error>> {
        let src =
            Image::<f32, 1>::from_size_fn([32, 24].into(), |x, y, _| ((x * 7 + y * 13) % 17) as f32)?;
        let k = GaussianKernels::new(1.0)?;

        let mut serial = Image::from_size_val(src.size(), 0.0)?;
        let mut parallel = Image::from_size_val(src.size(), 0.0)?;
        separable_filter(&src, &mut serial, &k.gauss_deriv, &k.gauss, ExecutionStrategy::Serial)?;
        separable_filter(
            &src,
            &mut parallel,
            &k.gauss_deriv,
            &k.gauss,
            ExecutionStrategy::Parallel,
        )?;

        assert_eq!(serial, parallel);

        Ok(())
    }

    #[test]
    fn separable_filter_size_mismatch() -> Result<(), Box<dyn std::error::Error>> {
        let src = Image::<f32, 1>::from_size_val([4, 4].into(), 1.0)?;
        let mut dst = Image::from_size_val([4, 5].into(), 0.0)?;
        let k = GaussianKernels::new(1.0)?;

        assert_eq!(
            separable_filter(&src, &mut dst, &k.gauss, &k.gauss, ExecutionStrategy::Serial),
            Err(ImageError::InvalidImageSize(4, 4, 4, 5))
        );

        Ok(())
    }
}
