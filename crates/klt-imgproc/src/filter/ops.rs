use klt_image::Image;

use super::kernels::KernelCache;
use super::separable_filter::separable_filter;
use crate::error::ImgprocError;
use crate::parallel::ExecutionStrategy;

/// Blur an image with a separable gaussian kernel.
///
/// # Arguments
///
/// * `src` - The source image.
/// * `dst` - The destination image, same size as the source.
/// * `sigma` - The standard deviation of the gaussian.
/// * `cache` - Where the kernels are looked up.
/// * `strategy` - How rows are scheduled.
///
/// # Returns
///
/// An error if the kernel cannot be built or the sizes differ.
pub fn gaussian_blur(
    src: &Image<f32, 1>,
    dst: &mut Image<f32, 1>,
    sigma: f32,
    cache: &mut KernelCache,
    strategy: ExecutionStrategy,
) -> Result<(), ImgprocError> {
    let kernels = cache.get(sigma)?;
    separable_filter(src, dst, &kernels.gauss, &kernels.gauss, strategy)?;
    Ok(())
}

/// Compute the horizontal and vertical gradients of an image.
///
/// The x gradient convolves the rows with the gaussian derivative and the
/// columns with the gaussian, the y gradient the other way round.
///
/// # Arguments
///
/// * `src` - The source image.
/// * `dx` - The horizontal gradient, same size as the source.
/// * `dy` - The vertical gradient, same size as the source.
/// * `sigma` - The standard deviation of the gaussian.
/// * `cache` - Where the kernels are looked up.
/// * `strategy` - How rows are scheduled.
pub fn spatial_gradient(
    src: &Image<f32, 1>,
    dx: &mut Image<f32, 1>,
    dy: &mut Image<f32, 1>,
    sigma: f32,
    cache: &mut KernelCache,
    strategy: ExecutionStrategy,
) -> Result<(), ImgprocError> {
    let kernels = cache.get(sigma)?;
    separable_filter(src, dx, &kernels.gauss_deriv, &kernels.gauss, strategy)?;
    separable_filter(src, dy, &kernels.gauss, &kernels.gauss_deriv, strategy)?;
    Ok(())
}
