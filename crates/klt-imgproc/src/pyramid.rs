use klt_image::{Image, ImageError, ImageSize};

use crate::error::ImgprocError;
use crate::filter::{gaussian_blur, spatial_gradient, KernelCache};
use crate::parallel::ExecutionStrategy;

/// The subsampling factors a pyramid can be built with.
pub const VALID_SUBSAMPLING: [usize; 5] = [2, 4, 8, 16, 32];

/// Check that `subsampling` is one of [`VALID_SUBSAMPLING`].
pub fn validate_subsampling(subsampling: usize) -> Result<(), ImgprocError> {
    if VALID_SUBSAMPLING.contains(&subsampling) {
        Ok(())
    } else {
        Err(ImgprocError::InvalidSubsampling(subsampling))
    }
}

/// The size of an image after subsampling by `factor`, rounding down.
pub fn subsampled_size(size: ImageSize, factor: usize) -> ImageSize {
    ImageSize {
        width: size.width / factor,
        height: size.height / factor,
    }
}

/// Keep one pixel out of `factor` in each direction.
///
/// Output pixel `(x, y)` takes the input pixel at
/// `(factor * x + factor / 2, factor * y + factor / 2)`.
///
/// # Arguments
///
/// * `src` - The source image, usually blurred beforehand.
/// * `dst` - The destination image of size `src / factor` rounded down.
/// * `factor` - The subsampling factor.
///
/// # Returns
///
/// * `Result<(), ImageError>` - Ok if successful, Err otherwise.
pub fn subsample(
    src: &Image<f32, 1>,
    dst: &mut Image<f32, 1>,
    factor: usize,
) -> Result<(), ImageError> {
    let expected = subsampled_size(src.size(), factor);
    if dst.size() != expected {
        return Err(ImageError::InvalidImageSize(
            expected.width,
            expected.height,
            dst.width(),
            dst.height(),
        ));
    }

    let half = factor / 2;
    let cols = dst.cols();
    dst.as_slice_mut()
        .chunks_exact_mut(cols.max(1))
        .enumerate()
        .for_each(|(y, row)| {
            row.iter_mut()
                .enumerate()
                .for_each(|(x, v)| *v = src.at(factor * x + half, factor * y + half));
        });

    Ok(())
}

/// How a [`Pyramid`] is built from an image.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PyramidParams {
    /// Number of levels, including the base.
    pub num_levels: usize,
    /// Size ratio between two consecutive levels.
    pub subsampling: usize,
    /// The blur sigma before subsampling is `subsampling * sigma_fact`.
    pub sigma_fact: f32,
    /// Blur applied to the input before it becomes level 0.
    pub smooth_sigma: Option<f32>,
}

/// A stack of progressively smaller images.
///
/// Level 0 has the size of the input and every following level is the
/// previous one blurred and subsampled by a constant factor.
#[derive(Clone, Debug, PartialEq)]
pub struct Pyramid {
    subsampling: usize,
    levels: Vec<Image<f32, 1>>,
}

impl Pyramid {
    /// Build a pyramid from an image.
    ///
    /// # Arguments
    ///
    /// * `image` - The base image.
    /// * `params` - Number of levels, subsampling and blur settings.
    /// * `cache` - Where the gaussian kernels are looked up.
    /// * `strategy` - How rows are scheduled.
    ///
    /// # Errors
    ///
    /// Fails on a subsampling factor outside [`VALID_SUBSAMPLING`], zero levels,
    /// or a blur sigma whose kernel does not fit.
    pub fn new(
        image: &Image<f32, 1>,
        params: &PyramidParams,
        cache: &mut KernelCache,
        strategy: ExecutionStrategy,
    ) -> Result<Self, ImgprocError> {
        validate_subsampling(params.subsampling)?;
        if params.num_levels == 0 {
            return Err(ImgprocError::InvalidLevelCount(params.num_levels));
        }

        let base = match params.smooth_sigma {
            Some(sigma) => {
                let mut smoothed = Image::from_size_val(image.size(), 0.0)?;
                gaussian_blur(image, &mut smoothed, sigma, cache, strategy)?;
                smoothed
            }
            None => image.clone(),
        };

        let sigma = params.subsampling as f32 * params.sigma_fact;
        let mut levels = Vec::with_capacity(params.num_levels);
        levels.push(base);

        for _ in 1..params.num_levels {
            let prev = &levels[levels.len() - 1];
            let mut blurred = Image::from_size_val(prev.size(), 0.0)?;
            gaussian_blur(prev, &mut blurred, sigma, cache, strategy)?;

            let mut next =
                Image::from_size_val(subsampled_size(prev.size(), params.subsampling), 0.0)?;
            subsample(&blurred, &mut next, params.subsampling)?;
            levels.push(next);
        }

        Ok(Self {
            subsampling: params.subsampling,
            levels,
        })
    }

    /// Compute the x and y gradient pyramids of this pyramid, level by level.
    pub fn gradients(
        &self,
        sigma: f32,
        cache: &mut KernelCache,
        strategy: ExecutionStrategy,
    ) -> Result<(Pyramid, Pyramid), ImgprocError> {
        let mut gradx = Vec::with_capacity(self.levels.len());
        let mut grady = Vec::with_capacity(self.levels.len());

        for level in &self.levels {
            let mut dx = Image::from_size_val(level.size(), 0.0)?;
            let mut dy = Image::from_size_val(level.size(), 0.0)?;
            spatial_gradient(level, &mut dx, &mut dy, sigma, cache, strategy)?;
            gradx.push(dx);
            grady.push(dy);
        }

        Ok((
            Pyramid {
                subsampling: self.subsampling,
                levels: gradx,
            },
            Pyramid {
                subsampling: self.subsampling,
                levels: grady,
            },
        ))
    }

    /// The size ratio between two consecutive levels.
    pub fn subsampling(&self) -> usize {
        self.subsampling
    }

    /// Number of levels.
    pub fn num_levels(&self) -> usize {
        self.levels.len()
    }

    /// Get a level, level 0 being the full resolution image.
    pub fn level(&self, index: usize) -> Option<&Image<f32, 1>> {
        self.levels.get(index)
    }

    /// All levels from finest to coarsest.
    pub fn levels(&self) -> &[Image<f32, 1>] {
        &self.levels
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn params(num_levels: usize, subsampling: usize) -> PyramidParams {
        PyramidParams {
            num_levels,
            subsampling,
            sigma_fact: 0.9,
            smooth_sigma: None,
        }
    }

    #[test]
    fn test_subsample() -> Result<(), ImageError> {
        let src = Image::<f32, 1>::from_size_fn([8, 4].into(), |x, y, _| (y * 8 + x) as f32)?;
        let mut dst = Image::from_size_val([4, 2].into(), 0.0)?;
        subsample(&src, &mut dst, 2)?;

        // offset of factor / 2 in both directions
        assert_eq!(dst.as_slice(), &[9.0, 11.0, 13.0, 15.0, 25.0, 27.0, 29.0, 31.0]);

        Ok(())
    }

    #[test]
    fn test_subsample_invalid_size() -> Result<(), ImageError> {
        let src = Image::<f32, 1>::from_size_val([9, 5].into(), 0.0)?;
        let mut dst = Image::from_size_val([5, 2].into(), 0.0)?;
        assert_eq!(
            subsample(&src, &mut dst, 2),
            Err(ImageError::InvalidImageSize(4, 2, 5, 2))
        );

        Ok(())
    }

    #[test]
    fn test_pyramid_dimensions() -> Result<(), ImgprocError> {
        let image = Image::<f32, 1>::from_size_val([320, 240].into(), 1.0)?;
        let mut cache = KernelCache::new();

        let pyramid = Pyramid::new(&image, &params(3, 4), &mut cache, ExecutionStrategy::Serial)?;
        let sizes: Vec<ImageSize> = pyramid.levels().iter().map(|l| l.size()).collect();
        let expected: Vec<ImageSize> = vec![[320, 240].into(), [80, 60].into(), [20, 15].into()];
        assert_eq!(sizes, expected);
        assert_eq!(pyramid.subsampling(), 4);
        assert_eq!(pyramid.num_levels(), 3);
        assert!(pyramid.level(3).is_none());

        Ok(())
    }

    #[test]
    fn test_pyramid_base_is_copy() -> Result<(), ImgprocError> {
        let image = Image::<f32, 1>::from_size_fn([16, 16].into(), |x, y, _| (x + y) as f32)?;
        let mut cache = KernelCache::new();

        let pyramid = Pyramid::new(&image, &params(2, 2), &mut cache, ExecutionStrategy::Serial)?;
        assert_eq!(pyramid.level(0), Some(&image));

        Ok(())
    }

    #[test]
    fn test_pyramid_constant_interior() -> Result<(), ImgprocError> {
        let image = Image::<f32, 1>::from_size_val([64, 64].into(), 10.0)?;
        let mut cache = KernelCache::new();

        let pyramid = Pyramid::new(&image, &params(2, 2), &mut cache, ExecutionStrategy::Serial)?;
        let coarse = pyramid.level(1).ok_or(ImgprocError::InvalidLevelCount(1))?;
        assert_relative_eq!(coarse.at(16, 16), 10.0, epsilon = 1e-3);

        Ok(())
    }

    #[test]
    fn test_pyramid_invalid_params() -> Result<(), ImgprocError> {
        let image = Image::<f32, 1>::from_size_val([32, 32].into(), 0.0)?;
        let mut cache = KernelCache::new();

        assert_eq!(
            Pyramid::new(&image, &params(2, 3), &mut cache, ExecutionStrategy::Serial),
            Err(ImgprocError::InvalidSubsampling(3))
        );
        assert_eq!(
            Pyramid::new(&image, &params(0, 2), &mut cache, ExecutionStrategy::Serial),
            Err(ImgprocError::InvalidLevelCount(0))
        );

        Ok(())
    }

    #[test]
    fn test_pyramid_gradients() -> Result<(), ImgprocError> {
        let image = Image::<f32, 1>::from_size_fn([64, 64].into(), |x, _, _| x as f32)?;
        let mut cache = KernelCache::new();

        let pyramid = Pyramid::new(&image, &params(2, 2), &mut cache, ExecutionStrategy::Serial)?;
        let (gradx, grady) = pyramid.gradients(1.0, &mut cache, ExecutionStrategy::Serial)?;

        assert_eq!(gradx.num_levels(), 2);
        assert_eq!(grady.level(1).map(|l| l.size()), Some(ImageSize::from([32, 32])));

        let gx = gradx.level(0).ok_or(ImgprocError::InvalidLevelCount(0))?;
        let gy = grady.level(0).ok_or(ImgprocError::InvalidLevelCount(0))?;
        assert_relative_eq!(gx.at(32, 32), 1.0, epsilon = 1e-3);
        assert_relative_eq!(gy.at(32, 32), 0.0, epsilon = 1e-3);

        Ok(())
    }
}
