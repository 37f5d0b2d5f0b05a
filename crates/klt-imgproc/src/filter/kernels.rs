use crate::error::ImgprocError;

/// Maximum number of taps of a gaussian or gaussian derivative kernel.
pub const MAX_KERNEL_WIDTH: usize = 71;

/// Taps whose magnitude relative to the kernel peak falls under this factor are dropped.
const TAIL_FACTOR: f32 = 0.01;

/// Two sigmas closer than this share the same kernels.
pub const SIGMA_TOLERANCE: f32 = 0.05;

/// Number of kernel pairs kept around by a [`KernelCache`].
const CACHE_CAPACITY: usize = 8;

/// A one dimensional convolution kernel with an odd number of taps.
///
/// Tap `i` holds the kernel value at offset `i - radius`.
#[derive(Clone, Debug, PartialEq)]
pub struct ConvolutionKernel {
    data: Vec<f32>,
}

impl ConvolutionKernel {
    /// The number of taps.
    pub fn width(&self) -> usize {
        self.data.len()
    }

    /// Half the width, rounded down.
    pub fn radius(&self) -> usize {
        self.data.len() / 2
    }

    /// The taps of the kernel.
    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }
}

/// A gaussian kernel and its derivative for a given sigma.
#[derive(Clone, Debug, PartialEq)]
pub struct GaussianKernels {
    /// The sigma the kernels were computed for.
    pub sigma: f32,
    /// The gaussian, normalized to sum to one.
    pub gauss: ConvolutionKernel,
    /// The gaussian derivative, normalized so that `-sum(i * d[i]) == 1`.
    pub gauss_deriv: ConvolutionKernel,
}

impl GaussianKernels {
    /// Compute the gaussian and gaussian derivative kernels.
    ///
    /// Both kernels start with [`MAX_KERNEL_WIDTH`] taps and are shrunk
    /// symmetrically while the outermost taps are negligible against the peak.
    ///
    /// # Arguments
    ///
    /// * `sigma` - The standard deviation of the gaussian.
    ///
    /// # Errors
    ///
    /// Returns [`ImgprocError::KernelTooWide`] when a kernel would need the full
    /// maximum width, and [`ImgprocError::InvalidSigma`] when sigma is not a
    /// finite positive number.
    pub fn new(sigma: f32) -> Result<Self, ImgprocError> {
        if !sigma.is_finite() || sigma <= 0.0 {
            return Err(ImgprocError::InvalidSigma(sigma));
        }

        let hw = (MAX_KERNEL_WIDTH / 2) as i32;

        let mut gauss = Vec::with_capacity(MAX_KERNEL_WIDTH);
        let mut deriv = Vec::with_capacity(MAX_KERNEL_WIDTH);
        for i in -hw..=hw {
            let g = (-((i * i) as f32) / (2.0 * sigma * sigma)).exp();
            gauss.push(g);
            deriv.push(-(i as f32) * g);
        }

        let max_gauss = 1.0;
        let max_deriv = sigma * (-0.5f32).exp();

        let gauss = truncate_tails(&gauss, max_gauss, sigma)?;
        let mut deriv = truncate_tails(&deriv, max_deriv, sigma)?;

        let sum: f32 = gauss.iter().sum();
        let gauss = gauss.iter().map(|v| v / sum).collect();

        let radius = (deriv.len() / 2) as i32;
        let den: f32 = -deriv
            .iter()
            .enumerate()
            .map(|(k, v)| (k as i32 - radius) as f32 * v)
            .sum::<f32>();
        deriv.iter_mut().for_each(|v| *v /= den);

        Ok(Self {
            sigma,
            gauss: ConvolutionKernel { data: gauss },
            gauss_deriv: ConvolutionKernel { data: deriv },
        })
    }
}

/// Drop taps from both ends while they are below [`TAIL_FACTOR`] of the peak.
fn truncate_tails(full: &[f32], peak: f32, sigma: f32) -> Result<Vec<f32>, ImgprocError> {
    let hw = full.len() / 2;

    let dropped = full
        .iter()
        .take(hw)
        .take_while(|v| (*v / peak).abs() < TAIL_FACTOR)
        .count();

    if dropped == 0 {
        return Err(ImgprocError::KernelTooWide {
            sigma,
            max_width: MAX_KERNEL_WIDTH,
        });
    }

    if dropped == hw && (full[hw] / peak).abs() < TAIL_FACTOR {
        return Err(ImgprocError::InvalidSigma(sigma));
    }

    Ok(full[dropped..full.len() - dropped].to_vec())
}

/// A small cache of gaussian kernels keyed by sigma.
///
/// A lookup is served from the cache when a stored sigma lies within
/// [`SIGMA_TOLERANCE`] of the requested one, otherwise the kernels are
/// computed and the least recently used entry is evicted if needed.
#[derive(Clone, Debug, Default)]
pub struct KernelCache {
    entries: Vec<GaussianKernels>,
}

impl KernelCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the kernels for `sigma`, computing them on a miss.
    pub fn get(&mut self, sigma: f32) -> Result<&GaussianKernels, ImgprocError> {
        let hit = self
            .entries
            .iter()
            .position(|k| (k.sigma - sigma).abs() <= SIGMA_TOLERANCE);

        match hit {
            Some(idx) => {
                let entry = self.entries.remove(idx);
                self.entries.push(entry);
            }
            None => {
                let kernels = GaussianKernels::new(sigma)?;
                log::trace!(
                    "computed kernels for sigma {sigma}: gauss width {}, derivative width {}",
                    kernels.gauss.width(),
                    kernels.gauss_deriv.width()
                );
                if self.entries.len() == CACHE_CAPACITY {
                    self.entries.remove(0);
                }
                self.entries.push(kernels);
            }
        }

        self.entries
            .last()
            .ok_or(ImgprocError::InvalidSigma(sigma))
    }

    /// Number of cached kernel pairs.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache holds no kernels.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn gaussian_kernels_normalized() -> Result<(), ImgprocError> {
        for sigma in [0.5, 0.7, 1.0, 1.5, 3.6] {
            let k = GaussianKernels::new(sigma)?;

            assert_eq!(k.gauss.width() % 2, 1);
            assert_eq!(k.gauss_deriv.width() % 2, 1);
            assert!(k.gauss.width() < MAX_KERNEL_WIDTH);

            let sum: f32 = k.gauss.as_slice().iter().sum();
            assert_relative_eq!(sum, 1.0, epsilon = 1e-5);

            let r = k.gauss_deriv.radius() as i32;
            let moment: f32 = k
                .gauss_deriv
                .as_slice()
                .iter()
                .enumerate()
                .map(|(i, v)| (i as i32 - r) as f32 * v)
                .sum();
            assert_relative_eq!(moment, -1.0, epsilon = 1e-5);
        }

        Ok(())
    }

    #[test]
    fn gaussian_kernels_symmetry() -> Result<(), ImgprocError> {
        let k = GaussianKernels::new(1.0)?;
        let g = k.gauss.as_slice();
        let d = k.gauss_deriv.as_slice();
        for i in 0..g.len() {
            assert_relative_eq!(g[i], g[g.len() - 1 - i]);
        }
        for i in 0..d.len() {
            assert_relative_eq!(d[i], -d[d.len() - 1 - i]);
        }
        assert_eq!(d[k.gauss_deriv.radius()], 0.0);

        Ok(())
    }

    #[test]
    fn gaussian_kernel_width_unit_sigma() -> Result<(), ImgprocError> {
        // exp(-9/2) = 0.011 survives, exp(-16/2) does not
        let k = GaussianKernels::new(1.0)?;
        assert_eq!(k.gauss.width(), 7);

        Ok(())
    }

    #[test]
    fn gaussian_kernels_too_wide() {
        assert_eq!(
            GaussianKernels::new(20.0),
            Err(ImgprocError::KernelTooWide {
                sigma: 20.0,
                max_width: MAX_KERNEL_WIDTH
            })
        );
    }

    #[test]
    fn gaussian_kernels_invalid_sigma() {
        assert_eq!(
            GaussianKernels::new(0.0),
            Err(ImgprocError::InvalidSigma(0.0))
        );
        assert!(GaussianKernels::new(f32::NAN).is_err());
    }

    #[test]
    fn kernel_cache_tolerance() -> Result<(), ImgprocError> {
        let mut cache = KernelCache::new();
        let width = cache.get(1.0)?.gauss.width();
        assert_eq!(cache.len(), 1);

        // within tolerance: served from the cache with the stored sigma
        assert_eq!(cache.get(1.04)?.sigma, 1.0);
        assert_eq!(cache.len(), 1);

        // outside tolerance: a new entry
        let other = cache.get(2.0)?;
        assert_eq!(other.sigma, 2.0);
        assert!(other.gauss.width() > width);
        assert_eq!(cache.len(), 2);

        Ok(())
    }

    #[test]
    fn kernel_cache_eviction() -> Result<(), ImgprocError> {
        let mut cache = KernelCache::new();
        for i in 0..(CACHE_CAPACITY + 3) {
            cache.get(0.5 + i as f32 * 0.25)?;
        }
        assert_eq!(cache.len(), CACHE_CAPACITY);

        Ok(())
    }
}
