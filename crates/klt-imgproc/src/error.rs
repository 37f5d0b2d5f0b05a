use klt_image::ImageError;
use thiserror::Error;

/// An error type for the image processing operations.
#[derive(Error, Debug, PartialEq)]
pub enum ImgprocError {
    /// Error coming from the underlying image containers.
    #[error(transparent)]
    Image(#[from] ImageError),

    /// The gaussian kernel for the given sigma does not fit in the maximum kernel width.
    #[error("Maximum kernel width {max_width} is too small for a sigma of {sigma}")]
    KernelTooWide {
        /// The sigma that was requested.
        sigma: f32,
        /// The maximum number of taps of a kernel.
        max_width: usize,
    },

    /// The sigma is not a finite positive number or yields a degenerate kernel.
    #[error("Invalid sigma for a gaussian kernel: {0}")]
    InvalidSigma(f32),

    /// The pyramid subsampling factor is not supported.
    #[error("Pyramid subsampling must be either 2, 4, 8, 16 or 32, got {0}")]
    InvalidSubsampling(usize),

    /// A pyramid needs at least one level.
    #[error("Pyramid must have at least one level, got {0}")]
    InvalidLevelCount(usize),
}
