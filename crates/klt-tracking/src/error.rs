use klt_image::{ImageError, ImageSize};
use klt_imgproc::ImgprocError;

use crate::config::AffineConsistencyCheck;

/// Errors raised while selecting or tracking features.
///
/// Losing a feature is not an error, it is recorded on the feature itself.
#[derive(thiserror::Error, Debug, PartialEq)]
pub enum TrackingError {
    /// Error coming from the image containers.
    #[error(transparent)]
    Image(#[from] ImageError),

    /// Error coming from the kernels, filters or pyramids.
    #[error(transparent)]
    Imgproc(#[from] ImgprocError),

    /// The affine consistency check is configured but not implemented.
    #[error("Affine consistency check {0:?} is not supported")]
    UnsupportedAffineConsistencyCheck(AffineConsistencyCheck),

    /// The incoming frame does not match the cached previous frame.
    #[error("Size of incoming image ({current}) is different from size of previous image ({previous})")]
    FrameSizeMismatch {
        /// Size of the cached previous frame.
        previous: ImageSize,
        /// Size of the incoming frame.
        current: ImageSize,
    },

    /// A pyramid set was built with different levels or subsampling than the context expects.
    #[error("Pyramid set has {levels} levels subsampled by {subsampling}, expected {expected_levels} levels subsampled by {expected_subsampling}")]
    PyramidSetMismatch {
        /// Levels of the offending set.
        levels: usize,
        /// Subsampling of the offending set.
        subsampling: usize,
        /// Levels required by the context.
        expected_levels: usize,
        /// Subsampling required by the context.
        expected_subsampling: usize,
    },

    /// A status code that is neither tracked nor a known loss reason.
    #[error("Invalid feature status code {0}")]
    InvalidFeatureStatus(i32),

    /// Failed to encode a feature list.
    #[error("Failed to encode feature list: {0}")]
    FeatureListEncode(String),

    /// Failed to decode a feature list.
    #[error("Failed to decode feature list: {0}")]
    FeatureListDecode(String),
}
