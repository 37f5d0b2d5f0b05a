use klt_image::{Image, ImageSize};
use klt_imgproc::pyramid::{Pyramid, PyramidParams};

use crate::config::InputRange;
use crate::context::TrackingContext;
use crate::error::TrackingError;

/// Everything a context contributes to the pixels of a [`PyramidSet`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) struct PyramidSettings {
    pub params: PyramidParams,
    pub grad_sigma: f32,
    pub input_range: InputRange,
}

/// The image pyramid of a frame together with its gradient pyramids.
///
/// Built once per frame and never modified afterwards.
#[derive(Clone, Debug, PartialEq)]
pub struct PyramidSet {
    image: Pyramid,
    gradx: Pyramid,
    grady: Pyramid,
    // unknown for sets assembled from external pyramids
    settings: Option<PyramidSettings>,
}

impl PyramidSet {
    /// Build the pyramids of a frame with the settings of a context.
    ///
    /// The frame is scaled according to the configured input range and
    /// smoothed before becoming level 0.
    ///
    /// # Arguments
    ///
    /// * `image` - The frame.
    /// * `context` - Provides the pyramid settings and the kernel cache.
    pub fn new(image: &Image<f32, 1>, context: &mut TrackingContext) -> Result<Self, TrackingError> {
        let frame = context.prepare_frame(image)?;
        let settings = context.pyramid_settings();
        let strategy = context.execution();
        let kernels = context.kernels_mut();

        let pyramid = Pyramid::new(&frame, &settings.params, kernels, strategy)?;
        let (gradx, grady) = pyramid.gradients(settings.grad_sigma, kernels, strategy)?;

        Ok(Self {
            image: pyramid,
            gradx,
            grady,
            settings: Some(settings),
        })
    }

    /// Assemble a set from pyramids computed elsewhere.
    ///
    /// # Errors
    ///
    /// The three pyramids must share the subsampling, the number of levels and
    /// the size of every level.
    pub fn from_pyramids(
        image: Pyramid,
        gradx: Pyramid,
        grady: Pyramid,
    ) -> Result<Self, TrackingError> {
        for other in [&gradx, &grady] {
            if other.subsampling() != image.subsampling()
                || other.num_levels() != image.num_levels()
            {
                return Err(TrackingError::PyramidSetMismatch {
                    levels: other.num_levels(),
                    subsampling: other.subsampling(),
                    expected_levels: image.num_levels(),
                    expected_subsampling: image.subsampling(),
                });
            }
            for (a, b) in image.levels().iter().zip(other.levels()) {
                if a.size() != b.size() {
                    return Err(TrackingError::Image(klt_image::ImageError::InvalidImageSize(
                        a.width(),
                        a.height(),
                        b.width(),
                        b.height(),
                    )));
                }
            }
        }

        Ok(Self {
            image,
            gradx,
            grady,
            settings: None,
        })
    }

    /// Whether the set was built by [`PyramidSet::new`] with exactly these settings.
    pub(crate) fn built_with(&self, settings: &PyramidSettings) -> bool {
        self.settings.as_ref() == Some(settings)
    }

    /// Check that the set was built with the given pyramid layout.
    pub(crate) fn check_layout(&self, levels: usize, subsampling: usize) -> Result<(), TrackingError> {
        if self.num_levels() != levels || self.subsampling() != subsampling {
            return Err(TrackingError::PyramidSetMismatch {
                levels: self.num_levels(),
                subsampling: self.subsampling(),
                expected_levels: levels,
                expected_subsampling: subsampling,
            });
        }
        Ok(())
    }

    /// The image pyramid.
    pub fn image(&self) -> &Pyramid {
        &self.image
    }

    /// The horizontal gradient pyramid.
    pub fn gradx(&self) -> &Pyramid {
        &self.gradx
    }

    /// The vertical gradient pyramid.
    pub fn grady(&self) -> &Pyramid {
        &self.grady
    }

    /// Number of levels.
    pub fn num_levels(&self) -> usize {
        self.image.num_levels()
    }

    /// Ratio between two consecutive levels.
    pub fn subsampling(&self) -> usize {
        self.image.subsampling()
    }

    /// Size of the full resolution level.
    pub fn size(&self) -> ImageSize {
        self.image.levels()[0].size()
    }

    /// The image and gradients of one level.
    pub(crate) fn level(&self, index: usize) -> Option<LevelView<'_>> {
        Some(LevelView {
            image: self.image.level(index)?,
            gradx: self.gradx.level(index)?,
            grady: self.grady.level(index)?,
        })
    }
}

/// The three images of one pyramid level.
#[derive(Clone, Copy)]
pub(crate) struct LevelView<'a> {
    pub image: &'a Image<f32, 1>,
    pub gradx: &'a Image<f32, 1>,
    pub grady: &'a Image<f32, 1>,
}
