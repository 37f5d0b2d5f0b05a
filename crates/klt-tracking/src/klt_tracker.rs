use klt_image::Image;

use crate::config::TrackingConfig;
use crate::context::TrackingContext;
use crate::error::TrackingError;
use crate::feature::FeatureList;
use crate::pyramid_set::PyramidSet;
use crate::selector::{select_features, SelectionMode};
use crate::tracker;

/// A tracking session: a context and the list of features it follows.
///
/// # Example
///
/// ```
/// use klt_image::Image;
/// use klt_tracking::KltTracker;
///
/// let frame = Image::<f32, 1>::from_size_fn([96, 96].into(), |x, y, _| {
///     if (x / 8 + y / 8) % 2 == 0 { 0.8 } else { 0.1 }
/// })
/// .unwrap();
///
/// let mut tracker = KltTracker::new(20).unwrap();
/// let selected = tracker.select_good_features(&frame).unwrap();
/// let tracked = tracker.track_features(&frame, &frame).unwrap();
/// assert_eq!(selected, tracked);
/// ```
#[derive(Debug)]
pub struct KltTracker {
    context: TrackingContext,
    features: FeatureList,
}

impl KltTracker {
    /// Create a session following up to `n_features` features with the default configuration.
    pub fn new(n_features: usize) -> Result<Self, TrackingError> {
        Ok(Self::with_context(
            TrackingContext::new(TrackingConfig::default())?,
            n_features,
        ))
    }

    /// Create a session from an existing context.
    pub fn with_context(context: TrackingContext, n_features: usize) -> Self {
        Self {
            context,
            features: FeatureList::new(n_features),
        }
    }

    /// Fill every slot with the best features of the image.
    ///
    /// # Returns
    ///
    /// The number of features selected.
    pub fn select_good_features(&mut self, image: &Image<f32, 1>) -> Result<usize, TrackingError> {
        select_features(
            &mut self.context,
            image,
            &mut self.features,
            SelectionMode::SelectAll,
        )
    }

    /// Refill the lost slots with new features away from the tracked ones.
    ///
    /// # Returns
    ///
    /// The number of features added, 0 without touching anything if no slot is lost.
    pub fn replace_lost_features(&mut self, image: &Image<f32, 1>) -> Result<usize, TrackingError> {
        let lost = self.features.count_lost();
        if lost == 0 {
            log::debug!("(replace_lost_features) no lost feature to replace");
            return Ok(0);
        }

        let replaced = select_features(
            &mut self.context,
            image,
            &mut self.features,
            SelectionMode::ReplaceLost,
        )?;
        log::debug!("(replace_lost_features) replaced {replaced} of {lost} lost features");

        Ok(replaced)
    }

    /// Track the features from `img1` to `img2`.
    ///
    /// # Returns
    ///
    /// The number of features still tracked.
    pub fn track_features(
        &mut self,
        img1: &Image<f32, 1>,
        img2: &Image<f32, 1>,
    ) -> Result<usize, TrackingError> {
        tracker::track_features(&mut self.context, img1, img2, &mut self.features)
    }

    /// Track the features between two pyramid sets built with [`KltTracker::build_pyramid_set`].
    pub fn track_features_with_pyramids(
        &mut self,
        pyramid1: &PyramidSet,
        pyramid2: &PyramidSet,
    ) -> Result<usize, TrackingError> {
        tracker::track_features_with_pyramids(&self.context, pyramid1, pyramid2, &mut self.features)
    }

    /// Build the pyramids of a frame with the settings of this session.
    pub fn build_pyramid_set(&mut self, image: &Image<f32, 1>) -> Result<PyramidSet, TrackingError> {
        PyramidSet::new(image, &mut self.context)
    }

    /// The tracking context.
    pub fn context(&self) -> &TrackingContext {
        &self.context
    }

    /// The tracking context, for changing parameters between frames.
    pub fn context_mut(&mut self) -> &mut TrackingContext {
        &mut self.context
    }

    /// The features.
    pub fn features(&self) -> &FeatureList {
        &self.features
    }

    /// The features, for seeding or editing slots.
    pub fn features_mut(&mut self) -> &mut FeatureList {
        &mut self.features
    }

    /// Consume the session and return the features.
    pub fn into_features(self) -> FeatureList {
        self.features
    }
}
