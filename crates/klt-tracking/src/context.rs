use std::sync::Arc;

use klt_image::Image;
use klt_imgproc::filter::KernelCache;
use klt_imgproc::parallel::ExecutionStrategy;
use klt_imgproc::pyramid::PyramidParams;
use klt_imgproc::ImgprocError;

use crate::config::{InputRange, TrackingConfig};
use crate::error::TrackingError;
use crate::pyramid_set::{PyramidSet, PyramidSettings};
use crate::target_area::TargetArea;

/// Subsampling used before the first derivation from the search range.
const INITIAL_SUBSAMPLING: usize = 2;

/// The tracking parameters together with the values derived from them.
///
/// Derived values (pyramid depth, subsampling and border) are recomputed by
/// every setter that can change them. The context also owns the gaussian
/// kernel cache and, in sequential mode, the pyramid set of the last frame.
#[derive(Clone)]
pub struct TrackingContext {
    config: TrackingConfig,
    n_pyramid_levels: usize,
    subsampling: usize,
    borderx: usize,
    bordery: usize,
    kernels: KernelCache,
    previous: Option<PyramidSet>,
    target_area: Option<Arc<dyn TargetArea>>,
}

impl TrackingContext {
    /// Create a context, correcting the window and deriving the pyramid and border.
    ///
    /// # Arguments
    ///
    /// * `config` - The tracking parameters.
    ///
    /// # Errors
    ///
    /// Fails when one of the smoothing kernels does not fit.
    pub fn new(config: TrackingConfig) -> Result<Self, TrackingError> {
        let mut context = Self {
            config,
            n_pyramid_levels: 1,
            subsampling: INITIAL_SUBSAMPLING,
            borderx: 0,
            bordery: 0,
            kernels: KernelCache::new(),
            previous: None,
            target_area: None,
        };
        context.derive_all()?;
        Ok(context)
    }

    fn derive_all(&mut self) -> Result<(), TrackingError> {
        self.config.window_width = corrected_window_dimension(self.config.window_width, "width");
        self.config.window_height =
            corrected_window_dimension(self.config.window_height, "height");
        self.derive_pyramid();
        self.update_border()
    }

    /// Pick the pyramid depth and subsampling able to cover the search range.
    fn derive_pyramid(&mut self) {
        let window_halfwidth =
            self.config.window_width.min(self.config.window_height) as f32 / 2.0;
        let ratio = self.config.search_range as f32 / window_halfwidth;

        let (levels, subsampling) = if ratio < 1.0 {
            (1, self.subsampling)
        } else if ratio <= 3.0 {
            (2, 2)
        } else if ratio <= 5.0 {
            (2, 4)
        } else if ratio <= 9.0 {
            (2, 8)
        } else {
            // a pyramid of subsampling 8 covers 7 * ratio + 1 pixels with log8 levels
            let val = (7.0 * ratio + 1.0).ln() / 8.0f32.ln();
            ((val + 0.99) as usize, 8)
        };

        self.n_pyramid_levels = levels;
        self.subsampling = subsampling;
    }

    /// Recompute the margin where no feature can be selected or tracked.
    ///
    /// The margin accounts for the pixels invalidated by smoothing and by every
    /// pyramid blur, expressed in full resolution pixels, plus half a window.
    fn update_border(&mut self) -> Result<(), TrackingError> {
        let window_hw = self.config.window_width.max(self.config.window_height) / 2;
        let levels = self.n_pyramid_levels;
        let subsampling = self.subsampling;

        let smooth_sigma = self.smooth_sigma();
        let mut n = self.kernels.get(smooth_sigma)?.gauss.width() / 2;

        if levels > 1 {
            if subsampling == 0 {
                return Err(ImgprocError::InvalidSubsampling(subsampling).into());
            }
            let pyramid_sigma = self.pyramid_sigma();
            let pyramid_hw = self.kernels.get(pyramid_sigma)?.gauss.width() / 2;
            for _ in 1..levels {
                n = ((n + pyramid_hw) as f32 / subsampling as f32 + 0.99) as usize;
            }
        }

        let border = (n + window_hw) * subsampling.pow((levels - 1) as u32);
        self.borderx = border;
        self.bordery = border;

        Ok(())
    }

    /// Replace the whole configuration and re-derive everything from it.
    pub fn set_config(&mut self, config: TrackingConfig) -> Result<(), TrackingError> {
        if !config.sequential_mode {
            self.previous = None;
        }
        self.config = config;
        self.derive_all()
    }

    /// Set the tracking window size, correcting even or too small values.
    pub fn set_window_size(&mut self, width: usize, height: usize) -> Result<(), TrackingError> {
        self.config.window_width = corrected_window_dimension(width, "width");
        self.config.window_height = corrected_window_dimension(height, "height");
        self.update_border()
    }

    /// Derive the pyramid depth and subsampling from a new search range.
    pub fn change_pyramid(&mut self, search_range: usize) -> Result<(), TrackingError> {
        self.config.search_range = search_range;
        self.derive_pyramid();
        self.update_border()
    }

    /// Set the number of pyramid levels directly.
    pub fn set_n_pyramid_levels(&mut self, levels: usize) -> Result<(), TrackingError> {
        if levels == 0 {
            return Err(ImgprocError::InvalidLevelCount(levels).into());
        }
        self.n_pyramid_levels = levels;
        self.update_border()
    }

    /// Set the subsampling directly.
    ///
    /// The factor is only checked against the supported values when a
    /// pyramid is built.
    pub fn set_subsampling(&mut self, subsampling: usize) -> Result<(), TrackingError> {
        self.subsampling = subsampling;
        self.update_border()
    }

    /// Set the smoothing factor applied to the window size.
    pub fn set_smooth_sigma_fact(&mut self, fact: f32) -> Result<(), TrackingError> {
        self.config.smooth_sigma_fact = fact;
        self.update_border()
    }

    /// Set the pyramid blur factor applied to the subsampling.
    pub fn set_pyramid_sigma_fact(&mut self, fact: f32) -> Result<(), TrackingError> {
        self.config.pyramid_sigma_fact = fact;
        self.update_border()
    }

    /// Set the minimum distance between selected features.
    pub fn set_mindist(&mut self, mindist: i32) {
        self.config.mindist = mindist;
    }

    /// Set the smallest eigenvalue a selected feature must reach.
    pub fn set_min_eigenvalue(&mut self, min_eigenvalue: i32) {
        self.config.min_eigenvalue = min_eigenvalue;
    }

    /// Set the determinant below which a feature is lost as SMALL_DET.
    pub fn set_min_determinant(&mut self, min_determinant: f32) {
        self.config.min_determinant = min_determinant;
    }

    /// Set the displacement under which the iterative solver stops.
    pub fn set_min_displacement(&mut self, min_displacement: f32) {
        self.config.min_displacement = min_displacement;
    }

    /// Set the iteration budget of each pyramid level.
    pub fn set_max_iterations(&mut self, max_iterations: usize) {
        self.config.max_iterations = max_iterations;
    }

    /// Set the mean absolute residue above which a feature is lost.
    pub fn set_max_residue(&mut self, max_residue: f32) {
        self.config.max_residue = max_residue;
    }

    /// Set the factor applied to every solver step.
    pub fn set_step_factor(&mut self, step_factor: f32) {
        self.config.step_factor = step_factor;
    }

    /// Set the sigma of the gradient kernels.
    pub fn set_grad_sigma(&mut self, grad_sigma: f32) {
        self.config.grad_sigma = grad_sigma;
    }

    /// Set how many pixels are skipped between two selection candidates.
    pub fn set_n_skipped_pixels(&mut self, n_skipped_pixels: usize) {
        self.config.n_skipped_pixels = n_skipped_pixels;
    }

    /// Compensate gain and bias changes between frames.
    pub fn set_lighting_insensitive(&mut self, enabled: bool) {
        self.config.lighting_insensitive = enabled;
    }

    /// Set how rows and features are scheduled.
    pub fn set_execution(&mut self, execution: ExecutionStrategy) {
        self.config.execution = execution;
    }

    /// Enable or disable sequential mode, disabling drops the cached pyramid set.
    pub fn set_sequential_mode(&mut self, enabled: bool) {
        if enabled {
            self.config.sequential_mode = true;
        } else {
            self.stop_sequential_mode();
        }
    }

    /// Leave sequential mode and drop the cached pyramid set.
    pub fn stop_sequential_mode(&mut self) {
        self.config.sequential_mode = false;
        self.previous = None;
    }

    /// Restrict feature selection to a region of the image.
    pub fn set_target_area(&mut self, area: impl TargetArea + 'static) {
        self.target_area = Some(Arc::new(area));
    }

    /// Allow features to be selected anywhere in the image.
    pub fn clear_target_area(&mut self) {
        self.target_area = None;
    }

    /// The current configuration, with the corrected window.
    pub fn config(&self) -> &TrackingConfig {
        &self.config
    }

    /// Width of the tracking window, always odd and at least 3.
    pub fn window_width(&self) -> usize {
        self.config.window_width
    }

    /// Height of the tracking window, always odd and at least 3.
    pub fn window_height(&self) -> usize {
        self.config.window_height
    }

    /// Number of pyramid levels.
    pub fn n_pyramid_levels(&self) -> usize {
        self.n_pyramid_levels
    }

    /// Ratio between two consecutive pyramid levels.
    pub fn subsampling(&self) -> usize {
        self.subsampling
    }

    /// Horizontal margin in pixels.
    pub fn borderx(&self) -> usize {
        self.borderx
    }

    /// Vertical margin in pixels.
    pub fn bordery(&self) -> usize {
        self.bordery
    }

    /// Sigma used to smooth the frames.
    pub fn smooth_sigma(&self) -> f32 {
        self.config.smooth_sigma_fact
            * self.config.window_width.max(self.config.window_height) as f32
    }

    /// Sigma used to blur a level before subsampling it.
    pub fn pyramid_sigma(&self) -> f32 {
        self.config.pyramid_sigma_fact * self.subsampling as f32
    }

    /// Whether sequential mode is enabled.
    pub fn sequential_mode(&self) -> bool {
        self.config.sequential_mode
    }

    /// How rows and features are scheduled.
    pub fn execution(&self) -> ExecutionStrategy {
        self.config.execution
    }

    /// The pyramid set cached from the last tracked frame.
    pub fn previous(&self) -> Option<&PyramidSet> {
        self.previous.as_ref()
    }

    /// The region features are selected in, if any.
    pub fn target_area(&self) -> Option<&dyn TargetArea> {
        self.target_area.as_deref()
    }

    pub(crate) fn kernels_mut(&mut self) -> &mut KernelCache {
        &mut self.kernels
    }

    pub(crate) fn take_previous(&mut self) -> Option<PyramidSet> {
        self.previous.take()
    }

    pub(crate) fn store_previous(&mut self, set: PyramidSet) {
        self.previous = Some(set);
    }

    pub(crate) fn pyramid_settings(&self) -> PyramidSettings {
        PyramidSettings {
            params: self.pyramid_params(),
            grad_sigma: self.config.grad_sigma,
            input_range: self.config.input_range,
        }
    }

    pub(crate) fn pyramid_params(&self) -> PyramidParams {
        PyramidParams {
            num_levels: self.n_pyramid_levels,
            subsampling: self.subsampling,
            sigma_fact: self.config.pyramid_sigma_fact,
            smooth_sigma: Some(self.smooth_sigma()),
        }
    }

    /// Bring a frame to the `[0, 255]` range the thresholds are expressed in.
    pub(crate) fn prepare_frame(&self, image: &Image<f32, 1>) -> Result<Image<f32, 1>, TrackingError> {
        match self.config.input_range {
            InputRange::Normalized => {
                let scaled = image.as_slice().iter().map(|v| v * 255.0).collect();
                Ok(Image::new(image.size(), scaled)?)
            }
            InputRange::Raw => Ok(image.clone()),
        }
    }
}

/// Round a window dimension up to the nearest odd value of at least 3.
fn corrected_window_dimension(value: usize, name: &str) -> usize {
    if value < 3 {
        log::warn!("Tracking context's window {name} must be at least three, changing to 3");
        3
    } else if value % 2 == 0 {
        log::warn!(
            "Tracking context's window {name} must be odd, changing to {}",
            value + 1
        );
        value + 1
    } else {
        value
    }
}

impl std::fmt::Debug for TrackingContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrackingContext")
            .field("config", &self.config)
            .field("n_pyramid_levels", &self.n_pyramid_levels)
            .field("subsampling", &self.subsampling)
            .field("borderx", &self.borderx)
            .field("bordery", &self.bordery)
            .field("has_previous", &self.previous.is_some())
            .field("has_target_area", &self.target_area.is_some())
            .finish_non_exhaustive()
    }
}

impl std::fmt::Display for TrackingContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let c = &self.config;
        writeln!(f, "Tracking Context:")?;
        writeln!(f, "  mindist = {}", c.mindist)?;
        writeln!(f, "  window_width = {}", c.window_width)?;
        writeln!(f, "  window_height = {}", c.window_height)?;
        writeln!(f, "  sequential_mode = {}", c.sequential_mode)?;
        writeln!(f, "  smooth_before_selecting = {}", c.smooth_before_selecting)?;
        writeln!(f, "  lighting_insensitive = {}", c.lighting_insensitive)?;
        writeln!(f, "  min_eigenvalue = {}", c.min_eigenvalue)?;
        writeln!(f, "  min_determinant = {}", c.min_determinant)?;
        writeln!(f, "  min_displacement = {}", c.min_displacement)?;
        writeln!(f, "  max_iterations = {}", c.max_iterations)?;
        writeln!(f, "  max_residue = {}", c.max_residue)?;
        writeln!(f, "  grad_sigma = {}", c.grad_sigma)?;
        writeln!(f, "  smooth_sigma_fact = {}", c.smooth_sigma_fact)?;
        writeln!(f, "  pyramid_sigma_fact = {}", c.pyramid_sigma_fact)?;
        writeln!(f, "  step_factor = {}", c.step_factor)?;
        writeln!(f, "  search_range = {}", c.search_range)?;
        writeln!(f, "  n_skipped_pixels = {}", c.n_skipped_pixels)?;
        writeln!(f, "  affine_consistency_check = {:?}", c.affine_consistency_check)?;
        writeln!(f, "  input_range = {:?}", c.input_range)?;
        writeln!(f, "  execution = {:?}", c.execution)?;
        writeln!(f, "  borderx = {}", self.borderx)?;
        writeln!(f, "  bordery = {}", self.bordery)?;
        writeln!(f, "  n_pyramid_levels = {}", self.n_pyramid_levels)?;
        writeln!(f, "  subsampling = {}", self.subsampling)?;
        write!(
            f,
            "  previous pyramid = {}",
            if self.previous.is_some() { "cached" } else { "none" }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context_with(f: impl FnOnce(&mut TrackingConfig)) -> Result<TrackingContext, TrackingError> {
        let mut config = TrackingConfig::default();
        f(&mut config);
        TrackingContext::new(config)
    }

    #[test]
    fn default_derivation() -> Result<(), TrackingError> {
        let context = TrackingContext::new(TrackingConfig::default())?;
        assert_eq!(context.n_pyramid_levels(), 2);
        assert_eq!(context.subsampling(), 4);
        assert_eq!(context.borderx(), 24);
        assert_eq!(context.bordery(), 24);

        Ok(())
    }

    #[test]
    fn window_is_corrected() -> Result<(), TrackingError> {
        for (requested, corrected) in [(0, 3), (1, 3), (2, 3), (3, 3), (4, 5), (8, 9), (11, 11)] {
            let context = context_with(|c| {
                c.window_width = requested;
                c.window_height = requested;
            })?;
            assert_eq!(context.window_width(), corrected);
            assert_eq!(context.window_height(), corrected);
        }

        let mut context = TrackingContext::new(TrackingConfig::default())?;
        context.set_window_size(6, 10)?;
        assert_eq!((context.window_width(), context.window_height()), (7, 11));

        Ok(())
    }

    #[test]
    fn pyramid_from_search_range() -> Result<(), TrackingError> {
        // window half width is 3.5 with the default 7x7 window
        let mut context = TrackingContext::new(TrackingConfig::default())?;
        for (range, levels, subsampling) in [
            (3, 1, 4),
            (10, 2, 2),
            (15, 2, 4),
            (30, 2, 8),
            (31, 2, 8),
            (40, 3, 8),
            (64, 3, 8),
        ] {
            context.change_pyramid(range)?;
            assert_eq!(context.n_pyramid_levels(), levels, "search range {range}");
            assert_eq!(context.subsampling(), subsampling, "search range {range}");
        }

        Ok(())
    }

    #[test]
    fn single_level_border() -> Result<(), TrackingError> {
        let context = context_with(|c| c.search_range = 1)?;
        assert_eq!(context.n_pyramid_levels(), 1);
        assert_eq!(context.subsampling(), INITIAL_SUBSAMPLING);
        // smoothing half width 2 plus half a window
        assert_eq!(context.borderx(), 5);

        Ok(())
    }

    #[test]
    fn invalid_setters() -> Result<(), TrackingError> {
        let mut context = TrackingContext::new(TrackingConfig::default())?;
        assert_eq!(
            context.set_n_pyramid_levels(0),
            Err(TrackingError::Imgproc(ImgprocError::InvalidLevelCount(0)))
        );
        assert_eq!(
            context.set_subsampling(0),
            Err(TrackingError::Imgproc(ImgprocError::InvalidSubsampling(0)))
        );

        // unsupported factors are accepted here and rejected when building a pyramid
        context.set_subsampling(3)?;
        assert_eq!(context.subsampling(), 3);

        Ok(())
    }

    #[test]
    fn stop_sequential_mode() -> Result<(), TrackingError> {
        let mut context = context_with(|c| c.sequential_mode = true)?;
        assert!(context.sequential_mode());
        context.stop_sequential_mode();
        assert!(!context.sequential_mode());
        assert!(context.previous().is_none());

        Ok(())
    }

    #[test]
    fn display_dump() -> Result<(), TrackingError> {
        let context = TrackingContext::new(TrackingConfig::default())?;
        let dump = context.to_string();
        assert!(dump.starts_with("Tracking Context:"));
        assert!(dump.contains("borderx = 24"));
        assert!(dump.contains("previous pyramid = none"));

        Ok(())
    }

    #[test]
    fn normalized_frames_are_scaled() -> Result<(), TrackingError> {
        let context = TrackingContext::new(TrackingConfig::default())?;
        let image = Image::<f32, 1>::from_size_val([2, 2].into(), 0.5)?;
        let frame = context.prepare_frame(&image)?;
        assert_eq!(frame.as_slice(), &[127.5; 4]);

        let raw = context_with(|c| c.input_range = InputRange::Raw)?;
        assert_eq!(raw.prepare_frame(&image)?, image);

        Ok(())
    }

    #[test]
    fn direct_setters_keep_derived_values() -> Result<(), TrackingError> {
        let mut context = TrackingContext::new(TrackingConfig::default())?;
        context.set_mindist(4);
        context.set_max_residue(2.5);
        context.set_max_iterations(20);
        context.set_lighting_insensitive(true);
        context.set_execution(ExecutionStrategy::Parallel);

        assert_eq!(context.config().mindist, 4);
        assert_eq!(context.config().max_residue, 2.5);
        assert_eq!(context.config().max_iterations, 20);
        assert!(context.config().lighting_insensitive);
        assert_eq!(context.execution(), ExecutionStrategy::Parallel);
        assert_eq!(context.borderx(), 24);
        assert_eq!(context.n_pyramid_levels(), 2);

        Ok(())
    }
}
