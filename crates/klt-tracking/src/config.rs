use klt_imgproc::parallel::ExecutionStrategy;
use serde::{Deserialize, Serialize};

/// Affine consistency check between the first and the current appearance of a feature.
///
/// Only [`AffineConsistencyCheck::Disabled`] is supported, tracking fails with
/// [`crate::TrackingError::UnsupportedAffineConsistencyCheck`] otherwise.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AffineConsistencyCheck {
    /// No check.
    #[default]
    Disabled,
    /// Compute the affine residue without rejecting features.
    ResidueOnly,
    /// Reject features whose affine residue is too large.
    Affine,
}

/// The intensity range of the frames handed to the tracker.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputRange {
    /// Intensities in `[0, 1]`, scaled by 255 before processing.
    #[default]
    Normalized,
    /// Intensities already in `[0, 255]`.
    Raw,
}

/// Every tunable of the tracker.
///
/// Missing fields take their default when deserialized, so a partial JSON
/// document is a valid configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackingConfig {
    /// Minimum Chebyshev distance between two selected features.
    pub mindist: i32,
    /// Width of the tracking window, corrected to an odd value of at least 3.
    pub window_width: usize,
    /// Height of the tracking window, corrected to an odd value of at least 3.
    pub window_height: usize,
    /// Minimum trackability of a selected feature, never less than 1.
    pub min_eigenvalue: i32,
    /// Below this determinant the tracking equations are considered singular.
    pub min_determinant: f32,
    /// Iterations stop once both displacement components are below this value.
    pub min_displacement: f32,
    /// Maximum number of iterations per pyramid level.
    pub max_iterations: usize,
    /// Maximum mean absolute intensity difference of a tracked window.
    pub max_residue: f32,
    /// Sigma of the gradient kernels.
    pub grad_sigma: f32,
    /// The smoothing sigma is this factor times the largest window dimension.
    pub smooth_sigma_fact: f32,
    /// The pyramid blur sigma is this factor times the subsampling.
    pub pyramid_sigma_fact: f32,
    /// Scale applied to the error vector of every iteration.
    pub step_factor: f32,
    /// Reuse the pyramid of the current frame as the previous one on the next call.
    pub sequential_mode: bool,
    /// Smooth the image before scoring candidate pixels.
    pub smooth_before_selecting: bool,
    /// Compensate gain and bias differences between the two windows.
    pub lighting_insensitive: bool,
    /// Largest expected displacement in pixels, drives the pyramid depth.
    pub search_range: usize,
    /// Number of pixels skipped between two scored candidates.
    pub n_skipped_pixels: usize,
    /// Affine consistency check mode.
    pub affine_consistency_check: AffineConsistencyCheck,
    /// Intensity range of the input frames.
    pub input_range: InputRange,
    /// How rows and features are scheduled.
    pub execution: ExecutionStrategy,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            mindist: 10,
            window_width: 7,
            window_height: 7,
            min_eigenvalue: 1,
            min_determinant: 0.01,
            min_displacement: 0.1,
            max_iterations: 10,
            max_residue: 10.0,
            grad_sigma: 1.0,
            smooth_sigma_fact: 0.1,
            pyramid_sigma_fact: 0.9,
            step_factor: 1.0,
            sequential_mode: false,
            smooth_before_selecting: true,
            lighting_insensitive: false,
            search_range: 15,
            n_skipped_pixels: 0,
            affine_consistency_check: AffineConsistencyCheck::Disabled,
            input_range: InputRange::Normalized,
            execution: ExecutionStrategy::Serial,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_takes_defaults() -> Result<(), serde_json::Error> {
        let config: TrackingConfig = serde_json::from_str(
            r#"{ "window_width": 9, "lighting_insensitive": true, "execution": "parallel" }"#,
        )?;

        assert_eq!(config.window_width, 9);
        assert_eq!(config.window_height, 7);
        assert!(config.lighting_insensitive);
        assert_eq!(config.execution, ExecutionStrategy::Parallel);
        assert_eq!(config.input_range, InputRange::Normalized);
        assert_eq!(config.mindist, 10);

        Ok(())
    }

    #[test]
    fn json_roundtrip() -> Result<(), serde_json::Error> {
        let config = TrackingConfig {
            affine_consistency_check: AffineConsistencyCheck::Affine,
            input_range: InputRange::Raw,
            ..Default::default()
        };
        let json = serde_json::to_string(&config)?;
        assert!(json.contains("\"affine\""));
        assert_eq!(serde_json::from_str::<TrackingConfig>(&json)?, config);

        Ok(())
    }
}
