use klt_image::Image;
use klt_imgproc::interpolation::bilinear_interpolation;

use crate::config::AffineConsistencyCheck;
use crate::context::TrackingContext;
use crate::error::TrackingError;
use crate::feature::{Feature, FeatureList, LossReason};
use crate::pyramid_set::{LevelView, PyramidSet};

/// Slack kept between the window and the last column or row so that the
/// bilinear neighbours stay inside the image.
const ONE_PLUS_EPS: f32 = 1.001;

/// Outcome of tracking a feature on a single pyramid level.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum LevelStatus {
    Tracked,
    SmallDeterminant,
    MaxIterations,
    OutOfBounds,
    LargeResidue,
}

/// The parameters of the per-feature solver.
#[derive(Clone, Copy, Debug)]
struct SolverParams {
    window_width: usize,
    window_height: usize,
    step_factor: f32,
    max_iterations: usize,
    min_determinant: f32,
    min_displacement: f32,
    max_residue: f32,
    lighting_insensitive: bool,
}

impl SolverParams {
    fn from_context(context: &TrackingContext) -> Self {
        let c = context.config();
        Self {
            window_width: context.window_width(),
            window_height: context.window_height(),
            step_factor: c.step_factor,
            max_iterations: c.max_iterations,
            min_determinant: c.min_determinant,
            min_displacement: c.min_displacement,
            max_residue: c.max_residue,
            lighting_insensitive: c.lighting_insensitive,
        }
    }

    fn window_area(&self) -> usize {
        self.window_width * self.window_height
    }
}

/// Scratch buffers for one window.
struct Windows {
    diff: Vec<f32>,
    gradx: Vec<f32>,
    grady: Vec<f32>,
}

impl Windows {
    fn new(area: usize) -> Self {
        Self {
            diff: vec![0.0; area],
            gradx: vec![0.0; area],
            grady: vec![0.0; area],
        }
    }
}

/// Whether a window centred on `(x, y)` leaves the image.
fn window_out_of_bounds(x: f32, y: f32, hw: f32, hh: f32, image: &Image<f32, 1>) -> bool {
    let (nc, nr) = (image.cols() as f32, image.rows() as f32);
    x - hw < 0.0 || nc - (x + hw) < ONE_PLUS_EPS || y - hh < 0.0 || nr - (y + hh) < ONE_PLUS_EPS
}

/// Iterate over the window offsets in row-major order.
fn window_offsets(hw: i32, hh: i32) -> impl Iterator<Item = (f32, f32)> {
    (-hh..=hh).flat_map(move |j| (-hw..=hw).map(move |i| (i as f32, j as f32)))
}

/// Intensity differences between the window around `p1` in `img1` and the window around `p2` in `img2`.
fn intensity_difference(
    img1: &Image<f32, 1>,
    img2: &Image<f32, 1>,
    p1: (f32, f32),
    p2: (f32, f32),
    hw: i32,
    hh: i32,
    out: &mut [f32],
) {
    for ((i, j), d) in window_offsets(hw, hh).zip(out.iter_mut()) {
        let g1 = bilinear_interpolation(img1, p1.0 + i, p1.1 + j);
        let g2 = bilinear_interpolation(img2, p2.0 + i, p2.1 + j);
        *d = g1 - g2;
    }
}

/// Same as [`intensity_difference`] after matching the gain and bias of the second window to the first.
fn intensity_difference_lighting_insensitive(
    img1: &Image<f32, 1>,
    img2: &Image<f32, 1>,
    p1: (f32, f32),
    p2: (f32, f32),
    hw: i32,
    hh: i32,
    out: &mut [f32],
) {
    let n = out.len() as f32;
    let (mut sum1, mut sum2, mut sum1_sq, mut sum2_sq) = (0.0f32, 0.0f32, 0.0f32, 0.0f32);
    for (i, j) in window_offsets(hw, hh) {
        let g1 = bilinear_interpolation(img1, p1.0 + i, p1.1 + j);
        let g2 = bilinear_interpolation(img2, p2.0 + i, p2.1 + j);
        sum1 += g1;
        sum2 += g2;
        sum1_sq += g1 * g1;
        sum2_sq += g2 * g2;
    }

    let alpha = ((sum1_sq / n) / (sum2_sq / n)).sqrt();
    let beta = sum1 / n - alpha * (sum2 / n);

    for ((i, j), d) in window_offsets(hw, hh).zip(out.iter_mut()) {
        let g1 = bilinear_interpolation(img1, p1.0 + i, p1.1 + j);
        let g2 = bilinear_interpolation(img2, p2.0 + i, p2.1 + j);
        *d = g1 - g2 * alpha - beta;
    }
}

/// Sum of the gradients of both windows.
fn gradient_sum(
    level1: &LevelView,
    level2: &LevelView,
    p1: (f32, f32),
    p2: (f32, f32),
    hw: i32,
    hh: i32,
    windows: &mut Windows,
) {
    let outs = windows.gradx.iter_mut().zip(windows.grady.iter_mut());
    for ((i, j), (gx, gy)) in window_offsets(hw, hh).zip(outs) {
        let (x1, y1, x2, y2) = (p1.0 + i, p1.1 + j, p2.0 + i, p2.1 + j);
        *gx = bilinear_interpolation(level1.gradx, x1, y1) + bilinear_interpolation(level2.gradx, x2, y2);
        *gy = bilinear_interpolation(level1.grady, x1, y1) + bilinear_interpolation(level2.grady, x2, y2);
    }
}

/// Same as [`gradient_sum`] with the second window scaled by the ratio of the mean intensities.
fn gradient_sum_lighting_insensitive(
    level1: &LevelView,
    level2: &LevelView,
    p1: (f32, f32),
    p2: (f32, f32),
    hw: i32,
    hh: i32,
    windows: &mut Windows,
) {
    let (mut sum1, mut sum2) = (0.0f32, 0.0f32);
    for (i, j) in window_offsets(hw, hh) {
        sum1 += bilinear_interpolation(level1.image, p1.0 + i, p1.1 + j);
        sum2 += bilinear_interpolation(level2.image, p2.0 + i, p2.1 + j);
    }
    let n = windows.gradx.len() as f32;
    let alpha = ((sum1 / n) / (sum2 / n)).sqrt();

    let outs = windows.gradx.iter_mut().zip(windows.grady.iter_mut());
    for ((i, j), (gx, gy)) in window_offsets(hw, hh).zip(outs) {
        let (x1, y1, x2, y2) = (p1.0 + i, p1.1 + j, p2.0 + i, p2.1 + j);
        *gx = bilinear_interpolation(level1.gradx, x1, y1)
            + bilinear_interpolation(level2.gradx, x2, y2) * alpha;
        *gy = bilinear_interpolation(level1.grady, x1, y1)
            + bilinear_interpolation(level2.grady, x2, y2) * alpha;
    }
}

/// Track one feature on one pyramid level.
///
/// `p1` is the position in the first image and `p2` the current estimate in
/// the second image, refined in place.
fn track_feature_on_level(
    level1: &LevelView,
    level2: &LevelView,
    p1: (f32, f32),
    p2: &mut (f32, f32),
    params: &SolverParams,
    windows: &mut Windows,
) -> LevelStatus {
    let hw = (params.window_width / 2) as i32;
    let hh = (params.window_height / 2) as i32;
    let (hwf, hhf) = (hw as f32, hh as f32);

    let mut status = LevelStatus::Tracked;
    let mut iteration = 0;

    loop {
        if window_out_of_bounds(p1.0, p1.1, hwf, hhf, level1.image)
            || window_out_of_bounds(p2.0, p2.1, hwf, hhf, level2.image)
        {
            status = LevelStatus::OutOfBounds;
            break;
        }

        if params.lighting_insensitive {
            intensity_difference_lighting_insensitive(
                level1.image,
                level2.image,
                p1,
                *p2,
                hw,
                hh,
                &mut windows.diff,
            );
            gradient_sum_lighting_insensitive(level1, level2, p1, *p2, hw, hh, windows);
        } else {
            intensity_difference(level1.image, level2.image, p1, *p2, hw, hh, &mut windows.diff);
            gradient_sum(level1, level2, p1, *p2, hw, hh, windows);
        }

        // 2x2 gradient matrix and error vector
        let (mut gxx, mut gxy, mut gyy, mut ex, mut ey) = (0.0f32, 0.0f32, 0.0f32, 0.0f32, 0.0f32);
        for ((d, gx), gy) in windows.diff.iter().zip(&windows.gradx).zip(&windows.grady) {
            gxx += gx * gx;
            gxy += gx * gy;
            gyy += gy * gy;
            ex += d * gx;
            ey += d * gy;
        }
        ex *= params.step_factor;
        ey *= params.step_factor;

        let det = gxx * gyy - gxy * gxy;
        if !det.is_finite() || det < params.min_determinant {
            status = LevelStatus::SmallDeterminant;
            break;
        }

        let dx = (gyy * ex - gxy * ey) / det;
        let dy = (gxx * ey - gxy * ex) / det;
        p2.0 += dx;
        p2.1 += dy;
        iteration += 1;

        let moving = dx.abs() >= params.min_displacement || dy.abs() >= params.min_displacement;
        if !moving || iteration >= params.max_iterations {
            break;
        }
    }

    if window_out_of_bounds(p2.0, p2.1, hwf, hhf, level2.image) {
        status = LevelStatus::OutOfBounds;
    }

    if status == LevelStatus::Tracked {
        if params.lighting_insensitive {
            intensity_difference_lighting_insensitive(
                level1.image,
                level2.image,
                p1,
                *p2,
                hw,
                hh,
                &mut windows.diff,
            );
        } else {
            intensity_difference(level1.image, level2.image, p1, *p2, hw, hh, &mut windows.diff);
        }
        let residue =
            windows.diff.iter().map(|d| d.abs()).sum::<f32>() / params.window_area() as f32;
        if residue.is_nan() || residue > params.max_residue {
            status = LevelStatus::LargeResidue;
        }
    }

    match status {
        LevelStatus::Tracked if iteration >= params.max_iterations => LevelStatus::MaxIterations,
        other => other,
    }
}

/// Whether a position lies inside the border margin of the full resolution frame.
fn outside_border(x: f32, y: f32, cols: usize, rows: usize, borderx: usize, bordery: usize) -> bool {
    let (bx, by) = (borderx as f32, bordery as f32);
    x < bx || x > cols as f32 - 1.0 - bx || y < by || y > rows as f32 - 1.0 - by
}

/// Track one feature from the coarsest to the finest level.
fn track_feature(
    feature: &Feature,
    pyramid1: &PyramidSet,
    pyramid2: &PyramidSet,
    params: &SolverParams,
    borders: (usize, usize),
) -> Feature {
    let Some((x, y)) = feature.position() else {
        return *feature;
    };

    let levels = pyramid1.num_levels();
    let s = pyramid1.subsampling() as f32;
    let size = pyramid1.size();

    let mut p1 = (x, y);
    for _ in 0..levels {
        p1 = (p1.0 / s, p1.1 / s);
    }
    let mut p2 = p1;

    let mut windows = Windows::new(params.window_area());
    let mut status = LevelStatus::Tracked;

    for r in (0..levels).rev() {
        p1 = (p1.0 * s, p1.1 * s);
        p2 = (p2.0 * s, p2.1 * s);

        let (Some(level1), Some(level2)) = (pyramid1.level(r), pyramid2.level(r)) else {
            status = LevelStatus::OutOfBounds;
            break;
        };
        status = track_feature_on_level(&level1, &level2, p1, &mut p2, params, &mut windows);
        if matches!(status, LevelStatus::SmallDeterminant | LevelStatus::OutOfBounds) {
            break;
        }
    }

    let reason = match status {
        LevelStatus::SmallDeterminant => Some(LossReason::SmallDeterminant),
        LevelStatus::OutOfBounds => Some(LossReason::OutOfBounds),
        _ if outside_border(p2.0, p2.1, size.width, size.height, borders.0, borders.1) => {
            Some(LossReason::OutOfBounds)
        }
        LevelStatus::LargeResidue => Some(LossReason::LargeResidue),
        LevelStatus::MaxIterations => Some(LossReason::MaxIterations),
        LevelStatus::Tracked => None,
    };

    match reason {
        Some(reason) => {
            log::trace!("feature at ({x}, {y}) lost: {reason}");
            Feature::Lost(reason)
        }
        None => Feature::Tracked {
            x: p2.0,
            y: p2.1,
            trackability: 0,
        },
    }
}

fn check_affine_consistency(context: &TrackingContext) -> Result<(), TrackingError> {
    match context.config().affine_consistency_check {
        AffineConsistencyCheck::Disabled => Ok(()),
        mode => Err(TrackingError::UnsupportedAffineConsistencyCheck(mode)),
    }
}

/// Track every feature of a list between two pyramid sets.
///
/// Lost features are left untouched. Every tracked feature either moves to
/// its new position with a trackability of 0 or becomes lost with the reason
/// of the failure.
///
/// # Arguments
///
/// * `context` - The tracking context.
/// * `pyramid1` - Pyramids of the previous frame.
/// * `pyramid2` - Pyramids of the current frame.
/// * `features` - The list to update.
///
/// # Returns
///
/// The number of features still tracked.
///
/// # Errors
///
/// Fails if the affine consistency check is enabled, if the sets do not
/// match the pyramid layout of the context or if their sizes differ.
pub fn track_features_with_pyramids(
    context: &TrackingContext,
    pyramid1: &PyramidSet,
    pyramid2: &PyramidSet,
    features: &mut FeatureList,
) -> Result<usize, TrackingError> {
    check_affine_consistency(context)?;

    for set in [pyramid1, pyramid2] {
        set.check_layout(context.n_pyramid_levels(), context.subsampling())?;
    }
    if pyramid1.size() != pyramid2.size() {
        return Err(TrackingError::FrameSizeMismatch {
            previous: pyramid1.size(),
            current: pyramid2.size(),
        });
    }

    let params = SolverParams::from_context(context);
    let borders = (context.borderx(), context.bordery());

    log::debug!(
        "(track_features) tracking {} features in a {} image",
        features.count_remaining(),
        pyramid2.size()
    );

    context.execution().for_each_mut(features.as_mut_slice(), |feature| {
        *feature = track_feature(feature, pyramid1, pyramid2, &params, borders);
    });

    let remaining = features.count_remaining();
    log::debug!("(track_features) {remaining} features successfully tracked");

    Ok(remaining)
}

/// Track every feature of a list from `img1` to `img2`.
///
/// In sequential mode the pyramids of `img2` are kept in the context and
/// stand in for `img1` on the next call.
///
/// # Arguments
///
/// * `context` - The tracking context.
/// * `img1` - The previous frame.
/// * `img2` - The current frame.
/// * `features` - The list to update.
///
/// # Returns
///
/// The number of features still tracked.
pub fn track_features(
    context: &mut TrackingContext,
    img1: &Image<f32, 1>,
    img2: &Image<f32, 1>,
    features: &mut FeatureList,
) -> Result<usize, TrackingError> {
    check_affine_consistency(context)?;

    if img1.size() != img2.size() {
        return Err(klt_image::ImageError::InvalidImageSize(
            img1.width(),
            img1.height(),
            img2.width(),
            img2.height(),
        )
        .into());
    }

    let cached = match context.previous() {
        Some(previous) if context.sequential_mode() => {
            if previous.size() != img2.size() {
                return Err(TrackingError::FrameSizeMismatch {
                    previous: previous.size(),
                    current: img2.size(),
                });
            }
            // a set built with other settings is rebuilt from img1
            previous.built_with(&context.pyramid_settings())
        }
        _ => false,
    };

    let pyramid1 = match context.take_previous() {
        Some(previous) if cached => previous,
        _ => PyramidSet::new(img1, context)?,
    };
    let pyramid2 = PyramidSet::new(img2, context)?;

    let remaining = track_features_with_pyramids(context, &pyramid1, &pyramid2, features)?;

    if context.sequential_mode() {
        context.store_previous(pyramid2);
    }

    Ok(remaining)
}
