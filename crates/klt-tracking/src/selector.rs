use klt_image::Image;
use klt_imgproc::filter::{gaussian_blur, spatial_gradient};

use crate::context::TrackingContext;
use crate::error::TrackingError;
use crate::feature::{Feature, FeatureList, LossReason};

/// Which slots of a feature list the selector may fill.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SelectionMode {
    /// Every slot is refilled, slots left without a candidate become not found.
    SelectAll,
    /// Only lost slots are refilled, tracked features are kept and block their surroundings.
    ReplaceLost,
}

/// A scored candidate pixel.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Candidate {
    x: usize,
    y: usize,
    score: i32,
}

/// Largest score kept, so that scores fit an `i32` with room to spare.
const MAX_SCORE: f32 = (i32::MAX / 2 - 1) as f32;

/// Select the most trackable pixels of an image into a feature list.
///
/// Every interior pixel is scored by the smallest eigenvalue of its gradient
/// structure tensor over the tracking window. Candidates are then accepted by
/// decreasing score as long as no accepted feature lies closer than
/// `mindist` in Chebyshev distance. Candidates with equal scores keep their
/// row-major scan order.
///
/// # Arguments
///
/// * `context` - The tracking context.
/// * `image` - The frame to select features in.
/// * `features` - The list to fill.
/// * `mode` - Which slots may be written.
///
/// # Returns
///
/// The number of features written.
pub fn select_features(
    context: &mut TrackingContext,
    image: &Image<f32, 1>,
    features: &mut FeatureList,
    mode: SelectionMode,
) -> Result<usize, TrackingError> {
    let frame = context.prepare_frame(image)?;

    let reuse_previous = mode == SelectionMode::ReplaceLost && context.sequential_mode();
    let settings = context.pyramid_settings();
    let candidates = match context
        .previous()
        .filter(|previous| reuse_previous && previous.built_with(&settings))
    {
        Some(previous) => {
            if previous.size() != frame.size() {
                return Err(TrackingError::FrameSizeMismatch {
                    previous: previous.size(),
                    current: frame.size(),
                });
            }
            let level = previous
                .level(0)
                .ok_or(klt_imgproc::ImgprocError::InvalidLevelCount(0))?;
            log::debug!("(select_features) reusing the gradients of the previous frame");
            score_candidates(context, level.gradx, level.grady)
        }
        None => {
            let (gradx, grady) = selection_gradients(context, &frame)?;
            score_candidates(context, &gradx, &grady)
        }
    };

    log::debug!(
        "(select_features) {} candidate pixels in a {} image",
        candidates.len(),
        frame.size()
    );

    let written = enforce_minimum_distance(context, candidates, features, mode, &frame);

    log::debug!(
        "(select_features) {written} features written, {} tracked in total",
        features.count_remaining()
    );

    Ok(written)
}

fn selection_gradients(
    context: &mut TrackingContext,
    frame: &Image<f32, 1>,
) -> Result<(Image<f32, 1>, Image<f32, 1>), TrackingError> {
    let smooth_sigma = context.smooth_sigma();
    let grad_sigma = context.config().grad_sigma;
    let smooth = context.config().smooth_before_selecting;
    let strategy = context.execution();
    let kernels = context.kernels_mut();

    let mut gradx = Image::from_size_val(frame.size(), 0.0)?;
    let mut grady = Image::from_size_val(frame.size(), 0.0)?;

    if smooth {
        let mut smoothed = Image::from_size_val(frame.size(), 0.0)?;
        gaussian_blur(frame, &mut smoothed, smooth_sigma, kernels, strategy)?;
        spatial_gradient(&smoothed, &mut gradx, &mut grady, grad_sigma, kernels, strategy)?;
    } else {
        spatial_gradient(frame, &mut gradx, &mut grady, grad_sigma, kernels, strategy)?;
    }

    Ok((gradx, grady))
}

/// Score every pixel far enough from the border, sorted by decreasing score.
fn score_candidates(
    context: &TrackingContext,
    gradx: &Image<f32, 1>,
    grady: &Image<f32, 1>,
) -> Vec<Candidate> {
    let window_hw = context.window_width() / 2;
    let window_hh = context.window_height() / 2;
    let borderx = context.borderx().max(window_hw);
    let bordery = context.bordery().max(window_hh);
    let step = context.config().n_skipped_pixels.saturating_add(1);
    let target_area = context.target_area();

    let (cols, rows) = (gradx.cols(), gradx.rows());
    let xs: Vec<usize> = (borderx..cols.saturating_sub(borderx)).step_by(step).collect();
    let ys: Vec<usize> = (bordery..rows.saturating_sub(bordery)).step_by(step).collect();

    let scored_rows = context.execution().map(&ys, |&y| {
        xs.iter()
            .filter(|&&x| target_area.map_or(true, |area| area.contains(x as f32, y as f32)))
            .map(|&x| {
                let (mut gxx, mut gxy, mut gyy) = (0.0f32, 0.0f32, 0.0f32);
                for yy in y - window_hh..=y + window_hh {
                    let (rowx, rowy) = (gradx.row(yy), grady.row(yy));
                    for xx in x - window_hw..=x + window_hw {
                        let (gx, gy) = (rowx[xx], rowy[xx]);
                        gxx += gx * gx;
                        gxy += gx * gy;
                        gyy += gy * gy;
                    }
                }
                Candidate {
                    x,
                    y,
                    score: min_eigenvalue(gxx, gxy, gyy),
                }
            })
            .collect::<Vec<_>>()
    });

    let mut candidates: Vec<Candidate> = scored_rows.into_iter().flatten().collect();
    // stable, so equal scores stay in scan order
    candidates.sort_by(|a, b| b.score.cmp(&a.score));
    candidates
}

/// Smallest eigenvalue of the structure tensor, truncated to an integer.
fn min_eigenvalue(gxx: f32, gxy: f32, gyy: f32) -> i32 {
    let val = (gxx + gyy - ((gxx - gyy) * (gxx - gyy) + 4.0 * gxy * gxy).sqrt()) / 2.0;
    if val > MAX_SCORE {
        log::warn!("(select_features) trackability {val} is too large, clamping to {MAX_SCORE}");
        return MAX_SCORE as i32;
    }
    val as i32
}

/// Greedily accept candidates into the eligible slots of the list.
fn enforce_minimum_distance(
    context: &TrackingContext,
    candidates: Vec<Candidate>,
    features: &mut FeatureList,
    mode: SelectionMode,
    frame: &Image<f32, 1>,
) -> usize {
    let overwrite_all = mode == SelectionMode::SelectAll;
    let mut mindist = context.config().mindist;
    if mindist < 0 {
        log::warn!("(select_features) mindist is negative ({mindist}), changing to zero");
        mindist = 0;
    }
    // a feature blocks the box of half width mindist - 1, accepted features end up mindist apart
    let radius = mindist - 1;
    let min_eigenvalue = context.config().min_eigenvalue.max(1);

    let mut occupancy = OccupancyMap::new(frame.cols(), frame.rows());
    if !overwrite_all {
        for feature in features.iter() {
            if let Some((x, y)) = feature.position() {
                occupancy.fill(x as i64, y as i64, radius);
            }
        }
    }

    let eligible = |f: &Feature| overwrite_all || !f.is_tracked();
    let slots = features.as_mut_slice();
    let mut index = 0;
    let mut written = 0;

    for candidate in candidates {
        while index < slots.len() && !eligible(&slots[index]) {
            index += 1;
        }
        if index >= slots.len() {
            return written;
        }

        if candidate.score < min_eigenvalue
            || occupancy.is_occupied(candidate.x as i64, candidate.y as i64)
        {
            continue;
        }

        slots[index] = Feature::Tracked {
            x: candidate.x as f32,
            y: candidate.y as f32,
            trackability: candidate.score,
        };
        occupancy.fill(candidate.x as i64, candidate.y as i64, radius);
        index += 1;
        written += 1;
    }

    // out of candidates
    let start = index.min(slots.len());
    for slot in slots[start..].iter_mut() {
        if eligible(slot) {
            *slot = Feature::Lost(LossReason::NotFound);
        }
    }

    written
}

/// A per-pixel map of the surroundings of the accepted features.
struct OccupancyMap {
    cols: usize,
    rows: usize,
    data: Vec<bool>,
}

impl OccupancyMap {
    fn new(cols: usize, rows: usize) -> Self {
        Self {
            cols,
            rows,
            data: vec![false; cols * rows],
        }
    }

    fn is_occupied(&self, x: i64, y: i64) -> bool {
        self.index(x, y).is_some_and(|i| self.data[i])
    }

    /// Mark the box of half width `radius` around `(x, y)`, clipped to the map.
    fn fill(&mut self, x: i64, y: i64, radius: i32) {
        let r = radius as i64;
        for iy in y - r..=y + r {
            for ix in x - r..=x + r {
                if let Some(i) = self.index(ix, iy) {
                    self.data[i] = true;
                }
            }
        }
    }

    fn index(&self, x: i64, y: i64) -> Option<usize> {
        if x < 0 || y < 0 || x >= self.cols as i64 || y >= self.rows as i64 {
            return None;
        }
        Some(y as usize * self.cols + x as usize)
    }
}
