//! Feature localisation between a live image and a reference image.
//!
//! [`CorrelationMatcher`] estimates the translation with zero-mean
//! normalised cross-correlation (ZNCC). The search runs exhaustively on the
//! coarsest level of a 2x pyramid, then the estimate is refined level by
//! level down to full resolution, where a parabola through the peak and its
//! neighbours gives the sub-pixel offset.

use amfibia_core::{HardwareError, HardwareResult};
use amfibia_designer::reference::ReferenceImage;

/// Where the reference was found in the live image.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeatureMatch {
    /// Centre of the reference in the live image relative to the live
    /// image centre, meters, Y-up.
    pub offset_x_m: f64,
    pub offset_y_m: f64,
    /// Match quality in [0, 1].
    pub confidence: f64,
}

impl FeatureMatch {
    pub fn residual_m(&self) -> f64 {
        self.offset_x_m.hypot(self.offset_y_m)
    }
}

/// Locates a reference image inside a live image.
pub trait FeatureMatcher: Send + Sync {
    fn locate(&self, live: &ReferenceImage, reference: &ReferenceImage)
        -> HardwareResult<FeatureMatch>;
}

/// Coarsest pyramid level is at most this many pixels on its long side.
const COARSE_MAX_DIMENSION: u32 = 256;

/// Refinement window at each finer level, in pixels.
const REFINE_RADIUS: i32 = 2;

/// ZNCC matcher with a coarse-to-fine search.
#[derive(Debug, Clone)]
pub struct CorrelationMatcher {
    /// Largest shift searched, as a fraction of the image size.
    pub search_fraction: f64,
}

impl Default for CorrelationMatcher {
    fn default() -> Self {
        Self {
            search_fraction: 0.25,
        }
    }
}

impl CorrelationMatcher {
    pub fn new(search_fraction: f64) -> Self {
        Self {
            search_fraction: search_fraction.clamp(0.01, 0.9),
        }
    }
}

impl FeatureMatcher for CorrelationMatcher {
    fn locate(
        &self,
        live: &ReferenceImage,
        reference: &ReferenceImage,
    ) -> HardwareResult<FeatureMatch> {
        if live.is_empty() || reference.is_empty() {
            return Err(HardwareError::Matching {
                reason: "empty image".to_string(),
            });
        }
        if live.width() != reference.width() || live.height() != reference.height() {
            return Err(HardwareError::Matching {
                reason: format!(
                    "image sizes differ: {}x{} vs {}x{}",
                    live.width(),
                    live.height(),
                    reference.width(),
                    reference.height()
                ),
            });
        }

        let live_levels = pyramid(Plane::from_image(live));
        let reference_levels = pyramid(Plane::from_image(reference));
        let top = live_levels.len() - 1;

        let coarse_live = &live_levels[top];
        let coarse_reference = &reference_levels[top];
        let max_dx = ((f64::from(coarse_live.width) * self.search_fraction) as i32).max(1);
        let max_dy = ((f64::from(coarse_live.height) * self.search_fraction) as i32).max(1);
        let (mut best, _) = best_shift(
            coarse_reference,
            coarse_live,
            (0, 0),
            max_dx,
            max_dy,
        );

        for level in (0..top).rev() {
            let guess = (best.0 * 2, best.1 * 2);
            best = best_shift(
                &reference_levels[level],
                &live_levels[level],
                guess,
                REFINE_RADIUS,
                REFINE_RADIUS,
            )
            .0;
        }

        let full_reference = &reference_levels[0];
        let full_live = &live_levels[0];
        let peak = zncc(full_reference, full_live, best.0, best.1);
        let sub_x = parabolic_peak(
            zncc(full_reference, full_live, best.0 - 1, best.1),
            peak,
            zncc(full_reference, full_live, best.0 + 1, best.1),
        );
        let sub_y = parabolic_peak(
            zncc(full_reference, full_live, best.0, best.1 - 1),
            peak,
            zncc(full_reference, full_live, best.0, best.1 + 1),
        );

        let shift_x = f64::from(best.0) + sub_x;
        let shift_y = f64::from(best.1) + sub_y;
        let (pitch_x, pitch_y) = live.frame().pixel_pitch_m();

        let found = FeatureMatch {
            offset_x_m: shift_x * pitch_x,
            offset_y_m: -shift_y * pitch_y,
            confidence: peak.clamp(0.0, 1.0),
        };
        tracing::debug!(
            "Matched at ({:.2}, {:.2}) px, confidence {:.4}",
            shift_x,
            shift_y,
            found.confidence
        );
        Ok(found)
    }
}

/// Greyscale pixels as floats.
#[derive(Debug, Clone)]
struct Plane {
    width: u32,
    height: u32,
    data: Vec<f32>,
}

impl Plane {
    fn from_image(image: &ReferenceImage) -> Self {
        Self {
            width: image.width(),
            height: image.height(),
            data: image.raster.pixels().map(|p| f32::from(p.0[0])).collect(),
        }
    }

    fn at(&self, x: u32, y: u32) -> f32 {
        self.data[(y * self.width + x) as usize]
    }

    /// 2x2 box average; odd trailing rows and columns are dropped.
    fn downsample(&self) -> Plane {
        let width = (self.width / 2).max(1);
        let height = (self.height / 2).max(1);
        let mut data = Vec::with_capacity((width * height) as usize);
        for y in 0..height {
            for x in 0..width {
                let (x0, y0) = (x * 2, y * 2);
                let x1 = (x0 + 1).min(self.width - 1);
                let y1 = (y0 + 1).min(self.height - 1);
                data.push(
                    (self.at(x0, y0) + self.at(x1, y0) + self.at(x0, y1) + self.at(x1, y1)) / 4.0,
                );
            }
        }
        Plane {
            width,
            height,
            data,
        }
    }
}

/// Level 0 is full resolution; the last level is the coarsest.
fn pyramid(base: Plane) -> Vec<Plane> {
    let mut levels = vec![base];
    while let Some(last) = levels.last() {
        if last.width.max(last.height) <= COARSE_MAX_DIMENSION
            || last.width < 16
            || last.height < 16
        {
            break;
        }
        let next = last.downsample();
        levels.push(next);
    }
    levels
}

/// Shift with the highest ZNCC in a window around `center`.
fn best_shift(
    reference: &Plane,
    live: &Plane,
    center: (i32, i32),
    radius_x: i32,
    radius_y: i32,
) -> ((i32, i32), f64) {
    let mut best = (center, f64::MIN);
    for dy in (center.1 - radius_y)..=(center.1 + radius_y) {
        for dx in (center.0 - radius_x)..=(center.0 + radius_x) {
            let score = zncc(reference, live, dx, dy);
            if score > best.1 {
                best = ((dx, dy), score);
            }
        }
    }
    best
}

/// ZNCC of `reference(x, y)` against `live(x + dx, y + dy)` over the
/// overlap. Returns 0 when the overlap is tiny or flat.
fn zncc(reference: &Plane, live: &Plane, dx: i32, dy: i32) -> f64 {
    let w = reference.width as i32;
    let h = reference.height as i32;
    let x_start = 0.max(-dx);
    let x_end = w.min(live.width as i32 - dx);
    let y_start = 0.max(-dy);
    let y_end = h.min(live.height as i32 - dy);
    if x_end - x_start < 4 || y_end - y_start < 4 {
        return 0.0;
    }

    let (mut sum_r, mut sum_l, mut sum_rr, mut sum_ll, mut sum_rl) = (0.0, 0.0, 0.0, 0.0, 0.0);
    for y in y_start..y_end {
        for x in x_start..x_end {
            let r = f64::from(reference.at(x as u32, y as u32));
            let l = f64::from(live.at((x + dx) as u32, (y + dy) as u32));
            sum_r += r;
            sum_l += l;
            sum_rr += r * r;
            sum_ll += l * l;
            sum_rl += r * l;
        }
    }

    let n = f64::from((x_end - x_start) * (y_end - y_start));
    let covariance = sum_rl - sum_r * sum_l / n;
    let var_r = sum_rr - sum_r * sum_r / n;
    let var_l = sum_ll - sum_l * sum_l / n;
    if var_r <= f64::EPSILON || var_l <= f64::EPSILON {
        return 0.0;
    }
    covariance / (var_r * var_l).sqrt()
}

/// Vertex of the parabola through three equally spaced samples, relative
/// to the middle one, limited to half a pixel.
fn parabolic_peak(left: f64, center: f64, right: f64) -> f64 {
    let denominator = left - 2.0 * center + right;
    if denominator.abs() < 1e-12 {
        return 0.0;
    }
    (0.5 * (left - right) / denominator).clamp(-0.5, 0.5)
}
