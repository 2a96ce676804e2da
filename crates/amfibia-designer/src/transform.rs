//! Coordinate transforms between device-relative metric space and pixel space.
//!
//! Device-relative metric coordinates are in meters with the origin at the
//! centre of the field of view and +Y pointing up. Pixel coordinates have
//! the origin at the top-left corner of the image and +Y pointing down.
//! Stage-relative metric coordinates (the stage position itself) never pass
//! through here; patterns are always placed relative to the image centre.

use serde::{Deserialize, Serialize};

use crate::model::Point;

/// Relative difference between the X and Y pixel pitch above which a frame
/// is considered anisotropic.
pub const SCALE_MISMATCH_EPSILON: f64 = 1e-3;

/// Size and field of view of an image, enough to map between metric and
/// pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ImageFrame {
    pub width_px: u32,
    pub height_px: u32,
    pub fov_width_m: f64,
    pub fov_height_m: f64,
}

impl ImageFrame {
    /// Creates a frame, warning when the pixels are not square.
    pub fn new(width_px: u32, height_px: u32, fov_width_m: f64, fov_height_m: f64) -> Self {
        let frame = Self {
            width_px,
            height_px,
            fov_width_m,
            fov_height_m,
        };
        if frame.scale_mismatch() {
            let (sx, sy) = frame.pixel_pitch_m();
            tracing::warn!(
                "Pixel pitch differs between axes: {:.4e} m (x) vs {:.4e} m (y)",
                sx,
                sy
            );
        }
        frame
    }

    /// Meters per pixel along X and Y.
    pub fn pixel_pitch_m(&self) -> (f64, f64) {
        (
            self.fov_width_m / f64::from(self.width_px),
            self.fov_height_m / f64::from(self.height_px),
        )
    }

    /// Whether the two axis scales differ by more than
    /// [`SCALE_MISMATCH_EPSILON`] relative to the X scale.
    pub fn scale_mismatch(&self) -> bool {
        let (sx, sy) = self.pixel_pitch_m();
        if sx == 0.0 || !sx.is_finite() || !sy.is_finite() {
            return false;
        }
        ((sx - sy) / sx).abs() > SCALE_MISMATCH_EPSILON
    }

    pub fn to_pixel(&self, point: Point) -> Point {
        metric_to_pixel(
            point,
            self.width_px,
            self.height_px,
            self.fov_width_m,
            self.fov_height_m,
        )
    }

    pub fn to_metric(&self, pixel: Point) -> Point {
        pixel_to_metric(
            pixel,
            self.width_px,
            self.height_px,
            self.fov_width_m,
            self.fov_height_m,
        )
    }
}

/// Converts device-relative metric coordinates to pixel coordinates.
///
/// Each axis uses its own scale:
/// ```text
/// x_px = W/2 + x / (fov_w / W)
/// y_px = H/2 - y / (fov_h / H)   // Flip Y-axis
/// ```
pub fn metric_to_pixel(
    point: Point,
    image_width_px: u32,
    image_height_px: u32,
    fov_width_m: f64,
    fov_height_m: f64,
) -> Point {
    let w = f64::from(image_width_px);
    let h = f64::from(image_height_px);
    let scale_x = fov_width_m / w;
    let scale_y = fov_height_m / h;
    Point::new(w / 2.0 + point.x / scale_x, h / 2.0 - point.y / scale_y)
}

/// Inverse of [`metric_to_pixel`].
///
/// ```text
/// x = (x_px - W/2) * (fov_w / W)
/// y = (H/2 - y_px) * (fov_h / H)
/// ```
pub fn pixel_to_metric(
    pixel: Point,
    image_width_px: u32,
    image_height_px: u32,
    fov_width_m: f64,
    fov_height_m: f64,
) -> Point {
    let w = f64::from(image_width_px);
    let h = f64::from(image_height_px);
    let scale_x = fov_width_m / w;
    let scale_y = fov_height_m / h;
    Point::new((pixel.x - w / 2.0) * scale_x, (h / 2.0 - pixel.y) * scale_y)
}

/// Rectangle in device-relative metric coordinates (Y-up, so `top > bottom`).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricRect {
    pub left: f64,
    pub top: f64,
    pub right: f64,
    pub bottom: f64,
}

impl MetricRect {
    pub fn new(left: f64, top: f64, right: f64, bottom: f64) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    /// Rectangle of the given size centred on `center`.
    pub fn centered(center: Point, width: f64, height: f64) -> Self {
        Self::new(
            center.x - width / 2.0,
            center.y + height / 2.0,
            center.x + width / 2.0,
            center.y - height / 2.0,
        )
    }

    pub fn width(&self) -> f64 {
        self.right - self.left
    }

    pub fn height(&self) -> f64 {
        self.top - self.bottom
    }

    pub fn is_valid(&self) -> bool {
        [self.left, self.top, self.right, self.bottom]
            .iter()
            .all(|v| v.is_finite())
            && self.width() > 0.0
            && self.height() > 0.0
    }
}

/// Rectangle as fractions of the image, origin top-left, Y-down.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RelativeRect {
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
}

impl RelativeRect {
    pub fn full_frame() -> Self {
        Self {
            left: 0.0,
            top: 0.0,
            width: 1.0,
            height: 1.0,
        }
    }

    /// Whether the rectangle lies inside the unit square (with a little
    /// tolerance for rounding).
    pub fn is_within_unit(&self) -> bool {
        const TOLERANCE: f64 = 1e-9;
        self.left >= -TOLERANCE
            && self.top >= -TOLERANCE
            && self.width >= 0.0
            && self.height >= 0.0
            && self.left + self.width <= 1.0 + TOLERANCE
            && self.top + self.height <= 1.0 + TOLERANCE
    }

    /// Intersection with the unit square.
    pub fn clamped_to_unit(&self) -> Self {
        let left = self.left.clamp(0.0, 1.0);
        let top = self.top.clamp(0.0, 1.0);
        let right = (self.left + self.width).clamp(left, 1.0);
        let bottom = (self.top + self.height).clamp(top, 1.0);
        Self {
            left,
            top,
            width: right - left,
            height: bottom - top,
        }
    }
}

/// Converts a metric rectangle to fractions of the field of view.
///
/// ```text
/// left   = 0.5 + x_left / fov_w
/// top    = 0.5 - y_top  / fov_h   // Flip Y-axis
/// width  = w / fov_w
/// height = h / fov_h
/// ```
pub fn rect_to_relative(rect: &MetricRect, fov_width_m: f64, fov_height_m: f64) -> RelativeRect {
    RelativeRect {
        left: 0.5 + rect.left / fov_width_m,
        top: 0.5 - rect.top / fov_height_m,
        width: rect.width() / fov_width_m,
        height: rect.height() / fov_height_m,
    }
}
