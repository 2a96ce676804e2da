use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

use super::Point;

/// Number of outline points used to draw a circle.
pub const CIRCLE_SEGMENTS: usize = 32;

/// Disc or annulus; an inner diameter of zero gives a full disc.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CircleShape {
    pub center: Point,
    pub outer_diameter: f64,
    pub inner_diameter: f64,
    pub overlap_r: f64,
    pub overlap_t: f64,
    pub pitch_r: f64,
    pub pitch_t: f64,
}

impl Default for CircleShape {
    fn default() -> Self {
        Self {
            center: Point::default(),
            outer_diameter: 1e-6,
            inner_diameter: 0.0,
            overlap_r: 0.5,
            overlap_t: 0.5,
            pitch_r: 0.0,
            pitch_t: 0.0,
        }
    }
}

impl CircleShape {
    pub fn new(center: Point, outer_diameter: f64) -> Self {
        Self {
            center,
            outer_diameter,
            ..Default::default()
        }
    }

    /// Milled area, excluding the inner hole.
    pub fn area(&self) -> f64 {
        let ro = self.outer_diameter / 2.0;
        let ri = self.inner_diameter / 2.0;
        PI * (ro * ro - ri * ri)
    }

    pub fn outline(&self, rotation: f64) -> Vec<Point> {
        let radius = self.outer_diameter / 2.0;
        (0..CIRCLE_SEGMENTS)
            .map(|i| {
                let angle = 2.0 * PI * i as f64 / CIRCLE_SEGMENTS as f64 + rotation;
                Point::new(
                    self.center.x + radius * angle.cos(),
                    self.center.y + radius * angle.sin(),
                )
            })
            .collect()
    }
}
