use serde::{Deserialize, Serialize};

use super::Point;

/// Axis-aligned rectangle before rotation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RectangleShape {
    pub center: Point,
    pub width: f64,
    pub height: f64,
    pub overlap_x: f64,
    pub overlap_y: f64,
    /// Spot spacing along X; zero lets the instrument derive it.
    pub pitch_x: f64,
    pub pitch_y: f64,
}

impl Default for RectangleShape {
    fn default() -> Self {
        Self {
            center: Point::default(),
            width: 1e-6,
            height: 1e-6,
            overlap_x: 0.5,
            overlap_y: 0.5,
            pitch_x: 0.0,
            pitch_y: 0.0,
        }
    }
}

impl RectangleShape {
    pub fn new(center: Point, width: f64, height: f64) -> Self {
        Self {
            center,
            width,
            height,
            ..Default::default()
        }
    }

    pub fn area(&self) -> f64 {
        self.width * self.height
    }

    pub fn corners(&self, rotation: f64) -> [Point; 4] {
        rotated_corners(self.center, self.width, self.height, rotation)
    }
}

/// Corners of a `width` × `height` box, rotated about its centre and then
/// moved to `center`. Order: bottom-left, bottom-right, top-right, top-left.
pub(crate) fn rotated_corners(center: Point, width: f64, height: f64, rotation: f64) -> [Point; 4] {
    let hw = width / 2.0;
    let hh = height / 2.0;
    [
        Point::new(-hw, -hh),
        Point::new(hw, -hh),
        Point::new(hw, hh),
        Point::new(-hw, hh),
    ]
    .map(|p| {
        let r = p.rotated(rotation);
        Point::new(r.x + center.x, r.y + center.y)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unrotated_corners() {
        let rect = RectangleShape::new(Point::new(10.0, 20.0), 4.0, 2.0);
        let corners = rect.corners(0.0);
        assert_eq!(corners[0], Point::new(8.0, 19.0));
        assert_eq!(corners[2], Point::new(12.0, 21.0));
        assert_eq!(rect.area(), 8.0);
    }
}
