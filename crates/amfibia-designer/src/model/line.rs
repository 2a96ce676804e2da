use serde::{Deserialize, Serialize};

use super::Point;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineShape {
    pub start: Point,
    pub end: Point,
    pub overlap: f64,
    pub pitch: f64,
}

impl LineShape {
    pub fn new(start: Point, end: Point) -> Self {
        Self {
            start,
            end,
            overlap: 0.5,
            pitch: 0.0,
        }
    }

    pub fn length(&self) -> f64 {
        self.start.distance_to(&self.end)
    }

    pub fn midpoint(&self) -> Point {
        Point::new(
            (self.start.x + self.end.x) / 2.0,
            (self.start.y + self.end.y) / 2.0,
        )
    }
}
