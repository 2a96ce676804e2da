use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::rectangle::rotated_corners;
use super::Point;

/// Dose map taken from a bitmap file, stretched over a rectangle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BitmapShape {
    pub center: Point,
    pub width: f64,
    pub height: f64,
    pub fix_aspect_ratio: bool,
    pub bitmap_file: PathBuf,
}

impl Default for BitmapShape {
    fn default() -> Self {
        Self {
            center: Point::default(),
            width: 1e-6,
            height: 1e-6,
            fix_aspect_ratio: true,
            bitmap_file: PathBuf::new(),
        }
    }
}

impl BitmapShape {
    pub fn area(&self) -> f64 {
        self.width * self.height
    }

    pub fn corners(&self, rotation: f64) -> [Point; 4] {
        rotated_corners(self.center, self.width, self.height, rotation)
    }
}
