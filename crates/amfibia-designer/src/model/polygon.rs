use serde::{Deserialize, Serialize};

use super::Point;

/// Closed polygon; the last vertex connects back to the first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolygonShape {
    pub center: Point,
    pub vertices: Vec<Point>,
    pub overlap_x: f64,
    pub overlap_y: f64,
    pub pitch_x: f64,
    pub pitch_y: f64,
}

impl PolygonShape {
    /// Build from vertices, centring on their average.
    pub fn from_vertices(vertices: Vec<Point>) -> Self {
        Self {
            center: Point::centroid(&vertices).unwrap_or_default(),
            vertices,
            overlap_x: 0.5,
            overlap_y: 0.5,
            pitch_x: 0.0,
            pitch_y: 0.0,
        }
    }

    /// Shoelace area; degenerate polygons have none.
    pub fn area(&self) -> f64 {
        let n = self.vertices.len();
        if n < 3 {
            return 0.0;
        }
        let twice: f64 = (0..n)
            .map(|i| {
                let a = self.vertices[i];
                let b = self.vertices[(i + 1) % n];
                a.x * b.y - b.x * a.y
            })
            .sum();
        twice.abs() / 2.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shoelace_area() {
        let square = PolygonShape::from_vertices(vec![
            Point::new(0.0, 0.0),
            Point::new(2.0, 0.0),
            Point::new(2.0, 2.0),
            Point::new(0.0, 2.0),
        ]);
        assert_eq!(square.area(), 4.0);
        assert_eq!(square.center, Point::new(1.0, 1.0));

        let degenerate = PolygonShape::from_vertices(vec![Point::new(0.0, 0.0), Point::new(1.0, 1.0)]);
        assert_eq!(degenerate.area(), 0.0);
    }
}
