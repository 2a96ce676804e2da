//! Milling time estimates.
//!
//! Estimates count dwell points from the pattern area and spot pitch:
//! ```text
//! time = area / (pitch_x * pitch_y) * dwell_time * pass_count
//! ```
//! A time reported by the instrument or typed in by the operator wins over
//! the estimate. Without a pitch the dwell-point count is unknown and the
//! estimate is zero.

use crate::group::PatternGroup;
use crate::model::{Pattern, PatternShape};

impl Pattern {
    /// Estimated milling time in seconds.
    pub fn estimated_time_s(&self) -> f64 {
        let attrs = &self.attributes;
        if attrs.time > 0.0 {
            return attrs.time;
        }
        let per_point = attrs.dwell_time * f64::from(attrs.pass_count);

        let (area, pitch_a, pitch_b) = match &self.shape {
            PatternShape::Rectangle(s) | PatternShape::CleaningCrossSection(s) => {
                (s.area(), s.pitch_x, s.pitch_y)
            }
            PatternShape::RegularCrossSection(s) => (s.rect.area(), s.rect.pitch_x, s.rect.pitch_y),
            PatternShape::Polygon(s) => (s.area(), s.pitch_x, s.pitch_y),
            PatternShape::Circle(s) => (s.area(), s.pitch_r, s.pitch_t),
            // No pitch on bitmaps; the dose map decides the spot layout.
            PatternShape::Bitmap(s) => (s.area(), 0.0, 0.0),
            PatternShape::Line(s) => {
                if s.pitch > 0.0 {
                    return s.length() / s.pitch * per_point;
                }
                return 0.0;
            }
            PatternShape::Stream(_) => return 0.0,
        };

        if pitch_a > 0.0 && pitch_b > 0.0 {
            area / (pitch_a * pitch_b) * per_point
        } else {
            0.0
        }
    }
}

impl PatternGroup {
    /// Sum of the estimates of every pattern in the group.
    pub fn estimated_time_s(&self) -> f64 {
        self.patterns()
            .iter()
            .map(|p| p.pattern().estimated_time_s())
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use crate::model::{
        CircleShape, LineShape, Pattern, PatternShape, Point, PolygonShape, RectangleShape,
        StreamShape,
    };

    #[test]
    fn test_rectangle_estimate() {
        let mut shape = RectangleShape::new(Point::default(), 10e-6, 5e-6);
        shape.pitch_x = 10e-9;
        shape.pitch_y = 10e-9;
        let mut pattern = Pattern::new(PatternShape::Rectangle(shape));
        pattern.attributes.pass_count = 2;
        // 500_000 points * 1 µs * 2 passes
        assert!((pattern.estimated_time_s() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_user_time_wins() {
        let mut pattern = Pattern::new(PatternShape::Rectangle(RectangleShape::default()));
        pattern.attributes.time = 42.0;
        assert_eq!(pattern.estimated_time_s(), 42.0);
    }

    #[test]
    fn test_missing_pitch_gives_zero() {
        let pattern = Pattern::new(PatternShape::Rectangle(RectangleShape::default()));
        assert_eq!(pattern.estimated_time_s(), 0.0);

        let circle = Pattern::new(PatternShape::Circle(CircleShape::new(Point::default(), 1e-6)));
        assert_eq!(circle.estimated_time_s(), 0.0);
    }

    #[test]
    fn test_line_and_stream() {
        let mut line = LineShape::new(Point::new(0.0, 0.0), Point::new(1e-6, 0.0));
        line.pitch = 1e-8;
        let pattern = Pattern::new(PatternShape::Line(line));
        assert!((pattern.estimated_time_s() - 100.0 * 1e-6).abs() < 1e-12);

        let stream = Pattern::new(PatternShape::Stream(StreamShape::new(Point::default(), "a.str")));
        assert_eq!(stream.estimated_time_s(), 0.0);
    }

    #[test]
    fn test_degenerate_polygon() {
        let mut shape = PolygonShape::from_vertices(vec![Point::default(), Point::new(1e-6, 0.0)]);
        shape.pitch_x = 1e-9;
        shape.pitch_y = 1e-9;
        assert_eq!(Pattern::new(PatternShape::Polygon(shape)).estimated_time_s(), 0.0);
    }
}
