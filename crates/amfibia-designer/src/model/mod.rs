//! Pattern data model
//!
//! A [`Pattern`] pairs the attributes every milling pattern shares with one
//! variant of [`PatternShape`]. Coordinates are device-relative metric:
//! meters, origin at the centre of the field of view, Y pointing up.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

mod bitmap;
mod circle;
mod cross_section;
mod line;
mod polygon;
mod rectangle;
mod stream;

pub use bitmap::BitmapShape;
pub use circle::{CircleShape, CIRCLE_SEGMENTS};
pub use cross_section::{RegularCrossSectionShape, ScanMethod};
pub use line::LineShape;
pub use polygon::PolygonShape;
pub use rectangle::RectangleShape;
pub use stream::StreamShape;

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance_to(&self, other: &Point) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }

    /// Rotate about the origin by `angle` radians (counter-clockwise, Y-up).
    pub fn rotated(&self, angle: f64) -> Point {
        if angle == 0.0 {
            return *self;
        }
        let (sin, cos) = angle.sin_cos();
        Point::new(self.x * cos - self.y * sin, self.x * sin + self.y * cos)
    }

    pub fn offset(&self, dx: f64, dy: f64) -> Point {
        Point::new(self.x + dx, self.y + dy)
    }

    /// Arithmetic mean of a point set, `None` when empty.
    pub fn centroid(points: &[Point]) -> Option<Point> {
        if points.is_empty() {
            return None;
        }
        let n = points.len() as f64;
        let (sx, sy) = points
            .iter()
            .fold((0.0, 0.0), |(sx, sy), p| (sx + p.x, sy + p.y));
        Some(Point::new(sx / n, sy / n))
    }
}

/// Opaque pattern identifier, fixed at creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PatternId(Uuid);

impl PatternId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for PatternId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BeamType {
    #[default]
    Ion,
    Electron,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ScanDirection {
    #[default]
    TopToBottom,
    BottomToTop,
    LeftToRight,
    RightToLeft,
    DynamicAllDirections,
    DynamicTopToBottom,
    DynamicLeftToRight,
    InnerToOuter,
    OuterToInner,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ScanType {
    #[default]
    Raster,
    Serpentine,
    Circular,
}

/// Milling attributes shared by every pattern variant.
///
/// Lengths are in meters, times in seconds, `rotation` in radians.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternAttributes {
    pub application_file: String,
    pub beam_type: BeamType,
    /// Additional diameter of the blurred spot.
    pub blur: f64,
    /// Working-distance change of the beam.
    pub defocus: f64,
    pub depth: f64,
    /// Charge dose per area.
    pub dose: f64,
    /// Time on a single pixel per pass.
    pub dwell_time: f64,
    /// Disabled patterns are left out of the patterning job.
    pub enabled: bool,
    pub gas_type: String,
    pub gas_flow: f64,
    pub gas_needle_position: String,
    pub interaction_diameter: f64,
    pub is_exclusion_zone: bool,
    pub pass_count: u32,
    /// Minimum loop time before the next pass.
    pub refresh_time: f64,
    pub rotation: f64,
    pub scan_direction: ScanDirection,
    pub scan_type: ScanType,
    /// Processing time reported by the device or set by the operator;
    /// zero when unknown.
    pub time: f64,
    /// Volume removed per charge.
    pub volume_per_dose: f64,
}

impl Default for PatternAttributes {
    fn default() -> Self {
        Self {
            application_file: String::new(),
            beam_type: BeamType::Ion,
            blur: 0.0,
            defocus: 0.0,
            depth: 0.0,
            dose: 0.0,
            dwell_time: 1e-6,
            enabled: true,
            gas_type: String::new(),
            gas_flow: 0.0,
            gas_needle_position: String::new(),
            interaction_diameter: 0.0,
            is_exclusion_zone: false,
            pass_count: 1,
            refresh_time: 0.0,
            rotation: 0.0,
            scan_direction: ScanDirection::TopToBottom,
            scan_type: ScanType::Raster,
            time: 0.0,
            volume_per_dose: 0.0,
        }
    }
}

/// Geometry of a pattern, one variant per pattern kind the instrument knows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PatternShape {
    Rectangle(RectangleShape),
    Circle(CircleShape),
    Line(LineShape),
    Polygon(PolygonShape),
    RegularCrossSection(RegularCrossSectionShape),
    CleaningCrossSection(RectangleShape),
    Stream(StreamShape),
    Bitmap(BitmapShape),
}

impl PatternShape {
    pub fn kind_name(&self) -> &'static str {
        match self {
            PatternShape::Rectangle(_) => "Rectangle",
            PatternShape::Circle(_) => "Circle",
            PatternShape::Line(_) => "Line",
            PatternShape::Polygon(_) => "Polygon",
            PatternShape::RegularCrossSection(_) => "RegularCrossSection",
            PatternShape::CleaningCrossSection(_) => "CleaningCrossSection",
            PatternShape::Stream(_) => "Stream",
            PatternShape::Bitmap(_) => "Bitmap",
        }
    }
}

/// A milling pattern.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pattern {
    id: PatternId,
    pub attributes: PatternAttributes,
    pub shape: PatternShape,
}

impl Pattern {
    pub fn new(shape: PatternShape) -> Self {
        Self::with_attributes(shape, PatternAttributes::default())
    }

    pub fn with_attributes(shape: PatternShape, attributes: PatternAttributes) -> Self {
        Self {
            id: PatternId::new(),
            attributes,
            shape,
        }
    }

    pub fn id(&self) -> PatternId {
        self.id
    }

    pub fn kind_name(&self) -> &'static str {
        self.shape.kind_name()
    }

    pub fn center(&self) -> Point {
        match &self.shape {
            PatternShape::Rectangle(s) | PatternShape::CleaningCrossSection(s) => s.center,
            PatternShape::RegularCrossSection(s) => s.rect.center,
            PatternShape::Circle(s) => s.center,
            PatternShape::Line(s) => s.midpoint(),
            PatternShape::Polygon(s) => s.center,
            PatternShape::Stream(s) => s.center,
            PatternShape::Bitmap(s) => s.center,
        }
    }

    /// Outline vertices in device-relative metric coordinates.
    ///
    /// Rectangles, cross-sections and bitmaps give their four corners with
    /// the rotation applied before translation, circles a
    /// [`CIRCLE_SEGMENTS`]-point outline of the outer diameter, polygons
    /// their vertices, lines start and end, streams their centre.
    pub fn vertices(&self) -> Vec<Point> {
        let rotation = self.attributes.rotation;
        match &self.shape {
            PatternShape::Rectangle(s) | PatternShape::CleaningCrossSection(s) => {
                s.corners(rotation).to_vec()
            }
            PatternShape::RegularCrossSection(s) => s.rect.corners(rotation).to_vec(),
            PatternShape::Bitmap(s) => s.corners(rotation).to_vec(),
            PatternShape::Circle(s) => s.outline(rotation),
            PatternShape::Polygon(s) => s.vertices.clone(),
            PatternShape::Line(s) => vec![s.start, s.end],
            PatternShape::Stream(s) => vec![s.center],
        }
    }

    /// Update the geometry from edited outline vertices.
    ///
    /// The centre becomes the vertex average; polygons take the new vertex
    /// list and lines their new end points. Sizes of the other variants
    /// are left alone.
    pub fn apply_vertices(&mut self, vertices: &[Point]) {
        let Some(center) = Point::centroid(vertices) else {
            return;
        };
        match &mut self.shape {
            PatternShape::Rectangle(s) | PatternShape::CleaningCrossSection(s) => {
                s.center = center
            }
            PatternShape::RegularCrossSection(s) => s.rect.center = center,
            PatternShape::Circle(s) => s.center = center,
            PatternShape::Bitmap(s) => s.center = center,
            PatternShape::Stream(s) => s.center = center,
            PatternShape::Polygon(s) => {
                s.center = center;
                s.vertices = vertices.to_vec();
            }
            PatternShape::Line(s) => {
                if vertices.len() >= 2 {
                    s.start = vertices[0];
                    s.end = vertices[1];
                }
            }
        }
    }

    /// Copy of this pattern ready to send to the instrument.
    ///
    /// The instrument rejects zero or negative depth, so depth is raised to
    /// at least `minimum_depth`.
    pub fn for_device(&self, minimum_depth: f64) -> Pattern {
        let mut pattern = self.clone();
        if !(pattern.attributes.depth >= minimum_depth) {
            pattern.attributes.depth = minimum_depth;
        }
        pattern
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pattern_ids_are_unique() {
        let a = Pattern::new(PatternShape::Rectangle(RectangleShape::default()));
        let b = Pattern::new(PatternShape::Rectangle(RectangleShape::default()));
        assert_ne!(a.id(), b.id());

        let copy = a.clone();
        assert_eq!(copy.id(), a.id());
    }

    #[test]
    fn test_default_attributes() {
        let attrs = PatternAttributes::default();
        assert_eq!(attrs.dwell_time, 1e-6);
        assert_eq!(attrs.pass_count, 1);
        assert!(attrs.enabled);
        assert_eq!(attrs.beam_type, BeamType::Ion);
        assert_eq!(attrs.scan_direction, ScanDirection::TopToBottom);
        assert_eq!(attrs.scan_type, ScanType::Raster);
    }

    #[test]
    fn test_for_device_clamps_depth() {
        let mut pattern = Pattern::new(PatternShape::Rectangle(RectangleShape::default()));
        assert_eq!(pattern.for_device(1e-9).attributes.depth, 1e-9);

        pattern.attributes.depth = -3.0;
        assert_eq!(pattern.for_device(1e-9).attributes.depth, 1e-9);

        pattern.attributes.depth = f64::NAN;
        assert_eq!(pattern.for_device(1e-9).attributes.depth, 1e-9);

        pattern.attributes.depth = 2e-6;
        let device = pattern.for_device(1e-9);
        assert_eq!(device.attributes.depth, 2e-6);
        assert_eq!(device.id(), pattern.id());
    }

    #[test]
    fn test_rotated_rectangle_vertices() {
        let mut pattern = Pattern::new(PatternShape::Rectangle(RectangleShape::new(
            Point::new(1.0, 1.0),
            2.0,
            1.0,
        )));
        pattern.attributes.rotation = std::f64::consts::FRAC_PI_2;

        let vertices = pattern.vertices();
        assert_eq!(vertices.len(), 4);
        // (-1, -0.5) rotated by 90° is (0.5, -1)
        assert!((vertices[0].x - 1.5).abs() < 1e-12);
        assert!((vertices[0].y - 0.0).abs() < 1e-12);
    }

    #[test]
    fn test_vertex_counts_per_kind() {
        let line = Pattern::new(PatternShape::Line(LineShape::new(
            Point::new(0.0, 0.0),
            Point::new(1.0, 0.0),
        )));
        assert_eq!(line.vertices().len(), 2);

        let circle = Pattern::new(PatternShape::Circle(CircleShape::new(Point::default(), 2.0)));
        assert_eq!(circle.vertices().len(), CIRCLE_SEGMENTS);

        let stream = Pattern::new(PatternShape::Stream(StreamShape::new(
            Point::new(3.0, 4.0),
            "path.str",
        )));
        assert_eq!(stream.vertices(), vec![Point::new(3.0, 4.0)]);

        let cross = Pattern::new(PatternShape::RegularCrossSection(
            RegularCrossSectionShape::default(),
        ));
        assert_eq!(cross.vertices().len(), 4);
    }

    #[test]
    fn test_apply_vertices_moves_polygon_and_line() {
        let mut polygon = Pattern::new(PatternShape::Polygon(PolygonShape::from_vertices(vec![
            Point::new(0.0, 0.0),
            Point::new(2.0, 0.0),
            Point::new(2.0, 2.0),
        ])));
        let moved = vec![
            Point::new(1.0, 1.0),
            Point::new(3.0, 1.0),
            Point::new(3.0, 3.0),
        ];
        polygon.apply_vertices(&moved);
        assert_eq!(polygon.vertices(), moved);
        assert!((polygon.center().x - 7.0 / 3.0).abs() < 1e-12);

        let mut line = Pattern::new(PatternShape::Line(LineShape::new(
            Point::new(0.0, 0.0),
            Point::new(1.0, 0.0),
        )));
        line.apply_vertices(&[Point::new(0.0, 0.0), Point::new(0.0, 3.0)]);
        match &line.shape {
            PatternShape::Line(s) => assert_eq!(s.length(), 3.0),
            other => panic!("unexpected shape {:?}", other),
        }
    }
}
