use amfibia_designer::model::{
    BitmapShape, CircleShape, LineShape, Pattern, PatternShape, Point, PolygonShape,
    RectangleShape, RegularCrossSectionShape, ScanMethod, StreamShape,
};
use amfibia_designer::transform::ImageFrame;
use amfibia_designer::{DisplayablePattern, GroupColor, PatternGroup};
use std::f64::consts::FRAC_PI_4;

fn every_kind() -> Vec<Pattern> {
    vec![
        Pattern::new(PatternShape::Rectangle(RectangleShape::default())),
        Pattern::new(PatternShape::Circle(CircleShape::new(Point::default(), 2e-6))),
        Pattern::new(PatternShape::Line(LineShape::new(
            Point::new(-1e-6, 0.0),
            Point::new(1e-6, 0.0),
        ))),
        Pattern::new(PatternShape::Polygon(PolygonShape::from_vertices(vec![
            Point::new(0.0, 0.0),
            Point::new(1e-6, 0.0),
            Point::new(0.0, 1e-6),
        ]))),
        Pattern::new(PatternShape::RegularCrossSection(
            RegularCrossSectionShape::default(),
        )),
        Pattern::new(PatternShape::CleaningCrossSection(RectangleShape::default())),
        Pattern::new(PatternShape::Stream(StreamShape::new(
            Point::default(),
            "beam.str",
        ))),
        Pattern::new(PatternShape::Bitmap(BitmapShape::default())),
    ]
}

#[test]
fn test_every_kind_has_outline() {
    let expected = [4, 32, 2, 3, 4, 4, 1, 4];
    for (pattern, count) in every_kind().iter().zip(expected) {
        assert_eq!(pattern.vertices().len(), count, "{}", pattern.kind_name());
    }
}

#[test]
fn test_rotation_keeps_centre() {
    for mut pattern in every_kind() {
        let before = pattern.center();
        pattern.attributes.rotation = FRAC_PI_4;
        let outline = pattern.vertices();
        if matches!(
            pattern.shape,
            PatternShape::Rectangle(_)
                | PatternShape::CleaningCrossSection(_)
                | PatternShape::RegularCrossSection(_)
                | PatternShape::Bitmap(_)
        ) {
            let centroid = Point::centroid(&outline).unwrap();
            assert!(centroid.distance_to(&before) < 1e-15);
        }
    }
}

#[test]
fn test_cross_section_defaults() {
    let shape = RegularCrossSectionShape::default();
    assert_eq!(shape.multi_scan_pass_count, 1);
    assert_eq!(shape.scan_method, ScanMethod::MultiPass);
    assert_eq!(shape.scan_ratio, 1.0);
}

#[test]
fn test_device_copy_of_group() {
    let frame = ImageFrame::new(100, 100, 1e-5, 1e-5);
    let mut group = PatternGroup::new(GroupColor::for_index(0));
    for pattern in every_kind() {
        group.insert(DisplayablePattern::new(pattern, &frame));
    }
    for pattern in group.enabled_patterns() {
        let device = pattern.for_device(1e-9);
        assert!(device.attributes.depth >= 1e-9);
        assert_eq!(device.shape, pattern.shape);
    }
}

#[test]
fn test_group_time_estimate() {
    let frame = ImageFrame::new(100, 100, 1e-5, 1e-5);
    let mut group = PatternGroup::new(GroupColor::for_index(0));
    for seconds in [10.0, 20.5] {
        let mut pattern = Pattern::new(PatternShape::Rectangle(RectangleShape::default()));
        pattern.attributes.time = seconds;
        group.insert(DisplayablePattern::new(pattern, &frame));
    }
    assert!((group.estimated_time_s() - 30.5).abs() < 1e-12);
}
