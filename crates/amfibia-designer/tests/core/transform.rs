use amfibia_designer::model::{Pattern, PatternShape, Point, RectangleShape};
use amfibia_designer::transform::{
    metric_to_pixel, pixel_to_metric, rect_to_relative, ImageFrame, MetricRect,
};
use proptest::prelude::*;

fn approx(a: f64, b: f64) -> bool {
    (a - b).abs() < 1e-6
}

#[test]
fn test_rectangle_outline_in_pixels() {
    let frame = ImageFrame::new(1000, 500, 10e-6, 5e-6);
    let pattern = Pattern::new(PatternShape::Rectangle(RectangleShape::new(
        Point::new(0.0, 0.0),
        2e-6,
        1e-6,
    )));

    let center = frame.to_pixel(pattern.center());
    assert!(approx(center.x, 500.0) && approx(center.y, 250.0));

    let corners: Vec<Point> = pattern
        .vertices()
        .into_iter()
        .map(|p| frame.to_pixel(p))
        .collect();
    assert_eq!(corners.len(), 4);
    for corner in &corners {
        assert!(approx(corner.x, 400.0) || approx(corner.x, 600.0), "{:?}", corner);
        assert!(approx(corner.y, 200.0) || approx(corner.y, 300.0), "{:?}", corner);
    }
    // bottom-left in metric space is the lower-left corner on screen
    assert!(approx(corners[0].x, 400.0) && approx(corners[0].y, 300.0));
}

#[test]
fn test_per_axis_scales() {
    // 10 nm pixels horizontally, 20 nm vertically
    let p = metric_to_pixel(Point::new(1e-6, 1e-6), 1000, 500, 10e-6, 10e-6);
    assert!(approx(p.x, 600.0));
    assert!(approx(p.y, 200.0));
}

#[test]
fn test_tracking_area_quadrant() {
    let rect = MetricRect::new(0.0, 2.5e-6, 5e-6, 0.0);
    let rel = rect_to_relative(&rect, 10e-6, 5e-6);
    assert!(approx(rel.left, 0.5));
    assert!(approx(rel.top, 0.0));
    assert!(approx(rel.width, 0.5));
    assert!(approx(rel.height, 0.5));
}

proptest! {
    #[test]
    fn metric_pixel_round_trip(
        width in 64u32..8192,
        height in 64u32..8192,
        fov_w_um in 1.0f64..2000.0,
        aspect in 0.25f64..4.0,
        fx in -0.5f64..0.5,
        fy in -0.5f64..0.5,
    ) {
        let fov_w = fov_w_um * 1e-6;
        let fov_h = fov_w * aspect;
        let point = Point::new(fx * fov_w, fy * fov_h);

        let pixel = metric_to_pixel(point, width, height, fov_w, fov_h);
        let back = pixel_to_metric(pixel, width, height, fov_w, fov_h);

        let pitch_x = fov_w / f64::from(width);
        let pitch_y = fov_h / f64::from(height);
        prop_assert!((back.x - point.x).abs() <= pitch_x);
        prop_assert!((back.y - point.y).abs() <= pitch_y);

        // Integer pixel rounding still stays within one pixel.
        let rounded = Point::new(pixel.x.round(), pixel.y.round());
        let back = pixel_to_metric(rounded, width, height, fov_w, fov_h);
        prop_assert!((back.x - point.x).abs() <= pitch_x);
        prop_assert!((back.y - point.y).abs() <= pitch_y);
    }

    #[test]
    fn tracking_area_inside_fov_is_relative_unit(
        fov_w_um in 1.0f64..2000.0,
        fov_h_um in 1.0f64..2000.0,
        a in 0.0f64..1.0,
        b in 0.0f64..1.0,
        c in 0.0f64..1.0,
        d in 0.0f64..1.0,
    ) {
        let fov_w = fov_w_um * 1e-6;
        let fov_h = fov_h_um * 1e-6;
        let (x0, x1) = (a.min(b), a.max(b));
        let (y0, y1) = (c.min(d), c.max(d));
        let rect = MetricRect::new(
            (x0 - 0.5) * fov_w,
            (y1 - 0.5) * fov_h,
            (x1 - 0.5) * fov_w,
            (y0 - 0.5) * fov_h,
        );

        let rel = rect_to_relative(&rect, fov_w, fov_h);
        prop_assert!(rel.is_within_unit(), "{:?}", rel);
    }
}
