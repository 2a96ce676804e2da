use amfibia_core::{
    AppEvent, EventBus, EventCategory, EventFilter, MilledStatus, ProjectError, ProjectEvent,
    StageCoordinates, UserStatus,
};
use amfibia_designer::model::{Pattern, PatternShape, Point, RectangleShape};
use amfibia_designer::{MetricRect, Position, PositionStatus, Project, ReferenceImage};
use image::GrayImage;
use std::sync::{Arc, Mutex};

fn position_with_image() -> Position {
    let image = ReferenceImage::new(GrayImage::new(1000, 500), 10e-6, 5e-6);
    Position::new(StageCoordinates::new(1e-3, 2e-3, 0.0, 0.0, 0.0)).with_reference_image(image)
}

fn rectangle_at(x: f64, y: f64) -> Pattern {
    Pattern::new(PatternShape::Rectangle(RectangleShape::new(
        Point::new(x, y),
        1e-6,
        1e-6,
    )))
}

#[test]
fn test_deleting_last_pattern_prunes_group() {
    let mut project = Project::new();
    let pos = project.add_position(position_with_image()).unwrap();
    let g0 = project.add_group(pos).unwrap();
    let g1 = project.add_group(pos).unwrap();
    let keep = project.add_pattern(pos, g0, rectangle_at(0.0, 0.0)).unwrap();
    let only = project.add_pattern(pos, g1, rectangle_at(1e-6, 0.0)).unwrap();

    assert_eq!(project.delete_patterns(pos, &[only]).unwrap(), 1);

    let position = project.position(pos).unwrap();
    assert_eq!(position.groups().len(), 1);
    assert!(position.groups()[0].contains(keep));
}

#[test]
fn test_edits_rejected_during_run() {
    let mut project = Project::new();
    let pos = project.add_position(position_with_image()).unwrap();
    let group = project.add_group(pos).unwrap();
    let id = project.add_pattern(pos, group, rectangle_at(0.0, 0.0)).unwrap();

    let guard = project.lock_editing().unwrap();
    assert!(matches!(
        project.delete_patterns(pos, &[id]),
        Err(ProjectError::EditingLocked)
    ));
    assert!(matches!(
        project.set_group_current(pos, group, 1e-9),
        Err(ProjectError::EditingLocked)
    ));
    // the run itself may still advance statuses
    project
        .advance_group_status(pos, group, MilledStatus::Busy)
        .unwrap();
    drop(guard);

    assert_eq!(project.delete_patterns(pos, &[id]).unwrap(), 1);
}

#[test]
fn test_copy_groups_resets_status() {
    let mut project = Project::new();
    let src = project.add_position(position_with_image()).unwrap();
    let dst = project.add_position(position_with_image()).unwrap();
    let group = project.add_group(src).unwrap();
    project.add_pattern(src, group, rectangle_at(0.0, 0.0)).unwrap();
    project.set_group_current(src, group, 15e-9).unwrap();
    project.set_group_status(src, group, UserStatus::Done).unwrap();

    assert_eq!(project.copy_groups(src, dst).unwrap(), 1);

    let copied = &project.position(dst).unwrap().groups()[0];
    assert_eq!(copied.milled_status(), MilledStatus::Pending);
    assert_eq!(copied.milling_current, 15e-9);
    assert_eq!(project.position(src).unwrap().status(), PositionStatus::Done);
    assert_eq!(project.position(dst).unwrap().status(), PositionStatus::Pending);
}

#[test]
fn test_pixel_drag_updates_metric_pattern() {
    let mut project = Project::new();
    let pos = project.add_position(position_with_image()).unwrap();
    let group = project.add_group(pos).unwrap();
    let id = project.add_pattern(pos, group, rectangle_at(0.0, 0.0)).unwrap();

    let dragged: Vec<Point> = project.position(pos).unwrap().groups()[group]
        .get(id)
        .unwrap()
        .pixel_vertices()
        .iter()
        .map(|p| Point::new(p.x, p.y - 100.0))
        .collect();
    project.move_pattern_vertices(pos, id, &dragged).unwrap();

    let center = project.position(pos).unwrap().groups()[group]
        .get(id)
        .unwrap()
        .pattern()
        .center();
    // 100 px up at 10 nm per pixel
    assert!(center.x.abs() < 1e-12);
    assert!((center.y - 1e-6).abs() < 1e-12);
}

#[test]
fn test_update_pattern_refreshes_outline() {
    let mut project = Project::new();
    let pos = project.add_position(position_with_image()).unwrap();
    let group = project.add_group(pos).unwrap();
    let id = project.add_pattern(pos, group, rectangle_at(0.0, 0.0)).unwrap();

    project
        .update_pattern(pos, id, |p| {
            if let PatternShape::Rectangle(rect) = &mut p.shape {
                rect.width = 4e-6;
            }
        })
        .unwrap();

    let pattern = project.position(pos).unwrap().groups()[group].get(id).unwrap().clone();
    let xs: Vec<f64> = pattern.pixel_vertices().iter().map(|p| p.x).collect();
    let span = xs.iter().cloned().fold(f64::MIN, f64::max) - xs.iter().cloned().fold(f64::MAX, f64::min);
    assert!((span - 400.0).abs() < 1e-6);

    assert!(matches!(
        project.update_pattern(pos, rectangle_at(0.0, 0.0).id(), |_| {}),
        Err(ProjectError::PatternNotFound { .. })
    ));
}

#[test]
fn test_project_events() {
    let bus = Arc::new(EventBus::new());
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    bus.subscribe(
        EventFilter::Categories(vec![EventCategory::Project]),
        move |event| sink.lock().unwrap().push(event),
    );

    let mut project = Project::new().with_event_bus(bus.clone());
    let pos = project.add_position(position_with_image()).unwrap();
    {
        let _guard = project.lock_editing().unwrap();
    }

    assert_eq!(
        *seen.lock().unwrap(),
        vec![
            AppEvent::Project(ProjectEvent::PositionAdded { index: pos }),
            AppEvent::Project(ProjectEvent::EditingLocked { locked: true }),
            AppEvent::Project(ProjectEvent::EditingLocked { locked: false }),
        ]
    );
}

#[test]
fn test_tracking_area_must_fit_the_field_of_view() {
    let mut project = Project::new();
    let pos = project.add_position(position_with_image()).unwrap();

    let inside = MetricRect::centered(Point::new(2e-6, 0.0), 4e-6, 2e-6);
    project.set_tracking_area(pos, Some(inside)).unwrap();

    // 10 µm field: a 4 µm box centred at x = 4 µm reaches x = 6 µm.
    let outside = MetricRect::centered(Point::new(4e-6, 0.0), 4e-6, 2e-6);
    let err = project.set_tracking_area(pos, Some(outside)).unwrap_err();
    assert!(matches!(err, ProjectError::InvalidValue { .. }));
    assert_eq!(project.position(pos).unwrap().tracking_area, Some(inside));

    project.set_tracking_area(pos, None).unwrap();
    assert!(project.position(pos).unwrap().tracking_area.is_none());
}
