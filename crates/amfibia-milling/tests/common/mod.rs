#![allow(dead_code)]

use amfibia_core::{
    AppEvent, EventBus, EventFilter, HardwareError, HardwareResult, Resolution, StageCoordinates,
};
use amfibia_designer::model::{Pattern, PatternShape, Point, RectangleShape};
use amfibia_designer::{Position, Project, ReferenceImage};
use amfibia_milling::{
    FeatureMatch, FeatureMatcher, ImageRequest, Microscope, PatterningState, ScanningConditions,
};
use amfibia_settings::Config;
use async_trait::async_trait;
use image::GrayImage;
use std::path::Path;
use std::sync::{Arc, Mutex};

pub const REFERENCE_SIZE: u32 = 100;
pub const REFERENCE_FOV_M: f64 = 10e-6;

/// Records every driver call by name.
pub struct MockMicroscope {
    pub calls: Mutex<Vec<String>>,
    stage: Mutex<StageCoordinates>,
    horizontal_field_width_m: Mutex<f64>,
    /// Captures fail while the stage is at this x coordinate.
    pub fail_capture_at_x: Mutex<Option<f64>>,
    /// Size returned by captures instead of the requested one.
    pub capture_size: Mutex<Option<(u32, u32)>>,
    /// `None` keeps the job running until stopped.
    pub running_polls: Mutex<Option<usize>>,
    polls: Mutex<usize>,
    pub rotation: Mutex<f64>,
    pub currents: Vec<f64>,
}

impl MockMicroscope {
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            stage: Mutex::new(StageCoordinates::default()),
            horizontal_field_width_m: Mutex::new(REFERENCE_FOV_M),
            fail_capture_at_x: Mutex::new(None),
            capture_size: Mutex::new(None),
            running_polls: Mutex::new(Some(1)),
            polls: Mutex::new(0),
            rotation: Mutex::new(0.0),
            currents: vec![1e-11, 1e-10, 1e-9, 15e-9],
        }
    }

    fn record(&self, call: impl Into<String>) {
        self.calls.lock().unwrap().push(call.into());
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    /// Number of calls whose name starts with `prefix`.
    pub fn count(&self, prefix: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.starts_with(prefix))
            .count()
    }
}

fn to_px(fraction: f64, size: u32) -> u32 {
    (fraction.max(0.0) * f64::from(size)).min(f64::from(size)) as u32
}

#[async_trait]
impl Microscope for MockMicroscope {
    async fn stage_position(&self) -> HardwareResult<StageCoordinates> {
        Ok(*self.stage.lock().unwrap())
    }

    async fn move_stage_absolute(&self, coordinates: StageCoordinates) -> HardwareResult<()> {
        self.record(format!("move_stage_absolute({})", coordinates.x));
        *self.stage.lock().unwrap() = coordinates;
        Ok(())
    }

    async fn move_stage_relative(&self, dx_m: f64, dy_m: f64) -> HardwareResult<()> {
        self.record(format!("move_stage_relative({:e},{:e})", dx_m, dy_m));
        let mut stage = self.stage.lock().unwrap();
        stage.x += dx_m;
        stage.y += dy_m;
        Ok(())
    }

    async fn acquire_image(&self, request: &ImageRequest) -> HardwareResult<ReferenceImage> {
        self.record("acquire_image");
        let x = self.stage.lock().unwrap().x;
        if *self.fail_capture_at_x.lock().unwrap() == Some(x) {
            return Err(HardwareError::ImageCaptureFailed {
                reason: "detector error".to_string(),
            });
        }

        let full_w = request.resolution.width;
        let full_h = request.resolution.height;
        let (w, h) = match *self.capture_size.lock().unwrap() {
            Some(size) => size,
            None => match &request.reduced_area {
                Some(area) => (
                    to_px(area.width, full_w).max(1),
                    to_px(area.height, full_h).max(1),
                ),
                None => (full_w, full_h),
            },
        };
        let hfw = *self.horizontal_field_width_m.lock().unwrap();
        let pitch = hfw / f64::from(full_w);
        Ok(ReferenceImage::new(
            GrayImage::new(w, h),
            pitch * f64::from(w),
            pitch * f64::from(h),
        ))
    }

    async fn available_beam_currents(&self) -> HardwareResult<Vec<f64>> {
        self.record("available_beam_currents");
        Ok(self.currents.clone())
    }

    async fn set_beam_current(&self, current_a: f64) -> HardwareResult<()> {
        self.record(format!("set_beam_current({:e})", current_a));
        Ok(())
    }

    async fn set_beam_shift(&self, x_m: f64, y_m: f64) -> HardwareResult<()> {
        self.record(format!("set_beam_shift({:e},{:e})", x_m, y_m));
        Ok(())
    }

    async fn shift_beam_by(&self, dx_m: f64, dy_m: f64) -> HardwareResult<()> {
        self.record(format!("shift_beam_by({:e},{:e})", dx_m, dy_m));
        Ok(())
    }

    async fn scan_rotation(&self) -> HardwareResult<f64> {
        Ok(*self.rotation.lock().unwrap())
    }

    async fn select_ion_view(&self) -> HardwareResult<()> {
        self.record("select_ion_view");
        Ok(())
    }

    async fn run_auto_contrast_brightness(&self) -> HardwareResult<()> {
        self.record("run_auto_contrast_brightness");
        Ok(())
    }

    async fn scanning_conditions(&self) -> HardwareResult<ScanningConditions> {
        self.record("scanning_conditions");
        Ok(ScanningConditions {
            resolution: Resolution::new(768, 512),
            horizontal_field_width_m: 50e-6,
            beam_current_a: 1e-10,
        })
    }

    async fn set_scanning_conditions(&self, conditions: &ScanningConditions) -> HardwareResult<()> {
        self.record(format!("set_scanning_conditions({})", conditions.resolution));
        Ok(())
    }

    async fn set_scanning_resolution(&self, resolution: Resolution) -> HardwareResult<()> {
        self.record(format!("set_scanning_resolution({})", resolution));
        Ok(())
    }

    async fn set_horizontal_field_width(&self, width_m: f64) -> HardwareResult<()> {
        *self.horizontal_field_width_m.lock().unwrap() = width_m;
        Ok(())
    }

    async fn ion_beam_on(&self) -> HardwareResult<()> {
        self.record("ion_beam_on");
        Ok(())
    }

    async fn enter_sleep_mode(&self) -> HardwareResult<()> {
        self.record("enter_sleep_mode");
        *self.stage.lock().unwrap() = StageCoordinates::default();
        Ok(())
    }

    async fn create_pattern(&self, pattern: &Pattern) -> HardwareResult<()> {
        self.record(format!("create_pattern({})", pattern.kind_name()));
        Ok(())
    }

    async fn clear_patterns(&self) -> HardwareResult<()> {
        self.record("clear_patterns");
        Ok(())
    }

    async fn start_milling(&self) -> HardwareResult<()> {
        self.record("start_milling");
        *self.polls.lock().unwrap() = 0;
        Ok(())
    }

    async fn poll_milling_state(&self) -> HardwareResult<PatterningState> {
        let mut polls = self.polls.lock().unwrap();
        *polls += 1;
        match *self.running_polls.lock().unwrap() {
            Some(limit) if *polls > limit => Ok(PatterningState::Idle),
            _ => Ok(PatterningState::Running),
        }
    }

    async fn stop_milling(&self) -> HardwareResult<()> {
        self.record("stop_milling");
        Ok(())
    }
}

/// Returns the same match every time and counts calls.
pub struct MockMatcher {
    pub result: Mutex<FeatureMatch>,
    pub calls: Mutex<usize>,
}

impl MockMatcher {
    pub fn converging() -> Self {
        Self::returning(0.0, 0.0, 1.0)
    }

    pub fn returning(offset_x_m: f64, offset_y_m: f64, confidence: f64) -> Self {
        Self {
            result: Mutex::new(FeatureMatch {
                offset_x_m,
                offset_y_m,
                confidence,
            }),
            calls: Mutex::new(0),
        }
    }

    pub fn call_count(&self) -> usize {
        *self.calls.lock().unwrap()
    }
}

impl FeatureMatcher for MockMatcher {
    fn locate(&self, _live: &ReferenceImage, _reference: &ReferenceImage) -> HardwareResult<FeatureMatch> {
        *self.calls.lock().unwrap() += 1;
        Ok(*self.result.lock().unwrap())
    }
}

pub fn reference_image() -> ReferenceImage {
    ReferenceImage::new(
        GrayImage::new(REFERENCE_SIZE, REFERENCE_SIZE),
        REFERENCE_FOV_M,
        REFERENCE_FOV_M,
    )
}

/// 1 µm square at 10 nm pitch: 10 000 points, 10 ms.
pub fn rectangle() -> Pattern {
    let mut shape = RectangleShape::new(Point::default(), 1e-6, 1e-6);
    shape.pitch_x = 10e-9;
    shape.pitch_y = 10e-9;
    Pattern::new(PatternShape::Rectangle(shape))
}

/// Adds a position at `x` with one single-pattern group per entry of
/// `sequential_groups`, each at 1 nA.
pub fn add_position(project: &mut Project, x: f64, sequential_groups: &[u32]) -> usize {
    let position = project
        .add_position(
            Position::new(StageCoordinates::new(x, 0.0, 0.0, 0.0, 0.0))
                .with_reference_image(reference_image()),
        )
        .unwrap();
    for &sequential_group in sequential_groups {
        let group = project.add_group(position).unwrap();
        project.add_pattern(position, group, rectangle()).unwrap();
        project.set_group_current(position, group, 1e-9).unwrap();
        project
            .set_sequential_group(position, group, sequential_group)
            .unwrap();
    }
    position
}

pub fn config_in(dir: &Path) -> Config {
    let mut config = Config::default();
    config.general.working_directory = Some(dir.to_path_buf());
    config
}

/// Collects every event published on `bus`.
pub fn record_events(bus: &EventBus) -> Arc<Mutex<Vec<AppEvent>>> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    bus.subscribe(EventFilter::All, move |event| sink.lock().unwrap().push(event));
    seen
}
