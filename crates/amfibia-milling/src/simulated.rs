//! Simulated microscope for development without hardware.
//!
//! Images are rendered from a deterministic texture fixed to the sample,
//! so moving the stage or the beam shift moves the image content the way a
//! real instrument would and alignment can converge against it. Milling
//! "runs" for the estimated pattern time, capped to a few seconds.

use amfibia_core::{HardwareError, HardwareResult, Resolution, StageCoordinates};
use amfibia_designer::model::Pattern;
use amfibia_designer::reference::ReferenceImage;
use async_trait::async_trait;
use image::{GrayImage, Luma};
use parking_lot::Mutex;
use std::time::Duration;
use tokio::time::Instant;

use crate::driver::{ImageRequest, Microscope, PatterningState, ScanningConditions};

/// Beam currents offered by the simulator, in amperes.
pub const SIMULATED_CURRENTS_A: [f64; 10] = [
    1e-12, 1e-11, 5e-11, 1e-10, 3e-10, 1e-9, 3e-9, 15e-9, 50e-9, 65e-9,
];

/// Feature sizes of the sample texture, in meters.
const TEXTURE_CELLS_M: [f64; 2] = [2e-6, 0.5e-6];

const MAX_SIMULATED_MILLING: Duration = Duration::from_secs(5);

#[derive(Debug)]
struct SimulatorState {
    stage: StageCoordinates,
    beam_shift: (f64, f64),
    current_a: f64,
    resolution: Resolution,
    horizontal_field_width_m: f64,
    scan_rotation: f64,
    ion_beam_on: bool,
    sleeping: bool,
    patterns: Vec<Pattern>,
    milling_until: Option<Instant>,
}

/// In-process stand-in for the instrument.
#[derive(Debug)]
pub struct SimulatedMicroscope {
    state: Mutex<SimulatorState>,
}

impl Default for SimulatedMicroscope {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedMicroscope {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(SimulatorState {
                stage: StageCoordinates::default(),
                beam_shift: (0.0, 0.0),
                current_a: 1e-11,
                resolution: Resolution::default(),
                horizontal_field_width_m: 100e-6,
                scan_rotation: 0.0,
                ion_beam_on: true,
                sleeping: false,
                patterns: Vec::new(),
                milling_until: None,
            }),
        }
    }

    /// Patterns queued for the next job.
    pub fn queued_patterns(&self) -> Vec<Pattern> {
        self.state.lock().patterns.clone()
    }

    pub fn beam_shift(&self) -> (f64, f64) {
        self.state.lock().beam_shift
    }

    pub fn is_sleeping(&self) -> bool {
        self.state.lock().sleeping
    }

    /// Renders the view centred on `stage − beam_shift`.
    fn render(state: &SimulatorState, request: &ImageRequest) -> ReferenceImage {
        let full_w = request.resolution.width.max(1);
        let full_h = request.resolution.height.max(1);
        let pitch = state.horizontal_field_width_m / f64::from(full_w);
        let fov_h = pitch * f64::from(full_h);

        let (x0, y0, w, h) = match &request.reduced_area {
            Some(area) => {
                let x0 = fraction_to_px(area.left, full_w).min(full_w - 1);
                let y0 = fraction_to_px(area.top, full_h).min(full_h - 1);
                let w = fraction_to_px(area.width, full_w).clamp(1, full_w - x0);
                let h = fraction_to_px(area.height, full_h).clamp(1, full_h - y0);
                (x0, y0, w, h)
            }
            None => (0, 0, full_w, full_h),
        };

        let center_x = state.stage.x - state.beam_shift.0;
        let center_y = state.stage.y - state.beam_shift.1;
        let half_w = f64::from(full_w) / 2.0;
        let half_h = f64::from(full_h) / 2.0;

        let raster = GrayImage::from_fn(w, h, |px, py| {
            let sx = (f64::from(x0 + px) + 0.5 - half_w) * pitch;
            let sy = (half_h - f64::from(y0 + py) - 0.5) * pitch;
            Luma([sample_texture(center_x + sx, center_y + sy)])
        });

        ReferenceImage::new(
            raster,
            state.horizontal_field_width_m * f64::from(w) / f64::from(full_w),
            fov_h * f64::from(h) / f64::from(full_h),
        )
    }
}

fn fraction_to_px(fraction: f64, size: u32) -> u32 {
    if !fraction.is_finite() || fraction <= 0.0 {
        return 0;
    }
    (fraction * f64::from(size)).min(f64::from(size)) as u32
}

fn lattice_value(i: i64, j: i64, octave: u64) -> f64 {
    let mut h = (i as u64).wrapping_mul(0x9e37_79b9_7f4a_7c15)
        ^ (j as u64).wrapping_mul(0xc2b2_ae3d_27d4_eb4f)
        ^ octave.wrapping_mul(0x1656_67b1_9e37_79f9);
    h ^= h >> 31;
    h = h.wrapping_mul(0xbf58_476d_1ce4_e5b9);
    h ^= h >> 29;
    (h % 1024) as f64 / 1023.0
}

/// Bilinear value noise at sample coordinates `(x, y)` in meters.
fn sample_texture(x: f64, y: f64) -> u8 {
    let mut value = 0.0;
    let mut weight = 0.0;
    for (octave, cell) in TEXTURE_CELLS_M.iter().enumerate() {
        let gx = x / cell;
        let gy = y / cell;
        let (i, j) = (gx.floor(), gy.floor());
        let (fx, fy) = (gx - i, gy - j);
        let (i, j) = (i as i64, j as i64);
        let octave = octave as u64;
        let top = lattice_value(i, j, octave) * (1.0 - fx) + lattice_value(i + 1, j, octave) * fx;
        let bottom =
            lattice_value(i, j + 1, octave) * (1.0 - fx) + lattice_value(i + 1, j + 1, octave) * fx;
        let amplitude = 1.0 / (octave as f64 + 1.0);
        value += (top * (1.0 - fy) + bottom * fy) * amplitude;
        weight += amplitude;
    }
    (value / weight * 255.0).round().clamp(0.0, 255.0) as u8
}

#[async_trait]
impl Microscope for SimulatedMicroscope {
    async fn stage_position(&self) -> HardwareResult<StageCoordinates> {
        Ok(self.state.lock().stage)
    }

    async fn move_stage_absolute(&self, coordinates: StageCoordinates) -> HardwareResult<()> {
        tracing::debug!("Simulated stage move to {}", coordinates);
        self.state.lock().stage = coordinates;
        Ok(())
    }

    async fn move_stage_relative(&self, dx_m: f64, dy_m: f64) -> HardwareResult<()> {
        let mut state = self.state.lock();
        state.stage.x += dx_m;
        state.stage.y += dy_m;
        Ok(())
    }

    async fn acquire_image(&self, request: &ImageRequest) -> HardwareResult<ReferenceImage> {
        let state = self.state.lock();
        if !state.ion_beam_on || state.sleeping {
            return Err(HardwareError::ImageCaptureFailed {
                reason: "ion beam is off".to_string(),
            });
        }
        Ok(Self::render(&state, request))
    }

    async fn available_beam_currents(&self) -> HardwareResult<Vec<f64>> {
        Ok(SIMULATED_CURRENTS_A.to_vec())
    }

    async fn set_beam_current(&self, current_a: f64) -> HardwareResult<()> {
        if !(current_a.is_finite() && current_a > 0.0) {
            return Err(HardwareError::BeamControl {
                reason: format!("invalid current {}", current_a),
            });
        }
        self.state.lock().current_a = current_a;
        Ok(())
    }

    async fn set_beam_shift(&self, x_m: f64, y_m: f64) -> HardwareResult<()> {
        self.state.lock().beam_shift = (x_m, y_m);
        Ok(())
    }

    async fn shift_beam_by(&self, dx_m: f64, dy_m: f64) -> HardwareResult<()> {
        let mut state = self.state.lock();
        state.beam_shift.0 += dx_m;
        state.beam_shift.1 += dy_m;
        Ok(())
    }

    async fn scan_rotation(&self) -> HardwareResult<f64> {
        Ok(self.state.lock().scan_rotation)
    }

    async fn select_ion_view(&self) -> HardwareResult<()> {
        Ok(())
    }

    async fn run_auto_contrast_brightness(&self) -> HardwareResult<()> {
        Ok(())
    }

    async fn scanning_conditions(&self) -> HardwareResult<ScanningConditions> {
        let state = self.state.lock();
        Ok(ScanningConditions {
            resolution: state.resolution,
            horizontal_field_width_m: state.horizontal_field_width_m,
            beam_current_a: state.current_a,
        })
    }

    async fn set_scanning_conditions(&self, conditions: &ScanningConditions) -> HardwareResult<()> {
        let mut state = self.state.lock();
        state.resolution = conditions.resolution;
        state.horizontal_field_width_m = conditions.horizontal_field_width_m;
        state.current_a = conditions.beam_current_a;
        Ok(())
    }

    async fn set_scanning_resolution(&self, resolution: Resolution) -> HardwareResult<()> {
        self.state.lock().resolution = resolution;
        Ok(())
    }

    async fn set_horizontal_field_width(&self, width_m: f64) -> HardwareResult<()> {
        if !(width_m.is_finite() && width_m > 0.0) {
            return Err(HardwareError::Other {
                message: format!("invalid field width {}", width_m),
            });
        }
        self.state.lock().horizontal_field_width_m = width_m;
        Ok(())
    }

    async fn ion_beam_on(&self) -> HardwareResult<()> {
        let mut state = self.state.lock();
        state.ion_beam_on = true;
        state.sleeping = false;
        Ok(())
    }

    async fn enter_sleep_mode(&self) -> HardwareResult<()> {
        tracing::debug!("Simulated instrument asleep");
        let mut state = self.state.lock();
        state.sleeping = true;
        state.ion_beam_on = false;
        state.stage = StageCoordinates::default();
        Ok(())
    }

    async fn create_pattern(&self, pattern: &Pattern) -> HardwareResult<()> {
        self.state.lock().patterns.push(pattern.clone());
        Ok(())
    }

    async fn clear_patterns(&self) -> HardwareResult<()> {
        self.state.lock().patterns.clear();
        Ok(())
    }

    async fn start_milling(&self) -> HardwareResult<()> {
        let mut state = self.state.lock();
        if state.patterns.is_empty() {
            return Err(HardwareError::Patterning {
                reason: "no patterns queued".to_string(),
            });
        }
        let estimate: f64 = state.patterns.iter().map(Pattern::estimated_time_s).sum();
        let duration = Duration::from_secs_f64(estimate.max(0.0)).min(MAX_SIMULATED_MILLING);
        state.milling_until = Some(Instant::now() + duration);
        Ok(())
    }

    async fn poll_milling_state(&self) -> HardwareResult<PatterningState> {
        let mut state = self.state.lock();
        match state.milling_until {
            Some(until) if Instant::now() < until => Ok(PatterningState::Running),
            _ => {
                state.milling_until = None;
                Ok(PatterningState::Idle)
            }
        }
    }

    async fn stop_milling(&self) -> HardwareResult<()> {
        self.state.lock().milling_until = None;
        Ok(())
    }
}
