//! Microscope driver interface
//!
//! Every operation the run loop needs from the instrument. All calls are
//! async and return [`HardwareResult`]; expected instrument variance is a
//! `HardwareError`, never a panic. Calls are not timed out, so a hung
//! driver call blocks the run until it returns.

use amfibia_core::{HardwareResult, Resolution, StageCoordinates};
use amfibia_designer::model::Pattern;
use amfibia_designer::reference::ReferenceImage;
use amfibia_designer::transform::RelativeRect;
use async_trait::async_trait;

/// Parameters of a single ion-beam capture.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImageRequest {
    /// Full-frame scanning resolution.
    pub resolution: Resolution,
    pub dwell_time_s: f64,
    /// Scan only this part of the frame. The returned image covers the
    /// reduced area only.
    pub reduced_area: Option<RelativeRect>,
}

impl ImageRequest {
    pub fn full_frame(resolution: Resolution, dwell_time_s: f64) -> Self {
        Self {
            resolution,
            dwell_time_s,
            reduced_area: None,
        }
    }
}

/// Scan settings that a run changes and restores afterwards.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScanningConditions {
    pub resolution: Resolution,
    pub horizontal_field_width_m: f64,
    pub beam_current_a: f64,
}

/// State of the patterning engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatterningState {
    Running,
    Idle,
}

/// Ion-beam microscope as seen by the alignment engine and the run loop.
///
/// Beam shift and stage moves are in meters. Beam shift is applied to the
/// scan, so shifting by `(dx, dy)` moves image content by `(dx, dy)`.
#[async_trait]
pub trait Microscope: Send + Sync {
    /// Current stage coordinates
    async fn stage_position(&self) -> HardwareResult<StageCoordinates>;

    /// Move the stage to absolute coordinates
    async fn move_stage_absolute(&self, coordinates: StageCoordinates) -> HardwareResult<()>;

    /// Move the stage by `(dx, dy)` in stage axes
    async fn move_stage_relative(&self, dx_m: f64, dy_m: f64) -> HardwareResult<()>;

    /// Acquire an ion-beam image
    async fn acquire_image(&self, request: &ImageRequest) -> HardwareResult<ReferenceImage>;

    /// Beam currents the instrument offers, in amperes
    async fn available_beam_currents(&self) -> HardwareResult<Vec<f64>>;

    async fn set_beam_current(&self, current_a: f64) -> HardwareResult<()>;

    async fn set_beam_shift(&self, x_m: f64, y_m: f64) -> HardwareResult<()>;

    /// Add `(dx, dy)` to the current beam shift
    async fn shift_beam_by(&self, dx_m: f64, dy_m: f64) -> HardwareResult<()>;

    /// Scan rotation in radians
    async fn scan_rotation(&self) -> HardwareResult<f64>;

    /// Make the ion beam quad the active view
    async fn select_ion_view(&self) -> HardwareResult<()>;

    async fn run_auto_contrast_brightness(&self) -> HardwareResult<()>;

    async fn scanning_conditions(&self) -> HardwareResult<ScanningConditions>;

    async fn set_scanning_conditions(&self, conditions: &ScanningConditions)
        -> HardwareResult<()>;

    async fn set_scanning_resolution(&self, resolution: Resolution) -> HardwareResult<()>;

    async fn set_horizontal_field_width(&self, width_m: f64) -> HardwareResult<()>;

    /// Turn the ion beam on, waking the instrument from sleep mode
    async fn ion_beam_on(&self) -> HardwareResult<()>;

    /// Put the instrument to sleep for a long wait
    async fn enter_sleep_mode(&self) -> HardwareResult<()>;

    /// Queue a pattern for the next milling job
    async fn create_pattern(&self, pattern: &Pattern) -> HardwareResult<()>;

    async fn clear_patterns(&self) -> HardwareResult<()>;

    /// Start milling the queued patterns; returns once the job started
    async fn start_milling(&self) -> HardwareResult<()>;

    async fn poll_milling_state(&self) -> HardwareResult<PatterningState>;

    async fn stop_milling(&self) -> HardwareResult<()>;
}
