//! Alignment Engine
//!
//! Brings the live ion-beam view onto a reference image by repeated
//! capture, correlation and correction:
//!
//! ```text
//! INIT -> CAPTURE -> CORRELATE -> CONVERGED
//!            ^           |
//!            +-- CORRECT +-> budget exhausted -> ABORTED
//! ```
//!
//! Small residuals are corrected with beam shift. Residuals longer than
//! the stage-move threshold move the stage instead and reset the beam
//! shift. Every capture can be saved as TIFF for later inspection.

use amfibia_core::{
    format_current, AlignmentEvent, AppEvent, CorrectionKind, EventBus, HardwareError,
    MillingError, Resolution,
};
use amfibia_designer::reference::ReferenceImage;
use amfibia_designer::transform::RelativeRect;
use amfibia_settings::AlignmentSettings;
use chrono::Local;
use image::imageops;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::cancel::CancellationFlag;
use crate::driver::{ImageRequest, Microscope};
use crate::matcher::{FeatureMatch, FeatureMatcher};

/// Largest per-axis size difference, in pixels, that is cropped away
/// instead of aborting.
pub const MAX_SIZE_DRIFT_PX: u32 = 1;

/// One alignment call.
#[derive(Debug, Clone)]
pub struct AlignmentRequest<'a> {
    /// Position index, used for capture file names.
    pub position: usize,
    pub sequential_group: u32,
    /// Image the live view is aligned to.
    pub reference: &'a ReferenceImage,
    /// Full-frame scanning resolution.
    pub resolution: Resolution,
    pub horizontal_field_width_m: f64,
    pub dwell_time_s: f64,
    pub current_a: f64,
    pub reduced_area: Option<RelativeRect>,
    /// Zero the beam shift before the first capture.
    pub reset_beam_shift: bool,
}

impl<'a> AlignmentRequest<'a> {
    /// Full-frame alignment to `reference`, starting from zero beam shift.
    pub fn full_frame(reference: &'a ReferenceImage, current_a: f64, dwell_time_s: f64) -> Self {
        Self {
            position: 0,
            sequential_group: 0,
            reference,
            resolution: Resolution::new(reference.width(), reference.height()),
            horizontal_field_width_m: reference.fov_width_m,
            dwell_time_s,
            current_a,
            reduced_area: None,
            reset_beam_shift: true,
        }
    }

    /// Reduced-area alignment to `tracking`, the crop of `full` covering
    /// `area`. Keeps the beam shift found so far.
    pub fn reduced_area(
        full: &ReferenceImage,
        tracking: &'a ReferenceImage,
        area: RelativeRect,
        current_a: f64,
        dwell_time_s: f64,
    ) -> Self {
        let reduced_area = (area != RelativeRect::full_frame()).then_some(area);
        Self {
            position: 0,
            sequential_group: 0,
            reference: tracking,
            resolution: Resolution::new(full.width(), full.height()),
            horizontal_field_width_m: full.fov_width_m,
            dwell_time_s,
            current_a,
            reduced_area,
            reset_beam_shift: false,
        }
    }

    pub fn at(mut self, position: usize, sequential_group: u32) -> Self {
        self.position = position;
        self.sequential_group = sequential_group;
        self
    }
}

/// How an alignment call ended.
#[derive(Debug, Clone, PartialEq)]
pub enum AlignmentOutcome {
    Converged {
        captures: u32,
        confidence: f64,
        residual_m: f64,
    },
    BudgetExhausted {
        captures: u32,
    },
    /// A capture differed from the reference by more than one pixel.
    SizeMismatch {
        expected: (u32, u32),
        actual: (u32, u32),
    },
    HardwareFailure(HardwareError),
    Cancelled,
}

impl AlignmentOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, AlignmentOutcome::Converged { .. })
    }

    pub fn captures(&self) -> u32 {
        match self {
            AlignmentOutcome::Converged { captures, .. }
            | AlignmentOutcome::BudgetExhausted { captures } => *captures,
            _ => 0,
        }
    }

    /// Short description for logs and task failure reasons.
    pub fn describe(&self) -> String {
        match self {
            AlignmentOutcome::Converged {
                captures,
                confidence,
                residual_m,
            } => format!(
                "converged after {} captures (confidence {:.4}, residual {:.3} µm)",
                captures,
                confidence,
                residual_m * 1e6
            ),
            AlignmentOutcome::BudgetExhausted { captures } => {
                format!("not converged after {} captures", captures)
            }
            AlignmentOutcome::SizeMismatch { expected, actual } => format!(
                "image size {}x{} does not match reference {}x{}",
                actual.0, actual.1, expected.0, expected.1
            ),
            AlignmentOutcome::HardwareFailure(e) => e.to_string(),
            AlignmentOutcome::Cancelled => "cancelled".to_string(),
        }
    }
}

/// Runs alignment calls against a microscope.
pub struct AlignmentEngine {
    settings: AlignmentSettings,
    matcher: Arc<dyn FeatureMatcher>,
    working_dir: Option<PathBuf>,
    events: Option<Arc<EventBus>>,
}

impl AlignmentEngine {
    pub fn new(settings: AlignmentSettings, matcher: Arc<dyn FeatureMatcher>) -> Self {
        Self {
            settings,
            matcher,
            working_dir: None,
            events: None,
        }
    }

    /// Save captures under `<dir>/alignment`.
    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn with_event_bus(mut self, events: Arc<EventBus>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn settings(&self) -> &AlignmentSettings {
        &self.settings
    }

    fn notify(&self, event: AlignmentEvent) {
        if let Some(events) = &self.events {
            events.notify(AppEvent::Alignment(event));
        }
    }

    /// Aligns the live view to `request.reference`.
    ///
    /// Hardware variance ends up in the returned outcome. Only contract
    /// violations are errors.
    pub async fn align(
        &self,
        microscope: &dyn Microscope,
        request: &AlignmentRequest<'_>,
        cancel: &CancellationFlag,
    ) -> Result<AlignmentOutcome, MillingError> {
        if request.reference.is_empty() {
            return Err(MillingError::EmptyReferenceImage);
        }
        if self.settings.save_captures && self.working_dir.is_none() {
            return Err(MillingError::NoWorkingDirectory);
        }

        self.notify(AlignmentEvent::Started {
            position: request.position,
            sequential_group: request.sequential_group,
            current_a: request.current_a,
            reduced_area: request.reduced_area.is_some(),
        });
        tracing::info!(
            "Aligning position {} at {}{}",
            request.position,
            format_current(request.current_a),
            if request.reduced_area.is_some() { " (reduced area)" } else { "" }
        );

        let outcome = match self.run(microscope, request, cancel).await {
            Ok(outcome) => outcome,
            Err(e) => AlignmentOutcome::HardwareFailure(e),
        };

        if outcome.is_success() {
            tracing::info!("Alignment {}", outcome.describe());
        } else {
            tracing::warn!("Alignment failed: {}", outcome.describe());
        }
        self.notify(AlignmentEvent::Finished {
            converged: outcome.is_success(),
            captures: outcome.captures(),
        });
        Ok(outcome)
    }

    async fn run(
        &self,
        microscope: &dyn Microscope,
        request: &AlignmentRequest<'_>,
        cancel: &CancellationFlag,
    ) -> Result<AlignmentOutcome, HardwareError> {
        let reference = request.reference;

        microscope.select_ion_view().await?;
        microscope.set_beam_current(request.current_a).await?;
        microscope
            .set_horizontal_field_width(request.horizontal_field_width_m)
            .await?;
        if request.reset_beam_shift {
            microscope.set_beam_shift(0.0, 0.0).await?;
        }
        if let Err(e) = microscope.run_auto_contrast_brightness().await {
            tracing::warn!("Auto contrast/brightness failed: {}", e);
        }

        let epsilon = self
            .settings
            .residual_epsilon_m
            .unwrap_or_else(|| reference.frame().pixel_pitch_m().0 / 2.0);
        let image_request = ImageRequest {
            resolution: request.resolution,
            dwell_time_s: request.dwell_time_s,
            reduced_area: request.reduced_area,
        };

        let max_iterations = self.settings.max_iterations;
        for iteration in 0..max_iterations {
            if cancel.is_cancelled() {
                return Ok(AlignmentOutcome::Cancelled);
            }

            let captured = microscope.acquire_image(&image_request).await?;
            let captures = iteration + 1;
            self.save_capture(&captured, request, iteration);

            let (live, matched_reference) = match match_sizes(&captured, reference) {
                Ok(pair) => pair,
                Err(outcome) => return Ok(outcome),
            };

            let found: FeatureMatch = self.matcher.locate(&live, &matched_reference)?;
            let residual_m = found.residual_m();
            self.notify(AlignmentEvent::Measured {
                iteration,
                confidence: found.confidence,
                residual_m,
            });
            tracing::debug!(
                "Capture {}: confidence {:.4}, residual {:.3} µm",
                iteration,
                found.confidence,
                residual_m * 1e6
            );

            if found.confidence >= self.settings.confidence_threshold || residual_m < epsilon {
                return Ok(AlignmentOutcome::Converged {
                    captures,
                    confidence: found.confidence,
                    residual_m,
                });
            }

            if captures < max_iterations {
                self.correct(microscope, &found).await?;
            }
        }

        Ok(AlignmentOutcome::BudgetExhausted {
            captures: max_iterations,
        })
    }

    /// Moves the view by the negated offset.
    async fn correct(
        &self,
        microscope: &dyn Microscope,
        found: &FeatureMatch,
    ) -> Result<(), HardwareError> {
        let (cx, cy) = (-found.offset_x_m, -found.offset_y_m);

        if cx.hypot(cy) > self.settings.stage_move_threshold_m {
            // Image axes are the stage axes rotated by the scan rotation;
            // at 0 the stage moves against the correction, at pi with it.
            let rotation = microscope.scan_rotation().await?;
            let (sin, cos) = rotation.sin_cos();
            let dx = -(cx * cos - cy * sin);
            let dy = -(cx * sin + cy * cos);
            microscope.move_stage_relative(dx, dy).await?;
            microscope.set_beam_shift(0.0, 0.0).await?;
            self.notify(AlignmentEvent::Corrected {
                kind: CorrectionKind::StageMove,
                dx_m: dx,
                dy_m: dy,
            });
            tracing::debug!("Stage move by ({:.3}, {:.3}) µm", dx * 1e6, dy * 1e6);
        } else {
            microscope.shift_beam_by(cx, cy).await?;
            self.notify(AlignmentEvent::Corrected {
                kind: CorrectionKind::BeamShift,
                dx_m: cx,
                dy_m: cy,
            });
            tracing::debug!("Beam shift by ({:.3}, {:.3}) µm", cx * 1e6, cy * 1e6);
        }
        Ok(())
    }

    fn save_capture(&self, image: &ReferenceImage, request: &AlignmentRequest<'_>, move_index: u32) {
        if !self.settings.save_captures {
            return;
        }
        let Some(working_dir) = &self.working_dir else {
            return;
        };
        let path = capture_path(
            working_dir,
            request.position,
            request.sequential_group,
            request.current_a,
            move_index,
        );
        let result = path
            .parent()
            .map(std::fs::create_dir_all)
            .transpose()
            .map_err(|e| e.to_string())
            .and_then(|_| image.raster.save(&path).map_err(|e| e.to_string()));
        if let Err(e) = result {
            tracing::warn!("Could not save alignment capture {}: {}", path.display(), e);
        }
    }
}

/// `<dir>/alignment/Position_NN/seq_SS/<timestamp>_<current>_move_<k>.tif`
pub fn capture_path(
    working_dir: &Path,
    position: usize,
    sequential_group: u32,
    current_a: f64,
    move_index: u32,
) -> PathBuf {
    let current = format_current(current_a).replace(' ', "").replace('µ', "u");
    working_dir
        .join("alignment")
        .join(format!("Position_{:02}", position))
        .join(format!("seq_{:02}", sequential_group))
        .join(format!(
            "{}_{}_move_{}.tif",
            Local::now().format("%Y%m%d_%H%M%S"),
            current,
            move_index
        ))
}

/// Crops live and reference to their common size when they differ by at
/// most [`MAX_SIZE_DRIFT_PX`] per axis.
fn match_sizes(
    live: &ReferenceImage,
    reference: &ReferenceImage,
) -> Result<(ReferenceImage, ReferenceImage), AlignmentOutcome> {
    let drift_x = live.width().abs_diff(reference.width());
    let drift_y = live.height().abs_diff(reference.height());
    if drift_x > MAX_SIZE_DRIFT_PX || drift_y > MAX_SIZE_DRIFT_PX {
        return Err(AlignmentOutcome::SizeMismatch {
            expected: (reference.width(), reference.height()),
            actual: (live.width(), live.height()),
        });
    }
    let width = live.width().min(reference.width());
    let height = live.height().min(reference.height());
    Ok((crop_to(live, width, height), crop_to(reference, width, height)))
}

fn crop_to(image: &ReferenceImage, width: u32, height: u32) -> ReferenceImage {
    if image.width() == width && image.height() == height {
        return image.clone();
    }
    let raster = imageops::crop_imm(&image.raster, 0, 0, width, height).to_image();
    ReferenceImage::with_timestamp(
        raster,
        image.fov_width_m * f64::from(width) / f64::from(image.width()),
        image.fov_height_m * f64::from(height) / f64::from(image.height()),
        image.acquired_at,
    )
}
