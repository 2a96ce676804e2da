//! Patterning sub-loop: queue the patterns of one group, start the job and
//! wait for it to finish.

use amfibia_core::HardwareResult;
use amfibia_designer::model::Pattern;
use std::time::Duration;

use crate::cancel::CancellationFlag;
use crate::driver::{Microscope, PatterningState};

/// How a patterning job ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatterningOutcome {
    Completed,
    /// Cancelled before the job started, or stopped while running.
    Stopped,
}

/// Mills `patterns` and waits until the instrument reports idle.
///
/// Depths are clamped to `minimum_depth_m` before they reach the
/// instrument. Nothing is started when `cancel` is already set. The state
/// is polled every `poll_interval`; on cancellation the job is stopped.
pub async fn mill_patterns(
    microscope: &dyn Microscope,
    patterns: &[Pattern],
    minimum_depth_m: f64,
    poll_interval: Duration,
    cancel: &CancellationFlag,
) -> HardwareResult<PatterningOutcome> {
    microscope.clear_patterns().await?;
    for pattern in patterns {
        microscope
            .create_pattern(&pattern.for_device(minimum_depth_m))
            .await?;
    }
    tracing::debug!("Created {} patterns", patterns.len());

    if cancel.is_cancelled() {
        tracing::info!("Cancelled before patterning started");
        return Ok(PatterningOutcome::Stopped);
    }
    microscope.start_milling().await?;
    loop {
        if cancel.is_cancelled() {
            tracing::info!("Stopping patterning on cancel");
            microscope.stop_milling().await?;
            return Ok(PatterningOutcome::Stopped);
        }
        if microscope.poll_milling_state().await? == PatterningState::Idle {
            return Ok(PatterningOutcome::Completed);
        }
        cancel.sleep(poll_interval).await;
    }
}
