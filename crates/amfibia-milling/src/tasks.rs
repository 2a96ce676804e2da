//! Task list construction
//!
//! Flattens positions and their pattern groups into the ordered list of
//! milling tasks for a run. Tasks are ordered by sequential group first and
//! position second, so every position finishes sequential group 0 before
//! any position starts group 1:
//!
//! ```text
//! for sg in 0..=max_sequential_group
//!     for position in positions
//!         for group in position.groups where group.sequential_group == sg
//!             and group has patterns and group is pending
//! ```

use amfibia_core::StageCoordinates;
use amfibia_designer::position::Position;
use amfibia_designer::reference::ReferenceImage;
use amfibia_designer::transform::RelativeRect;

/// One pattern group to mill, with everything the run needs to reach it.
#[derive(Debug, Clone)]
pub struct MillingTask {
    pub position_index: usize,
    pub group_index: usize,
    pub coordinates: StageCoordinates,
    /// Tracking area as fractions of the reference image.
    pub tracking_area: RelativeRect,
    pub reference_image: ReferenceImage,
    /// Reference image cropped to the tracking area.
    pub tracking_image: ReferenceImage,
    pub sequential_group: u32,
    pub milling_current: f64,
    pub delay_s: u64,
    pub estimated_time_s: f64,
    /// Whether the stage move and coarse alignment for this task worked.
    /// Only meaningful during a run.
    pub move_successful: bool,
}

/// Builds the ordered task list.
///
/// Done and failed groups, empty groups and positions without a reference
/// image are never scheduled.
pub fn build_task_list(positions: &[Position]) -> Vec<MillingTask> {
    let max_sequential_group = positions
        .iter()
        .flat_map(|p| p.groups())
        .filter(|g| !g.is_empty())
        .map(|g| g.sequential_group)
        .max();
    let Some(max_sequential_group) = max_sequential_group else {
        return Vec::new();
    };

    for (index, position) in positions.iter().enumerate() {
        let has_pending = position
            .groups()
            .iter()
            .any(|g| g.is_pending() && !g.is_empty());
        if has_pending && position.reference_image().is_none() {
            tracing::warn!(
                "Position {} has pending patterns but no reference image; skipped",
                index
            );
        }
    }

    let mut tasks = Vec::new();
    for sequential_group in 0..=max_sequential_group {
        for (position_index, position) in positions.iter().enumerate() {
            let Some(reference) = position.reference_image() else {
                continue;
            };
            let tracking_area = position
                .relative_tracking_area()
                .unwrap_or_else(RelativeRect::full_frame);
            let tracking_image = position
                .tracking_reference()
                .unwrap_or_else(|| reference.clone());

            for (group_index, group) in position.groups().iter().enumerate() {
                if group.sequential_group != sequential_group
                    || group.is_empty()
                    || !group.is_pending()
                {
                    continue;
                }
                tasks.push(MillingTask {
                    position_index,
                    group_index,
                    coordinates: position.coordinates,
                    tracking_area,
                    reference_image: reference.clone(),
                    tracking_image: tracking_image.clone(),
                    sequential_group,
                    milling_current: group.milling_current,
                    delay_s: group.delay_s,
                    estimated_time_s: group.estimated_time_s(),
                    move_successful: false,
                });
            }
        }
    }

    tracing::debug!("Built {} milling tasks", tasks.len());
    tasks
}

/// Time summary of a task list.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PlanDuration {
    /// Sum of the milling estimates.
    pub milling_s: f64,
    /// Sum of all delays.
    pub delay_s: f64,
    /// Delay before the first task.
    pub first_delay_s: f64,
}

impl PlanDuration {
    pub fn total_s(&self) -> f64 {
        self.milling_s + self.delay_s
    }
}

pub fn plan_duration(tasks: &[MillingTask]) -> PlanDuration {
    PlanDuration {
        milling_s: tasks.iter().map(|t| t.estimated_time_s).sum(),
        delay_s: tasks.iter().map(|t| t.delay_s as f64).sum(),
        first_delay_s: tasks.first().map(|t| t.delay_s as f64).unwrap_or_default(),
    }
}
