//! Event type definitions for the event bus.
//!
//! Events are grouped by category. They are cloneable so every subscriber
//! gets its own copy, and serializable for logging.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::data::MilledStatus;

/// Root event enum for all application events
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AppEvent {
    /// Milling run progress
    Milling(MillingEvent),
    /// Alignment progress
    Alignment(AlignmentEvent),
    /// Position and pattern edits
    Project(ProjectEvent),
    /// State snapshot save/load
    Persistence(PersistenceEvent),
    /// Error and diagnostic events
    Error(ErrorEvent),
}

impl AppEvent {
    /// Get the category of this event
    pub fn category(&self) -> EventCategory {
        match self {
            AppEvent::Milling(_) => EventCategory::Milling,
            AppEvent::Alignment(_) => EventCategory::Alignment,
            AppEvent::Project(_) => EventCategory::Project,
            AppEvent::Persistence(_) => EventCategory::Persistence,
            AppEvent::Error(_) => EventCategory::Error,
        }
    }

    /// Get a short description of this event for logging
    pub fn description(&self) -> String {
        match self {
            AppEvent::Milling(e) => e.description(),
            AppEvent::Alignment(e) => e.description(),
            AppEvent::Project(e) => e.description(),
            AppEvent::Persistence(e) => e.description(),
            AppEvent::Error(e) => e.description(),
        }
    }
}

/// Event category for filtering
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventCategory {
    Milling,
    Alignment,
    Project,
    Persistence,
    Error,
}

impl std::fmt::Display for EventCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EventCategory::Milling => write!(f, "Milling"),
            EventCategory::Alignment => write!(f, "Alignment"),
            EventCategory::Project => write!(f, "Project"),
            EventCategory::Persistence => write!(f, "Persistence"),
            EventCategory::Error => write!(f, "Error"),
        }
    }
}

/// Milling run events
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MillingEvent {
    /// The task list was empty; nothing to do.
    NoPendingTasks,
    /// A run was confirmed and is starting.
    RunStarted {
        /// Number of tasks in the run.
        tasks: usize,
    },
    /// Position-mutating controls were disabled or re-enabled.
    ControlsEnabled {
        /// Whether the controls are usable.
        enabled: bool,
    },
    /// A task began.
    TaskStarted {
        /// Index of the task in the run.
        index: usize,
        /// Total number of tasks in the run.
        total: usize,
        /// Position the task belongs to.
        position: usize,
        /// Milling current in amperes.
        current_a: f64,
        /// Delay before milling in seconds.
        delay_s: u64,
    },
    /// A pattern group changed status.
    GroupStatusChanged {
        /// Position index.
        position: usize,
        /// Group index within the position.
        group: usize,
        /// The new status.
        status: MilledStatus,
    },
    /// A task is waiting out its delay.
    DelayStarted {
        /// Delay length in seconds.
        seconds: u64,
        /// Whether the instrument was put to sleep first.
        sleep_mode: bool,
    },
    /// A task ended in failure.
    TaskFailed {
        /// Index of the task in the run.
        index: usize,
        /// What went wrong.
        reason: String,
    },
    /// Cancellation was observed by the run loop.
    Cancelled {
        /// Index of the task that was interrupted.
        index: usize,
    },
    /// The run finished (after cleanup).
    RunFinished {
        /// Tasks that ended done.
        done: usize,
        /// Tasks that ended failed.
        failed: usize,
        /// Whether the run was cancelled.
        cancelled: bool,
    },
}

impl MillingEvent {
    fn description(&self) -> String {
        match self {
            MillingEvent::NoPendingTasks => "No pending milling tasks".to_string(),
            MillingEvent::RunStarted { tasks } => format!("Starting milling with {} tasks", tasks),
            MillingEvent::ControlsEnabled { enabled } => {
                format!("Controls {}", if *enabled { "enabled" } else { "disabled" })
            }
            MillingEvent::TaskStarted {
                index,
                total,
                position,
                current_a,
                delay_s,
            } => format!(
                "Task {}/{} at position {} ({:.3e} A, delay {} s)",
                index + 1,
                total,
                position,
                current_a,
                delay_s
            ),
            MillingEvent::GroupStatusChanged {
                position,
                group,
                status,
            } => format!("Position {} group {} -> {}", position, group, status),
            MillingEvent::DelayStarted {
                seconds,
                sleep_mode,
            } => {
                if *sleep_mode {
                    format!("Waiting {} s in sleep mode", seconds)
                } else {
                    format!("Waiting {} s", seconds)
                }
            }
            MillingEvent::TaskFailed { index, reason } => {
                format!("Task {} failed: {}", index + 1, reason)
            }
            MillingEvent::Cancelled { index } => format!("Run cancelled at task {}", index + 1),
            MillingEvent::RunFinished {
                done,
                failed,
                cancelled,
            } => format!(
                "Run finished: {} done, {} failed{}",
                done,
                failed,
                if *cancelled { " (cancelled)" } else { "" }
            ),
        }
    }
}

/// How an alignment step corrected the residual offset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CorrectionKind {
    /// Relative stage move followed by a beam shift reset.
    StageMove,
    /// Incremental beam shift.
    BeamShift,
}

/// Alignment engine events
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AlignmentEvent {
    /// An alignment call began.
    Started {
        /// Position index of the reference image.
        position: usize,
        /// Sequential group of the task.
        sequential_group: u32,
        /// Beam current for the alignment.
        current_a: f64,
        /// Whether a reduced area is used.
        reduced_area: bool,
    },
    /// A live image was correlated against the reference.
    Measured {
        /// Capture number, starting at 0.
        iteration: u32,
        /// Matcher confidence in [0, 1].
        confidence: f64,
        /// Residual offset length in meters.
        residual_m: f64,
    },
    /// A correction was issued.
    Corrected {
        /// Stage or beam shift.
        kind: CorrectionKind,
        /// X correction in meters.
        dx_m: f64,
        /// Y correction in meters.
        dy_m: f64,
    },
    /// The alignment call finished.
    Finished {
        /// Whether alignment converged.
        converged: bool,
        /// Number of captures taken.
        captures: u32,
    },
}

impl AlignmentEvent {
    fn description(&self) -> String {
        match self {
            AlignmentEvent::Started {
                position,
                sequential_group,
                current_a,
                reduced_area,
            } => format!(
                "Aligning position {} (seq {}) at {:.3e} A{}",
                position,
                sequential_group,
                current_a,
                if *reduced_area { ", reduced area" } else { "" }
            ),
            AlignmentEvent::Measured {
                iteration,
                confidence,
                residual_m,
            } => format!(
                "Capture {}: confidence {:.4}, residual {:.3} µm",
                iteration,
                confidence,
                residual_m * 1e6
            ),
            AlignmentEvent::Corrected { kind, dx_m, dy_m } => format!(
                "{:?} by ({:.3}, {:.3}) µm",
                kind,
                dx_m * 1e6,
                dy_m * 1e6
            ),
            AlignmentEvent::Finished {
                converged,
                captures,
            } => format!(
                "Alignment {} after {} captures",
                if *converged { "converged" } else { "failed" },
                captures
            ),
        }
    }
}

/// Position and pattern edit events
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ProjectEvent {
    /// A position was added.
    PositionAdded {
        /// Index of the new position.
        index: usize,
    },
    /// A position was removed.
    PositionRemoved {
        /// Index the position had.
        index: usize,
    },
    /// Pattern groups of a position changed.
    GroupsChanged {
        /// Position index.
        position: usize,
    },
    /// The editing lock was taken or released.
    EditingLocked {
        /// Whether editing is locked.
        locked: bool,
    },
}

impl ProjectEvent {
    fn description(&self) -> String {
        match self {
            ProjectEvent::PositionAdded { index } => format!("Position {} added", index),
            ProjectEvent::PositionRemoved { index } => format!("Position {} removed", index),
            ProjectEvent::GroupsChanged { position } => {
                format!("Pattern groups changed at position {}", position)
            }
            ProjectEvent::EditingLocked { locked } => {
                format!("Editing {}", if *locked { "locked" } else { "unlocked" })
            }
        }
    }
}

/// State snapshot events
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PersistenceEvent {
    /// State was written.
    Saved {
        /// Snapshot file path.
        path: PathBuf,
    },
    /// State was restored.
    Loaded {
        /// Snapshot file path.
        path: PathBuf,
        /// Number of positions restored.
        positions: usize,
    },
    /// Writing the snapshot failed; in-memory state is unchanged.
    SaveFailed {
        /// Error message.
        error: String,
    },
}

impl PersistenceEvent {
    fn description(&self) -> String {
        match self {
            PersistenceEvent::Saved { path } => format!("State saved to {}", path.display()),
            PersistenceEvent::Loaded { path, positions } => {
                format!("Loaded {} positions from {}", positions, path.display())
            }
            PersistenceEvent::SaveFailed { error } => format!("Saving state failed: {}", error),
        }
    }
}

/// Error and diagnostic events
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ErrorEvent {
    /// A hardware call failed.
    Hardware {
        /// The operation that failed.
        operation: String,
        /// Error message.
        message: String,
    },
    /// An operator input or precondition was rejected.
    Rejected {
        /// Error message.
        message: String,
    },
}

impl ErrorEvent {
    fn description(&self) -> String {
        match self {
            ErrorEvent::Hardware { operation, message } => {
                format!("Hardware error during {}: {}", operation, message)
            }
            ErrorEvent::Rejected { message } => format!("Rejected: {}", message),
        }
    }
}
