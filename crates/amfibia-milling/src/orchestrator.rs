//! Milling Orchestrator
//!
//! Runs a confirmed task list end to end: for each task wait out the
//! delay, move and align when the position changed, fine-align at the
//! milling current and mill the group. A failing task is marked failed and
//! the run moves on; cancellation stops the run. Cleanup runs on every
//! exit path.

use amfibia_core::{
    closest_current, format_current, format_duration, AppEvent, Error, EventBus, MilledStatus,
    MillingError, MillingEvent, StageCoordinates,
};
use amfibia_designer::model::Pattern;
use amfibia_designer::project::Project;
use amfibia_settings::{Config, StateStore};
use std::sync::Arc;
use std::time::Duration;

use crate::alignment::{AlignmentEngine, AlignmentOutcome, AlignmentRequest};
use crate::cancel::CancellationFlag;
use crate::confirm::{Confirmation, TaskConfirmation};
use crate::driver::{Microscope, ScanningConditions};
use crate::matcher::FeatureMatcher;
use crate::milling::{mill_patterns, PatterningOutcome};
use crate::tasks::{build_task_list, plan_duration, MillingTask};

/// Summary of a run.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RunReport {
    pub tasks: usize,
    pub done: usize,
    pub failed: usize,
    pub cancelled: bool,
    pub message: String,
    /// Error from saving state after the run, if any.
    pub save_error: Option<String>,
}

impl RunReport {
    fn idle(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Self::default()
        }
    }
}

/// Why a single task ended early.
enum TaskEnd {
    Failed(String),
    Cancelled,
}

/// Drives milling runs on one microscope.
pub struct MillingOrchestrator {
    microscope: Arc<dyn Microscope>,
    alignment: AlignmentEngine,
    config: Config,
    store: StateStore,
    events: Arc<EventBus>,
    cancel: CancellationFlag,
}

impl MillingOrchestrator {
    /// Fails when the configuration has no working directory.
    pub fn new(
        microscope: Arc<dyn Microscope>,
        matcher: Arc<dyn FeatureMatcher>,
        config: Config,
        events: Arc<EventBus>,
    ) -> Result<Self, MillingError> {
        let working_dir = config
            .general
            .working_directory
            .clone()
            .ok_or(MillingError::NoWorkingDirectory)?;
        let alignment = AlignmentEngine::new(config.alignment.clone(), matcher)
            .with_working_dir(&working_dir)
            .with_event_bus(events.clone());
        let store = StateStore::new(&working_dir).with_event_bus(events.clone());

        Ok(Self {
            microscope,
            alignment,
            config,
            store,
            events,
            cancel: CancellationFlag::new(),
        })
    }

    /// Handle to cancel a running job from elsewhere.
    pub fn cancellation(&self) -> CancellationFlag {
        self.cancel.clone()
    }

    pub fn store(&self) -> &StateStore {
        &self.store
    }

    fn publish(&self, event: MillingEvent) {
        self.events.notify(AppEvent::Milling(event));
    }

    /// Runs every pending task of `project`.
    ///
    /// Returns `Err` only for problems found before the first hardware
    /// action of the run (missing currents, bad edits, a run already in
    /// progress). Task failures are counted in the report.
    pub async fn run(
        &self,
        project: &mut Project,
        confirmation: &dyn TaskConfirmation,
    ) -> Result<RunReport, Error> {
        self.cancel.reset();
        if let Err(e) = self.store.save(project) {
            tracing::warn!("Could not save state before run: {}", e);
        }

        let mut tasks = build_task_list(project.positions());
        if tasks.is_empty() {
            tracing::info!("No pending milling tasks");
            self.publish(MillingEvent::NoPendingTasks);
            return Ok(RunReport::idle("No pending milling tasks"));
        }

        let available = self.microscope.available_beam_currents().await?;
        let edits = match confirmation.confirm(&tasks, &available).await {
            Confirmation::Proceed(edits) => edits,
            Confirmation::Cancelled => {
                tracing::info!("Run cancelled by operator before start");
                return Ok(RunReport {
                    tasks: tasks.len(),
                    cancelled: true,
                    message: "Run cancelled before start".to_string(),
                    ..RunReport::default()
                });
            }
        };
        if edits.len() != tasks.len() {
            return Err(MillingError::InvalidTaskEdit {
                task: edits.len().min(tasks.len()),
                reason: format!("expected {} edits, got {}", tasks.len(), edits.len()),
            }
            .into());
        }

        for (index, (task, edit)) in tasks.iter_mut().zip(&edits).enumerate() {
            if !(edit.milling_current.is_finite() && edit.milling_current >= 0.0) {
                return Err(MillingError::InvalidTaskEdit {
                    task: index,
                    reason: format!("invalid current {}", edit.milling_current),
                }
                .into());
            }
            let current = if edit.milling_current > 0.0 {
                closest_current(edit.milling_current, &available).unwrap_or(edit.milling_current)
            } else {
                0.0
            };
            if current == 0.0 {
                return Err(MillingError::CurrentNotSet { task: index }.into());
            }
            task.milling_current = current;
            task.delay_s = edit.delay_s;
        }
        for task in &tasks {
            project.set_group_current(task.position_index, task.group_index, task.milling_current)?;
            project.set_group_delay(task.position_index, task.group_index, task.delay_s)?;
        }

        let guard = project
            .lock_editing()
            .map_err(|_| MillingError::AlreadyRunning)?;
        self.publish(MillingEvent::ControlsEnabled { enabled: false });
        self.publish(MillingEvent::RunStarted { tasks: tasks.len() });

        let plan = plan_duration(&tasks);
        tracing::info!(
            "Starting milling with {} tasks, estimated {} milling and {} delays",
            tasks.len(),
            format_duration(plan.milling_s),
            format_duration(plan.delay_s)
        );

        let saved_conditions = match self.microscope.scanning_conditions().await {
            Ok(conditions) => Some(conditions),
            Err(e) => {
                tracing::warn!("Could not read scanning conditions: {}", e);
                None
            }
        };

        let (done, failed, cancelled) = self.run_tasks(project, &mut tasks).await;

        drop(guard);
        self.publish(MillingEvent::ControlsEnabled { enabled: true });
        let swept = self.sweep_busy(project, &tasks);
        let save_error = self.store.save(project).err().map(|e| e.to_string());
        if let Some(conditions) = saved_conditions {
            self.restore_conditions(&conditions).await;
        }

        let failed = failed + swept;
        self.publish(MillingEvent::RunFinished {
            done,
            failed,
            cancelled,
        });
        tracing::info!(
            "Milling finished: {} done, {} failed{}",
            done,
            failed,
            if cancelled { ", cancelled" } else { "" }
        );

        Ok(RunReport {
            tasks: tasks.len(),
            done,
            failed,
            cancelled,
            message: if cancelled {
                "Milling cancelled".to_string()
            } else {
                "Milling finished".to_string()
            },
            save_error,
        })
    }

    /// Returns `(done, failed, cancelled)`.
    async fn run_tasks(&self, project: &mut Project, tasks: &mut [MillingTask]) -> (usize, usize, bool) {
        let (mut done, mut failed) = (0, 0);
        let mut previous: Option<(StageCoordinates, bool)> = None;
        let total = tasks.len();

        for index in 0..total {
            if self.cancel.is_cancelled() {
                self.set_status(project, &tasks[index], MilledStatus::Failed);
                self.publish(MillingEvent::Cancelled { index });
                return (done, failed + 1, true);
            }

            let task = &mut tasks[index];
            self.set_status(project, task, MilledStatus::Busy);
            self.publish(MillingEvent::TaskStarted {
                index,
                total,
                position: task.position_index,
                current_a: task.milling_current,
                delay_s: task.delay_s,
            });
            tracing::info!(
                "Task {}/{}: position {}, group {}, {}",
                index + 1,
                total,
                task.position_index,
                task.group_index,
                format_current(task.milling_current)
            );

            let realign = match previous {
                None => true,
                Some((coordinates, moved)) => coordinates != task.coordinates || !moved,
            };
            let result = self.run_task(project, task, realign).await;
            previous = Some((task.coordinates, task.move_successful));

            match result {
                Ok(()) => {
                    self.set_status(project, task, MilledStatus::Done);
                    done += 1;
                }
                Err(TaskEnd::Failed(reason)) => {
                    tracing::error!("Task {} failed: {}", index + 1, reason);
                    self.set_status(project, task, MilledStatus::Failed);
                    self.publish(MillingEvent::TaskFailed { index, reason });
                    failed += 1;
                }
                Err(TaskEnd::Cancelled) => {
                    self.set_status(project, task, MilledStatus::Failed);
                    self.publish(MillingEvent::Cancelled { index });
                    return (done, failed + 1, true);
                }
            }
        }
        (done, failed, false)
    }

    async fn run_task(
        &self,
        project: &Project,
        task: &mut MillingTask,
        realign: bool,
    ) -> Result<(), TaskEnd> {
        let microscope = self.microscope.as_ref();
        let dwell_time_s = project.dwell_time_s();

        // Sleep mode homes the stage, so the position has to be reached again.
        let slept = self.wait_delay(task.delay_s).await?;
        let realign = realign || slept;

        microscope
            .ion_beam_on()
            .await
            .map_err(|e| TaskEnd::Failed(format!("ion beam on: {}", e)))?;
        microscope
            .set_scanning_resolution(project.scanning_resolution())
            .await
            .map_err(|e| TaskEnd::Failed(format!("imaging conditions: {}", e)))?;

        if realign {
            task.move_successful = false;
            microscope
                .move_stage_absolute(task.coordinates)
                .await
                .map_err(|e| TaskEnd::Failed(format!("stage move: {}", e)))?;

            let coarse = AlignmentRequest::full_frame(
                &task.reference_image,
                self.config.alignment.coarse_current_a,
                dwell_time_s,
            )
            .at(task.position_index, task.sequential_group);
            self.align(&coarse, "coarse alignment").await?;
        }
        // Reached by this move or by the previous task at these coordinates.
        task.move_successful = true;

        let fine = AlignmentRequest::reduced_area(
            &task.reference_image,
            &task.tracking_image,
            task.tracking_area,
            task.milling_current,
            dwell_time_s,
        )
        .at(task.position_index, task.sequential_group);
        self.align(&fine, "fine alignment").await?;

        let patterns: Vec<Pattern> = project
            .position(task.position_index)
            .ok()
            .and_then(|p| p.group(task.group_index))
            .map(|g| g.enabled_patterns().into_iter().cloned().collect())
            .unwrap_or_default();

        let outcome = mill_patterns(
            microscope,
            &patterns,
            self.config.milling.minimum_depth_m,
            Duration::from_millis(self.config.milling.poll_interval_ms),
            &self.cancel,
        )
        .await
        .map_err(|e| TaskEnd::Failed(format!("milling: {}", e)))?;

        match outcome {
            PatterningOutcome::Completed => Ok(()),
            PatterningOutcome::Stopped => Err(TaskEnd::Cancelled),
        }
    }

    async fn align(&self, request: &AlignmentRequest<'_>, stage: &str) -> Result<(), TaskEnd> {
        let outcome = self
            .alignment
            .align(self.microscope.as_ref(), request, &self.cancel)
            .await
            .map_err(|e| TaskEnd::Failed(format!("{}: {}", stage, e)))?;
        match outcome {
            AlignmentOutcome::Converged { .. } if self.cancel.is_cancelled() => {
                Err(TaskEnd::Cancelled)
            }
            AlignmentOutcome::Converged { .. } => Ok(()),
            AlignmentOutcome::Cancelled => Err(TaskEnd::Cancelled),
            other => Err(TaskEnd::Failed(format!("{}: {}", stage, other.describe()))),
        }
    }

    /// Returns whether the instrument was put into sleep mode.
    async fn wait_delay(&self, delay_s: u64) -> Result<bool, TaskEnd> {
        if delay_s == 0 {
            return Ok(false);
        }
        if self.cancel.is_cancelled() {
            return Err(TaskEnd::Cancelled);
        }

        let sleep_mode = delay_s > self.config.milling.sleep_threshold_s;
        if sleep_mode {
            if let Err(e) = self.microscope.enter_sleep_mode().await {
                tracing::warn!("Could not enter sleep mode: {}", e);
            }
        }
        self.publish(MillingEvent::DelayStarted {
            seconds: delay_s,
            sleep_mode,
        });
        tracing::info!(
            "Waiting {}{}",
            format_duration(delay_s as f64),
            if sleep_mode { " in sleep mode" } else { "" }
        );

        if !self.cancel.sleep(Duration::from_secs(delay_s)).await || self.cancel.is_cancelled() {
            return Err(TaskEnd::Cancelled);
        }
        Ok(sleep_mode)
    }

    fn set_status(&self, project: &mut Project, task: &MillingTask, status: MilledStatus) {
        match project.advance_group_status(task.position_index, task.group_index, status) {
            Ok(()) => self.publish(MillingEvent::GroupStatusChanged {
                position: task.position_index,
                group: task.group_index,
                status,
            }),
            Err(e) => tracing::warn!(
                "Status of position {} group {} not changed: {}",
                task.position_index,
                task.group_index,
                e
            ),
        }
    }

    /// Marks groups left busy as failed; returns how many there were.
    fn sweep_busy(&self, project: &mut Project, tasks: &[MillingTask]) -> usize {
        let mut swept = 0;
        for task in tasks {
            let busy = project
                .position(task.position_index)
                .ok()
                .and_then(|p| p.group(task.group_index))
                .is_some_and(|g| g.milled_status() == MilledStatus::Busy);
            if busy {
                self.set_status(project, task, MilledStatus::Failed);
                swept += 1;
            }
        }
        swept
    }

    async fn restore_conditions(&self, conditions: &ScanningConditions) {
        if let Err(e) = self.microscope.set_scanning_conditions(conditions).await {
            tracing::warn!("Could not restore scanning conditions: {}", e);
        }
    }
}
