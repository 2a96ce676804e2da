//! Operator confirmation before a run.

use async_trait::async_trait;

use crate::tasks::MillingTask;

/// Per-task values the operator may change when confirming.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TaskEdit {
    pub milling_current: f64,
    pub delay_s: u64,
}

impl From<&MillingTask> for TaskEdit {
    fn from(task: &MillingTask) -> Self {
        Self {
            milling_current: task.milling_current,
            delay_s: task.delay_s,
        }
    }
}

/// Operator answer to the confirmation prompt.
#[derive(Debug, Clone, PartialEq)]
pub enum Confirmation {
    /// Run, with one edit per task in task order.
    Proceed(Vec<TaskEdit>),
    Cancelled,
}

/// Shows the task list and waits for the operator.
#[async_trait]
pub trait TaskConfirmation: Send + Sync {
    async fn confirm(&self, tasks: &[MillingTask], available_currents_a: &[f64]) -> Confirmation;
}

/// Accepts every task unchanged; for headless runs.
#[derive(Debug, Clone, Copy, Default)]
pub struct AutoConfirm;

#[async_trait]
impl TaskConfirmation for AutoConfirm {
    async fn confirm(&self, tasks: &[MillingTask], _available_currents_a: &[f64]) -> Confirmation {
        Confirmation::Proceed(tasks.iter().map(TaskEdit::from).collect())
    }
}
