//! # AmFIBia Milling
//!
//! Everything that talks to the microscope during a run.
//!
//! ## Components
//!
//! - **Driver**: the [`Microscope`] trait and a [`SimulatedMicroscope`]
//! - **Matcher**: locates a reference image inside a live capture
//! - **Tasks**: flattens positions and groups into an ordered task list
//! - **Alignment**: capture, correlate and correct until converged
//! - **Orchestrator**: runs tasks with delays, alignment and milling
//!
//! ## Run flow
//!
//! ```text
//! Project --build_task_list--> [MillingTask]
//!    |                              |
//!    |                      TaskConfirmation
//!    v                              v
//! StateStore <---- MillingOrchestrator ----> AlignmentEngine --> FeatureMatcher
//!                          |                       |
//!                          +------> Microscope <---+
//! ```

pub mod alignment;
pub mod cancel;
pub mod confirm;
pub mod driver;
pub mod matcher;
pub mod milling;
pub mod orchestrator;
pub mod simulated;
pub mod tasks;

pub use alignment::{AlignmentEngine, AlignmentOutcome, AlignmentRequest};
pub use cancel::CancellationFlag;
pub use confirm::{AutoConfirm, Confirmation, TaskConfirmation, TaskEdit};
pub use driver::{ImageRequest, Microscope, PatterningState, ScanningConditions};
pub use matcher::{CorrelationMatcher, FeatureMatch, FeatureMatcher};
pub use milling::{mill_patterns, PatterningOutcome};
pub use orchestrator::{MillingOrchestrator, RunReport};
pub use simulated::SimulatedMicroscope;
pub use tasks::{build_task_list, plan_duration, MillingTask, PlanDuration};
