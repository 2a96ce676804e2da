//! # AmFIBia
//!
//! Planner and run controller for focused-ion-beam milling on FIB-SEM
//! microscopes:
//! - Pattern layout on reference images in device-relative coordinates
//! - Ordered task lists by sequential group and position
//! - Image-based alignment with beam shift and stage correction
//! - Unattended runs with delays, sleep mode and cancellation
//!
//! ## Architecture
//!
//! AmFIBia is organized as a workspace with multiple crates:
//!
//! 1. **amfibia-core** - Errors, units, event bus
//! 2. **amfibia-designer** - Transforms, patterns, groups, positions, generators
//! 3. **amfibia-settings** - Configuration and state snapshots
//! 4. **amfibia-milling** - Driver trait, alignment, orchestrator, simulator
//! 5. **amfibia** - Headless binary that integrates all crates

pub use amfibia_designer as designer;
pub use amfibia_milling as milling;
pub use amfibia_settings as settings;

pub use amfibia_core::{
    AppEvent, Error, EventBus, EventCategory, EventFilter, HardwareError, MilledStatus,
    MillingError, MillingEvent, ProjectError, Resolution, Result, StageCoordinates, UserStatus,
};

pub use amfibia_designer::{
    ImageFrame, MetricRect, Pattern, PatternGroup, PatternShape, Point, Position, Project,
    ReferenceImage, RelativeRect,
};

pub use amfibia_milling::{
    build_task_list, plan_duration, AlignmentEngine, AlignmentOutcome, AutoConfirm,
    CorrelationMatcher, FeatureMatcher, Microscope, MillingOrchestrator, MillingTask, RunReport,
    SimulatedMicroscope, TaskConfirmation,
};

pub use amfibia_settings::{Config, StateStore};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Build date (set at compile time)
pub const BUILD_DATE: &str = env!("BUILD_DATE");

/// Initialize logging with the default configuration
///
/// Honours `RUST_LOG` and logs at `info` and above to stderr.
pub fn init_logging() -> anyhow::Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::EnvFilter;

    let env_filter = EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into());

    let fmt_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_level(true)
        .with_line_number(true);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()?;

    Ok(())
}
