//! # AmFIBia Core
//!
//! Types shared by every AmFIBia crate: the error taxonomy, stage and
//! status data, unit helpers, and the event bus used to report progress.

pub mod data;
pub mod error;
pub mod event_bus;
pub mod units;

pub use data::{MilledStatus, StageCoordinates, UserStatus};

pub use error::{
    Error, HardwareError, HardwareResult, MillingError, ProjectError, Result,
};

pub use event_bus::{
    AlignmentEvent, AppEvent, CorrectionKind, ErrorEvent, EventBus, EventBusConfig,
    EventCategory, EventFilter, MillingEvent, PersistenceEvent, ProjectEvent, SubscriptionId,
};

pub use units::{closest_current, format_current, format_duration, Resolution};
