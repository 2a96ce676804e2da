//! Error handling for AmFIBia
//!
//! Error types for every layer of the application:
//! - Hardware errors (stage, beams, imaging, patterning)
//! - Project errors (edits to positions and pattern groups)
//! - Milling errors (contract violations when starting a run)
//!
//! Hardware errors describe expected instrument variance. The run loop turns
//! them into a failed task instead of propagating them, so they are `Clone`
//! and carry only text.

use thiserror::Error;

use crate::data::MilledStatus;

/// Hardware error type
///
/// Returned by every call into the microscope driver.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum HardwareError {
    /// No instrument session is available
    #[error("Microscope not connected")]
    NotConnected,

    /// The stage refused or failed a move
    #[error("Stage move rejected: {reason}")]
    StageMoveRejected {
        /// The reason the move was rejected.
        reason: String,
    },

    /// Image acquisition failed
    #[error("Image capture failed: {reason}")]
    ImageCaptureFailed {
        /// The reason the capture failed.
        reason: String,
    },

    /// A beam setting (current, shift, on/off) could not be applied
    #[error("Beam control failed: {reason}")]
    BeamControl {
        /// The reason the beam command failed.
        reason: String,
    },

    /// Pattern creation or the milling job failed
    #[error("Patterning failed: {reason}")]
    Patterning {
        /// The reason patterning failed.
        reason: String,
    },

    /// Feature localisation could not produce a result
    #[error("Feature matching failed: {reason}")]
    Matching {
        /// The reason matching failed.
        reason: String,
    },

    /// Generic hardware error
    #[error("Hardware error: {message}")]
    Other {
        /// The error message.
        message: String,
    },
}

/// Result of a call into the microscope driver.
pub type HardwareResult<T> = std::result::Result<T, HardwareError>;

/// Project error type
///
/// Rejections of operator edits. Nothing is modified when one is returned.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProjectError {
    /// A run holds the editing lock
    #[error("Pattern editing is locked while milling is running")]
    EditingLocked,

    /// Position index out of range
    #[error("Position {index} not found")]
    PositionNotFound {
        /// The requested position index.
        index: usize,
    },

    /// Pattern group index out of range
    #[error("Pattern group {group} not found at position {position}")]
    GroupNotFound {
        /// The position index.
        position: usize,
        /// The requested group index.
        group: usize,
    },

    /// No pattern with this id
    #[error("Pattern {id} not found")]
    PatternNotFound {
        /// The pattern id.
        id: String,
    },

    /// The position has no reference image
    #[error("Position {position} has no reference image")]
    NoReferenceImage {
        /// The position index.
        position: usize,
    },

    /// A numeric or textual field has an unusable value
    #[error("Invalid value for {field}: {reason}")]
    InvalidValue {
        /// The field name.
        field: String,
        /// Why the value was rejected.
        reason: String,
    },

    /// A status change that would move a group backwards within a run
    #[error("Invalid status transition from {from} to {to}")]
    InvalidStatusTransition {
        /// Current status.
        from: MilledStatus,
        /// Requested status.
        to: MilledStatus,
    },
}

impl ProjectError {
    pub fn invalid_value(field: impl Into<String>, reason: impl Into<String>) -> Self {
        ProjectError::InvalidValue {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// Milling error type
///
/// Contract violations detected before or outside the hardware loop.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MillingError {
    /// Captures and state need a working directory
    #[error("No working directory set")]
    NoWorkingDirectory,

    /// A reference image with no pixels was passed to alignment
    #[error("Reference image is empty")]
    EmptyReferenceImage,

    /// A task has no milling current after confirmation
    #[error("Task {task} has no milling current set")]
    CurrentNotSet {
        /// Index of the task in the run.
        task: usize,
    },

    /// An operator edit to a task could not be applied
    #[error("Invalid edit for task {task}: {reason}")]
    InvalidTaskEdit {
        /// Index of the task in the run.
        task: usize,
        /// Why the edit was rejected.
        reason: String,
    },

    /// Another run already holds the editing lock
    #[error("A milling run is already in progress")]
    AlreadyRunning,
}

/// Main error type for AmFIBia
///
/// A unified error type that can represent any error from all layers.
#[derive(Error, Debug)]
pub enum Error {
    /// Hardware error
    #[error(transparent)]
    Hardware(#[from] HardwareError),

    /// Project error
    #[error(transparent)]
    Project(#[from] ProjectError),

    /// Milling error
    #[error(transparent)]
    Milling(#[from] MillingError),

    /// Standard I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create an error from a string message
    pub fn other(msg: impl Into<String>) -> Self {
        Error::Other(msg.into())
    }

    /// Check if this is a hardware error
    pub fn is_hardware_error(&self) -> bool {
        matches!(self, Error::Hardware(_))
    }

    /// Check if this error was caused by the editing lock
    pub fn is_locked(&self) -> bool {
        matches!(
            self,
            Error::Project(ProjectError::EditingLocked) | Error::Milling(MillingError::AlreadyRunning)
        )
    }

    /// Check if this is a contract error raised before any hardware action
    pub fn is_contract_error(&self) -> bool {
        matches!(self, Error::Project(_) | Error::Milling(_))
    }
}

/// Result type using Error
pub type Result<T> = std::result::Result<T, Error>;
