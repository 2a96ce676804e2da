//! Shared data types
//!
//! Stage coordinates and pattern-group lifecycle states. These live in the
//! core crate so events can carry them without depending on the designer.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Absolute stage position.
///
/// Linear axes are in meters, rotation and tilt in radians.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct StageCoordinates {
    /// X position in meters.
    pub x: f64,
    /// Y position in meters.
    pub y: f64,
    /// Z position in meters.
    pub z: f64,
    /// Rotation in radians.
    pub r: f64,
    /// Tilt in radians.
    pub t: f64,
}

impl StageCoordinates {
    pub fn new(x: f64, y: f64, z: f64, r: f64, t: f64) -> Self {
        Self { x, y, z, r, t }
    }
}

impl fmt::Display for StageCoordinates {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "X{:.2}µm Y{:.2}µm Z{:.2}µm R{:.1}° T{:.1}°",
            self.x * 1e6,
            self.y * 1e6,
            self.z * 1e6,
            self.r.to_degrees(),
            self.t.to_degrees()
        )
    }
}

/// Milling lifecycle of a pattern group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum MilledStatus {
    /// Waiting to be milled.
    #[default]
    Pending,
    /// Currently being processed by a run.
    Busy,
    /// Milled successfully.
    Done,
    /// The last attempt failed or was cancelled.
    Failed,
}

impl MilledStatus {
    /// Whether a run may move a group from `self` to `next`.
    ///
    /// Within one run the status only moves forward:
    /// pending → busy → done | failed. A pending group may also go straight
    /// to failed when the run is cancelled before it starts.
    pub fn can_advance_to(self, next: MilledStatus) -> bool {
        matches!(
            (self, next),
            (MilledStatus::Pending, MilledStatus::Busy)
                | (MilledStatus::Pending, MilledStatus::Failed)
                | (MilledStatus::Busy, MilledStatus::Done)
                | (MilledStatus::Busy, MilledStatus::Failed)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, MilledStatus::Done | MilledStatus::Failed)
    }
}

impl fmt::Display for MilledStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Busy => write!(f, "busy"),
            Self::Done => write!(f, "done"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Statuses an operator may assign by hand. `Busy` is reserved for runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UserStatus {
    Pending,
    Done,
    Failed,
}

impl From<UserStatus> for MilledStatus {
    fn from(status: UserStatus) -> Self {
        match status {
            UserStatus::Pending => MilledStatus::Pending,
            UserStatus::Done => MilledStatus::Done,
            UserStatus::Failed => MilledStatus::Failed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forward_transitions() {
        assert!(MilledStatus::Pending.can_advance_to(MilledStatus::Busy));
        assert!(MilledStatus::Busy.can_advance_to(MilledStatus::Done));
        assert!(MilledStatus::Busy.can_advance_to(MilledStatus::Failed));
        assert!(MilledStatus::Pending.can_advance_to(MilledStatus::Failed));
    }

    #[test]
    fn test_backward_transitions_rejected() {
        assert!(!MilledStatus::Done.can_advance_to(MilledStatus::Pending));
        assert!(!MilledStatus::Failed.can_advance_to(MilledStatus::Busy));
        assert!(!MilledStatus::Busy.can_advance_to(MilledStatus::Pending));
        assert!(!MilledStatus::Pending.can_advance_to(MilledStatus::Done));
    }

    #[test]
    fn test_user_status_never_busy() {
        for status in [UserStatus::Pending, UserStatus::Done, UserStatus::Failed] {
            assert_ne!(MilledStatus::from(status), MilledStatus::Busy);
        }
    }
}
