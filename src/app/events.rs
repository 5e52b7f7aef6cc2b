//! Outbound door notifications.
//!
//! The [`DoorController`](super::controller::DoorController) delivers one
//! of these to every registered
//! [`StateListener`](super::ports::StateListener) whenever the door state
//! or position changes.  Forced faults travel the same path with `error`
//! set.

use crate::error::ErrorKind;
use crate::fsm::DoorState;
use crate::sensors::DoorPosition;

/// A state or position change, as seen by integrations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DoorNotification {
    pub state: DoorState,
    pub previous: DoorState,
    pub position: DoorPosition,
    /// Set when the change was forced by a fault.
    pub error: Option<ErrorKind>,
    pub at_ms: u64,
}

impl DoorNotification {
    /// `true` when only the position moved.
    pub fn is_position_only(&self) -> bool {
        self.state == self.previous && self.error.is_none()
    }
}
