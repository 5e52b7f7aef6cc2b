//! Log-based state listener adapter.
//!
//! Implements [`StateListener`] by writing each door notification to the
//! ESP-IDF logger (UART / USB-CDC in production).  A protocol bridge would
//! implement the same trait.

use log::{info, warn};

use crate::app::events::DoorNotification;
use crate::app::ports::StateListener;

/// Adapter that logs every [`DoorNotification`] to the serial console.
#[derive(Default)]
pub struct LogListener;

impl LogListener {
    pub fn new() -> Self {
        Self
    }
}

impl StateListener for LogListener {
    fn on_state_change(&self, n: &DoorNotification) {
        match n.error {
            Some(kind) => warn!(
                "STATE | {} -> {} | position={} | error={}",
                n.previous.name(),
                n.state.name(),
                n.position,
                kind
            ),
            None if n.is_position_only() => {
                info!("POSITION | {} | {}", n.state.name(), n.position);
            }
            None => info!(
                "STATE | {} -> {} | position={} | error=-",
                n.previous.name(),
                n.state.name(),
                n.position
            ),
        }
    }
}
