//! Safety monitor: failsafe timer and obstruction detector.
//!
//! Armed whenever the door enters OPENING or CLOSING; the timer task calls
//! [`SafetyMonitor::check`] periodically.  The monitor is single-shot: a
//! trip disarms it, and the controller forces `Error`.
//!
//! ## Operation lifecycle
//!
//! 1. A movement command is accepted → [`arm`](SafetyMonitor::arm) records
//!    an [`OperationContext`] with the limit the door started on.
//! 2. Debounced switch changes are reported through
//!    [`note_switch_change`](SafetyMonitor::note_switch_change); leaving the
//!    starting limit marks the door as departed.
//! 3. Target limit reached, STOP accepted or any other exit from a moving
//!    state → [`disarm`](SafetyMonitor::disarm).
//! 4. Otherwise `check` trips with `Obstruction` if the door never left its
//!    starting limit within the grace window, or with `OperationTimeout`
//!    once the failsafe timeout expires.

use log::{error, info};

use crate::config::MonitorConfig;
use crate::error::Error;
use crate::fsm::Direction;
use crate::sensors::{SwitchId, SwitchState};

/// State of the single in-flight operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OperationContext {
    pub direction: Direction,
    pub started_ms: u64,
    pub timeout_ms: u32,
    /// Limit the door was resting on when the operation started.
    pub origin: Option<SwitchId>,
    /// The door has been seen leaving `origin`.
    pub departed: bool,
}

impl OperationContext {
    pub fn elapsed_ms(&self, now_ms: u64) -> u64 {
        now_ms.saturating_sub(self.started_ms)
    }
}

/// Why the monitor tripped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SafetyTrip {
    Timeout { elapsed_ms: u64 },
    Obstruction { direction: Direction },
}

impl SafetyTrip {
    pub fn into_error(self) -> Error {
        match self {
            Self::Timeout { elapsed_ms } => Error::OperationTimeout { elapsed_ms },
            Self::Obstruction { direction } => Error::Obstruction { direction },
        }
    }
}

pub struct SafetyMonitor {
    config: MonitorConfig,
    operation: Option<OperationContext>,
    trips: u32,
}

impl SafetyMonitor {
    pub fn new(config: MonitorConfig) -> Self {
        Self {
            config,
            operation: None,
            trips: 0,
        }
    }

    /// Start the failsafe timer for a new operation.  Replaces any
    /// previous operation.
    pub fn arm(&mut self, direction: Direction, now_ms: u64, origin: Option<SwitchId>) {
        info!(
            "Safety: armed ({:?}, timeout {}ms, origin {})",
            direction,
            self.config.operation_timeout_ms,
            origin.map_or("none", SwitchId::name)
        );
        self.operation = Some(OperationContext {
            direction,
            started_ms: now_ms,
            timeout_ms: self.config.operation_timeout_ms,
            origin,
            departed: origin.is_none(),
        });
    }

    /// Stop and reset the timer.  Returns the operation that was running.
    pub fn disarm(&mut self) -> Option<OperationContext> {
        self.operation.take()
    }

    /// Feed a debounced switch transition.
    pub fn note_switch_change(&mut self, switch: SwitchId, state: SwitchState) {
        if let Some(op) = self.operation.as_mut() {
            if op.origin == Some(switch) && !switch.is_at_limit(state) {
                op.departed = true;
            }
        }
    }

    /// Evaluate the running operation.  A trip disarms the monitor.
    pub fn check(&mut self, now_ms: u64) -> Option<SafetyTrip> {
        let op = self.operation?;
        let elapsed = op.elapsed_ms(now_ms);

        let trip = if elapsed >= u64::from(op.timeout_ms) {
            SafetyTrip::Timeout {
                elapsed_ms: elapsed,
            }
        } else if !op.departed && elapsed >= u64::from(self.config.obstruction_grace_ms) {
            SafetyTrip::Obstruction {
                direction: op.direction,
            }
        } else {
            return None;
        };

        error!("SAFETY TRIP: {} ({:?}, {}ms)", trip.into_error(), op.direction, elapsed);
        self.operation = None;
        self.trips = self.trips.wrapping_add(1);
        Some(trip)
    }

    /// Applies to operations armed after the call.
    pub fn set_config(&mut self, config: MonitorConfig) {
        self.config = config;
    }

    pub fn trip_count(&self) -> u32 {
        self.trips
    }
}
