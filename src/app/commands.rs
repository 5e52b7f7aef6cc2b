//! Inbound commands to the door controller.
//!
//! These represent actions requested by the outside world (the protocol
//! bridge, a console, a test harness) that
//! [`DoorController::handle`](super::controller::DoorController::handle)
//! interprets and acts upon.

use crate::config::{GpioConfig, MonitorConfig, RelayConfig};
use crate::fsm::DoorCommand;

/// Commands that external adapters can send into the application core.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppCommand {
    /// OPEN / CLOSE / STOP / RESET.
    Door(DoorCommand),

    /// Change the failsafe timeout for subsequent operations.
    SetOperationTimeout(u32),

    /// Hot-reload relay timing; persisted to `relay_cfg`.
    UpdateRelayConfig(RelayConfig),

    /// Hot-reload monitor and debounce timing; persisted to `monitor_cfg`.
    UpdateMonitorConfig(MonitorConfig),

    /// Persist new pin assignments; applied at next boot.
    UpdateGpioConfig(GpioConfig),

    /// Restore and persist default config; clears the event log.
    FactoryReset,
}

impl From<DoorCommand> for AppCommand {
    fn from(cmd: DoorCommand) -> Self {
        Self::Door(cmd)
    }
}
