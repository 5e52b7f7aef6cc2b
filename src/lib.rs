//! Garage door controller firmware library.
//!
//! Exposes the controller and its pure-logic modules for integration
//! testing.  All ESP-IDF-specific code is guarded by
//! `#[cfg(target_os = "espidf")]` within each module.

#![deny(unused_must_use)]

pub mod adapters;
pub mod app;
pub mod config;
pub mod diagnostics;
pub mod drivers;
pub mod events;
pub mod fsm;
pub mod safety;
pub mod sensors;

mod error;

pub use app::controller::DoorController;
pub use error::{Error, ErrorKind, Result};
pub use fsm::{Direction, DoorCommand, DoorState};
pub use sensors::{DoorPosition, SwitchId, SwitchPair, SwitchState};
