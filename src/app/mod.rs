//! Application core: door domain logic behind port traits.
//!
//! The [`controller::DoorController`] orchestrates the FSM, debouncer,
//! relay and safety monitor.  All interaction with hardware happens
//! through the **port traits** defined in [`ports`], keeping this layer
//! fully testable without real peripherals.

pub mod commands;
pub mod controller;
pub mod events;
pub mod ports;
