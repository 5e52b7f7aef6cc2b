//! Relay driver, one-shot hardware initialisation, and task placement.

pub mod hw_init;
pub mod relay;
pub mod task_pin;
