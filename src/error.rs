//! Unified error types for the garage door firmware.
//!
//! A single `Error` enum that every subsystem converts into, keeping the
//! command API and the notification path uniform.  All variants are `Copy`
//! so they can be handed across the lock boundary and into listener
//! callbacks without allocation.

use core::fmt;

use crate::fsm::{Direction, DoorCommand, DoorState};

// ---------------------------------------------------------------------------
// Error kinds (flat discriminant carried by notifications)
// ---------------------------------------------------------------------------

/// Flat classification of every failure the controller can report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ErrorKind {
    /// Command rejected by the transition table.
    InvalidTransition = 0,
    /// Relay pulse requested while busy or before the minimum interval.
    RateLimited = 1,
    /// Relay output stayed asserted past the maximum pulse duration.
    StuckRelay = 2,
    /// Failsafe timer expired before the target limit was reached.
    OperationTimeout = 3,
    /// Door stalled or reversed before reaching the target limit.
    Obstruction = 4,
    /// Both limit switches report "limit reached" at once.
    SwitchInconsistency = 5,
    /// Persisted or requested config values out of range.
    ConfigInvalid = 6,
}

impl ErrorKind {
    pub const COUNT: usize = 7;

    pub fn from_index(idx: usize) -> Option<Self> {
        match idx {
            0 => Some(Self::InvalidTransition),
            1 => Some(Self::RateLimited),
            2 => Some(Self::StuckRelay),
            3 => Some(Self::OperationTimeout),
            4 => Some(Self::Obstruction),
            5 => Some(Self::SwitchInconsistency),
            6 => Some(Self::ConfigInvalid),
            _ => None,
        }
    }

    /// Kinds that drive the state machine into `Error`.
    pub const fn forces_error_state(self) -> bool {
        matches!(
            self,
            Self::StuckRelay | Self::OperationTimeout | Self::Obstruction | Self::SwitchInconsistency
        )
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidTransition => write!(f, "invalid transition"),
            Self::RateLimited => write!(f, "rate limited"),
            Self::StuckRelay => write!(f, "stuck relay"),
            Self::OperationTimeout => write!(f, "operation timeout"),
            Self::Obstruction => write!(f, "obstruction"),
            Self::SwitchInconsistency => write!(f, "switch inconsistency"),
            Self::ConfigInvalid => write!(f, "config invalid"),
        }
    }
}

// ---------------------------------------------------------------------------
// Top-level firmware error
// ---------------------------------------------------------------------------

/// Every fallible controller operation funnels into this type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// The command is not allowed from the current state.
    InvalidTransition { from: DoorState, command: DoorCommand },
    /// The relay refused a pulse; `wait_ms` is the remaining lockout.
    RateLimited { wait_ms: u64 },
    /// The relay output was still asserted after `active_ms`.
    StuckRelay { active_ms: u64 },
    /// No limit was reached within the failsafe window.
    OperationTimeout { elapsed_ms: u64 },
    /// Motion stalled or reversed while moving in `direction`.
    Obstruction { direction: Direction },
    /// Both limit switches report their limit at the same time.
    SwitchInconsistency,
    /// A config value failed validation.
    ConfigInvalid(&'static str),
}

impl Error {
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidTransition { .. } => ErrorKind::InvalidTransition,
            Self::RateLimited { .. } => ErrorKind::RateLimited,
            Self::StuckRelay { .. } => ErrorKind::StuckRelay,
            Self::OperationTimeout { .. } => ErrorKind::OperationTimeout,
            Self::Obstruction { .. } => ErrorKind::Obstruction,
            Self::SwitchInconsistency => ErrorKind::SwitchInconsistency,
            Self::ConfigInvalid(_) => ErrorKind::ConfigInvalid,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidTransition { from, command } => {
                write!(f, "invalid transition: {command:?} rejected in {}", from.name())
            }
            Self::RateLimited { wait_ms } => write!(f, "rate limited: retry in {wait_ms}ms"),
            Self::StuckRelay { active_ms } => {
                write!(f, "stuck relay: output asserted for {active_ms}ms")
            }
            Self::OperationTimeout { elapsed_ms } => {
                write!(f, "operation timeout after {elapsed_ms}ms")
            }
            Self::Obstruction { direction } => write!(f, "obstruction while {direction:?}"),
            Self::SwitchInconsistency => write!(f, "both limit switches active"),
            Self::ConfigInvalid(msg) => write!(f, "config invalid: {msg}"),
        }
    }
}

impl From<crate::app::ports::ConfigError> for Error {
    fn from(e: crate::app::ports::ConfigError) -> Self {
        match e {
            crate::app::ports::ConfigError::ValidationFailed(msg) => Self::ConfigInvalid(msg),
            crate::app::ports::ConfigError::Corrupted => Self::ConfigInvalid("stored config corrupted"),
            crate::app::ports::ConfigError::NotFound => Self::ConfigInvalid("config not found"),
        }
    }
}

// ---------------------------------------------------------------------------
// Convenience Result alias
// ---------------------------------------------------------------------------

/// Firmware-wide `Result` alias.
pub type Result<T> = core::result::Result<T, Error>;
