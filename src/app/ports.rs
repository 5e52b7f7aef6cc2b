//! Port traits: the hexagonal boundary between domain logic and the outside world.
//!
//! ```text
//!   Adapter ──▶ Port trait ──▶ DoorController (domain)
//! ```
//!
//! Driven adapters (relay pin, switch inputs, clock, config storage,
//! notification sinks) implement these traits.  The
//! [`DoorController`](super::controller::DoorController) consumes them via
//! generics or registration, so the domain core never touches hardware
//! directly and every test can swap in an in-process fake.

use super::events::DoorNotification;
use crate::sensors::SwitchPair;

// ───────────────────────────────────────────────────────────────
// Relay output port (driven adapter: domain → hardware)
// ───────────────────────────────────────────────────────────────

/// The single digital output that drives the opener's button relay.
pub trait RelayOutput: Send {
    /// Assert (`true`) or release (`false`) the relay coil.
    fn set_active(&mut self, active: bool);

    /// Read back the output latch.  Used to detect a relay that did not
    /// release when commanded.
    fn is_active(&mut self) -> bool;
}

// ───────────────────────────────────────────────────────────────
// Clock port
// ───────────────────────────────────────────────────────────────

/// Monotonic millisecond clock shared by the ISR stamping path, the
/// command path and the safety timer.
pub trait Clock: Send + Sync {
    fn now_ms(&self) -> u64;
}

// ───────────────────────────────────────────────────────────────
// Config store port (driven adapter: domain ↔ NVS / flash)
// ───────────────────────────────────────────────────────────────

/// Persistent key-value store for the config sections.
///
/// The controller calls [`load`](Self::load) at init and
/// [`save`](Self::save) at init (defaults) and on runtime config updates.
/// Nothing else touches the store.  Writes MUST be atomic; the ESP-IDF NVS
/// API guarantees this natively.
pub trait ConfigStore: Send {
    /// Read a blob.  `Ok(None)` means the key has never been written.
    fn load(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError>;

    /// Write a blob atomically.
    fn save(&mut self, key: &str, data: &[u8]) -> Result<(), StorageError>;
}

// ───────────────────────────────────────────────────────────────
// State listener port (driving side: domain → integrations)
// ───────────────────────────────────────────────────────────────

/// Receives every state or position change, including forced `Error`.
///
/// Notifications arrive one at a time, in the order the changes happened,
/// on whichever task is delivering at that moment.  Never called with the
/// controller's state lock held, so implementations may call back into
/// the controller; notifications caused by such a call are delivered
/// after the current one returns.
pub trait StateListener: Send + Sync {
    fn on_state_change(&self, notification: &DoorNotification);
}

impl<F> StateListener for F
where
    F: Fn(&DoorNotification) + Send + Sync,
{
    fn on_state_change(&self, notification: &DoorNotification) {
        self(notification);
    }
}

// ───────────────────────────────────────────────────────────────
// Switch input port (driven adapter: hardware → domain)
// ───────────────────────────────────────────────────────────────

/// Direct read of both reed switches, bypassing the ISR edge queue.
///
/// Used to recover after queued edges were lost.  Implementations apply
/// the same level convention as the ISRs.
pub trait SwitchInput: Send {
    fn read(&mut self) -> SwitchPair;
}

// ───────────────────────────────────────────────────────────────
// Error types
// ───────────────────────────────────────────────────────────────

/// Errors from decoding or validating a config section.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    /// No config found in storage (first boot).
    NotFound,
    /// Stored blob failed deserialization.
    Corrupted,
    /// A config field failed range validation.
    /// The `&'static str` describes which field and why.
    ValidationFailed(&'static str),
}

/// Errors from [`ConfigStore`] operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageError {
    /// Storage partition is full.
    Full,
    /// Generic I/O error from the storage backend.
    IoError,
}

impl core::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::NotFound => write!(f, "config not found"),
            Self::Corrupted => write!(f, "config corrupted"),
            Self::ValidationFailed(msg) => write!(f, "validation failed: {}", msg),
        }
    }
}

impl core::fmt::Display for StorageError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Full => write!(f, "storage full"),
            Self::IoError => write!(f, "I/O error"),
        }
    }
}
