//! Controller configuration parameters.
//!
//! Three sections are persisted independently in the config store, each as
//! a postcard-encoded blob:
//!
//! | Key           | Section          | Applied            |
//! |---------------|------------------|--------------------|
//! | `gpio_cfg`    | [`GpioConfig`]   | at boot            |
//! | `relay_cfg`   | [`RelayConfig`]  | immediately        |
//! | `monitor_cfg` | [`MonitorConfig`]| next operation     |
//!
//! A section that is missing, undecodable or out of range is replaced by
//! its defaults, which are then written back.  Loading never fails.

use log::{info, warn};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::app::ports::{ConfigError, ConfigStore};
use crate::error::Error;

/// NVS namespace holding every section.
pub const NVS_NAMESPACE: &str = "garage_door";

pub const KEY_GPIO: &str = "gpio_cfg";
pub const KEY_RELAY: &str = "relay_cfg";
pub const KEY_MONITOR: &str = "monitor_cfg";

/// Smallest failsafe timeout accepted at runtime.
pub const MIN_OPERATION_TIMEOUT_MS: u32 = 1_000;
pub const MAX_OPERATION_TIMEOUT_MS: u32 = 300_000;

// ---------------------------------------------------------------------------
// GPIO
// ---------------------------------------------------------------------------

/// Pull resistor applied to both reed switch inputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Pull {
    Up,
    Down,
}

/// Pin assignments.  Changes take effect at the next boot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GpioConfig {
    pub reed_closed_pin: u8,
    pub reed_open_pin: u8,
    pub relay_pin: u8,
    pub switch_pull: Pull,
}

impl Default for GpioConfig {
    fn default() -> Self {
        Self {
            reed_closed_pin: 2,
            reed_open_pin: 3,
            relay_pin: 4,
            switch_pull: Pull::Up,
        }
    }
}

impl GpioConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        const PINS: core::ops::RangeInclusive<u8> = 1..=48;
        for pin in [self.reed_closed_pin, self.reed_open_pin, self.relay_pin] {
            if !PINS.contains(&pin) {
                return Err(ConfigError::ValidationFailed("gpio pin outside 1..=48"));
            }
        }
        if self.reed_closed_pin == self.reed_open_pin
            || self.reed_closed_pin == self.relay_pin
            || self.reed_open_pin == self.relay_pin
        {
            return Err(ConfigError::ValidationFailed("gpio pins must be distinct"));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Relay
// ---------------------------------------------------------------------------

/// Relay pulse timing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayConfig {
    /// How long the output is held for one button press.
    pub pulse_duration_ms: u32,
    /// Minimum gap between the end of one pulse and the next.
    pub min_interval_ms: u32,
    /// Active time beyond which the relay is considered stuck.
    pub max_pulse_duration_ms: u32,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            pulse_duration_ms: 500,
            min_interval_ms: 1_000,
            max_pulse_duration_ms: 600,
        }
    }
}

impl RelayConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(100..=1_000).contains(&self.pulse_duration_ms) {
            return Err(ConfigError::ValidationFailed("pulse_duration_ms outside 100..=1000"));
        }
        if !(500..=5_000).contains(&self.min_interval_ms) {
            return Err(ConfigError::ValidationFailed("min_interval_ms outside 500..=5000"));
        }
        if !(500..=2_000).contains(&self.max_pulse_duration_ms) {
            return Err(ConfigError::ValidationFailed("max_pulse_duration_ms outside 500..=2000"));
        }
        if self.max_pulse_duration_ms < self.pulse_duration_ms {
            return Err(ConfigError::ValidationFailed(
                "max_pulse_duration_ms below pulse_duration_ms",
            ));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Safety monitor + debounce
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Failsafe timer for one OPENING/CLOSING operation.
    pub operation_timeout_ms: u32,
    /// Time allowed for the door to leave its starting limit.
    pub obstruction_grace_ms: u32,
    /// Reed switch debounce window.
    pub debounce_ms: u32,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            operation_timeout_ms: 30_000,
            obstruction_grace_ms: 3_000,
            debounce_ms: 50,
        }
    }
}

impl MonitorConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(MIN_OPERATION_TIMEOUT_MS..=MAX_OPERATION_TIMEOUT_MS).contains(&self.operation_timeout_ms)
        {
            return Err(ConfigError::ValidationFailed(
                "operation_timeout_ms outside 1000..=300000",
            ));
        }
        if self.obstruction_grace_ms < 500 || self.obstruction_grace_ms >= self.operation_timeout_ms {
            return Err(ConfigError::ValidationFailed(
                "obstruction_grace_ms outside 500..operation_timeout_ms",
            ));
        }
        if !(20..=200).contains(&self.debounce_ms) {
            return Err(ConfigError::ValidationFailed("debounce_ms outside 20..=200"));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Aggregate
// ---------------------------------------------------------------------------

/// Everything the controller needs at init.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ControllerConfig {
    pub gpio: GpioConfig,
    pub relay: RelayConfig,
    pub monitor: MonitorConfig,
}

impl ControllerConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.gpio.validate()?;
        self.relay.validate()?;
        self.monitor.validate()
    }
}

// ---------------------------------------------------------------------------
// Persistence
// ---------------------------------------------------------------------------

/// A section stored under its own key.
pub trait ConfigSection: Serialize + DeserializeOwned + Default + Copy {
    const KEY: &'static str;

    fn check(&self) -> Result<(), ConfigError>;
}

impl ConfigSection for GpioConfig {
    const KEY: &'static str = KEY_GPIO;

    fn check(&self) -> Result<(), ConfigError> {
        self.validate()
    }
}

impl ConfigSection for RelayConfig {
    const KEY: &'static str = KEY_RELAY;

    fn check(&self) -> Result<(), ConfigError> {
        self.validate()
    }
}

impl ConfigSection for MonitorConfig {
    const KEY: &'static str = KEY_MONITOR;

    fn check(&self) -> Result<(), ConfigError> {
        self.validate()
    }
}

/// Decode and validate one section.
pub fn decode<T: ConfigSection>(bytes: &[u8]) -> Result<T, ConfigError> {
    let cfg: T = postcard::from_bytes(bytes).map_err(|_| ConfigError::Corrupted)?;
    cfg.check()?;
    Ok(cfg)
}

pub fn encode<T: ConfigSection>(cfg: &T) -> Result<Vec<u8>, ConfigError> {
    postcard::to_allocvec(cfg).map_err(|_| ConfigError::Corrupted)
}

/// Write one section.  Failures are logged; the in-memory value stays
/// authoritative.
pub fn persist<T: ConfigSection, S: ConfigStore + ?Sized>(store: &mut S, cfg: &T) -> bool {
    let bytes = match encode(cfg) {
        Ok(b) => b,
        Err(e) => {
            warn!("{}: encode failed ({})", T::KEY, e);
            return false;
        }
    };
    match store.save(T::KEY, &bytes) {
        Ok(()) => true,
        Err(e) => {
            warn!("{}: save failed ({})", T::KEY, e);
            false
        }
    }
}

/// Load one section, falling back to (and persisting) defaults on any
/// problem.
pub fn load_or_default<T: ConfigSection, S: ConfigStore + ?Sized>(store: &mut S) -> T {
    match store.load(T::KEY) {
        Ok(Some(bytes)) => match decode::<T>(&bytes) {
            Ok(cfg) => {
                info!("{}: loaded", T::KEY);
                return cfg;
            }
            Err(e) => warn!("{}: {}; using defaults", T::KEY, Error::from(e)),
        },
        Ok(None) => info!("{}: not found; using defaults", T::KEY),
        Err(e) => warn!("{}: read failed ({}); using defaults", T::KEY, e),
    }

    let cfg = T::default();
    persist(store, &cfg);
    cfg
}

/// Load every section.
pub fn load_all<S: ConfigStore + ?Sized>(store: &mut S) -> ControllerConfig {
    ControllerConfig {
        gpio: load_or_default(store),
        relay: load_or_default(store),
        monitor: load_or_default(store),
    }
}
