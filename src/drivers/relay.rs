//! Opener button relay.
//!
//! The relay emulates a momentary press of the opener's wall button.  One
//! pulse per OPEN/CLOSE; STOP never touches the output.
//!
//! ## Timing contract
//!
//! ```text
//!  output  ___|‾‾‾‾‾‾‾‾‾‾|__________________|‾‾‾‾
//!             ^ pulse()  ^ pulse_duration    ^ earliest next pulse
//!                        |<- min_interval ->|
//! ```
//!
//! The timer task calls [`RelayActuator::poll`].  A pulse whose active
//! time exceeds `max_pulse_duration_ms` is a stuck relay: the output is
//! forced low and [`Error::StuckRelay`] is returned.
//!
//! ## Dual-target design
//!
//! The actuator is generic over [`RelayOutput`]; on ESP-IDF that is the
//! GPIO adapter, on host a fake that can be told to stick.

use log::{debug, error, info, warn};

use crate::app::ports::RelayOutput;
use crate::config::RelayConfig;
use crate::error::{Error, Result};
use crate::fsm::Direction;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ActivePulse {
    direction: Direction,
    started_ms: u64,
}

/// A pulse that completed normally.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PulseEnd {
    pub direction: Direction,
    pub started_ms: u64,
    pub released_ms: u64,
}

pub struct RelayActuator<O: RelayOutput> {
    output: O,
    config: RelayConfig,
    active: Option<ActivePulse>,
    last_release_ms: Option<u64>,
    pulses: u32,
}

impl<O: RelayOutput> RelayActuator<O> {
    /// Takes ownership of the output and drives it low.
    pub fn new(mut output: O, config: RelayConfig) -> Self {
        output.set_active(false);
        Self {
            output,
            config,
            active: None,
            last_release_ms: None,
            pulses: 0,
        }
    }

    /// Start one button press.
    ///
    /// Fails with [`Error::RateLimited`] while a pulse is active or until
    /// `min_interval_ms` has passed since the previous release.
    pub fn pulse(&mut self, direction: Direction, now_ms: u64) -> Result<()> {
        let min_interval = u64::from(self.config.min_interval_ms);

        if let Some(p) = self.active {
            let held = now_ms.saturating_sub(p.started_ms);
            let remaining = u64::from(self.config.pulse_duration_ms).saturating_sub(held);
            return Err(Error::RateLimited {
                wait_ms: remaining + min_interval,
            });
        }

        if let Some(released) = self.last_release_ms {
            let since = now_ms.saturating_sub(released);
            if since < min_interval {
                return Err(Error::RateLimited {
                    wait_ms: min_interval - since,
                });
            }
        }

        self.output.set_active(true);
        self.active = Some(ActivePulse {
            direction,
            started_ms: now_ms,
        });
        self.pulses = self.pulses.wrapping_add(1);
        info!(
            "Relay: pulse #{} ({:?}) for {}ms",
            self.pulses, direction, self.config.pulse_duration_ms
        );
        Ok(())
    }

    /// Advance pulse timing.  Returns the completed pulse, if one ended.
    pub fn poll(&mut self, now_ms: u64) -> Result<Option<PulseEnd>> {
        let Some(p) = self.active else {
            return Ok(None);
        };
        let held = now_ms.saturating_sub(p.started_ms);

        if held > u64::from(self.config.max_pulse_duration_ms) {
            self.force_release(now_ms);
            error!("Relay: STUCK, active for {}ms, output forced low", held);
            return Err(Error::StuckRelay { active_ms: held });
        }

        if held < u64::from(self.config.pulse_duration_ms) {
            return Ok(None);
        }

        self.output.set_active(false);
        if self.output.is_active() {
            warn!("Relay: output still asserted after release ({}ms)", held);
            return Ok(None);
        }

        self.active = None;
        self.last_release_ms = Some(now_ms);
        debug!("Relay: released after {}ms", held);
        Ok(Some(PulseEnd {
            direction: p.direction,
            started_ms: p.started_ms,
            released_ms: now_ms,
        }))
    }

    /// STOP is handled in firmware state only; the output is left alone.
    pub fn stop(&mut self) {
        debug!("Relay: stop (no output change)");
    }

    /// Drive the output low immediately, ending any pulse.
    pub fn force_release(&mut self, now_ms: u64) {
        self.output.set_active(false);
        if self.active.take().is_some() {
            self.last_release_ms = Some(now_ms);
        }
    }

    /// A pulse is in flight.
    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    /// New timing applies from the next pulse.
    pub fn set_config(&mut self, config: RelayConfig) {
        self.config = config;
    }

    pub fn pulse_count(&self) -> u32 {
        self.pulses
    }

    #[cfg(test)]
    fn output(&self) -> &O {
        &self.output
    }
}
