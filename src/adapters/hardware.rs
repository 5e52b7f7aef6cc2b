//! Hardware adapter: bridges the relay pin to the [`RelayOutput`] port.
//!
//! Generic over any `embedded-hal` stateful output pin, so the firmware
//! plugs in an `esp-idf-hal` `PinDriver` and host tests plug in a fake.
//! A failed write is logged; a failed readback reports the coil as still
//! asserted so the relay watchdog takes over.

use embedded_hal::digital::StatefulOutputPin;
use log::error;

use crate::app::ports::RelayOutput;

/// Relay coil on a push-pull output, active high.
pub struct HalRelay<P: StatefulOutputPin> {
    pin: P,
}

impl<P: StatefulOutputPin> HalRelay<P> {
    pub fn new(pin: P) -> Self {
        Self { pin }
    }

    pub fn into_inner(self) -> P {
        self.pin
    }
}

impl<P> RelayOutput for HalRelay<P>
where
    P: StatefulOutputPin + Send,
{
    fn set_active(&mut self, active: bool) {
        let r = if active {
            self.pin.set_high()
        } else {
            self.pin.set_low()
        };
        if let Err(e) = r {
            error!("Relay pin write failed: {:?}", e);
        }
    }

    fn is_active(&mut self) -> bool {
        self.pin.is_set_high().unwrap_or_else(|e| {
            error!("Relay pin readback failed: {:?}", e);
            true
        })
    }
}
