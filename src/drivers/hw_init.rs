//! One-shot reed switch input and ISR setup.
//!
//! Configures both switch pins as inputs with the configured pull and an
//! any-edge interrupt, using raw ESP-IDF sys calls.  Each ISR reads the
//! pin level, stamps it and pushes a [`RawEdge`] onto the controller's
//! [`EdgeQueue`].  Nothing else runs in interrupt context.
//!
//! Called once from `main()` after the controller is built.  The relay
//! output is configured separately through `esp-idf-hal`.

use std::sync::Arc;

use crate::app::ports::SwitchInput;
use crate::config::{GpioConfig, Pull};
use crate::events::EdgeQueue;
use crate::sensors::{SwitchId, SwitchPair};

#[cfg(target_os = "espidf")]
use crate::adapters::time::boot_time_us;
#[cfg(target_os = "espidf")]
use crate::events::RawEdge;
#[cfg(target_os = "espidf")]
use esp_idf_svc::sys::*;
#[cfg(target_os = "espidf")]
use log::info;

// ── Error type ────────────────────────────────────────────────

/// Errors during one-shot peripheral initialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HwInitError {
    GpioConfigFailed(i32),
    IsrInstallFailed(i32),
    IsrHandlerFailed(i32),
}

impl core::fmt::Display for HwInitError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::GpioConfigFailed(rc) => write!(f, "GPIO config failed (rc={})", rc),
            Self::IsrInstallFailed(rc) => write!(f, "GPIO ISR service install failed (rc={})", rc),
            Self::IsrHandlerFailed(rc) => write!(f, "GPIO ISR handler add failed (rc={})", rc),
        }
    }
}

impl std::error::Error for HwInitError {}

// ── Per-pin ISR context ───────────────────────────────────────

/// Argument handed to each pin's ISR.  Lives until [`SwitchIsrs`] drops.
struct IsrContext {
    queue: Arc<EdgeQueue>,
    switch: SwitchId,
    pin: i32,
    invert: bool,
}

/// Installed switch ISRs.  Dropping removes the handlers and frees their
/// contexts.
pub struct SwitchIsrs {
    contexts: Vec<*mut IsrContext>,
}

// SAFETY: the raw pointers are only dereferenced by the ISRs and by Drop,
// which unregisters the ISR before freeing.
unsafe impl Send for SwitchIsrs {}

impl Drop for SwitchIsrs {
    fn drop(&mut self) {
        for ctx in self.contexts.drain(..) {
            #[cfg(target_os = "espidf")]
            // SAFETY: `ctx` came from Box::into_raw in install_switch_isrs and
            // is still live; the handler is removed before the box is freed.
            unsafe {
                gpio_intr_disable((*ctx).pin);
                gpio_isr_handler_remove((*ctx).pin);
            }
            // SAFETY: no ISR can reference `ctx` any more.
            drop(unsafe { Box::from_raw(ctx) });
        }
    }
}

#[cfg(target_os = "espidf")]
unsafe extern "C" fn switch_isr(arg: *mut core::ffi::c_void) {
    // SAFETY: `arg` is the IsrContext registered for this pin; it outlives
    // the handler registration.  gpio_get_level is a register read, safe in
    // ISR context.  EdgeQueue::push is lock-free.
    unsafe {
        let ctx = &*(arg as *const IsrContext);
        let level_high = (gpio_get_level(ctx.pin) != 0) != ctx.invert;
        let at_ms = boot_time_us() / 1_000;
        ctx.queue.push(RawEdge {
            switch: ctx.switch,
            level_high,
            at_ms,
        });
    }
}

// ── Inputs ────────────────────────────────────────────────────

/// Pull-down wiring is active-high; edges are normalised to the active-low
/// convention of [`SwitchId::state_for_level`].
fn inverted(gpio: &GpioConfig) -> bool {
    gpio.switch_pull == Pull::Down
}

fn switch_pins(gpio: &GpioConfig) -> [(SwitchId, u8); 2] {
    [
        (SwitchId::ClosedLimit, gpio.reed_closed_pin),
        (SwitchId::OpenLimit, gpio.reed_open_pin),
    ]
}

/// Configure both switch pins as inputs with the configured pull.
#[cfg(target_os = "espidf")]
pub fn init_switch_inputs(gpio: &GpioConfig) -> Result<(), HwInitError> {
    let (pull_up, pull_down) = match gpio.switch_pull {
        Pull::Up => (gpio_pullup_t_GPIO_PULLUP_ENABLE, gpio_pulldown_t_GPIO_PULLDOWN_DISABLE),
        Pull::Down => (gpio_pullup_t_GPIO_PULLUP_DISABLE, gpio_pulldown_t_GPIO_PULLDOWN_ENABLE),
    };

    for (_, pin) in switch_pins(gpio) {
        let cfg = gpio_config_t {
            pin_bit_mask: 1u64 << pin,
            mode: gpio_mode_t_GPIO_MODE_INPUT,
            pull_up_en: pull_up,
            pull_down_en: pull_down,
            intr_type: gpio_int_type_t_GPIO_INTR_ANYEDGE,
        };
        // SAFETY: called once from main before the ISRs are registered.
        let ret = unsafe { gpio_config(&cfg) };
        if ret != ESP_OK as i32 {
            return Err(HwInitError::GpioConfigFailed(ret));
        }
    }

    info!(
        "hw_init: switch inputs configured (closed={}, open={}, pull={:?})",
        gpio.reed_closed_pin, gpio.reed_open_pin, gpio.switch_pull
    );
    Ok(())
}

#[cfg(not(target_os = "espidf"))]
pub fn init_switch_inputs(gpio: &GpioConfig) -> Result<(), HwInitError> {
    let pull = match gpio.switch_pull {
        Pull::Up => "up",
        Pull::Down => "down",
    };
    log::info!("hw_init(sim): switch inputs skipped (pull-{})", pull);
    Ok(())
}

/// Current reading of both switches, straight from the pins.
#[cfg(target_os = "espidf")]
pub fn read_switches(gpio: &GpioConfig) -> SwitchPair {
    // SAFETY: register reads on configured inputs.
    let closed_high = unsafe { gpio_get_level(i32::from(gpio.reed_closed_pin)) } != 0;
    let open_high = unsafe { gpio_get_level(i32::from(gpio.reed_open_pin)) } != 0;
    let invert = inverted(gpio);
    SwitchPair::from_levels(closed_high != invert, open_high != invert)
}

/// Simulation boots with the door closed.
#[cfg(not(target_os = "espidf"))]
pub fn read_switches(_gpio: &GpioConfig) -> SwitchPair {
    SwitchPair::AT_CLOSED
}

/// Sample both switches until two reads one debounce window apart agree.
/// Gives up after a few windows and returns the last read.
pub fn read_switches_settled(gpio: &GpioConfig, window_ms: u32) -> SwitchPair {
    const MAX_SAMPLES: usize = 5;
    let window = std::time::Duration::from_millis(u64::from(window_ms));
    let mut last = read_switches(gpio);
    for _ in 1..MAX_SAMPLES {
        std::thread::sleep(window);
        let next = read_switches(gpio);
        if next == last {
            return next;
        }
        last = next;
    }
    log::warn!("hw_init: switches still changing at boot: {:?}", last);
    last
}

/// [`SwitchInput`] over the configured reed switch pins.
pub struct GpioSwitchInput {
    gpio: GpioConfig,
}

impl GpioSwitchInput {
    pub fn new(gpio: GpioConfig) -> Self {
        Self { gpio }
    }
}

impl SwitchInput for GpioSwitchInput {
    fn read(&mut self) -> SwitchPair {
        read_switches(&self.gpio)
    }
}

// ── ISR service ───────────────────────────────────────────────

/// Install the per-pin ISR service and register a handler for each
/// switch that pushes onto `queue`.
#[cfg(target_os = "espidf")]
pub fn install_switch_isrs(gpio: &GpioConfig, queue: &Arc<EdgeQueue>) -> Result<SwitchIsrs, HwInitError> {
    // SAFETY: gpio_install_isr_service is idempotent; ESP_ERR_INVALID_STATE
    // means it was already installed.
    let ret = unsafe { gpio_install_isr_service(0) };
    if ret != ESP_OK as i32 && ret != ESP_ERR_INVALID_STATE as i32 {
        return Err(HwInitError::IsrInstallFailed(ret));
    }

    let mut isrs = SwitchIsrs { contexts: Vec::new() };
    for (switch, pin) in switch_pins(gpio) {
        let pin = i32::from(pin);
        let ctx = Box::into_raw(Box::new(IsrContext {
            queue: Arc::clone(queue),
            switch,
            pin,
            invert: inverted(gpio),
        }));
        // SAFETY: `ctx` stays valid until SwitchIsrs::drop removes the handler.
        let ret = unsafe { gpio_isr_handler_add(pin, Some(switch_isr), ctx.cast()) };
        if ret != ESP_OK as i32 {
            // SAFETY: registration failed, nothing else holds `ctx`.
            drop(unsafe { Box::from_raw(ctx) });
            return Err(HwInitError::IsrHandlerFailed(ret));
        }
        isrs.contexts.push(ctx);
        // SAFETY: handler registered above.
        unsafe { gpio_intr_enable(pin) };
    }

    info!("hw_init: switch ISRs installed (any edge)");
    Ok(isrs)
}

/// Simulation: contexts are created so ownership matches the target, but
/// no interrupt ever fires.  Tests push edges through the controller.
#[cfg(not(target_os = "espidf"))]
pub fn install_switch_isrs(gpio: &GpioConfig, queue: &Arc<EdgeQueue>) -> Result<SwitchIsrs, HwInitError> {
    let contexts = switch_pins(gpio)
        .into_iter()
        .map(|(switch, pin)| {
            Box::into_raw(Box::new(IsrContext {
                queue: Arc::clone(queue),
                switch,
                pin: i32::from(pin),
                invert: inverted(gpio),
            }))
        })
        .collect();
    log::info!("hw_init(sim): switch ISRs skipped");
    Ok(SwitchIsrs { contexts })
}
