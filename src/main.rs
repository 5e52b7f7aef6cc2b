//! Garage Door Controller Firmware: main entry point
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                      Adapters (outer ring)                     │
//! │                                                                │
//! │  HalRelay        LogListener     NvsConfigStore   SystemClock  │
//! │  (RelayOutput)   (StateListener) (ConfigStore)    (Clock)      │
//! │                                                                │
//! │  ──────────────── Port Trait Boundary ───────────────────      │
//! │                                                                │
//! │  ┌────────────────────────────────────────────────────────┐    │
//! │  │            DoorController (domain core)                │    │
//! │  │  FSM · Debouncer · Relay · Safety · Event log          │    │
//! │  └────────────────────────────────────────────────────────┘    │
//! │                                                                │
//! │  GPIO ISRs ──▶ EdgeQueue ──▶ door-edges task                   │
//! │                              door-safety task                  │
//! └────────────────────────────────────────────────────────────────┘
//! ```
#![deny(unused_must_use)]

use std::time::Duration;

use anyhow::Result;
use esp_idf_hal::gpio::{AnyOutputPin, PinDriver};
use log::{error, info, warn};

use garage_door::adapters::hardware::HalRelay;
use garage_door::adapters::log_sink::LogListener;
use garage_door::adapters::nvs::NvsConfigStore;
use garage_door::adapters::time::SystemClock;
use garage_door::config;
use garage_door::drivers::hw_init;
use garage_door::DoorController;

/// Dispatcher and safety timer period.
const TASK_PERIOD: Duration = Duration::from_millis(10);

/// Status log interval in the main loop.
const STATUS_INTERVAL: Duration = Duration::from_secs(10);

fn main() -> Result<()> {
    // ── 1. ESP-IDF bootstrap ──────────────────────────────────
    esp_idf_svc::sys::link_patches();
    esp_idf_logger::init()?;

    info!("╔══════════════════════════════════════╗");
    info!("║  Garage Door v{}                    ║", env!("CARGO_PKG_VERSION"));
    info!("╚══════════════════════════════════════╝");

    // ── 2. Load config from NVS (or defaults) ─────────────────
    let mut store = NvsConfigStore::new().map_err(|e| anyhow::anyhow!("NVS init failed: {}", e))?;
    let cfg = config::load_all(&mut store);
    info!(
        "Config: closed={} open={} relay={} pull={:?} timeout={}ms",
        cfg.gpio.reed_closed_pin,
        cfg.gpio.reed_open_pin,
        cfg.gpio.relay_pin,
        cfg.gpio.switch_pull,
        cfg.monitor.operation_timeout_ms
    );

    // ── 3. Switch inputs and relay output ─────────────────────
    hw_init::init_switch_inputs(&cfg.gpio)?;
    let switches = hw_init::read_switches_settled(&cfg.gpio, cfg.monitor.debounce_ms);

    // SAFETY: the relay pin comes from a validated GpioConfig and is
    // distinct from both switch pins; nothing else claims it.
    let relay_pin = unsafe { AnyOutputPin::new(i32::from(cfg.gpio.relay_pin)) };
    let relay = HalRelay::new(PinDriver::output(relay_pin)?);

    // ── 4. Controller ─────────────────────────────────────────
    let controller = DoorController::init(cfg, store, relay, SystemClock::new(), switches);
    controller.register_state_listener(LogListener::new());

    let _isrs = hw_init::install_switch_isrs(&cfg.gpio, &controller.edge_queue())?;
    controller.register_switch_input(hw_init::GpioSwitchInput::new(cfg.gpio));
    // Edges between the boot read and ISR install were never queued.
    controller.resync_switches();
    controller.spawn_tasks(TASK_PERIOD)?;

    info!("Door controller running");

    // ── 5. Status loop ────────────────────────────────────────
    loop {
        std::thread::sleep(STATUS_INTERVAL);

        let m = controller.metrics();
        match controller.last_error() {
            Some(kind) => error!(
                "Status: {} at {} (error: {})",
                controller.state().name(),
                controller.position(),
                kind
            ),
            None => info!(
                "Status: {} at {} | pulses={} trips={} heap={}",
                controller.state().name(),
                controller.position(),
                m.relay_pulses,
                m.safety_trips,
                m.heap_free
            ),
        }
        if m.dropped_edges > 0 {
            warn!("Status: {} switch edges dropped", m.dropped_edges);
        }
    }
}
