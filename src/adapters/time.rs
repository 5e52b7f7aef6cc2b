//! ESP32 time adapter.
//!
//! Implements [`Clock`] for the controller and stamps ISR edges.
//!
//! - **`target_os = "espidf"`**: wraps `esp_timer_get_time()` from the
//!   ESP-IDF high-resolution timer (microsecond precision, monotonic,
//!   ISR-safe).
//! - **`not(target_os = "espidf")`**: uses `std::time::Instant` for
//!   host-side runs.

use crate::app::ports::Clock;

/// Monotonic clock counting from boot (or from construction on host).
pub struct SystemClock {
    #[cfg(not(target_os = "espidf"))]
    start: std::time::Instant,
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            #[cfg(not(target_os = "espidf"))]
            start: std::time::Instant::now(),
        }
    }

    /// Microseconds since boot.
    #[cfg(target_os = "espidf")]
    pub fn uptime_us(&self) -> u64 {
        boot_time_us()
    }

    /// Microseconds since construction.
    #[cfg(not(target_os = "espidf"))]
    pub fn uptime_us(&self) -> u64 {
        self.start.elapsed().as_micros() as u64
    }
}

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        self.uptime_us() / 1_000
    }
}

/// Raw boot-relative timestamp, callable from ISR context.
#[cfg(target_os = "espidf")]
pub fn boot_time_us() -> u64 {
    // SAFETY: esp_timer_get_time reads the RTC counter; ISR-safe.
    (unsafe { esp_idf_svc::sys::esp_timer_get_time() }) as u64
}
