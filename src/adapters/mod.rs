//! Adapters: concrete implementations of the hexagonal port traits.
//!
//! | Adapter    | Implements      | Connects to                       |
//! |------------|-----------------|-----------------------------------|
//! | `hardware` | RelayOutput     | any `embedded-hal` output pin     |
//! | `log_sink` | StateListener   | Serial log output                 |
//! | `nvs`      | ConfigStore     | NVS / in-memory store             |
//! | `time`     | Clock           | ESP32 system timer / `Instant`    |

pub mod hardware;
pub mod log_sink;
pub mod nvs;
pub mod time;
