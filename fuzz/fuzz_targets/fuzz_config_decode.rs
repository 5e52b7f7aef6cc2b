//! Fuzz target: persisted config sections
//!
//! Feeds arbitrary bytes to the decoder for each config section and
//! verifies:
//! - No panics under arbitrary byte inputs
//! - Anything that decodes also passes validation
//! - A decoded section survives re-encoding unchanged
//!
//! cargo fuzz run fuzz_config_decode

#![no_main]

use garage_door::config::{self, ConfigSection, GpioConfig, MonitorConfig, RelayConfig};
use libfuzzer_sys::fuzz_target;

fn check<T: ConfigSection + PartialEq + core::fmt::Debug>(data: &[u8]) {
    if let Ok(cfg) = config::decode::<T>(data) {
        assert!(cfg.check().is_ok(), "decoded {} must be valid", T::KEY);
        let bytes = config::encode(&cfg).expect("valid section must encode");
        assert_eq!(config::decode::<T>(&bytes).ok(), Some(cfg));
    }
}

fuzz_target!(|data: &[u8]| {
    check::<GpioConfig>(data);
    check::<RelayConfig>(data);
    check::<MonitorConfig>(data);
});
