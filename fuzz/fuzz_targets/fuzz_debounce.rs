//! Fuzz target: switch debouncer
//!
//! Interprets the input as a stream of `(switch, level, gap)` triples fed
//! to the debouncer with monotonic timestamps, and verifies:
//! - No panics, no timestamp overflow
//! - Accepted changes flip their switch and come out in time order
//!   across both switches
//! - Nothing is left pending once the line has been quiet for a window
//!
//! cargo fuzz run fuzz_debounce

#![no_main]

use garage_door::events::RawEdge;
use garage_door::sensors::{SwitchChange, SwitchDebouncer, SwitchId, SwitchPair};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let mut deb = SwitchDebouncer::new(50, SwitchPair::AT_CLOSED);
    let mut now = 0u64;
    let mut pair = SwitchPair::AT_CLOSED;
    let mut last_at = 0u64;

    let mut check = |c: SwitchChange| {
        assert_ne!(pair.get(c.switch), c.state, "accepted change must flip the switch");
        assert!(c.at_ms >= last_at, "changes out of time order");
        pair = pair.with(c.switch, c.state);
        last_at = c.at_ms;
    };

    for chunk in data.chunks_exact(3) {
        let switch = if chunk[0] & 1 == 0 { SwitchId::ClosedLimit } else { SwitchId::OpenLimit };
        now += u64::from(chunk[2]);
        deb.on_edge(
            RawEdge {
                switch,
                level_high: chunk[1] & 1 == 1,
                at_ms: now,
            },
            &mut check,
        );
    }
    deb.poll(now + 1_000, &mut check);
    assert_eq!(deb.pair(), pair);

    let mut late = 0;
    deb.poll(now + 2_000, |_| late += 1);
    assert_eq!(late, 0, "runs left pending after a quiet window");
});
