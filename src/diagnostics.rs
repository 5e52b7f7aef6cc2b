//! Door event log and runtime diagnostics.
//!
//! The event log keeps the last 32 door events in RAM: accepted commands,
//! limit arrivals, faults and recoveries, each stamped with the time and
//! the resulting state.  Older records are overwritten.
//!
//! Runtime metrics (transition and pulse counters, ISR queue drops, heap)
//! are collected on demand.

use heapless::HistoryBuffer;

use crate::error::ErrorKind;
use crate::fsm::{DoorCommand, DoorState};
use crate::sensors::SwitchId;

pub const EVENT_LOG_CAPACITY: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    /// Controller started in the carried state.
    Boot,
    CommandAccepted(DoorCommand),
    LimitReached(SwitchId),
    Fault(ErrorKind),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventRecord {
    pub at_ms: u64,
    pub kind: EventKind,
    /// State after the event was handled.
    pub state: DoorState,
}

/// Fixed-capacity ring of [`EventRecord`]s.
pub struct EventLog {
    ring: HistoryBuffer<EventRecord, EVENT_LOG_CAPACITY>,
    total: u32,
}

impl Default for EventLog {
    fn default() -> Self {
        Self::new()
    }
}

impl EventLog {
    pub const fn new() -> Self {
        Self {
            ring: HistoryBuffer::new(),
            total: 0,
        }
    }

    pub fn record(&mut self, at_ms: u64, kind: EventKind, state: DoorState) {
        self.ring.write(EventRecord { at_ms, kind, state });
        self.total = self.total.wrapping_add(1);
    }

    /// Retained records, oldest first.
    pub fn recent(&self) -> Vec<EventRecord> {
        self.ring.oldest_ordered().copied().collect()
    }

    /// Records ever written, including overwritten ones.
    pub fn total(&self) -> u32 {
        self.total
    }

    pub fn clear(&mut self) {
        self.ring.clear();
    }
}

/// Runtime diagnostics snapshot collected on demand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuntimeMetrics {
    pub uptime_ms: u64,
    pub transitions: u32,
    pub relay_pulses: u32,
    pub safety_trips: u32,
    pub switch_bounces: u32,
    pub dropped_edges: u32,
    pub events_logged: u32,
    pub heap_free: u32,
}

/// Free heap in bytes; zero in simulation.
#[cfg(target_os = "espidf")]
pub fn heap_free() -> u32 {
    // SAFETY: read-only allocator statistics.
    unsafe { esp_idf_svc::sys::esp_get_free_heap_size() }
}

#[cfg(not(target_os = "espidf"))]
pub fn heap_free() -> u32 {
    0
}
