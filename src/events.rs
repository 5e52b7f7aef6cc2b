//! Interrupt-driven raw edge queue.
//!
//! The reed switch ISRs do the bare minimum: read the pin level, stamp it
//! and push a [`RawEdge`] here.  Debouncing and everything that follows
//! runs in the dispatcher task that drains the queue.
//!
//! ```text
//! ┌──────────────────┐     ┌──────────────┐     ┌──────────────────┐
//! │ closed-limit ISR │────▶│              │     │ dispatcher task  │
//! │ open-limit ISR   │────▶│  EdgeQueue   │────▶│ debounce + FSM   │
//! │ test harness     │────▶│  (lock-free) │     │ (consumer)       │
//! └──────────────────┘     └──────────────┘     └──────────────────┘
//! ```

use core::sync::atomic::{AtomicU32, Ordering};

use heapless::mpmc::MpMcQueue;

use crate::sensors::SwitchId;

/// Maximum number of pending edges.  Must be a power of 2.
pub const EDGE_QUEUE_CAP: usize = 32;

/// One raw level change as seen by the ISR.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawEdge {
    pub switch: SwitchId,
    /// GPIO level after the edge.
    pub level_high: bool,
    pub at_ms: u64,
}

/// Multi-producer queue of raw edges.
///
/// Both switch ISRs may push concurrently (two cores), so the queue is
/// MPMC rather than SPSC.  No locks, no allocation; safe from ISR context.
pub struct EdgeQueue {
    queue: MpMcQueue<RawEdge, EDGE_QUEUE_CAP>,
    dropped: AtomicU32,
}

impl EdgeQueue {
    pub const fn new() -> Self {
        Self {
            queue: MpMcQueue::new(),
            dropped: AtomicU32::new(0),
        }
    }

    /// Push an edge.  Returns `false` if the queue was full and the edge
    /// was dropped.
    pub fn push(&self, edge: RawEdge) -> bool {
        if self.queue.enqueue(edge).is_ok() {
            true
        } else {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            false
        }
    }

    pub fn pop(&self) -> Option<RawEdge> {
        self.queue.dequeue()
    }

    /// Drain all pending edges into a callback, FIFO.
    pub fn drain(&self, mut handler: impl FnMut(RawEdge)) -> usize {
        let mut n = 0;
        while let Some(edge) = self.pop() {
            handler(edge);
            n += 1;
        }
        n
    }

    /// Edges lost to overflow since construction.
    pub fn dropped(&self) -> u32 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl Default for EdgeQueue {
    fn default() -> Self {
        Self::new()
    }
}
