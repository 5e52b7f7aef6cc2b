//! Reed switch debouncer.
//!
//! Raw edges arrive from the ISR queue (see [`crate::events`]) already
//! timestamped.  A level different from the stable one opens a *pending
//! run*; the run is accepted once it has persisted for the debounce
//! window, measured from its first edge.  An edge back to the stable
//! level cancels the run.
//!
//! ```text
//!  raw   ‾‾‾|_|‾|___________________
//!           ^ run starts    ^ window closes → one SwitchChange
//!             ^ cancelled
//!               ^ run restarts
//! ```
//!
//! Acceptance is evaluated both when the next edge arrives and on every
//! [`poll`](SwitchDebouncer::poll), so a quiet line still settles.  Matured
//! runs of both switches are accepted in the order their windows closed,
//! so the pair never passes through a state the door did not.

use super::{SwitchId, SwitchPair, SwitchState};
use crate::events::RawEdge;

/// Emitted once per accepted stable transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwitchChange {
    pub switch: SwitchId,
    pub state: SwitchState,
    pub at_ms: u64,
}

#[derive(Debug, Clone, Copy)]
struct PendingRun {
    state: SwitchState,
    since_ms: u64,
}

pub struct SwitchDebouncer {
    window_ms: u64,
    stable: SwitchPair,
    pending: [Option<PendingRun>; 2],
    /// Runs cancelled by a bounce back to the stable level.
    bounces: u32,
}

impl SwitchDebouncer {
    pub fn new(window_ms: u32, initial: SwitchPair) -> Self {
        Self {
            window_ms: u64::from(window_ms),
            stable: initial,
            pending: [None, None],
            bounces: 0,
        }
    }

    /// Feed one raw edge.  Runs of either switch that matured by the
    /// edge's timestamp are accepted first.
    pub fn on_edge(&mut self, edge: RawEdge, mut on_change: impl FnMut(SwitchChange)) {
        self.settle(edge.at_ms, &mut on_change);

        let i = edge.switch.index();
        let state = edge.switch.state_for_level(edge.level_high);

        if state == self.stable.get(edge.switch) {
            if self.pending[i].take().is_some() {
                self.bounces = self.bounces.wrapping_add(1);
            }
            return;
        }

        match self.pending[i] {
            Some(run) if run.state == state => {}
            _ => {
                self.pending[i] = Some(PendingRun {
                    state,
                    since_ms: edge.at_ms,
                });
            }
        }
    }

    /// Accept every pending run whose window has closed by `now_ms`.
    pub fn poll(&mut self, now_ms: u64, mut on_change: impl FnMut(SwitchChange)) {
        self.settle(now_ms, &mut on_change);
    }

    pub fn pair(&self) -> SwitchPair {
        self.stable
    }

    pub fn bounces(&self) -> u32 {
        self.bounces
    }

    /// Runs already pending keep their start time and use the new window.
    pub fn set_window_ms(&mut self, window_ms: u32) {
        self.window_ms = u64::from(window_ms);
    }

    fn settle<F: FnMut(SwitchChange)>(&mut self, now_ms: u64, on_change: &mut F) {
        while let Some(change) = self.next_matured(now_ms) {
            self.pending[change.switch.index()] = None;
            self.stable = self.stable.with(change.switch, change.state);
            on_change(change);
        }
    }

    /// Earliest run whose window closed by `now_ms`.  On a tie a switch
    /// leaving its limit goes before one arriving at its limit.
    fn next_matured(&self, now_ms: u64) -> Option<SwitchChange> {
        SwitchId::ALL
            .into_iter()
            .filter_map(|switch| {
                let run = self.pending[switch.index()]?;
                let at_ms = run.since_ms + self.window_ms;
                (at_ms <= now_ms).then_some(SwitchChange {
                    switch,
                    state: run.state,
                    at_ms,
                })
            })
            .min_by_key(|c| (c.at_ms, c.switch.is_at_limit(c.state)))
    }
}
