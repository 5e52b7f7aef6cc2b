//! Door controller: the hexagonal core.
//!
//! [`DoorController`] owns the FSM, debouncer, relay actuator and safety
//! monitor behind one mutex.  Every public operation takes the lock for
//! the smallest section needed and queues the resulting notifications on
//! an outbox before releasing it.  Whoever holds the publish lock drains
//! the outbox, so listeners see notifications in the order the state
//! changed, and never with the state lock held.
//!
//! ```text
//!  ISR ──▶ EdgeQueue ──▶ process_edges ─┐
//!                                       ▼
//!  request_* ─────────────▶ ┌────────────────────────┐ ──▶ StateListener
//!                           │  Mutex<Inner>           │ ──▶ Condvar waiters
//!  service_timers ────────▶ │  FSM · Debounce · Relay │ ──▶ AtomicU32 snapshot
//!                           │  Safety · EventLog      │
//!                           └────────────────────────┘ ──▶ RelayOutput
//! ```
//!
//! Reads of state, position and last error go through a packed atomic
//! snapshot and never touch the lock.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError, TryLockError, Weak};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use log::{debug, error, info, warn};

use crate::config::{self, ConfigSection, ControllerConfig, GpioConfig, MonitorConfig, RelayConfig};
use crate::diagnostics::{self, EventKind, EventLog, EventRecord, RuntimeMetrics};
use crate::drivers::relay::RelayActuator;
use crate::drivers::task_pin::{self, Core, TaskSpec};
use crate::error::{Error, ErrorKind, Result};
use crate::events::{EdgeQueue, RawEdge};
use crate::fsm::states::build_state_table;
use crate::fsm::{CommandOutcome, DoorCommand, DoorState, Fsm, LimitOutcome};
use crate::safety::SafetyMonitor;
use crate::sensors::position::{self, Inference};
use crate::sensors::{DoorPosition, SwitchChange, SwitchDebouncer, SwitchId, SwitchPair};

use super::commands::AppCommand;
use super::events::DoorNotification;
use super::ports::{Clock, ConfigStore, RelayOutput, StateListener, SwitchInput};

// ───────────────────────────────────────────────────────────────
// Lock-free snapshot
// ───────────────────────────────────────────────────────────────

/// `[error+1 : 8][position : 8][state : 8]`, error byte 0 = none.
fn pack(state: DoorState, position: DoorPosition, error: Option<ErrorKind>) -> u32 {
    let err = error.map_or(0, |k| k as u32 + 1);
    (err << 16) | (u32::from(position.percent()) << 8) | state as u32
}

fn unpack_state(word: u32) -> DoorState {
    DoorState::from_index((word & 0xff) as usize)
}

fn unpack_position(word: u32) -> DoorPosition {
    DoorPosition::new(((word >> 8) & 0xff) as u8)
}

fn unpack_error(word: u32) -> Option<ErrorKind> {
    match (word >> 16) & 0xff {
        0 => None,
        n => ErrorKind::from_index(n as usize - 1),
    }
}

// ───────────────────────────────────────────────────────────────
// Supervisor tasks
// ───────────────────────────────────────────────────────────────

/// Drains the ISR edge queue through the debouncer.
const EDGE_TASK: TaskSpec = TaskSpec {
    name: "door-edges\0",
    core: Core::App,
    priority: 6,
    stack_kb: 8,
};

/// Relay pulse timing and the failsafe timer.  Outranks the dispatcher.
const SAFETY_TASK: TaskSpec = TaskSpec {
    name: "door-safety\0",
    core: Core::App,
    priority: 7,
    stack_kb: 8,
};

// ───────────────────────────────────────────────────────────────
// Guarded state
// ───────────────────────────────────────────────────────────────

type Notes = Vec<DoorNotification>;

struct Inner<O: RelayOutput> {
    fsm: Fsm,
    debouncer: SwitchDebouncer,
    /// Switch pair as last handled by the FSM.
    pair: SwitchPair,
    position: DoorPosition,
    relay: RelayActuator<O>,
    safety: SafetyMonitor,
    config: ControllerConfig,
    last_error: Option<ErrorKind>,
    log: EventLog,
    shut_down: bool,
}

impl<O: RelayOutput> Inner<O> {
    fn snapshot_word(&self) -> u32 {
        pack(self.fsm.current_state(), self.position, self.last_error)
    }

    /// Transition and queue a notification.  No-op on self-transition.
    fn enter(&mut self, next: DoorState, now_ms: u64, error: Option<ErrorKind>, notes: &mut Notes) {
        let previous = self.fsm.current_state();
        if !self.fsm.transition(next) {
            return;
        }
        if !next.is_moving() {
            self.safety.disarm();
        }
        self.position = position::infer(self.pair, next.is_moving(), self.position);
        notes.push(DoorNotification {
            state: next,
            previous,
            position: self.position,
            error,
            at_ms: now_ms,
        });
    }

    fn refresh_position(&mut self, now_ms: u64, notes: &mut Notes) {
        let state = self.fsm.current_state();
        let next = position::infer(self.pair, state.is_moving(), self.position);
        if next == self.position {
            return;
        }
        self.position = next;
        notes.push(DoorNotification {
            state,
            previous: state,
            position: next,
            error: None,
            at_ms: now_ms,
        });
    }

    /// Force `Error` for a state-forcing fault.
    fn fault(&mut self, err: Error, now_ms: u64, notes: &mut Notes) {
        let kind = err.kind();
        error!("Door fault: {}", err);
        self.last_error = Some(kind);
        self.safety.disarm();
        if self.relay.is_active() {
            self.relay.force_release(now_ms);
        }
        self.log.record(now_ms, EventKind::Fault(kind), DoorState::Error);
        self.enter(DoorState::Error, now_ms, Some(kind), notes);
    }

    fn apply_command(&mut self, cmd: DoorCommand, now_ms: u64, notes: &mut Notes) -> Result<DoorState> {
        let from = self.fsm.current_state();
        if self.shut_down {
            warn!("Command {:?} rejected: controller shut down", cmd);
            return Err(Error::InvalidTransition { from, command: cmd });
        }

        match self.fsm.on_command(cmd) {
            CommandOutcome::Move(direction) => {
                if let Err(e) = self.relay.pulse(direction, now_ms) {
                    warn!("Command {:?} in {} refused: {}", cmd, from.name(), e);
                    return Err(e);
                }
                let next = direction.moving_state();
                self.safety.arm(direction, now_ms, self.pair.resting_limit());
                self.log.record(now_ms, EventKind::CommandAccepted(cmd), next);
                self.enter(next, now_ms, None, notes);
                Ok(next)
            }
            CommandOutcome::Halt => {
                self.relay.stop();
                self.safety.disarm();
                self.log.record(now_ms, EventKind::CommandAccepted(cmd), DoorState::Stopped);
                self.enter(DoorState::Stopped, now_ms, None, notes);
                Ok(DoorState::Stopped)
            }
            CommandOutcome::Ignore => {
                self.safety.disarm();
                debug!("Command {:?} in {}: nothing to do", cmd, from.name());
                Ok(from)
            }
            CommandOutcome::Recover => {
                let next = match position::classify(self.pair) {
                    Inference::AtClosedLimit => DoorState::Closed,
                    Inference::AtOpenLimit => DoorState::Open,
                    Inference::BetweenLimits => DoorState::Stopped,
                    Inference::Inconsistent => {
                        warn!("Reset refused: both limit switches active");
                        return Err(Error::SwitchInconsistency);
                    }
                };
                info!("Reset: clearing {:?}", self.last_error);
                self.last_error = None;
                self.log.record(now_ms, EventKind::CommandAccepted(cmd), next);
                self.enter(next, now_ms, None, notes);
                Ok(next)
            }
            CommandOutcome::Reject => {
                warn!("Command {:?} rejected in {}", cmd, from.name());
                Err(Error::InvalidTransition { from, command: cmd })
            }
        }
    }

    fn on_switch_change(&mut self, change: SwitchChange, notes: &mut Notes) {
        let now_ms = change.at_ms;
        self.pair = self.pair.with(change.switch, change.state);
        self.safety.note_switch_change(change.switch, change.state);
        debug!("Switch {} -> {:?} at {}ms", change.switch.name(), change.state, now_ms);

        let state = self.fsm.current_state();
        if position::classify(self.pair) == Inference::Inconsistent {
            if state.is_moving() {
                self.fault(Error::SwitchInconsistency, now_ms, notes);
            } else {
                warn!("Both limit switches active while {}", state.name());
            }
            return;
        }

        if change.switch.is_at_limit(change.state) {
            match self.fsm.on_limit(change.switch) {
                LimitOutcome::Arrive(next) => {
                    if state.is_moving() {
                        info!("Limit reached: {}", change.switch.name());
                    } else if next != state {
                        info!("Door moved externally: now {}", next.name());
                    }
                    self.log.record(now_ms, EventKind::LimitReached(change.switch), next);
                    self.enter(next, now_ms, None, notes);
                }
                LimitOutcome::Reversed => {
                    if let Some(direction) = state.direction() {
                        self.fault(Error::Obstruction { direction }, now_ms, notes);
                    }
                    return;
                }
                LimitOutcome::Ignore => {}
            }
        }

        self.refresh_position(now_ms, notes);
    }

    fn service_timers(&mut self, now_ms: u64, notes: &mut Notes) {
        match self.relay.poll(now_ms) {
            Ok(Some(end)) => debug!("Relay pulse ({:?}) complete", end.direction),
            Ok(None) => {}
            Err(e) => self.fault(e, now_ms, notes),
        }

        if let Some(trip) = self.safety.check(now_ms) {
            if self.fsm.current_state().is_moving() {
                self.fault(trip.into_error(), now_ms, notes);
            }
        }
    }
}

// ───────────────────────────────────────────────────────────────
// DoorController
// ───────────────────────────────────────────────────────────────

/// Owned controller handle.  Create with [`init`](Self::init), share as
/// `Arc`, tear down with [`deinit`](Self::deinit).
pub struct DoorController<O: RelayOutput, C: Clock, S: ConfigStore> {
    inner: Mutex<Inner<O>>,
    changed: Condvar,
    snapshot: AtomicU32,
    listeners: Mutex<Vec<Arc<dyn StateListener>>>,
    /// Notifications in state-lock order, waiting for delivery.
    outbox: Mutex<VecDeque<DoorNotification>>,
    /// Held while draining the outbox.  Never taken with `inner` held.
    publishing: Mutex<()>,
    edges: Arc<EdgeQueue>,
    /// `edges.dropped()` as of the last dispatcher pass.
    seen_dropped: AtomicU32,
    resync: AtomicBool,
    switch_input: Mutex<Option<Box<dyn SwitchInput>>>,
    clock: C,
    store: Mutex<S>,
    running: AtomicBool,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl<O, C, S> DoorController<O, C, S>
where
    O: RelayOutput,
    C: Clock,
    S: ConfigStore,
{
    /// Build a controller from an already-loaded config.
    ///
    /// `switches` is the debounced reading at boot; the initial state is
    /// derived from it.  An invalid `config` is replaced by defaults.
    pub fn init(config: ControllerConfig, store: S, output: O, clock: C, switches: SwitchPair) -> Arc<Self> {
        let config = match config.validate() {
            Ok(()) => config,
            Err(e) => {
                warn!("Controller config rejected ({}); using defaults", e);
                ControllerConfig::default()
            }
        };
        let now_ms = clock.now_ms();

        let (initial, boot_error) = match position::classify(switches) {
            Inference::AtClosedLimit => (DoorState::Closed, None),
            Inference::AtOpenLimit => (DoorState::Open, None),
            Inference::BetweenLimits => (DoorState::Stopped, None),
            Inference::Inconsistent => {
                error!("Boot: both limit switches active");
                (DoorState::Error, Some(ErrorKind::SwitchInconsistency))
            }
        };

        let mut log = EventLog::new();
        log.record(now_ms, EventKind::Boot, initial);

        let inner = Inner {
            fsm: Fsm::new(build_state_table(), initial),
            debouncer: SwitchDebouncer::new(config.monitor.debounce_ms, switches),
            pair: switches,
            position: position::infer(switches, false, DoorPosition::CLOSED),
            relay: RelayActuator::new(output, config.relay),
            safety: SafetyMonitor::new(config.monitor),
            config,
            last_error: boot_error,
            log,
            shut_down: false,
        };
        let snapshot = AtomicU32::new(inner.snapshot_word());

        info!(
            "Door controller ready: {} at {}",
            initial.name(),
            inner.position
        );

        Arc::new(Self {
            inner: Mutex::new(inner),
            changed: Condvar::new(),
            snapshot,
            listeners: Mutex::new(Vec::new()),
            outbox: Mutex::new(VecDeque::new()),
            publishing: Mutex::new(()),
            edges: Arc::new(EdgeQueue::new()),
            seen_dropped: AtomicU32::new(0),
            resync: AtomicBool::new(false),
            switch_input: Mutex::new(None),
            clock,
            store: Mutex::new(store),
            running: AtomicBool::new(false),
            tasks: Mutex::new(Vec::new()),
        })
    }

    /// Load every config section from `store` (defaults persisted on
    /// absence or invalid data), then [`init`](Self::init).
    pub fn init_from_store(mut store: S, output: O, clock: C, switches: SwitchPair) -> Arc<Self> {
        let config = config::load_all(&mut store);
        Self::init(config, store, output, clock, switches)
    }

    // ── Commands ──────────────────────────────────────────────

    pub fn request_open(&self) -> Result<DoorState> {
        self.command(DoorCommand::Open)
    }

    pub fn request_close(&self) -> Result<DoorState> {
        self.command(DoorCommand::Close)
    }

    /// Always honored: halts a movement, disarms the failsafe otherwise.
    pub fn request_stop(&self) -> Result<DoorState> {
        self.command(DoorCommand::Stop)
    }

    /// Leave `Error`; the next state is derived from the switches.
    pub fn request_reset(&self) -> Result<DoorState> {
        self.command(DoorCommand::Reset)
    }

    /// Dispatch an inbound [`AppCommand`].  Returns the resulting state.
    pub fn handle(&self, cmd: AppCommand) -> Result<DoorState> {
        match cmd {
            AppCommand::Door(c) => self.command(c),
            AppCommand::SetOperationTimeout(ms) => self.set_operation_timeout(ms).map(|()| self.state()),
            AppCommand::UpdateRelayConfig(c) => self.update_relay_config(c).map(|()| self.state()),
            AppCommand::UpdateMonitorConfig(c) => self.update_monitor_config(c).map(|()| self.state()),
            AppCommand::UpdateGpioConfig(c) => self.update_gpio_config(c).map(|()| self.state()),
            AppCommand::FactoryReset => {
                self.factory_reset();
                Ok(self.state())
            }
        }
    }

    fn command(&self, cmd: DoorCommand) -> Result<DoorState> {
        let now_ms = self.clock.now_ms();
        let mut notes = Notes::new();
        let result = {
            let mut inner = self.lock();
            let r = inner.apply_command(cmd, now_ms, &mut notes);
            self.commit(&inner, notes);
            r
        };
        self.publish();
        result
    }

    // ── Sensor input ──────────────────────────────────────────

    /// ISR entry point: record one raw edge.  Lock-free; returns `false`
    /// if the queue was full.
    pub fn on_raw_edge(&self, switch: SwitchId, level_high: bool, at_ms: u64) -> bool {
        self.edges.push(RawEdge {
            switch,
            level_high,
            at_ms,
        })
    }

    /// Queue handle for the GPIO ISRs.
    pub fn edge_queue(&self) -> Arc<EdgeQueue> {
        Arc::clone(&self.edges)
    }

    /// Source for direct level reads when queued edges may be missing.
    pub fn register_switch_input<I: SwitchInput + 'static>(&self, input: I) {
        *self.switch_input.lock().unwrap_or_else(PoisonError::into_inner) = Some(Box::new(input));
    }

    /// Re-read both switches on the next dispatcher pass and feed the
    /// levels through the debouncer.
    pub fn resync_switches(&self) {
        self.resync.store(true, Ordering::Release);
    }

    /// Drain the edge queue through the debouncer and feed accepted
    /// switch changes to the FSM.  Returns the number of changes handled.
    ///
    /// After an overflow the switch levels are re-read, so a dropped final
    /// edge cannot leave the debounced state behind the door.
    pub fn process_edges(&self) -> usize {
        let mut raw = Vec::new();
        self.edges.drain(|e| raw.push(e));

        let now_ms = self.clock.now_ms();
        if self.take_resync() {
            raw.extend(self.sample_switches(now_ms));
        }
        raw.sort_by_key(|e| e.at_ms);

        let mut notes = Notes::new();
        let handled = {
            let mut inner = self.lock();
            let mut changes = Vec::new();
            for edge in raw {
                inner.debouncer.on_edge(edge, |c| changes.push(c));
            }
            inner.debouncer.poll(now_ms, |c| changes.push(c));
            for change in &changes {
                inner.on_switch_change(*change, &mut notes);
            }
            self.commit(&inner, notes);
            changes.len()
        };
        self.publish();
        handled
    }

    fn take_resync(&self) -> bool {
        let dropped = self.edges.dropped();
        let previous = self.seen_dropped.swap(dropped, Ordering::AcqRel);
        let lost = previous != dropped;
        if lost {
            warn!("{} switch edges dropped; re-reading levels", dropped.wrapping_sub(previous));
        }
        self.resync.swap(false, Ordering::AcqRel) || lost
    }

    /// Current levels as edges stamped `now_ms`.
    fn sample_switches(&self, now_ms: u64) -> Vec<RawEdge> {
        let mut input = self.switch_input.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(input) = input.as_mut() else {
            warn!("No switch input registered; levels not re-read");
            return Vec::new();
        };
        let pair = input.read();
        debug!("Switch levels re-read: {:?}", pair);
        SwitchId::ALL
            .into_iter()
            .map(|switch| RawEdge {
                switch,
                level_high: switch.level_for_state(pair.get(switch)),
                at_ms: now_ms,
            })
            .collect()
    }

    /// Advance relay timing and the failsafe timer.
    pub fn service_timers(&self) {
        let now_ms = self.clock.now_ms();
        let mut notes = Notes::new();
        {
            let mut inner = self.lock();
            inner.service_timers(now_ms, &mut notes);
            self.commit(&inner, notes);
        }
        self.publish();
    }

    /// One dispatcher pass followed by one timer pass.
    pub fn tick(&self) {
        self.process_edges();
        self.service_timers();
    }

    // ── Queries (lock-free) ───────────────────────────────────

    pub fn state(&self) -> DoorState {
        unpack_state(self.snapshot.load(Ordering::Acquire))
    }

    pub fn position(&self) -> DoorPosition {
        unpack_position(self.snapshot.load(Ordering::Acquire))
    }

    /// The fault that put the door in `Error`, until reset.
    pub fn last_error(&self) -> Option<ErrorKind> {
        unpack_error(self.snapshot.load(Ordering::Acquire))
    }

    pub fn is_moving(&self) -> bool {
        self.state().is_moving()
    }

    /// Block until the door is in `target` or `timeout` elapses.
    pub fn wait_for_state(&self, target: DoorState, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut inner = self.lock();
        loop {
            if inner.fsm.current_state() == target {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            let (guard, _) = self
                .changed
                .wait_timeout(inner, deadline - now)
                .unwrap_or_else(PoisonError::into_inner);
            inner = guard;
        }
    }

    /// Door event log, oldest first.
    pub fn recent_events(&self) -> Vec<EventRecord> {
        self.lock().log.recent()
    }

    pub fn switches(&self) -> SwitchPair {
        self.lock().pair
    }

    pub fn metrics(&self) -> RuntimeMetrics {
        let now_ms = self.clock.now_ms();
        let inner = self.lock();
        RuntimeMetrics {
            uptime_ms: now_ms,
            transitions: inner.fsm.transition_count(),
            relay_pulses: inner.relay.pulse_count(),
            safety_trips: inner.safety.trip_count(),
            switch_bounces: inner.debouncer.bounces(),
            dropped_edges: self.edges.dropped(),
            events_logged: inner.log.total(),
            heap_free: diagnostics::heap_free(),
        }
    }

    // ── Listeners ─────────────────────────────────────────────

    /// Register a callback for every state or position change.
    pub fn register_state_listener<L: StateListener + 'static>(&self, listener: L) {
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Arc::new(listener));
    }

    // ── Configuration ─────────────────────────────────────────

    pub fn config(&self) -> ControllerConfig {
        self.lock().config
    }

    /// Validate, apply to the relay from the next pulse, persist.
    pub fn update_relay_config(&self, cfg: RelayConfig) -> Result<()> {
        cfg.validate()?;
        {
            let mut inner = self.lock();
            inner.relay.set_config(cfg);
            inner.config.relay = cfg;
        }
        info!("Relay config updated: {:?}", cfg);
        self.persist(&cfg);
        Ok(())
    }

    /// Validate, apply to the monitor and debouncer, persist.
    pub fn update_monitor_config(&self, cfg: MonitorConfig) -> Result<()> {
        cfg.validate()?;
        {
            let mut inner = self.lock();
            inner.safety.set_config(cfg);
            inner.debouncer.set_window_ms(cfg.debounce_ms);
            inner.config.monitor = cfg;
        }
        info!("Monitor config updated: {:?}", cfg);
        self.persist(&cfg);
        Ok(())
    }

    /// Change the failsafe timeout.  The obstruction grace window is
    /// capped at half the new timeout.
    pub fn set_operation_timeout(&self, timeout_ms: u32) -> Result<()> {
        if timeout_ms < config::MIN_OPERATION_TIMEOUT_MS {
            return Err(Error::ConfigInvalid("operation timeout below 1000ms"));
        }
        let current = self.config().monitor;
        self.update_monitor_config(MonitorConfig {
            operation_timeout_ms: timeout_ms,
            obstruction_grace_ms: current.obstruction_grace_ms.min(timeout_ms / 2),
            ..current
        })
    }

    /// Validate and persist; pin changes take effect at next boot.
    pub fn update_gpio_config(&self, cfg: GpioConfig) -> Result<()> {
        cfg.validate()?;
        self.lock().config.gpio = cfg;
        info!("GPIO config updated (applies at next boot): {:?}", cfg);
        self.persist(&cfg);
        Ok(())
    }

    /// Restore every config section to defaults, persist them, and clear
    /// the event log.  Door state is untouched.
    pub fn factory_reset(&self) {
        let defaults = ControllerConfig::default();
        {
            let mut inner = self.lock();
            inner.relay.set_config(defaults.relay);
            inner.safety.set_config(defaults.monitor);
            inner.debouncer.set_window_ms(defaults.monitor.debounce_ms);
            inner.config = defaults;
            inner.log.clear();
        }
        warn!("Factory reset: config restored to defaults");
        self.persist(&defaults.gpio);
        self.persist(&defaults.relay);
        self.persist(&defaults.monitor);
    }

    fn persist<T: ConfigSection>(&self, cfg: &T) {
        let mut store = self.store.lock().unwrap_or_else(PoisonError::into_inner);
        config::persist(&mut *store, cfg);
    }

    // ── Lifecycle ─────────────────────────────────────────────

    /// Stop the supervisor tasks, release the relay, disarm the monitor.
    /// Later commands are rejected.
    pub fn deinit(&self) {
        self.running.store(false, Ordering::Release);
        let handles: Vec<_> = self
            .tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect();
        for h in handles {
            if h.join().is_err() {
                warn!("Controller task panicked");
            }
        }

        let now_ms = self.clock.now_ms();
        let mut inner = self.lock();
        inner.relay.force_release(now_ms);
        inner.safety.disarm();
        inner.shut_down = true;
        info!("Door controller shut down in {}", inner.fsm.current_state().name());
    }

    // ── Internal ──────────────────────────────────────────────

    fn lock(&self) -> MutexGuard<'_, Inner<O>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Publish the snapshot and queue `notes`.  Called with the state
    /// lock held, so the outbox order is the order of the changes.
    fn commit(&self, inner: &Inner<O>, notes: Notes) {
        self.snapshot.store(inner.snapshot_word(), Ordering::Release);
        if !notes.is_empty() {
            self.outbox_lock().extend(notes);
            self.changed.notify_all();
        }
    }

    fn outbox_lock(&self) -> MutexGuard<'_, VecDeque<DoorNotification>> {
        self.outbox.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Deliver queued notifications in order.  If another caller (or a
    /// listener further up this stack) is already delivering, it picks up
    /// whatever was queued here.  Never called with the state lock held.
    fn publish(&self) {
        loop {
            let guard = match self.publishing.try_lock() {
                Ok(guard) => guard,
                Err(TryLockError::Poisoned(p)) => p.into_inner(),
                Err(TryLockError::WouldBlock) => return,
            };
            loop {
                let Some(note) = self.outbox_lock().pop_front() else {
                    break;
                };
                let listeners: Vec<_> = self
                    .listeners
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .clone();
                for l in &listeners {
                    l.on_state_change(&note);
                }
            }
            drop(guard);
            // A note queued between the last pop and the unlock above
            // found the lock taken and left it to us.
            if self.outbox_lock().is_empty() {
                return;
            }
        }
    }
}

impl<O, C, S> DoorController<O, C, S>
where
    O: RelayOutput + 'static,
    C: Clock + 'static,
    S: ConfigStore + 'static,
{
    /// Start the edge dispatcher and safety timer tasks, each running
    /// every `period`.  Idempotent.
    pub fn spawn_tasks(self: &Arc<Self>, period: Duration) -> std::io::Result<()> {
        if self.running.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        let dispatcher = Self::spawn_loop(Arc::downgrade(self), EDGE_TASK, period, |c| {
            c.process_edges();
        })?;
        let timer = match Self::spawn_loop(Arc::downgrade(self), SAFETY_TASK, period, Self::service_timers) {
            Ok(h) => h,
            Err(e) => {
                self.running.store(false, Ordering::Release);
                if dispatcher.join().is_err() {
                    warn!("Controller task panicked");
                }
                return Err(e);
            }
        };

        let mut tasks = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
        tasks.push(dispatcher);
        tasks.push(timer);
        info!("Controller tasks started ({}ms period)", period.as_millis());
        Ok(())
    }

    fn spawn_loop(weak: Weak<Self>, spec: TaskSpec, period: Duration, body: fn(&Self)) -> std::io::Result<JoinHandle<()>> {
        task_pin::spawn_on_core(spec, move || {
            loop {
                let Some(ctrl) = weak.upgrade() else {
                    break;
                };
                if !ctrl.running.load(Ordering::Acquire) {
                    break;
                }
                body(&ctrl);
                drop(ctrl);
                std::thread::sleep(period);
            }
        })
    }
}
