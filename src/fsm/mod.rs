//! Function-pointer finite state machine for the door.
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────┐
//! │  StateTable                                                │
//! │  ┌──────────┬────────────────────────┬───────────────────┐ │
//! │  │ DoorState │ on_command            │ on_limit          │ │
//! │  ├──────────┼────────────────────────┼───────────────────┤ │
//! │  │ Closed    │ fn(cmd)->Outcome      │ fn(sw)->Outcome   │ │
//! │  │ Opening   │ fn(cmd)->Outcome      │ fn(sw)->Outcome   │ │
//! │  │ Open      │ fn(cmd)->Outcome      │ fn(sw)->Outcome   │ │
//! │  │ Closing   │ fn(cmd)->Outcome      │ fn(sw)->Outcome   │ │
//! │  │ Stopped   │ fn(cmd)->Outcome      │ fn(sw)->Outcome   │ │
//! │  │ Error     │ fn(cmd)->Outcome      │ fn(sw)->Outcome   │ │
//! │  └──────────┴────────────────────────┴───────────────────┘ │
//! └────────────────────────────────────────────────────────────┘
//! ```
//!
//! The table only answers "what would happen"; the controller decides
//! whether the guard holds (relay pulse accepted) and then calls
//! [`Fsm::transition`].  Keeping the lookup pure lets a rejected guard
//! leave the state untouched.

pub mod states;

use log::info;

use crate::sensors::SwitchId;

// ---------------------------------------------------------------------------
// State identity
// ---------------------------------------------------------------------------

/// Enumeration of all door states.
/// Must stay in sync with the table built in [`states::build_state_table`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum DoorState {
    Closed = 0,
    Opening = 1,
    Open = 2,
    Closing = 3,
    Stopped = 4,
    Error = 5,
}

impl DoorState {
    /// Total number of states, used to size the table array.
    pub const COUNT: usize = 6;

    /// Convert an index back to `DoorState`.  Panics on out-of-range in
    /// debug builds; returns `Error` in release (safe fallback).
    pub fn from_index(idx: usize) -> Self {
        match idx {
            0 => Self::Closed,
            1 => Self::Opening,
            2 => Self::Open,
            3 => Self::Closing,
            4 => Self::Stopped,
            5 => Self::Error,
            _ => {
                debug_assert!(false, "invalid state index: {idx}");
                Self::Error
            }
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            Self::Closed => "CLOSED",
            Self::Opening => "OPENING",
            Self::Open => "OPEN",
            Self::Closing => "CLOSING",
            Self::Stopped => "STOPPED",
            Self::Error => "ERROR",
        }
    }

    pub const fn is_moving(self) -> bool {
        matches!(self, Self::Opening | Self::Closing)
    }

    /// Direction of travel, for the moving states.
    pub const fn direction(self) -> Option<Direction> {
        match self {
            Self::Opening => Some(Direction::Opening),
            Self::Closing => Some(Direction::Closing),
            _ => None,
        }
    }

    /// The limit switch that ends a movement in this state.
    pub const fn target_limit(self) -> Option<SwitchId> {
        match self {
            Self::Opening => Some(SwitchId::OpenLimit),
            Self::Closing => Some(SwitchId::ClosedLimit),
            _ => None,
        }
    }
}

/// Direction of a requested movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Opening,
    Closing,
}

impl Direction {
    /// State entered once the movement is accepted.
    pub const fn moving_state(self) -> DoorState {
        match self {
            Self::Opening => DoorState::Opening,
            Self::Closing => DoorState::Closing,
        }
    }
}

/// Commands accepted by the controller's command API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DoorCommand {
    Open,
    Close,
    Stop,
    Reset,
}

// ---------------------------------------------------------------------------
// Table outcomes
// ---------------------------------------------------------------------------

/// What a state does with a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandOutcome {
    /// Start moving; guarded by the relay accepting a pulse.
    Move(Direction),
    /// Halt the current movement (enter `Stopped`).
    Halt,
    /// Accepted, but nothing changes.
    Ignore,
    /// Leave `Error`; the next state is derived from the switches.
    Recover,
    /// Not allowed from this state.
    Reject,
}

/// What a state does when a limit switch reports its limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitOutcome {
    /// Enter the given resting state.
    Arrive(DoorState),
    /// The door reached the limit opposite to its movement.
    Reversed,
    /// Nothing to do.
    Ignore,
}

/// Signature for command handlers.
pub type CommandFn = fn(DoorCommand) -> CommandOutcome;

/// Signature for limit-arrival handlers.
pub type LimitFn = fn(SwitchId) -> LimitOutcome;

// ---------------------------------------------------------------------------
// State descriptor (one row in the table)
// ---------------------------------------------------------------------------

/// Static descriptor for a single door state.
/// Stored in a fixed-size array; no heap, no `dyn`.
pub struct StateDescriptor {
    pub id: DoorState,
    pub on_command: CommandFn,
    pub on_limit: LimitFn,
}

// ---------------------------------------------------------------------------
// FSM engine
// ---------------------------------------------------------------------------

/// The door state machine.
///
/// Owned by the controller and only touched while its state lock is held.
pub struct Fsm {
    /// Fixed-size table indexed by `DoorState as usize`.
    table: [StateDescriptor; DoorState::COUNT],
    /// Index of the currently active state.
    current: usize,
    /// Number of transitions since construction.
    transitions: u32,
}

impl Fsm {
    /// Construct a new FSM with the given state table, starting in `initial`.
    pub fn new(table: [StateDescriptor; DoorState::COUNT], initial: DoorState) -> Self {
        info!("FSM starting in state: {}", initial.name());
        Self {
            table,
            current: initial as usize,
            transitions: 0,
        }
    }

    /// The current state's identity.
    pub fn current_state(&self) -> DoorState {
        DoorState::from_index(self.current)
    }

    /// Look up how the current state handles `cmd`.
    pub fn on_command(&self, cmd: DoorCommand) -> CommandOutcome {
        (self.table[self.current].on_command)(cmd)
    }

    /// Look up how the current state handles a limit arrival.
    pub fn on_limit(&self, switch: SwitchId) -> LimitOutcome {
        (self.table[self.current].on_limit)(switch)
    }

    /// Move to `next`.  Returns `false` (and does nothing) if already there.
    pub fn transition(&mut self, next: DoorState) -> bool {
        let next_idx = next as usize;
        if next_idx == self.current {
            return false;
        }

        info!(
            "FSM transition: {} -> {}",
            self.current_state().name(),
            self.table[next_idx].id.name()
        );

        self.current = next_idx;
        self.transitions = self.transitions.wrapping_add(1);
        true
    }

    pub fn transition_count(&self) -> u32 {
        self.transitions
    }
}
