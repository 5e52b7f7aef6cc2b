//! Concrete per-state handlers and the table builder.
//!
//! ```text
//!  CLOSED ──[OPEN]──▶ OPENING ──[open limit]──▶ OPEN
//!    ▲                   │                        │
//!    │                [STOP]                   [CLOSE]
//!    │                   ▼                        ▼
//!    │                STOPPED ◀──────[STOP]──── CLOSING
//!    │                   │                        │
//!    └──[closed limit]───┼────────────────────────┘
//!                        └─[OPEN/CLOSE]─▶ OPENING / CLOSING
//!
//!  OPENING/CLOSING ──[timeout · obstruction · fault]──▶ ERROR ──[RESET]──▶ (from switches)
//! ```

use super::{CommandOutcome, Direction, DoorCommand, DoorState, LimitOutcome, StateDescriptor};
use crate::sensors::SwitchId;

// ═══════════════════════════════════════════════════════════════════════════
//  Table builder
// ═══════════════════════════════════════════════════════════════════════════

/// Build the static state table.  Called once per controller.
pub fn build_state_table() -> [StateDescriptor; DoorState::COUNT] {
    [
        StateDescriptor {
            id: DoorState::Closed,
            on_command: closed_command,
            on_limit: resting_limit,
        },
        StateDescriptor {
            id: DoorState::Opening,
            on_command: opening_command,
            on_limit: opening_limit,
        },
        StateDescriptor {
            id: DoorState::Open,
            on_command: open_command,
            on_limit: resting_limit,
        },
        StateDescriptor {
            id: DoorState::Closing,
            on_command: closing_command,
            on_limit: closing_limit,
        },
        StateDescriptor {
            id: DoorState::Stopped,
            on_command: stopped_command,
            on_limit: resting_limit,
        },
        StateDescriptor {
            id: DoorState::Error,
            on_command: error_command,
            on_limit: error_limit,
        },
    ]
}

// ── CLOSED ────────────────────────────────────────────────────

fn closed_command(cmd: DoorCommand) -> CommandOutcome {
    match cmd {
        DoorCommand::Open => CommandOutcome::Move(Direction::Opening),
        DoorCommand::Stop => CommandOutcome::Ignore,
        DoorCommand::Close | DoorCommand::Reset => CommandOutcome::Reject,
    }
}

// ── OPENING ───────────────────────────────────────────────────

fn opening_command(cmd: DoorCommand) -> CommandOutcome {
    match cmd {
        DoorCommand::Stop => CommandOutcome::Halt,
        DoorCommand::Open | DoorCommand::Close | DoorCommand::Reset => CommandOutcome::Reject,
    }
}

fn opening_limit(switch: SwitchId) -> LimitOutcome {
    match switch {
        SwitchId::OpenLimit => LimitOutcome::Arrive(DoorState::Open),
        SwitchId::ClosedLimit => LimitOutcome::Reversed,
    }
}

// ── OPEN ──────────────────────────────────────────────────────

fn open_command(cmd: DoorCommand) -> CommandOutcome {
    match cmd {
        DoorCommand::Close => CommandOutcome::Move(Direction::Closing),
        DoorCommand::Stop => CommandOutcome::Ignore,
        DoorCommand::Open | DoorCommand::Reset => CommandOutcome::Reject,
    }
}

// ── CLOSING ───────────────────────────────────────────────────

fn closing_command(cmd: DoorCommand) -> CommandOutcome {
    match cmd {
        DoorCommand::Stop => CommandOutcome::Halt,
        DoorCommand::Open | DoorCommand::Close | DoorCommand::Reset => CommandOutcome::Reject,
    }
}

fn closing_limit(switch: SwitchId) -> LimitOutcome {
    match switch {
        SwitchId::ClosedLimit => LimitOutcome::Arrive(DoorState::Closed),
        SwitchId::OpenLimit => LimitOutcome::Reversed,
    }
}

// ── STOPPED ───────────────────────────────────────────────────

fn stopped_command(cmd: DoorCommand) -> CommandOutcome {
    match cmd {
        DoorCommand::Open => CommandOutcome::Move(Direction::Opening),
        DoorCommand::Close => CommandOutcome::Move(Direction::Closing),
        DoorCommand::Stop => CommandOutcome::Ignore,
        DoorCommand::Reset => CommandOutcome::Reject,
    }
}

// ── ERROR ─────────────────────────────────────────────────────

fn error_command(cmd: DoorCommand) -> CommandOutcome {
    match cmd {
        DoorCommand::Reset => CommandOutcome::Recover,
        DoorCommand::Stop => CommandOutcome::Ignore,
        DoorCommand::Open | DoorCommand::Close => CommandOutcome::Reject,
    }
}

fn error_limit(_switch: SwitchId) -> LimitOutcome {
    LimitOutcome::Ignore
}

// ── Shared ────────────────────────────────────────────────────

/// Resting states follow the switches when the door is moved by the wall
/// button or the opener's own remote.
fn resting_limit(switch: SwitchId) -> LimitOutcome {
    match switch {
        SwitchId::ClosedLimit => LimitOutcome::Arrive(DoorState::Closed),
        SwitchId::OpenLimit => LimitOutcome::Arrive(DoorState::Open),
    }
}
