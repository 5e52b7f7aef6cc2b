//! Reed switch inputs: identity, debounced state, position inference.
//!
//! Both switches are wired active-low with the configured pull resistor:
//! the level goes low while the magnet on the door is in front of the
//! switch.  Each switch *reports* the door position it senses, so the
//! closed-limit switch reads `Closed` at the closed limit and the
//! open-limit switch reads `Open` at the open limit.
//!
//! | closed-limit | open-limit | meaning              |
//! |--------------|------------|----------------------|
//! | `Closed`     | `Closed`   | at closed limit (0)  |
//! | `Open`       | `Open`     | at open limit (100)  |
//! | `Open`       | `Closed`   | between limits       |
//! | `Closed`     | `Open`     | both limits (fault)  |

pub mod debounce;
pub mod position;

pub use debounce::{SwitchChange, SwitchDebouncer};
pub use position::{DoorPosition, Inference};

/// Identifies one of the two reed switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum SwitchId {
    ClosedLimit = 0,
    OpenLimit = 1,
}

impl SwitchId {
    pub const ALL: [Self; 2] = [Self::ClosedLimit, Self::OpenLimit];

    pub const fn index(self) -> usize {
        self as usize
    }

    pub const fn name(self) -> &'static str {
        match self {
            Self::ClosedLimit => "closed-limit",
            Self::OpenLimit => "open-limit",
        }
    }

    /// The reading this switch gives while the door sits on its limit.
    pub const fn limit_state(self) -> SwitchState {
        match self {
            Self::ClosedLimit => SwitchState::Closed,
            Self::OpenLimit => SwitchState::Open,
        }
    }

    /// Translate a raw GPIO level into the switch reading (active-low).
    pub const fn state_for_level(self, level_high: bool) -> SwitchState {
        let at_limit = !level_high;
        match (self, at_limit) {
            (Self::ClosedLimit, true) | (Self::OpenLimit, false) => SwitchState::Closed,
            (Self::ClosedLimit, false) | (Self::OpenLimit, true) => SwitchState::Open,
        }
    }

    /// Inverse of [`state_for_level`](Self::state_for_level).
    pub const fn level_for_state(self, state: SwitchState) -> bool {
        let at_limit = matches!(
            (self, state),
            (Self::ClosedLimit, SwitchState::Closed) | (Self::OpenLimit, SwitchState::Open)
        );
        !at_limit
    }

    pub fn is_at_limit(self, state: SwitchState) -> bool {
        state == self.limit_state()
    }
}

/// Debounced reading of a single reed switch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SwitchState {
    Open,
    Closed,
}

/// Readings of both switches at one instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwitchPair {
    pub closed_limit: SwitchState,
    pub open_limit: SwitchState,
}

impl SwitchPair {
    /// Door resting on the closed limit.
    pub const AT_CLOSED: Self = Self {
        closed_limit: SwitchState::Closed,
        open_limit: SwitchState::Closed,
    };

    /// Door resting on the open limit.
    pub const AT_OPEN: Self = Self {
        closed_limit: SwitchState::Open,
        open_limit: SwitchState::Open,
    };

    /// Door somewhere between the limits.
    pub const BETWEEN: Self = Self {
        closed_limit: SwitchState::Open,
        open_limit: SwitchState::Closed,
    };

    pub fn from_levels(closed_limit_high: bool, open_limit_high: bool) -> Self {
        Self {
            closed_limit: SwitchId::ClosedLimit.state_for_level(closed_limit_high),
            open_limit: SwitchId::OpenLimit.state_for_level(open_limit_high),
        }
    }

    pub fn get(&self, switch: SwitchId) -> SwitchState {
        match switch {
            SwitchId::ClosedLimit => self.closed_limit,
            SwitchId::OpenLimit => self.open_limit,
        }
    }

    /// Copy with one switch replaced.
    pub fn with(self, switch: SwitchId, state: SwitchState) -> Self {
        match switch {
            SwitchId::ClosedLimit => Self {
                closed_limit: state,
                ..self
            },
            SwitchId::OpenLimit => Self {
                open_limit: state,
                ..self
            },
        }
    }

    /// The single limit the door is resting on, if any.
    pub fn resting_limit(&self) -> Option<SwitchId> {
        match position::classify(*self) {
            Inference::AtClosedLimit => Some(SwitchId::ClosedLimit),
            Inference::AtOpenLimit => Some(SwitchId::OpenLimit),
            Inference::BetweenLimits | Inference::Inconsistent => None,
        }
    }
}
