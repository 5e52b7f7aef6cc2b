//! Position inference from the two debounced switch readings.
//!
//! Only the limits are known exactly.  Between them the estimate is a
//! fixed midpoint when the door is at rest; while it moves the last known
//! value is held until a limit is reached.

use super::{SwitchPair, SwitchState};

/// How a switch pair is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Inference {
    AtClosedLimit,
    AtOpenLimit,
    BetweenLimits,
    /// Both switches claim their limit at once.
    Inconsistent,
}

pub fn classify(pair: SwitchPair) -> Inference {
    match (pair.closed_limit, pair.open_limit) {
        (SwitchState::Closed, SwitchState::Closed) => Inference::AtClosedLimit,
        (SwitchState::Open, SwitchState::Open) => Inference::AtOpenLimit,
        (SwitchState::Open, SwitchState::Closed) => Inference::BetweenLimits,
        (SwitchState::Closed, SwitchState::Open) => Inference::Inconsistent,
    }
}

/// Door position in percent open, 0..=100.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DoorPosition(u8);

impl DoorPosition {
    pub const CLOSED: Self = Self(0);
    pub const OPEN: Self = Self(100);
    /// Best-effort estimate for "somewhere between the limits".
    pub const MIDPOINT: Self = Self(50);

    /// Values above 100 saturate.
    pub const fn new(percent: u8) -> Self {
        if percent > 100 { Self(100) } else { Self(percent) }
    }

    pub const fn percent(self) -> u8 {
        self.0
    }
}

impl core::fmt::Display for DoorPosition {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}%", self.0)
    }
}

/// Infer the position for `pair`.
///
/// Limits always win.  Between limits the midpoint is reported at rest and
/// `last` is held while `moving`.  An inconsistent pair never changes the
/// position.
pub fn infer(pair: SwitchPair, moving: bool, last: DoorPosition) -> DoorPosition {
    match classify(pair) {
        Inference::AtClosedLimit => DoorPosition::CLOSED,
        Inference::AtOpenLimit => DoorPosition::OPEN,
        Inference::BetweenLimits if moving => last,
        Inference::BetweenLimits => DoorPosition::MIDPOINT,
        Inference::Inconsistent => last,
    }
}
