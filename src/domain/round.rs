//! Round model and the pure round clock.
//!
//! Phase is always derived from `(now, opened_at, lock_deadline,
//! end_deadline)`; nothing here depends on a previously fired timer.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::quote::PriceQuote;
use super::wager::Direction;

/// Lifecycle phase of a round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Bets admitted.
    Open,
    /// Bets rejected, end quote not yet taken.
    Locked,
    /// Outcome and payouts computed.
    Settled,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Open => write!(f, "OPEN"),
            Self::Locked => write!(f, "LOCKED"),
            Self::Settled => write!(f, "SETTLED"),
        }
    }
}

/// Wall-clock boundaries of one round.
///
/// The lock window is a suffix of the round duration, not a separate timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundClock {
    pub opened_at: DateTime<Utc>,
    pub lock_deadline: DateTime<Utc>,
    pub end_deadline: DateTime<Utc>,
}

impl RoundClock {
    /// Build the clock for a round opened at `opened_at`.
    pub fn new(opened_at: DateTime<Utc>, duration: Duration, lock_window: Duration) -> Self {
        let end_deadline = opened_at + duration;
        Self {
            opened_at,
            lock_deadline: end_deadline - lock_window,
            end_deadline,
        }
    }

    /// Phase the round should be in at `now`.
    ///
    /// `Settled` here means "settlement is due"; the scheduler decides when
    /// the settlement has actually happened.
    pub fn phase_at(&self, now: DateTime<Utc>) -> Phase {
        if now >= self.end_deadline {
            Phase::Settled
        } else if now >= self.lock_deadline {
            Phase::Locked
        } else {
            Phase::Open
        }
    }

    /// Whether a bet placed at `now` is inside the admission window.
    ///
    /// Time-left exactly equal to the lock window is already locked.
    pub fn accepts_bets_at(&self, now: DateTime<Utc>) -> bool {
        now < self.lock_deadline
    }

    /// Whole seconds until `end_deadline`, never negative.
    pub fn seconds_remaining(&self, now: DateTime<Utc>) -> i64 {
        (self.end_deadline - now).num_seconds().max(0)
    }
}

/// The active round. Owned and mutated only by the scheduler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Round {
    pub round_number: u64,
    pub phase: Phase,
    pub start_quote: PriceQuote,
    pub end_quote: Option<PriceQuote>,
    pub clock: RoundClock,
}

impl Round {
    pub const fn open(round_number: u64, start_quote: PriceQuote, clock: RoundClock) -> Self {
        Self {
            round_number,
            phase: Phase::Open,
            start_quote,
            end_quote: None,
            clock,
        }
    }
}

/// Binary outcome of a round.
///
/// Strictly greater is `Up`; a tie or a decrease both resolve to `Down`.
pub fn outcome_of(start: &PriceQuote, end: &PriceQuote) -> Direction {
    if end.value > start.value {
        Direction::Up
    } else {
        Direction::Down
    }
}
