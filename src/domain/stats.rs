//! Per-participant round statistics.
//!
//! A wager counts as a win only when its payout exceeds the stake.
//! Rating starts at 1000, moves +10 on a win and -5 otherwise.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::settlement::{NetResult, SettlementResult, WagerOutcome};
use super::wager::ParticipantId;

pub const INITIAL_RATING: i64 = 1000;
const RATING_WIN: i64 = 10;
const RATING_LOSS: i64 = 5;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipantStats {
    pub total_bets: u64,
    pub wins: u64,
    pub losses: u64,
    /// Net profit across all settled wagers.
    pub profit: i64,
    pub win_streak: u64,
    pub best_win_streak: u64,
    pub rating: i64,
}

impl Default for ParticipantStats {
    fn default() -> Self {
        Self {
            total_bets: 0,
            wins: 0,
            losses: 0,
            profit: 0,
            win_streak: 0,
            best_win_streak: 0,
            rating: INITIAL_RATING,
        }
    }
}

impl ParticipantStats {
    /// Fold one settled wager into the statistics.
    pub fn record(&mut self, outcome: &WagerOutcome) {
        self.total_bets += 1;
        let delta = i64::try_from(outcome.payout).unwrap_or(i64::MAX)
            - i64::try_from(outcome.stake).unwrap_or(i64::MAX);
        self.profit = self.profit.saturating_add(delta);

        match outcome.net {
            NetResult::Win => {
                self.wins += 1;
                self.win_streak += 1;
                self.rating += RATING_WIN;
                self.best_win_streak = self.best_win_streak.max(self.win_streak);
            }
            NetResult::LossOrBreakeven => {
                self.losses += 1;
                self.win_streak = 0;
                self.rating -= RATING_LOSS;
            }
        }
    }

    /// Fraction of settled wagers that were net wins.
    pub fn win_rate(&self) -> f64 {
        if self.total_bets == 0 {
            return 0.0;
        }
        self.wins as f64 / self.total_bets as f64
    }
}

/// Statistics for every participant seen so far.
#[derive(Debug, Clone, Default)]
pub struct StatsBook {
    entries: HashMap<ParticipantId, ParticipantStats>,
}

impl StatsBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apply(&mut self, result: &SettlementResult) {
        for outcome in &result.wagers {
            self.entries
                .entry(outcome.participant_id.clone())
                .or_default()
                .record(outcome);
        }
    }

    pub fn get(&self, participant_id: &str) -> Option<&ParticipantStats> {
        self.entries.get(participant_id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
