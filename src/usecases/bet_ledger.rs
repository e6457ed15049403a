//! Bet Ledger - Wager Admission for the Active Round
//!
//! Admits at most one wager per participant per round while the round
//! accepts bets. Checks run in a fixed order:
//! 1. Insufficient funds
//! 2. Round not accepting bets (closed, or lock deadline reached)
//! 3. Duplicate wager
//! 4. Amount outside [min_bet, max_bet]
//!
//! The whole check-then-debit sequence runs under one async mutex, so
//! two concurrent placements by the same participant cannot both pass
//! the duplicate check.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tracing::{debug, info, instrument};

use crate::config::BettingConfig;
use crate::domain::errors::BetRejection;
use crate::domain::wager::{Direction, ParticipantId, Wager};
use crate::ports::balance::BalanceBook;

/// Why `place()` did not produce a wager.
#[derive(Debug, thiserror::Error)]
pub enum PlaceBetError {
  /// The wager broke an admission rule.
  #[error(transparent)]
  Rejected(#[from] BetRejection),

  /// The balance collaborator failed.
  #[error(transparent)]
  Balance(#[from] anyhow::Error),
}

impl PlaceBetError {
  /// The admission rule that failed, if any.
  pub const fn rejection(&self) -> Option<BetRejection> {
    match self {
      Self::Rejected(r) => Some(*r),
      Self::Balance(_) => None,
    }
  }
}

/// Inclusive stake limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BetLimits {
  pub min_bet: u64,
  pub max_bet: u64,
}

impl Default for BetLimits {
  fn default() -> Self {
    Self {
      min_bet: 10,
      max_bet: 1000,
    }
  }
}

impl BetLimits {
  pub const fn from_config(betting: &BettingConfig) -> Self {
    Self {
      min_bet: betting.min_bet,
      max_bet: betting.max_bet,
    }
  }

  const fn contains(&self, amount: u64) -> bool {
    amount >= self.min_bet && amount <= self.max_bet
  }
}

/// Aggregate pool view for the active round.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolSummary {
  pub round_number: u64,
  pub wager_count: usize,
  pub up_total: u64,
  pub down_total: u64,
}

impl PoolSummary {
  pub const fn total(&self) -> u64 {
    self.up_total.saturating_add(self.down_total)
  }
}

#[derive(Debug, Clone, Copy)]
struct AdmissionWindow {
  round_number: u64,
  lock_deadline: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct LedgerState {
  /// `None` while no round accepts bets.
  window: Option<AdmissionWindow>,
  /// Round the wagers below belong to.
  round_number: u64,
  /// Accepted wagers in placement order.
  wagers: Vec<Wager>,
  participants: HashSet<ParticipantId>,
  finalized: bool,
}

/// Wager admission for the single active round.
pub struct BetLedger<B: BalanceBook> {
  balances: Arc<B>,
  limits: BetLimits,
  state: Mutex<LedgerState>,
}

impl<B: BalanceBook> BetLedger<B> {
  /// Create a ledger with no open round.
  pub fn new(balances: Arc<B>, limits: BetLimits) -> Self {
    Self {
      balances,
      limits,
      state: Mutex::new(LedgerState::default()),
    }
  }

  pub const fn limits(&self) -> BetLimits {
    self.limits
  }

  /// Start accepting wagers for a new round, discarding the previous one.
  pub async fn open(&self, round_number: u64, lock_deadline: DateTime<Utc>) {
    let mut state = self.state.lock().await;
    *state = LedgerState {
      window: Some(AdmissionWindow {
        round_number,
        lock_deadline,
      }),
      round_number,
      ..LedgerState::default()
    };
    debug!(round = round_number, %lock_deadline, "Ledger opened");
  }

  /// Stop accepting wagers. Idempotent.
  pub async fn close(&self) {
    let mut state = self.state.lock().await;
    if let Some(window) = state.window.take() {
      debug!(
        round = window.round_number,
        wagers = state.wagers.len(),
        "Ledger closed"
      );
    }
  }

  /// Close the round and hand over its wagers in placement order.
  ///
  /// # Errors
  /// Fails if the round was already finalized.
  pub async fn finalize(&self) -> anyhow::Result<Vec<Wager>> {
    let mut state = self.state.lock().await;
    anyhow::ensure!(
      !state.finalized,
      "Round {} already finalized",
      state.round_number
    );
    state.window = None;
    state.finalized = true;
    state.participants.clear();
    let wagers = std::mem::take(&mut state.wagers);
    info!(
      round = state.round_number,
      wagers = wagers.len(),
      "Ledger finalized"
    );
    Ok(wagers)
  }

  /// Place a wager at the current wall-clock time.
  pub async fn place(
    &self,
    participant_id: &str,
    direction: Direction,
    amount: u64,
  ) -> Result<Wager, PlaceBetError> {
    self.place_at(participant_id, direction, amount, Utc::now()).await
  }

  /// Place a wager as of `now`.
  ///
  /// On success the amount has already been debited.
  #[instrument(skip(self), fields(participant = %participant_id))]
  pub async fn place_at(
    &self,
    participant_id: &str,
    direction: Direction,
    amount: u64,
    now: DateTime<Utc>,
  ) -> Result<Wager, PlaceBetError> {
    let mut state = self.state.lock().await;

    let available = self.balances.balance(participant_id).await?;
    if available < amount {
      return Err(
        BetRejection::InsufficientFunds {
          needed: amount,
          available,
        }
        .into(),
      );
    }

    let open = state.window.is_some_and(|w| now < w.lock_deadline);
    if !open {
      return Err(BetRejection::RoundNotAcceptingBets.into());
    }

    if state.participants.contains(participant_id) {
      return Err(BetRejection::DuplicateWager.into());
    }

    if !self.limits.contains(amount) {
      return Err(
        BetRejection::InvalidAmount {
          amount,
          min: self.limits.min_bet,
          max: self.limits.max_bet,
        }
        .into(),
      );
    }

    self.balances.debit(participant_id, amount).await?;

    let wager = Wager::new(participant_id, direction, amount, now);
    state.participants.insert(wager.participant_id.clone());
    state.wagers.push(wager.clone());

    info!(
      round = state.round_number,
      %direction,
      amount,
      wager_id = %wager.id,
      "Wager accepted"
    );
    Ok(wager)
  }

  /// Whether `place_at(.., now)` could pass the phase check.
  pub async fn is_accepting_at(&self, now: DateTime<Utc>) -> bool {
    self
      .state
      .lock()
      .await
      .window
      .is_some_and(|w| now < w.lock_deadline)
  }

  /// Pool totals per direction for the active round.
  pub async fn pool_summary(&self) -> PoolSummary {
    let state = self.state.lock().await;
    let mut summary = PoolSummary {
      round_number: state.round_number,
      wager_count: state.wagers.len(),
      ..PoolSummary::default()
    };
    for wager in &state.wagers {
      match wager.direction {
        Direction::Up => summary.up_total = summary.up_total.saturating_add(wager.amount),
        Direction::Down => summary.down_total = summary.down_total.saturating_add(wager.amount),
      }
    }
    summary
  }

  /// The participant's wager in the active round, if any.
  pub async fn wager_of(&self, participant_id: &str) -> Option<Wager> {
    let state = self.state.lock().await;
    state
      .wagers
      .iter()
      .find(|w| w.participant_id == participant_id)
      .cloned()
  }
}
