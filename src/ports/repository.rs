//! Repository Port - Round History Persistence Interface
//!
//! Settled rounds are handed off here for display and audit; the core
//! never keeps them. Uses JSONL for the append-only round log and an
//! atomic JSON snapshot for balances.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::quote::{PriceQuote, QuoteOrigin};
use crate::domain::settlement::SettlementResult;

/// Summary of one settled round.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoundRecord {
  /// Round number, continued across restarts.
  pub round_number: u64,
  /// Quote taken when the round opened.
  pub start_quote: PriceQuote,
  /// Provenance of the start quote.
  pub start_origin: QuoteOrigin,
  /// Quote taken at the end deadline.
  pub end_quote: PriceQuote,
  /// Provenance of the end quote.
  pub end_origin: QuoteOrigin,
  /// Outcome, pool and payouts.
  pub settlement: SettlementResult,
  /// When the round opened.
  pub opened_at: DateTime<Utc>,
  /// When settlement completed.
  pub settled_at: DateTime<Utc>,
}

/// Point-in-time copy of every participant balance.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceSnapshot {
  /// Snapshot timestamp (Unix ms).
  pub timestamp_ms: i64,
  /// Last round number settled before the snapshot.
  pub last_round: u64,
  /// Participant → balance.
  pub balances: BTreeMap<String, u64>,
}

/// Trait for round history and balance persistence.
#[async_trait]
pub trait RoundRepository: Send + Sync + 'static {
  /// Append a settled round to the history log.
  async fn save_round(&self, record: &RoundRecord) -> anyhow::Result<()>;

  /// Load every stored round, ordered by settlement time.
  async fn load_rounds(&self) -> anyhow::Result<Vec<RoundRecord>>;

  /// Save a balance snapshot (replaces the previous one).
  async fn save_balances(&self, snapshot: &BalanceSnapshot) -> anyhow::Result<()>;

  /// Load the most recent balance snapshot.
  async fn load_balances(&self) -> anyhow::Result<Option<BalanceSnapshot>>;

  /// Check if the repository is writable.
  async fn is_healthy(&self) -> bool;
}
