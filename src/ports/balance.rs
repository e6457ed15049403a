//! Balance Port - Participant Funds Interface
//!
//! The balance collaborator receives debits at bet placement and
//! credits at settlement. It must apply each one atomically per
//! participant; persistence across restarts is its own concern.

use async_trait::async_trait;

/// Trait for participant balance storage.
#[async_trait]
pub trait BalanceBook: Send + Sync + 'static {
  /// Current balance of a participant (0 if unknown).
  async fn balance(&self, participant_id: &str) -> anyhow::Result<u64>;

  /// Remove `amount` from a participant's balance.
  ///
  /// Fails without changing anything if the balance is too low.
  async fn debit(&self, participant_id: &str, amount: u64) -> anyhow::Result<u64>;

  /// Add `amount` to a participant's balance, returning the new balance.
  async fn credit(&self, participant_id: &str, amount: u64) -> anyhow::Result<u64>;
}
