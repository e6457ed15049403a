//! In-memory Balance Book
//!
//! Balances live in a map behind an async `RwLock`. A participant that
//! has never been seen implicitly holds `initial_balance`; the entry is
//! materialized on the first debit or credit.

use std::collections::{BTreeMap, HashMap};

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::ports::balance::BalanceBook;

/// Balance book held entirely in memory.
pub struct InMemoryBalanceBook {
    /// Starting balance for unknown participants.
    initial_balance: u64,
    balances: RwLock<HashMap<String, u64>>,
}

impl InMemoryBalanceBook {
    pub fn new(initial_balance: u64) -> Self {
        Self {
            initial_balance,
            balances: RwLock::new(HashMap::new()),
        }
    }

    /// Copy of every known balance, sorted by participant.
    pub async fn snapshot(&self) -> BTreeMap<String, u64> {
        self.balances
            .read()
            .await
            .iter()
            .map(|(k, v)| (k.clone(), *v))
            .collect()
    }

    /// Replace all balances with a previously saved snapshot.
    pub async fn restore(&self, balances: BTreeMap<String, u64>) {
        let count = balances.len();
        *self.balances.write().await = balances.into_iter().collect();
        info!(participants = count, "Balances restored");
    }

    /// Number of participants with a materialized balance.
    pub async fn len(&self) -> usize {
        self.balances.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.balances.read().await.is_empty()
    }
}

#[async_trait]
impl BalanceBook for InMemoryBalanceBook {
    async fn balance(&self, participant_id: &str) -> Result<u64> {
        Ok(self
            .balances
            .read()
            .await
            .get(participant_id)
            .copied()
            .unwrap_or(self.initial_balance))
    }

    async fn debit(&self, participant_id: &str, amount: u64) -> Result<u64> {
        let mut balances = self.balances.write().await;
        let current = balances
            .get(participant_id)
            .copied()
            .unwrap_or(self.initial_balance);
        anyhow::ensure!(
            current >= amount,
            "Insufficient balance for {participant_id}: have {current}, need {amount}"
        );
        let remaining = current - amount;
        balances.insert(participant_id.to_string(), remaining);
        debug!(participant = participant_id, amount, remaining, "Debited");
        Ok(remaining)
    }

    async fn credit(&self, participant_id: &str, amount: u64) -> Result<u64> {
        let mut balances = self.balances.write().await;
        let current = balances
            .get(participant_id)
            .copied()
            .unwrap_or(self.initial_balance);
        let updated = current
            .checked_add(amount)
            .ok_or_else(|| anyhow::anyhow!("Balance overflow for {participant_id}"))?;
        balances.insert(participant_id.to_string(), updated);
        debug!(participant = participant_id, amount, balance = updated, "Credited");
        Ok(updated)
    }
}
