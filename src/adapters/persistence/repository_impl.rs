//! Repository Implementation - File-backed `RoundRepository`
//!
//! Combines `RoundLog` (JSONL round history) and `BalanceStore`
//! (atomic JSON balance snapshots) behind the `RoundRepository` port.

use anyhow::Result;
use async_trait::async_trait;

use super::rounds::RoundLog;
use super::state::BalanceStore;
use crate::ports::repository::{BalanceSnapshot, RoundRecord, RoundRepository};

/// File-backed repository rooted at one data directory.
pub struct FileRepository {
    balance_store: BalanceStore,
    round_log: RoundLog,
}

impl FileRepository {
    pub const fn new(balance_store: BalanceStore, round_log: RoundLog) -> Self {
        Self {
            balance_store,
            round_log,
        }
    }

    /// Create both stores under `data_dir`, creating directories as needed.
    pub async fn from_data_dir(data_dir: &str) -> Result<Self> {
        let balance_store = BalanceStore::new(data_dir).await?;
        let round_log = RoundLog::new(data_dir).await?;
        Ok(Self::new(balance_store, round_log))
    }
}

#[async_trait]
impl RoundRepository for FileRepository {
    async fn save_round(&self, record: &RoundRecord) -> Result<()> {
        self.round_log.append(record).await
    }

    async fn load_rounds(&self) -> Result<Vec<RoundRecord>> {
        self.round_log.load_all().await
    }

    async fn save_balances(&self, snapshot: &BalanceSnapshot) -> Result<()> {
        self.balance_store.save(snapshot).await
    }

    async fn load_balances(&self) -> Result<Option<BalanceSnapshot>> {
        self.balance_store.load().await
    }

    async fn is_healthy(&self) -> bool {
        self.balance_store.is_healthy().await && self.round_log.is_healthy().await
    }
}
