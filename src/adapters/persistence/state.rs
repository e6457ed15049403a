//! Balance Store - Atomic JSON Balance Snapshots
//!
//! Saves participant balances to `balances.json` using atomic writes
//! (write to tmp file, then rename). The file on disk is always either
//! the previous or the new snapshot, never a partial write.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tokio::fs;
use tracing::{debug, info, instrument};

use crate::ports::repository::BalanceSnapshot;

/// Atomic JSON snapshot store for participant balances.
pub struct BalanceStore {
    /// Path to balances.json.
    snapshot_path: PathBuf,
    /// Temporary path for atomic writes.
    tmp_path: PathBuf,
}

impl BalanceStore {
    /// Create a store in the given data directory, creating it if needed.
    pub async fn new(data_dir: &str) -> Result<Self> {
        let dir = Path::new(data_dir);
        fs::create_dir_all(dir)
            .await
            .context("Failed to create data directory")?;

        Ok(Self {
            snapshot_path: dir.join("balances.json"),
            tmp_path: dir.join("balances.json.tmp"),
        })
    }

    /// Save a snapshot atomically (tmp → rename).
    #[instrument(skip(self, snapshot), fields(participants = snapshot.balances.len()))]
    pub async fn save(&self, snapshot: &BalanceSnapshot) -> Result<()> {
        let json = serde_json::to_string_pretty(snapshot)
            .context("Failed to serialize balance snapshot")?;

        fs::write(&self.tmp_path, &json)
            .await
            .context("Failed to write tmp balance file")?;

        fs::rename(&self.tmp_path, &self.snapshot_path)
            .await
            .context("Failed to rename balance file")?;

        debug!(
            path = %self.snapshot_path.display(),
            last_round = snapshot.last_round,
            "Balance snapshot saved"
        );

        Ok(())
    }

    /// Load the most recent snapshot, or `None` on first startup.
    #[instrument(skip(self))]
    pub async fn load(&self) -> Result<Option<BalanceSnapshot>> {
        if !self.snapshot_path.exists() {
            info!("No balance snapshot found, starting fresh");
            return Ok(None);
        }

        let json = fs::read_to_string(&self.snapshot_path)
            .await
            .context("Failed to read balance snapshot")?;

        let snapshot: BalanceSnapshot =
            serde_json::from_str(&json).context("Failed to parse balance snapshot")?;

        info!(
            participants = snapshot.balances.len(),
            last_round = snapshot.last_round,
            "Balance snapshot loaded"
        );

        Ok(Some(snapshot))
    }

    /// Check if the snapshot file is readable (absent is fine).
    pub async fn is_healthy(&self) -> bool {
        if !self.snapshot_path.exists() {
            return true;
        }
        fs::metadata(&self.snapshot_path).await.is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_dir() -> String {
        std::env::temp_dir()
            .join(format!("updown-balances-{}", uuid::Uuid::new_v4()))
            .to_string_lossy()
            .into_owned()
    }

    #[tokio::test]
    async fn test_load_missing_is_none() {
        let dir = scratch_dir();
        let store = BalanceStore::new(&dir).await.unwrap();
        assert!(store.load().await.unwrap().is_none());
        assert!(store.is_healthy().await);
        let _ = fs::remove_dir_all(&dir).await;
    }

    #[tokio::test]
    async fn test_save_then_load_replaces_previous() {
        let dir = scratch_dir();
        let store = BalanceStore::new(&dir).await.unwrap();

        let mut snapshot = BalanceSnapshot {
            timestamp_ms: 1,
            last_round: 3,
            ..BalanceSnapshot::default()
        };
        snapshot.balances.insert("alice".to_string(), 120);
        store.save(&snapshot).await.unwrap();

        snapshot.last_round = 4;
        snapshot.balances.insert("alice".to_string(), 80);
        store.save(&snapshot).await.unwrap();

        let loaded = store.load().await.unwrap().unwrap();
        assert_eq!(loaded, snapshot);
        assert!(!Path::new(&dir).join("balances.json.tmp").exists());
        let _ = fs::remove_dir_all(&dir).await;
    }
}
