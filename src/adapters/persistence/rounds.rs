//! Round Log - Append-only JSONL Round History
//!
//! Persists settled rounds to daily JSONL files named
//! `rounds/YYYY-MM-DD.jsonl`. Each line is one complete `RoundRecord`,
//! so the log can be streamed, grepped and replayed line by line.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::{info, instrument, warn};

use crate::ports::repository::RoundRecord;

/// Append-only JSONL round logger with daily file rotation.
pub struct RoundLog {
    /// Base directory for round files.
    rounds_dir: PathBuf,
}

impl RoundLog {
    /// Create a round log in the given data directory.
    pub async fn new(data_dir: &str) -> Result<Self> {
        let rounds_dir = Path::new(data_dir).join("rounds");
        fs::create_dir_all(&rounds_dir)
            .await
            .context("Failed to create rounds directory")?;

        Ok(Self { rounds_dir })
    }

    /// Append a record to the file of the day it settled.
    #[instrument(skip(self, record), fields(round = record.round_number))]
    pub async fn append(&self, record: &RoundRecord) -> Result<()> {
        let date = record.settled_at.format("%Y-%m-%d").to_string();
        let path = self.rounds_dir.join(format!("{date}.jsonl"));

        let mut json = serde_json::to_string(record).context("Failed to serialize round record")?;
        json.push('\n');

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .context("Failed to open round log file")?;

        file.write_all(json.as_bytes())
            .await
            .context("Failed to write round record")?;

        file.flush().await.context("Failed to flush round log")?;

        Ok(())
    }

    /// Load every record from every daily file, oldest first.
    #[instrument(skip(self))]
    pub async fn load_all(&self) -> Result<Vec<RoundRecord>> {
        let mut records = Vec::new();
        let mut entries = fs::read_dir(&self.rounds_dir)
            .await
            .context("Failed to list rounds directory")?;

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().is_none_or(|ext| ext != "jsonl") {
                continue;
            }
            let content = fs::read_to_string(&path).await?;
            for line in content.lines().filter(|l| !l.trim().is_empty()) {
                match serde_json::from_str::<RoundRecord>(line) {
                    Ok(record) => records.push(record),
                    Err(e) => {
                        warn!(
                            file = %path.display(),
                            error = %e,
                            "Skipping malformed round record"
                        );
                    }
                }
            }
        }

        records.sort_by_key(|r| r.settled_at);
        info!(count = records.len(), "Loaded round records");
        Ok(records)
    }

    /// Check if the rounds directory is writable.
    pub async fn is_healthy(&self) -> bool {
        let probe = self.rounds_dir.join(".health_check");
        let result = fs::write(&probe, b"ok").await;
        let _ = fs::remove_file(&probe).await;
        result.is_ok()
    }
}
