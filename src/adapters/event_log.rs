//! Append-only event log with file-based persistence.
//!
//! Events are stored as newline-delimited JSON (JSONL) for simplicity
//! and easy inspection.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs::{self, File, OpenOptions};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::Mutex;

use super::EventLog;
use crate::domain::DomainEvent;
use crate::error::GatewayError;

/// File-backed event log using JSONL format
pub struct JsonlEventLog {
    /// Path to the events.jsonl file
    events_path: PathBuf,

    /// Serializes appends from concurrent workers
    write_lock: Mutex<()>,
}

impl JsonlEventLog {
    /// Open (or lazily create) an event log at `events_path`
    pub async fn open(events_path: impl Into<PathBuf>) -> Result<Self, GatewayError> {
        let events_path = events_path.into();
        if let Some(parent) = events_path.parent() {
            fs::create_dir_all(parent).await?;
        }

        Ok(Self {
            events_path,
            write_lock: Mutex::new(()),
        })
    }

    /// Get the path to the events file
    pub fn events_path(&self) -> &Path {
        &self.events_path
    }

    /// Replay all events in order
    pub async fn replay(&self) -> Result<Vec<DomainEvent>, GatewayError> {
        if !self.events_path.exists() {
            return Ok(Vec::new());
        }

        let file = File::open(&self.events_path).await?;
        let reader = BufReader::new(file);
        let mut lines = reader.lines();
        let mut events = Vec::new();

        while let Some(line) = lines.next_line().await? {
            if line.trim().is_empty() {
                continue;
            }
            events.push(serde_json::from_str(&line)?);
        }

        Ok(events)
    }
}

#[async_trait]
impl EventLog for JsonlEventLog {
    async fn publish(&self, event: &DomainEvent) -> Result<(), GatewayError> {
        let json = serde_json::to_string(event)?;

        let _guard = self.write_lock.lock().await;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.events_path)
            .await?;

        file.write_all(format!("{}\n", json).as_bytes()).await?;
        file.flush().await?;

        Ok(())
    }
}
