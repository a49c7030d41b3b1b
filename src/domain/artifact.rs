//! Recording artifacts produced by the SSR pipeline.
//!
//! The local file is transient: it is either uploaded or discarded, and removed
//! in both cases.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Container metadata for a finished recording
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordingMetadata {
    /// Playback duration in seconds
    pub duration_seconds: f64,

    /// File size in bytes
    pub size_bytes: u64,

    /// When the recording started (ms since epoch)
    pub birthtime_ms: i64,
}

impl RecordingMetadata {
    /// Metadata derived from the locally tracked recording window.
    ///
    /// Used when the probe process cannot read the container.
    pub fn from_timer(started_at: DateTime<Utc>, ended_at: DateTime<Utc>, size_bytes: u64) -> Self {
        let elapsed_ms = (ended_at - started_at).num_milliseconds().max(0);
        Self {
            duration_seconds: elapsed_ms as f64 / 1000.0,
            size_bytes,
            birthtime_ms: started_at.timestamp_millis(),
        }
    }
}

/// A recording on local disk
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordingArtifact {
    /// Local file written by the encoder
    pub file_path: PathBuf,
}

impl RecordingArtifact {
    pub fn new(file_path: PathBuf) -> Self {
        Self { file_path }
    }

    pub fn path(&self) -> &Path {
        &self.file_path
    }

    /// File name component, used to build the remote key
    pub fn file_name(&self) -> String {
        self.file_path
            .file_name()
            .unwrap_or_default()
            .to_string_lossy()
            .to_string()
    }
}
