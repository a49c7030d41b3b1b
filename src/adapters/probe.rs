//! Container probe adapter.
//!
//! Runs `ffprobe` against a finished recording and reads duration, size and
//! per-stream packet counts from its JSON report.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::process::Command;
use tokio::time::timeout;

use crate::config::RecordingConfig;
use crate::domain::RecordingMetadata;
use crate::error::CaptureError;

/// What the probe learned about a recording
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeReport {
    pub duration_seconds: f64,
    pub size_bytes: u64,

    /// Packet count per stream, in stream order
    pub packet_counts: Vec<u64>,
}

impl ProbeReport {
    pub fn into_metadata(self, birthtime_ms: i64) -> RecordingMetadata {
        RecordingMetadata {
            duration_seconds: self.duration_seconds,
            size_bytes: self.size_bytes,
            birthtime_ms,
        }
    }
}

/// Reads container metadata from a local file
#[async_trait]
pub trait MediaProbe: Send + Sync {
    async fn probe(&self, path: &Path) -> Result<ProbeReport, CaptureError>;
}

/// Probe backed by the `ffprobe` binary
pub struct FfprobeProbe {
    binary_path: String,
    probe_timeout: Duration,
}

impl FfprobeProbe {
    pub fn new(binary_path: impl Into<String>, probe_timeout: Duration) -> Self {
        Self {
            binary_path: binary_path.into(),
            probe_timeout,
        }
    }

    pub fn from_config(config: &RecordingConfig) -> Self {
        Self::new(config.ffprobe_path.clone(), config.ffmpeg_timeout())
    }
}

#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    format: FfprobeFormat,
    #[serde(default)]
    streams: Vec<FfprobeStream>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    duration: Option<String>,
    size: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    nb_read_packets: Option<String>,
}

/// Parse the `-print_format json` report
fn parse_report(raw: &[u8]) -> Result<ProbeReport, CaptureError> {
    let output: FfprobeOutput = serde_json::from_slice(raw)
        .map_err(|e| CaptureError::Probe(format!("invalid ffprobe output: {}", e)))?;

    // ffprobe reports numbers as strings
    let duration_seconds = output
        .format
        .duration
        .as_deref()
        .and_then(|d| d.parse::<f64>().ok())
        .ok_or_else(|| CaptureError::Probe("missing format.duration".to_string()))?;

    let size_bytes = output
        .format
        .size
        .as_deref()
        .and_then(|s| s.parse::<u64>().ok())
        .ok_or_else(|| CaptureError::Probe("missing format.size".to_string()))?;

    let packet_counts = output
        .streams
        .iter()
        .map(|s| {
            s.nb_read_packets
                .as_deref()
                .and_then(|n| n.parse().ok())
                .unwrap_or(0)
        })
        .collect();

    Ok(ProbeReport {
        duration_seconds,
        size_bytes,
        packet_counts,
    })
}

#[async_trait]
impl MediaProbe for FfprobeProbe {
    async fn probe(&self, path: &Path) -> Result<ProbeReport, CaptureError> {
        let child = Command::new(&self.binary_path)
            .args([
                "-v",
                "error",
                "-print_format",
                "json",
                "-show_format",
                "-show_streams",
                "-count_packets",
            ])
            .arg(path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| CaptureError::Probe(format!("{}: {}", self.binary_path, e)))?;

        let output = timeout(self.probe_timeout, child.wait_with_output())
            .await
            .map_err(|_| {
                CaptureError::Probe(format!("timed out after {:?}", self.probe_timeout))
            })?
            .map_err(|e| CaptureError::Probe(e.to_string()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(CaptureError::Probe(format!(
                "exit code {}: {}",
                output.status.code().unwrap_or(-1),
                stderr.trim()
            )));
        }

        parse_report(&output.stdout)
    }
}
