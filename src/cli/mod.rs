//! Command-line interface for capture-worker.
//!
//! Operator tooling around the worker: inspect the resolved configuration,
//! probe a recording and dry-run the finalize validators against it.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{TimeZone, Utc};
use clap::{Parser, Subcommand};

use crate::adapters::{FfprobeProbe, MediaProbe};
use crate::config::WorkerConfig;
use crate::core::{FileExistValidator, MinDurationValidator, ValidationSubject, Validator};
use crate::domain::RecordingMetadata;

/// capture-worker - headless tab capture worker
#[derive(Parser, Debug)]
#[command(name = "capture-worker")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Show resolved configuration
    Config,

    /// Probe a recording and print its metadata
    Probe {
        /// Recording file
        file: PathBuf,
    },

    /// Run the finalize validators against a local recording
    Validate {
        /// Recording file
        file: PathBuf,

        /// When the recording started (ms since epoch); used if probing fails
        #[arg(long, env = "CAPTURE_WORKER_STARTED_AT_MS")]
        started_at_ms: Option<i64>,

        /// Override the configured minimum duration (seconds)
        #[arg(long)]
        min_duration: Option<f64>,
    },
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(self) -> Result<()> {
        match self.command {
            Commands::Config => show_config(),
            Commands::Probe { file } => probe_file(&file).await,
            Commands::Validate {
                file,
                started_at_ms,
                min_duration,
            } => validate_file(&file, started_at_ms, min_duration).await,
        }
    }
}

fn show_config() -> Result<()> {
    let cfg = WorkerConfig::load()?;

    println!("capture-worker configuration");
    println!();
    println!(
        "Config file: {}",
        cfg.config_file
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "(none - using defaults)".to_string())
    );
    println!();
    println!("Monitor:");
    println!("  APP_INITIALIZED timeout: {}ms", cfg.monitor.initialized_event_timeout_ms);
    println!("  APP_READY timeout:       {}ms", cfg.monitor.app_ready_event_timeout_ms);
    println!("  Connection timeout:      {}ms", cfg.monitor.connection_state_timeout_ms);
    println!("  ALIVE timeout:           {}ms", cfg.monitor.alive_event_timeout_ms);
    println!("  Refresh delay:           {}ms", cfg.monitor.app_refresh_delay_ms);
    println!();
    println!("Capture:");
    println!("  Delivery timeout:  {}ms", cfg.capture.document_delivery_timeout_ms);
    println!("  Placeholders:      {}", cfg.capture.placeholder_titles.join(", "));
    println!(
        "  Expected title:    {}",
        cfg.capture.expected_title.as_deref().unwrap_or("(any)")
    );
    println!("  Constraints:       {}", serde_json::to_string(&cfg.capture.constraints())?);
    println!();
    println!("Recording:");
    println!("  Output dir:    {}", cfg.recording.output_dir.display());
    println!("  Extension:     {}", cfg.recording.file_extension);
    println!("  Encoder:       {} {}", cfg.recording.ffmpeg_path, cfg.recording.ffmpeg_args.join(" "));
    println!("  Probe:         {}", cfg.recording.ffprobe_path);
    println!("  Grace timeout: {}ms", cfg.recording.ffmpeg_timeout_ms);
    println!("  Max length:    {} min", cfg.recording.max_length_minutes);
    println!("  Min duration:  {}s", cfg.recording.min_duration_seconds);
    println!();
    println!("Worker:");
    println!("  Max task executions: {}", cfg.worker.max_task_executions);
    println!("  Diagnostic buffer:   {} lines", cfg.worker.diagnostic_buffer);
    println!();
    println!("Gateways:");
    println!("  Core API:  {}", cfg.gateways.core_api_url.as_deref().unwrap_or("(not set)"));
    println!("  Storage:   {}", cfg.gateways.storage_url.as_deref().unwrap_or("(not set)"));
    println!(
        "  Event log: {}",
        cfg.gateways
            .event_log_path
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "(not set)".to_string())
    );

    Ok(())
}

async fn probe_file(file: &Path) -> Result<()> {
    let cfg = WorkerConfig::load()?;
    let probe = FfprobeProbe::from_config(&cfg.recording);

    let report = probe
        .probe(file)
        .await
        .with_context(|| format!("Failed to probe {}", file.display()))?;

    println!("File:     {}", file.display());
    println!("Duration: {:.3}s", report.duration_seconds);
    println!("Size:     {} bytes", report.size_bytes);
    println!("Packets:  {:?}", report.packet_counts);
    Ok(())
}

async fn validate_file(file: &Path, started_at_ms: Option<i64>, min_duration: Option<f64>) -> Result<()> {
    let cfg = WorkerConfig::load()?;
    let min_seconds = min_duration.unwrap_or(cfg.recording.min_duration_seconds);

    let subject = ValidationSubject {
        path: file,
        metadata: None,
    };
    if let Err(e) = FileExistValidator.validate(&subject) {
        println!("Would discard ({}): {}", e.validator(), e);
        return Ok(());
    }

    let size_bytes = std::fs::metadata(file)
        .with_context(|| format!("Failed to stat {}", file.display()))?
        .len();
    let started_at = match started_at_ms {
        Some(ms) => Utc
            .timestamp_millis_opt(ms)
            .single()
            .with_context(|| format!("Invalid --started-at-ms: {}", ms))?,
        None => Utc::now(),
    };

    let probe = FfprobeProbe::from_config(&cfg.recording);
    let metadata = match probe.probe(file).await {
        Ok(report) => report.into_metadata(started_at.timestamp_millis()),
        Err(e) => {
            println!("Probe failed ({}); using the recording timer", e);
            RecordingMetadata::from_timer(started_at, Utc::now(), size_bytes)
        }
    };

    let subject = ValidationSubject {
        path: file,
        metadata: Some(&metadata),
    };
    match MinDurationValidator::new(min_seconds).validate(&subject) {
        Ok(()) => println!("Would upload: {}", serde_json::to_string_pretty(&metadata)?),
        Err(e) => println!("Would discard ({}): {}", e.validator(), e),
    }

    Ok(())
}
