//! Configuration for the capture worker.
//!
//! Configuration sources (highest priority first):
//! 1. Environment variables (CAPTURE_WORKER_OUTPUT_DIR, CAPTURE_WORKER_CORE_API_URL,
//!    CAPTURE_WORKER_STORAGE_URL, CAPTURE_WORKER_MAX_TASKS)
//! 2. Config file ($CAPTURE_WORKER_CONFIG, or .capture-worker/config.yaml found by
//!    searching the current directory and its parents, then ~/.capture-worker/config.yaml)
//! 3. Defaults

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::host::{CaptureConstraints, VideoConstraints};

/// Complete worker configuration (matches YAML structure)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkerConfig {
    #[serde(default)]
    pub monitor: MonitorConfig,
    #[serde(default)]
    pub capture: CaptureConfig,
    #[serde(default)]
    pub recording: RecordingConfig,
    #[serde(default)]
    pub worker: LimitsConfig,
    #[serde(default)]
    pub gateways: GatewayConfig,

    /// Path the configuration was loaded from (if any)
    #[serde(skip)]
    pub config_file: Option<PathBuf>,
}

/// Handshake and heartbeat budgets for the tab monitor
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    #[serde(default = "default_initialized_timeout")]
    pub initialized_event_timeout_ms: u64,
    #[serde(default = "default_app_ready_timeout")]
    pub app_ready_event_timeout_ms: u64,
    #[serde(default = "default_connection_timeout")]
    pub connection_state_timeout_ms: u64,
    #[serde(default = "default_alive_timeout")]
    pub alive_event_timeout_ms: u64,
    /// Fixed delay before rebinding after APP_REFRESH
    #[serde(default = "default_refresh_delay")]
    pub app_refresh_delay_ms: u64,
}

fn default_initialized_timeout() -> u64 {
    30_000
}
fn default_app_ready_timeout() -> u64 {
    60_000
}
fn default_connection_timeout() -> u64 {
    60_000
}
fn default_alive_timeout() -> u64 {
    30_000
}
fn default_refresh_delay() -> u64 {
    2_000
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            initialized_event_timeout_ms: default_initialized_timeout(),
            app_ready_event_timeout_ms: default_app_ready_timeout(),
            connection_state_timeout_ms: default_connection_timeout(),
            alive_event_timeout_ms: default_alive_timeout(),
            app_refresh_delay_ms: default_refresh_delay(),
        }
    }
}

impl MonitorConfig {
    pub fn initialized_event_timeout(&self) -> Duration {
        Duration::from_millis(self.initialized_event_timeout_ms)
    }

    pub fn app_ready_event_timeout(&self) -> Duration {
        Duration::from_millis(self.app_ready_event_timeout_ms)
    }

    pub fn connection_state_timeout(&self) -> Duration {
        Duration::from_millis(self.connection_state_timeout_ms)
    }

    pub fn alive_event_timeout(&self) -> Duration {
        Duration::from_millis(self.alive_event_timeout_ms)
    }

    pub fn app_refresh_delay(&self) -> Duration {
        Duration::from_millis(self.app_refresh_delay_ms)
    }
}

/// Tab delivery and capture settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureConfig {
    #[serde(default = "default_delivery_timeout")]
    pub document_delivery_timeout_ms: u64,

    /// Glob patterns matching titles of delivery-proxy placeholder pages
    #[serde(default = "default_placeholder_titles")]
    pub placeholder_titles: Vec<String>,

    /// Substring the real application's title must contain (if set)
    #[serde(default)]
    pub expected_title: Option<String>,

    #[serde(default = "default_true")]
    pub audio: bool,
    #[serde(default = "default_true")]
    pub video: bool,
    #[serde(default)]
    pub video_constraints: VideoConstraints,
}

fn default_delivery_timeout() -> u64 {
    30_000
}
fn default_placeholder_titles() -> Vec<String> {
    vec![
        "Just a moment*".to_string(),
        "Attention Required*".to_string(),
        "*Gateway Time-out*".to_string(),
        "http*://*".to_string(),
    ]
}
fn default_true() -> bool {
    true
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            document_delivery_timeout_ms: default_delivery_timeout(),
            placeholder_titles: default_placeholder_titles(),
            expected_title: None,
            audio: true,
            video: true,
            video_constraints: VideoConstraints::default(),
        }
    }
}

impl CaptureConfig {
    pub fn document_delivery_timeout(&self) -> Duration {
        Duration::from_millis(self.document_delivery_timeout_ms)
    }

    /// Constraints handed to the host capture primitive
    pub fn constraints(&self) -> CaptureConstraints {
        CaptureConstraints {
            audio: self.audio,
            video: self.video,
            video_constraints: self.video_constraints.clone(),
        }
    }
}

/// SSR recording, encoder and finalize settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordingConfig {
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    #[serde(default = "default_extension")]
    pub file_extension: String,
    /// Recorder chunk interval
    #[serde(default = "default_timeslice")]
    pub timeslice_ms: u64,
    #[serde(default = "default_ffmpeg_path")]
    pub ffmpeg_path: String,
    /// Encoder args placed between the stdin input and the output path
    #[serde(default = "default_ffmpeg_args")]
    pub ffmpeg_args: Vec<String>,
    #[serde(default = "default_ffprobe_path")]
    pub ffprobe_path: String,
    /// Grace period for the encoder to exit after quit was requested
    #[serde(default = "default_ffmpeg_timeout")]
    pub ffmpeg_timeout_ms: u64,
    #[serde(default = "default_max_length")]
    pub max_length_minutes: u64,
    #[serde(default = "default_min_duration")]
    pub min_duration_seconds: f64,
    #[serde(default = "default_notify_retry_delay")]
    pub notify_retry_delay_ms: u64,
}

fn default_output_dir() -> PathBuf {
    std::env::temp_dir().join("capture-worker")
}
fn default_extension() -> String {
    "mp4".to_string()
}
fn default_timeslice() -> u64 {
    1_000
}
fn default_ffmpeg_path() -> String {
    "ffmpeg".to_string()
}
fn default_ffmpeg_args() -> Vec<String> {
    ["-c:v", "libx264", "-preset", "veryfast", "-c:a", "aac", "-movflags", "+faststart"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}
fn default_ffprobe_path() -> String {
    "ffprobe".to_string()
}
fn default_ffmpeg_timeout() -> u64 {
    30_000
}
fn default_max_length() -> u64 {
    240
}
fn default_min_duration() -> f64 {
    5.0
}
fn default_notify_retry_delay() -> u64 {
    1_000
}

impl Default for RecordingConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            file_extension: default_extension(),
            timeslice_ms: default_timeslice(),
            ffmpeg_path: default_ffmpeg_path(),
            ffmpeg_args: default_ffmpeg_args(),
            ffprobe_path: default_ffprobe_path(),
            ffmpeg_timeout_ms: default_ffmpeg_timeout(),
            max_length_minutes: default_max_length(),
            min_duration_seconds: default_min_duration(),
            notify_retry_delay_ms: default_notify_retry_delay(),
        }
    }
}

impl RecordingConfig {
    pub fn timeslice(&self) -> Duration {
        Duration::from_millis(self.timeslice_ms)
    }

    pub fn ffmpeg_timeout(&self) -> Duration {
        Duration::from_millis(self.ffmpeg_timeout_ms)
    }

    pub fn max_length(&self) -> Duration {
        Duration::from_secs(self.max_length_minutes * 60)
    }

    pub fn notify_retry_delay(&self) -> Duration {
        Duration::from_millis(self.notify_retry_delay_ms)
    }
}

/// Per-process limits
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    /// Tasks this process may execute before asking for a graceful restart
    #[serde(default = "default_max_tasks")]
    pub max_task_executions: u64,

    /// Lines kept in each worker's diagnostic trail
    #[serde(default = "default_diagnostic_buffer")]
    pub diagnostic_buffer: usize,
}

fn default_max_tasks() -> u64 {
    50
}
fn default_diagnostic_buffer() -> usize {
    200
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_task_executions: default_max_tasks(),
            diagnostic_buffer: default_diagnostic_buffer(),
        }
    }
}

/// Endpoints of the external gateways
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Control-plane base URL
    pub core_api_url: Option<String>,
    /// Object storage base URL
    pub storage_url: Option<String>,
    #[serde(default)]
    pub bucket: String,
    /// JSONL file backing the event log
    pub event_log_path: Option<PathBuf>,
}

impl WorkerConfig {
    /// Load configuration from all sources
    pub fn load() -> Result<Self> {
        let config_file = std::env::var("CAPTURE_WORKER_CONFIG")
            .ok()
            .map(PathBuf::from)
            .or_else(find_config_file);

        let mut config = match config_file {
            Some(ref path) => {
                let mut config = Self::from_file(path)?;
                config.config_file = Some(path.clone());
                config
            }
            None => Self::default(),
        };

        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Load and parse a config file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::from_yaml(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Parse configuration from YAML content
    pub fn from_yaml(content: &str) -> Result<Self> {
        serde_yaml::from_str(content).context("Failed to parse worker config YAML")
    }

    fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(dir) = std::env::var("CAPTURE_WORKER_OUTPUT_DIR") {
            self.recording.output_dir = PathBuf::from(dir);
        }
        if let Ok(url) = std::env::var("CAPTURE_WORKER_CORE_API_URL") {
            self.gateways.core_api_url = Some(url);
        }
        if let Ok(url) = std::env::var("CAPTURE_WORKER_STORAGE_URL") {
            self.gateways.storage_url = Some(url);
        }
        if let Ok(max) = std::env::var("CAPTURE_WORKER_MAX_TASKS") {
            self.worker.max_task_executions = max
                .parse()
                .with_context(|| format!("Invalid CAPTURE_WORKER_MAX_TASKS: {}", max))?;
        }
        Ok(())
    }

    /// Reject configurations the worker cannot run with
    pub fn validate(&self) -> Result<()> {
        let timeouts = [
            ("monitor.initialized_event_timeout_ms", self.monitor.initialized_event_timeout_ms),
            ("monitor.app_ready_event_timeout_ms", self.monitor.app_ready_event_timeout_ms),
            ("monitor.connection_state_timeout_ms", self.monitor.connection_state_timeout_ms),
            ("monitor.alive_event_timeout_ms", self.monitor.alive_event_timeout_ms),
            ("capture.document_delivery_timeout_ms", self.capture.document_delivery_timeout_ms),
            ("recording.timeslice_ms", self.recording.timeslice_ms),
            ("recording.ffmpeg_timeout_ms", self.recording.ffmpeg_timeout_ms),
            ("recording.max_length_minutes", self.recording.max_length_minutes),
        ];

        for (name, value) in timeouts {
            if value == 0 {
                anyhow::bail!("{} must be greater than zero", name);
            }
        }

        if self.recording.file_extension.trim_start_matches('.').is_empty() {
            anyhow::bail!("recording.file_extension cannot be empty");
        }

        for pattern in &self.capture.placeholder_titles {
            glob::Pattern::new(pattern)
                .with_context(|| format!("Invalid capture.placeholder_titles pattern: {}", pattern))?;
        }

        Ok(())
    }
}

/// Find config file by searching current directory and parents
fn find_config_file() -> Option<PathBuf> {
    let mut current = std::env::current_dir().ok()?;

    loop {
        let config_path = current.join(".capture-worker").join("config.yaml");
        if config_path.exists() {
            return Some(config_path);
        }

        if !current.pop() {
            break;
        }
    }

    // Fall back to ~/.capture-worker/config.yaml
    worker_home()
        .ok()
        .map(|home| home.join("config.yaml"))
        .filter(|path| path.exists())
}

/// Default location for operator-provided state (~/.capture-worker)
pub fn worker_home() -> Result<PathBuf> {
    Ok(dirs::home_dir()
        .context("Failed to determine home directory")?
        .join(".capture-worker"))
}
