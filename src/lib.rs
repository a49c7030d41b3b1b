//! capture-worker - headless browser tab capture worker
//!
//! For each task the worker opens a browser tab, waits for the application
//! to load, supervises it through a handshake and heartbeat protocol, captures
//! its audio/video and feeds the stream into one of three pipelines:
//!
//! - SSR: record to a local file, validate, upload, notify the control plane
//! - Transcribe: speech-to-text, utterances relayed onto a room data channel
//! - Voice: telephony exchange, remote audio produced into the room
//!
//! # Modules
//!
//! - `host`: Browser-automation host capabilities (tabs, bridge, capture, recorder)
//! - `capture`: TabSession, TabMonitor, MediaStreamGenerator
//! - `core`: Worker lifecycle, pipelines, validators, execution tracker
//! - `adapters`: Gateways (storage, control plane, event log, providers, ffmpeg)
//! - `domain`: Data structures (Task, MonitoringEvent, RecordingArtifact)
//! - `cli`: Operator command-line interface
//!
//! # Usage
//!
//! ```bash
//! # Show the resolved configuration
//! capture-worker config
//!
//! # Check whether a recording would be uploaded
//! capture-worker validate /var/lib/recordings/f00d.mp4 --started-at-ms 1700000000000
//! ```

pub mod adapters;
pub mod capture;
pub mod cli;
pub mod config;
pub mod core;
pub mod domain;
pub mod error;
pub mod host;

// Re-export main types at crate root for convenience
pub use capture::{CaptureSession, MediaStreamGenerator};
pub use config::WorkerConfig;
pub use core::{Acceptor, RunOutcome, Worker, WorkerFactory, WorkerMessage};
pub use domain::{Task, TaskKind, TaskPayload, WorkerStatus};
pub use error::{CaptureError, GatewayError, MonitorPhase, ValidationError};
