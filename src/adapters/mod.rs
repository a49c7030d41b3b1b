//! Adapter interfaces for external systems.
//!
//! Adapters give the worker a uniform view of the gateways it calls:
//! object storage, the control plane, the event log, the signaling room,
//! the speech/telephony providers and the encoder/probe processes.
//! This crate only defines call ordering and retry policy around them.

pub mod encoder;
pub mod event_log;
pub mod http;
pub mod probe;
pub mod providers;

use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::{DomainEvent, RecordingMetadata, TaskPayload};
use crate::error::GatewayError;

pub use encoder::{EncoderExit, EncoderLauncher, EncoderProcess, ExitSignal, FfmpegLauncher};
pub use event_log::JsonlEventLog;
pub use http::{HttpControlPlane, HttpObjectStorage};
pub use probe::{FfprobeProbe, MediaProbe, ProbeReport};
pub use providers::{RoomChannel, RoomRef, SignalingRoom, SpeechToText, Telephony, Utterance};

/// Object storage for finished recordings
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Human-readable adapter name
    fn name(&self) -> &str;

    /// Upload a local file under `key`; returns the remote key
    async fn upload(&self, path: &Path, key: &str) -> Result<String, GatewayError>;
}

/// Control-plane notifications
#[async_trait]
pub trait ControlPlane: Send + Sync {
    /// Register an uploaded recording
    async fn notify_recording(&self, notice: &RecordingNotice) -> Result<(), GatewayError>;
}

/// Append-only domain event log
#[async_trait]
pub trait EventLog: Send + Sync {
    async fn publish(&self, event: &DomainEvent) -> Result<(), GatewayError>;
}

/// Body of the recording notification sent to the control plane
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordingNotice {
    pub company_id: String,
    pub session_id: String,
    pub session_run_id: String,
    pub attendee_id: String,
    pub room_id: String,
    pub meeting_name: String,

    /// Remote key returned by the storage upload
    pub key: String,

    pub metadata: RecordingMetadata,
}

impl RecordingNotice {
    pub fn new(payload: &TaskPayload, key: String, metadata: RecordingMetadata) -> Self {
        Self {
            company_id: payload.company_id.clone(),
            session_id: payload.session_id.clone(),
            session_run_id: payload.session_run_id.clone(),
            attendee_id: payload.attendee_id.clone(),
            room_id: payload.room_id.clone(),
            meeting_name: payload.meeting_name.clone(),
            key,
            metadata,
        }
    }
}

/// Remote key layout for a recording file
pub fn recording_key(payload: &TaskPayload, file_name: &str) -> String {
    format!(
        "recordings/{}/{}/{}/{}",
        payload.company_id, payload.session_id, payload.session_run_id, file_name
    )
}
