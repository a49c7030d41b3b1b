//! Streaming provider interfaces.
//!
//! The signaling room carries the worker's outgoing data and media; the speech
//! and telephony providers consume the capture stream. Concrete clients live
//! outside this crate and are injected at construction time.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::domain::TaskPayload;
use crate::error::GatewayError;
use crate::host::{CaptureStream, MediaTrack};

/// Room a task's output is relayed into
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomRef {
    pub session_id: String,
    pub room_id: String,
}

impl RoomRef {
    pub fn from_payload(payload: &TaskPayload) -> Self {
        Self {
            session_id: payload.session_id.clone(),
            room_id: payload.room_id.clone(),
        }
    }
}

impl std::fmt::Display for RoomRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.session_id, self.room_id)
    }
}

/// Producer handle inside a joined room
#[async_trait]
pub trait RoomChannel: Send {
    /// Push a payload onto the outgoing data channel
    async fn send_data(&mut self, data: Bytes) -> Result<(), GatewayError>;

    /// Publish a media track into the room
    async fn produce(&mut self, track: Arc<dyn MediaTrack>) -> Result<(), GatewayError>;

    async fn close(&mut self) -> Result<(), GatewayError>;
}

/// Signaling service
#[async_trait]
pub trait SignalingRoom: Send + Sync {
    async fn join(&self, room: &RoomRef) -> Result<Box<dyn RoomChannel>, GatewayError>;
}

/// One recognized chunk of speech
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Utterance {
    pub text: String,

    /// Partial results may be revised by a later utterance
    pub is_partial: bool,

    pub start_seconds: f64,
    pub end_seconds: f64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speaker: Option<String>,
}

/// Streaming speech-to-text provider
#[async_trait]
pub trait SpeechToText: Send + Sync {
    fn name(&self) -> &str;

    /// Start recognizing one captured audio track.
    ///
    /// The receiver closes when the provider ends the session.
    async fn stream(
        &self,
        audio: &Arc<dyn MediaTrack>,
        language: &str,
    ) -> Result<mpsc::Receiver<Utterance>, GatewayError>;
}

/// Telephony provider exchanging audio with a call
#[async_trait]
pub trait Telephony: Send + Sync {
    fn name(&self) -> &str;

    /// Send the stream's audio to the call and get the remote party's track back
    async fn exchange(
        &self,
        capture: &CaptureStream,
        payload: &TaskPayload,
    ) -> Result<Option<Arc<dyn MediaTrack>>, GatewayError>;
}
