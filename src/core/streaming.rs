//! Streaming pipelines: relay the capture through a provider into the room.
//!
//! Transcribe and voice share one shape: join the room, open the provider
//! exchange, accept, relay until stop, then close the exchange and the room
//! channel in that order. Only the exchange differs.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::lifecycle::{Acceptor, PipelineOutcome, TaskPipeline};
use crate::adapters::{EventLog, RoomChannel, RoomRef, SignalingRoom, SpeechToText, Telephony, Utterance};
use crate::capture::CaptureSession;
use crate::domain::{DomainEvent, EventType, Task, TaskKind, TaskPayload};
use crate::error::CaptureError;
use crate::host::{CaptureStream, MediaTrack};

/// Provider side of a streaming pipeline
#[async_trait]
pub trait StreamExchange: Send + Sync {
    fn kind(&self) -> TaskKind;

    /// Connect the capture to the provider
    async fn open(
        &self,
        capture: &CaptureStream,
        payload: &TaskPayload,
    ) -> Result<Box<dyn ExchangeSession>, CaptureError>;
}

/// An open provider exchange
#[async_trait]
pub trait ExchangeSession: Send {
    /// Relay provider output into the room until the provider ends
    async fn relay(&mut self, channel: &mut dyn RoomChannel) -> Result<(), CaptureError>;

    /// Release the exchange; safe to call once relay was abandoned
    async fn close(&mut self) -> Result<(), CaptureError>;
}

/// Room + exchange pipeline
pub struct StreamingPipeline<E: StreamExchange> {
    exchange: E,
    room: Arc<dyn SignalingRoom>,
}

impl<E: StreamExchange> StreamingPipeline<E> {
    pub fn new(exchange: E, room: Arc<dyn SignalingRoom>) -> Self {
        Self { exchange, room }
    }
}

async fn close_channel(channel: &mut Box<dyn RoomChannel>) {
    if let Err(e) = channel.close().await {
        warn!(error = %e, "Failed to close room channel");
    }
}

#[async_trait]
impl<E: StreamExchange> TaskPipeline for StreamingPipeline<E> {
    fn kind(&self) -> TaskKind {
        self.exchange.kind()
    }

    async fn run(
        &self,
        task: &Task,
        capture: &CaptureSession,
        accept: &Acceptor,
        stop: CancellationToken,
    ) -> Result<PipelineOutcome, CaptureError> {
        let stream = capture.require_stream()?;
        let room = RoomRef::from_payload(&task.payload);

        let joined = tokio::select! {
            biased;
            _ = stop.cancelled() => return Ok(PipelineOutcome::Stopped),
            joined = self.room.join(&room) => joined,
        };
        let mut channel = joined.map_err(|e| CaptureError::provider("signaling", e))?;
        debug!(room = %room, "Joined room");

        let opened = tokio::select! {
            biased;
            _ = stop.cancelled() => None,
            opened = self.exchange.open(stream, &task.payload) => Some(opened),
        };
        let mut session = match opened {
            Some(Ok(session)) => session,
            Some(Err(e)) => {
                close_channel(&mut channel).await;
                return Err(e);
            }
            None => {
                close_channel(&mut channel).await;
                return Ok(PipelineOutcome::Stopped);
            }
        };

        accept.accept(&task.payload);
        info!(room = %room, kind = %self.exchange.kind(), "Streaming started");

        let outcome = tokio::select! {
            biased;
            _ = stop.cancelled() => Ok(PipelineOutcome::Stopped),
            relayed = session.relay(&mut *channel) => relayed.map(|_| PipelineOutcome::Completed),
        };

        if let Err(e) = session.close().await {
            warn!(error = %e, "Failed to close provider exchange");
        }
        close_channel(&mut channel).await;

        outcome
    }
}

/// Speech-to-text exchange; utterances go out on the data channel
pub struct TranscribeExchange {
    provider: Arc<dyn SpeechToText>,
    events: Arc<dyn EventLog>,
    default_language: String,
}

impl TranscribeExchange {
    pub fn new(
        provider: Arc<dyn SpeechToText>,
        events: Arc<dyn EventLog>,
        default_language: impl Into<String>,
    ) -> Self {
        Self {
            provider,
            events,
            default_language: default_language.into(),
        }
    }
}

async fn publish_event(events: &Arc<dyn EventLog>, event: DomainEvent) {
    if let Err(e) = events.publish(&event).await {
        warn!(event_type = ?event.event_type, error = %e, "Failed to publish event");
    }
}

#[async_trait]
impl StreamExchange for TranscribeExchange {
    fn kind(&self) -> TaskKind {
        TaskKind::Transcribe
    }

    async fn open(
        &self,
        capture: &CaptureStream,
        payload: &TaskPayload,
    ) -> Result<Box<dyn ExchangeSession>, CaptureError> {
        let language = payload
            .language
            .clone()
            .unwrap_or_else(|| self.default_language.clone());

        let audio = capture
            .audio_tracks()
            .find(|t| t.is_live())
            .ok_or_else(|| CaptureError::CaptureInvalid("no live audio track to transcribe".to_string()))?;

        let utterances = self
            .provider
            .stream(audio, &language)
            .await
            .map_err(|e| CaptureError::provider("speech-to-text", format!("{}: {}", self.provider.name(), e)))?;

        publish_event(&self.events, DomainEvent::new(EventType::TranscriptionStarted, payload)).await;
        info!(provider = self.provider.name(), language = %language, "Transcription started");

        Ok(Box::new(TranscribeSession {
            utterances,
            events: self.events.clone(),
            payload: payload.clone(),
            started_at: Some(Instant::now()),
            forwarded: 0,
        }))
    }
}

struct TranscribeSession {
    utterances: mpsc::Receiver<Utterance>,
    events: Arc<dyn EventLog>,
    payload: TaskPayload,
    started_at: Option<Instant>,
    forwarded: u64,
}

#[async_trait]
impl ExchangeSession for TranscribeSession {
    async fn relay(&mut self, channel: &mut dyn RoomChannel) -> Result<(), CaptureError> {
        while let Some(utterance) = self.utterances.recv().await {
            let data = serde_json::to_vec(&utterance)
                .map_err(|e| CaptureError::provider("speech-to-text", e))?;
            channel
                .send_data(Bytes::from(data))
                .await
                .map_err(|e| CaptureError::provider("signaling", e))?;
            self.forwarded += 1;
        }
        debug!(forwarded = self.forwarded, "Speech provider ended the stream");
        Ok(())
    }

    async fn close(&mut self) -> Result<(), CaptureError> {
        self.utterances.close();

        // Only a started transcription gets a stop event
        if let Some(started_at) = self.started_at.take() {
            let duration = started_at.elapsed().as_secs_f64();
            let event = DomainEvent::new(EventType::TranscriptionStopped, &self.payload).with_duration(duration);
            publish_event(&self.events, event).await;
            info!(forwarded = self.forwarded, duration_seconds = duration, "Transcription stopped");
        }
        Ok(())
    }
}

/// Telephony exchange; the remote party's audio is produced into the room
pub struct VoiceExchange {
    provider: Arc<dyn Telephony>,
}

impl VoiceExchange {
    pub fn new(provider: Arc<dyn Telephony>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl StreamExchange for VoiceExchange {
    fn kind(&self) -> TaskKind {
        TaskKind::Voice
    }

    async fn open(
        &self,
        capture: &CaptureStream,
        payload: &TaskPayload,
    ) -> Result<Box<dyn ExchangeSession>, CaptureError> {
        let track = self
            .provider
            .exchange(capture, payload)
            .await
            .map_err(|e| CaptureError::provider("telephony", format!("{}: {}", self.provider.name(), e)))?;

        let track = match track {
            None => return Err(CaptureError::provider("telephony", "no remote track returned")),
            Some(track) if track.is_muted() => {
                track.stop();
                return Err(CaptureError::provider("telephony", "remote track is muted"));
            }
            Some(track) => track,
        };

        info!(provider = self.provider.name(), track_id = track.id(), "Telephony exchange established");
        Ok(Box::new(VoiceSession { track }))
    }
}

struct VoiceSession {
    track: Arc<dyn MediaTrack>,
}

#[async_trait]
impl ExchangeSession for VoiceSession {
    async fn relay(&mut self, channel: &mut dyn RoomChannel) -> Result<(), CaptureError> {
        channel
            .produce(self.track.clone())
            .await
            .map_err(|e| CaptureError::provider("signaling", e))?;
        debug!(track_id = self.track.id(), "Remote track produced");

        self.track.ended().await;
        info!(track_id = self.track.id(), "Remote track ended");
        Ok(())
    }

    async fn close(&mut self) -> Result<(), CaptureError> {
        self.track.stop();
        Ok(())
    }
}
