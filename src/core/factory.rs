//! Worker construction.
//!
//! The pipeline is chosen by task kind when the worker is built; a kind whose
//! gateways are not configured fails here, before anything is acquired.

use std::sync::Arc;

use anyhow::{Context, Result};

use super::diagnostics::DiagnosticLog;
use super::lifecycle::{TaskPipeline, Worker};
use super::ssr::{SsrPipeline, SsrSettings};
use super::streaming::{StreamingPipeline, TranscribeExchange, VoiceExchange};
use super::tracker::ExecutionTracker;
use crate::adapters::{
    ControlPlane, EncoderLauncher, EventLog, FfmpegLauncher, FfprobeProbe, HttpControlPlane,
    HttpObjectStorage, JsonlEventLog, MediaProbe, ObjectStorage, SignalingRoom, SpeechToText,
    Telephony,
};
use crate::capture::MediaStreamGenerator;
use crate::config::WorkerConfig;
use crate::domain::{Task, TaskKind};
use crate::host::BrowserHost;

/// Recognition language when the task does not name one
pub const DEFAULT_LANGUAGE: &str = "en-US";

/// External collaborators available to workers
#[derive(Clone)]
pub struct Gateways {
    pub host: Arc<dyn BrowserHost>,
    pub encoder: Option<Arc<dyn EncoderLauncher>>,
    pub probe: Option<Arc<dyn MediaProbe>>,
    pub storage: Option<Arc<dyn ObjectStorage>>,
    pub control_plane: Option<Arc<dyn ControlPlane>>,
    pub events: Option<Arc<dyn EventLog>>,
    pub room: Option<Arc<dyn SignalingRoom>>,
    pub speech: Option<Arc<dyn SpeechToText>>,
    pub telephony: Option<Arc<dyn Telephony>>,
}

impl Gateways {
    pub fn new(host: Arc<dyn BrowserHost>) -> Self {
        Self {
            host,
            encoder: None,
            probe: None,
            storage: None,
            control_plane: None,
            events: None,
            room: None,
            speech: None,
            telephony: None,
        }
    }

    /// Fill the gateways this crate can provide from configuration:
    /// ffmpeg/ffprobe, the HTTP clients and the JSONL event log
    pub async fn with_configured_adapters(mut self, config: &WorkerConfig) -> Result<Self> {
        self.encoder = Some(Arc::new(FfmpegLauncher::from_config(&config.recording)));
        self.probe = Some(Arc::new(FfprobeProbe::from_config(&config.recording)));

        if let Some(url) = &config.gateways.core_api_url {
            self.control_plane = Some(Arc::new(HttpControlPlane::new(url.clone())));
        }
        if let Some(url) = &config.gateways.storage_url {
            self.storage = Some(Arc::new(HttpObjectStorage::new(
                url.clone(),
                config.gateways.bucket.clone(),
            )));
        }
        if let Some(path) = &config.gateways.event_log_path {
            let log = JsonlEventLog::open(path.clone())
                .await
                .with_context(|| format!("Failed to open event log: {}", path.display()))?;
            self.events = Some(Arc::new(log));
        }

        Ok(self)
    }

    pub fn with_encoder(mut self, encoder: Arc<dyn EncoderLauncher>) -> Self {
        self.encoder = Some(encoder);
        self
    }

    pub fn with_probe(mut self, probe: Arc<dyn MediaProbe>) -> Self {
        self.probe = Some(probe);
        self
    }

    pub fn with_storage(mut self, storage: Arc<dyn ObjectStorage>) -> Self {
        self.storage = Some(storage);
        self
    }

    pub fn with_control_plane(mut self, control_plane: Arc<dyn ControlPlane>) -> Self {
        self.control_plane = Some(control_plane);
        self
    }

    pub fn with_events(mut self, events: Arc<dyn EventLog>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn with_room(mut self, room: Arc<dyn SignalingRoom>) -> Self {
        self.room = Some(room);
        self
    }

    pub fn with_speech(mut self, speech: Arc<dyn SpeechToText>) -> Self {
        self.speech = Some(speech);
        self
    }

    pub fn with_telephony(mut self, telephony: Arc<dyn Telephony>) -> Self {
        self.telephony = Some(telephony);
        self
    }
}

fn required<T: ?Sized>(gateway: &Option<Arc<T>>, name: &str, kind: TaskKind) -> Result<Arc<T>> {
    gateway
        .clone()
        .with_context(|| format!("{} gateway is required for {} tasks", name, kind))
}

/// Builds one worker per task
pub struct WorkerFactory {
    config: WorkerConfig,
    gateways: Gateways,
    tracker: Arc<ExecutionTracker>,
}

impl WorkerFactory {
    pub fn new(config: WorkerConfig, gateways: Gateways, tracker: Arc<ExecutionTracker>) -> Self {
        Self {
            config,
            gateways,
            tracker,
        }
    }

    pub fn tracker(&self) -> &Arc<ExecutionTracker> {
        &self.tracker
    }

    pub fn build(&self, task: Task) -> Result<Worker> {
        let pipeline = self
            .pipeline_for(task.kind)
            .with_context(|| format!("Cannot build worker for task {}", task.id))?;

        let diagnostics = Arc::new(DiagnosticLog::new(self.config.worker.diagnostic_buffer));
        let generator = MediaStreamGenerator::new(
            self.gateways.host.clone(),
            &self.config.monitor,
            &self.config.capture,
            diagnostics.clone(),
        );

        Ok(Worker::new(
            task,
            pipeline,
            generator,
            self.config.capture.constraints(),
            self.tracker.clone(),
            diagnostics,
        ))
    }

    fn pipeline_for(&self, kind: TaskKind) -> Result<Box<dyn TaskPipeline>> {
        let g = &self.gateways;
        let pipeline: Box<dyn TaskPipeline> = match kind {
            TaskKind::Ssr => Box::new(SsrPipeline::new(
                SsrSettings::from(&self.config.recording),
                g.host.clone(),
                required(&g.encoder, "encoder", kind)?,
                required(&g.probe, "probe", kind)?,
                required(&g.storage, "object storage", kind)?,
                required(&g.control_plane, "control plane", kind)?,
            )),
            TaskKind::Transcribe => Box::new(StreamingPipeline::new(
                TranscribeExchange::new(
                    required(&g.speech, "speech-to-text", kind)?,
                    required(&g.events, "event log", kind)?,
                    DEFAULT_LANGUAGE,
                ),
                required(&g.room, "signaling room", kind)?,
            )),
            TaskKind::Voice => Box::new(StreamingPipeline::new(
                VoiceExchange::new(required(&g.telephony, "telephony", kind)?),
                required(&g.room, "signaling room", kind)?,
            )),
        };
        Ok(pipeline)
    }
}
