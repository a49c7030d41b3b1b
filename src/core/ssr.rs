//! SSR pipeline: record the capture to a local file, then validate, upload,
//! notify and clean up during finalize.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::lifecycle::{Acceptor, PipelineOutcome, TaskPipeline};
use super::validators::{FileExistValidator, MinDurationValidator, ValidationSubject, Validator};
use crate::adapters::{
    recording_key, ControlPlane, EncoderExit, EncoderLauncher, EncoderProcess, MediaProbe,
    ObjectStorage, RecordingNotice,
};
use crate::capture::CaptureSession;
use crate::config::RecordingConfig;
use crate::domain::{RecordingArtifact, RecordingMetadata, Task, TaskKind, TaskPayload};
use crate::error::{CaptureError, GatewayError, ValidationError};
use crate::host::BrowserHost;

/// Recording settings used by the pipeline
#[derive(Debug, Clone)]
pub struct SsrSettings {
    pub output_dir: PathBuf,
    pub file_extension: String,
    pub timeslice: Duration,
    pub ffmpeg_timeout: Duration,
    pub max_length: Duration,
    pub min_duration_seconds: f64,
    pub notify_retry_delay: Duration,
}

impl From<&RecordingConfig> for SsrSettings {
    fn from(config: &RecordingConfig) -> Self {
        Self {
            output_dir: config.output_dir.clone(),
            file_extension: config.file_extension.clone(),
            timeslice: config.timeslice(),
            ffmpeg_timeout: config.ffmpeg_timeout(),
            max_length: config.max_length(),
            min_duration_seconds: config.min_duration_seconds,
            notify_retry_delay: config.notify_retry_delay(),
        }
    }
}

impl SsrSettings {
    /// Unique local path for a new recording
    pub fn recording_path(&self) -> PathBuf {
        self.output_dir.join(format!(
            "{}.{}",
            Uuid::new_v4(),
            self.file_extension.trim_start_matches('.')
        ))
    }

    /// Ceiling for one task, honoring the per-task override
    pub fn max_length_for(&self, payload: &TaskPayload) -> Duration {
        payload
            .max_length_minutes
            .map(|minutes| Duration::from_secs(minutes * 60))
            .unwrap_or(self.max_length)
    }
}

/// What the recording phase left for finalize
#[derive(Debug, Clone)]
struct RecordingState {
    artifact: RecordingArtifact,
    started_at: DateTime<Utc>,
    ended_at: Option<DateTime<Utc>>,
    chunks: u64,
}

#[derive(Debug)]
enum StopReason {
    Stopped,
    MaxLength,
    RecorderEnded,
    EncoderExited(EncoderExit),
    WriteFailed(std::io::Error),
}

#[derive(Debug)]
enum FinalizeOutcome {
    Uploaded { key: String },
    Discarded(ValidationError),
}

/// Record -> validate -> upload -> notify
pub struct SsrPipeline {
    settings: SsrSettings,
    host: Arc<dyn BrowserHost>,
    encoder: Arc<dyn EncoderLauncher>,
    probe: Arc<dyn MediaProbe>,
    storage: Arc<dyn ObjectStorage>,
    control_plane: Arc<dyn ControlPlane>,
    recording: Mutex<Option<RecordingState>>,
}

impl SsrPipeline {
    pub fn new(
        settings: SsrSettings,
        host: Arc<dyn BrowserHost>,
        encoder: Arc<dyn EncoderLauncher>,
        probe: Arc<dyn MediaProbe>,
        storage: Arc<dyn ObjectStorage>,
        control_plane: Arc<dyn ControlPlane>,
    ) -> Self {
        Self {
            settings,
            host,
            encoder,
            probe,
            storage,
            control_plane,
            recording: Mutex::new(None),
        }
    }

    /// Local file of the current recording, if one was started
    pub fn recording_path(&self) -> Option<PathBuf> {
        self.with_state(|state| state.as_ref().map(|s| s.artifact.file_path.clone()))
    }

    fn with_state<R>(&self, f: impl FnOnce(&mut Option<RecordingState>) -> R) -> R {
        let mut guard = self.recording.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut guard)
    }

    /// Ask the encoder to finish, killing it if it does not within the grace period
    async fn stop_encoder(&self, encoder: &mut EncoderProcess) -> EncoderExit {
        let exit = encoder.exit_signal();
        let graceful = async {
            // The quit byte itself can block on a stalled input
            if let Err(e) = encoder.request_quit().await {
                debug!(error = %e, "Encoder input already closed");
            }
            exit.wait().await
        };

        match timeout(self.settings.ffmpeg_timeout, graceful).await {
            Ok(exit) => exit,
            Err(_) => {
                warn!(
                    timeout_ms = self.settings.ffmpeg_timeout.as_millis() as u64,
                    "Encoder did not exit after quit; killing"
                );
                encoder.kill();
                timeout(self.settings.ffmpeg_timeout, encoder.exit_signal().wait())
                    .await
                    .unwrap_or(EncoderExit {
                        code: None,
                        killed: true,
                    })
            }
        }
    }

    /// Validate, probe, upload and notify
    async fn finalize_recording(
        &self,
        task: &Task,
        state: &RecordingState,
    ) -> Result<FinalizeOutcome, CaptureError> {
        let path = state.artifact.path();
        let ended_at = state.ended_at.unwrap_or_else(Utc::now);

        let subject = ValidationSubject {
            path,
            metadata: None,
        };
        if let Err(e) = FileExistValidator.validate(&subject) {
            if state.chunks > 0 {
                warn!(
                    chunks = state.chunks,
                    path = %path.display(),
                    "Recording file missing although the recorder produced chunks"
                );
            } else {
                info!(validator = e.validator(), "Nothing was recorded; discarding");
            }
            return Ok(FinalizeOutcome::Discarded(e));
        }

        let size_bytes = tokio::fs::metadata(path)
            .await
            .map(|m| m.len())
            .unwrap_or(0);

        let metadata = match self.probe.probe(path).await {
            Ok(report) => report.into_metadata(state.started_at.timestamp_millis()),
            Err(e) => {
                warn!(error = %e, "Probe failed; using the recording timer");
                RecordingMetadata::from_timer(state.started_at, ended_at, size_bytes)
            }
        };

        let subject = ValidationSubject {
            path,
            metadata: Some(&metadata),
        };
        if let Err(e) = MinDurationValidator::new(self.settings.min_duration_seconds).validate(&subject) {
            info!(validator = e.validator(), error = %e, "Recording discarded");
            return Ok(FinalizeOutcome::Discarded(e));
        }

        let key = recording_key(&task.payload, &state.artifact.file_name());
        let remote_key = self.storage.upload(path, &key).await?;
        info!(
            storage = self.storage.name(),
            key = %remote_key,
            duration_seconds = metadata.duration_seconds,
            "Recording uploaded"
        );

        let notice = RecordingNotice::new(&task.payload, remote_key.clone(), metadata);
        self.notify(&notice).await?;

        Ok(FinalizeOutcome::Uploaded { key: remote_key })
    }

    /// Notify the control plane, retrying reset connections without bound
    async fn notify(&self, notice: &RecordingNotice) -> Result<(), GatewayError> {
        let mut attempt = 1u32;
        loop {
            match self.control_plane.notify_recording(notice).await {
                Ok(()) => {
                    info!(attempt, key = %notice.key, "Control plane notified");
                    return Ok(());
                }
                Err(e) if e.is_connection_reset() => {
                    warn!(attempt, error = %e, "Notify connection reset; retrying");
                    attempt += 1;
                    sleep(self.settings.notify_retry_delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Remove a local recording; a missing file counts as removed
async fn remove_recording(path: &Path) -> Result<bool, GatewayError> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e.into()),
    }
}

#[async_trait]
impl TaskPipeline for SsrPipeline {
    fn kind(&self) -> TaskKind {
        TaskKind::Ssr
    }

    async fn run(
        &self,
        task: &Task,
        capture: &CaptureSession,
        accept: &Acceptor,
        stop: CancellationToken,
    ) -> Result<PipelineOutcome, CaptureError> {
        let stream = capture.require_stream()?;

        tokio::fs::create_dir_all(&self.settings.output_dir)
            .await
            .map_err(|e| CaptureError::encoder("prepare", e))?;
        let path = self.settings.recording_path();

        let mut recorder = self.host.start_recorder(stream, self.settings.timeslice).await?;
        let mut encoder = match self.encoder.spawn(&path).await {
            Ok(encoder) => encoder,
            Err(e) => {
                if let Err(stop_err) = recorder.stop().await {
                    warn!(error = %stop_err, "Failed to stop recorder");
                }
                return Err(e);
            }
        };

        let started_at = Utc::now();
        self.with_state(|state| {
            *state = Some(RecordingState {
                artifact: RecordingArtifact::new(path.clone()),
                started_at,
                ended_at: None,
                chunks: 0,
            })
        });
        accept.accept(&task.payload);

        let ceiling = self.settings.max_length_for(&task.payload);
        info!(path = %path.display(), max_length_secs = ceiling.as_secs(), "Recording started");

        let deadline = sleep(ceiling);
        tokio::pin!(deadline);
        let exit = encoder.exit_signal().wait();
        tokio::pin!(exit);

        let mut chunks = 0u64;
        let reason = loop {
            tokio::select! {
                biased;
                _ = stop.cancelled() => break StopReason::Stopped,
                _ = &mut deadline => break StopReason::MaxLength,
                exit = &mut exit => break StopReason::EncoderExited(exit),
                chunk = recorder.next_chunk() => match chunk {
                    // A full encoder pipe must not hold off stop, max length or exit
                    Some(chunk) => tokio::select! {
                        biased;
                        _ = stop.cancelled() => break StopReason::Stopped,
                        _ = &mut deadline => break StopReason::MaxLength,
                        exit = &mut exit => break StopReason::EncoderExited(exit),
                        written = encoder.write(&chunk) => match written {
                            Ok(()) => chunks += 1,
                            Err(e) => break StopReason::WriteFailed(e),
                        },
                    },
                    None => break StopReason::RecorderEnded,
                },
            }
        };
        debug!(?reason, chunks, "Recording loop ended");

        // Release in reverse order: encoder, then recorder
        let exit = match &reason {
            StopReason::EncoderExited(exit) => *exit,
            _ => self.stop_encoder(&mut encoder).await,
        };
        if let Err(e) = recorder.stop().await {
            warn!(error = %e, "Failed to stop recorder");
        }

        let ended_at = Utc::now();
        self.with_state(|state| {
            if let Some(state) = state.as_mut() {
                state.ended_at = Some(ended_at);
                state.chunks = chunks;
            }
        });
        info!(
            chunks,
            bytes = encoder.bytes_written(),
            exit_code = ?exit.code,
            killed = exit.killed,
            "Recording stopped"
        );

        match reason {
            StopReason::Stopped => Ok(PipelineOutcome::Stopped),
            StopReason::MaxLength => {
                info!("Recording reached its maximum length");
                Ok(PipelineOutcome::Completed)
            }
            StopReason::RecorderEnded => Ok(PipelineOutcome::Completed),
            StopReason::EncoderExited(exit) if exit.success() => Ok(PipelineOutcome::Completed),
            StopReason::EncoderExited(exit) => Err(CaptureError::encoder(
                "run",
                format!("encoder exited with code {:?}", exit.code),
            )),
            StopReason::WriteFailed(e) => Err(CaptureError::encoder("write", e)),
        }
    }

    async fn finalize(&self, task: &Task) -> Result<(), CaptureError> {
        let Some(state) = self.with_state(|state| state.take()) else {
            debug!("No recording to finalize");
            return Ok(());
        };
        let path = state.artifact.file_path.clone();

        let result = match self.finalize_recording(task, &state).await {
            Ok(FinalizeOutcome::Uploaded { key }) => {
                debug!(key = %key, "Removing uploaded recording");
                remove_recording(&path).await.map(|_| ()).map_err(CaptureError::from)
            }
            Ok(FinalizeOutcome::Discarded(reason)) => {
                debug!(reason = %reason, "Removing discarded recording");
                remove_recording(&path).await.map(|_| ()).map_err(CaptureError::from)
            }
            Err(e) => Err(e),
        };

        if let Err(err) = result {
            // Second cleanup attempt before the error propagates
            if let Err(rm) = remove_recording(&path).await {
                warn!(path = %path.display(), error = %rm, "Failed to remove recording");
            }
            return Err(err);
        }

        Ok(())
    }
}
