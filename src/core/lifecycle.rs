//! Worker lifecycle shared by every pipeline.
//!
//! `run` races the stop signal against readiness, acquires the capture and
//! hands it to the task pipeline; `on_message` fires the stop signal;
//! `shutdown` waits for the run to release its resources and finalizes.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use super::diagnostics::DiagnosticLog;
use super::tracker::ExecutionTracker;
use crate::capture::{CaptureSession, MediaStreamGenerator};
use crate::domain::{StatusCell, Task, TaskKind, TaskPayload, WorkerStatus};
use crate::error::CaptureError;
use crate::host::CaptureConstraints;

/// How a pipeline run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineOutcome {
    /// The stop signal ended the run
    Stopped,

    /// The pipeline ran to its natural end
    Completed,
}

/// Terminal outcome of `Worker::run`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// Stop arrived before the task was ready; nothing was acquired
    StoppedBeforeReady,
    Stopped,
    Completed,
}

/// Commands the queue client can deliver to a running worker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "lowercase")]
pub enum WorkerMessage {
    Stop,
}

/// One-shot commit callback.
///
/// The first `accept` marks the task as in progress; later calls do nothing.
pub struct Acceptor {
    callback: Mutex<Option<Box<dyn FnOnce(&TaskPayload) + Send>>>,
    accepted: AtomicBool,
}

impl Acceptor {
    pub fn new(callback: impl FnOnce(&TaskPayload) + Send + 'static) -> Self {
        Self {
            callback: Mutex::new(Some(Box::new(callback))),
            accepted: AtomicBool::new(false),
        }
    }

    pub fn noop() -> Self {
        Self::new(|_| {})
    }

    /// Fire the callback; returns true only for the first call
    pub fn accept(&self, payload: &TaskPayload) -> bool {
        let callback = self
            .callback
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();

        match callback {
            Some(callback) => {
                self.accepted.store(true, Ordering::SeqCst);
                callback(payload);
                true
            }
            None => false,
        }
    }

    pub fn is_accepted(&self) -> bool {
        self.accepted.load(Ordering::SeqCst)
    }
}

/// Task-specific consumer of the capture stream
#[async_trait]
pub trait TaskPipeline: Send + Sync {
    fn kind(&self) -> TaskKind;

    /// Consume the capture until `stop` fires or the pipeline ends.
    ///
    /// Calls `accept` once the pipeline is producing. Every resource acquired
    /// here is released before returning.
    async fn run(
        &self,
        task: &Task,
        capture: &CaptureSession,
        accept: &Acceptor,
        stop: CancellationToken,
    ) -> Result<PipelineOutcome, CaptureError>;

    /// Post-run work, awaited by `Worker::shutdown`. Not interruptible.
    async fn finalize(&self, _task: &Task) -> Result<(), CaptureError> {
        Ok(())
    }
}

/// Marks the run as released when dropped
struct ReleaseGuard<'a>(&'a watch::Sender<bool>);

impl Drop for ReleaseGuard<'_> {
    fn drop(&mut self) {
        self.0.send_replace(true);
    }
}

/// One worker per task
pub struct Worker {
    id: Uuid,
    task: Task,
    status: StatusCell,

    stop: CancellationToken,
    stop_fired: AtomicBool,
    entered: AtomicBool,
    released: watch::Sender<bool>,
    finalized: tokio::sync::Mutex<bool>,

    pipeline: Box<dyn TaskPipeline>,
    generator: MediaStreamGenerator,
    constraints: CaptureConstraints,
    tracker: Arc<ExecutionTracker>,
    diagnostics: Arc<DiagnosticLog>,
}

impl Worker {
    pub fn new(
        task: Task,
        pipeline: Box<dyn TaskPipeline>,
        generator: MediaStreamGenerator,
        constraints: CaptureConstraints,
        tracker: Arc<ExecutionTracker>,
        diagnostics: Arc<DiagnosticLog>,
    ) -> Self {
        let (released, _) = watch::channel(false);
        Self {
            id: Uuid::new_v4(),
            task,
            status: StatusCell::new(),
            stop: CancellationToken::new(),
            stop_fired: AtomicBool::new(false),
            entered: AtomicBool::new(false),
            released,
            finalized: tokio::sync::Mutex::new(false),
            pipeline,
            generator,
            constraints,
            tracker,
            diagnostics,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn task(&self) -> &Task {
        &self.task
    }

    pub fn status(&self) -> WorkerStatus {
        self.status.get()
    }

    pub fn diagnostics(&self) -> &Arc<DiagnosticLog> {
        &self.diagnostics
    }

    /// Run the task until stop, completion or failure.
    ///
    /// `ready` is raced against the stop signal; if stop wins, nothing is
    /// acquired and `accept` is never called.
    #[instrument(skip_all, fields(task_id = %self.task.id, kind = %self.task.kind, worker_id = %self.id))]
    pub async fn run<F>(&self, accept: Acceptor, ready: F) -> Result<RunOutcome>
    where
        F: Future<Output = Result<()>> + Send,
    {
        if self.entered.swap(true, Ordering::SeqCst) {
            anyhow::bail!("Worker {} is already running", self.id);
        }
        let _release = ReleaseGuard(&self.released);
        self.status.advance(WorkerStatus::Running);

        let ready = tokio::select! {
            biased;
            _ = self.stop.cancelled() => None,
            ready = ready => Some(ready),
        };

        match ready {
            None => {
                info!("Stopped before ready; no resources acquired");
                return Ok(RunOutcome::StoppedBeforeReady);
            }
            Some(Err(e)) => return Err(self.broken_chain(e.context("Readiness check failed"))),
            Some(Ok(())) => {}
        }

        match self.execute(&accept).await {
            Ok(outcome) => {
                info!(?outcome, accepted = accept.is_accepted(), "Worker run finished");
                Ok(outcome)
            }
            Err(e) => {
                self.tracker.record_failure();
                Err(self.broken_chain(e))
            }
        }
    }

    async fn execute(&self, accept: &Acceptor) -> Result<RunOutcome> {
        let executions = self.tracker.record_start()?;
        debug!(executions, "Task execution recorded");

        let mut capture = match self
            .generator
            .generate(&self.task.payload.url, &self.constraints, &self.stop)
            .await
        {
            Ok(capture) => capture,
            Err(e) if e.is_cancelled() => return Ok(RunOutcome::Stopped),
            Err(e) => return Err(anyhow::Error::new(e).context("Capture stream acquisition failed")),
        };

        let pipeline_stop = self.stop.child_token();
        let result = {
            let pipeline = self
                .pipeline
                .run(&self.task, &capture, accept, pipeline_stop.clone());
            tokio::pin!(pipeline);

            tokio::select! {
                result = &mut pipeline => result,
                err = capture.failed() => {
                    warn!(error = %err, "Capture failed; stopping pipeline");
                    pipeline_stop.cancel();
                    if let Err(inner) = pipeline.await {
                        debug!(error = %inner, "Pipeline ended after capture failure");
                    }
                    Err(err)
                }
            }
        };

        capture.teardown().await;

        match result {
            Ok(PipelineOutcome::Completed) => Ok(RunOutcome::Completed),
            Ok(PipelineOutcome::Stopped) => Ok(RunOutcome::Stopped),
            Err(e) if e.is_cancelled() => Ok(RunOutcome::Stopped),
            Err(e) => Err(anyhow::Error::new(e).context(format!("{} pipeline failed", self.pipeline.kind()))),
        }
    }

    /// Handle a queue command
    pub async fn on_message(&self, message: WorkerMessage) {
        match message {
            WorkerMessage::Stop => {
                self.fire_stop();
            }
        }
    }

    /// Fire the stop signal; returns false if it already fired
    pub fn fire_stop(&self) -> bool {
        if self
            .stop_fired
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!(task_id = %self.task.id, "Stop already fired");
            return false;
        }

        info!(task_id = %self.task.id, "Stop signal fired");
        self.status.advance(WorkerStatus::Stopping);
        self.stop.cancel();
        true
    }

    /// Stop, wait for teardown and finalize.
    ///
    /// Finalize runs exactly once; later calls return immediately.
    #[instrument(skip_all, fields(task_id = %self.task.id, worker_id = %self.id))]
    pub async fn shutdown(&self) -> Result<()> {
        self.fire_stop();

        if self.entered.load(Ordering::SeqCst) {
            let mut released = self.released.subscribe();
            while !*released.borrow_and_update() {
                if released.changed().await.is_err() {
                    break;
                }
            }
        }

        let mut finalized = self.finalized.lock().await;
        if *finalized {
            return Ok(());
        }
        *finalized = true;

        let result = self.pipeline.finalize(&self.task).await;
        self.status.advance(WorkerStatus::Done);

        match result {
            Ok(()) => {
                info!("Worker finalized");
                Ok(())
            }
            Err(e) => {
                error!(
                    error = %e,
                    payload = %self.task.payload.to_log_string(),
                    "Finalize failed"
                );
                Err(anyhow::Error::new(e).context(format!("Finalize failed for task {}", self.task.id)))
            }
        }
    }

    fn broken_chain(&self, err: anyhow::Error) -> anyhow::Error {
        error!(
            task_id = %self.task.id,
            error = %format!("{:#}", err),
            payload = %self.task.payload.to_log_string(),
            diagnostics = %self.diagnostics.dump(),
            "Worker chain is broken"
        );
        err.context("Worker chain is broken")
    }
}
