//! Core orchestration logic.
//!
//! This module contains:
//! - Lifecycle: the run/on_message/shutdown contract shared by every task
//! - Tracker: process-wide execution ceiling
//! - Ssr / Streaming: the task pipelines
//! - Validators: finalize checks for recordings
//! - Factory: pipeline selection at construction time

pub mod diagnostics;
pub mod factory;
pub mod lifecycle;
pub mod ssr;
pub mod streaming;
pub mod tracker;
pub mod validators;

// Re-export commonly used types
pub use diagnostics::DiagnosticLog;
pub use factory::{Gateways, WorkerFactory, DEFAULT_LANGUAGE};
pub use lifecycle::{Acceptor, PipelineOutcome, RunOutcome, TaskPipeline, Worker, WorkerMessage};
pub use ssr::{SsrPipeline, SsrSettings};
pub use streaming::{ExchangeSession, StreamExchange, StreamingPipeline, TranscribeExchange, VoiceExchange};
pub use tracker::{ExecutionLimits, ExecutionTracker, LimitViolation};
pub use validators::{FileExistValidator, MinDurationValidator, ValidationSubject, Validator};
