//! Domain types for the capture worker.
//!
//! This module contains the core data structures:
//! - Task: Work delivered by the queue client
//! - Status: Monotonic worker status
//! - Monitoring: Bridge events from the captured tab
//! - Artifact: Local recordings and their metadata
//! - Events: Records published to the event log

pub mod artifact;
pub mod events;
pub mod monitoring;
pub mod status;
pub mod task;

// Re-export commonly used types
pub use artifact::{RecordingArtifact, RecordingMetadata};
pub use events::{DomainEvent, EventType};
pub use monitoring::{MonitoringCommand, MonitoringEvent, MONITORING_SCOPE};
pub use status::{StatusCell, WorkerStatus};
pub use task::{Task, TaskKind, TaskPayload};
