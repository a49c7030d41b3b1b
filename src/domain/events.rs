//! Domain events published to the event log.
//!
//! Events are immutable records; the log is append-only.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::task::TaskPayload;

/// A single event in the append-only event log.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DomainEvent {
    /// Unique identifier for this event
    pub id: Uuid,

    /// When this event occurred (ISO 8601)
    pub timestamp: DateTime<Utc>,

    /// Type of event
    pub event_type: EventType,

    pub company_id: String,
    pub session_id: String,
    pub session_run_id: String,
    pub attendee_id: String,
    pub room_id: String,

    /// Accumulated duration (stop events only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_seconds: Option<f64>,
}

impl DomainEvent {
    /// Create a new event for a task with the current timestamp
    pub fn new(event_type: EventType, payload: &TaskPayload) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            event_type,
            company_id: payload.company_id.clone(),
            session_id: payload.session_id.clone(),
            session_run_id: payload.session_run_id.clone(),
            attendee_id: payload.attendee_id.clone(),
            room_id: payload.room_id.clone(),
            duration_seconds: None,
        }
    }

    /// Attach the accumulated duration
    pub fn with_duration(mut self, duration_seconds: f64) -> Self {
        self.duration_seconds = Some(duration_seconds);
        self
    }
}

/// Types of events the worker publishes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    /// Speech-to-text stream connected
    TranscriptionStarted,

    /// Speech-to-text stream closed
    TranscriptionStopped,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload() -> TaskPayload {
        TaskPayload {
            company_id: "c1".to_string(),
            session_id: "s1".to_string(),
            session_run_id: "r1".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_event_serialization() {
        let event = DomainEvent::new(EventType::TranscriptionStarted, &payload());

        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"eventType\":\"transcription_started\""));
        assert!(!json.contains("durationSeconds"));

        let parsed: DomainEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.event_type, EventType::TranscriptionStarted);
        assert_eq!(parsed.session_run_id, "r1");
    }

    #[test]
    fn test_event_with_duration() {
        let event = DomainEvent::new(EventType::TranscriptionStopped, &payload()).with_duration(42.5);
        assert_eq!(event.duration_seconds, Some(42.5));
    }
}
