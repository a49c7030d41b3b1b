//! Tasks delivered by the queue client.
//!
//! A task is owned by exactly one worker for its whole lifetime.

use serde::{Deserialize, Serialize};

/// Which terminal pipeline consumes the capture stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    /// Record to a local file, then upload and notify
    Ssr,

    /// Forward audio to a speech-to-text provider
    Transcribe,

    /// Exchange audio with a telephony provider
    Voice,
}

impl TaskKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ssr => "ssr",
            Self::Transcribe => "transcribe",
            Self::Voice => "voice",
        }
    }
}

impl std::fmt::Display for TaskKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A unit of work accepted from the queue
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    /// Queue-assigned identifier
    pub id: String,

    /// Pipeline selector
    pub kind: TaskKind,

    /// Task-specific payload
    pub payload: TaskPayload,
}

impl Task {
    pub fn new(id: impl Into<String>, kind: TaskKind, payload: TaskPayload) -> Self {
        Self {
            id: id.into(),
            kind,
            payload,
        }
    }
}

/// Payload shared by every task type, plus the few kind-specific options
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskPayload {
    /// Web application to render in the tab
    pub url: String,
    pub company_id: String,
    pub session_id: String,
    pub session_run_id: String,
    pub attendee_id: String,
    pub room_id: String,
    pub meeting_name: String,

    /// Recognition language (transcribe only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,

    /// Per-task override of the recording ceiling (ssr only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_length_minutes: Option<u64>,

    /// Dial-out target (voice only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<String>,
}

impl TaskPayload {
    /// Compact JSON rendering used in failure logs
    pub fn to_log_string(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| format!("{:?}", self))
    }
}
