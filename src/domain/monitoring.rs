//! Monitoring events emitted by the script injected into the tab.
//!
//! Wire format: `{"scope":"MonitoringServiceEvent","command":...,"timestamp":...,"body":...}`.

use serde::{Deserialize, Serialize};

/// Scope tag carried by every bridge message the monitor cares about
pub const MONITORING_SCOPE: &str = "MonitoringServiceEvent";

/// Commands the in-page monitoring service can send
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MonitoringCommand {
    Online,
    Offline,
    Alive,
    ErrorEvent,
    MediaConnectionChange,
    SocketConnectionChange,
    AppRefresh,
    AppInitialized,
    AppReady,
    AppExitError,
    AppExitLogout,
}

impl MonitoringCommand {
    /// Wire name of the command
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Online => "ONLINE",
            Self::Offline => "OFFLINE",
            Self::Alive => "ALIVE",
            Self::ErrorEvent => "ERROR_EVENT",
            Self::MediaConnectionChange => "MEDIA_CONNECTION_CHANGE",
            Self::SocketConnectionChange => "SOCKET_CONNECTION_CHANGE",
            Self::AppRefresh => "APP_REFRESH",
            Self::AppInitialized => "APP_INITIALIZED",
            Self::AppReady => "APP_READY",
            Self::AppExitError => "APP_EXIT_ERROR",
            Self::AppExitLogout => "APP_EXIT_LOGOUT",
        }
    }
}

impl std::fmt::Display for MonitoringCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single event delivered across the message bridge
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitoringEvent {
    pub command: MonitoringCommand,

    /// Page-side timestamp (ms since epoch)
    #[serde(default)]
    pub timestamp: i64,

    #[serde(default)]
    pub body: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct BridgeEnvelope {
    scope: String,
    #[serde(flatten)]
    event: serde_json::Value,
}

impl MonitoringEvent {
    pub fn new(command: MonitoringCommand, body: serde_json::Value) -> Self {
        Self {
            command,
            timestamp: chrono::Utc::now().timestamp_millis(),
            body,
        }
    }

    /// Parse a raw bridge message.
    ///
    /// Returns `None` for messages of another scope or with an unknown command.
    pub fn from_bridge(raw: &str) -> Option<Self> {
        let envelope: BridgeEnvelope = serde_json::from_str(raw).ok()?;
        if envelope.scope != MONITORING_SCOPE {
            return None;
        }
        serde_json::from_value(envelope.event).ok()
    }

    /// Render as a bridge message (used by fakes and diagnostics)
    pub fn to_bridge(&self) -> String {
        serde_json::json!({
            "scope": MONITORING_SCOPE,
            "command": self.command,
            "timestamp": self.timestamp,
            "body": self.body,
        })
        .to_string()
    }

    /// Body as a plain string, if it is one
    pub fn body_str(&self) -> Option<&str> {
        self.body.as_str()
    }
}
