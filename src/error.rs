//! Error taxonomy for capture, monitoring and finalize.

use std::path::PathBuf;

use thiserror::Error;

/// Handshake or heartbeat phase a tab failed in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MonitorPhase {
    AppInitialized,
    AppReady,
    Connection,
    Alive,
    AppExit,
    Bridge,
}

impl MonitorPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AppInitialized => "APP_INITIALIZED",
            Self::AppReady => "APP_READY",
            Self::Connection => "CONNECTION",
            Self::Alive => "ALIVE",
            Self::AppExit => "APP_EXIT",
            Self::Bridge => "BRIDGE",
        }
    }
}

impl std::fmt::Display for MonitorPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors raised while acquiring or consuming the capture stream
#[derive(Debug, Clone, Error)]
pub enum CaptureError {
    #[error("Tab communication failed in phase {phase}: {message}")]
    TabCommunication { phase: MonitorPhase, message: String },

    /// The app asked to be reloaded; the monitor binding is retried
    #[error("App requested a refresh")]
    AppRefresh,

    #[error("Document was not delivered within {timeout_ms}ms (last title: {last_title:?})")]
    ContentDelivery {
        timeout_ms: u64,
        last_title: Option<String>,
    },

    #[error("Tab {tab_id} was discarded by the host")]
    TabDiscarded { tab_id: i64 },

    #[error("Captured stream is invalid: {0}")]
    CaptureInvalid(String),

    #[error("Browser host error: {0}")]
    Host(String),

    #[error("Encoder error during {stage}: {message}")]
    Encoder { stage: &'static str, message: String },

    #[error("Probe error: {0}")]
    Probe(String),

    #[error("Provider {provider} failed: {message}")]
    Provider {
        provider: &'static str,
        message: String,
    },

    #[error("Gateway error: {0}")]
    Gateway(#[from] GatewayError),

    #[error("Cancelled by stop signal")]
    Cancelled,
}

impl CaptureError {
    pub fn tab(phase: MonitorPhase, message: impl Into<String>) -> Self {
        Self::TabCommunication {
            phase,
            message: message.into(),
        }
    }

    pub fn encoder(stage: &'static str, message: impl std::fmt::Display) -> Self {
        Self::Encoder {
            stage,
            message: message.to_string(),
        }
    }

    pub fn provider(provider: &'static str, message: impl std::fmt::Display) -> Self {
        Self::Provider {
            provider,
            message: message.to_string(),
        }
    }

    /// Phase tag for tab communication errors
    pub fn phase(&self) -> Option<MonitorPhase> {
        match self {
            Self::TabCommunication { phase, .. } => Some(*phase),
            _ => None,
        }
    }

    pub fn is_refresh(&self) -> bool {
        matches!(self, Self::AppRefresh)
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

/// Errors from the opaque gateways (storage, control plane, event log, providers)
#[derive(Debug, Clone, Error)]
pub enum GatewayError {
    #[error("Connection reset: {0}")]
    ConnectionReset(String),

    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("IO error: {0}")]
    Io(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Gateway unavailable: {0}")]
    Unavailable(String),
}

impl GatewayError {
    /// Whether the failure is a reset connection (retried on notify)
    pub fn is_connection_reset(&self) -> bool {
        matches!(self, Self::ConnectionReset(_))
    }
}

impl From<std::io::Error> for GatewayError {
    fn from(err: std::io::Error) -> Self {
        if err.kind() == std::io::ErrorKind::ConnectionReset {
            Self::ConnectionReset(err.to_string())
        } else {
            Self::Io(err.to_string())
        }
    }
}

impl From<serde_json::Error> for GatewayError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<reqwest::Error> for GatewayError {
    fn from(err: reqwest::Error) -> Self {
        // Walk the source chain looking for an ECONNRESET
        let mut source = std::error::Error::source(&err);
        while let Some(inner) = source {
            if let Some(io) = inner.downcast_ref::<std::io::Error>() {
                if io.kind() == std::io::ErrorKind::ConnectionReset {
                    return Self::ConnectionReset(err.to_string());
                }
            }
            source = inner.source();
        }

        match err.status() {
            Some(status) => Self::Http {
                status: status.as_u16(),
                body: err.to_string(),
            },
            None => Self::Unavailable(err.to_string()),
        }
    }
}

/// Finalize validation failures.
///
/// Both variants are false positives: expected when a stop arrives before any
/// content was recorded, and never surfaced as task failures.
#[derive(Debug, Clone, Error)]
pub enum ValidationError {
    #[error("Recording file does not exist: {0}")]
    FileMissing(PathBuf),

    #[error("Recording too short: {actual_seconds:.2}s < {min_seconds}s")]
    TooShort { actual_seconds: f64, min_seconds: f64 },
}

impl ValidationError {
    /// Validator that raised this error
    pub fn validator(&self) -> &'static str {
        match self {
            Self::FileMissing(_) => "FileExistValidator",
            Self::TooShort { .. } => "MinDurationValidator",
        }
    }
}
