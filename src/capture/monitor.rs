//! Tab health supervision over the message bridge.
//!
//! A tab is usable once it has sent APP_INITIALIZED and APP_READY (each within
//! its own budget, measured from binding) and then reported ONLINE, an
//! accepted socket and an online media connection within the connection
//! budget. After that every ALIVE resets a rolling heartbeat deadline.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, warn};

use crate::config::MonitorConfig;
use crate::core::DiagnosticLog;
use crate::domain::{MonitoringCommand, MonitoringEvent};
use crate::error::{CaptureError, MonitorPhase};

const SOCKET_ACCEPTED: &str = "accept";
const MEDIA_ONLINE: &str = "online";

/// Handshake and heartbeat budgets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonitorBudgets {
    pub initialized: Duration,
    pub app_ready: Duration,
    pub connection: Duration,
    pub alive: Duration,
}

impl From<&MonitorConfig> for MonitorBudgets {
    fn from(config: &MonitorConfig) -> Self {
        Self {
            initialized: config.initialized_event_timeout(),
            app_ready: config.app_ready_event_timeout(),
            connection: config.connection_state_timeout(),
            alive: config.alive_event_timeout(),
        }
    }
}

/// Where a bound tab is in the protocol.
///
/// Only the handshake states live here. The other lifecycle states map as follows:
///
/// - refreshing: `run` returns `CaptureError::AppRefresh` and the generator binds a
///   fresh monitor after the refresh delay
/// - failed: any other error returned by `run`
/// - stopped: the `run` future is dropped on cancel or teardown
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorState {
    AwaitingInitialization,
    AwaitingReady,
    AwaitingConnection,
    Alive,
}

/// Result of feeding one event to the monitor
#[derive(Debug, Clone)]
pub enum Transition {
    Continue,

    /// The connection handshake just completed
    Connected,

    Failed(CaptureError),
}

/// Protocol state for one binding of the bridge
pub struct TabMonitor {
    budgets: MonitorBudgets,
    diagnostics: Arc<DiagnosticLog>,

    initialized: bool,
    ready: bool,

    // Latest values, latched from binding on
    online: bool,
    socket_state: Option<String>,
    media_state: Option<String>,

    initialized_deadline: Instant,
    ready_deadline: Instant,
    connection_deadline: Option<Instant>,
    alive_deadline: Option<Instant>,
}

impl TabMonitor {
    /// Bind at `now`; the initialization and readiness clocks start here
    pub fn new(budgets: MonitorBudgets, diagnostics: Arc<DiagnosticLog>, now: Instant) -> Self {
        Self {
            budgets,
            diagnostics,
            initialized: false,
            ready: false,
            online: false,
            socket_state: None,
            media_state: None,
            initialized_deadline: now + budgets.initialized,
            ready_deadline: now + budgets.app_ready,
            connection_deadline: None,
            alive_deadline: None,
        }
    }

    pub fn state(&self) -> MonitorState {
        if self.alive_deadline.is_some() {
            MonitorState::Alive
        } else if !self.initialized {
            MonitorState::AwaitingInitialization
        } else if !self.ready {
            MonitorState::AwaitingReady
        } else {
            MonitorState::AwaitingConnection
        }
    }

    /// Earliest pending deadline and the phase it guards
    pub fn next_deadline(&self) -> (Instant, MonitorPhase) {
        if let Some(alive) = self.alive_deadline {
            return (alive, MonitorPhase::Alive);
        }
        if let Some(connection) = self.connection_deadline {
            return (connection, MonitorPhase::Connection);
        }

        match (self.initialized, self.ready) {
            (false, false) if self.ready_deadline < self.initialized_deadline => {
                (self.ready_deadline, MonitorPhase::AppReady)
            }
            (false, _) => (self.initialized_deadline, MonitorPhase::AppInitialized),
            (true, _) => (self.ready_deadline, MonitorPhase::AppReady),
        }
    }

    /// Error raised when the deadline guarding `phase` passes
    pub fn timeout_error(&self, phase: MonitorPhase) -> CaptureError {
        let (budget, detail) = match phase {
            MonitorPhase::AppInitialized => (self.budgets.initialized, "APP_INITIALIZED not received".to_string()),
            MonitorPhase::AppReady => (self.budgets.app_ready, "APP_READY not received".to_string()),
            MonitorPhase::Connection => (self.budgets.connection, self.connection_detail()),
            MonitorPhase::Alive => (self.budgets.alive, "no heartbeat".to_string()),
            other => (Duration::ZERO, format!("unexpected timeout in {}", other)),
        };
        CaptureError::tab(phase, format!("{} within {}ms", detail, budget.as_millis()))
    }

    fn connection_detail(&self) -> String {
        format!(
            "connection incomplete (online: {}, socket: {}, media: {})",
            self.online,
            self.socket_state.as_deref().unwrap_or("-"),
            self.media_state.as_deref().unwrap_or("-"),
        )
    }

    fn connection_complete(&self) -> bool {
        self.online
            && self.socket_state.as_deref() == Some(SOCKET_ACCEPTED)
            && self.media_state.as_deref() == Some(MEDIA_ONLINE)
    }

    /// Feed one bridge event observed at `now`
    pub fn observe(&mut self, event: &MonitoringEvent, now: Instant) -> Transition {
        self.diagnostics
            .record(format!("{} {}", event.command, event.body));

        match event.command {
            MonitoringCommand::AppExitError | MonitoringCommand::AppExitLogout => {
                return Transition::Failed(CaptureError::tab(
                    MonitorPhase::AppExit,
                    format!("{} ({})", event.command, event.body),
                ));
            }
            MonitoringCommand::AppRefresh => return Transition::Failed(CaptureError::AppRefresh),
            MonitoringCommand::ErrorEvent => {
                warn!(body = %event.body, "Tab reported an error event");
                return Transition::Continue;
            }
            MonitoringCommand::Offline => {
                warn!("Tab reported OFFLINE");
                self.online = false;
                return Transition::Continue;
            }
            MonitoringCommand::AppInitialized => self.initialized = true,
            MonitoringCommand::AppReady => self.ready = true,
            MonitoringCommand::Online => self.online = true,
            MonitoringCommand::SocketConnectionChange => {
                self.socket_state = event.body_str().map(str::to_string);
            }
            MonitoringCommand::MediaConnectionChange => {
                self.media_state = event.body_str().map(str::to_string);
            }
            MonitoringCommand::Alive => {
                if self.alive_deadline.is_some() {
                    self.alive_deadline = Some(now + self.budgets.alive);
                } else {
                    debug!("ALIVE before connection; ignored");
                }
                return Transition::Continue;
            }
        }

        if self.alive_deadline.is_some() {
            return Transition::Continue;
        }

        if self.initialized && self.ready && self.connection_deadline.is_none() {
            self.connection_deadline = Some(now + self.budgets.connection);
        }

        if self.connection_deadline.is_some() && self.connection_complete() {
            self.connection_deadline = None;
            self.alive_deadline = Some(now + self.budgets.alive);
            return Transition::Connected;
        }

        Transition::Continue
    }

    /// Drive the monitor over a bridge feed until it fails.
    ///
    /// `on_connected` is called each time the handshake completes. This only
    /// ever returns an error; stopping is done by dropping the future.
    pub async fn run(
        &mut self,
        bridge: &mut mpsc::Receiver<String>,
        mut on_connected: impl FnMut(),
    ) -> CaptureError {
        loop {
            let (deadline, phase) = self.next_deadline();

            tokio::select! {
                raw = bridge.recv() => {
                    let Some(raw) = raw else {
                        return CaptureError::tab(MonitorPhase::Bridge, "message bridge closed");
                    };
                    let Some(event) = MonitoringEvent::from_bridge(&raw) else {
                        debug!(len = raw.len(), "Ignoring non-monitoring bridge message");
                        continue;
                    };

                    match self.observe(&event, Instant::now()) {
                        Transition::Continue => {}
                        Transition::Connected => {
                            info!("Tab handshake complete");
                            on_connected();
                        }
                        Transition::Failed(err) => {
                            self.diagnostics.record(format!("monitor failed: {}", err));
                            return err;
                        }
                    }
                }
                _ = sleep_until(deadline) => {
                    let err = self.timeout_error(phase);
                    self.diagnostics.record(format!("monitor timed out: {}", err));
                    return err;
                }
            }
        }
    }
}
