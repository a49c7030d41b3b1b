//! Capture stream acquisition.
//!
//! Opens a tab, waits for the real application document, supervises the tab
//! through the monitor (rebinding on APP_REFRESH) and captures its output once
//! the handshake completes. The returned [`CaptureSession`] owns everything and
//! releases it in reverse order.

use std::sync::Arc;
use std::time::Duration;

use glob::Pattern;
use tokio::sync::{broadcast, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::monitor::{MonitorBudgets, TabMonitor};
use super::tab_session::TabSession;
use crate::config::{CaptureConfig, MonitorConfig};
use crate::core::DiagnosticLog;
use crate::error::CaptureError;
use crate::host::{BrowserHost, CaptureConstraints, CaptureStream, TabId, TabUpdate};

/// Decides whether a tab title belongs to the real application
#[derive(Debug, Clone, Default)]
pub struct DeliveryCheck {
    placeholders: Vec<Pattern>,
    expected_title: Option<String>,
}

impl DeliveryCheck {
    pub fn new(placeholders: &[String], expected_title: Option<String>) -> Self {
        let placeholders = placeholders
            .iter()
            .filter_map(|p| match Pattern::new(p) {
                Ok(pattern) => Some(pattern),
                Err(e) => {
                    warn!(pattern = %p, error = %e, "Ignoring invalid placeholder pattern");
                    None
                }
            })
            .collect();

        Self {
            placeholders,
            expected_title,
        }
    }

    pub fn from_config(config: &CaptureConfig) -> Self {
        Self::new(&config.placeholder_titles, config.expected_title.clone())
    }

    pub fn is_delivered(&self, title: &str) -> bool {
        let title = title.trim();
        if title.is_empty() {
            return false;
        }
        if self.placeholders.iter().any(|p| p.matches(title)) {
            return false;
        }
        match &self.expected_title {
            Some(expected) => title.contains(expected.as_str()),
            None => true,
        }
    }
}

/// Composes tab, monitor and capture into one stream
pub struct MediaStreamGenerator {
    host: Arc<dyn BrowserHost>,
    budgets: MonitorBudgets,
    refresh_delay: Duration,
    delivery_timeout: Duration,
    delivery: DeliveryCheck,
    diagnostics: Arc<DiagnosticLog>,
}

impl MediaStreamGenerator {
    pub fn new(
        host: Arc<dyn BrowserHost>,
        monitor: &MonitorConfig,
        capture: &CaptureConfig,
        diagnostics: Arc<DiagnosticLog>,
    ) -> Self {
        Self {
            host,
            budgets: MonitorBudgets::from(monitor),
            refresh_delay: monitor.app_refresh_delay(),
            delivery_timeout: capture.document_delivery_timeout(),
            delivery: DeliveryCheck::from_config(capture),
            diagnostics,
        }
    }

    /// Acquire a capture stream for `url`.
    ///
    /// Everything acquired so far is released before an error is returned.
    pub async fn generate(
        &self,
        url: &str,
        constraints: &CaptureConstraints,
        cancel: &CancellationToken,
    ) -> Result<CaptureSession, CaptureError> {
        // Subscribe first so no update for the new tab is missed
        let mut updates = self.host.subscribe_tab_updates();

        let mut tab = TabSession::open(self.host.clone(), url, cancel).await?;
        let tab_id = tab.tab_id();
        info!(tab_id, "Waiting for document delivery");

        let mut last_title = None;
        let delivered = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(CaptureError::Cancelled),
            waited = timeout(
                self.delivery_timeout,
                await_delivery(&mut updates, tab_id, &self.delivery, &mut last_title),
            ) => match waited {
                Ok(result) => result,
                Err(_) => Err(CaptureError::ContentDelivery {
                    timeout_ms: self.delivery_timeout.as_millis() as u64,
                    last_title: last_title.clone(),
                }),
            },
        };

        if let Err(e) = delivered {
            tab.close().await;
            return Err(e);
        }
        self.diagnostics.record(format!("tab {} delivered", tab_id));

        let supervisor_token = cancel.child_token();
        let (connected_tx, connected_rx) = oneshot::channel();
        let (failure_tx, failure_rx) = watch::channel(None);

        let supervisor = tokio::spawn(supervise(Supervision {
            host: self.host.clone(),
            tab_id,
            updates,
            budgets: self.budgets,
            refresh_delay: self.refresh_delay,
            diagnostics: self.diagnostics.clone(),
            token: supervisor_token.clone(),
            connected: connected_tx,
            failure: failure_tx,
        }));

        let mut session = CaptureSession {
            tab: Some(tab),
            tab_id,
            stream: None,
            supervisor_token,
            supervisor: Some(supervisor),
            failure: failure_rx,
        };

        let connected = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(CaptureError::Cancelled),
            signal = connected_rx => match signal {
                Ok(()) => Ok(()),
                Err(_) => Err(session.failure_or(CaptureError::Host(
                    "tab supervisor ended before connecting".to_string(),
                ))),
            },
        };

        if let Err(e) = connected {
            session.teardown().await;
            return Err(e);
        }

        match self.host.capture_tab(tab_id, constraints).await {
            Ok(stream) => {
                let active = stream.is_active();
                let stream_id = stream.id().to_string();
                session.stream = Some(stream);

                if !active {
                    session.teardown().await;
                    return Err(CaptureError::CaptureInvalid(format!(
                        "stream {} has no live track",
                        stream_id
                    )));
                }
                info!(tab_id, stream_id = %stream_id, "Tab captured");
                Ok(session)
            }
            Err(e) => {
                session.teardown().await;
                Err(e)
            }
        }
    }
}

/// Wait for the first update showing the real application title
async fn await_delivery(
    updates: &mut broadcast::Receiver<TabUpdate>,
    tab_id: TabId,
    check: &DeliveryCheck,
    last_title: &mut Option<String>,
) -> Result<(), CaptureError> {
    loop {
        let update = match updates.recv().await {
            Ok(update) => update,
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(tab_id, skipped, "Tab update feed lagged");
                continue;
            }
            Err(broadcast::error::RecvError::Closed) => {
                return Err(CaptureError::Host("tab update feed closed".to_string()));
            }
        };

        if update.tab_id != tab_id {
            continue;
        }
        if update.discarded == Some(true) {
            return Err(CaptureError::TabDiscarded { tab_id });
        }
        if let Some(title) = update.title {
            if check.is_delivered(&title) {
                debug!(tab_id, title = %title, "Document delivered");
                return Ok(());
            }
            debug!(tab_id, title = %title, "Placeholder document");
            *last_title = Some(title);
        }
    }
}

/// Resolve once the host discards `tab_id`
async fn await_discard(updates: &mut broadcast::Receiver<TabUpdate>, tab_id: TabId) -> CaptureError {
    loop {
        match updates.recv().await {
            Ok(update) if update.tab_id == tab_id && update.discarded == Some(true) => {
                return CaptureError::TabDiscarded { tab_id };
            }
            Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {}
            Err(broadcast::error::RecvError::Closed) => {
                // No more updates can arrive; nothing left to watch
                std::future::pending::<()>().await;
            }
        }
    }
}

struct Supervision {
    host: Arc<dyn BrowserHost>,
    tab_id: TabId,
    updates: broadcast::Receiver<TabUpdate>,
    budgets: MonitorBudgets,
    refresh_delay: Duration,
    diagnostics: Arc<DiagnosticLog>,
    token: CancellationToken,
    connected: oneshot::Sender<()>,
    failure: watch::Sender<Option<CaptureError>>,
}

/// Monitor the tab until cancelled or a fatal failure.
///
/// APP_REFRESH rebinds the bridge after a fixed delay, indefinitely.
async fn supervise(mut s: Supervision) {
    let tab_id = s.tab_id;
    let mut connected = Some(s.connected);
    let mut refreshes = 0u32;

    let outcome = loop {
        let mut bridge = match s.host.inject_bridge(tab_id).await {
            Ok(bridge) => bridge,
            Err(e) => break Some(e),
        };
        let mut monitor = TabMonitor::new(s.budgets, s.diagnostics.clone(), Instant::now());

        let err = tokio::select! {
            biased;
            _ = s.token.cancelled() => break None,
            err = await_discard(&mut s.updates, tab_id) => err,
            err = monitor.run(&mut bridge, || {
                if let Some(tx) = connected.take() {
                    let _ = tx.send(());
                }
            }) => err,
        };

        if !err.is_refresh() {
            break Some(err);
        }

        refreshes += 1;
        info!(tab_id, refreshes, "App requested refresh; rebinding monitor");
        s.diagnostics
            .record(format!("APP_REFRESH, rebinding (attempt {})", refreshes));

        tokio::select! {
            biased;
            _ = s.token.cancelled() => break None,
            err = await_discard(&mut s.updates, tab_id) => break Some(err),
            _ = sleep(s.refresh_delay) => {}
        }
    };

    if let Some(err) = outcome {
        warn!(tab_id, error = %err, "Tab supervision failed");
        let _ = s.failure.send(Some(err));
    }
    drop(connected);
}

/// A live capture: tab, stream and the supervisor watching the tab
pub struct CaptureSession {
    tab: Option<TabSession>,
    tab_id: TabId,
    stream: Option<CaptureStream>,
    supervisor_token: CancellationToken,
    supervisor: Option<JoinHandle<()>>,
    failure: watch::Receiver<Option<CaptureError>>,
}

impl std::fmt::Debug for CaptureSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaptureSession")
            .field("tab_id", &self.tab_id)
            .field("stream", &self.stream.as_ref().map(|s| s.id()))
            .field("released", &self.tab.is_none())
            .finish()
    }
}

impl CaptureSession {
    pub fn tab_id(&self) -> TabId {
        self.tab_id
    }

    /// The captured stream; `None` once torn down
    pub fn stream(&self) -> Option<&CaptureStream> {
        self.stream.as_ref()
    }

    /// Captured stream, or an error if it was already released
    pub fn require_stream(&self) -> Result<&CaptureStream, CaptureError> {
        self.stream
            .as_ref()
            .ok_or_else(|| CaptureError::CaptureInvalid("stream already released".to_string()))
    }

    fn failure_or(&self, fallback: CaptureError) -> CaptureError {
        self.failure.borrow().clone().unwrap_or(fallback)
    }

    /// Resolves with the first fatal supervision failure
    pub async fn failed(&self) -> CaptureError {
        let mut rx = self.failure.clone();
        loop {
            let current = rx.borrow_and_update().clone();
            if let Some(err) = current {
                return err;
            }
            if rx.changed().await.is_err() {
                // Supervisor ended without failing (cancelled)
                std::future::pending::<()>().await;
            }
        }
    }

    /// Release everything: supervisor, stream tracks, then the tab.
    ///
    /// Safe to call more than once.
    pub async fn teardown(&mut self) {
        self.supervisor_token.cancel();
        if let Some(handle) = self.supervisor.take() {
            if let Err(e) = handle.await {
                warn!(tab_id = self.tab_id, error = %e, "Tab supervisor task failed");
            }
        }

        if let Some(mut stream) = self.stream.take() {
            let stopped = stream.stop_all();
            debug!(tab_id = self.tab_id, stopped, "Capture tracks stopped");
        }

        if let Some(mut tab) = self.tab.take() {
            tab.close().await;
        }
    }
}

impl Drop for CaptureSession {
    fn drop(&mut self) {
        self.supervisor_token.cancel();
        if let Some(handle) = self.supervisor.take() {
            handle.abort();
        }
        if let Some(mut stream) = self.stream.take() {
            stream.stop_all();
        }
        // TabSession removes its tab on drop
        self.tab.take();
    }
}
