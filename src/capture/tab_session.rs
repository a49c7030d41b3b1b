//! Ownership of one browser tab.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::CaptureError;
use crate::host::{BrowserHost, TabId};

/// A tab created for one task; removed on `close` or drop
pub struct TabSession {
    host: Arc<dyn BrowserHost>,
    tab_id: TabId,
    open: bool,
}

impl TabSession {
    /// Create a tab for `url` and pin it against auto-discard.
    ///
    /// If `cancel` fires before the host acknowledges creation, the call
    /// returns `Cancelled` and the tab is removed as soon as it appears.
    pub async fn open(
        host: Arc<dyn BrowserHost>,
        url: &str,
        cancel: &CancellationToken,
    ) -> Result<Self, CaptureError> {
        if cancel.is_cancelled() {
            return Err(CaptureError::Cancelled);
        }

        let mut create = {
            let host = host.clone();
            let url = url.to_string();
            tokio::spawn(async move { host.create_tab(&url).await })
        };

        let created = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            joined = &mut create => Some(joined),
        };

        let tab_id = match created {
            Some(joined) => joined
                .map_err(|e| CaptureError::Host(format!("tab creation task failed: {}", e)))??,
            None => {
                // Reap the tab once the host finishes creating it
                let host = host.clone();
                tokio::spawn(async move {
                    if let Ok(Ok(tab_id)) = create.await {
                        debug!(tab_id, "Removing tab created after cancellation");
                        if let Err(e) = host.remove_tab(tab_id).await {
                            warn!(tab_id, error = %e, "Failed to remove late tab");
                        }
                    }
                });
                return Err(CaptureError::Cancelled);
            }
        };

        let mut session = Self {
            host,
            tab_id,
            open: true,
        };

        if let Err(e) = session.host.set_auto_discardable(tab_id, false).await {
            session.close().await;
            return Err(e);
        }

        debug!(tab_id, url, "Tab opened");
        Ok(session)
    }

    pub fn tab_id(&self) -> TabId {
        self.tab_id
    }

    /// Remove the tab. Further calls are no-ops.
    pub async fn close(&mut self) {
        if !self.open {
            return;
        }
        self.open = false;

        match self.host.remove_tab(self.tab_id).await {
            Ok(()) => debug!(tab_id = self.tab_id, "Tab removed"),
            Err(e) => warn!(tab_id = self.tab_id, error = %e, "Failed to remove tab"),
        }
    }
}

impl Drop for TabSession {
    fn drop(&mut self) {
        if !self.open {
            return;
        }
        self.open = false;

        let host = self.host.clone();
        let tab_id = self.tab_id;
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(e) = host.remove_tab(tab_id).await {
                        warn!(tab_id, error = %e, "Failed to remove dropped tab");
                    }
                });
            }
            Err(_) => warn!(tab_id, "Tab dropped outside a runtime; it was not removed"),
        }
    }
}
