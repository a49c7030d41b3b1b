//! Process-wide task execution accounting.
//!
//! Browser hosts leak a little with every tab, so the process asks for a
//! graceful restart once it has executed a configured number of tasks. The
//! tracker is shared by every worker in the process.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::config::LimitsConfig;

/// Execution ceiling for one process
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionLimits {
    /// Tasks executed before the process shuts down (default: 50)
    pub max_task_executions: u64,
}

impl Default for ExecutionLimits {
    fn default() -> Self {
        Self {
            max_task_executions: 50,
        }
    }
}

impl From<&LimitsConfig> for ExecutionLimits {
    fn from(config: &LimitsConfig) -> Self {
        Self {
            max_task_executions: config.max_task_executions,
        }
    }
}

/// Shared counters plus the graceful-shutdown trigger
#[derive(Debug)]
pub struct ExecutionTracker {
    limits: ExecutionLimits,
    started: AtomicU64,
    failed: AtomicU64,
    shutdown: CancellationToken,
}

impl Default for ExecutionTracker {
    fn default() -> Self {
        Self::new(ExecutionLimits::default())
    }
}

impl ExecutionTracker {
    pub fn new(limits: ExecutionLimits) -> Self {
        Self {
            limits,
            started: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            shutdown: CancellationToken::new(),
        }
    }

    /// Count a task start.
    ///
    /// The task that reaches the ceiling still runs and triggers shutdown;
    /// starts past the ceiling are refused.
    pub fn record_start(&self) -> Result<u64, LimitViolation> {
        let count = self.started.fetch_add(1, Ordering::SeqCst) + 1;
        let limit = self.limits.max_task_executions;

        if count > limit {
            self.shutdown.cancel();
            return Err(LimitViolation::LimitReached { count, limit });
        }
        if count == limit {
            warn!(count, limit, "Task execution ceiling reached; requesting shutdown");
            self.shutdown.cancel();
        }
        Ok(count)
    }

    pub fn record_failure(&self) {
        self.failed.fetch_add(1, Ordering::SeqCst);
    }

    pub fn started(&self) -> u64 {
        self.started.load(Ordering::SeqCst)
    }

    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::SeqCst)
    }

    pub fn limits(&self) -> &ExecutionLimits {
        &self.limits
    }

    /// Cancelled once the process should drain and exit
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub fn is_shutdown_requested(&self) -> bool {
        self.shutdown.is_cancelled()
    }
}

/// Execution limit violations
#[derive(Debug, Clone, Error)]
pub enum LimitViolation {
    #[error("Task execution limit reached: {count} > {limit}")]
    LimitReached { count: u64, limit: u64 },
}
