//! Worker status and its monotonic progression.

use std::sync::Mutex;

use serde::{Deserialize, Serialize};

/// Lifecycle status of a worker instance.
///
/// Variants are ordered; a worker only ever moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerStatus {
    /// Constructed, `run` not called yet
    Idle,

    /// Acquiring or consuming the capture stream
    Running,

    /// Stop signal fired, teardown in progress
    Stopping,

    /// Finalized
    Done,
}

impl Default for WorkerStatus {
    fn default() -> Self {
        Self::Idle
    }
}

/// Shared status holder that refuses backward transitions
#[derive(Debug, Default)]
pub struct StatusCell {
    inner: Mutex<WorkerStatus>,
}

impl StatusCell {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current status
    pub fn get(&self) -> WorkerStatus {
        *self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Move to `next` if it is strictly ahead of the current status.
    ///
    /// Returns true when the transition happened.
    pub fn advance(&self, next: WorkerStatus) -> bool {
        let mut current = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        if next > *current {
            *current = next;
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_only_moves_forward() {
        let cell = StatusCell::new();
        assert_eq!(cell.get(), WorkerStatus::Idle);

        assert!(cell.advance(WorkerStatus::Running));
        assert!(cell.advance(WorkerStatus::Stopping));
        assert!(!cell.advance(WorkerStatus::Running));
        assert!(!cell.advance(WorkerStatus::Stopping));
        assert_eq!(cell.get(), WorkerStatus::Stopping);

        assert!(cell.advance(WorkerStatus::Done));
        assert!(!cell.advance(WorkerStatus::Idle));
        assert_eq!(cell.get(), WorkerStatus::Done);
    }

    #[test]
    fn test_status_can_skip_states() {
        let cell = StatusCell::new();
        assert!(cell.advance(WorkerStatus::Done));
        assert!(!cell.advance(WorkerStatus::Running));
    }
}
