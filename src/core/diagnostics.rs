//! Per-worker diagnostic trail.
//!
//! A bounded buffer of recent monitoring lines, dumped next to the task
//! payload when the worker chain breaks.

use std::collections::VecDeque;
use std::sync::Mutex;

/// Bounded ring buffer of diagnostic lines
#[derive(Debug)]
pub struct DiagnosticLog {
    capacity: usize,
    lines: Mutex<VecDeque<String>>,
}

impl DiagnosticLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            lines: Mutex::new(VecDeque::with_capacity(capacity.min(1024))),
        }
    }

    /// Append a line, evicting the oldest when full
    pub fn record(&self, line: impl Into<String>) {
        let stamped = format!(
            "{} {}",
            chrono::Utc::now().format("%H:%M:%S%.3f"),
            line.into()
        );

        let mut lines = self.lines.lock().unwrap_or_else(|e| e.into_inner());
        if lines.len() == self.capacity {
            lines.pop_front();
        }
        lines.push_back(stamped);
    }

    pub fn len(&self) -> usize {
        self.lines.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of the buffered lines, oldest first
    pub fn snapshot(&self) -> Vec<String> {
        self.lines
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .cloned()
            .collect()
    }

    /// Buffered lines joined for a single log record
    pub fn dump(&self) -> String {
        self.snapshot().join("\n")
    }
}

impl Default for DiagnosticLog {
    fn default() -> Self {
        Self::new(200)
    }
}
