//! Capture stream acquisition and tab supervision.
//!
//! - TabSession: one browser tab, removed on close or drop
//! - TabMonitor: handshake and heartbeat protocol over the message bridge
//! - MediaStreamGenerator: tab + monitor + capture composed into a CaptureSession

pub mod generator;
pub mod monitor;
pub mod tab_session;

pub use generator::{CaptureSession, DeliveryCheck, MediaStreamGenerator};
pub use monitor::{MonitorBudgets, MonitorState, TabMonitor, Transition};
pub use tab_session::TabSession;
