//! Browser-automation host capabilities.
//!
//! The host owns the real browser. The worker only consumes its primitives:
//! tab create/remove, the message bridge, tab capture and the media recorder.
//! Everything here is a capability seam; the worker never reimplements them.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc};

use crate::error::CaptureError;

/// Host-assigned tab identifier
pub type TabId = i64;

/// A tab-update notification from the host
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TabUpdate {
    pub tab_id: TabId,

    /// Document title, when it changed
    pub title: Option<String>,

    /// Loading status ("loading" / "complete"), when it changed
    pub status: Option<String>,

    /// Set when the host discarded (unloaded) the tab
    pub discarded: Option<bool>,
}

/// Video constraints forwarded to the capture primitive
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoConstraints {
    pub min_width: u32,
    pub max_width: u32,
    pub min_height: u32,
    pub max_height: u32,
    pub max_frame_rate: u32,
}

impl Default for VideoConstraints {
    fn default() -> Self {
        Self {
            min_width: 1280,
            max_width: 1920,
            min_height: 720,
            max_height: 1080,
            max_frame_rate: 30,
        }
    }
}

/// `{audio, video, videoConstraints}` as understood by the host
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureConstraints {
    pub audio: bool,
    pub video: bool,
    pub video_constraints: VideoConstraints,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackKind {
    Audio,
    Video,
}

/// One audio or video track of a stream
#[async_trait]
pub trait MediaTrack: Send + Sync {
    fn id(&self) -> &str;

    fn kind(&self) -> TrackKind;

    /// Whether the track is still producing media
    fn is_live(&self) -> bool;

    fn is_muted(&self) -> bool {
        false
    }

    /// Stop the track and release its source
    fn stop(&self);

    /// Resolves when the remote side ends the track
    async fn ended(&self) {
        std::future::pending::<()>().await
    }
}

impl fmt::Debug for dyn MediaTrack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MediaTrack")
            .field("id", &self.id())
            .field("kind", &self.kind())
            .field("live", &self.is_live())
            .finish()
    }
}

/// Audio/video stream obtained by capturing a tab
#[derive(Debug)]
pub struct CaptureStream {
    id: String,
    tracks: Vec<Arc<dyn MediaTrack>>,
}

impl CaptureStream {
    pub fn new(id: impl Into<String>, tracks: Vec<Arc<dyn MediaTrack>>) -> Self {
        Self {
            id: id.into(),
            tracks,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn tracks(&self) -> &[Arc<dyn MediaTrack>] {
        &self.tracks
    }

    pub fn audio_tracks(&self) -> impl Iterator<Item = &Arc<dyn MediaTrack>> {
        self.tracks.iter().filter(|t| t.kind() == TrackKind::Audio)
    }

    /// A stream is active while it has at least one live track
    pub fn is_active(&self) -> bool {
        self.tracks.iter().any(|t| t.is_live())
    }

    /// Stop every track and detach it from the stream.
    ///
    /// Returns the number of tracks stopped; a second call stops nothing.
    pub fn stop_all(&mut self) -> usize {
        let tracks: Vec<_> = self.tracks.drain(..).collect();
        for track in &tracks {
            track.stop();
        }
        tracks.len()
    }
}

/// Chunked recorder running over a capture stream
#[async_trait]
pub trait MediaRecorder: Send {
    /// Next encoded chunk; `None` once the recorder has ended
    async fn next_chunk(&mut self) -> Option<Bytes>;

    async fn stop(&mut self) -> Result<(), CaptureError>;
}

/// Primitive capabilities of the browser-automation host
#[async_trait]
pub trait BrowserHost: Send + Sync {
    /// Create a tab; resolves once the host acknowledged creation
    async fn create_tab(&self, url: &str) -> Result<TabId, CaptureError>;

    async fn remove_tab(&self, tab_id: TabId) -> Result<(), CaptureError>;

    async fn set_auto_discardable(&self, tab_id: TabId, discardable: bool)
        -> Result<(), CaptureError>;

    /// Subscribe to tab-update notifications for all tabs
    fn subscribe_tab_updates(&self) -> broadcast::Receiver<TabUpdate>;

    /// Inject the monitoring bridge into a tab and return its raw message feed.
    ///
    /// Injecting again replaces the previous bridge.
    async fn inject_bridge(&self, tab_id: TabId) -> Result<mpsc::Receiver<String>, CaptureError>;

    async fn capture_tab(
        &self,
        tab_id: TabId,
        constraints: &CaptureConstraints,
    ) -> Result<CaptureStream, CaptureError>;

    /// Start a recorder producing a chunk every `timeslice`; resolves once started
    async fn start_recorder(
        &self,
        stream: &CaptureStream,
        timeslice: Duration,
    ) -> Result<Box<dyn MediaRecorder>, CaptureError>;
}
