//! In-memory fakes for the browser host, gateways and providers.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use serde_json::json;
use tokio::io::AsyncReadExt;
use tokio::sync::{broadcast, mpsc, oneshot, watch, Notify};
use tokio::time::sleep;

use capture_worker::adapters::{
    ControlPlane, EncoderExit, EncoderLauncher, EncoderProcess, EventLog, MediaProbe, ObjectStorage,
    ProbeReport, RecordingNotice, RoomChannel, RoomRef, SignalingRoom, SpeechToText, Telephony,
    Utterance,
};
use capture_worker::capture::MediaStreamGenerator;
use capture_worker::config::WorkerConfig;
use capture_worker::core::{DiagnosticLog, ExecutionTracker, TaskPipeline, Worker};
use capture_worker::domain::{DomainEvent, MonitoringCommand, MonitoringEvent, Task, TaskKind, TaskPayload};
use capture_worker::error::{CaptureError, GatewayError};
use capture_worker::host::{
    BrowserHost, CaptureConstraints, CaptureStream, MediaRecorder, MediaTrack, TabId, TabUpdate,
    TrackKind,
};

/// Worker config with millisecond-scale budgets
pub fn fast_config(dir: &Path) -> WorkerConfig {
    let mut config = WorkerConfig::default();
    config.monitor.initialized_event_timeout_ms = 300;
    config.monitor.app_ready_event_timeout_ms = 300;
    config.monitor.connection_state_timeout_ms = 300;
    config.monitor.alive_event_timeout_ms = 150;
    config.monitor.app_refresh_delay_ms = 20;
    config.capture.document_delivery_timeout_ms = 300;
    config.recording.output_dir = dir.join("recordings");
    config.recording.timeslice_ms = 10;
    config.recording.ffmpeg_timeout_ms = 200;
    config.recording.min_duration_seconds = 0.0;
    config.recording.notify_retry_delay_ms = 10;
    config
}

pub fn payload() -> TaskPayload {
    TaskPayload {
        url: "https://studio.example.com/run/1".to_string(),
        company_id: "acme".to_string(),
        session_id: "session-1".to_string(),
        session_run_id: "run-1".to_string(),
        attendee_id: "bot-1".to_string(),
        room_id: "room-1".to_string(),
        meeting_name: "Weekly".to_string(),
        ..Default::default()
    }
}

pub fn task(kind: TaskKind) -> Task {
    Task::new(format!("task-{}", kind), kind, payload())
}

pub fn build_worker(
    task: Task,
    pipeline: Box<dyn TaskPipeline>,
    host: Arc<FakeHost>,
    config: &WorkerConfig,
    tracker: Arc<ExecutionTracker>,
) -> Worker {
    let diagnostics = Arc::new(DiagnosticLog::new(64));
    let generator = MediaStreamGenerator::new(host, &config.monitor, &config.capture, diagnostics.clone());
    Worker::new(
        task,
        pipeline,
        generator,
        config.capture.constraints(),
        tracker,
        diagnostics,
    )
}

/// Find the typed capture error inside an anyhow chain
pub fn capture_error(err: &anyhow::Error) -> Option<&CaptureError> {
    err.chain().find_map(|e| e.downcast_ref::<CaptureError>())
}

// ---------------------------------------------------------------------------
// Media tracks

pub struct FakeTrack {
    id: String,
    kind: TrackKind,
    live: AtomicBool,
    muted: bool,
    stops: AtomicUsize,
    ended: AtomicBool,
    end_signal: Notify,
}

impl FakeTrack {
    pub fn new(id: &str, kind: TrackKind, live: bool) -> Arc<Self> {
        Arc::new(Self {
            id: id.to_string(),
            kind,
            live: AtomicBool::new(live),
            muted: false,
            stops: AtomicUsize::new(0),
            ended: AtomicBool::new(false),
            end_signal: Notify::new(),
        })
    }

    pub fn muted(id: &str) -> Arc<Self> {
        Arc::new(Self {
            id: id.to_string(),
            kind: TrackKind::Audio,
            live: AtomicBool::new(true),
            muted: true,
            stops: AtomicUsize::new(0),
            ended: AtomicBool::new(false),
            end_signal: Notify::new(),
        })
    }

    pub fn stops(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }

    /// Simulate the remote side ending the track
    pub fn end(&self) {
        self.ended.store(true, Ordering::SeqCst);
        self.end_signal.notify_one();
    }
}

#[async_trait]
impl MediaTrack for FakeTrack {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> TrackKind {
        self.kind
    }

    fn is_live(&self) -> bool {
        self.live.load(Ordering::SeqCst)
    }

    fn is_muted(&self) -> bool {
        self.muted
    }

    fn stop(&self) {
        self.stops.fetch_add(1, Ordering::SeqCst);
        self.live.store(false, Ordering::SeqCst);
    }

    async fn ended(&self) {
        if self.ended.load(Ordering::SeqCst) {
            return;
        }
        self.end_signal.notified().await;
    }
}

// ---------------------------------------------------------------------------
// Browser host

/// One step of a scripted bridge feed
#[derive(Debug, Clone)]
pub enum BridgeStep {
    Send(MonitoringCommand, serde_json::Value),
    Raw(String),
    Wait(u64),
    /// ALIVE every n ms until the receiver goes away
    Heartbeat(u64),
    /// Drop the sender
    Close,
}

pub fn handshake() -> Vec<BridgeStep> {
    vec![
        BridgeStep::Send(MonitoringCommand::AppInitialized, json!(null)),
        BridgeStep::Send(MonitoringCommand::AppReady, json!(null)),
        BridgeStep::Send(MonitoringCommand::Online, json!(null)),
        BridgeStep::Send(MonitoringCommand::SocketConnectionChange, json!("accept")),
        BridgeStep::Send(MonitoringCommand::MediaConnectionChange, json!("online")),
    ]
}

pub fn healthy() -> Vec<BridgeStep> {
    let mut steps = handshake();
    steps.push(BridgeStep::Heartbeat(20));
    steps
}

/// Handshake completes, then the tab goes silent
pub fn silent_after_handshake() -> Vec<BridgeStep> {
    handshake()
}

/// Feed a script into a bridge sender
pub async fn play(tx: mpsc::Sender<String>, steps: Vec<BridgeStep>) {
    for step in steps {
        match step {
            BridgeStep::Send(command, body) => {
                if tx.send(MonitoringEvent::new(command, body).to_bridge()).await.is_err() {
                    return;
                }
            }
            BridgeStep::Raw(raw) => {
                if tx.send(raw).await.is_err() {
                    return;
                }
            }
            BridgeStep::Wait(ms) => sleep(Duration::from_millis(ms)).await,
            BridgeStep::Heartbeat(ms) => loop {
                sleep(Duration::from_millis(ms)).await;
                let alive = MonitoringEvent::new(MonitoringCommand::Alive, json!(null)).to_bridge();
                if tx.send(alive).await.is_err() {
                    return;
                }
            },
            BridgeStep::Close => return,
        }
    }
    // Keep the bridge open until the monitor lets go
    tx.closed().await;
}

/// Recorder behavior
#[derive(Debug, Clone)]
pub struct RecorderScript {
    pub chunks: usize,
    pub interval_ms: u64,
    /// End the recorder after the last chunk instead of idling
    pub end_when_done: bool,
}

impl Default for RecorderScript {
    fn default() -> Self {
        Self {
            chunks: usize::MAX,
            interval_ms: 10,
            end_when_done: false,
        }
    }
}

pub struct FakeHost {
    updates: broadcast::Sender<TabUpdate>,
    next_tab: AtomicI64,
    created: Mutex<Vec<TabId>>,
    removed: Mutex<Vec<TabId>>,
    pinned: Mutex<Vec<TabId>>,
    injections: AtomicUsize,
    scripts: Mutex<VecDeque<Vec<BridgeStep>>>,
    tracks: Mutex<Vec<Arc<FakeTrack>>>,
    recorders_started: AtomicUsize,
    recorders_stopped: Arc<AtomicUsize>,

    pub create_delay_ms: AtomicI64,
    pub titles: Mutex<Vec<String>>,
    pub capture_live: AtomicBool,
    /// Captured audio track starts live (video follows `capture_live` alone)
    pub capture_audio: AtomicBool,
    pub recorder: Mutex<RecorderScript>,
}

impl FakeHost {
    pub fn new() -> Arc<Self> {
        let (updates, _) = broadcast::channel(64);
        Arc::new(Self {
            updates,
            next_tab: AtomicI64::new(100),
            created: Mutex::new(Vec::new()),
            removed: Mutex::new(Vec::new()),
            pinned: Mutex::new(Vec::new()),
            injections: AtomicUsize::new(0),
            scripts: Mutex::new(VecDeque::new()),
            tracks: Mutex::new(Vec::new()),
            recorders_started: AtomicUsize::new(0),
            recorders_stopped: Arc::new(AtomicUsize::new(0)),
            create_delay_ms: AtomicI64::new(0),
            titles: Mutex::new(vec!["Studio | Live".to_string()]),
            capture_live: AtomicBool::new(true),
            capture_audio: AtomicBool::new(true),
            recorder: Mutex::new(RecorderScript::default()),
        })
    }

    /// Queue a bridge script for the next injection (default: healthy)
    pub fn push_script(&self, steps: Vec<BridgeStep>) {
        self.scripts.lock().unwrap().push_back(steps);
    }

    pub fn set_titles(&self, titles: &[&str]) {
        *self.titles.lock().unwrap() = titles.iter().map(|t| t.to_string()).collect();
    }

    pub fn set_recorder(&self, script: RecorderScript) {
        *self.recorder.lock().unwrap() = script;
    }

    pub fn discard(&self, tab_id: TabId) {
        let _ = self.updates.send(TabUpdate {
            tab_id,
            discarded: Some(true),
            ..Default::default()
        });
    }

    pub fn created(&self) -> Vec<TabId> {
        self.created.lock().unwrap().clone()
    }

    pub fn removed(&self) -> Vec<TabId> {
        self.removed.lock().unwrap().clone()
    }

    pub fn pinned(&self) -> Vec<TabId> {
        self.pinned.lock().unwrap().clone()
    }

    pub fn injections(&self) -> usize {
        self.injections.load(Ordering::SeqCst)
    }

    pub fn tracks(&self) -> Vec<Arc<FakeTrack>> {
        self.tracks.lock().unwrap().clone()
    }

    pub fn recorders_started(&self) -> usize {
        self.recorders_started.load(Ordering::SeqCst)
    }

    pub fn recorders_stopped(&self) -> usize {
        self.recorders_stopped.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BrowserHost for FakeHost {
    async fn create_tab(&self, _url: &str) -> Result<TabId, CaptureError> {
        let delay = self.create_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            sleep(Duration::from_millis(delay as u64)).await;
        }

        let tab_id = self.next_tab.fetch_add(1, Ordering::SeqCst);
        self.created.lock().unwrap().push(tab_id);

        let titles = self.titles.lock().unwrap().clone();
        let updates = self.updates.clone();
        tokio::spawn(async move {
            for title in titles {
                sleep(Duration::from_millis(5)).await;
                let _ = updates.send(TabUpdate {
                    tab_id,
                    title: Some(title),
                    status: Some("complete".to_string()),
                    discarded: None,
                });
            }
        });

        Ok(tab_id)
    }

    async fn remove_tab(&self, tab_id: TabId) -> Result<(), CaptureError> {
        self.removed.lock().unwrap().push(tab_id);
        Ok(())
    }

    async fn set_auto_discardable(&self, tab_id: TabId, discardable: bool) -> Result<(), CaptureError> {
        if !discardable {
            self.pinned.lock().unwrap().push(tab_id);
        }
        Ok(())
    }

    fn subscribe_tab_updates(&self) -> broadcast::Receiver<TabUpdate> {
        self.updates.subscribe()
    }

    async fn inject_bridge(&self, _tab_id: TabId) -> Result<mpsc::Receiver<String>, CaptureError> {
        self.injections.fetch_add(1, Ordering::SeqCst);
        let script = self.scripts.lock().unwrap().pop_front().unwrap_or_else(healthy);

        let (tx, rx) = mpsc::channel(32);
        tokio::spawn(play(tx, script));
        Ok(rx)
    }

    async fn capture_tab(
        &self,
        tab_id: TabId,
        _constraints: &CaptureConstraints,
    ) -> Result<CaptureStream, CaptureError> {
        let live = self.capture_live.load(Ordering::SeqCst);
        let audio_live = live && self.capture_audio.load(Ordering::SeqCst);
        let audio = FakeTrack::new(&format!("{}-audio", tab_id), TrackKind::Audio, audio_live);
        let video = FakeTrack::new(&format!("{}-video", tab_id), TrackKind::Video, live);
        self.tracks.lock().unwrap().extend([audio.clone(), video.clone()]);

        Ok(CaptureStream::new(
            format!("stream-{}", tab_id),
            vec![audio as Arc<dyn MediaTrack>, video as Arc<dyn MediaTrack>],
        ))
    }

    async fn start_recorder(
        &self,
        _stream: &CaptureStream,
        _timeslice: Duration,
    ) -> Result<Box<dyn MediaRecorder>, CaptureError> {
        self.recorders_started.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeRecorder {
            script: self.recorder.lock().unwrap().clone(),
            produced: 0,
            stopped: self.recorders_stopped.clone(),
        }))
    }
}

struct FakeRecorder {
    script: RecorderScript,
    produced: usize,
    stopped: Arc<AtomicUsize>,
}

#[async_trait]
impl MediaRecorder for FakeRecorder {
    async fn next_chunk(&mut self) -> Option<Bytes> {
        if self.produced < self.script.chunks {
            sleep(Duration::from_millis(self.script.interval_ms)).await;
            self.produced += 1;
            return Some(Bytes::from(vec![0xAB; 64]));
        }
        if self.script.end_when_done {
            return None;
        }
        std::future::pending().await
    }

    async fn stop(&mut self) -> Result<(), CaptureError> {
        self.stopped.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Encoder and probe

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncoderMode {
    /// Exits with 0 once its input closes
    Normal,
    /// Ignores end of input; only a kill ends it
    HangOnQuit,
    /// Exits with code 1 after n ms
    CrashAfter(u64),
    /// Never reads its input; only a kill ends it
    Stalled,
}

pub struct FakeEncoder {
    mode: EncoderMode,
    spawned: Mutex<Vec<PathBuf>>,
    killed: Arc<AtomicUsize>,
}

impl FakeEncoder {
    pub fn new(mode: EncoderMode) -> Arc<Self> {
        Arc::new(Self {
            mode,
            spawned: Mutex::new(Vec::new()),
            killed: Arc::new(AtomicUsize::new(0)),
        })
    }

    pub fn spawned(&self) -> Vec<PathBuf> {
        self.spawned.lock().unwrap().clone()
    }

    pub fn killed(&self) -> usize {
        self.killed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EncoderLauncher for FakeEncoder {
    async fn spawn(&self, output: &Path) -> Result<EncoderProcess, CaptureError> {
        self.spawned.lock().unwrap().push(output.to_path_buf());

        let (exit_tx, exit_rx) = watch::channel(None);
        let (kill_tx, mut kill_rx) = oneshot::channel::<()>();
        let output = output.to_path_buf();
        let mode = self.mode;
        let killed = self.killed.clone();

        if mode == EncoderMode::Stalled {
            // One byte of pipe capacity, and nobody draining it
            let (writer, reader) = tokio::io::duplex(1);
            tokio::spawn(async move {
                let _reader = reader;
                let _ = kill_rx.await;
                killed.fetch_add(1, Ordering::SeqCst);
                let _ = exit_tx.send(Some(EncoderExit { code: None, killed: true }));
            });
            return Ok(EncoderProcess::from_parts(Box::new(writer), exit_rx, kill_tx));
        }

        let (writer, mut reader) = tokio::io::duplex(64 * 1024);

        tokio::spawn(async move {
            let mut data = Vec::new();
            let mut buf = [0u8; 4096];
            let crash = async move {
                match mode {
                    EncoderMode::CrashAfter(ms) => sleep(Duration::from_millis(ms)).await,
                    _ => std::future::pending::<()>().await,
                }
            };
            tokio::pin!(crash);

            let exit = loop {
                tokio::select! {
                    _ = &mut kill_rx => {
                        killed.fetch_add(1, Ordering::SeqCst);
                        break EncoderExit { code: None, killed: true };
                    }
                    _ = &mut crash => break EncoderExit { code: Some(1), killed: false },
                    read = reader.read(&mut buf) => match read {
                        Ok(0) | Err(_) => {
                            if mode == EncoderMode::HangOnQuit {
                                let _ = (&mut kill_rx).await;
                                killed.fetch_add(1, Ordering::SeqCst);
                                break EncoderExit { code: None, killed: true };
                            }
                            break EncoderExit { code: Some(0), killed: false };
                        }
                        Ok(n) => data.extend_from_slice(&buf[..n]),
                    },
                }
            };

            // The quit byte is not media
            if data.last() == Some(&b'q') {
                data.pop();
            }
            if !data.is_empty() {
                let _ = tokio::fs::write(&output, &data).await;
            }
            let _ = exit_tx.send(Some(exit));
        });

        Ok(EncoderProcess::from_parts(Box::new(writer), exit_rx, kill_tx))
    }
}

pub struct FakeProbe {
    duration_seconds: Option<f64>,
    calls: AtomicUsize,
}

impl FakeProbe {
    pub fn reporting(duration_seconds: f64) -> Arc<Self> {
        Arc::new(Self {
            duration_seconds: Some(duration_seconds),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            duration_seconds: None,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MediaProbe for FakeProbe {
    async fn probe(&self, path: &Path) -> Result<ProbeReport, CaptureError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let size_bytes = tokio::fs::metadata(path)
            .await
            .map(|m| m.len())
            .map_err(|e| CaptureError::Probe(e.to_string()))?;

        match self.duration_seconds {
            Some(duration_seconds) => Ok(ProbeReport {
                duration_seconds,
                size_bytes,
                packet_counts: vec![10, 10],
            }),
            None => Err(CaptureError::Probe("moov atom not found".to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// Gateways

#[derive(Default)]
pub struct FakeStorage {
    pub fail: AtomicBool,
    uploads: Mutex<Vec<(PathBuf, String)>>,
}

impl FakeStorage {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn uploads(&self) -> Vec<(PathBuf, String)> {
        self.uploads.lock().unwrap().clone()
    }
}

#[async_trait]
impl ObjectStorage for FakeStorage {
    fn name(&self) -> &str {
        "fake-storage"
    }

    async fn upload(&self, path: &Path, key: &str) -> Result<String, GatewayError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(GatewayError::Http {
                status: 503,
                body: "slow down".to_string(),
            });
        }
        // The file must still be there while uploading
        tokio::fs::metadata(path).await?;
        self.uploads
            .lock()
            .unwrap()
            .push((path.to_path_buf(), key.to_string()));
        Ok(key.to_string())
    }
}

#[derive(Default)]
pub struct FakeControlPlane {
    resets_remaining: AtomicUsize,
    attempts: AtomicUsize,
    notices: Mutex<Vec<RecordingNotice>>,
}

impl FakeControlPlane {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Fail the first `n` attempts with a reset connection
    pub fn resetting(n: usize) -> Arc<Self> {
        let plane = Self::default();
        plane.resets_remaining.store(n, Ordering::SeqCst);
        Arc::new(plane)
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn notices(&self) -> Vec<RecordingNotice> {
        self.notices.lock().unwrap().clone()
    }
}

#[async_trait]
impl ControlPlane for FakeControlPlane {
    async fn notify_recording(&self, notice: &RecordingNotice) -> Result<(), GatewayError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);

        let reset = self
            .resets_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if reset {
            return Err(GatewayError::ConnectionReset("socket hang up".to_string()));
        }

        self.notices.lock().unwrap().push(notice.clone());
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeEventLog {
    events: Mutex<Vec<DomainEvent>>,
}

impl FakeEventLog {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<DomainEvent> {
        self.events.lock().unwrap().clone()
    }
}

#[async_trait]
impl EventLog for FakeEventLog {
    async fn publish(&self, event: &DomainEvent) -> Result<(), GatewayError> {
        self.events.lock().unwrap().push(event.clone());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Room and providers

#[derive(Default)]
pub struct ChannelLog {
    pub data: Mutex<Vec<Bytes>>,
    pub produced: Mutex<Vec<String>>,
    pub closed: AtomicUsize,
}

#[derive(Default)]
pub struct FakeRoom {
    joins: Mutex<Vec<RoomRef>>,
    pub log: Arc<ChannelLog>,
}

impl FakeRoom {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn joins(&self) -> Vec<RoomRef> {
        self.joins.lock().unwrap().clone()
    }

    pub fn sent(&self) -> Vec<Bytes> {
        self.log.data.lock().unwrap().clone()
    }

    pub fn produced(&self) -> Vec<String> {
        self.log.produced.lock().unwrap().clone()
    }

    pub fn closed(&self) -> usize {
        self.log.closed.load(Ordering::SeqCst)
    }
}

struct FakeChannel {
    log: Arc<ChannelLog>,
}

#[async_trait]
impl RoomChannel for FakeChannel {
    async fn send_data(&mut self, data: Bytes) -> Result<(), GatewayError> {
        self.log.data.lock().unwrap().push(data);
        Ok(())
    }

    async fn produce(&mut self, track: Arc<dyn MediaTrack>) -> Result<(), GatewayError> {
        self.log.produced.lock().unwrap().push(track.id().to_string());
        Ok(())
    }

    async fn close(&mut self) -> Result<(), GatewayError> {
        self.log.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[async_trait]
impl SignalingRoom for FakeRoom {
    async fn join(&self, room: &RoomRef) -> Result<Box<dyn RoomChannel>, GatewayError> {
        self.joins.lock().unwrap().push(room.clone());
        Ok(Box::new(FakeChannel {
            log: self.log.clone(),
        }))
    }
}

pub fn utterance(text: &str, start: f64) -> Utterance {
    Utterance {
        text: text.to_string(),
        is_partial: false,
        start_seconds: start,
        end_seconds: start + 1.0,
        speaker: None,
    }
}

pub struct FakeSpeech {
    utterances: Vec<Utterance>,
    fail: bool,
    /// Close the stream after the scripted utterances
    end_after: bool,
    languages: Mutex<Vec<String>>,
    tracks: Mutex<Vec<String>>,
    open_senders: Mutex<Vec<mpsc::Sender<Utterance>>>,
}

impl FakeSpeech {
    pub fn new(utterances: Vec<Utterance>, end_after: bool) -> Arc<Self> {
        Arc::new(Self {
            utterances,
            fail: false,
            end_after,
            languages: Mutex::new(Vec::new()),
            tracks: Mutex::new(Vec::new()),
            open_senders: Mutex::new(Vec::new()),
        })
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            utterances: Vec::new(),
            fail: true,
            end_after: false,
            languages: Mutex::new(Vec::new()),
            tracks: Mutex::new(Vec::new()),
            open_senders: Mutex::new(Vec::new()),
        })
    }

    pub fn languages(&self) -> Vec<String> {
        self.languages.lock().unwrap().clone()
    }

    /// Ids of the audio tracks handed to the provider
    pub fn tracks(&self) -> Vec<String> {
        self.tracks.lock().unwrap().clone()
    }
}

#[async_trait]
impl SpeechToText for FakeSpeech {
    fn name(&self) -> &str {
        "fake-speech"
    }

    async fn stream(
        &self,
        audio: &Arc<dyn MediaTrack>,
        language: &str,
    ) -> Result<mpsc::Receiver<Utterance>, GatewayError> {
        if self.fail {
            return Err(GatewayError::Unavailable("quota exceeded".to_string()));
        }
        self.languages.lock().unwrap().push(language.to_string());
        self.tracks.lock().unwrap().push(audio.id().to_string());

        let (tx, rx) = mpsc::channel(16);
        let utterances = self.utterances.clone();
        if !self.end_after {
            self.open_senders.lock().unwrap().push(tx.clone());
        }
        tokio::spawn(async move {
            for utterance in utterances {
                sleep(Duration::from_millis(5)).await;
                if tx.send(utterance).await.is_err() {
                    return;
                }
            }
        });
        Ok(rx)
    }
}

pub struct FakeTelephony {
    track: Option<Arc<FakeTrack>>,
    calls: AtomicUsize,
}

impl FakeTelephony {
    pub fn returning(track: Option<Arc<FakeTrack>>) -> Arc<Self> {
        Arc::new(Self {
            track,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Telephony for FakeTelephony {
    fn name(&self) -> &str {
        "fake-telephony"
    }

    async fn exchange(
        &self,
        _capture: &CaptureStream,
        _payload: &TaskPayload,
    ) -> Result<Option<Arc<dyn MediaTrack>>, GatewayError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.track.clone().map(|t| t as Arc<dyn MediaTrack>))
    }
}
