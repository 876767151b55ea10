// Shared test doubles for session, capture and playback tests
//
// Each fake is a cheap `Clone` around shared state: one copy goes into the
// session, the test keeps the other to script and inspect it.

#![allow(dead_code)]

use anyhow::{bail, Result};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

use voicedesk::audio::convert::encode_wav;
use voicedesk::audio::{
    AudioCapture, AudioFrame, AudioSink, CaptureBackend, CaptureConstraints, ClipFormat,
    DecodedAudio, PlaybackUnit,
};
use voicedesk::channel::{OutboundMessage, Transport, TransportEvent};
use voicedesk::error::{Result as VoiceResult, VoiceError};
use voicedesk::session::{ProviderCredentials, SessionConfig, StaticCredentials, VoiceSession};

// ============================================================================
// Transport
// ============================================================================

#[derive(Default)]
struct TransportState {
    sent: Vec<OutboundMessage>,
    inbound: Option<mpsc::Sender<TransportEvent>>,
    fail_connect: bool,
    connects: usize,
    closes: usize,
}

/// In-memory channel; the test plays the server
#[derive(Clone, Default)]
pub struct FakeTransport {
    state: Arc<Mutex<TransportState>>,
}

impl FakeTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        let transport = Self::default();
        transport.set_fail_connect(true);
        transport
    }

    pub fn set_fail_connect(&self, fail: bool) {
        self.state.lock().unwrap().fail_connect = fail;
    }

    pub fn sent(&self) -> Vec<OutboundMessage> {
        self.state.lock().unwrap().sent.clone()
    }

    pub fn sent_tags(&self) -> Vec<&'static str> {
        self.sent().iter().map(|m| m.tag()).collect()
    }

    pub fn connects(&self) -> usize {
        self.state.lock().unwrap().connects
    }

    pub fn closes(&self) -> usize {
        self.state.lock().unwrap().closes
    }

    /// Deliver one raw frame as if the server sent it
    pub async fn push_frame(&self, raw: &str) {
        self.push(TransportEvent::Frame(raw.to_string())).await;
    }

    /// Drop the connection from the server side
    pub async fn drop_connection(&self) {
        self.push(TransportEvent::Closed {
            reason: Some("server went away".to_string()),
        })
        .await;
    }

    async fn push(&self, event: TransportEvent) {
        let inbound = self.state.lock().unwrap().inbound.clone();
        match inbound {
            Some(tx) => tx.send(event).await.expect("session dropped its inbound channel"),
            None => panic!("push on a transport that is not connected"),
        }
    }
}

#[async_trait::async_trait]
impl Transport for FakeTransport {
    async fn connect(&mut self) -> VoiceResult<mpsc::Receiver<TransportEvent>> {
        let mut state = self.state.lock().unwrap();
        state.connects += 1;
        if state.fail_connect {
            return Err(VoiceError::Connection("connection refused".to_string()));
        }

        let (tx, rx) = mpsc::channel(16);
        state.inbound = Some(tx);
        Ok(rx)
    }

    async fn send(&mut self, message: &OutboundMessage) -> VoiceResult<()> {
        let mut state = self.state.lock().unwrap();
        if state.inbound.is_none() {
            return Err(VoiceError::Transmission("not connected".to_string()));
        }
        state.sent.push(message.clone());
        Ok(())
    }

    async fn close(&mut self) -> VoiceResult<()> {
        let mut state = self.state.lock().unwrap();
        state.closes += 1;
        state.inbound = None;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.state.lock().unwrap().inbound.is_some()
    }

    fn name(&self) -> &str {
        "fake"
    }
}

// ============================================================================
// Capture backend
// ============================================================================

struct BackendState {
    script: Vec<Vec<u8>>,
    supports: Vec<ClipFormat>,
    fail_start: bool,
    fail_stop: bool,
    starts: usize,
    stops: usize,
    sender: Option<mpsc::Sender<Vec<u8>>>,
}

/// Emits a scripted list of fragments as soon as capture starts
#[derive(Clone)]
pub struct FakeBackend {
    state: Arc<Mutex<BackendState>>,
}

impl FakeBackend {
    /// A backend that can only produce WAV, like the real ones
    pub fn new(script: Vec<Vec<u8>>) -> Self {
        Self::supporting(script, vec![ClipFormat::Wav])
    }

    pub fn supporting(script: Vec<Vec<u8>>, supports: Vec<ClipFormat>) -> Self {
        Self {
            state: Arc::new(Mutex::new(BackendState {
                script,
                supports,
                fail_start: false,
                fail_stop: false,
                starts: 0,
                stops: 0,
                sender: None,
            })),
        }
    }

    pub fn set_fail_start(&self, fail: bool) {
        self.state.lock().unwrap().fail_start = fail;
    }

    pub fn set_fail_stop(&self, fail: bool) {
        self.state.lock().unwrap().fail_stop = fail;
    }

    pub fn starts(&self) -> usize {
        self.state.lock().unwrap().starts
    }

    pub fn stops(&self) -> usize {
        self.state.lock().unwrap().stops
    }
}

#[async_trait::async_trait]
impl CaptureBackend for FakeBackend {
    async fn start(
        &mut self,
        _constraints: &CaptureConstraints,
        _format: ClipFormat,
    ) -> Result<mpsc::Receiver<Vec<u8>>> {
        let mut state = self.state.lock().unwrap();
        state.starts += 1;
        if state.fail_start {
            bail!("microphone permission denied");
        }

        let (tx, rx) = mpsc::channel(state.script.len().max(1));
        for fragment in state.script.iter().cloned() {
            tx.try_send(fragment)?;
        }
        // Held until stop, like a live device
        state.sender = Some(tx);
        Ok(rx)
    }

    async fn stop(&mut self) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.stops += 1;
        state.sender = None;
        if state.fail_stop {
            bail!("device busy");
        }
        Ok(())
    }

    fn supports(&self, format: ClipFormat) -> bool {
        self.state.lock().unwrap().supports.contains(&format)
    }

    fn is_capturing(&self) -> bool {
        self.state.lock().unwrap().sender.is_some()
    }

    fn name(&self) -> &str {
        "fake-mic"
    }
}

pub fn capture_unit(backend: &FakeBackend) -> AudioCapture {
    AudioCapture::new(
        Box::new(backend.clone()),
        CaptureConstraints::default(),
        Duration::from_millis(200),
    )
}

// ============================================================================
// Sinks
// ============================================================================

#[derive(Default)]
struct SinkState {
    /// Sample counts of clips that started, in order
    started: Vec<usize>,
    /// Sample counts of clips whose output was dropped before finishing
    interrupted: Vec<usize>,
    finished: Vec<usize>,
}

/// Plays for `hold`, recording starts, interruptions and completions
#[derive(Clone)]
pub struct RecordingSink {
    state: Arc<Mutex<SinkState>>,
    hold: Duration,
}

impl RecordingSink {
    /// Never finishes on its own
    pub fn gated() -> Self {
        Self::holding(Duration::from_secs(3600))
    }

    pub fn instant() -> Self {
        Self::holding(Duration::ZERO)
    }

    pub fn holding(hold: Duration) -> Self {
        Self {
            state: Arc::new(Mutex::new(SinkState::default())),
            hold,
        }
    }

    pub fn started(&self) -> Vec<usize> {
        self.state.lock().unwrap().started.clone()
    }

    pub fn interrupted(&self) -> Vec<usize> {
        self.state.lock().unwrap().interrupted.clone()
    }

    pub fn finished(&self) -> Vec<usize> {
        self.state.lock().unwrap().finished.clone()
    }
}

struct OutputGuard {
    state: Arc<Mutex<SinkState>>,
    samples: usize,
    done: bool,
}

impl Drop for OutputGuard {
    fn drop(&mut self) {
        if !self.done {
            self.state.lock().unwrap().interrupted.push(self.samples);
        }
    }
}

#[async_trait::async_trait]
impl AudioSink for RecordingSink {
    async fn play(&self, audio: DecodedAudio) -> Result<()> {
        let samples = audio.samples.len();
        self.state.lock().unwrap().started.push(samples);

        let mut guard = OutputGuard {
            state: Arc::clone(&self.state),
            samples,
            done: false,
        };
        tokio::time::sleep(self.hold).await;
        guard.done = true;

        self.state.lock().unwrap().finished.push(samples);
        Ok(())
    }

    fn name(&self) -> &str {
        "recording-sink"
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// A mono 16kHz WAV clip of `samples` samples
pub fn wav_bytes(samples: usize) -> Vec<u8> {
    let samples = (0..samples).map(|i| ((i % 64) as i16) * 256).collect();
    encode_wav(&AudioFrame {
        samples,
        sample_rate: 16000,
        channels: 1,
    })
    .expect("encode test wav")
}

pub fn credentials() -> ProviderCredentials {
    ProviderCredentials {
        app_id: "app-id".to_string(),
        api_key: "api-key".to_string(),
        api_secret: "api-secret".to_string(),
    }
}

/// A session wired to fakes, plus the handles to script them
pub struct Harness {
    pub session: VoiceSession,
    pub transport: FakeTransport,
    pub backend: FakeBackend,
    pub sink: RecordingSink,
}

impl Harness {
    pub fn new(script: Vec<Vec<u8>>) -> Self {
        Self::with(FakeTransport::new(), FakeBackend::new(script), RecordingSink::instant())
    }

    pub fn with(transport: FakeTransport, backend: FakeBackend, sink: RecordingSink) -> Self {
        let session = VoiceSession::new(
            SessionConfig::default(),
            Box::new(transport.clone()),
            capture_unit(&backend),
            PlaybackUnit::new(Arc::new(sink.clone())),
            Arc::new(StaticCredentials::new("xunfei", credentials())),
        );

        Self {
            session,
            transport,
            backend,
            sink,
        }
    }

    /// Deliver a frame and let the session handle it
    pub async fn receive(&mut self, raw: &str) {
        self.transport.push_frame(raw).await;
        self.session.pump().await;
    }
}

/// Poll `check` until it holds or a second passes
pub async fn eventually(mut check: impl FnMut() -> bool) -> bool {
    for _ in 0..100 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}
