use base64::Engine;
use chrono::Utc;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use super::config::SessionConfig;
use super::credentials::{CredentialStore, StaticCredentials, VoiceSettingsFile};
use super::state::{SessionPhase, SessionSnapshot};
use super::stats::{ChatMessage, SessionStats};
use crate::audio::{
    create_sink, AudioCapture, AudioReply, CaptureBackendFactory, PlaybackEvent, PlaybackOutcome,
    PlaybackUnit,
};
use crate::channel::{InboundEvent, OutboundMessage, Transport, TransportEvent, WebSocketTransport};
use crate::config::Config;
use crate::error::{LastError, Result, VoiceError};

/// Anything the session reacts to besides direct calls
#[derive(Debug)]
pub enum SessionEvent {
    Transport(TransportEvent),
    /// A capture fragment for the current utterance
    Fragment(Vec<u8>),
    Playback(PlaybackEvent),
}

/// A voice chat session: connection, recording and playback lifecycles
///
/// All state is mutated through `&mut self`, so one owner (normally the
/// driver task) serializes every operation and event.
pub struct VoiceSession {
    config: SessionConfig,
    transport: Box<dyn Transport>,
    capture: AudioCapture,
    playback: PlaybackUnit,
    credentials: Arc<dyn CredentialStore>,

    /// Inbound channel events while connected
    inbound: Option<mpsc::Receiver<TransportEvent>>,

    phase: SessionPhase,
    interim: Option<String>,
    notice: Option<String>,
    last_error: Option<LastError>,

    /// Append-only transcript
    /// Shared with published snapshots; copied only when appended while one is held
    messages: Arc<Vec<ChatMessage>>,

    started_at: chrono::DateTime<Utc>,
    clips_sent: usize,
    audio_bytes_sent: usize,
    replies_played: usize,

    snapshot_tx: watch::Sender<SessionSnapshot>,
}

impl VoiceSession {
    /// Create a new session in the `Idle` phase
    pub fn new(
        config: SessionConfig,
        transport: Box<dyn Transport>,
        capture: AudioCapture,
        playback: PlaybackUnit,
        credentials: Arc<dyn CredentialStore>,
    ) -> Self {
        info!(
            "Creating voice session {} (transport: {})",
            config.session_id,
            transport.name()
        );

        let started_at = Utc::now();
        let initial = SessionSnapshot {
            session_id: config.session_id.clone(),
            phase: SessionPhase::Idle,
            recording: false,
            playing: false,
            interim_transcript: None,
            notice: None,
            last_error: None,
            messages: Arc::default(),
            stats: SessionStats {
                started_at,
                duration_secs: 0.0,
                clips_sent: 0,
                audio_bytes_sent: 0,
                messages_count: 0,
                replies_played: 0,
            },
        };
        let (snapshot_tx, _) = watch::channel(initial);

        Self {
            config,
            transport,
            capture,
            playback,
            credentials,
            inbound: None,
            phase: SessionPhase::Idle,
            interim: None,
            notice: None,
            last_error: None,
            messages: Arc::default(),
            started_at,
            clips_sent: 0,
            audio_bytes_sent: 0,
            replies_played: 0,
            snapshot_tx,
        }
    }

    /// Build a session wired to the real endpoint, capture source and sink
    pub fn from_config(cfg: &Config) -> anyhow::Result<Self> {
        let transport = WebSocketTransport::new(
            cfg.voice.endpoint.clone(),
            Duration::from_secs(cfg.voice.connect_timeout_secs),
        );

        let backend =
            CaptureBackendFactory::create(cfg.capture.capture_source()?, cfg.capture.fragment_bytes)?;
        let capture = AudioCapture::new(
            backend,
            cfg.capture.constraints(),
            Duration::from_millis(cfg.capture.drain_timeout_ms),
        );

        let sink = create_sink(cfg.playback.sink, Path::new(&cfg.playback.output_dir))?;

        let credentials: Arc<dyn CredentialStore> = match &cfg.provider.settings_file {
            Some(path) => Arc::new(VoiceSettingsFile::new(path)),
            None => Arc::new(StaticCredentials::new(
                cfg.provider.name.clone(),
                cfg.provider.credentials(),
            )),
        };

        let config = SessionConfig {
            auto_play_replies: cfg.voice.auto_play_replies,
            ..SessionConfig::default()
        };

        Ok(Self::new(
            config,
            Box::new(transport),
            capture,
            PlaybackUnit::new(sink),
            credentials,
        ))
    }

    pub fn session_id(&self) -> &str {
        &self.config.session_id
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn is_recording(&self) -> bool {
        self.phase == SessionPhase::Recording
    }

    pub fn is_playing(&self) -> bool {
        self.playback.is_playing()
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn interim_transcript(&self) -> Option<&str> {
        self.interim.as_deref()
    }

    pub fn last_error(&self) -> Option<&LastError> {
        self.last_error.as_ref()
    }

    /// Watch the view-state
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshot_tx.subscribe()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let duration = Utc::now().signed_duration_since(self.started_at);

        SessionSnapshot {
            session_id: self.config.session_id.clone(),
            phase: self.phase,
            recording: self.is_recording(),
            playing: self.playback.is_playing(),
            interim_transcript: self.interim.clone(),
            notice: self.notice.clone(),
            last_error: self.last_error.clone(),
            messages: Arc::clone(&self.messages),
            stats: SessionStats {
                started_at: self.started_at,
                duration_secs: duration.num_milliseconds() as f64 / 1000.0,
                clips_sent: self.clips_sent,
                audio_bytes_sent: self.audio_bytes_sent,
                messages_count: self.messages.len(),
                replies_played: self.replies_played,
            },
        }
    }

    /// Open the channel
    ///
    /// Valid from `Idle`, `Closed` and `Error`; a no-op while already
    /// connecting or connected. A failed attempt leaves the session in
    /// `Error` and is not retried.
    pub async fn connect(&mut self) -> Result<()> {
        if !self.phase.can_connect() {
            debug!("Connect ignored while {}", self.phase);
            return Ok(());
        }

        info!("Connecting session {}", self.config.session_id);
        self.phase = SessionPhase::Connecting;
        self.last_error = None;
        self.publish();

        match self.transport.connect().await {
            Ok(inbound) => {
                self.inbound = Some(inbound);
                self.phase = SessionPhase::Connected;
                info!("Session {} connected", self.config.session_id);
                self.publish();
                Ok(())
            }
            Err(e) => {
                self.phase = SessionPhase::Error;
                Err(self.fail(e))
            }
        }
    }

    /// Begin recording an utterance
    pub async fn start_recording(&mut self) -> Result<()> {
        match self.phase {
            SessionPhase::Recording => {
                debug!("Already recording");
                return Ok(());
            }
            SessionPhase::Connected => {}
            other => {
                return Err(self.fail(VoiceError::Transmission(format!(
                    "Cannot start recording while {}",
                    other
                ))));
            }
        }

        let settings = match self.credentials.provider_settings().await {
            Ok(settings) => settings,
            Err(e) => {
                return Err(self.fail(VoiceError::Config(format!(
                    "Provider credentials unavailable: {:#}",
                    e
                ))));
            }
        };

        if let Err(e) = self.capture.start().await {
            return Err(self.fail(e));
        }

        let message = OutboundMessage::StartRecording {
            provider: settings.provider,
            credentials: settings.credentials,
        };
        if let Err(e) = self.transport.send(&message).await {
            // Without the server side there is nothing to record for
            let _ = self.capture.stop().await;
            return Err(self.fail(e));
        }

        self.phase = SessionPhase::Recording;
        self.interim = None;
        info!("Recording started");
        self.publish();

        Ok(())
    }

    /// Finish the utterance and transmit it
    ///
    /// Always returns to `Connected`, whether or not audio was captured.
    /// The user message is appended later, when `final_transcript` arrives.
    pub async fn stop_recording(&mut self) -> Result<()> {
        if self.phase != SessionPhase::Recording {
            debug!("Stop recording ignored while {}", self.phase);
            return Ok(());
        }

        let clip = self.capture.stop().await;
        self.phase = SessionPhase::Connected;
        self.publish();

        match clip.filter(|c| !c.is_empty()) {
            Some(clip) => {
                let message = OutboundMessage::AudioComplete {
                    audio_data: clip.to_base64(),
                    format: clip.format.wire_tag().to_string(),
                };
                if let Err(e) = self.transport.send(&message).await {
                    return Err(self.fail(e));
                }

                self.clips_sent += 1;
                self.audio_bytes_sent += clip.len();
                info!(
                    "Sent clip: {} bytes ({})",
                    clip.len(),
                    clip.format.wire_tag()
                );
            }
            None => info!("Recording stopped with no captured audio"),
        }

        if let Err(e) = self.transport.send(&OutboundMessage::StopRecording).await {
            return Err(self.fail(e));
        }

        self.publish();
        Ok(())
    }

    /// Send typed text; it joins the transcript as a user message
    pub async fn send_text(&mut self, text: &str) -> Result<()> {
        let text = text.trim();
        if text.is_empty() {
            debug!("Ignoring empty text message");
            return Ok(());
        }

        if !self.phase.is_connected() {
            return Err(self.fail(VoiceError::Transmission(format!(
                "Cannot send text while {}",
                self.phase
            ))));
        }

        let message = OutboundMessage::TextMessage {
            text: text.to_string(),
        };
        if let Err(e) = self.transport.send(&message).await {
            return Err(self.fail(e));
        }

        Arc::make_mut(&mut self.messages).push(ChatMessage::user(text));
        self.publish();
        Ok(())
    }

    /// Close the session from any phase
    ///
    /// A recording in progress is stopped first and its clip discarded.
    pub async fn disconnect(&mut self) {
        if self.phase == SessionPhase::Recording {
            if let Some(clip) = self.capture.stop().await {
                debug!("Discarded {} byte clip on disconnect", clip.len());
            }
        }

        self.playback.stop();
        self.inbound = None;

        if let Err(e) = self.transport.close().await {
            warn!("Failed to close channel: {}", e);
        }

        self.phase = SessionPhase::Closed;
        self.interim = None;
        info!("Session {} closed", self.config.session_id);
        self.publish();
    }

    /// Interrupt the reply being played
    pub fn stop_playback(&mut self) {
        if self.playback.stop() {
            self.publish();
        }
    }

    /// Wait for the next channel frame, capture fragment or playback report
    ///
    /// Cancel-safe, so it can race other futures in a `select!`.
    pub async fn next_event(&mut self) -> SessionEvent {
        tokio::select! {
            event = recv_or_pending(&mut self.inbound) => SessionEvent::Transport(
                event.unwrap_or(TransportEvent::Closed {
                    reason: Some("event stream ended".to_string()),
                }),
            ),
            fragment = self.capture.next_fragment() => SessionEvent::Fragment(fragment),
            report = self.playback.next_event() => SessionEvent::Playback(report),
        }
    }

    pub async fn handle_event(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::Transport(TransportEvent::Frame(raw)) => self.handle_frame(&raw),
            SessionEvent::Transport(TransportEvent::Closed { reason }) => {
                self.handle_closed(reason).await
            }
            SessionEvent::Fragment(fragment) => {
                self.capture.absorb(fragment);
            }
            SessionEvent::Playback(report) => self.handle_playback(report),
        }
    }

    /// Wait for one event and handle it
    pub async fn pump(&mut self) {
        let event = self.next_event().await;
        self.handle_event(event).await;
    }

    /// Entry point for raw inbound frames
    pub fn handle_frame(&mut self, raw: &str) {
        match InboundEvent::parse(raw) {
            Ok(event) => self.dispatch(event),
            Err(e) => {
                self.fail(e);
            }
        }
    }

    /// Apply one inbound event
    ///
    /// Events only count while connected; anything arriving after the
    /// session left `Connected`/`Recording` is dropped.
    pub fn dispatch(&mut self, event: InboundEvent) {
        if !self.phase.is_connected() {
            debug!("Dropping {} received while {}", event.tag(), self.phase);
            return;
        }

        match event {
            InboundEvent::Transcript { text } => {
                self.interim = Some(text);
            }
            InboundEvent::FinalTranscript { text } => {
                debug!("Final transcript: {}", text);
                Arc::make_mut(&mut self.messages).push(ChatMessage::user(text));
                self.interim = None;
            }
            InboundEvent::AiResponse { text, audio_url } => {
                debug!("Assistant reply: {}", text);
                Arc::make_mut(&mut self.messages).push(ChatMessage::assistant(text, audio_url));
            }
            InboundEvent::AudioResponse { audio_data, format } => {
                let bytes = match base64::engine::general_purpose::STANDARD.decode(&audio_data) {
                    Ok(bytes) if !bytes.is_empty() => bytes,
                    Ok(_) => {
                        self.fail(VoiceError::Protocol("audio_response carried no audio".to_string()));
                        return;
                    }
                    Err(e) => {
                        self.fail(VoiceError::Protocol(format!(
                            "audio_response is not valid base64: {}",
                            e
                        )));
                        return;
                    }
                };

                if self.config.auto_play_replies {
                    self.playback.play(AudioReply { bytes, format });
                } else {
                    debug!("Auto-play disabled; skipping {} byte reply", bytes.len());
                }
            }
            InboundEvent::Error { message } => {
                self.fail(VoiceError::Remote(message));
                return;
            }
            InboundEvent::RecordingStarted { message } => {
                info!("Server started recognition");
                self.notice = Some(message.unwrap_or_else(|| "Recording started".to_string()));
            }
            InboundEvent::RecordingStopped { message } => {
                info!("Server stopped recognition");
                self.notice = Some(message.unwrap_or_else(|| "Recording stopped".to_string()));
            }
        }

        self.publish();
    }

    async fn handle_closed(&mut self, reason: Option<String>) {
        self.inbound = None;

        if !self.phase.is_connected() {
            debug!("Channel closed while {}", self.phase);
            return;
        }

        if self.phase == SessionPhase::Recording {
            let _ = self.capture.stop().await;
        }

        // Release the writer half as well
        let _ = self.transport.close().await;

        self.phase = SessionPhase::Error;
        self.interim = None;
        self.fail(VoiceError::Connection(format!(
            "Channel closed unexpectedly ({})",
            reason.as_deref().unwrap_or("no reason")
        )));
    }

    fn handle_playback(&mut self, report: PlaybackEvent) {
        let clip = report.clip;
        match self.playback.settle(report) {
            Some(PlaybackOutcome::Finished) => {
                debug!("Reply clip {} finished", clip);
                self.replies_played += 1;
                self.publish();
            }
            Some(PlaybackOutcome::Failed(message)) => {
                self.fail(VoiceError::Playback(message));
            }
            None => {}
        }
    }

    /// Record `err` as the last error and publish it
    fn fail(&mut self, err: VoiceError) -> VoiceError {
        warn!("Session {}: {}", self.config.session_id, err);
        self.last_error = Some(LastError::from(&err));
        self.publish();
        err
    }

    fn publish(&self) {
        self.snapshot_tx.send_replace(self.snapshot());
    }
}

async fn recv_or_pending<T>(rx: &mut Option<mpsc::Receiver<T>>) -> Option<T> {
    match rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}
