use anyhow::{bail, Result};
use serde::Deserialize;
use std::path::PathBuf;

use crate::audio::{CaptureConstraints, CaptureSource, SinkKind};
use crate::session::ProviderCredentials;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub service: ServiceConfig,
    pub voice: VoiceConfig,
    pub capture: CaptureConfig,
    pub playback: PlaybackConfig,
    pub provider: ProviderConfig,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub name: String,
    pub http: HttpConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: "voicedesk".to_string(),
            http: HttpConfig::default(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub bind: String,
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".to_string(),
            port: 8090,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct VoiceConfig {
    /// WebSocket endpoint of the voice backend
    pub endpoint: String,
    pub connect_timeout_secs: u64,
    pub auto_play_replies: bool,
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            endpoint: "ws://localhost:8000/api/voice/chat".to_string(),
            connect_timeout_secs: 10,
            auto_play_replies: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptureSourceKind {
    Microphone,
    File,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    pub source: CaptureSourceKind,
    /// WAV file replayed when `source = "file"`
    pub file_path: Option<String>,
    pub sample_rate: u32,
    pub channels: u16,
    pub noise_suppression: bool,
    pub echo_cancellation: bool,
    pub mime_type: String,
    pub fallback_mime_type: String,
    pub fragment_bytes: usize,
    pub drain_timeout_ms: u64,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        let constraints = CaptureConstraints::default();
        Self {
            source: CaptureSourceKind::Microphone,
            file_path: None,
            sample_rate: constraints.sample_rate,
            channels: constraints.channels,
            noise_suppression: constraints.noise_suppression,
            echo_cancellation: constraints.echo_cancellation,
            mime_type: constraints.mime_type,
            fallback_mime_type: constraints.fallback_mime_type,
            // 100ms of 16kHz mono i16
            fragment_bytes: 3200,
            drain_timeout_ms: 2000,
        }
    }
}

impl CaptureConfig {
    pub fn constraints(&self) -> CaptureConstraints {
        CaptureConstraints {
            sample_rate: self.sample_rate,
            channels: self.channels,
            noise_suppression: self.noise_suppression,
            echo_cancellation: self.echo_cancellation,
            mime_type: self.mime_type.clone(),
            fallback_mime_type: self.fallback_mime_type.clone(),
        }
    }

    pub fn capture_source(&self) -> Result<CaptureSource> {
        match (self.source, &self.file_path) {
            (CaptureSourceKind::Microphone, _) => Ok(CaptureSource::Microphone),
            (CaptureSourceKind::File, Some(path)) => Ok(CaptureSource::File(PathBuf::from(path))),
            (CaptureSourceKind::File, None) => {
                bail!("capture.source = \"file\" requires capture.file_path")
            }
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    pub sink: SinkKind,
    /// Where `wav_dump` writes reply clips
    pub output_dir: String,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            sink: SinkKind::WavDump,
            output_dir: "replies".to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub name: String,
    pub app_id: String,
    pub api_key: String,
    pub api_secret: String,
    /// Persisted voice settings document; overrides the fields above
    pub settings_file: Option<String>,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            name: "xunfei".to_string(),
            app_id: String::new(),
            api_key: String::new(),
            api_secret: String::new(),
            settings_file: None,
        }
    }
}

impl ProviderConfig {
    pub fn credentials(&self) -> ProviderCredentials {
        ProviderCredentials {
            app_id: self.app_id.clone(),
            api_key: self.api_key.clone(),
            api_secret: self.api_secret.clone(),
        }
    }
}

impl Config {
    /// Load `path` (any extension the config crate knows) plus `VOICEDESK__*`
    /// environment overrides, e.g. `VOICEDESK__VOICE__ENDPOINT`
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .add_source(config::Environment::with_prefix("VOICEDESK").separator("__"))
            .build()?;

        Ok(settings.try_deserialize()?)
    }
}
