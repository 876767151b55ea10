use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use tokio::sync::mpsc;
use tracing::debug;

/// Container format of a captured clip
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClipFormat {
    /// `audio/webm;codecs=opus`
    WebmOpus,
    /// `audio/ogg;codecs=opus`
    OggOpus,
    /// `audio/wav`
    Wav,
}

impl ClipFormat {
    /// Recognize a mime type, e.g. `audio/webm;codecs=opus`
    pub fn from_mime(mime: &str) -> Option<Self> {
        let normalized: String = mime
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect::<String>()
            .to_ascii_lowercase();

        let mut parts = normalized.split(';');
        let base = parts.next().unwrap_or_default();
        let codecs = parts
            .find_map(|p| p.strip_prefix("codecs="))
            .map(|c| c.trim_matches('"').to_string());

        let opus_or_unspecified = codecs.as_deref().map_or(true, |c| c == "opus");

        match base {
            "audio/webm" if opus_or_unspecified => Some(ClipFormat::WebmOpus),
            "audio/ogg" if opus_or_unspecified => Some(ClipFormat::OggOpus),
            "audio/wav" | "audio/wave" | "audio/x-wav" if codecs.is_none() => Some(ClipFormat::Wav),
            _ => None,
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            ClipFormat::WebmOpus => "audio/webm;codecs=opus",
            ClipFormat::OggOpus => "audio/ogg;codecs=opus",
            ClipFormat::Wav => "audio/wav",
        }
    }

    /// Tag carried in the `format` field of `audio_complete`
    pub fn wire_tag(&self) -> &'static str {
        match self {
            ClipFormat::WebmOpus => "webm",
            ClipFormat::OggOpus => "ogg",
            ClipFormat::Wav => "wav",
        }
    }
}

impl fmt::Display for ClipFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mime_type())
    }
}

/// Constraints requested from a capture backend
#[derive(Debug, Clone, PartialEq)]
pub struct CaptureConstraints {
    /// Sample rate in Hz (the recognizer expects 16kHz)
    pub sample_rate: u32,
    /// Number of channels (1 = mono)
    pub channels: u16,
    /// Ask the device for noise suppression (advisory)
    pub noise_suppression: bool,
    /// Ask the device for echo cancellation (advisory)
    pub echo_cancellation: bool,
    /// Preferred clip mime type
    pub mime_type: String,
    /// Used silently when the backend cannot produce `mime_type`
    pub fallback_mime_type: String,
}

impl Default for CaptureConstraints {
    fn default() -> Self {
        Self {
            sample_rate: 16000,
            channels: 1,
            noise_suppression: true,
            echo_cancellation: true,
            mime_type: ClipFormat::WebmOpus.mime_type().to_string(),
            fallback_mime_type: ClipFormat::Wav.mime_type().to_string(),
        }
    }
}

impl CaptureConstraints {
    /// Pick the clip format for a backend: preferred if supported, else fallback
    pub fn negotiate(&self, backend: &dyn CaptureBackend) -> Result<ClipFormat> {
        let preferred = ClipFormat::from_mime(&self.mime_type);
        if let Some(format) = preferred.filter(|f| backend.supports(*f)) {
            return Ok(format);
        }

        match ClipFormat::from_mime(&self.fallback_mime_type) {
            Some(format) if backend.supports(format) => {
                debug!(
                    "{} cannot produce {}, falling back to {}",
                    backend.name(),
                    self.mime_type,
                    format
                );
                Ok(format)
            }
            _ => bail!(
                "{} supports neither {} nor {}",
                backend.name(),
                self.mime_type,
                self.fallback_mime_type
            ),
        }
    }
}

/// Audio capture backend trait
///
/// Implementations:
/// - `FileBackend`: replays a WAV file (testing, headless use)
/// - `MicrophoneBackend`: default input device via cpal (`device-audio` feature)
#[async_trait::async_trait]
pub trait CaptureBackend: Send {
    /// Start capturing
    ///
    /// Returns a channel receiver yielding encoded clip fragments in order.
    /// The channel closes once the backend has emitted its last fragment
    /// after `stop`; it cannot be restarted.
    async fn start(
        &mut self,
        constraints: &CaptureConstraints,
        format: ClipFormat,
    ) -> Result<mpsc::Receiver<Vec<u8>>>;

    /// Stop capturing and release the device
    async fn stop(&mut self) -> Result<()>;

    /// Whether this backend can produce clips in `format`
    fn supports(&self, format: ClipFormat) -> bool;

    /// Check if backend is currently capturing
    fn is_capturing(&self) -> bool;

    /// Get backend name for logging
    fn name(&self) -> &str;
}

/// Capture source type
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureSource {
    /// Default input device
    Microphone,
    /// WAV file replay
    File(PathBuf),
}

/// Capture backend factory
pub struct CaptureBackendFactory;

impl CaptureBackendFactory {
    /// Create a capture backend for `source`
    ///
    /// `fragment_bytes` bounds the size of fragments for backends that stream.
    pub fn create(source: CaptureSource, fragment_bytes: usize) -> Result<Box<dyn CaptureBackend>> {
        match source {
            CaptureSource::Microphone => {
                #[cfg(feature = "device-audio")]
                {
                    use super::microphone::MicrophoneBackend;
                    let _ = fragment_bytes;
                    Ok(Box::new(MicrophoneBackend::new()))
                }

                #[cfg(not(feature = "device-audio"))]
                {
                    let _ = fragment_bytes;
                    bail!("Microphone capture requires the `device-audio` feature")
                }
            }

            CaptureSource::File(path) => {
                use super::file::FileBackend;
                Ok(Box::new(FileBackend::new(path, fragment_bytes)))
            }
        }
    }
}
