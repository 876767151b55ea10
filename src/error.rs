//! Error types for voice chat sessions

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Voice session errors
///
/// None of these are fatal: every variant is recorded as the session's
/// last error and the caller can always try `connect` again.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VoiceError {
    /// Channel unreachable or closed unexpectedly
    #[error("Connection error: {0}")]
    Connection(String),

    /// Microphone permission denied, device unavailable, unsupported format
    #[error("Capture error: {0}")]
    Capture(String),

    /// Send attempted while the channel is not connected
    #[error("Transmission error: {0}")]
    Transmission(String),

    /// Reply audio could not be decoded or played
    #[error("Playback error: {0}")]
    Playback(String),

    /// Malformed inbound frame
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Error reported by the voice backend itself
    #[error("Server error: {0}")]
    Remote(String),

    /// Invalid configuration or missing credentials
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// The session driver is no longer running
    #[error("Session is closed")]
    SessionClosed,
}

impl VoiceError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            VoiceError::Connection(_) => ErrorKind::Connection,
            VoiceError::Capture(_) => ErrorKind::Capture,
            VoiceError::Transmission(_) => ErrorKind::Transmission,
            VoiceError::Playback(_) => ErrorKind::Playback,
            VoiceError::Protocol(_) => ErrorKind::Protocol,
            VoiceError::Remote(_) => ErrorKind::Remote,
            VoiceError::Config(_) => ErrorKind::Config,
            VoiceError::SessionClosed => ErrorKind::SessionClosed,
        }
    }

    /// Collapse an `anyhow` chain from a device or file layer into a capture error
    pub fn capture(err: anyhow::Error) -> Self {
        VoiceError::Capture(format!("{:#}", err))
    }
}

/// Error kind, as exposed to UI bindings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Connection,
    Capture,
    Transmission,
    Playback,
    Protocol,
    Remote,
    Config,
    SessionClosed,
}

/// The most recent error observed by a session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LastError {
    pub kind: ErrorKind,
    pub message: String,
    pub at: DateTime<Utc>,
}

impl From<&VoiceError> for LastError {
    fn from(err: &VoiceError) -> Self {
        Self {
            kind: err.kind(),
            message: err.to_string(),
            at: Utc::now(),
        }
    }
}

/// Result type for session operations
pub type Result<T> = std::result::Result<T, VoiceError>;
