use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use super::stats::{ChatMessage, SessionStats};
use crate::error::LastError;

/// Session lifecycle
///
/// `Idle -> Connecting -> Connected <-> Recording`, any phase `-> Closed`.
/// `Error` is entered when connecting fails or the channel drops; `connect`
/// leaves it again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    Idle,
    Connecting,
    Connected,
    Recording,
    Closed,
    Error,
}

impl SessionPhase {
    /// The channel is open
    pub fn is_connected(self) -> bool {
        matches!(self, SessionPhase::Connected | SessionPhase::Recording)
    }

    /// `connect` may start from here
    pub fn can_connect(self) -> bool {
        matches!(
            self,
            SessionPhase::Idle | SessionPhase::Closed | SessionPhase::Error
        )
    }
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionPhase::Idle => "idle",
            SessionPhase::Connecting => "connecting",
            SessionPhase::Connected => "connected",
            SessionPhase::Recording => "recording",
            SessionPhase::Closed => "closed",
            SessionPhase::Error => "error",
        };
        f.write_str(name)
    }
}

/// View-state published to UI bindings after every change
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub session_id: String,
    pub phase: SessionPhase,
    pub recording: bool,
    pub playing: bool,
    /// Latest interim transcript of the current utterance
    pub interim_transcript: Option<String>,
    /// Latest acknowledgement from the server
    pub notice: Option<String>,
    pub last_error: Option<LastError>,
    pub messages: Arc<Vec<ChatMessage>>,
    pub stats: SessionStats,
}
