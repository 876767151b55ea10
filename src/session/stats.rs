use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Who authored a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
}

/// A single transcript entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: Uuid,

    pub role: Role,

    /// Message text
    pub content: String,

    /// When this message was appended
    pub timestamp: DateTime<Utc>,

    /// Reply audio location, when the server provides one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_url: Option<String>,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content.into(), None)
    }

    pub fn assistant(content: impl Into<String>, audio_url: Option<String>) -> Self {
        Self::new(Role::Assistant, content.into(), audio_url)
    }

    fn new(role: Role, content: String, audio_url: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            role,
            content,
            timestamp: Utc::now(),
            audio_url,
        }
    }
}

/// Statistics about a voice session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionStats {
    /// When the session was created
    pub started_at: DateTime<Utc>,

    /// Seconds since `started_at`
    pub duration_secs: f64,

    /// Clips transmitted with `audio_complete`
    pub clips_sent: usize,

    /// Clip bytes transmitted (before base64)
    pub audio_bytes_sent: usize,

    /// Messages in the transcript
    pub messages_count: usize,

    /// Reply clips that played to the end
    pub replies_played: usize,
}
