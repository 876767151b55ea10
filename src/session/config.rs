use serde::{Deserialize, Serialize};

/// Configuration for a voice chat session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Unique session identifier (e.g., "voice-3f2c...")
    pub session_id: String,

    /// Play `audio_response` replies as they arrive
    /// Default: true
    pub auto_play_replies: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            session_id: format!("voice-{}", uuid::Uuid::new_v4()),
            auto_play_replies: true,
        }
    }
}
