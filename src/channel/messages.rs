use serde::{Deserialize, Serialize};

use crate::error::{Result, VoiceError};
use crate::session::ProviderCredentials;

/// Message sent from the client to the voice endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundMessage {
    /// Opens a recognition session on the server
    StartRecording {
        provider: String,
        credentials: ProviderCredentials,
    },

    /// Closes the server-side recognition session
    StopRecording,

    /// One finalized clip
    AudioComplete {
        /// Base64-encoded clip bytes
        audio_data: String,
        /// Container tag ("webm", "ogg", "wav")
        format: String,
    },

    /// Typed text, answered with an `ai_response`
    TextMessage { text: String },
}

impl OutboundMessage {
    pub fn tag(&self) -> &'static str {
        match self {
            OutboundMessage::StartRecording { .. } => "start_recording",
            OutboundMessage::StopRecording => "stop_recording",
            OutboundMessage::AudioComplete { .. } => "audio_complete",
            OutboundMessage::TextMessage { .. } => "text_message",
        }
    }
}

/// Event received from the voice endpoint
///
/// Frames are validated into this closed set at the boundary; anything else
/// (bad JSON, unknown `type`, missing fields) is a protocol error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundEvent {
    /// Interim recognition result
    Transcript { text: String },

    /// Final recognition result for the utterance
    FinalTranscript { text: String },

    /// Assistant reply text
    AiResponse {
        text: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        audio_url: Option<String>,
    },

    /// Synthesized speech for the reply
    AudioResponse {
        /// Base64-encoded audio
        audio_data: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        format: Option<String>,
    },

    /// Server-side failure
    Error { message: String },

    /// Server acknowledged `start_recording`
    RecordingStarted {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },

    /// Server acknowledged `stop_recording`
    RecordingStopped {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
}

impl InboundEvent {
    /// Parse one text frame
    pub fn parse(raw: &str) -> Result<Self> {
        serde_json::from_str(raw)
            .map_err(|e| VoiceError::Protocol(format!("Malformed inbound frame: {}", e)))
    }

    pub fn tag(&self) -> &'static str {
        match self {
            InboundEvent::Transcript { .. } => "transcript",
            InboundEvent::FinalTranscript { .. } => "final_transcript",
            InboundEvent::AiResponse { .. } => "ai_response",
            InboundEvent::AudioResponse { .. } => "audio_response",
            InboundEvent::Error { .. } => "error",
            InboundEvent::RecordingStarted { .. } => "recording_started",
            InboundEvent::RecordingStopped { .. } => "recording_stopped",
        }
    }
}
