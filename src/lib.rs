pub mod audio;
pub mod channel;
pub mod config;
pub mod error;
pub mod http;
pub mod repl;
pub mod session;

pub use audio::{
    AudioCapture, AudioReply, CaptureBackend, CaptureBackendFactory, CaptureConstraints,
    CaptureSource, Clip, ClipFormat, PlaybackUnit,
};
pub use channel::{InboundEvent, OutboundMessage, Transport, TransportEvent, WebSocketTransport};
pub use config::Config;
pub use error::{ErrorKind, LastError, VoiceError};
pub use http::{create_router, AppState};
pub use session::{
    ChatMessage, Role, SessionConfig, SessionHandle, SessionPhase, SessionSnapshot, SessionStats,
    VoiceSession,
};
