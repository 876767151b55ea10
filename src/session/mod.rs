//! Voice chat session management
//!
//! This module provides the `VoiceSession` controller that manages:
//! - The channel lifecycle (connect, unexpected close, disconnect)
//! - Recording cycles and clip transmission
//! - Inbound event dispatch into the transcript
//! - Reply playback and the published view-state
//!
//! `driver::spawn` runs a session on its own task behind a `SessionHandle`.

mod config;
mod credentials;
pub mod driver;
mod session;
mod state;
mod stats;

pub use config::SessionConfig;
pub use credentials::{
    CredentialStore, ProviderCredentials, ProviderSettings, StaticCredentials, VoiceSettingsFile,
};
pub use driver::{spawn, SessionHandle};
pub use session::{SessionEvent, VoiceSession};
pub use state::{SessionPhase, SessionSnapshot};
pub use stats::{ChatMessage, Role, SessionStats};
