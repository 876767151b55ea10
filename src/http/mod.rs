//! HTTP API for UI bindings
//!
//! This module exposes one voice session over REST:
//! - GET /health - Health check
//! - GET /session - Current view-state snapshot
//! - GET /session/messages - Transcript so far
//! - POST /session/connect - Open the channel
//! - POST /session/disconnect - Close the session
//! - POST /session/record/start - Start an utterance
//! - POST /session/record/stop - Finish and send the utterance
//! - POST /session/text - Send a typed message
//! - POST /session/playback/stop - Interrupt the reply being played

mod handlers;
mod routes;
mod state;

pub use handlers::ErrorResponse;
pub use routes::create_router;
pub use state::AppState;
