use super::state::AppState;
use crate::error::{ErrorKind, VoiceError};
use crate::session::{ChatMessage, SessionSnapshot};
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, warn};

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct SendTextRequest {
    pub text: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub kind: ErrorKind,
}

impl IntoResponse for VoiceError {
    fn into_response(self) -> Response {
        let status = match self.kind() {
            ErrorKind::Transmission | ErrorKind::SessionClosed => StatusCode::CONFLICT,
            ErrorKind::Connection => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if status.is_server_error() {
            error!("Request failed: {}", self);
        } else {
            warn!("Request rejected: {}", self);
        }

        (
            status,
            Json(ErrorResponse {
                error: self.to_string(),
                kind: self.kind(),
            }),
        )
            .into_response()
    }
}

/// Successful commands answer with the resulting view-state
fn snapshot_response(state: &AppState) -> Response {
    (StatusCode::OK, Json(state.session.snapshot())).into_response()
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /session
pub async fn get_session(State(state): State<AppState>) -> Json<SessionSnapshot> {
    Json(state.session.snapshot())
}

/// GET /session/messages
pub async fn get_messages(State(state): State<AppState>) -> Json<Arc<Vec<ChatMessage>>> {
    Json(state.session.snapshot().messages)
}

/// POST /session/connect
pub async fn connect(State(state): State<AppState>) -> Response {
    info!("Connect requested");
    match state.session.connect().await {
        Ok(()) => snapshot_response(&state),
        Err(e) => e.into_response(),
    }
}

/// POST /session/disconnect
pub async fn disconnect(State(state): State<AppState>) -> Response {
    info!("Disconnect requested");
    match state.session.disconnect().await {
        Ok(()) => snapshot_response(&state),
        Err(e) => e.into_response(),
    }
}

/// POST /session/record/start
pub async fn start_recording(State(state): State<AppState>) -> Response {
    match state.session.start_recording().await {
        Ok(()) => snapshot_response(&state),
        Err(e) => e.into_response(),
    }
}

/// POST /session/record/stop
pub async fn stop_recording(State(state): State<AppState>) -> Response {
    match state.session.stop_recording().await {
        Ok(()) => snapshot_response(&state),
        Err(e) => e.into_response(),
    }
}

/// POST /session/text
pub async fn send_text(
    State(state): State<AppState>,
    Json(req): Json<SendTextRequest>,
) -> Response {
    match state.session.send_text(req.text).await {
        Ok(()) => snapshot_response(&state),
        Err(e) => e.into_response(),
    }
}

/// POST /session/playback/stop
pub async fn stop_playback(State(state): State<AppState>) -> Response {
    match state.session.stop_playback().await {
        Ok(()) => snapshot_response(&state),
        Err(e) => e.into_response(),
    }
}

/// GET /health
/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}
