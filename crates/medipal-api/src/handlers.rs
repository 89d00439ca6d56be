//! Route handler functions for the chat API.
//!
//! Handlers read and drive the shared `SessionManager`. Sending runs in a
//! background task so the request returns immediately; clients follow the
//! reply through `GET /chat/stream`.

use std::convert::Infallible;
use std::time::Duration;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::Json;
use serde::{Deserialize, Serialize};
use tokio_stream::wrappers::WatchStream;
use tokio_stream::StreamExt;
use tracing::{debug, info, warn};

use medipal_core::types::ChatState;

use crate::error::ApiError;
use crate::state::AppState;

// =============================================================================
// Request / response types
// =============================================================================

/// Request body for POST /chat/messages.
#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    pub text: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_secs: u64,
    /// Whether a live session with the model exists.
    pub initialized: bool,
}

// =============================================================================
// Handlers
// =============================================================================

/// GET /health - health check.
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: state.start_time.elapsed().as_secs(),
        initialized: state.manager.is_initialized(),
    })
}

/// GET /chat - current conversation state.
pub async fn get_chat(State(state): State<AppState>) -> Json<ChatState> {
    Json(state.manager.state())
}

/// POST /chat/messages - submit a user message.
///
/// Blank text is rejected and submission is refused while a reply is
/// still streaming. The exchange itself runs in the background.
pub async fn post_message(
    State(state): State<AppState>,
    Json(request): Json<SendMessageRequest>,
) -> Result<(StatusCode, Json<ChatState>), ApiError> {
    let text = request.text.trim().to_string();
    if text.is_empty() {
        return Err(ApiError::BadRequest(
            "Message text must not be empty".to_string(),
        ));
    }

    if state.manager.state().loading {
        return Err(ApiError::Conflict(
            "A reply is still being generated".to_string(),
        ));
    }
    let Some(ticket) = state.submission.claim() else {
        return Err(ApiError::Conflict(
            "A reply is still being generated".to_string(),
        ));
    };

    let manager = state.manager.clone();
    let submission = state.submission.clone();
    tokio::spawn(async move {
        if let Err(e) = manager.send_message(&text).await {
            debug!(error = %e, "Background send finished with an error");
        }
        submission.release(ticket);
    });

    info!("Message accepted");
    Ok((StatusCode::ACCEPTED, Json(state.manager.state())))
}

/// DELETE /chat - forget the conversation.
pub async fn delete_chat(State(state): State<AppState>) -> Json<ChatState> {
    state.manager.clear_chat();
    // A send orphaned by the clear no longer blocks new submissions.
    state.submission.reset();
    Json(state.manager.state())
}

/// GET /chat/stream - SSE stream of `state` events.
///
/// The current state is sent first, then one event per transition.
pub async fn stream(
    State(state): State<AppState>,
) -> Sse<impl tokio_stream::Stream<Item = Result<Event, Infallible>> + Send> {
    let rx = state.manager.subscribe();
    let stream = WatchStream::new(rx).filter_map(|chat| match serde_json::to_string(&chat) {
        Ok(data) => Some(Ok::<_, Infallible>(
            Event::default().event("state").data(data),
        )),
        Err(e) => {
            warn!(error = %e, "Failed to serialize chat state, event skipped");
            None
        }
    });

    Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(15)))
}
