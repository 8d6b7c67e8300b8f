//! Axum HTTP handlers for the SSE transport.
//!
//! `GET <sse_path>` opens a session and streams its replies; `POST
//! <post_path>?sessionId=…` feeds one JSON-RPC message into that session.

use std::convert::Infallible;

use axum::{
    body::Bytes,
    extract::{Query, State},
    http::StatusCode,
    response::sse::{Event, Sse},
    Json,
};
use futures_util::stream::{self, Stream};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;

use super::error::AppError;
use super::stream::pump;
use super::SseState;

/// Events buffered between the pump and the HTTP body.
const EVENT_BUFFER: usize = 32;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

/// Query string of a POST.
#[derive(Debug, Deserialize)]
pub struct MessageQuery {
    #[serde(rename = "sessionId")]
    pub session_id: Option<String>,
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

/// Opens a session and streams its events.
pub async fn connect(
    State(state): State<SseState>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    let session_id = state
        .sessions
        .open()
        .await
        .ok_or(AppError::SessionUnavailable)?;
    tracing::info!(session_id = %session_id, "SSE client connected");

    let (tx, rx) = mpsc::channel(EVENT_BUFFER);
    tokio::spawn(pump(state, session_id, tx));

    let events = stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|event| (Ok(event), rx))
    });
    Ok(Sse::new(events))
}

/// Dispatches one message and queues the reply on the session.
pub async fn post_message(
    State(state): State<SseState>,
    Query(query): Query<MessageQuery>,
    body: Bytes,
) -> Result<StatusCode, AppError> {
    let payload: Value =
        serde_json::from_slice(&body).map_err(|e| AppError::InvalidJson(e.to_string()))?;

    let session_id = query.session_id.ok_or(AppError::MissingSessionId)?;
    if !state.sessions.exists(&session_id).await {
        return Err(AppError::SessionNotFound(session_id));
    }

    let Some(reply) = state.dispatcher.handle_value(payload).await else {
        return Ok(StatusCode::ACCEPTED);
    };

    match reply.to_value() {
        Ok(value) => {
            if !state.sessions.deliver(&session_id, value).await {
                tracing::warn!(session_id = %session_id, "failed to queue reply");
            }
        }
        Err(e) => {
            tracing::warn!(session_id = %session_id, error = %e, "failed to encode reply");
        }
    }
    Ok(StatusCode::ACCEPTED)
}
