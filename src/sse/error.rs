//! HTTP-facing errors for the SSE transport.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::json;
use thiserror::Error;

use crate::mcp::protocol::JsonRpcError;

/// Failures a client can see from the SSE endpoints.
#[derive(Debug, Error)]
pub enum AppError {
    /// The POST body is not JSON.
    #[error("request body is not valid JSON: {0}")]
    InvalidJson(String),

    /// The POST lacks a `sessionId` query parameter.
    #[error("missing sessionId query parameter")]
    MissingSessionId,

    /// The session does not exist or has expired.
    #[error("session not found: {0}")]
    SessionNotFound(String),

    /// A new session could not be registered.
    #[error("session store unavailable")]
    SessionUnavailable,
}

/// Error body for non-protocol failures.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub code: String,
    pub message: String,
    pub details: serde_json::Value,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match self {
            Self::InvalidJson(detail) => {
                tracing::debug!(error = %detail, "rejected POST body");
                return (StatusCode::BAD_REQUEST, Json(JsonRpcError::parse_error())).into_response();
            }
            Self::MissingSessionId => (
                StatusCode::BAD_REQUEST,
                "missing_session_id",
                "sessionId query parameter is required".to_string(),
            ),
            Self::SessionNotFound(session_id) => (
                StatusCode::NOT_FOUND,
                "session_not_found",
                format!("session {session_id} not found or expired"),
            ),
            Self::SessionUnavailable => {
                tracing::error!("failed to register SSE session");
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "session_unavailable",
                    "could not open a session".to_string(),
                )
            }
        };

        (
            status,
            Json(ErrorResponse {
                code: code.to_string(),
                message,
                details: json!({}),
            }),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes() {
        assert_eq!(
            AppError::InvalidJson("eof".into()).into_response().status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError::MissingSessionId.into_response().status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError::SessionNotFound("x".into()).into_response().status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            AppError::SessionUnavailable.into_response().status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }
}
