//! HTTP + server-sent events transport.
//!
//! ```text
//! GET  /sse                      open a session, stream replies
//! POST /message?sessionId=<id>   submit one JSON-RPC message (202)
//! GET  /health                   liveness probe
//! ```
//!
//! Replies to POSTed messages travel through the session store and arrive
//! on the session's event stream, not in the POST response.

pub mod error;
pub mod handlers;
pub mod stream;

use std::future::Future;
use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use tokio::net::TcpListener;

use crate::config::SseConfig;
use crate::error::ServerError;
use crate::logging;
use crate::mcp::Dispatcher;
use crate::session::SessionManager;

pub use error::AppError;
pub use stream::{StreamEnd, StreamSettings};

/// Shared state for the SSE handlers.
#[derive(Debug, Clone)]
pub struct SseState {
    pub dispatcher: Dispatcher,
    pub sessions: SessionManager,
    pub settings: Arc<StreamSettings>,
}

impl SseState {
    pub fn new(dispatcher: Dispatcher, sessions: SessionManager, settings: StreamSettings) -> Self {
        Self {
            dispatcher,
            sessions,
            settings: Arc::new(settings),
        }
    }
}

impl StreamSettings {
    /// Stream settings from the transport configuration.
    #[must_use]
    pub fn from_config(config: &SseConfig) -> Self {
        Self {
            post_path: config.post_path.clone(),
            heartbeat: config.heartbeat_interval(),
            poll_interval: config.poll_interval(),
            keep_alive_window: config.keep_alive_window(),
        }
    }
}

/// Builds the router with the default paths.
pub fn build_app(state: SseState) -> Router {
    build_app_with_paths(state, "/sse", "/message")
}

/// Builds the router, mounting the stream and POST endpoints at the given
/// paths.
pub fn build_app_with_paths(state: SseState, sse_path: &str, post_path: &str) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route(sse_path, get(handlers::connect))
        .route(post_path, post(handlers::post_message))
        .layer(middleware::from_fn(logging::request_logging_middleware))
        .with_state(state)
}

/// Serves the SSE transport until `shutdown` resolves, then removes every
/// session this process opened.
///
/// # Errors
///
/// Returns an error if the address is invalid or the listener fails.
pub async fn serve(
    config: &SseConfig,
    state: SseState,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<(), ServerError> {
    let addr = config.socket_addr()?;
    let sessions = state.sessions.clone();
    let app = build_app_with_paths(state, &config.sse_path, &config.post_path);

    let listener = TcpListener::bind(addr).await?;
    tracing::info!(
        bind_addr = %listener.local_addr()?,
        sse_path = %config.sse_path,
        post_path = %config.post_path,
        "SSE server listening"
    );

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await;

    sessions.shutdown().await;
    served?;
    Ok(())
}

/// Resolves on Ctrl+C, or SIGTERM on Unix.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "could not listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "could not listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => tracing::info!("Received Ctrl+C, initiating graceful shutdown"),
        () = terminate => tracing::info!("Received SIGTERM, initiating graceful shutdown"),
    }
}
