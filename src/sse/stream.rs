//! The per-connection event pump.
//!
//! One task per SSE client. It announces the POST endpoint, then forwards
//! queued replies in id order, interleaving heartbeat comments, until the
//! client goes away, the session disappears, or the keep-alive window after
//! the first reply runs out. The session is removed however the task ends.

use std::time::{Duration, Instant};

use axum::response::sse::Event;
use chrono::Utc;
use tokio::sync::mpsc;

use super::SseState;
use crate::session::SessionManager;

/// Timing and addressing for event streams.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamSettings {
    /// Path announced in the `endpoint` event.
    pub post_path: String,
    /// Heartbeat period; `None` disables heartbeats.
    pub heartbeat: Option<Duration>,
    /// Fallback queue poll period.
    pub poll_interval: Duration,
    /// Stream lifetime after the first delivered reply.
    pub keep_alive_window: Option<Duration>,
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            post_path: "/message".to_string(),
            heartbeat: Some(Duration::from_secs(30)),
            poll_interval: Duration::from_millis(100),
            keep_alive_window: Some(Duration::from_secs(60)),
        }
    }
}

/// Why a stream ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamEnd {
    /// The client disconnected.
    Disconnected,
    /// The session expired or was removed.
    SessionGone,
    /// The keep-alive window elapsed.
    WindowElapsed,
}

/// Removes the session when dropped, including on task abort.
struct SessionGuard {
    sessions: SessionManager,
    session_id: String,
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        let sessions = self.sessions.clone();
        let session_id = std::mem::take(&mut self.session_id);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    sessions.close(&session_id).await;
                });
            }
            Err(_) => {
                tracing::warn!(session_id = %session_id, "no runtime to remove session on drop");
            }
        }
    }
}

/// The initial event telling the client where to POST.
#[must_use]
pub fn endpoint_event(post_path: &str, session_id: &str) -> Event {
    Event::default()
        .event("endpoint")
        .data(format!("{post_path}?sessionId={session_id}"))
}

fn heartbeat_event() -> Event {
    Event::default().comment(format!("heartbeat {}", Utc::now().timestamp()))
}

/// Runs the pump for one session until it ends.
pub async fn pump(state: SseState, session_id: String, tx: mpsc::Sender<Event>) -> StreamEnd {
    let _guard = SessionGuard {
        sessions: state.sessions.clone(),
        session_id: session_id.clone(),
    };
    let settings = &state.settings;

    if tx
        .send(endpoint_event(&settings.post_path, &session_id))
        .await
        .is_err()
    {
        return StreamEnd::Disconnected;
    }

    let notify = state.sessions.notifier(&session_id);
    let mut cursor: Option<u64> = None;
    let mut last_heartbeat = Instant::now();
    let mut first_reply_at: Option<Instant> = None;

    let end = loop {
        if !state.sessions.exists(&session_id).await {
            break StreamEnd::SessionGone;
        }

        for message in state.sessions.messages_after(&session_id, cursor).await {
            cursor = Some(message.id);
            let data = match serde_json::to_string(&message.data) {
                Ok(data) => data,
                Err(e) => {
                    tracing::warn!(session_id = %session_id, message_id = message.id, error = %e, "dropping unserialisable message");
                    continue;
                }
            };
            if tx.send(Event::default().event("message").data(data)).await.is_err() {
                return StreamEnd::Disconnected;
            }
            first_reply_at.get_or_insert_with(Instant::now);
        }

        if let (Some(window), Some(first)) = (settings.keep_alive_window, first_reply_at) {
            if first.elapsed() >= window {
                break StreamEnd::WindowElapsed;
            }
        }

        if let Some(every) = settings.heartbeat {
            if last_heartbeat.elapsed() >= every {
                if tx.send(heartbeat_event()).await.is_err() {
                    return StreamEnd::Disconnected;
                }
                last_heartbeat = Instant::now();
            }
        }

        tokio::select! {
            () = tx.closed() => break StreamEnd::Disconnected,
            () = notify.notified() => {}
            () = tokio::time::sleep(settings.poll_interval) => {}
        }
    };

    tracing::debug!(session_id = %session_id, reason = ?end, "event stream ended");
    end
}
