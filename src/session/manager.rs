//! Session lifecycle on top of a [`SessionStore`].
//!
//! The manager mints session ids, remembers which sessions this process
//! opened so they can be removed on shutdown, and pairs each session with a
//! [`Notify`] so a delivered reply wakes the SSE stream without waiting for
//! the next poll.

use std::sync::Arc;

use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::Notify;
use uuid::Uuid;

use super::{SessionMessage, SessionStore};

/// Opens, feeds and closes sessions.
#[derive(Clone)]
pub struct SessionManager {
    store: Arc<dyn SessionStore>,
    /// Sessions opened by this process, with their wake-up handles.
    open: Arc<DashMap<String, Arc<Notify>>>,
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("open_sessions", &self.open.len())
            .finish_non_exhaustive()
    }
}

impl SessionManager {
    /// Wraps a session store.
    pub fn new(store: Arc<dyn SessionStore>) -> Self {
        Self {
            store,
            open: Arc::new(DashMap::new()),
        }
    }

    /// The underlying store.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn SessionStore> {
        &self.store
    }

    /// Registers a fresh session, returning its id.
    pub async fn open(&self) -> Option<String> {
        let session_id = Uuid::new_v4().to_string();
        if !self.store.register_session(&session_id).await {
            return None;
        }
        self.open
            .insert(session_id.clone(), Arc::new(Notify::new()));
        tracing::debug!(session_id = %session_id, "session opened");
        Some(session_id)
    }

    /// Returns `true` if the session is live, refreshing its activity.
    pub async fn exists(&self, session_id: &str) -> bool {
        self.store.session_exists(session_id).await
    }

    /// Queues a reply and wakes the session's stream.
    pub async fn deliver(&self, session_id: &str, payload: Value) -> bool {
        let queued = self.store.send_message(session_id, payload).await;
        if queued {
            if let Some(notify) = self.open.get(session_id) {
                notify.notify_one();
            }
        }
        queued
    }

    /// Messages after `cursor`.
    pub async fn messages_after(&self, session_id: &str, cursor: Option<u64>) -> Vec<SessionMessage> {
        self.store.get_messages(session_id, cursor).await
    }

    /// The wake-up handle for a session, created on first use.
    ///
    /// Sessions opened by another process never get notified here; their
    /// streams fall back to polling.
    #[must_use]
    pub fn notifier(&self, session_id: &str) -> Arc<Notify> {
        Arc::clone(
            self.open
                .entry(session_id.to_string())
                .or_insert_with(|| Arc::new(Notify::new()))
                .value(),
        )
    }

    /// Removes a session from the store and forgets it.
    pub async fn close(&self, session_id: &str) -> bool {
        self.open.remove(session_id);
        let removed = self.store.remove_session(session_id).await;
        tracing::debug!(session_id = %session_id, removed, "session closed");
        removed
    }

    /// Number of sessions opened by this process and not yet closed.
    #[must_use]
    pub fn open_count(&self) -> usize {
        self.open.len()
    }

    /// Removes every session this process opened.
    pub async fn shutdown(&self) {
        let ids: Vec<String> = self.open.iter().map(|e| e.key().clone()).collect();
        if !ids.is_empty() {
            tracing::info!(sessions = ids.len(), "removing open sessions");
        }
        for session_id in ids {
            self.close(&session_id).await;
        }
    }
}
