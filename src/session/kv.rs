//! Key-value backed session storage.
//!
//! Key layout, all sharing the session TTL:
//!
//! ```text
//! <prefix>session:<id>            hash: created_at, expires_at, last_activity
//! <prefix>session:<id>:messages   list of JSON-encoded messages
//! ```
//!
//! A message's id is its position in the list. The push that stores a
//! message is the only step that assigns its id, so a reader never sees a
//! later id before an earlier one.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{
    now_millis, or_log, select_after, validate_session_id, SessionMessage, SessionMeta,
    SessionStore,
};
use crate::error::StoreError;

const MESSAGES_SUFFIX: &str = ":messages";

/// A list entry; the id is implied by position.
#[derive(Debug, Serialize, Deserialize)]
struct QueuedEntry {
    timestamp: i64,
    data: Value,
}

/// The handful of key-value operations the session driver needs.
///
/// Semantics follow Redis: missing keys read as empty, `expire` with zero
/// seconds deletes the key.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Sets hash fields, creating the hash if needed.
    async fn hset(&self, key: &str, fields: &[(&str, String)]) -> Result<(), StoreError>;

    /// Reads every field of a hash; empty when the key is absent.
    async fn hgetall(&self, key: &str) -> Result<HashMap<String, String>, StoreError>;

    /// Appends to a list, returning its new length.
    async fn rpush(&self, key: &str, value: String) -> Result<u64, StoreError>;

    /// Returns the whole list; empty when the key is absent.
    async fn lrange_all(&self, key: &str) -> Result<Vec<String>, StoreError>;

    /// Sets a key's time to live. Returns `false` if the key does not exist.
    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, StoreError>;

    /// Deletes keys, returning how many existed.
    async fn del(&self, keys: &[String]) -> Result<u64, StoreError>;

    /// Lists keys starting with `prefix`.
    async fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, StoreError>;
}

/// Session store over a [`KeyValueStore`].
#[derive(Clone)]
pub struct KvSessionStore {
    backend: Arc<dyn KeyValueStore>,
    prefix: String,
    ttl: Duration,
}

impl std::fmt::Debug for KvSessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KvSessionStore")
            .field("prefix", &self.prefix)
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

impl KvSessionStore {
    /// Creates a store namespacing its keys under `prefix`.
    pub fn new(backend: Arc<dyn KeyValueStore>, prefix: impl Into<String>, ttl: Duration) -> Self {
        Self {
            backend,
            prefix: prefix.into(),
            ttl,
        }
    }

    fn meta_key(&self, session_id: &str) -> String {
        format!("{}session:{session_id}", self.prefix)
    }

    fn keys(&self, session_id: &str) -> [String; 2] {
        let meta = self.meta_key(session_id);
        [format!("{meta}{MESSAGES_SUFFIX}"), meta]
    }

    async fn write_meta(&self, key: &str, meta: &SessionMeta) -> Result<(), StoreError> {
        self.backend
            .hset(
                key,
                &[
                    ("created_at", meta.created_at.to_string()),
                    ("expires_at", meta.expires_at.to_string()),
                    ("last_activity", meta.last_activity.to_string()),
                ],
            )
            .await
    }

    async fn read_meta(&self, key: &str) -> Result<Option<SessionMeta>, StoreError> {
        let fields = self.backend.hgetall(key).await?;
        if fields.is_empty() {
            return Ok(None);
        }
        let field = |name: &str| -> Result<i64, StoreError> {
            fields
                .get(name)
                .and_then(|v| v.parse().ok())
                .ok_or_else(|| StoreError::Backend(format!("session hash {key} lacks {name}")))
        };
        Ok(Some(SessionMeta {
            created_at: field("created_at")?,
            expires_at: field("expires_at")?,
            last_activity: field("last_activity")?,
        }))
    }

    async fn expire_all(&self, session_id: &str) -> Result<(), StoreError> {
        for key in self.keys(session_id) {
            self.backend.expire(&key, self.ttl).await?;
        }
        Ok(())
    }

    async fn try_register(&self, session_id: &str) -> Result<(), StoreError> {
        validate_session_id(session_id)?;
        self.backend.del(&self.keys(session_id)).await?;
        let meta = SessionMeta::new(now_millis(), self.ttl);
        self.write_meta(&self.meta_key(session_id), &meta).await?;
        self.expire_all(session_id).await
    }

    async fn try_check(&self, session_id: &str, refresh: bool) -> Result<bool, StoreError> {
        validate_session_id(session_id)?;
        let key = self.meta_key(session_id);
        let Some(mut meta) = self.read_meta(&key).await? else {
            return Ok(false);
        };

        let now = now_millis();
        if meta.is_expired(now) {
            tracing::debug!(session_id, "purging expired session");
            self.backend.del(&self.keys(session_id)).await?;
            return Ok(false);
        }

        if refresh {
            meta.touch(now, self.ttl);
            self.write_meta(&key, &meta).await?;
            self.expire_all(session_id).await?;
        }
        Ok(true)
    }

    async fn try_send(&self, session_id: &str, data: Value) -> Result<bool, StoreError> {
        if !self.try_check(session_id, true).await? {
            return Ok(false);
        }

        let [messages_key, _] = self.keys(session_id);
        let entry = QueuedEntry {
            timestamp: now_millis(),
            data,
        };
        let len = self
            .backend
            .rpush(&messages_key, serde_json::to_string(&entry)?)
            .await?;
        self.backend.expire(&messages_key, self.ttl).await?;
        tracing::trace!(session_id, message_id = len.saturating_sub(1), "queued message");
        Ok(true)
    }

    async fn try_messages(
        &self,
        session_id: &str,
        after: Option<u64>,
    ) -> Result<Vec<SessionMessage>, StoreError> {
        if !self.try_check(session_id, false).await? {
            return Ok(Vec::new());
        }

        let [messages_key, _] = self.keys(session_id);
        let raw = self.backend.lrange_all(&messages_key).await?;
        let mut messages = Vec::with_capacity(raw.len());
        for (id, entry) in (0_u64..).zip(raw) {
            let QueuedEntry { timestamp, data } = serde_json::from_str(&entry)?;
            messages.push(SessionMessage {
                id,
                timestamp,
                data,
            });
        }
        Ok(select_after(messages, after))
    }

    async fn try_active(&self) -> Result<Vec<String>, StoreError> {
        let prefix = self.meta_key("");
        let mut ids: Vec<String> = self
            .backend
            .keys_with_prefix(&prefix)
            .await?
            .into_iter()
            .filter_map(|key| key.strip_prefix(&prefix).map(str::to_string))
            .filter(|id| !id.contains(':'))
            .collect();
        ids.sort();

        let mut active = Vec::with_capacity(ids.len());
        for id in ids {
            if self.try_check(&id, false).await? {
                active.push(id);
            }
        }
        Ok(active)
    }
}

#[async_trait]
impl SessionStore for KvSessionStore {
    async fn register_session(&self, session_id: &str) -> bool {
        let result = self.try_register(session_id).await.map(|()| true);
        or_log(result, "register_session", session_id, false)
    }

    async fn session_exists(&self, session_id: &str) -> bool {
        let result = self.try_check(session_id, true).await;
        or_log(result, "session_exists", session_id, false)
    }

    async fn send_message(&self, session_id: &str, payload: Value) -> bool {
        let result = self.try_send(session_id, payload).await;
        or_log(result, "send_message", session_id, false)
    }

    async fn get_messages(&self, session_id: &str, after: Option<u64>) -> Vec<SessionMessage> {
        let result = self.try_messages(session_id, after).await;
        or_log(result, "get_messages", session_id, Vec::new())
    }

    async fn remove_session(&self, session_id: &str) -> bool {
        let result = match validate_session_id(session_id) {
            Ok(()) => self.backend.del(&self.keys(session_id)).await.map(|_| true),
            Err(e) => Err(e),
        };
        or_log(result, "remove_session", session_id, false)
    }

    async fn get_active_sessions(&self) -> Vec<String> {
        or_log(self.try_active().await, "get_active_sessions", "*", Vec::new())
    }
}
