//! Session storage for the SSE transport.
//!
//! A session is created when an SSE client connects and holds an ordered
//! queue of outbound messages. Message ids start at 0, increase strictly and
//! are never reused; readers poll with a cursor instead of consuming.
//!
//! Two drivers implement [`SessionStore`]:
//!
//! - [`FileSessionStore`] keeps one metadata file and one queue file per
//!   session, serialising writers with an advisory lock file.
//! - [`KvSessionStore`] keeps a hash and a list per session in a
//!   [`KeyValueStore`] (Redis, or an in-process map).
//!
//! Drivers never surface storage errors to callers: failures are logged and
//! reported as `false` or an empty result.

pub mod file;
pub mod kv;
pub mod manager;
pub mod memory;
pub mod redis_store;

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::config::{SessionConfig, SessionDriverKind};
use crate::error::StoreError;

pub use file::FileSessionStore;
pub use kv::{KeyValueStore, KvSessionStore};
pub use manager::SessionManager;
pub use memory::MemoryStore;
pub use redis_store::RedisStore;

/// Default session lifetime.
pub const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(86_400);

/// One queued outbound message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionMessage {
    /// Position in the session's queue, starting at 0.
    pub id: u64,
    /// Enqueue time, unix milliseconds.
    pub timestamp: i64,
    /// The JSON-RPC envelope to deliver.
    pub data: Value,
}

/// Session metadata, unix milliseconds throughout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionMeta {
    /// Registration time.
    pub created_at: i64,
    /// The session is gone once this instant has been reached.
    pub expires_at: i64,
    /// Last successful existence check.
    pub last_activity: i64,
}

impl SessionMeta {
    /// Metadata for a session registered now.
    #[must_use]
    pub fn new(now: i64, ttl: Duration) -> Self {
        Self {
            created_at: now,
            expires_at: now.saturating_add(ttl_millis(ttl)),
            last_activity: now,
        }
    }

    /// Returns `true` once `now` has reached the expiry.
    #[must_use]
    pub const fn is_expired(&self, now: i64) -> bool {
        now >= self.expires_at
    }

    /// Records activity at `now` and slides the expiry forward.
    pub fn touch(&mut self, now: i64, ttl: Duration) {
        self.last_activity = now;
        self.expires_at = now.saturating_add(ttl_millis(ttl));
    }
}

/// Storage for SSE sessions and their outbound queues.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Creates a session with an empty queue. Re-registering resets it.
    async fn register_session(&self, session_id: &str) -> bool;

    /// Returns `true` if the session exists and has not expired.
    ///
    /// Expired sessions are purged. Live sessions have their activity
    /// refreshed and their expiry extended.
    async fn session_exists(&self, session_id: &str) -> bool;

    /// Appends a message to a live session's queue.
    async fn send_message(&self, session_id: &str, payload: Value) -> bool;

    /// Returns queued messages with an id strictly greater than `after`, in
    /// id order. `None` returns the whole queue. Nothing is removed.
    async fn get_messages(&self, session_id: &str, after: Option<u64>) -> Vec<SessionMessage>;

    /// Deletes a session and its queue. Removing an absent session succeeds.
    async fn remove_session(&self, session_id: &str) -> bool;

    /// Ids of every session that has not expired.
    async fn get_active_sessions(&self) -> Vec<String>;
}

/// The session driver selected at startup.
#[derive(Debug)]
pub enum SessionDriver {
    /// One file set per session on local disk.
    File(FileSessionStore),
    /// Keys in a key-value store.
    KeyValue(KvSessionStore),
}

impl SessionDriver {
    /// Builds the driver named in configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage directory cannot be created or the
    /// key-value store cannot be reached.
    pub async fn from_config(config: &SessionConfig) -> Result<Self, StoreError> {
        let ttl = Duration::from_secs(config.ttl_secs);
        match config.driver {
            SessionDriverKind::File => {
                let store = FileSessionStore::open(&config.file.directory, ttl)?;
                Ok(Self::File(store))
            }
            SessionDriverKind::KeyValue => {
                let backend = connect_backend(&config.key_value.url).await?;
                Ok(Self::KeyValue(KvSessionStore::new(
                    backend,
                    config.key_value.prefix.clone(),
                    ttl,
                )))
            }
        }
    }

    fn inner(&self) -> &dyn SessionStore {
        match self {
            Self::File(store) => store,
            Self::KeyValue(store) => store,
        }
    }
}

async fn connect_backend(url: &str) -> Result<Arc<dyn KeyValueStore>, StoreError> {
    if url.starts_with(memory::MEMORY_URL_SCHEME) {
        tracing::debug!("using in-process key-value store");
        return Ok(Arc::new(MemoryStore::new()));
    }
    let store = RedisStore::connect(url).await?;
    tracing::info!("connected to key-value store");
    Ok(Arc::new(store))
}

#[async_trait]
impl SessionStore for SessionDriver {
    async fn register_session(&self, session_id: &str) -> bool {
        self.inner().register_session(session_id).await
    }

    async fn session_exists(&self, session_id: &str) -> bool {
        self.inner().session_exists(session_id).await
    }

    async fn send_message(&self, session_id: &str, payload: Value) -> bool {
        self.inner().send_message(session_id, payload).await
    }

    async fn get_messages(&self, session_id: &str, after: Option<u64>) -> Vec<SessionMessage> {
        self.inner().get_messages(session_id, after).await
    }

    async fn remove_session(&self, session_id: &str) -> bool {
        self.inner().remove_session(session_id).await
    }

    async fn get_active_sessions(&self) -> Vec<String> {
        self.inner().get_active_sessions().await
    }
}

/// Rejects ids that are unsafe as file names or key segments.
///
/// # Errors
///
/// Returns [`StoreError::InvalidSessionId`] for anything outside
/// `[A-Za-z0-9_-]{1,128}`.
pub fn validate_session_id(session_id: &str) -> Result<(), StoreError> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    let pattern = PATTERN.get_or_init(|| Regex::new(r"^[A-Za-z0-9_-]{1,128}$").ok());

    match pattern {
        Some(re) if re.is_match(session_id) => Ok(()),
        _ => Err(StoreError::InvalidSessionId),
    }
}

/// Rewrites empty `properties` arrays in a tools/list reply to `{}`.
///
/// Some encoders turn an empty map into `[]`; clients expect an object.
pub fn normalize_tool_schemas(payload: &mut Value) {
    let Some(tools) = payload
        .pointer_mut("/result/tools")
        .and_then(Value::as_array_mut)
    else {
        return;
    };

    for tool in tools {
        if let Some(properties) = tool.pointer_mut("/inputSchema/properties") {
            if properties.as_array().is_some_and(Vec::is_empty) {
                *properties = Value::Object(Map::new());
            }
        }
    }
}

/// Current time in unix milliseconds.
pub(crate) fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

fn ttl_millis(ttl: Duration) -> i64 {
    i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX)
}

/// Logs a storage failure and substitutes `fallback`.
pub(crate) fn or_log<T>(
    result: Result<T, StoreError>,
    operation: &'static str,
    session_id: &str,
    fallback: T,
) -> T {
    result.unwrap_or_else(|e| {
        tracing::warn!(operation, session_id, error = %e, "session storage operation failed");
        fallback
    })
}

/// Keeps messages after the cursor, sorted by id, with schemas normalised.
pub(crate) fn select_after(
    mut messages: Vec<SessionMessage>,
    after: Option<u64>,
) -> Vec<SessionMessage> {
    messages.retain(|m| after.map_or(true, |cursor| m.id > cursor));
    messages.sort_by_key(|m| m.id);
    for message in &mut messages {
        normalize_tool_schemas(&mut message.data);
    }
    messages
}
