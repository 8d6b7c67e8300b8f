//! File-backed session storage.
//!
//! Each session owns three files in the storage directory:
//!
//! ```text
//! <id>.session.json   metadata (created_at, expires_at, last_activity)
//! <id>.queue.json     JSON array of queued messages
//! <id>.lock           advisory lock serialising writers
//! ```
//!
//! Every operation runs on the blocking pool while holding the session's
//! exclusive lock, so concurrent writers (in this or another process) never
//! interleave a read-modify-write of the queue. Lock files are never deleted:
//! a waiter blocked on a removed file would hold a lock nobody else sees.

use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use fs2::FileExt;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use super::{
    now_millis, or_log, select_after, validate_session_id, SessionMessage, SessionMeta,
    SessionStore,
};
use crate::error::StoreError;

const META_SUFFIX: &str = ".session.json";
const QUEUE_SUFFIX: &str = ".queue.json";
const LOCK_SUFFIX: &str = ".lock";

/// Session store keeping one file set per session in a directory.
#[derive(Debug, Clone)]
pub struct FileSessionStore {
    inner: Arc<Layout>,
}

#[derive(Debug)]
struct Layout {
    directory: PathBuf,
    ttl: Duration,
}

impl FileSessionStore {
    /// Opens a store in `directory`, creating it if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    pub fn open(directory: impl Into<PathBuf>, ttl: Duration) -> Result<Self, StoreError> {
        let directory = directory.into();
        fs::create_dir_all(&directory)?;
        tracing::debug!(directory = %directory.display(), ttl_secs = ttl.as_secs(), "file session store ready");
        Ok(Self {
            inner: Arc::new(Layout { directory, ttl }),
        })
    }

    /// The storage directory.
    #[must_use]
    pub fn directory(&self) -> &Path {
        &self.inner.directory
    }

    /// Runs `op` on the blocking pool with the session's lock held.
    async fn locked<T, F>(&self, session_id: &str, op: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&Layout, &str) -> Result<T, StoreError> + Send + 'static,
    {
        validate_session_id(session_id)?;
        let layout = Arc::clone(&self.inner);
        let session_id = session_id.to_string();

        tokio::task::spawn_blocking(move || {
            let _lock = layout.lock(&session_id)?;
            op(layout.as_ref(), session_id.as_str())
        })
        .await
        .map_err(|e| StoreError::Task(e.to_string()))?
    }
}

impl Layout {
    fn path(&self, session_id: &str, suffix: &str) -> PathBuf {
        self.directory.join(format!("{session_id}{suffix}"))
    }

    /// Acquires the exclusive lock; released when the handle drops.
    fn lock(&self, session_id: &str) -> Result<File, StoreError> {
        let lock_error = |source| StoreError::Lock {
            session_id: session_id.to_string(),
            source,
        };
        let file = File::create(self.path(session_id, LOCK_SUFFIX)).map_err(lock_error)?;
        file.lock_exclusive().map_err(lock_error)?;
        Ok(file)
    }

    fn read_meta(&self, session_id: &str) -> Result<Option<SessionMeta>, StoreError> {
        read_json(&self.path(session_id, META_SUFFIX))
    }

    fn read_queue(&self, session_id: &str) -> Result<Vec<SessionMessage>, StoreError> {
        Ok(read_json(&self.path(session_id, QUEUE_SUFFIX))?.unwrap_or_default())
    }

    fn register(&self, session_id: &str) -> Result<(), StoreError> {
        let meta = SessionMeta::new(now_millis(), self.ttl);
        write_json(&self.path(session_id, META_SUFFIX), &meta)?;
        write_json(&self.path(session_id, QUEUE_SUFFIX), &Vec::<SessionMessage>::new())
    }

    /// Checks expiry, purging expired sessions. With `refresh`, a live
    /// session's activity and expiry are updated.
    fn check(&self, session_id: &str, refresh: bool) -> Result<bool, StoreError> {
        let Some(mut meta) = self.read_meta(session_id)? else {
            return Ok(false);
        };

        let now = now_millis();
        if meta.is_expired(now) {
            tracing::debug!(session_id, "purging expired session");
            self.purge(session_id)?;
            return Ok(false);
        }

        if refresh {
            meta.touch(now, self.ttl);
            write_json(&self.path(session_id, META_SUFFIX), &meta)?;
        }
        Ok(true)
    }

    fn append(&self, session_id: &str, data: Value) -> Result<bool, StoreError> {
        if !self.check(session_id, true)? {
            return Ok(false);
        }

        let mut queue = self.read_queue(session_id)?;
        queue.push(SessionMessage {
            id: queue.len() as u64,
            timestamp: now_millis(),
            data,
        });
        write_json(&self.path(session_id, QUEUE_SUFFIX), &queue)?;
        Ok(true)
    }

    fn purge(&self, session_id: &str) -> Result<(), StoreError> {
        remove_if_exists(&self.path(session_id, META_SUFFIX))?;
        remove_if_exists(&self.path(session_id, QUEUE_SUFFIX))?;
        Ok(())
    }

    fn session_ids(&self) -> Result<Vec<String>, StoreError> {
        let mut ids = Vec::new();
        for entry in fs::read_dir(&self.directory)? {
            let name = entry?.file_name();
            let Some(id) = name.to_str().and_then(|n| n.strip_suffix(META_SUFFIX)) else {
                continue;
            };
            if validate_session_id(id).is_ok() {
                ids.push(id.to_string());
            }
        }
        ids.sort();
        Ok(ids)
    }
}

#[async_trait]
impl SessionStore for FileSessionStore {
    async fn register_session(&self, session_id: &str) -> bool {
        let result = self
            .locked(session_id, |layout, id| layout.register(id))
            .await
            .map(|()| true);
        or_log(result, "register_session", session_id, false)
    }

    async fn session_exists(&self, session_id: &str) -> bool {
        let result = self
            .locked(session_id, |layout, id| layout.check(id, true))
            .await;
        or_log(result, "session_exists", session_id, false)
    }

    async fn send_message(&self, session_id: &str, payload: Value) -> bool {
        let result = self
            .locked(session_id, move |layout, id| layout.append(id, payload))
            .await;
        or_log(result, "send_message", session_id, false)
    }

    async fn get_messages(&self, session_id: &str, after: Option<u64>) -> Vec<SessionMessage> {
        let result = self
            .locked(session_id, |layout, id| {
                if !layout.check(id, false)? {
                    return Ok(Vec::new());
                }
                layout.read_queue(id)
            })
            .await
            .map(|queue| select_after(queue, after));
        or_log(result, "get_messages", session_id, Vec::new())
    }

    async fn remove_session(&self, session_id: &str) -> bool {
        let result = self
            .locked(session_id, |layout, id| layout.purge(id))
            .await
            .map(|()| true);
        or_log(result, "remove_session", session_id, false)
    }

    async fn get_active_sessions(&self) -> Vec<String> {
        let layout = Arc::clone(&self.inner);
        let ids = tokio::task::spawn_blocking(move || layout.session_ids())
            .await
            .map_err(|e| StoreError::Task(e.to_string()))
            .and_then(|ids| ids);
        let ids = or_log(ids, "get_active_sessions", "*", Vec::new());

        let mut active = Vec::with_capacity(ids.len());
        for id in ids {
            let live = self.locked(&id, |layout, id| layout.check(id, false)).await;
            if or_log(live, "get_active_sessions", &id, false) {
                active.push(id);
            }
        }
        active
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, StoreError> {
    match fs::read(path) {
        Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Writes through a temporary file so readers never see a torn file.
fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), StoreError> {
    let mut tmp = path.as_os_str().to_os_string();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    fs::write(&tmp, serde_json::to_vec(value)?)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

fn remove_if_exists(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use tempfile::TempDir;

    use super::*;

    fn store(ttl: Duration) -> (TempDir, FileSessionStore) {
        let dir = TempDir::new().unwrap();
        let store = FileSessionStore::open(dir.path(), ttl).unwrap();
        (dir, store)
    }

    #[tokio::test]
    async fn register_creates_files() {
        let (dir, store) = store(Duration::from_secs(60));
        assert!(store.register_session("s1").await);

        assert_eq!(store.directory(), dir.path());
        assert!(dir.path().join("s1.session.json").exists());
        let queue = fs::read_to_string(dir.path().join("s1.queue.json")).unwrap();
        assert_eq!(queue, "[]");
    }

    #[tokio::test]
    async fn reregistering_resets_the_queue() {
        let (_dir, store) = store(Duration::from_secs(60));
        store.register_session("s1").await;
        store.send_message("s1", json!(1)).await;

        assert!(store.register_session("s1").await);
        assert!(store.get_messages("s1", None).await.is_empty());
    }

    #[tokio::test]
    async fn unsafe_ids_are_refused() {
        let (_dir, store) = store(Duration::from_secs(60));
        assert!(!store.register_session("../escape").await);
        assert!(!store.session_exists("../escape").await);
    }

    #[tokio::test]
    async fn remove_is_idempotent() {
        let (dir, store) = store(Duration::from_secs(60));
        store.register_session("s1").await;

        assert!(store.remove_session("s1").await);
        assert!(store.remove_session("s1").await);
        assert!(!store.session_exists("s1").await);
        assert!(!dir.path().join("s1.session.json").exists());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn removal_waits_for_the_lock_and_keeps_the_lock_file() {
        let (dir, store) = store(Duration::from_secs(60));
        store.register_session("s1").await;
        let lock_path = dir.path().join("s1.lock");

        let held = File::open(&lock_path).unwrap();
        held.lock_exclusive().unwrap();

        let removal = tokio::spawn({
            let store = store.clone();
            async move { store.remove_session("s1").await }
        });
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!removal.is_finished());

        FileExt::unlock(&held).unwrap();
        assert!(removal.await.unwrap());
        assert!(lock_path.exists());
        assert!(!store.session_exists("s1").await);
        assert!(store.register_session("s1").await);
    }

    #[tokio::test]
    async fn expired_sessions_are_purged() {
        let (dir, store) = store(Duration::ZERO);
        store.register_session("gone").await;

        assert!(!store.session_exists("gone").await);
        assert!(!dir.path().join("gone.queue.json").exists());
        assert!(store.get_active_sessions().await.is_empty());
    }

    #[tokio::test]
    async fn active_sessions_are_listed() {
        let (_dir, store) = store(Duration::from_secs(60));
        store.register_session("b").await;
        store.register_session("a").await;

        assert_eq!(store.get_active_sessions().await, vec!["a", "b"]);
    }
}
