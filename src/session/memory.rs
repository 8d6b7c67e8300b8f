//! In-process key-value backend.
//!
//! Mirrors the Redis semantics the session driver relies on, including key
//! expiry. Selected with a `memory://` URL; state lives only as long as the
//! process.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::mapref::entry::Entry as MapEntry;
use dashmap::DashMap;

use super::kv::KeyValueStore;
use crate::error::StoreError;

/// URL scheme selecting [`MemoryStore`].
pub const MEMORY_URL_SCHEME: &str = "memory://";

#[derive(Debug, Clone)]
enum Stored {
    Hash(HashMap<String, String>),
    List(Vec<String>),
}

impl Stored {
    const fn kind(&self) -> &'static str {
        match self {
            Self::Hash(_) => "hash",
            Self::List(_) => "list",
        }
    }
}

#[derive(Debug, Clone)]
struct Slot {
    value: Stored,
    expires_at: Option<Instant>,
}

impl Slot {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |at| now < at)
    }
}

/// A concurrent in-memory [`KeyValueStore`].
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: DashMap<String, Slot>,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live keys.
    #[must_use]
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries.iter().filter(|e| e.is_live(now)).count()
    }

    /// Returns `true` when no live keys remain.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Runs `f` on the live value at `key`, creating it with `init` if absent
    /// or expired.
    fn upsert<T>(
        &self,
        key: &str,
        init: impl FnOnce() -> Stored,
        f: impl FnOnce(&mut Stored) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let now = Instant::now();
        let mut slot = match self.entries.entry(key.to_string()) {
            MapEntry::Occupied(mut entry) => {
                if !entry.get().is_live(now) {
                    entry.insert(Slot {
                        value: init(),
                        expires_at: None,
                    });
                }
                entry.into_ref()
            }
            MapEntry::Vacant(entry) => entry.insert(Slot {
                value: init(),
                expires_at: None,
            }),
        };
        f(&mut slot.value)
    }

    /// Clones the live value at `key`, dropping it if expired.
    fn live(&self, key: &str) -> Option<Stored> {
        let now = Instant::now();
        let value = self.entries.get(key).map(|slot| (slot.is_live(now), slot.value.clone()));
        match value {
            Some((true, value)) => Some(value),
            Some((false, _)) => {
                self.entries.remove_if(key, |_, slot| !slot.is_live(now));
                None
            }
            None => None,
        }
    }
}

fn wrong_type(key: &str, found: &Stored, wanted: &str) -> StoreError {
    StoreError::Backend(format!(
        "WRONGTYPE key {key} holds a {}, not a {wanted}",
        found.kind()
    ))
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn hset(&self, key: &str, fields: &[(&str, String)]) -> Result<(), StoreError> {
        self.upsert(
            key,
            || Stored::Hash(HashMap::new()),
            |stored| match stored {
                Stored::Hash(hash) => {
                    for (field, value) in fields {
                        hash.insert((*field).to_string(), value.clone());
                    }
                    Ok(())
                }
                other => Err(wrong_type(key, other, "hash")),
            },
        )
    }

    async fn hgetall(&self, key: &str) -> Result<HashMap<String, String>, StoreError> {
        match self.live(key) {
            None => Ok(HashMap::new()),
            Some(Stored::Hash(hash)) => Ok(hash),
            Some(other) => Err(wrong_type(key, &other, "hash")),
        }
    }

    async fn rpush(&self, key: &str, value: String) -> Result<u64, StoreError> {
        self.upsert(
            key,
            || Stored::List(Vec::new()),
            |stored| match stored {
                Stored::List(list) => {
                    list.push(value);
                    Ok(list.len() as u64)
                }
                other => Err(wrong_type(key, other, "list")),
            },
        )
    }

    async fn lrange_all(&self, key: &str) -> Result<Vec<String>, StoreError> {
        match self.live(key) {
            None => Ok(Vec::new()),
            Some(Stored::List(list)) => Ok(list),
            Some(other) => Err(wrong_type(key, &other, "list")),
        }
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, StoreError> {
        let now = Instant::now();
        match self.entries.entry(key.to_string()) {
            MapEntry::Occupied(entry) if !entry.get().is_live(now) => {
                entry.remove();
                Ok(false)
            }
            MapEntry::Occupied(entry) if ttl.is_zero() => {
                entry.remove();
                Ok(true)
            }
            MapEntry::Occupied(mut entry) => {
                entry.get_mut().expires_at = Some(now + ttl);
                Ok(true)
            }
            MapEntry::Vacant(_) => Ok(false),
        }
    }

    async fn del(&self, keys: &[String]) -> Result<u64, StoreError> {
        let now = Instant::now();
        let removed = keys
            .iter()
            .filter_map(|key| self.entries.remove(key))
            .filter(|(_, slot)| slot.is_live(now))
            .count();
        Ok(removed as u64)
    }

    async fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        let now = Instant::now();
        Ok(self
            .entries
            .iter()
            .filter(|entry| entry.key().starts_with(prefix) && entry.is_live(now))
            .map(|entry| entry.key().clone())
            .collect())
    }
}
