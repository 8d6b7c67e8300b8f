//! Redis key-value backend.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;

use super::kv::KeyValueStore;
use crate::error::StoreError;

/// [`KeyValueStore`] backed by a Redis server.
///
/// The multiplexed connection is cheap to clone and safe to share between
/// tasks; each operation clones it.
#[derive(Clone)]
pub struct RedisStore {
    connection: MultiplexedConnection,
}

impl std::fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisStore").finish_non_exhaustive()
    }
}

impl RedisStore {
    /// Connects to the server at a `redis://` or `rediss://` URL.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is invalid or the server is unreachable.
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let client = redis::Client::open(url)?;
        let connection = client.get_multiplexed_tokio_connection().await?;
        Ok(Self { connection })
    }
}

#[async_trait]
impl KeyValueStore for RedisStore {
    async fn hset(&self, key: &str, fields: &[(&str, String)]) -> Result<(), StoreError> {
        let mut conn = self.connection.clone();
        let (): () = conn.hset_multiple(key, fields).await?;
        Ok(())
    }

    async fn hgetall(&self, key: &str) -> Result<HashMap<String, String>, StoreError> {
        let mut conn = self.connection.clone();
        Ok(conn.hgetall(key).await?)
    }

    async fn rpush(&self, key: &str, value: String) -> Result<u64, StoreError> {
        let mut conn = self.connection.clone();
        Ok(conn.rpush(key, value).await?)
    }

    async fn lrange_all(&self, key: &str) -> Result<Vec<String>, StoreError> {
        let mut conn = self.connection.clone();
        Ok(conn.lrange(key, 0, -1).await?)
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, StoreError> {
        let mut conn = self.connection.clone();
        let seconds = i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX);
        Ok(conn.expire(key, seconds).await?)
    }

    async fn del(&self, keys: &[String]) -> Result<u64, StoreError> {
        let mut conn = self.connection.clone();
        Ok(conn.del(keys).await?)
    }

    async fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        // KEYS is O(n) over the keyspace; only used for session listing.
        let mut conn = self.connection.clone();
        Ok(conn.keys(format!("{prefix}*")).await?)
    }
}
