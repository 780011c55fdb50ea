//! Durable key/value backends for idempotency records.
//!
//! The durable tier is authoritative and shared between processes when backed by Redis.
//! Writes are last-writer-wins and there is no check-and-set.
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, RedisError};
use thiserror::Error;
use tokio::sync::RwLock;
use tokio::time::Instant;

#[derive(Error, Debug, Clone)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("invalid store configuration: {0}")]
    InvalidConfiguration(String),
    #[error(transparent)]
    Redis(#[from] Arc<RedisError>),
}

impl From<RedisError> for StoreError {
    fn from(err: RedisError) -> Self {
        StoreError::Redis(Arc::new(err))
    }
}

#[async_trait]
pub trait DurableStore: Send + Sync {
    async fn get(&self, key: String) -> Result<Option<String>, StoreError>;
    async fn set(&self, key: String, value: String, ttl: Duration) -> Result<(), StoreError>;
    async fn delete(&self, key: String) -> Result<(), StoreError>;
}

/// Process-local store, used when no shared backend is configured.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    entries: Arc<RwLock<HashMap<String, Entry>>>,
}

struct Entry {
    value: String,
    /// `None` when the TTL reaches past what `Instant` can represent.
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        !matches!(self.expires_at, Some(expires_at) if now >= expires_at)
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries held, expired ones included until they are next read.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl DurableStore for InMemoryStore {
    async fn get(&self, key: String) -> Result<Option<String>, StoreError> {
        {
            let entries = self.entries.read().await;
            match entries.get(&key) {
                None => return Ok(None),
                Some(entry) if entry.is_live(Instant::now()) => {
                    return Ok(Some(entry.value.clone()))
                }
                Some(_) => {}
            }
        }

        self.entries.write().await.remove(&key);
        Ok(None)
    }

    async fn set(&self, key: String, value: String, ttl: Duration) -> Result<(), StoreError> {
        let expires_at = Instant::now().checked_add(ttl);
        self.entries
            .write()
            .await
            .insert(key, Entry { value, expires_at });
        Ok(())
    }

    async fn delete(&self, key: String) -> Result<(), StoreError> {
        self.entries.write().await.remove(&key);
        Ok(())
    }
}

/// Shared store backed by Redis `SET EX` / `GET` / `DEL`.
pub struct RedisStore {
    connection: MultiplexedConnection,
}

impl RedisStore {
    pub async fn new(addr: String) -> Result<RedisStore, StoreError> {
        let client = redis::Client::open(addr)
            .map_err(|e| StoreError::InvalidConfiguration(e.to_string()))?;
        let connection = client.get_multiplexed_async_connection().await?;

        Ok(RedisStore { connection })
    }
}

#[async_trait]
impl DurableStore for RedisStore {
    async fn get(&self, key: String) -> Result<Option<String>, StoreError> {
        let mut conn = self.connection.clone();
        let value: Option<String> = conn.get(key).await?;
        Ok(value)
    }

    async fn set(&self, key: String, value: String, ttl: Duration) -> Result<(), StoreError> {
        let mut conn = self.connection.clone();
        conn.set_ex::<_, _, ()>(key, value, expiry_seconds(ttl))
            .await?;
        Ok(())
    }

    async fn delete(&self, key: String) -> Result<(), StoreError> {
        let mut conn = self.connection.clone();
        conn.del::<_, ()>(key).await?;
        Ok(())
    }
}

/// Redis expiries are whole seconds and must be positive: round up, never below 1.
fn expiry_seconds(ttl: Duration) -> u64 {
    let seconds = ttl.as_secs() + u64::from(ttl.subsec_nanos() > 0);
    seconds.max(1)
}
