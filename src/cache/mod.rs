//! Read-through caching over a TTL key-value store, with Redis and in-memory
//! backends.
//!
//! Every catalog endpoint funnels its producer call through [`Cache::fetch`].
//! There is deliberately no mutual exclusion: concurrent fetches for the same
//! missing key each invoke the producer and the last write wins. The workload
//! is read-heavy enough that single-flight coordination is not worth the
//! complexity here; callers that need it must add their own.

use crate::error::Result;
#[cfg(feature = "redis-support")]
use crate::error::Error;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{debug, warn};

#[cfg(feature = "redis-support")]
use redis::AsyncCommands;

/// Key-value store backend trait
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;
    async fn set_ex(&self, key: &str, value: String, ttl: Duration) -> Result<()>;
    async fn del(&self, key: &str) -> Result<()>;
    fn store_info(&self) -> String;
}

/// Store entry with expiration
#[derive(Debug, Clone)]
struct StoredValue {
    value: String,
    expires_at: u64,
}

/// In-memory key-value store implementation
pub struct MemoryStore {
    entries: Arc<Mutex<HashMap<String, StoredValue>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            entries: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    fn current_timestamp() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or(Duration::from_secs(0))
            .as_secs()
    }

    fn cleanup_expired(&self) {
        let now = Self::current_timestamp();
        let mut entries = self.entries.lock().unwrap();
        entries.retain(|_, entry| now < entry.expires_at);
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        self.cleanup_expired();

        let entries = self.entries.lock().unwrap();
        match entries.get(key) {
            Some(entry) if Self::current_timestamp() < entry.expires_at => {
                Ok(Some(entry.value.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn set_ex(&self, key: &str, value: String, ttl: Duration) -> Result<()> {
        let expires_at = Self::current_timestamp() + ttl.as_secs();
        let mut entries = self.entries.lock().unwrap();
        entries.insert(key.to_string(), StoredValue { value, expires_at });
        Ok(())
    }

    async fn del(&self, key: &str) -> Result<()> {
        let mut entries = self.entries.lock().unwrap();
        entries.remove(key);
        Ok(())
    }

    fn store_info(&self) -> String {
        let entries = self.entries.lock().unwrap();
        format!("memory store: {} entries", entries.len())
    }
}

/// Redis-backed key-value store implementation
#[cfg(feature = "redis-support")]
pub struct RedisStore {
    client: redis::Client,
}

#[cfg(feature = "redis-support")]
impl RedisStore {
    pub fn connect(redis_url: &str) -> Result<Self> {
        let client = redis::Client::open(redis_url)
            .map_err(|e| Error::Cache(format!("Failed to create Redis client: {}", e)))?;
        Ok(Self { client })
    }

    async fn connection(&self) -> Result<redis::aio::Connection> {
        self.client
            .get_async_connection()
            .await
            .map_err(|e| Error::Cache(format!("Failed to connect to Redis: {}", e)))
    }
}

#[cfg(feature = "redis-support")]
#[async_trait]
impl KeyValueStore for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.connection().await?;
        conn.get(key)
            .await
            .map_err(|e| Error::Cache(format!("Redis get error: {}", e)))
    }

    async fn set_ex(&self, key: &str, value: String, ttl: Duration) -> Result<()> {
        let mut conn = self.connection().await?;
        conn.set_ex(key, value, ttl.as_secs() as usize)
            .await
            .map_err(|e| Error::Cache(format!("Redis set error: {}", e)))
    }

    async fn del(&self, key: &str) -> Result<()> {
        let mut conn = self.connection().await?;
        conn.del(key)
            .await
            .map_err(|e| Error::Cache(format!("Redis delete error: {}", e)))
    }

    fn store_info(&self) -> String {
        "redis store".to_string()
    }
}

/// Read-through cache-aside wrapper over a key-value store.
pub struct Cache {
    store: Box<dyn KeyValueStore>,
    prefix: String,
}

impl Cache {
    pub fn new(store: Box<dyn KeyValueStore>, prefix: impl Into<String>) -> Self {
        Self {
            store,
            prefix: prefix.into(),
        }
    }

    /// Stored value for `key`, or `None` when absent or expired. Entries that
    /// no longer deserialize are dropped and treated as a miss.
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        let full_key = self.full_key(key);
        debug!("GET {}", full_key);

        match self.store.get(&full_key).await? {
            Some(raw) => match serde_json::from_str(&raw) {
                Ok(value) => Ok(Some(value)),
                Err(e) => {
                    warn!("Dropping unreadable cache entry {}: {}", full_key, e);
                    let _ = self.store.del(&full_key).await;
                    Ok(None)
                }
            },
            None => Ok(None),
        }
    }

    /// Invoke the producer, store its result under `key` with `ttl`, and
    /// return it.
    pub async fn set<T, F, Fut>(&self, key: &str, ttl: Duration, producer: F) -> Result<T>
    where
        T: Serialize,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let value = producer().await?;
        let raw = serde_json::to_string(&value)?;

        let full_key = self.full_key(key);
        debug!("SET {} EXP {}", full_key, ttl.as_secs());
        self.store.set_ex(&full_key, raw, ttl).await?;

        Ok(value)
    }

    /// Read-through fetch: return the cached value when present, otherwise
    /// produce, store and return.
    pub async fn fetch<T, F, Fut>(&self, key: &str, ttl: Duration, producer: F) -> Result<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        if let Some(existing) = self.get(key).await? {
            return Ok(existing);
        }
        self.set(key, ttl, producer).await
    }

    /// Explicit invalidation.
    pub async fn del(&self, key: &str) -> Result<()> {
        self.store.del(&self.full_key(key)).await
    }

    pub fn cache_info(&self) -> String {
        self.store.store_info()
    }

    fn full_key(&self, key: &str) -> String {
        format!("{}{}", self.prefix, key)
    }
}
