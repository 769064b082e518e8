use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

use crate::error::PerimeterError;
use crate::models::access_token;

/// Namespace for access-token cache entries.
pub const ACCESS_TOKEN_CACHE_PREFIX: &str = "perimeter:access_token:";

/// Cache key for a token value. Depends only on the value, never on row id.
pub fn access_token_cache_key(token: &str) -> String {
    format!("{ACCESS_TOKEN_CACHE_PREFIX}{token}")
}

/// Raw string storage behind [`CacheService`].
#[async_trait::async_trait]
pub trait CacheBackend: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, PerimeterError>;

    /// Store `value`; `None` keeps it until it is overwritten or deleted.
    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>)
    -> Result<(), PerimeterError>;

    /// Returns whether the key was present.
    async fn del(&self, key: &str) -> Result<bool, PerimeterError>;

    async fn flush(&self) -> Result<(), PerimeterError>;
}

/// Access-token cache, keyed by token value.
///
/// Entries are JSON-encoded [`access_token::Model`]s stored under
/// [`access_token_cache_key`]. Clones share the same backend.
#[derive(Clone)]
pub struct CacheService {
    backend: Arc<dyn CacheBackend>,
}

impl CacheService {
    pub fn new(backend: impl CacheBackend + 'static) -> Self {
        CacheService {
            backend: Arc::new(backend),
        }
    }

    /// Process-local cache. Writes from other processes are not seen.
    pub fn in_memory() -> Self {
        CacheService::new(InMemoryCache::new())
    }

    /// The cached copy of `token`, if any. An undecodable entry is an error.
    pub async fn get_token(
        &self,
        token: &str,
    ) -> Result<Option<access_token::Model>, PerimeterError> {
        let Some(raw) = self.backend.get(&access_token_cache_key(token)).await? else {
            return Ok(None);
        };
        serde_json::from_str(&raw)
            .map(Some)
            .map_err(|e| PerimeterError::Cache(format!("corrupt access token entry: {}", e)))
    }

    /// Overwrite the entry for `model.token`.
    pub async fn put_token(
        &self,
        model: &access_token::Model,
        ttl: Option<Duration>,
    ) -> Result<(), PerimeterError> {
        let raw = serde_json::to_string(model)
            .map_err(|e| PerimeterError::Cache(format!("failed to encode access token: {}", e)))?;
        self.backend.set(&model.cache_key(), &raw, ttl).await
    }

    pub async fn evict_token(&self, token: &str) -> Result<bool, PerimeterError> {
        self.backend.del(&access_token_cache_key(token)).await
    }

    /// Drop every entry.
    pub async fn flush(&self) -> Result<(), PerimeterError> {
        self.backend.flush().await
    }
}

/// In-process cache backed by a `HashMap`.
///
/// Each process gets its own copy, so writes made by another process (the
/// operator CLI, a second server) are not seen here. Use `RedisCache` when
/// more than one process writes tokens.
#[derive(Clone, Default)]
pub struct InMemoryCache {
    entries: Arc<RwLock<HashMap<String, CacheEntry>>>,
}

struct CacheEntry {
    value: String,
    expires_at: Option<Instant>,
}

impl InMemoryCache {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl CacheBackend for InMemoryCache {
    async fn get(&self, key: &str) -> Result<Option<String>, PerimeterError> {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        match entries.get(key) {
            Some(entry) if entry.expires_at.is_some_and(|at| now > at) => {
                entries.remove(key);
                Ok(None)
            }
            Some(entry) => Ok(Some(entry.value.clone())),
            None => Ok(None),
        }
    }

    async fn set(
        &self,
        key: &str,
        value: &str,
        ttl: Option<Duration>,
    ) -> Result<(), PerimeterError> {
        let expires_at = match ttl {
            Some(ttl) => Some(Instant::now().checked_add(ttl).ok_or_else(|| {
                PerimeterError::Cache(format!("cache ttl of {}s is out of range", ttl.as_secs()))
            })?),
            None => None,
        };
        self.entries.write().await.insert(
            key.to_string(),
            CacheEntry {
                value: value.to_string(),
                expires_at,
            },
        );
        Ok(())
    }

    async fn del(&self, key: &str) -> Result<bool, PerimeterError> {
        Ok(self.entries.write().await.remove(key).is_some())
    }

    async fn flush(&self) -> Result<(), PerimeterError> {
        self.entries.write().await.clear();
        Ok(())
    }
}

/// Redis-backed cache, shared by every process pointing at the same server.
///
/// ```rust,ignore
/// let cache = CacheService::new(RedisCache::new("redis://127.0.0.1:6379").await?);
/// ```
#[cfg(feature = "redis")]
#[derive(Clone)]
pub struct RedisCache {
    conn: redis::aio::ConnectionManager,
}

#[cfg(feature = "redis")]
impl RedisCache {
    pub async fn new(url: &str) -> Result<Self, PerimeterError> {
        let client = redis::Client::open(url).map_err(redis_error)?;
        let conn = redis::aio::ConnectionManager::new(client)
            .await
            .map_err(redis_error)?;
        Ok(RedisCache { conn })
    }
}

#[cfg(feature = "redis")]
fn redis_error(err: redis::RedisError) -> PerimeterError {
    PerimeterError::Cache(format!("redis: {}", err))
}

#[cfg(feature = "redis")]
#[async_trait::async_trait]
impl CacheBackend for RedisCache {
    async fn get(&self, key: &str) -> Result<Option<String>, PerimeterError> {
        use redis::AsyncCommands;
        let mut conn = self.conn.clone();
        conn.get(key).await.map_err(redis_error)
    }

    async fn set(
        &self,
        key: &str,
        value: &str,
        ttl: Option<Duration>,
    ) -> Result<(), PerimeterError> {
        use redis::AsyncCommands;
        let mut conn = self.conn.clone();
        match ttl {
            Some(ttl) => conn
                .set_ex::<_, _, ()>(key, value, ttl.as_secs().max(1))
                .await
                .map_err(redis_error),
            None => conn.set::<_, _, ()>(key, value).await.map_err(redis_error),
        }
    }

    async fn del(&self, key: &str) -> Result<bool, PerimeterError> {
        use redis::AsyncCommands;
        let mut conn = self.conn.clone();
        let removed: i64 = conn.del(key).await.map_err(redis_error)?;
        Ok(removed > 0)
    }

    /// Removes only access-token entries, leaving other data in the database.
    async fn flush(&self) -> Result<(), PerimeterError> {
        use redis::AsyncCommands;
        let mut conn = self.conn.clone();
        let keys: Vec<String> = conn
            .keys(format!("{ACCESS_TOKEN_CACHE_PREFIX}*"))
            .await
            .map_err(redis_error)?;
        if !keys.is_empty() {
            conn.del::<_, ()>(keys).await.map_err(redis_error)?;
        }
        Ok(())
    }
}
