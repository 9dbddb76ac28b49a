//! Key-value cache accessor
//!
//! A thin pass-through over a key-value store. Values are strings; the
//! numeric operations interpret them as signed 64-bit integers.

mod memory;
mod redis_cache;

pub use memory::MemoryCache;
pub use redis_cache::RedisCache;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Result type for cache operations
pub type CacheResult<T> = std::result::Result<T, CacheError>;

/// Errors that can occur during cache operations
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// Stored value is missing or not an integer
    #[error("Value at '{0}' is not a number")]
    NotNumeric(String),

    /// Store unreachable, or it rejected the command
    #[error("Cache backend error: {0}")]
    Backend(String),

    #[error("Cache configuration error: {0}")]
    Configuration(String),
}

impl From<redis::RedisError> for CacheError {
    fn from(err: redis::RedisError) -> Self {
        CacheError::Backend(err.to_string())
    }
}

/// Remaining lifetime of a key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyTtl {
    Missing,
    /// Key exists without an expiry
    Persistent,
    Expires(Duration),
}

/// Key-value cache client
#[async_trait]
pub trait CacheService: Send + Sync {
    async fn get(&self, key: &str) -> CacheResult<Option<String>>;

    /// Store a value, clearing any expiry on the key
    async fn set(&self, key: &str, value: &str) -> CacheResult<()>;

    /// Store a value that expires after `ttl`
    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> CacheResult<()>;

    /// Set an expiry on an existing key; false when the key is missing
    async fn expire(&self, key: &str, ttl: Duration) -> CacheResult<bool>;

    async fn ttl(&self, key: &str) -> CacheResult<KeyTtl>;

    /// Add `delta` to an integer value and return the new value
    async fn incr(&self, key: &str, delta: i64) -> CacheResult<i64>;

    /// Subtract `delta` from an integer value and return the new value
    async fn decr(&self, key: &str, delta: i64) -> CacheResult<i64>;

    /// Remove keys, returning how many existed
    async fn delete(&self, keys: &[String]) -> CacheResult<u64>;

    /// Keys matching a glob pattern (`*`, `?`, `[...]`)
    async fn keys(&self, pattern: &str) -> CacheResult<Vec<String>>;

    /// Set several fields of a hash
    async fn hmset(&self, key: &str, fields: &HashMap<String, String>) -> CacheResult<()>;

    /// All fields of a hash; empty when the key is missing
    async fn hgetall(&self, key: &str) -> CacheResult<HashMap<String, String>>;
}

/// Cache backend selection
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackend {
    #[default]
    Memory,
    Redis,
}

/// Cache configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default)]
    pub backend: CacheBackend,

    /// Redis connection URL (required for the redis backend)
    #[serde(default)]
    pub redis_url: Option<String>,

    /// Namespace prepended to every key as `<prefix>:`
    #[serde(default)]
    pub key_prefix: String,
}

/// Create a cache client based on configuration
pub async fn create_cache(config: &CacheConfig) -> CacheResult<Arc<dyn CacheService>> {
    match config.backend {
        CacheBackend::Memory => {
            tracing::info!("Initializing in-memory cache");
            Ok(Arc::new(MemoryCache::new()))
        }
        CacheBackend::Redis => {
            let redis_url = config.redis_url.as_ref().ok_or_else(|| {
                CacheError::Configuration("Redis backend requires 'redis_url' configuration".to_string())
            })?;

            tracing::info!(url = %redis_url, "Initializing Redis cache");

            let cache = RedisCache::new_with_prefix(redis_url, &config.key_prefix).await?;
            Ok(Arc::new(cache))
        }
    }
}
