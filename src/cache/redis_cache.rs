use super::{CacheError, CacheResult, CacheService, KeyTtl};
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client, RedisError, Script};
use std::collections::HashMap;
use std::time::Duration;

// INCRBY would treat a missing key as 0; a missing balance is an error here
const ADD_SCRIPT: &str = r"
local current = redis.call('GET', KEYS[1])
if not current then
  return redis.error_reply('NOTNUMERIC no value')
end
return redis.call('INCRBY', KEYS[1], ARGV[1])
";

/// Redis-backed cache
#[derive(Clone)]
pub struct RedisCache {
    connection: ConnectionManager,
    key_prefix: String,
    add_script: Script,
}

impl RedisCache {
    pub async fn new(redis_url: &str) -> CacheResult<Self> {
        Self::new_with_prefix(redis_url, "").await
    }

    /// Create a new Redis cache with custom key prefix
    pub async fn new_with_prefix(redis_url: &str, prefix: &str) -> CacheResult<Self> {
        let client = Client::open(redis_url)
            .map_err(|e| CacheError::Configuration(format!("Failed to create Redis client: {}", e)))?;

        let connection = ConnectionManager::new(client)
            .await
            .map_err(|e| CacheError::Backend(format!("Failed to connect to Redis: {}", e)))?;

        // Test connection
        let mut test_conn = connection.clone();
        redis::cmd("PING")
            .query_async::<_, String>(&mut test_conn)
            .await
            .map_err(|e| CacheError::Backend(format!("Redis connection test failed: {}", e)))?;

        tracing::info!("Initialized Redis cache with prefix '{}'", prefix);

        Ok(Self {
            connection,
            key_prefix: prefix.to_string(),
            add_script: Script::new(ADD_SCRIPT),
        })
    }

    fn key(&self, key: &str) -> String {
        prefixed(&self.key_prefix, key)
    }

    async fn add(&self, key: &str, delta: i64) -> CacheResult<i64> {
        let mut conn = self.connection.clone();
        self.add_script
            .key(self.key(key))
            .arg(delta)
            .invoke_async::<_, i64>(&mut conn)
            .await
            .map_err(|e| numeric_error(key, e))
    }
}

fn prefixed(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_string()
    } else {
        format!("{}:{}", prefix, key)
    }
}

fn unprefixed(prefix: &str, key: String) -> String {
    if prefix.is_empty() {
        return key;
    }
    match key.strip_prefix(prefix).and_then(|rest| rest.strip_prefix(':')) {
        Some(rest) => rest.to_string(),
        None => key,
    }
}

fn numeric_error(key: &str, err: RedisError) -> CacheError {
    let message = err.to_string();
    if err.code() == Some("NOTNUMERIC") || message.contains("not an integer") {
        CacheError::NotNumeric(key.to_string())
    } else {
        CacheError::Backend(message)
    }
}

fn millis(ttl: Duration) -> u64 {
    // PX 0 is rejected by Redis
    (ttl.as_millis() as u64).max(1)
}

#[async_trait]
impl CacheService for RedisCache {
    async fn get(&self, key: &str) -> CacheResult<Option<String>> {
        let mut conn = self.connection.clone();
        Ok(conn.get(self.key(key)).await?)
    }

    async fn set(&self, key: &str, value: &str) -> CacheResult<()> {
        let mut conn = self.connection.clone();
        let _: () = conn.set(self.key(key), value).await?;
        Ok(())
    }

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> CacheResult<()> {
        let mut conn = self.connection.clone();
        redis::cmd("SET")
            .arg(self.key(key))
            .arg(value)
            .arg("PX")
            .arg(millis(ttl))
            .query_async::<_, ()>(&mut conn)
            .await?;
        Ok(())
    }

    async fn expire(&self, key: &str, ttl: Duration) -> CacheResult<bool> {
        let mut conn = self.connection.clone();
        let updated: i64 = redis::cmd("PEXPIRE")
            .arg(self.key(key))
            .arg(millis(ttl))
            .query_async(&mut conn)
            .await?;
        Ok(updated == 1)
    }

    async fn ttl(&self, key: &str) -> CacheResult<KeyTtl> {
        let mut conn = self.connection.clone();
        let remaining: i64 = redis::cmd("PTTL")
            .arg(self.key(key))
            .query_async(&mut conn)
            .await?;

        Ok(match remaining {
            -2 => KeyTtl::Missing,
            -1 => KeyTtl::Persistent,
            ms => KeyTtl::Expires(Duration::from_millis(ms.max(0) as u64)),
        })
    }

    async fn incr(&self, key: &str, delta: i64) -> CacheResult<i64> {
        self.add(key, delta).await
    }

    async fn decr(&self, key: &str, delta: i64) -> CacheResult<i64> {
        let delta = delta
            .checked_neg()
            .ok_or_else(|| CacheError::Backend(format!("decrement of '{}' would overflow", key)))?;
        self.add(key, delta).await
    }

    async fn delete(&self, keys: &[String]) -> CacheResult<u64> {
        if keys.is_empty() {
            return Ok(0);
        }

        let mut conn = self.connection.clone();
        let keys: Vec<String> = keys.iter().map(|key| self.key(key)).collect();
        let removed: u64 = redis::cmd("DEL").arg(keys).query_async(&mut conn).await?;
        Ok(removed)
    }

    async fn keys(&self, pattern: &str) -> CacheResult<Vec<String>> {
        let mut conn = self.connection.clone();
        let keys: Vec<String> = redis::cmd("KEYS")
            .arg(self.key(pattern))
            .query_async(&mut conn)
            .await?;

        Ok(keys
            .into_iter()
            .map(|key| unprefixed(&self.key_prefix, key))
            .collect())
    }

    async fn hmset(&self, key: &str, fields: &HashMap<String, String>) -> CacheResult<()> {
        if fields.is_empty() {
            return Ok(());
        }

        let mut conn = self.connection.clone();
        let mut cmd = redis::cmd("HSET");
        cmd.arg(self.key(key));
        for (field, value) in fields {
            cmd.arg(field).arg(value);
        }
        cmd.query_async::<_, ()>(&mut conn).await?;
        Ok(())
    }

    async fn hgetall(&self, key: &str) -> CacheResult<HashMap<String, String>> {
        let mut conn = self.connection.clone();
        Ok(conn.hgetall(self.key(key)).await?)
    }
}
