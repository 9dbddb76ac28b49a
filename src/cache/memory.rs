use super::{CacheError, CacheResult, CacheService, KeyTtl};
use async_trait::async_trait;
use dashmap::DashMap;
use regex::Regex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
enum Stored {
    Text(String),
    Hash(HashMap<String, String>),
}

#[derive(Debug, Clone)]
struct Entry {
    value: Stored,
    expires_at: Option<Instant>,
}

impl Entry {
    fn new(value: Stored) -> Self {
        Self {
            value,
            expires_at: None,
        }
    }

    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.map_or(false, |at| at <= now)
    }
}

/// In-memory cache (for development and testing).
///
/// Expired keys are dropped lazily when touched.
#[derive(Clone, Default)]
pub struct MemoryCache {
    entries: Arc<DashMap<String, Entry>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn purge(&self, key: &str) {
        let now = Instant::now();
        self.entries.remove_if(key, |_, entry| entry.is_expired(now));
    }

    fn add(&self, key: &str, delta: i64) -> CacheResult<i64> {
        self.purge(key);
        let mut entry = self
            .entries
            .get_mut(key)
            .ok_or_else(|| CacheError::NotNumeric(key.to_string()))?;

        match entry.value {
            Stored::Text(ref mut text) => {
                let current: i64 = text
                    .parse()
                    .map_err(|_| CacheError::NotNumeric(key.to_string()))?;
                let next = current.checked_add(delta).ok_or_else(|| {
                    CacheError::Backend(format!("increment of '{}' would overflow", key))
                })?;
                *text = next.to_string();
                Ok(next)
            }
            Stored::Hash(_) => Err(wrong_type(key)),
        }
    }
}

fn wrong_type(key: &str) -> CacheError {
    CacheError::Backend(format!(
        "WRONGTYPE operation against '{}' holding the wrong kind of value",
        key
    ))
}

/// Translate a Redis-style glob into an anchored regex
fn glob_to_regex(pattern: &str) -> CacheResult<Regex> {
    let mut out = String::with_capacity(pattern.len() + 2);
    out.push('^');

    let mut chars = pattern.chars();
    while let Some(c) = chars.next() {
        match c {
            '*' => out.push_str(".*"),
            '?' => out.push('.'),
            '[' => {
                out.push('[');
                let mut first = true;
                for c in chars.by_ref() {
                    match c {
                        ']' => break,
                        '^' if first => out.push('^'),
                        '\\' | '[' | '&' | '~' => {
                            out.push('\\');
                            out.push(c);
                        }
                        _ => out.push(c),
                    }
                    first = false;
                }
                out.push(']');
            }
            '\\' => {
                if let Some(escaped) = chars.next() {
                    out.push_str(&regex::escape(&escaped.to_string()));
                }
            }
            _ => out.push_str(&regex::escape(&c.to_string())),
        }
    }

    out.push('$');
    Regex::new(&out).map_err(|e| CacheError::Backend(format!("invalid pattern '{}': {}", pattern, e)))
}

#[async_trait]
impl CacheService for MemoryCache {
    async fn get(&self, key: &str) -> CacheResult<Option<String>> {
        self.purge(key);
        match self.entries.get(key) {
            Some(entry) => match entry.value {
                Stored::Text(ref text) => Ok(Some(text.clone())),
                Stored::Hash(_) => Err(wrong_type(key)),
            },
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: &str) -> CacheResult<()> {
        self.entries
            .insert(key.to_string(), Entry::new(Stored::Text(value.to_string())));
        Ok(())
    }

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> CacheResult<()> {
        let entry = Entry {
            value: Stored::Text(value.to_string()),
            expires_at: Some(Instant::now() + ttl),
        };
        self.entries.insert(key.to_string(), entry);
        Ok(())
    }

    async fn expire(&self, key: &str, ttl: Duration) -> CacheResult<bool> {
        self.purge(key);
        match self.entries.get_mut(key) {
            Some(mut entry) => {
                entry.expires_at = Some(Instant::now() + ttl);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn ttl(&self, key: &str) -> CacheResult<KeyTtl> {
        self.purge(key);
        Ok(match self.entries.get(key) {
            Some(entry) => match entry.expires_at {
                Some(at) => KeyTtl::Expires(at.saturating_duration_since(Instant::now())),
                None => KeyTtl::Persistent,
            },
            None => KeyTtl::Missing,
        })
    }

    async fn incr(&self, key: &str, delta: i64) -> CacheResult<i64> {
        self.add(key, delta)
    }

    async fn decr(&self, key: &str, delta: i64) -> CacheResult<i64> {
        let delta = delta
            .checked_neg()
            .ok_or_else(|| CacheError::Backend(format!("decrement of '{}' would overflow", key)))?;
        self.add(key, delta)
    }

    async fn delete(&self, keys: &[String]) -> CacheResult<u64> {
        let now = Instant::now();
        let removed = keys
            .iter()
            .filter_map(|key| self.entries.remove(key))
            .filter(|(_, entry)| !entry.is_expired(now))
            .count();
        Ok(removed as u64)
    }

    async fn keys(&self, pattern: &str) -> CacheResult<Vec<String>> {
        let matcher = glob_to_regex(pattern)?;
        let now = Instant::now();

        let mut keys: Vec<String> = self
            .entries
            .iter()
            .filter(|entry| !entry.value().is_expired(now) && matcher.is_match(entry.key()))
            .map(|entry| entry.key().clone())
            .collect();
        keys.sort();
        Ok(keys)
    }

    async fn hmset(&self, key: &str, fields: &HashMap<String, String>) -> CacheResult<()> {
        self.purge(key);
        let mut entry = self
            .entries
            .entry(key.to_string())
            .or_insert_with(|| Entry::new(Stored::Hash(HashMap::new())));

        match entry.value {
            Stored::Hash(ref mut hash) => {
                hash.extend(fields.iter().map(|(k, v)| (k.clone(), v.clone())));
                Ok(())
            }
            Stored::Text(_) => Err(wrong_type(key)),
        }
    }

    async fn hgetall(&self, key: &str) -> CacheResult<HashMap<String, String>> {
        self.purge(key);
        match self.entries.get(key) {
            Some(entry) => match entry.value {
                Stored::Hash(ref hash) => Ok(hash.clone()),
                Stored::Text(_) => Err(wrong_type(key)),
            },
            None => Ok(HashMap::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_glob_to_regex() {
        let re = glob_to_regex("balance:*").unwrap();
        assert!(re.is_match("balance:42"));
        assert!(!re.is_match("xbalance:42"));

        let re = glob_to_regex("h?llo").unwrap();
        assert!(re.is_match("hello"));
        assert!(!re.is_match("heello"));

        let re = glob_to_regex("h[ae]llo").unwrap();
        assert!(re.is_match("hallo"));
        assert!(!re.is_match("hillo"));

        let re = glob_to_regex("h[^e]llo").unwrap();
        assert!(re.is_match("hallo"));
        assert!(!re.is_match("hello"));

        let re = glob_to_regex(r"a.b\*").unwrap();
        assert!(re.is_match("a.b*"));
        assert!(!re.is_match("axb*"));
    }

    #[tokio::test]
    async fn test_expired_entries_are_invisible() {
        let cache = MemoryCache::new();
        cache.set_ex("otp", "1234", Duration::from_millis(20)).await.unwrap();
        assert_eq!(cache.get("otp").await.unwrap().as_deref(), Some("1234"));

        tokio::time::sleep(Duration::from_millis(40)).await;

        assert_eq!(cache.get("otp").await.unwrap(), None);
        assert_eq!(cache.ttl("otp").await.unwrap(), KeyTtl::Missing);
        assert!(cache.keys("*").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_wrong_type() {
        let cache = MemoryCache::new();
        cache.set("plain", "x").await.unwrap();
        let fields = HashMap::from([("a".to_string(), "1".to_string())]);

        assert!(matches!(
            cache.hmset("plain", &fields).await,
            Err(CacheError::Backend(_))
        ));

        cache.hmset("hash", &fields).await.unwrap();
        assert!(matches!(cache.get("hash").await, Err(CacheError::Backend(_))));
        assert!(matches!(cache.incr("hash", 1).await, Err(CacheError::Backend(_))));
    }
}
