//! Time-bounded memoization
//!
//! [`TtlCache`] replaces function-level memoization with an explicit value that
//! can be inspected and invalidated. Entries expire against `tokio::time`, so a
//! paused test clock controls expiry.

use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;

#[derive(Clone, Debug)]
struct Entry<V> {
    value: V,
    expires_at: Instant,
}

/// Concurrent cache whose entries live for a caller-chosen TTL
///
/// Clones share the same storage.
#[derive(Clone, Debug)]
pub struct TtlCache<K, V> {
    entries: Arc<RwLock<HashMap<K, Entry<V>>>>,
}

impl<K, V> Default for TtlCache<K, V> {
    fn default() -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    /// Empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Live value for `key`, if any
    pub async fn get(&self, key: &K) -> Option<V> {
        let entries = self.entries.read().await;
        entries
            .get(key)
            .filter(|e| e.expires_at > Instant::now())
            .map(|e| e.value.clone())
    }

    /// Store `value` for `ttl`, replacing any previous entry
    pub async fn insert(&self, key: K, value: V, ttl: Duration) {
        let expires_at = Instant::now() + ttl;
        let mut entries = self.entries.write().await;
        entries.retain(|_, e| e.expires_at > Instant::now());
        entries.insert(key, Entry { value, expires_at });
    }

    /// Return the live value for `key`, or run `fetch` and cache its success
    ///
    /// Errors are returned as-is and leave the cache untouched. Concurrent
    /// misses for the same key may each run `fetch`; the last one to finish
    /// wins.
    pub async fn get_or_fetch<F, Fut, E>(&self, key: K, ttl: Duration, fetch: F) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        if let Some(value) = self.get(&key).await {
            return Ok(value);
        }
        let value = fetch().await?;
        self.insert(key, value.clone(), ttl).await;
        Ok(value)
    }

    /// Drop one entry; returns whether it was present
    pub async fn invalidate(&self, key: &K) -> bool {
        self.entries.write().await.remove(key).is_some()
    }

    /// Drop every entry
    pub async fn clear(&self) {
        self.entries.write().await.clear();
    }

    /// Number of live entries
    pub async fn len(&self) -> usize {
        let now = Instant::now();
        self.entries
            .read()
            .await
            .values()
            .filter(|e| e.expires_at > now)
            .count()
    }

    /// True when no live entry remains
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
