//! The `SharedCache` trait and an in-process implementation.
//!
//! Uses the `impl Future`-returning async-trait idiom rather than a boxed
//! future, simplified to whole-blob get/set since a limiter stores its
//! entire state under one cache key rather than per-entry atomic
//! operations.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::error::StorageError;

/// A shared key-value cache backend used to persist a limiter's full state
/// blob across process restarts (§4.6). Errors are always non-fatal —
/// callers log and continue with in-memory state only.
pub trait SharedCache: Send + Sync + 'static {
    /// Fetch the raw bytes stored under `key`, if present and unexpired.
    fn get(&self, key: &str) -> impl Future<Output = Option<Vec<u8>>> + Send;

    /// Store `value` under `key` with the given TTL.
    fn set(
        &self,
        key: &str,
        value: Vec<u8>,
        ttl: Duration,
    ) -> impl Future<Output = std::result::Result<(), StorageError>> + Send;
}

impl<C: SharedCache + ?Sized> SharedCache for Arc<C> {
    async fn get(&self, key: &str) -> Option<Vec<u8>> {
        (**self).get(key).await
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> std::result::Result<(), StorageError> {
        (**self).set(key, value, ttl).await
    }
}

struct Entry {
    value: Vec<u8>,
    expires_at: Instant,
}

/// A process-local `SharedCache`, useful for tests and for sharing state
/// between limiters within a single process without an external service.
#[derive(Default)]
pub struct InMemoryCache {
    entries: Mutex<HashMap<String, Entry>>,
}

impl InMemoryCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }
}

impl SharedCache for InMemoryCache {
    async fn get(&self, key: &str) -> Option<Vec<u8>> {
        let entries = self.entries.lock();
        entries.get(key).filter(|entry| entry.expires_at > Instant::now()).map(|entry| entry.value.clone())
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> std::result::Result<(), StorageError> {
        let mut entries = self.entries.lock();
        entries.insert(key.to_string(), Entry { value, expires_at: Instant::now() + ttl });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_in_memory_cache_roundtrip() {
        let cache = InMemoryCache::new();
        cache.set("k", b"hello".to_vec(), Duration::from_secs(60)).await.unwrap();
        assert_eq!(cache.get("k").await, Some(b"hello".to_vec()));
    }

    #[tokio::test]
    async fn test_in_memory_cache_missing_key() {
        let cache = InMemoryCache::new();
        assert_eq!(cache.get("absent").await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_in_memory_cache_expires() {
        let cache = InMemoryCache::new();
        cache.set("k", b"hello".to_vec(), Duration::from_millis(10)).await.unwrap();
        tokio::time::advance(Duration::from_millis(20)).await;
        assert_eq!(cache.get("k").await, None);
    }
}
