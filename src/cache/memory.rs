//! Unbounded in-process cache store.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::time::Instant;

use crate::cache::store::{CacheEntry, CacheStore, StoreError};
use crate::cache::Fingerprint;

/// A concurrent map of fingerprint → entry.
///
/// Expired entries stay resident until [`CacheStore::evict_expired`] runs,
/// but reads never return them.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<DashMap<Fingerprint, CacheEntry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CacheStore for MemoryStore {
    async fn get(&self, key: &Fingerprint) -> Result<Option<CacheEntry>, StoreError> {
        let now = Instant::now();
        Ok(self
            .inner
            .get(key)
            .filter(|entry| !entry.is_expired_at(now))
            .map(|entry| entry.value().clone()))
    }

    async fn set(&self, key: Fingerprint, entry: CacheEntry) -> Result<(), StoreError> {
        self.inner.insert(key, entry);
        Ok(())
    }

    async fn evict_expired(&self) -> Result<usize, StoreError> {
        let now = Instant::now();
        let before = self.inner.len();
        self.inner.retain(|_, entry| !entry.is_expired_at(now));
        Ok(before.saturating_sub(self.inner.len()))
    }

    async fn clear(&self) -> Result<(), StoreError> {
        self.inner.clear();
        Ok(())
    }

    async fn len(&self) -> Result<usize, StoreError> {
        Ok(self.inner.len())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{HeaderMap, Method, StatusCode};
    use bytes::Bytes;
    use std::time::Duration;

    use crate::cache::FingerprintHeaders;

    fn key(path: &str) -> Fingerprint {
        Fingerprint::compute(
            &Method::GET,
            path,
            None,
            &HeaderMap::new(),
            &FingerprintHeaders::default(),
        )
    }

    fn entry(ttl: Duration) -> CacheEntry {
        CacheEntry {
            status: StatusCode::OK,
            headers: HeaderMap::new(),
            body: Bytes::from_static(b"{}"),
            expires_at: Instant::now() + ttl,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn expired_entries_are_invisible_before_sweep() {
        let store = MemoryStore::new();
        store.set(key("/a"), entry(Duration::from_secs(5))).await.unwrap();
        assert!(store.exists(&key("/a")).await.unwrap());

        tokio::time::advance(Duration::from_secs(5)).await;
        assert!(store.get(&key("/a")).await.unwrap().is_none());
        assert_eq!(store.len().await.unwrap(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn sweep_removes_only_expired() {
        let store = MemoryStore::new();
        store.set(key("/short"), entry(Duration::from_secs(1))).await.unwrap();
        store.set(key("/long"), entry(Duration::from_secs(60))).await.unwrap();

        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(store.evict_expired().await.unwrap(), 1);
        assert_eq!(store.len().await.unwrap(), 1);
        assert!(store.exists(&key("/long")).await.unwrap());
    }

    #[tokio::test]
    async fn clear_drops_everything() {
        let store = MemoryStore::new();
        store.set(key("/a"), entry(Duration::from_secs(60))).await.unwrap();
        store.set(key("/b"), entry(Duration::from_secs(60))).await.unwrap();
        store.clear().await.unwrap();
        assert_eq!(store.len().await.unwrap(), 0);
    }
}
