//! Size-bounded cache store with per-entry expiry.

use std::time::Duration;

use async_trait::async_trait;
use moka::sync::Cache;
use moka::Expiry;
use tokio::time::Instant;

use crate::cache::store::{CacheEntry, CacheStore, StoreError};
use crate::cache::Fingerprint;

/// Expires each entry at its own `expires_at`.
struct EntryExpiry;

impl EntryExpiry {
    fn remaining(entry: &CacheEntry) -> Option<Duration> {
        Some(entry.expires_at.saturating_duration_since(Instant::now()))
    }
}

impl Expiry<Fingerprint, CacheEntry> for EntryExpiry {
    fn expire_after_create(
        &self,
        _key: &Fingerprint,
        value: &CacheEntry,
        _created_at: std::time::Instant,
    ) -> Option<Duration> {
        Self::remaining(value)
    }

    fn expire_after_update(
        &self,
        _key: &Fingerprint,
        value: &CacheEntry,
        _updated_at: std::time::Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Self::remaining(value)
    }
}

/// Cache store holding at most `max_entries` responses.
///
/// When full, the least valuable entries are evicted by the underlying
/// cache's admission policy.
#[derive(Clone)]
pub struct BoundedStore {
    inner: Cache<Fingerprint, CacheEntry>,
}

impl BoundedStore {
    pub fn new(max_entries: u64) -> Self {
        let inner = Cache::builder()
            .max_capacity(max_entries)
            .expire_after(EntryExpiry)
            .build();
        Self { inner }
    }
}

#[async_trait]
impl CacheStore for BoundedStore {
    async fn get(&self, key: &Fingerprint) -> Result<Option<CacheEntry>, StoreError> {
        let now = Instant::now();
        Ok(self.inner.get(key).filter(|entry| !entry.is_expired_at(now)))
    }

    async fn set(&self, key: Fingerprint, entry: CacheEntry) -> Result<(), StoreError> {
        self.inner.insert(key, entry);
        Ok(())
    }

    async fn evict_expired(&self) -> Result<usize, StoreError> {
        let now = Instant::now();
        let expired: Vec<Fingerprint> = self
            .inner
            .iter()
            .filter(|(_, entry)| entry.is_expired_at(now))
            .map(|(key, _)| *key)
            .collect();
        for key in &expired {
            self.inner.invalidate(key);
        }
        self.inner.run_pending_tasks();
        Ok(expired.len())
    }

    async fn clear(&self) -> Result<(), StoreError> {
        self.inner.invalidate_all();
        self.inner.run_pending_tasks();
        Ok(())
    }

    async fn len(&self) -> Result<usize, StoreError> {
        self.inner.run_pending_tasks();
        Ok(self.inner.entry_count() as usize)
    }

    fn name(&self) -> &'static str {
        "bounded"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{HeaderMap, Method, StatusCode};
    use bytes::Bytes;

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

    fn entry(body: &'static str, ttl: Duration) -> CacheEntry {
        CacheEntry {
            status: StatusCode::OK,
            headers: HeaderMap::new(),
            body: Bytes::from_static(body.as_bytes()),
            expires_at: Instant::now() + ttl,
        }
    }

    #[tokio::test]
    async fn overwrite_replaces_entry() {
        let store = BoundedStore::new(10);
        store.set(key("/a"), entry("one", Duration::from_secs(60))).await.unwrap();
        store.set(key("/a"), entry("two", Duration::from_secs(60))).await.unwrap();

        let got = store.get(&key("/a")).await.unwrap().unwrap();
        assert_eq!(got.body, Bytes::from_static(b"two"));
        assert_eq!(store.len().await.unwrap(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn read_time_expiry_check() {
        let store = BoundedStore::new(10);
        store.set(key("/a"), entry("x", Duration::from_secs(10))).await.unwrap();

        tokio::time::advance(Duration::from_secs(11)).await;
        assert!(store.get(&key("/a")).await.unwrap().is_none());
        assert_eq!(store.evict_expired().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn clear_drops_everything() {
        let store = BoundedStore::new(10);
        store.set(key("/a"), entry("x", Duration::from_secs(60))).await.unwrap();
        store.clear().await.unwrap();
        assert!(store.get(&key("/a")).await.unwrap().is_none());
    }
}
