//! Storage interface behind the response cache.
//!
//! Backends are interchangeable: the in-process map, the bounded cache, or
//! any networked key-value store can implement [`CacheStore`]. Every method
//! is async because a networked backend suspends on I/O.

use async_trait::async_trait;
use axum::http::{HeaderMap, StatusCode};
use bytes::Bytes;
use tokio::time::Instant;

use crate::cache::Fingerprint;

/// A stored upstream response.
///
/// Created once from a cacheable response and never mutated afterwards;
/// an overwrite replaces the whole entry.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
    pub expires_at: Instant,
}

impl CacheEntry {
    /// True once `now` has reached the expiry instant.
    pub fn is_expired_at(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

/// Failure of the backing store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("cache backend unavailable: {0}")]
    Unavailable(String),
    #[error("cache backend rejected operation: {0}")]
    Rejected(String),
}

/// Key-value storage for cache entries.
#[async_trait]
pub trait CacheStore: Send + Sync + 'static {
    /// Fetch an entry. Implementations must not return entries whose
    /// expiry has passed, even if no sweep has removed them yet.
    async fn get(&self, key: &Fingerprint) -> Result<Option<CacheEntry>, StoreError>;

    /// Insert or replace an entry.
    async fn set(&self, key: Fingerprint, entry: CacheEntry) -> Result<(), StoreError>;

    /// Whether a live (unexpired) entry exists.
    async fn exists(&self, key: &Fingerprint) -> Result<bool, StoreError> {
        Ok(self.get(key).await?.is_some())
    }

    /// Remove every expired entry, returning how many were removed.
    async fn evict_expired(&self) -> Result<usize, StoreError>;

    /// Remove everything.
    async fn clear(&self) -> Result<(), StoreError>;

    /// Number of stored entries, expired ones included until swept.
    async fn len(&self) -> Result<usize, StoreError>;

    /// Backend name for logs.
    fn name(&self) -> &'static str;
}
