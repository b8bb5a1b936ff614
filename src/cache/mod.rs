//! Response cache subsystem.
//!
//! # Data Flow
//! ```text
//! Cacheable request
//!     → fingerprint.rs (method + path + sorted query + whitelisted headers)
//!     → ResponseCache::get (store.rs trait → memory.rs | bounded.rs)
//!     → hit: served verbatim
//!     → miss: orchestrator fetches, then ResponseCache::set with the
//!       freshness TTL from the upstream headers
//!
//! Background:
//!     sweeper.rs → ResponseCache::evict_expired every sweep interval
//! ```
//!
//! # Design Decisions
//! - Expiry is checked at read time; the sweep only reclaims memory
//! - Store failures degrade to a miss or a skipped write, never an error
//!   visible to the client
//! - Entries are replaced wholesale, never mutated in place

pub mod bounded;
pub mod fingerprint;
pub mod memory;
pub mod store;
pub mod sweeper;

use std::sync::Arc;
use std::time::Duration;

use axum::http::{HeaderMap, StatusCode};
use bytes::Bytes;
use tokio::time::Instant;

use crate::config::{CacheBackend, CacheConfig};
use crate::observability::metrics;

pub use bounded::BoundedStore;
pub use fingerprint::{Fingerprint, FingerprintHeaders};
pub use memory::MemoryStore;
pub use store::{CacheEntry, CacheStore, StoreError};
pub use sweeper::CacheSweeper;

/// Response cache over a pluggable [`CacheStore`].
#[derive(Clone)]
pub struct ResponseCache {
    store: Arc<dyn CacheStore>,
}

impl ResponseCache {
    pub fn new(store: Arc<dyn CacheStore>) -> Self {
        Self { store }
    }

    /// Build the cache with the backend selected in configuration.
    pub fn from_config(config: &CacheConfig) -> Self {
        let store: Arc<dyn CacheStore> = match config.backend {
            CacheBackend::Memory => Arc::new(MemoryStore::new()),
            CacheBackend::Bounded => Arc::new(BoundedStore::new(config.max_entries)),
        };
        tracing::info!(backend = store.name(), "Response cache initialized");
        Self::new(store)
    }

    /// Look up a live entry. A store failure is treated as a miss.
    pub async fn get(&self, key: &Fingerprint) -> Option<CacheEntry> {
        match self.store.get(key).await {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!(fingerprint = %key, error = %e, "Cache read failed, treating as miss");
                metrics::record_cache_store_error("get");
                None
            }
        }
    }

    /// Whether a live entry exists. A store failure reads as absent.
    pub async fn exists(&self, key: &Fingerprint) -> bool {
        match self.store.exists(key).await {
            Ok(found) => found,
            Err(e) => {
                tracing::warn!(fingerprint = %key, error = %e, "Cache lookup failed");
                metrics::record_cache_store_error("exists");
                false
            }
        }
    }

    /// Store a response for `ttl`. A zero TTL means "not cacheable" and
    /// stores nothing. Returns whether the entry was written.
    pub async fn set(
        &self,
        key: Fingerprint,
        status: StatusCode,
        headers: HeaderMap,
        body: Bytes,
        ttl: Duration,
    ) -> bool {
        if ttl.is_zero() {
            return false;
        }
        let entry = CacheEntry {
            status,
            headers,
            body,
            expires_at: Instant::now() + ttl,
        };
        match self.store.set(key, entry).await {
            Ok(()) => {
                tracing::debug!(fingerprint = %key, ttl_secs = ttl.as_secs(), "Cached response");
                true
            }
            Err(e) => {
                tracing::warn!(fingerprint = %key, error = %e, "Cache write failed, response not cached");
                metrics::record_cache_store_error("set");
                false
            }
        }
    }

    /// Remove expired entries. Returns how many were removed.
    pub async fn evict_expired(&self) -> Result<usize, StoreError> {
        self.store.evict_expired().await
    }

    /// Drop every entry.
    pub async fn clear(&self) -> Result<(), StoreError> {
        self.store.clear().await
    }

    /// Number of stored entries.
    pub async fn len(&self) -> Result<usize, StoreError> {
        self.store.len().await
    }
}
