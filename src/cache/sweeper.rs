//! Background removal of expired cache entries.
//!
//! # Responsibilities
//! - Periodically reclaim memory held by expired entries
//! - Publish the entry count gauge after each pass

use std::time::Duration;

use tokio::sync::broadcast;
use tokio::time;

use crate::cache::ResponseCache;
use crate::observability::metrics;

pub struct CacheSweeper {
    cache: ResponseCache,
    interval: Duration,
}

impl CacheSweeper {
    pub fn new(cache: ResponseCache, interval: Duration) -> Self {
        Self { cache, interval }
    }

    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        tracing::info!(interval_secs = self.interval.as_secs(), "Cache sweeper starting");

        let mut ticker = time::interval(self.interval);
        // The first tick fires immediately; nothing can have expired yet.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.sweep_once().await;
                }
                _ = shutdown.recv() => {
                    tracing::info!("Cache sweeper received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }

    /// Run a single eviction pass.
    pub async fn sweep_once(&self) {
        match self.cache.evict_expired().await {
            Ok(removed) => {
                if removed > 0 {
                    tracing::debug!(removed, "Evicted expired cache entries");
                }
                metrics::record_cache_evictions(removed);
            }
            Err(e) => {
                tracing::warn!(error = %e, "Cache sweep failed");
            }
        }
        if let Ok(len) = self.cache.len().await {
            metrics::record_cache_entries(len);
        }
    }
}
