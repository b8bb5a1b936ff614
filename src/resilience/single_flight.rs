//! Single-flight request coalescing.
//!
//! At most one leader exists per fingerprint. Everyone else arriving while
//! the leader is in flight subscribes to its result instead of calling the
//! upstream themselves.
//!
//! ```text
//! lead_or_join(fp)
//!     vacant   → insert watch sender, return Leader
//!     occupied → subscribe, return Follower
//!
//! Leader::publish(v) → remove entry → send v → followers wake
//! Leader dropped     → remove entry → sender dropped → followers get LeaderGone
//! ```
//!
//! The map entry is removed before the value is sent, so a request arriving
//! after publication starts a fresh flight rather than joining a finished one.

use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::sync::watch;

use crate::cache::Fingerprint;

/// The leader went away without publishing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("coalesced leader finished without publishing a result")]
pub struct LeaderGone;

pub struct Coalescer<T> {
    inflight: DashMap<Fingerprint, watch::Sender<Option<T>>>,
}

pub enum Role<T: Clone + Send + Sync + 'static> {
    Leader(LeaderGuard<T>),
    Follower(Follower<T>),
}

impl<T: Clone + Send + Sync + 'static> Coalescer<T> {
    pub fn new() -> Self {
        Self {
            inflight: DashMap::new(),
        }
    }

    /// Become the leader for `key`, or join the flight already under way.
    pub fn lead_or_join(self: &Arc<Self>, key: Fingerprint) -> Role<T> {
        match self.inflight.entry(key) {
            Entry::Occupied(flight) => Role::Follower(Follower {
                rx: flight.get().subscribe(),
            }),
            Entry::Vacant(slot) => {
                let (tx, _) = watch::channel(None);
                slot.insert(tx);
                Role::Leader(LeaderGuard {
                    coalescer: Arc::clone(self),
                    key,
                    published: false,
                })
            }
        }
    }

    /// Number of flights currently in progress.
    pub fn in_flight(&self) -> usize {
        self.inflight.len()
    }
}

impl<T: Clone + Send + Sync + 'static> Default for Coalescer<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Held by the single leader of a flight.
pub struct LeaderGuard<T: Clone + Send + Sync + 'static> {
    coalescer: Arc<Coalescer<T>>,
    key: Fingerprint,
    published: bool,
}

impl<T: Clone + Send + Sync + 'static> LeaderGuard<T> {
    pub fn key(&self) -> Fingerprint {
        self.key
    }

    /// Hand `value` to every follower and end the flight.
    pub fn publish(mut self, value: T) {
        self.published = true;
        if let Some((_, tx)) = self.coalescer.inflight.remove(&self.key) {
            tx.send_replace(Some(value));
        }
    }
}

impl<T: Clone + Send + Sync + 'static> Drop for LeaderGuard<T> {
    fn drop(&mut self) {
        if !self.published {
            tracing::warn!(fingerprint = %self.key, "Coalesced leader dropped without a result");
            self.coalescer.inflight.remove(&self.key);
        }
    }
}

/// A waiter on someone else's flight.
pub struct Follower<T> {
    rx: watch::Receiver<Option<T>>,
}

impl<T: Clone> Follower<T> {
    /// Wait for the leader's result. Dropping this future abandons the wait
    /// without touching the leader.
    pub async fn wait(mut self) -> Result<T, LeaderGone> {
        let value = self
            .rx
            .wait_for(Option::is_some)
            .await
            .map_err(|_| LeaderGone)?;
        value.clone().ok_or(LeaderGone)
    }
}
