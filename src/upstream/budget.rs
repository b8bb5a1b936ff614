//! Upstream error-budget tracking and admission.
//!
//! # Responsibilities
//! - Hold the most recently observed error budget as one atomic value
//! - Decide whether a request may be sent upstream
//! - Optionally derive a pre-call backoff window from a shrinking budget
//!
//! # Design Decisions
//! - Writers replace the whole snapshot; readers never see a torn value
//! - Last write wins between racing observations
//! - A zero budget only blocks until its own reset window has passed, so a
//!   stale observation cannot lock the proxy out forever

use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use axum::http::HeaderMap;
use tokio::time::Instant;

use crate::config::ErrorBudgetConfig;
use crate::observability::metrics;

/// Longest reset window accepted from the upstream. Larger values are
/// clamped so instant arithmetic cannot overflow.
pub const MAX_RESET_SECS: u64 = 86_400;

/// Snapshot of the upstream's rate-limit signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ErrorBudget {
    pub remaining: i64,
    pub reset_after_secs: u64,
    pub observed_at: Instant,
    /// End of the adaptive pre-call backoff, when one is scheduled.
    pub backoff_until: Option<Instant>,
}

impl ErrorBudget {
    fn window_end(&self) -> Instant {
        self.observed_at + Duration::from_secs(self.reset_after_secs)
    }
}

/// Outcome of an admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Open,
    Exhausted { retry_after: Duration },
}

pub struct ErrorBudgetTracker {
    current: ArcSwap<ErrorBudget>,
    config: ErrorBudgetConfig,
}

impl ErrorBudgetTracker {
    pub fn new(config: ErrorBudgetConfig) -> Self {
        let initial = ErrorBudget {
            remaining: config.initial_remaining,
            reset_after_secs: config.initial_reset_secs.min(MAX_RESET_SECS),
            observed_at: Instant::now(),
            backoff_until: None,
        };
        Self {
            current: ArcSwap::from_pointee(initial),
            config,
        }
    }

    pub fn snapshot(&self) -> ErrorBudget {
        **self.current.load()
    }

    /// Admission decision at `now`.
    pub fn check(&self, now: Instant) -> Admission {
        let budget = self.current.load();
        if budget.remaining > 0 {
            return Admission::Open;
        }
        let end = budget.window_end();
        if now >= end {
            return Admission::Open;
        }
        Admission::Exhausted {
            retry_after: end - now,
        }
    }

    /// Record the budget headers of an upstream response. A missing header
    /// keeps its previous value; with both missing nothing changes.
    pub fn observe(&self, headers: &HeaderMap) {
        let remaining = header_number::<i64>(headers, &self.config.remaining_header);
        let reset = header_number::<u64>(headers, &self.config.reset_header);
        if remaining.is_none() && reset.is_none() {
            return;
        }

        let previous = self.snapshot();
        self.replace(
            remaining.unwrap_or(previous.remaining),
            reset.unwrap_or(previous.reset_after_secs),
        );
    }

    /// Overwrite the budget with a fresh observation made now.
    pub fn replace(&self, remaining: i64, reset_after_secs: u64) {
        let reset_after_secs = reset_after_secs.min(MAX_RESET_SECS);
        let observed_at = Instant::now();
        let backoff_until = if self.config.adaptive_backoff {
            self.backoff_window(remaining, reset_after_secs)
                .map(|window| observed_at + window)
        } else {
            None
        };

        self.current.store(Arc::new(ErrorBudget {
            remaining,
            reset_after_secs,
            observed_at,
            backoff_until,
        }));
        metrics::record_error_budget(remaining);

        if remaining <= 0 {
            tracing::warn!(reset_after_secs, "Upstream error budget exhausted");
        }
    }

    /// `((initial − remaining) / initial)² × reset` seconds, for a budget
    /// below its initial value.
    fn backoff_window(&self, remaining: i64, reset_after_secs: u64) -> Option<Duration> {
        let initial = self.config.initial_remaining;
        if initial <= 0 || remaining >= initial {
            return None;
        }
        let spent = (initial - remaining.max(0)) as f64 / initial as f64;
        let secs = spent * spent * reset_after_secs as f64;
        (secs > 0.0).then(|| Duration::from_secs_f64(secs))
    }

    /// Pre-call backoff deadline still ahead of `now`, if any.
    pub fn backoff_until(&self, now: Instant) -> Option<Instant> {
        self.current.load().backoff_until.filter(|until| *until > now)
    }
}

fn header_number<T: std::str::FromStr>(headers: &HeaderMap, name: &str) -> Option<T> {
    headers
        .get(name)?
        .to_str()
        .ok()?
        .trim()
        .parse()
        .ok()
}
