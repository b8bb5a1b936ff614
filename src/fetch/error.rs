//! Failures the fetch pipeline reports to clients.

use axum::http::StatusCode;

/// A failure synthesized by the proxy rather than returned by the upstream.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FetchError {
    #[error("You are banned from ESI")]
    Banned,

    #[error("Error limit reached, please try again in {retry_after_secs} seconds")]
    BudgetExhausted { retry_after_secs: u64 },

    #[error("Upstream request timed out")]
    UpstreamTimeout,

    #[error("Upstream unavailable")]
    UpstreamUnavailable,

    #[error("Outbound rate limit saturated, please retry")]
    RateLimited,

    #[error("Upstream request failed, please retry")]
    LeaderFailed,
}

/// Status used for an exhausted upstream error budget.
pub const BUDGET_EXHAUSTED_STATUS: u16 = 420;

impl FetchError {
    pub fn status(&self) -> StatusCode {
        match self {
            FetchError::Banned => StatusCode::UNAUTHORIZED,
            FetchError::BudgetExhausted { .. } => StatusCode::from_u16(BUDGET_EXHAUSTED_STATUS)
                .unwrap_or(StatusCode::TOO_MANY_REQUESTS),
            FetchError::UpstreamTimeout
            | FetchError::UpstreamUnavailable
            | FetchError::RateLimited
            | FetchError::LeaderFailed => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    /// Short label for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            FetchError::Banned => "banned",
            FetchError::BudgetExhausted { .. } => "budget_exhausted",
            FetchError::UpstreamTimeout => "upstream_timeout",
            FetchError::UpstreamUnavailable => "upstream_unavailable",
            FetchError::RateLimited => "rate_limited",
            FetchError::LeaderFailed => "leader_failed",
        }
    }
}
