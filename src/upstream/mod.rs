//! Upstream subsystem.
//!
//! # Data Flow
//! ```text
//! Leader request
//!     → client.rs (UpstreamClient: URL join, header injection, call)
//!     → UpstreamResponse
//!     → freshness.rs (Expires − Date → TTL)
//!     → budget.rs (remaining / reset headers → ErrorBudget)
//! ```
//!
//! # Design Decisions
//! - The client sits behind a trait so the orchestrator can run against a fake
//! - Transport failures are typed (`Timeout`, `Unavailable`) and never carry
//!   a partial response

pub mod budget;
pub mod client;
pub mod freshness;

pub use budget::{Admission, ErrorBudget, ErrorBudgetTracker};
pub use client::{ReqwestUpstream, UpstreamClient, UpstreamError, UpstreamRequest, UpstreamResponse};
pub use freshness::{is_cacheable_status, ttl_from_headers};
