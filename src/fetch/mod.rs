//! Fetch orchestration.
//!
//! Composes the response cache, error-budget gate, ban flag, coalescer and
//! token buckets into one pipeline per request. See `orchestrator.rs` for the
//! step order.

pub mod error;
pub mod orchestrator;
pub mod request;

pub use error::FetchError;
pub use orchestrator::Orchestrator;
pub use request::{CacheStatus, FetchRequest, ProxiedResponse};
