//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Request to upstream:
//!     → circuit_breaker.rs (ban flag: short-circuit before any call)
//!     → single_flight.rs (one leader per fingerprint, followers wait)
//!     → rate_limit.rs (leader takes a token before calling)
//!     → after the call: circuit_breaker.rs observes the response
//! ```
//!
//! # Design Decisions
//! - Each primitive guards only its own state; no lock spans two of them
//! - The ban never clears on its own; only an operator resets it
//! - A leader's failure always releases its followers

pub mod circuit_breaker;
pub mod rate_limit;
pub mod single_flight;

pub use circuit_breaker::BanFlag;
pub use rate_limit::{RateLimitError, TokenBucket};
pub use single_flight::{Coalescer, Follower, LeaderGone, LeaderGuard, Role};
