//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming Request (method, path)
//!     → router.rs (ordered route scan)
//!     → matcher.rs (path pattern AND method list)
//!     → Return: matched Route (with its optional hard-limit bucket) or NoMatch
//!
//! Route Compilation (at startup):
//!     RouteConfig[] (empty → single catch-all)
//!     → Parse patterns, build matchers
//!     → Build per-route token buckets
//!     → Freeze as immutable Router
//! ```
//!
//! # Design Decisions
//! - Routes compiled at startup, immutable at runtime
//! - Deterministic: first match wins, in configuration order
//! - Routes never influence caching or coalescing; they only admit the
//!   request and contribute a rate limit

pub mod matcher;
pub mod router;

pub use matcher::{PathPattern, PatternError};
pub use router::{Route, Router};
