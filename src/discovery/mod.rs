//! Proxy discovery.
//!
//! Registers this proxy with a public directory so clients can find it.
//! Entirely off the fetch path: failures are logged and retried on the next
//! interval.

pub mod dial_home;

pub use dial_home::{DialHome, DialHomeError};
