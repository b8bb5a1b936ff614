//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, request ID, trace span, timeout)
//!     → reserved local endpoints, or the proxy fallback:
//!         → routing (route table, 404 on no match)
//!         → request.rs (strip Host, hop-by-hop and framing headers)
//!         → fetch orchestrator
//!         → response.rs (strip framing headers, add X-Proxy-Cache)
//!     → Send to client
//! ```

pub mod request;
pub mod response;
pub mod server;

pub use request::{forward_headers, X_REQUEST_ID};
pub use response::X_PROXY_CACHE;
pub use server::{AppState, HttpServer};
