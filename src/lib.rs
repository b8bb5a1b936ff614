//! Caching, coalescing, rate-limited proxy for the EVE Swagger Interface.

pub mod admin;
pub mod cache;
pub mod config;
pub mod discovery;
pub mod fetch;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod resilience;
pub mod routing;
pub mod upstream;

pub use config::schema::ProxyConfig;
pub use fetch::Orchestrator;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
