//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → command-line overrides (main.rs)
//!     → ProxyConfig (validated, immutable)
//!     → handed to startup, which builds every shared resource from it
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require a restart
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, ConfigError};
pub use schema::{
    AdminConfig, BanConfig, CacheBackend, CacheConfig, DialHomeConfig, ErrorBudgetConfig,
    ListenerConfig, LogFormat, ObservabilityConfig, ProxyConfig, RateLimitConfig, RouteConfig,
    SecurityConfig, TimeoutConfig, UpstreamConfig, ADMIN_KEY_PLACEHOLDER,
};
