//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the proxy.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for the caching proxy.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ProxyConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// The single upstream API this proxy fronts.
    pub upstream: UpstreamConfig,

    /// Response cache settings.
    pub cache: CacheConfig,

    /// Upstream error-budget tracking and admission.
    pub error_budget: ErrorBudgetConfig,

    /// Ban detection (circuit breaker).
    pub ban: BanConfig,

    /// Static outbound rate limit.
    pub rate_limit: RateLimitConfig,

    /// Inbound timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Proxy discovery registration.
    pub dial_home: DialHomeConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Admin API settings.
    pub admin: AdminConfig,

    /// Request limits.
    pub security: SecurityConfig,

    /// Declarative route table, first match wins.
    pub routes: Vec<RouteConfig>,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:9501").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:9501".to_string(),
        }
    }
}

/// Upstream origin and the headers injected into every upstream call.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct UpstreamConfig {
    /// Base origin, e.g. "https://esi.evetech.net".
    pub base_url: String,

    /// User-Agent sent upstream in place of the client's.
    pub user_agent: String,

    /// Accept header sent upstream.
    pub accept: String,

    /// Total timeout for one upstream call in seconds.
    pub timeout_secs: u64,

    /// Connection establishment timeout in seconds.
    pub connect_timeout_secs: u64,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: "https://esi.evetech.net".to_string(),
            user_agent: "ESI-PROXY/1.0".to_string(),
            accept: "application/json".to_string(),
            timeout_secs: 30,
            connect_timeout_secs: 5,
        }
    }
}

/// Which storage implementation backs the response cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheBackend {
    /// Unbounded concurrent map, swept periodically.
    Memory,
    /// Size-bounded cache with per-entry expiry.
    Bounded,
}

/// Response cache configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CacheConfig {
    pub backend: CacheBackend,

    /// Capacity of the bounded backend. Ignored by `memory`.
    pub max_entries: u64,

    /// Interval of the expired-entry sweep in seconds.
    pub sweep_interval_secs: u64,

    /// Request headers (besides path and query) that take part in the
    /// cache fingerprint. Compared case-insensitively.
    pub fingerprint_headers: Vec<String>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            backend: CacheBackend::Memory,
            max_entries: 100_000,
            sweep_interval_secs: 60,
            fingerprint_headers: vec![
                "authorization".to_string(),
                "accept-language".to_string(),
                "if-none-match".to_string(),
            ],
        }
    }
}

/// Error-budget tracking configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ErrorBudgetConfig {
    /// Hold requests until the budget window resets instead of rejecting them.
    pub wait_for_reset: bool,

    /// Budget assumed before any upstream response has been seen.
    pub initial_remaining: i64,

    /// Reset window assumed before any upstream response has been seen.
    pub initial_reset_secs: u64,

    /// Response header carrying the remaining budget.
    pub remaining_header: String,

    /// Response header carrying seconds until the budget resets.
    pub reset_header: String,

    /// Delay leaders in proportion to how much budget has been spent.
    pub adaptive_backoff: bool,
}

impl Default for ErrorBudgetConfig {
    fn default() -> Self {
        Self {
            wait_for_reset: false,
            initial_remaining: 100,
            initial_reset_secs: 60,
            remaining_header: "x-esi-error-limit-remain".to_string(),
            reset_header: "x-esi-error-limit-reset".to_string(),
            adaptive_backoff: false,
        }
    }
}

/// Ban detection configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BanConfig {
    /// Status the upstream answers with once it has banned us.
    pub status: u16,

    /// Body fragment that must accompany `status` for the ban to count.
    pub message: String,

    /// File whose presence marks the proxy as banned across restarts.
    pub marker_path: Option<String>,
}

impl Default for BanConfig {
    fn default() -> Self {
        Self {
            status: 401,
            message: "You have been banned".to_string(),
            marker_path: None,
        }
    }
}

/// Outbound rate limiting configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Enable the global token bucket.
    pub enabled: bool,

    /// Maximum upstream calls per second.
    pub requests_per_second: u32,

    /// Burst capacity. Zero means "same as requests_per_second".
    pub burst_size: u32,

    /// Longest a leader may be queued for a token before the bucket
    /// reports itself saturated, in milliseconds.
    pub max_wait_ms: u64,

    /// Fixed delay before the single retry after saturation, in milliseconds.
    pub retry_delay_ms: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            requests_per_second: 500,
            burst_size: 0,
            max_wait_ms: 30_000,
            retry_delay_ms: 250,
        }
    }
}

/// Timeout configuration for inbound requests.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Deadline for a whole inbound request in seconds. Must cover the
    /// upstream timeout plus a possible budget-reset wait.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self { request_secs: 120 }
    }
}

/// Dial-home registration configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DialHomeConfig {
    pub enabled: bool,

    /// Registration endpoint.
    pub url: String,

    /// Public address under which this proxy is reachable.
    pub external_address: String,

    /// Owner identifier sent with the registration.
    pub owner: String,

    /// Fixed proxy name. Generated and persisted when absent.
    pub name: Option<String>,

    /// File the generated name is persisted to.
    pub name_path: String,

    /// Re-registration interval in seconds.
    pub interval_secs: u64,
}

impl Default for DialHomeConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            url: "https://eve-kill.com/api/proxy/add".to_string(),
            external_address: String::new(),
            owner: String::new(),
            name: None,
            name_path: "/tmp/esi-proxy.name".to_string(),
            interval_secs: 3600,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: true,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Admin API configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Enable admin API.
    pub enabled: bool,

    /// API key for authentication (Bearer token).
    pub api_key: String,

    /// Admin API bind address.
    pub bind_address: String,
}

/// Placeholder admin key; validation refuses it when the admin API is on.
pub const ADMIN_KEY_PLACEHOLDER: &str = "CHANGE_ME_IN_PRODUCTION";

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            api_key: ADMIN_KEY_PLACEHOLDER.to_string(),
            bind_address: "127.0.0.1:9502".to_string(),
        }
    }
}

/// Request limits.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Maximum inbound body size in bytes.
    pub max_body_size: usize,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            max_body_size: 2 * 1024 * 1024, // 2MB
        }
    }
}

/// One entry of the route table.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RouteConfig {
    /// Route identifier for logging/metrics.
    pub name: String,

    /// Segment pattern, e.g. "/latest/markets/{region_id}/history/" or "/{*path}".
    pub pattern: String,

    /// Allowed methods. Empty allows any method.
    #[serde(default)]
    pub methods: Vec<String>,

    /// Per-route ceiling on upstream calls per second.
    #[serde(default)]
    pub hard_rate_limit: Option<u32>,
}

impl RouteConfig {
    /// Route that accepts every method on every path.
    pub fn catch_all() -> Self {
        Self {
            name: "catch-all".to_string(),
            pattern: "/{*path}".to_string(),
            methods: Vec::new(),
            hard_rate_limit: None,
        }
    }
}
