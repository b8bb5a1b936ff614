//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, rates > 0)
//! - Validate addresses and the upstream origin
//! - Validate the route table
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ProxyConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use axum::http::{Method, StatusCode};
use url::Url;

use crate::config::schema::{ProxyConfig, ADMIN_KEY_PLACEHOLDER};
use crate::routing::PathPattern;

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("{field}: invalid socket address {value:?}")]
    InvalidAddress { field: &'static str, value: String },
    #[error("upstream.base_url: {0}")]
    InvalidUpstream(String),
    #[error("{0} must be greater than zero")]
    MustBePositive(&'static str),
    #[error("route {route:?}: invalid pattern {pattern:?}: {reason}")]
    InvalidPattern {
        route: String,
        pattern: String,
        reason: String,
    },
    #[error("route {route:?}: unknown method {method:?}")]
    InvalidMethod { route: String, method: String },
    #[error("route {route:?}: hard_rate_limit must be greater than zero")]
    InvalidHardLimit { route: String },
    #[error("ban.status {0} is not a valid HTTP status")]
    InvalidBanStatus(u16),
    #[error("admin.api_key must be changed when the admin API is enabled")]
    PlaceholderAdminKey,
}

/// Check a parsed configuration for semantic errors.
pub fn validate_config(config: &ProxyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    check_address(
        &mut errors,
        "listener.bind_address",
        &config.listener.bind_address,
    );

    match Url::parse(&config.upstream.base_url) {
        Ok(url) if matches!(url.scheme(), "http" | "https") && url.has_host() => {}
        Ok(url) => errors.push(ValidationError::InvalidUpstream(format!(
            "unsupported origin {url}"
        ))),
        Err(e) => errors.push(ValidationError::InvalidUpstream(e.to_string())),
    }

    if config.upstream.timeout_secs == 0 {
        errors.push(ValidationError::MustBePositive("upstream.timeout_secs"));
    }
    if config.upstream.connect_timeout_secs == 0 {
        errors.push(ValidationError::MustBePositive("upstream.connect_timeout_secs"));
    }
    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::MustBePositive("timeouts.request_secs"));
    }
    if config.cache.sweep_interval_secs == 0 {
        errors.push(ValidationError::MustBePositive("cache.sweep_interval_secs"));
    }
    if config.cache.max_entries == 0 {
        errors.push(ValidationError::MustBePositive("cache.max_entries"));
    }
    if config.rate_limit.enabled && config.rate_limit.requests_per_second == 0 {
        errors.push(ValidationError::MustBePositive(
            "rate_limit.requests_per_second",
        ));
    }
    if config.dial_home.enabled && config.dial_home.interval_secs == 0 {
        errors.push(ValidationError::MustBePositive("dial_home.interval_secs"));
    }

    if StatusCode::from_u16(config.ban.status).is_err() {
        errors.push(ValidationError::InvalidBanStatus(config.ban.status));
    }

    for route in &config.routes {
        if let Err(e) = PathPattern::parse(&route.pattern) {
            errors.push(ValidationError::InvalidPattern {
                route: route.name.clone(),
                pattern: route.pattern.clone(),
                reason: e.to_string(),
            });
        }
        for method in &route.methods {
            if Method::from_bytes(method.to_ascii_uppercase().as_bytes()).is_err() {
                errors.push(ValidationError::InvalidMethod {
                    route: route.name.clone(),
                    method: method.clone(),
                });
            }
        }
        if route.hard_rate_limit == Some(0) {
            errors.push(ValidationError::InvalidHardLimit {
                route: route.name.clone(),
            });
        }
    }

    if config.observability.metrics_enabled {
        check_address(
            &mut errors,
            "observability.metrics_address",
            &config.observability.metrics_address,
        );
    }

    if config.admin.enabled {
        check_address(&mut errors, "admin.bind_address", &config.admin.bind_address);
        if config.admin.api_key == ADMIN_KEY_PLACEHOLDER || config.admin.api_key.is_empty() {
            errors.push(ValidationError::PlaceholderAdminKey);
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_address(errors: &mut Vec<ValidationError>, field: &'static str, value: &str) {
    if value.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidAddress {
            field,
            value: value.to_string(),
        });
    }
}
