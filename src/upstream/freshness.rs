//! Cache lifetime derived from upstream freshness headers.

use std::time::Duration;

use axum::http::{header, HeaderMap, StatusCode};
use chrono::{DateTime, FixedOffset};

/// TTL = `Expires` − `Date`.
///
/// Both are HTTP dates carrying their own zone. A missing or unparseable
/// header, or a non-positive difference, yields zero: not cacheable.
pub fn ttl_from_headers(headers: &HeaderMap) -> Duration {
    let (Some(expires), Some(date)) = (
        http_date(headers, header::EXPIRES),
        http_date(headers, header::DATE),
    ) else {
        return Duration::ZERO;
    };

    (expires - date).to_std().unwrap_or(Duration::ZERO)
}

/// Only successful and not-modified responses are stored.
pub fn is_cacheable_status(status: StatusCode) -> bool {
    matches!(status, StatusCode::OK | StatusCode::NOT_MODIFIED)
}

fn http_date(headers: &HeaderMap, name: header::HeaderName) -> Option<DateTime<FixedOffset>> {
    let raw = headers.get(name)?.to_str().ok()?;
    DateTime::parse_from_rfc2822(raw.trim()).ok()
}
