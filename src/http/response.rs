//! Response shaping for the client.
//!
//! # Responsibilities
//! - Tag every proxied response with `X-Proxy-Cache: HIT|MISS`
//! - Drop `Content-Encoding`, `Content-Length`, `Transfer-Encoding` and
//!   hop-by-hop headers; the body is already decoded and axum recomputes
//!   framing
//! - Render pipeline failures as plain-text synthetic responses

use axum::body::Body;
use axum::http::{header, HeaderMap, HeaderName, HeaderValue};
use axum::response::{IntoResponse, Response};

use crate::fetch::{CacheStatus, FetchError, ProxiedResponse};
use crate::http::request::{connection_listed, is_hop_by_hop};

pub const X_PROXY_CACHE: &str = "x-proxy-cache";

/// Upstream headers that may be passed to the client.
pub fn client_headers(upstream: &HeaderMap) -> HeaderMap {
    let listed = connection_listed(upstream);
    let mut out = HeaderMap::with_capacity(upstream.len() + 1);
    for (name, value) in upstream {
        if *name == header::CONTENT_ENCODING
            || *name == header::CONTENT_LENGTH
            || is_hop_by_hop(name)
            || listed.contains(name)
        {
            continue;
        }
        out.append(name.clone(), value.clone());
    }
    out
}

impl IntoResponse for ProxiedResponse {
    fn into_response(self) -> Response {
        let mut headers = client_headers(&self.headers);
        headers.insert(HeaderName::from_static(X_PROXY_CACHE), self.cache.header_value());

        let mut response = Response::new(Body::from(self.body));
        *response.status_mut() = self.status;
        *response.headers_mut() = headers;
        response
    }
}

impl IntoResponse for FetchError {
    fn into_response(self) -> Response {
        let status = self.status();
        let mut response = (status, self.to_string()).into_response();
        response.headers_mut().insert(
            HeaderName::from_static(X_PROXY_CACHE),
            CacheStatus::Miss.header_value(),
        );
        if let FetchError::BudgetExhausted { retry_after_secs } = self {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(retry_after_secs));
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use bytes::Bytes;

    #[test]
    fn proxied_response_is_tagged_and_stripped() {
        let mut upstream = HeaderMap::new();
        upstream.insert(header::CONTENT_ENCODING, HeaderValue::from_static("gzip"));
        upstream.insert(header::CONTENT_LENGTH, HeaderValue::from_static("99"));
        upstream.insert(header::TRANSFER_ENCODING, HeaderValue::from_static("chunked"));
        upstream.insert(header::ETAG, HeaderValue::from_static("\"abc\""));
        upstream.insert("x-esi-error-limit-remain", HeaderValue::from_static("100"));

        let response = ProxiedResponse {
            status: StatusCode::OK,
            headers: upstream,
            body: Bytes::from_static(b"{}"),
            cache: CacheStatus::Hit,
        }
        .into_response();

        let h = response.headers();
        assert_eq!(h.get(X_PROXY_CACHE).unwrap(), "HIT");
        assert_eq!(h.get(header::ETAG).unwrap(), "\"abc\"");
        assert_eq!(h.get("x-esi-error-limit-remain").unwrap(), "100");
        assert!(h.get(header::CONTENT_ENCODING).is_none());
        assert!(h.get(header::TRANSFER_ENCODING).is_none());
        assert!(h.get(header::CONTENT_LENGTH).is_none());
    }

    #[test]
    fn budget_error_carries_retry_after() {
        let response = FetchError::BudgetExhausted { retry_after_secs: 30 }.into_response();
        assert_eq!(response.status().as_u16(), 420);
        assert_eq!(response.headers().get(header::RETRY_AFTER).unwrap(), "30");
        assert_eq!(response.headers().get(X_PROXY_CACHE).unwrap(), "MISS");
    }
}
