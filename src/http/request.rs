//! Request shaping for the upstream.
//!
//! # Responsibilities
//! - Drop headers the upstream must not see (`Host`, hop-by-hop, framing)
//! - Drop `Accept-Encoding`; the proxy negotiates its own encoding
//! - Keep `Authorization` and everything else verbatim
//!
//! `User-Agent` and `Accept` are replaced by the upstream client itself.

use axum::http::{header, HeaderMap, HeaderName};

pub const X_REQUEST_ID: &str = "x-request-id";

const HOP_BY_HOP: [HeaderName; 8] = [
    header::CONNECTION,
    HeaderName::from_static("keep-alive"),
    header::PROXY_AUTHENTICATE,
    header::PROXY_AUTHORIZATION,
    HeaderName::from_static("proxy-connection"),
    header::TE,
    header::TRAILER,
    header::UPGRADE,
];

/// Headers that describe a single connection or message framing.
pub(crate) fn is_hop_by_hop(name: &HeaderName) -> bool {
    HOP_BY_HOP.contains(name) || *name == header::TRANSFER_ENCODING
}

/// Names listed in the `Connection` header are hop-by-hop as well.
pub(crate) fn connection_listed(headers: &HeaderMap) -> Vec<HeaderName> {
    headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|name| HeaderName::from_bytes(name.trim().as_bytes()).ok())
        .collect()
}

/// Copy of the inbound headers that is safe to send upstream.
pub fn forward_headers(inbound: &HeaderMap) -> HeaderMap {
    let listed = connection_listed(inbound);
    let mut out = HeaderMap::with_capacity(inbound.len());
    for (name, value) in inbound {
        if *name == header::HOST
            || *name == header::CONTENT_LENGTH
            || *name == header::ACCEPT_ENCODING
            || is_hop_by_hop(name)
            || listed.contains(name)
        {
            continue;
        }
        out.append(name.clone(), value.clone());
    }
    out
}
