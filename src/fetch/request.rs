//! Inputs and outputs of the fetch pipeline.

use std::sync::Arc;

use axum::http::{HeaderMap, HeaderValue, Method, StatusCode};
use bytes::Bytes;

use crate::cache::CacheEntry;
use crate::resilience::TokenBucket;

/// A request as the orchestrator sees it: already shaped for the upstream.
#[derive(Clone)]
pub struct FetchRequest {
    pub method: Method,
    pub path: String,
    pub query: Option<String>,
    pub headers: HeaderMap,
    pub body: Bytes,
    /// Per-route bucket from the route table, taken in addition to the
    /// global one.
    pub route_limiter: Option<Arc<TokenBucket>>,
}

impl FetchRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: None,
            headers: HeaderMap::new(),
            body: Bytes::new(),
            route_limiter: None,
        }
    }

    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.query = Some(query.into());
        self
    }

    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    pub fn with_body(mut self, body: Bytes) -> Self {
        self.body = body;
        self
    }

    pub fn with_route_limiter(mut self, limiter: Option<Arc<TokenBucket>>) -> Self {
        self.route_limiter = limiter;
        self
    }

    /// GET and HEAD go through the cache and coalescer; everything else
    /// goes straight upstream.
    pub fn is_cacheable(&self) -> bool {
        self.method == Method::GET || self.method == Method::HEAD
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStatus {
    Hit,
    Miss,
}

impl CacheStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheStatus::Hit => "HIT",
            CacheStatus::Miss => "MISS",
        }
    }

    pub fn header_value(&self) -> HeaderValue {
        HeaderValue::from_static(self.as_str())
    }
}

/// A response produced by the pipeline: upstream headers are still raw.
#[derive(Debug, Clone, PartialEq)]
pub struct ProxiedResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
    pub cache: CacheStatus,
}

impl ProxiedResponse {
    pub fn from_entry(entry: CacheEntry) -> Self {
        Self {
            status: entry.status,
            headers: entry.headers,
            body: entry.body,
            cache: CacheStatus::Hit,
        }
    }
}
