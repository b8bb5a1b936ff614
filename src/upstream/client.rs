//! HTTP client adapter for the upstream API.
//!
//! # Responsibilities
//! - Join the configured base URL with the inbound path and raw query
//! - Inject the configured `User-Agent` and `Accept`
//! - Classify transport failures as timeout or unavailable

use std::time::Duration;

use async_trait::async_trait;
use axum::http::{header, HeaderMap, HeaderValue, Method, StatusCode};
use bytes::Bytes;

use crate::config::UpstreamConfig;

/// A shaped request ready to send upstream.
#[derive(Debug, Clone)]
pub struct UpstreamRequest {
    pub method: Method,
    pub path: String,
    pub query: Option<String>,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// A fully buffered upstream response.
#[derive(Debug, Clone)]
pub struct UpstreamResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum UpstreamError {
    #[error("upstream request timed out")]
    Timeout,
    #[error("upstream unavailable: {0}")]
    Unavailable(String),
}

/// Performs the actual upstream call.
#[async_trait]
pub trait UpstreamClient: Send + Sync + 'static {
    async fn send(&self, request: UpstreamRequest) -> Result<UpstreamResponse, UpstreamError>;
}

/// `base` + `/` + `path` (exactly one slash between them) + `?query`.
pub fn upstream_url(base: &str, path: &str, query: Option<&str>) -> String {
    let mut url = format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    );
    if let Some(q) = query.filter(|q| !q.is_empty()) {
        url.push('?');
        url.push_str(q);
    }
    url
}

/// [`UpstreamClient`] backed by a pooled `reqwest` client.
pub struct ReqwestUpstream {
    client: reqwest::Client,
    base_url: String,
    user_agent: HeaderValue,
    accept: HeaderValue,
}

impl ReqwestUpstream {
    pub fn new(config: &UpstreamConfig) -> Result<Self, UpstreamError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .gzip(true)
            .build()
            .map_err(|e| UpstreamError::Unavailable(e.to_string()))?;

        let user_agent = HeaderValue::from_str(&config.user_agent)
            .map_err(|e| UpstreamError::Unavailable(format!("invalid user agent: {e}")))?;
        let accept = HeaderValue::from_str(&config.accept)
            .map_err(|e| UpstreamError::Unavailable(format!("invalid accept header: {e}")))?;

        Ok(Self {
            client,
            base_url: config.base_url.clone(),
            user_agent,
            accept,
        })
    }
}

#[async_trait]
impl UpstreamClient for ReqwestUpstream {
    async fn send(&self, request: UpstreamRequest) -> Result<UpstreamResponse, UpstreamError> {
        let url = upstream_url(&self.base_url, &request.path, request.query.as_deref());

        let mut headers = request.headers;
        headers.insert(header::USER_AGENT, self.user_agent.clone());
        headers.insert(header::ACCEPT, self.accept.clone());

        let mut builder = self
            .client
            .request(request.method.clone(), &url)
            .headers(headers);
        if request.method != Method::GET && request.method != Method::HEAD {
            builder = builder.body(request.body);
        }

        let response = builder.send().await.map_err(classify)?;
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes().await.map_err(classify)?;

        tracing::debug!(url = %url, status = %status, bytes = body.len(), "Upstream responded");

        Ok(UpstreamResponse {
            status,
            headers,
            body,
        })
    }
}

fn classify(e: reqwest::Error) -> UpstreamError {
    if e.is_timeout() {
        UpstreamError::Timeout
    } else {
        UpstreamError::Unavailable(e.to_string())
    }
}
