//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with the reserved local endpoints and the proxy fallback
//! - Wire up middleware (request ID, tracing, timeout, body limit)
//! - Dispatch proxied requests through the route table to the orchestrator
//! - Serve until the shutdown future resolves

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    body::{Body, Bytes},
    extract::{DefaultBodyLimit, State},
    http::{header, HeaderName, Method, Request, StatusCode},
    middleware,
    response::{Html, IntoResponse, Response},
    routing::{any, get},
    Router,
};
use tokio::net::TcpListener;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::config::ProxyConfig;
use crate::fetch::{CacheStatus, FetchRequest, Orchestrator};
use crate::http::request::{forward_headers, X_REQUEST_ID};
use crate::http::response::X_PROXY_CACHE;
use crate::observability::metrics;
use crate::routing::{PatternError, Router as ProxyRouter};

const INDEX_HTML: &str = "<!DOCTYPE html>
<html>
<head><title>ESI Proxy</title></head>
<body>
<h1>ESI Proxy</h1>
<p>A caching, rate-limited proxy in front of the EVE Swagger Interface.</p>
<p>Use it exactly like the upstream API; see the
<a href=\"https://esi.evetech.net/ui/\">ESI documentation</a> for the available endpoints.</p>
</body>
</html>
";

const ROBOTS_TXT: &str = "User-agent: *\nDisallow: /";

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
    pub router: Arc<ProxyRouter>,
    pub max_body_size: usize,
}

/// HTTP server for the proxy.
pub struct HttpServer {
    router: Router,
    state: AppState,
}

impl HttpServer {
    /// Create a new HTTP server around a ready orchestrator.
    pub fn new(config: &ProxyConfig, orchestrator: Arc<Orchestrator>) -> Result<Self, PatternError> {
        let proxy_router = Arc::new(ProxyRouter::from_config(&config.routes, &config.rate_limit)?);

        let state = AppState {
            orchestrator,
            router: proxy_router,
            max_body_size: config.security.max_body_size,
        };

        let router = Self::build_router(config, state.clone());
        Ok(Self { router, state })
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &ProxyConfig, state: AppState) -> Router {
        Router::new()
            .route("/", get(index))
            .route("/healthz", get(|| async { "OK" }))
            .route("/readyz", get(|| async { "Ready" }))
            .route("/ping", get(|| async { "pong" }))
            .route("/robots.txt", get(robots))
            .route("/favicon.ico", any(not_found))
            .route("/.well-known/{*rest}", any(not_found))
            .fallback(proxy_handler)
            .with_state(state)
            .layer(DefaultBodyLimit::max(config.security.max_body_size))
            .layer(TimeoutLayer::new(Duration::from_secs(config.timeouts.request_secs)))
            .layer(middleware::map_response(tag_inbound_timeout))
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(TraceLayer::new_for_http().make_span_with(|request: &Request<Body>| {
                let request_id = request
                    .headers()
                    .get(X_REQUEST_ID)
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or("-");
                tracing::info_span!(
                    "request",
                    method = %request.method(),
                    path = %request.uri().path(),
                    request_id = %request_id,
                )
            }))
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// The fully layered router, for serving or in-process tests.
    pub fn into_router(self) -> Router {
        self.router
    }

    /// Run the server until `shutdown` resolves, then drain connections.
    pub async fn run<F>(self, listener: TcpListener, shutdown: F) -> Result<(), std::io::Error>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        axum::serve(listener, self.router.into_make_service())
            .with_graceful_shutdown(shutdown)
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

async fn robots() -> impl IntoResponse {
    ([(header::CONTENT_TYPE, "text/plain; charset=utf-8")], ROBOTS_TXT)
}

/// The timeout layer's 408 never passes through the core; tag it like the
/// core's own synthetic errors.
async fn tag_inbound_timeout(mut response: Response) -> Response {
    if response.status() == StatusCode::REQUEST_TIMEOUT {
        response
            .headers_mut()
            .entry(HeaderName::from_static(X_PROXY_CACHE))
            .or_insert(CacheStatus::Miss.header_value());
    }
    response
}

async fn not_found() -> StatusCode {
    StatusCode::NOT_FOUND
}

/// Main proxy handler.
/// Looks up the route, shapes the request and runs it through the pipeline.
async fn proxy_handler(State(state): State<AppState>, request: Request<Body>) -> Response {
    let start_time = Instant::now();
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let query = request.uri().query().map(str::to_string);

    let Some(route) = state.router.match_request(&method, &path) else {
        tracing::debug!(method = %method, path = %path, "No route matched");
        metrics::record_request(method.as_str(), 404, "none", start_time.elapsed());
        return (StatusCode::NOT_FOUND, "No matching route found").into_response();
    };
    let route_limiter = route.limiter();

    let (parts, body) = request.into_parts();
    let body = if method == Method::GET || method == Method::HEAD {
        Bytes::new()
    } else {
        match axum::body::to_bytes(body, state.max_body_size).await {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(path = %path, error = %e, "Failed to read request body");
                metrics::record_request(method.as_str(), 413, "none", start_time.elapsed());
                return (StatusCode::PAYLOAD_TOO_LARGE, "Request body too large").into_response();
            }
        }
    };

    let mut fetch = FetchRequest::new(method.clone(), path.clone())
        .with_headers(forward_headers(&parts.headers))
        .with_body(body)
        .with_route_limiter(route_limiter);
    if let Some(query) = query {
        fetch = fetch.with_query(query);
    }

    let (response, cache) = match state.orchestrator.fetch(fetch).await {
        Ok(proxied) => {
            let cache = match proxied.cache {
                CacheStatus::Hit => "hit",
                CacheStatus::Miss => "miss",
            };
            (proxied.into_response(), cache)
        }
        Err(e) => {
            tracing::debug!(path = %path, kind = e.kind(), "Request failed in fetch pipeline");
            (e.into_response(), "error")
        }
    };

    metrics::record_request(
        method.as_str(),
        response.status().as_u16(),
        cache,
        start_time.elapsed(),
    );
    response
}
