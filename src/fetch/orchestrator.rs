//! The per-request decision pipeline.
//!
//! # Data Flow
//! ```text
//! FetchRequest
//!     → ban flag set?                  → Banned (401)
//!     → error budget exhausted?        → BudgetExhausted (420) or wait
//!     → not GET/HEAD                   → straight to the upstream call
//!     → fingerprint → cache hit?       → HIT, no upstream call
//!     → coalescer
//!         follower → await leader's result → MISS
//!         leader   → token bucket(s) → adaptive backoff
//!                  → upstream call (with deadline)
//!                  → TTL from Expires − Date → cache if 200/304 and TTL > 0
//!                  → update error budget and ban flag
//!                  → publish to followers → MISS
//! ```
//!
//! # Design Decisions
//! - The leader's work runs in its own task: a client disconnect drops only
//!   that client's wait, never the upstream call or the cache write
//! - Leaders publish errors too, so followers never outlive a failed call
//! - Transport failures are not cached and do not touch budget or ban state

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use crate::cache::{Fingerprint, FingerprintHeaders, ResponseCache};
use crate::config::ProxyConfig;
use crate::fetch::error::FetchError;
use crate::fetch::request::{CacheStatus, FetchRequest, ProxiedResponse};
use crate::observability::metrics;
use crate::resilience::{BanFlag, Coalescer, Role, TokenBucket};
use crate::upstream::{
    is_cacheable_status, ttl_from_headers, Admission, ErrorBudgetTracker, UpstreamClient,
    UpstreamError, UpstreamRequest,
};

type FlightResult = Result<ProxiedResponse, FetchError>;

pub struct Orchestrator {
    cache: ResponseCache,
    budget: Arc<ErrorBudgetTracker>,
    ban: Arc<BanFlag>,
    coalescer: Arc<Coalescer<FlightResult>>,
    limiter: Option<Arc<TokenBucket>>,
    upstream: Arc<dyn UpstreamClient>,
    fingerprint_headers: FingerprintHeaders,
    wait_for_reset: bool,
    upstream_timeout: Duration,
    retry_delay: Duration,
}

impl Orchestrator {
    /// Build the pipeline and its shared state from configuration.
    pub fn new(config: &ProxyConfig, upstream: Arc<dyn UpstreamClient>) -> Self {
        let limiter = config.rate_limit.enabled.then(|| {
            Arc::new(TokenBucket::new(
                config.rate_limit.requests_per_second,
                config.rate_limit.burst_size,
                Duration::from_millis(config.rate_limit.max_wait_ms),
            ))
        });

        Self {
            cache: ResponseCache::from_config(&config.cache),
            budget: Arc::new(ErrorBudgetTracker::new(config.error_budget.clone())),
            ban: Arc::new(BanFlag::new(&config.ban)),
            coalescer: Arc::new(Coalescer::new()),
            limiter,
            upstream,
            fingerprint_headers: FingerprintHeaders::new(&config.cache.fingerprint_headers),
            wait_for_reset: config.error_budget.wait_for_reset,
            upstream_timeout: Duration::from_secs(config.upstream.timeout_secs),
            retry_delay: Duration::from_millis(config.rate_limit.retry_delay_ms),
        }
    }

    pub fn cache(&self) -> &ResponseCache {
        &self.cache
    }

    pub fn budget(&self) -> &ErrorBudgetTracker {
        &self.budget
    }

    pub fn ban(&self) -> &BanFlag {
        &self.ban
    }

    pub fn in_flight(&self) -> usize {
        self.coalescer.in_flight()
    }

    /// Serve one request.
    pub async fn fetch(self: &Arc<Self>, request: FetchRequest) -> FlightResult {
        if self.ban.is_banned() {
            return Err(FetchError::Banned);
        }
        self.admit().await?;

        if !request.is_cacheable() {
            return self.call_upstream(request, None).await;
        }

        let key = Fingerprint::compute(
            &request.method,
            &request.path,
            request.query.as_deref(),
            &request.headers,
            &self.fingerprint_headers,
        );

        if let Some(entry) = self.cache.get(&key).await {
            tracing::debug!(fingerprint = %key, "Cache hit");
            return Ok(ProxiedResponse::from_entry(entry));
        }

        match self.coalescer.lead_or_join(key) {
            Role::Follower(follower) => {
                tracing::debug!(fingerprint = %key, "Joining in-flight request");
                metrics::record_coalesced();
                let mut response = follower.wait().await.map_err(|_| FetchError::LeaderFailed)??;
                response.cache = CacheStatus::Miss;
                Ok(response)
            }
            Role::Leader(guard) => {
                let this = Arc::clone(self);
                let flight = tokio::spawn(async move {
                    let result = this.lead(key, request).await;
                    guard.publish(result.clone());
                    result
                });
                flight.await.unwrap_or_else(|e| {
                    tracing::error!(fingerprint = %key, error = %e, "Leader task failed");
                    Err(FetchError::LeaderFailed)
                })
            }
        }
    }

    /// Error-budget admission, waiting out the window when configured to.
    async fn admit(&self) -> Result<(), FetchError> {
        let Admission::Exhausted { retry_after } = self.budget.check(Instant::now()) else {
            return Ok(());
        };
        if !self.wait_for_reset {
            return Err(budget_exhausted(retry_after));
        }

        tracing::info!(
            wait_secs = retry_after.as_secs_f64(),
            "Error budget exhausted, waiting for reset"
        );
        tokio::time::sleep(retry_after).await;

        // The old window is over; only a newer exhausted observation blocks.
        match self.budget.check(Instant::now()) {
            Admission::Open => Ok(()),
            Admission::Exhausted { retry_after } => Err(budget_exhausted(retry_after)),
        }
    }

    async fn lead(&self, key: Fingerprint, request: FetchRequest) -> FlightResult {
        // A flight that finished between our lookup and taking the lead has
        // already filled the cache.
        if let Some(entry) = self.cache.get(&key).await {
            return Ok(ProxiedResponse::from_entry(entry));
        }
        self.call_upstream(request, Some(key)).await
    }

    async fn call_upstream(&self, request: FetchRequest, key: Option<Fingerprint>) -> FlightResult {
        self.rate_gate(request.route_limiter.as_deref()).await?;

        if let Some(until) = self.budget.backoff_until(Instant::now()) {
            tracing::debug!(
                wait_secs = (until - Instant::now()).as_secs_f64(),
                "Backing off before upstream call"
            );
            tokio::time::sleep_until(until).await;
        }

        // The flag may have tripped while this request was queued.
        if self.ban.is_banned() {
            return Err(FetchError::Banned);
        }

        let path = request.path.clone();
        let outbound = UpstreamRequest {
            method: request.method,
            path: request.path,
            query: request.query,
            headers: request.headers,
            body: request.body,
        };

        let response = match tokio::time::timeout(self.upstream_timeout, self.upstream.send(outbound)).await {
            Ok(Ok(response)) => response,
            Ok(Err(UpstreamError::Timeout)) | Err(_) => {
                tracing::warn!(path = %path, "Upstream request timed out");
                metrics::record_upstream_error("timeout");
                return Err(FetchError::UpstreamTimeout);
            }
            Ok(Err(UpstreamError::Unavailable(reason))) => {
                tracing::warn!(path = %path, error = %reason, "Upstream unavailable");
                metrics::record_upstream_error("unavailable");
                return Err(FetchError::UpstreamUnavailable);
            }
        };
        metrics::record_upstream_call(response.status.as_u16());

        if let Some(key) = key {
            let ttl = ttl_from_headers(&response.headers);
            if is_cacheable_status(response.status) && !ttl.is_zero() {
                self.cache
                    .set(
                        key,
                        response.status,
                        response.headers.clone(),
                        response.body.clone(),
                        ttl,
                    )
                    .await;
            }
        }

        self.budget.observe(&response.headers);
        if self.ban.observe(response.status, &response.body) {
            tracing::error!(path = %path, status = %response.status, "Ban response received from upstream");
        }

        Ok(ProxiedResponse {
            status: response.status,
            headers: response.headers,
            body: response.body,
            cache: CacheStatus::Miss,
        })
    }

    /// Take a token from the route bucket, then the global one. A saturated
    /// bucket is retried once after `retry_delay`.
    async fn rate_gate(&self, route: Option<&TokenBucket>) -> Result<(), FetchError> {
        for (scope, bucket) in [("route", route), ("global", self.limiter.as_deref())] {
            let Some(bucket) = bucket else {
                continue;
            };
            if let Err(e) = bucket.acquire().await {
                tracing::debug!(scope, error = %e, "Token bucket saturated, retrying once");
                tokio::time::sleep(self.retry_delay).await;
                if let Err(e) = bucket.acquire().await {
                    tracing::warn!(scope, error = %e, "Outbound rate limit saturated");
                    metrics::record_rate_limited(scope);
                    return Err(FetchError::RateLimited);
                }
            }
        }
        Ok(())
    }
}

fn budget_exhausted(retry_after: Duration) -> FetchError {
    let whole = retry_after.as_secs();
    let retry_after_secs = if retry_after.subsec_nanos() > 0 { whole + 1 } else { whole };
    FetchError::BudgetExhausted { retry_after_secs }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use async_trait::async_trait;
    use axum::http::{header, HeaderMap, HeaderValue, Method, StatusCode};
    use bytes::Bytes;
    use chrono::DateTime;

    use crate::upstream::UpstreamResponse;

    const DATE: &str = "Thu, 01 Jan 2026 12:00:00 GMT";
    const BAN_BODY: &str = "{\"error\":\"You have been banned from using ESI\"}";

    struct FakeUpstream {
        calls: AtomicUsize,
        delay: Duration,
        reply: Mutex<Result<UpstreamResponse, UpstreamError>>,
    }

    impl FakeUpstream {
        fn new(reply: Result<UpstreamResponse, UpstreamError>) -> Arc<Self> {
            Self::with_delay(reply, Duration::ZERO)
        }

        fn with_delay(reply: Result<UpstreamResponse, UpstreamError>, delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                delay,
                reply: Mutex::new(reply),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        fn set_reply(&self, reply: Result<UpstreamResponse, UpstreamError>) {
            *self.reply.lock().unwrap() = reply;
        }
    }

    #[async_trait]
    impl UpstreamClient for FakeUpstream {
        async fn send(&self, _request: UpstreamRequest) -> Result<UpstreamResponse, UpstreamError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            self.reply.lock().unwrap().clone()
        }
    }

    fn response(status: StatusCode, body: &'static str, ttl_secs: i64) -> UpstreamResponse {
        let date = DateTime::parse_from_rfc2822(DATE).unwrap();
        let expires = date + chrono::Duration::seconds(ttl_secs);

        let mut headers = HeaderMap::new();
        headers.insert(header::DATE, HeaderValue::from_static(DATE));
        headers.insert(
            header::EXPIRES,
            HeaderValue::from_str(&expires.to_rfc2822()).unwrap(),
        );
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
        UpstreamResponse {
            status,
            headers,
            body: Bytes::from_static(body.as_bytes()),
        }
    }

    fn orchestrator(config: ProxyConfig, upstream: Arc<FakeUpstream>) -> Arc<Orchestrator> {
        Arc::new(Orchestrator::new(&config, upstream))
    }

    fn get(path: &str) -> FetchRequest {
        FetchRequest::new(Method::GET, path)
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_identical_requests_share_one_call() {
        let upstream = FakeUpstream::with_delay(
            Ok(response(StatusCode::OK, "{\"players\":31000}", 30)),
            Duration::from_millis(100),
        );
        let orch = orchestrator(ProxyConfig::default(), upstream.clone());

        let handles: Vec<_> = (0..20)
            .map(|_| {
                let orch = orch.clone();
                tokio::spawn(async move { orch.fetch(get("/status/")).await })
            })
            .collect();

        for handle in handles {
            let response = handle.await.unwrap().unwrap();
            assert_eq!(response.status, StatusCode::OK);
            assert_eq!(response.body, Bytes::from_static(b"{\"players\":31000}"));
            assert_eq!(response.cache, CacheStatus::Miss);
        }
        assert_eq!(upstream.calls(), 1);
        assert_eq!(orch.in_flight(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn repeated_query_keys_coalesce() {
        let upstream = FakeUpstream::with_delay(
            Ok(response(StatusCode::OK, "[1,2]", 60)),
            Duration::from_millis(50),
        );
        let orch = orchestrator(ProxyConfig::default(), upstream.clone());

        let first = tokio::spawn({
            let orch = orch.clone();
            async move { orch.fetch(get("/characters/123/").with_query("foo=2&foo=1")).await }
        });
        let second = tokio::spawn({
            let orch = orch.clone();
            async move { orch.fetch(get("/characters/123/").with_query("foo=2&foo=1")).await }
        });

        let a = first.await.unwrap().unwrap();
        let b = second.await.unwrap().unwrap();
        assert_eq!((a.status, &a.headers, &a.body), (b.status, &b.headers, &b.body));
        assert_eq!(upstream.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn ttl_follows_expires_minus_date() {
        let upstream = FakeUpstream::new(Ok(response(StatusCode::OK, "{}", 10)));
        let orch = orchestrator(ProxyConfig::default(), upstream.clone());

        assert_eq!(orch.fetch(get("/status/")).await.unwrap().cache, CacheStatus::Miss);

        tokio::time::advance(Duration::from_secs(9)).await;
        assert_eq!(orch.fetch(get("/status/")).await.unwrap().cache, CacheStatus::Hit);
        assert_eq!(upstream.calls(), 1);

        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(orch.fetch(get("/status/")).await.unwrap().cache, CacheStatus::Miss);
        assert_eq!(upstream.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn uncacheable_responses_are_not_stored() {
        let upstream = FakeUpstream::new(Ok(response(StatusCode::OK, "{}", -5)));
        let orch = orchestrator(ProxyConfig::default(), upstream.clone());

        orch.fetch(get("/a")).await.unwrap();
        orch.fetch(get("/a")).await.unwrap();
        assert_eq!(upstream.calls(), 2);

        upstream.set_reply(Ok(response(StatusCode::NOT_FOUND, "{\"error\":\"nope\"}", 60)));
        let r = orch.fetch(get("/b")).await.unwrap();
        assert_eq!(r.status, StatusCode::NOT_FOUND);
        orch.fetch(get("/b")).await.unwrap();
        assert_eq!(upstream.calls(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn non_idempotent_methods_bypass_cache_and_coalescing() {
        let upstream = FakeUpstream::new(Ok(response(StatusCode::OK, "[]", 60)));
        let orch = orchestrator(ProxyConfig::default(), upstream.clone());

        let post = FetchRequest::new(Method::POST, "/universe/names/")
            .with_body(Bytes::from_static(b"[30000142]"));
        assert_eq!(orch.fetch(post.clone()).await.unwrap().cache, CacheStatus::Miss);
        assert_eq!(orch.fetch(post).await.unwrap().cache, CacheStatus::Miss);
        assert_eq!(upstream.calls(), 2);
        assert_eq!(orch.cache().len().await.unwrap(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn ban_response_latches() {
        let upstream = FakeUpstream::new(Ok(response(StatusCode::UNAUTHORIZED, BAN_BODY, 0)));
        let orch = orchestrator(ProxyConfig::default(), upstream.clone());

        let first = orch.fetch(get("/characters/1/")).await.unwrap();
        assert_eq!(first.status, StatusCode::UNAUTHORIZED);
        assert!(orch.ban().is_banned());

        upstream.set_reply(Ok(response(StatusCode::OK, "{}", 60)));
        assert_eq!(orch.fetch(get("/status/")).await, Err(FetchError::Banned));

        tokio::time::advance(Duration::from_secs(86_400)).await;
        assert_eq!(orch.fetch(get("/status/")).await, Err(FetchError::Banned));
        assert_eq!(upstream.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn ordinary_unauthorized_does_not_ban() {
        let upstream = FakeUpstream::new(Ok(response(
            StatusCode::UNAUTHORIZED,
            "{\"error\":\"authorization not provided\"}",
            0,
        )));
        let orch = orchestrator(ProxyConfig::default(), upstream.clone());

        orch.fetch(get("/characters/1/assets/")).await.unwrap();
        assert!(!orch.ban().is_banned());
        orch.fetch(get("/characters/1/assets/")).await.unwrap();
        assert_eq!(upstream.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_budget_fails_fast() {
        let upstream = FakeUpstream::new(Ok(response(StatusCode::OK, "{}", 60)));
        let orch = orchestrator(ProxyConfig::default(), upstream.clone());
        orch.budget().replace(0, 30);

        let err = orch.fetch(get("/status/")).await.unwrap_err();
        assert_eq!(err, FetchError::BudgetExhausted { retry_after_secs: 30 });
        assert!(err.to_string().contains("30 seconds"));
        assert_eq!(upstream.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn wait_mode_sleeps_through_the_window() {
        let upstream = FakeUpstream::new(Ok(response(StatusCode::OK, "{}", 60)));
        let mut config = ProxyConfig::default();
        config.error_budget.wait_for_reset = true;
        let orch = orchestrator(config, upstream.clone());
        orch.budget().replace(0, 30);

        let start = Instant::now();
        let fetch = tokio::spawn({
            let orch = orch.clone();
            async move { orch.fetch(get("/status/")).await }
        });

        tokio::time::sleep(Duration::from_secs(29)).await;
        assert_eq!(upstream.calls(), 0);

        let response = fetch.await.unwrap().unwrap();
        assert_eq!(response.status, StatusCode::OK);
        assert!(Instant::now() - start >= Duration::from_secs(30));
        assert_eq!(upstream.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn budget_headers_feed_the_gate() {
        let mut exhausted = response(StatusCode::OK, "{}", 0);
        exhausted
            .headers
            .insert("x-esi-error-limit-remain", HeaderValue::from_static("0"));
        exhausted
            .headers
            .insert("x-esi-error-limit-reset", HeaderValue::from_static("12"));
        let upstream = FakeUpstream::new(Ok(exhausted));
        let orch = orchestrator(ProxyConfig::default(), upstream.clone());

        orch.fetch(get("/a")).await.unwrap();
        assert_eq!(
            orch.fetch(get("/b")).await,
            Err(FetchError::BudgetExhausted { retry_after_secs: 12 })
        );

        tokio::time::advance(Duration::from_secs(12)).await;
        assert!(orch.fetch(get("/b")).await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn wait_mode_fails_on_a_newer_exhausted_observation() {
        let upstream = FakeUpstream::new(Ok(response(StatusCode::OK, "{}", 60)));
        let mut config = ProxyConfig::default();
        config.error_budget.wait_for_reset = true;
        let orch = orchestrator(config, upstream.clone());
        orch.budget().replace(0, 30);

        let fetch = tokio::spawn({
            let orch = orch.clone();
            async move { orch.fetch(get("/status/")).await }
        });

        // Another response lands mid-wait with a fresh, still-empty budget.
        tokio::time::sleep(Duration::from_secs(20)).await;
        orch.budget().replace(0, 30);

        assert_eq!(
            fetch.await.unwrap(),
            Err(FetchError::BudgetExhausted { retry_after_secs: 20 })
        );
        assert_eq!(upstream.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn oversized_reset_header_does_not_wedge_the_gate() {
        let mut exhausted = response(StatusCode::OK, "{}", 0);
        exhausted
            .headers
            .insert("x-esi-error-limit-remain", HeaderValue::from_static("0"));
        exhausted.headers.insert(
            "x-esi-error-limit-reset",
            HeaderValue::from_static("18446744073709551615"),
        );
        let upstream = FakeUpstream::new(Ok(exhausted));
        let mut config = ProxyConfig::default();
        config.error_budget.adaptive_backoff = true;
        let orch = orchestrator(config, upstream.clone());

        orch.fetch(get("/a")).await.unwrap();
        assert_eq!(
            orch.fetch(get("/b")).await,
            Err(FetchError::BudgetExhausted {
                retry_after_secs: crate::upstream::budget::MAX_RESET_SECS
            })
        );
        assert_eq!(upstream.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_is_503_and_leaves_state_alone() {
        let upstream = FakeUpstream::with_delay(
            Ok(response(StatusCode::UNAUTHORIZED, BAN_BODY, 60)),
            Duration::from_secs(120),
        );
        let orch = orchestrator(ProxyConfig::default(), upstream.clone());
        let before = orch.budget().snapshot();

        let err = orch.fetch(get("/status/")).await.unwrap_err();
        assert_eq!(err, FetchError::UpstreamTimeout);
        assert_eq!(err.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert!(!orch.ban().is_banned());
        assert_eq!(orch.budget().snapshot(), before);
        assert_eq!(orch.cache().len().await.unwrap(), 0);
        assert_eq!(orch.in_flight(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn leader_failure_reaches_every_follower() {
        let upstream = FakeUpstream::with_delay(
            Err(UpstreamError::Unavailable("connection refused".into())),
            Duration::from_millis(100),
        );
        let orch = orchestrator(ProxyConfig::default(), upstream.clone());

        let handles: Vec<_> = (0..5)
            .map(|_| {
                let orch = orch.clone();
                tokio::spawn(async move { orch.fetch(get("/status/")).await })
            })
            .collect();
        for handle in handles {
            assert_eq!(handle.await.unwrap(), Err(FetchError::UpstreamUnavailable));
        }
        assert_eq!(upstream.calls(), 1);

        upstream.set_reply(Ok(response(StatusCode::OK, "{}", 60)));
        assert!(orch.fetch(get("/status/")).await.is_ok());
        assert_eq!(upstream.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn disconnecting_client_does_not_cancel_the_leader() {
        let upstream = FakeUpstream::with_delay(
            Ok(response(StatusCode::OK, "{}", 60)),
            Duration::from_millis(100),
        );
        let orch = orchestrator(ProxyConfig::default(), upstream.clone());

        let client = tokio::spawn({
            let orch = orch.clone();
            async move { orch.fetch(get("/status/")).await }
        });
        tokio::time::sleep(Duration::from_millis(10)).await;
        client.abort();

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(orch.fetch(get("/status/")).await.unwrap().cache, CacheStatus::Hit);
        assert_eq!(upstream.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn saturated_limiter_rejects_after_one_retry() {
        let upstream = FakeUpstream::new(Ok(response(StatusCode::OK, "{}", 0)));
        let mut config = ProxyConfig::default();
        config.rate_limit.enabled = true;
        config.rate_limit.requests_per_second = 1;
        config.rate_limit.burst_size = 1;
        config.rate_limit.max_wait_ms = 100;
        config.rate_limit.retry_delay_ms = 250;
        let orch = orchestrator(config, upstream.clone());

        assert!(orch.fetch(get("/a")).await.is_ok());
        assert_eq!(orch.fetch(get("/b")).await, Err(FetchError::RateLimited));
        assert_eq!(upstream.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn saturated_limiter_succeeds_on_retry() {
        let upstream = FakeUpstream::new(Ok(response(StatusCode::OK, "{}", 0)));
        let mut config = ProxyConfig::default();
        config.rate_limit.enabled = true;
        config.rate_limit.requests_per_second = 1;
        config.rate_limit.burst_size = 1;
        config.rate_limit.max_wait_ms = 900;
        config.rate_limit.retry_delay_ms = 200;
        let orch = orchestrator(config, upstream.clone());

        orch.fetch(get("/a")).await.unwrap();
        assert_eq!(upstream.calls(), 1);

        // 1s to the next token exceeds the 900ms limit; after the 200ms
        // retry delay only 800ms remain.
        let start = Instant::now();
        let response = orch.fetch(get("/b")).await.unwrap();
        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(upstream.calls(), 2);
        assert!(Instant::now() - start >= Duration::from_millis(900));
    }

    #[tokio::test(start_paused = true)]
    async fn route_limiter_spaces_calls() {
        let upstream = FakeUpstream::new(Ok(response(StatusCode::OK, "{}", 0)));
        let orch = orchestrator(ProxyConfig::default(), upstream.clone());
        let bucket = Arc::new(TokenBucket::new(2, 1, Duration::from_secs(5)));

        let start = Instant::now();
        for path in ["/a", "/b", "/c"] {
            orch.fetch(get(path).with_route_limiter(Some(bucket.clone())))
                .await
                .unwrap();
        }
        assert!(Instant::now() - start >= Duration::from_secs(1));
        assert_eq!(upstream.calls(), 3);
    }

    #[test]
    fn retry_after_rounds_up() {
        assert_eq!(
            budget_exhausted(Duration::from_millis(29_001)),
            FetchError::BudgetExhausted { retry_after_secs: 30 }
        );
        assert_eq!(
            budget_exhausted(Duration::from_secs(30)),
            FetchError::BudgetExhausted { retry_after_secs: 30 }
        );
    }
}
