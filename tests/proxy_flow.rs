//! End-to-end request flow through a real listener and a mock upstream.

mod common;

use std::time::Duration;

use common::{config_for, start_proxy, MockReply, MockUpstream};
use esi_proxy::config::RouteConfig;

async fn get(client: &reqwest::Client, url: &str) -> (u16, Option<String>, String) {
    let res = client.get(url).send().await.unwrap();
    let status = res.status().as_u16();
    let cache = res
        .headers()
        .get("x-proxy-cache")
        .map(|v| v.to_str().unwrap().to_string());
    (status, cache, res.text().await.unwrap())
}

#[tokio::test]
async fn second_request_is_served_from_cache() {
    let upstream = MockUpstream::start(MockReply::cacheable("{\"players\":20000}")).await;
    let proxy = start_proxy(config_for(&upstream)).await;
    let client = reqwest::Client::new();
    let url = proxy.url("/latest/status/?datasource=tranquility");

    let (status, cache, body) = get(&client, &url).await;
    assert_eq!(status, 200);
    assert_eq!(cache.as_deref(), Some("MISS"));
    assert_eq!(body, "{\"players\":20000}");

    let (status, cache, body) = get(&client, &url).await;
    assert_eq!(status, 200);
    assert_eq!(cache.as_deref(), Some("HIT"));
    assert_eq!(body, "{\"players\":20000}");

    assert_eq!(upstream.hits(), 1);
}

#[tokio::test]
async fn forwards_path_query_and_identity_headers() {
    let upstream = MockUpstream::start(MockReply::cacheable("{}")).await;
    let proxy = start_proxy(config_for(&upstream)).await;

    reqwest::Client::new()
        .get(proxy.url("/latest/universe/types/34/?language=en"))
        .header("User-Agent", "some-client/2.0")
        .send()
        .await
        .unwrap();

    let requests = upstream.requests();
    assert_eq!(requests.len(), 1);
    let head = requests[0].to_ascii_lowercase();
    assert!(head.starts_with("get /latest/universe/types/34/?language=en http/1.1\r\n"));
    assert!(head.contains("user-agent: esi-proxy/1.0"));
    assert!(!head.contains("some-client"));
}

#[tokio::test]
async fn concurrent_identical_requests_share_one_upstream_call() {
    let upstream = MockUpstream::start(
        MockReply::cacheable("{\"prices\":[]}").with_delay(Duration::from_millis(300)),
    )
    .await;
    let proxy = start_proxy(config_for(&upstream)).await;
    let client = reqwest::Client::new();
    let url = proxy.url("/latest/markets/prices/");

    let requests: Vec<_> = (0..8)
        .map(|_| {
            let client = client.clone();
            let url = url.clone();
            tokio::spawn(async move { get(&client, &url).await })
        })
        .collect();

    for request in futures_util::future::join_all(requests).await {
        let (status, _, body) = request.unwrap();
        assert_eq!(status, 200);
        assert_eq!(body, "{\"prices\":[]}");
    }
    assert_eq!(upstream.hits(), 1);
}

#[tokio::test]
async fn uncacheable_responses_are_refetched() {
    let upstream = MockUpstream::start(MockReply::status(200, "fresh")).await;
    let proxy = start_proxy(config_for(&upstream)).await;
    let client = reqwest::Client::new();
    let url = proxy.url("/latest/status/");

    // No Expires/Date pair: nothing to cache.
    assert_eq!(get(&client, &url).await.1.as_deref(), Some("MISS"));
    assert_eq!(get(&client, &url).await.1.as_deref(), Some("MISS"));
    assert_eq!(upstream.hits(), 2);
}

#[tokio::test]
async fn post_bypasses_cache() {
    let upstream = MockUpstream::start(MockReply::cacheable("[]")).await;
    let proxy = start_proxy(config_for(&upstream)).await;
    let client = reqwest::Client::new();

    for _ in 0..2 {
        let res = client
            .post(proxy.url("/latest/universe/names/"))
            .body("[34, 35]")
            .send()
            .await
            .unwrap();
        assert_eq!(res.status().as_u16(), 200);
        assert_eq!(res.headers().get("x-proxy-cache").unwrap(), "MISS");
    }
    assert_eq!(upstream.hits(), 2);
}

#[tokio::test]
async fn ban_response_latches_the_proxy() {
    let upstream = MockUpstream::start(MockReply::status(
        401,
        "{\"error\":\"You have been banned from using ESI\"}",
    ))
    .await;
    let proxy = start_proxy(config_for(&upstream)).await;
    let client = reqwest::Client::new();

    let (status, _, body) = get(&client, &proxy.url("/latest/status/")).await;
    assert_eq!(status, 401);
    assert!(body.contains("You have been banned"));

    upstream.set_reply(MockReply::cacheable("{}"));
    let (status, cache, body) = get(&client, &proxy.url("/latest/alliances/")).await;
    assert_eq!(status, 401);
    assert_eq!(cache.as_deref(), Some("MISS"));
    assert_eq!(body, "You are banned from ESI");

    assert_eq!(upstream.hits(), 1);
    assert!(proxy.orchestrator.ban().is_banned());
}

#[tokio::test]
async fn plain_401_does_not_ban() {
    let upstream = MockUpstream::start(MockReply::status(401, "{\"error\":\"token expired\"}")).await;
    let proxy = start_proxy(config_for(&upstream)).await;
    let client = reqwest::Client::new();

    assert_eq!(get(&client, &proxy.url("/latest/characters/1/assets/")).await.0, 401);
    assert_eq!(get(&client, &proxy.url("/latest/characters/1/assets/")).await.0, 401);
    assert_eq!(upstream.hits(), 2);
    assert!(!proxy.orchestrator.ban().is_banned());
}

#[tokio::test]
async fn exhausted_error_budget_answers_420() {
    let upstream = MockUpstream::start(
        MockReply::status(404, "{\"error\":\"Type not found\"}")
            .with_header("X-Esi-Error-Limit-Remain", "0")
            .with_header("X-Esi-Error-Limit-Reset", "30"),
    )
    .await;
    let proxy = start_proxy(config_for(&upstream)).await;
    let client = reqwest::Client::new();

    assert_eq!(get(&client, &proxy.url("/latest/universe/types/0/")).await.0, 404);

    let res = client
        .get(proxy.url("/latest/universe/types/34/"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status().as_u16(), 420);
    assert_eq!(res.headers().get("retry-after").unwrap(), "30");
    assert_eq!(
        res.text().await.unwrap(),
        "Error limit reached, please try again in 30 seconds"
    );
    assert_eq!(upstream.hits(), 1);
}

#[tokio::test]
async fn upstream_down_is_503() {
    // Bind and drop to get a port nobody listens on.
    let dead = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let dead_addr = dead.local_addr().unwrap();
    drop(dead);

    let mut config = esi_proxy::ProxyConfig::default();
    config.upstream.base_url = format!("http://{dead_addr}");
    config.observability.metrics_enabled = false;
    let proxy = start_proxy(config).await;

    let (status, cache, _) = get(&reqwest::Client::new(), &proxy.url("/latest/status/")).await;
    assert_eq!(status, 503);
    assert_eq!(cache.as_deref(), Some("MISS"));
}

#[tokio::test]
async fn reserved_endpoints_and_unmatched_routes() {
    let upstream = MockUpstream::start(MockReply::cacheable("{}")).await;
    let mut config = config_for(&upstream);
    config.routes = vec![RouteConfig {
        name: "status".into(),
        pattern: "/latest/status/".into(),
        methods: vec!["GET".into()],
        hard_rate_limit: None,
    }];
    let proxy = start_proxy(config).await;
    let client = reqwest::Client::new();

    assert_eq!(get(&client, &proxy.url("/healthz")).await.2, "OK");
    assert_eq!(get(&client, &proxy.url("/ping")).await.2, "pong");
    assert_eq!(get(&client, &proxy.url("/favicon.ico")).await.0, 404);

    let (status, cache, body) = get(&client, &proxy.url("/latest/alliances/")).await;
    assert_eq!(status, 404);
    assert_eq!(cache, None);
    assert_eq!(body, "No matching route found");

    assert_eq!(get(&client, &proxy.url("/latest/status/")).await.0, 200);
    assert_eq!(upstream.hits(), 1);
}
