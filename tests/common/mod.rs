//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use esi_proxy::config::ProxyConfig;
use esi_proxy::lifecycle::{startup, Shutdown};
use esi_proxy::Orchestrator;

pub const DATE: &str = "Thu, 01 Jan 2026 12:00:00 GMT";
pub const EXPIRES_IN_60S: &str = "Thu, 01 Jan 2026 12:01:00 GMT";

/// What the mock upstream answers with.
#[derive(Clone)]
pub struct MockReply {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: String,
    pub delay: Duration,
}

impl MockReply {
    /// A 200 that is cacheable for 60 seconds.
    pub fn cacheable(body: &str) -> Self {
        Self {
            status: 200,
            headers: vec![
                ("Date".into(), DATE.into()),
                ("Expires".into(), EXPIRES_IN_60S.into()),
                ("Content-Type".into(), "application/json".into()),
            ],
            body: body.to_string(),
            delay: Duration::ZERO,
        }
    }

    pub fn status(status: u16, body: &str) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: body.to_string(),
            delay: Duration::ZERO,
        }
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

/// Raw TCP stand-in for the upstream API.
pub struct MockUpstream {
    pub addr: SocketAddr,
    hits: Arc<AtomicUsize>,
    reply: Arc<Mutex<MockReply>>,
    requests: Arc<Mutex<Vec<String>>>,
}

impl MockUpstream {
    pub async fn start(reply: MockReply) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let hits = Arc::new(AtomicUsize::new(0));
        let reply = Arc::new(Mutex::new(reply));
        let requests = Arc::new(Mutex::new(Vec::new()));

        let (h, r, q) = (hits.clone(), reply.clone(), requests.clone());
        tokio::spawn(async move {
            while let Ok((socket, _)) = listener.accept().await {
                let (hits, reply, requests) = (h.clone(), r.clone(), q.clone());
                tokio::spawn(async move {
                    serve_one(socket, hits, reply, requests).await;
                });
            }
        });

        Self {
            addr,
            hits,
            reply,
            requests,
        }
    }

    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }

    pub fn set_reply(&self, reply: MockReply) {
        *self.reply.lock().unwrap() = reply;
    }

    /// Raw request heads received so far, oldest first.
    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }
}

async fn serve_one(
    mut socket: TcpStream,
    hits: Arc<AtomicUsize>,
    reply: Arc<Mutex<MockReply>>,
    requests: Arc<Mutex<Vec<String>>>,
) {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
        match socket.read(&mut chunk).await {
            Ok(0) | Err(_) => return,
            Ok(n) => buf.extend_from_slice(&chunk[..n]),
        }
    }
    hits.fetch_add(1, Ordering::SeqCst);
    requests
        .lock()
        .unwrap()
        .push(String::from_utf8_lossy(&buf).into_owned());

    let reply = reply.lock().unwrap().clone();
    tokio::time::sleep(reply.delay).await;

    let mut head = format!("HTTP/1.1 {} Mock\r\n", reply.status);
    for (name, value) in &reply.headers {
        head.push_str(&format!("{name}: {value}\r\n"));
    }
    head.push_str(&format!(
        "Content-Length: {}\r\nConnection: close\r\n\r\n",
        reply.body.len()
    ));
    let _ = socket.write_all(head.as_bytes()).await;
    let _ = socket.write_all(reply.body.as_bytes()).await;
    let _ = socket.shutdown().await;
}

/// A proxy serving on an ephemeral port.
pub struct TestProxy {
    pub addr: SocketAddr,
    pub admin_addr: Option<SocketAddr>,
    pub orchestrator: Arc<Orchestrator>,
    pub shutdown: Shutdown,
}

impl TestProxy {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{path}", self.addr)
    }

    pub fn admin_url(&self, path: &str) -> String {
        format!("http://{}{path}", self.admin_addr.unwrap())
    }
}

impl Drop for TestProxy {
    fn drop(&mut self) {
        self.shutdown.trigger();
    }
}

/// Defaults pointed at `upstream`, with exporters off.
pub fn config_for(upstream: &MockUpstream) -> ProxyConfig {
    let mut config = ProxyConfig::default();
    config.upstream.base_url = upstream.url();
    config.observability.metrics_enabled = false;
    config
}

pub async fn start_proxy(config: ProxyConfig) -> TestProxy {
    let app = startup::build(&config).unwrap();
    let shutdown = Shutdown::new();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(app.server.run(listener, shutdown.signalled()));

    let admin_addr = match app.admin {
        Some(admin) => {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            let admin_addr = listener.local_addr().unwrap();
            let signalled = shutdown.signalled();
            tokio::spawn(async move {
                axum::serve(listener, admin.into_make_service())
                    .with_graceful_shutdown(signalled)
                    .await
            });
            Some(admin_addr)
        }
        None => None,
    };

    TestProxy {
        addr,
        admin_addr,
        orchestrator: app.orchestrator,
        shutdown,
    }
}
