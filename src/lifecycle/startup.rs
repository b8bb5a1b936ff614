//! Startup orchestration.
//!
//! # Responsibilities
//! - Build every shared resource from a validated configuration
//! - Start background tasks (cache sweep, dial-home, admin API, metrics)
//! - Bind the proxy listener and serve until a signal arrives
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - Subsystems initialize in order, not concurrently
//! - Listeners start last (traffic only when ready)

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;

use crate::admin::{setup_admin_router, AdminState};
use crate::cache::CacheSweeper;
use crate::config::ProxyConfig;
use crate::discovery::{DialHome, DialHomeError};
use crate::fetch::Orchestrator;
use crate::http::HttpServer;
use crate::lifecycle::signals::wait_for_signal;
use crate::lifecycle::Shutdown;
use crate::observability::metrics;
use crate::routing::PatternError;
use crate::upstream::{ReqwestUpstream, UpstreamClient, UpstreamError};

#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("failed to build upstream client: {0}")]
    Upstream(#[from] UpstreamError),
    #[error("invalid route table: {0}")]
    Routes(#[from] PatternError),
    #[error("failed to build dial-home client: {0}")]
    DialHome(#[from] DialHomeError),
    #[error("invalid address {0:?}")]
    Address(String),
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },
    #[error("server error: {0}")]
    Io(#[from] std::io::Error),
}

/// Everything the proxy serves, assembled but not yet listening.
pub struct App {
    pub orchestrator: Arc<Orchestrator>,
    pub server: HttpServer,
    pub admin: Option<axum::Router>,
}

/// Assemble the application against the real upstream.
pub fn build(config: &ProxyConfig) -> Result<App, StartupError> {
    let upstream = Arc::new(ReqwestUpstream::new(&config.upstream)?);
    build_with_upstream(config, upstream)
}

/// Assemble the application around any upstream client.
pub fn build_with_upstream(
    config: &ProxyConfig,
    upstream: Arc<dyn UpstreamClient>,
) -> Result<App, StartupError> {
    let orchestrator = Arc::new(Orchestrator::new(config, upstream));
    let server = HttpServer::new(config, orchestrator.clone())?;

    let admin = config.admin.enabled.then(|| {
        setup_admin_router(AdminState {
            orchestrator: orchestrator.clone(),
            api_key: Arc::from(config.admin.api_key.as_str()),
        })
    });

    Ok(App {
        orchestrator,
        server,
        admin,
    })
}

async fn bind(addr: &str) -> Result<TcpListener, StartupError> {
    TcpListener::bind(addr).await.map_err(|source| StartupError::Bind {
        addr: addr.to_string(),
        source,
    })
}

/// Run the proxy until SIGINT/SIGTERM, then shut down gracefully.
pub async fn run(config: ProxyConfig) -> Result<(), StartupError> {
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        bind_address = %config.listener.bind_address,
        upstream = %config.upstream.base_url,
        "esi-proxy starting"
    );

    if config.observability.metrics_enabled {
        let addr: SocketAddr = config
            .observability
            .metrics_address
            .parse()
            .map_err(|_| StartupError::Address(config.observability.metrics_address.clone()))?;
        metrics::init_metrics(addr);
    }

    let app = build(&config)?;
    let shutdown = Shutdown::new();

    let sweeper = CacheSweeper::new(
        app.orchestrator.cache().clone(),
        Duration::from_secs(config.cache.sweep_interval_secs),
    );
    tokio::spawn(sweeper.run(shutdown.subscribe()));

    if config.dial_home.enabled {
        let dial_home = DialHome::new(config.dial_home.clone())?;
        tokio::spawn(dial_home.run(shutdown.subscribe()));
    }

    if let Some(admin) = app.admin {
        let listener = bind(&config.admin.bind_address).await?;
        tracing::info!(address = %config.admin.bind_address, "Admin API listening");
        let signalled = shutdown.signalled();
        tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, admin.into_make_service())
                .with_graceful_shutdown(signalled)
                .await
            {
                tracing::error!(error = %e, "Admin API server failed");
            }
        });
    }

    let listener = bind(&config.listener.bind_address).await?;

    let trigger = shutdown.clone();
    tokio::spawn(async move {
        wait_for_signal().await;
        tracing::info!("Shutting down");
        trigger.trigger();
    });

    app.server.run(listener, shutdown.signalled()).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
