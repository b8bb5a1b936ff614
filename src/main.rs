//! ESI caching proxy.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client ──▶ http::server ──▶ routing ──▶ fetch::Orchestrator
//!                 (reserved                      │
//!                  endpoints)                    ├─ ban flag ─────────── 401
//!                                                ├─ error budget ─────── 420
//!                                                ├─ response cache ───── HIT
//!                                                ├─ coalescer (leader / followers)
//!                                                └─ token buckets ─▶ upstream ──▶ ESI
//!
//!     Background: cache sweeper, dial-home, admin API, Prometheus exporter
//! ```

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{builder::BoolishValueParser, Parser};

use esi_proxy::config::{load_config, validation::validate_config, ProxyConfig};
use esi_proxy::lifecycle::startup;
use esi_proxy::observability::logging::init_logging;

#[derive(Parser, Debug)]
#[command(name = "esi-proxy", version, about = "Caching, rate-limited proxy for the EVE Swagger Interface")]
struct Cli {
    /// TOML configuration file. Defaults are used when omitted.
    #[arg(short, long, env = "ESI_PROXY_CONFIG")]
    config: Option<PathBuf>,

    /// Listen host.
    #[arg(long, env = "HOST")]
    host: Option<String>,

    /// Listen port.
    #[arg(long, env = "PORT")]
    port: Option<u16>,

    /// Hold requests until the error budget resets instead of answering 420.
    #[arg(long, env = "WAIT_FOR_ESI_ERROR_RESET", value_parser = BoolishValueParser::new())]
    wait_for_error_reset: Option<bool>,

    /// Register with the proxy directory.
    #[arg(long, env = "DIAL_HOME", value_parser = BoolishValueParser::new())]
    dial_home: Option<bool>,

    /// Public address announced by dial-home.
    #[arg(long, env = "EXTERNAL_ADDRESS")]
    external_address: Option<String>,

    /// Owner announced by dial-home.
    #[arg(long, env = "OWNER")]
    owner: Option<String>,

    /// Fixed proxy name announced by dial-home.
    #[arg(long, env = "ESI_PROXY_NAME")]
    name: Option<String>,
}

impl Cli {
    fn apply(self, config: &mut ProxyConfig) {
        if self.host.is_some() || self.port.is_some() {
            let (default_host, default_port) = split_host_port(&config.listener.bind_address);
            let host = self.host.unwrap_or(default_host);
            let port = self.port.map_or(default_port, |p| p.to_string());
            config.listener.bind_address = format!("{host}:{port}");
        }
        if let Some(wait) = self.wait_for_error_reset {
            config.error_budget.wait_for_reset = wait;
        }
        if let Some(enabled) = self.dial_home {
            config.dial_home.enabled = enabled;
        }
        if let Some(address) = self.external_address {
            config.dial_home.external_address = address;
        }
        if let Some(owner) = self.owner {
            config.dial_home.owner = owner;
        }
        if self.name.is_some() {
            config.dial_home.name = self.name;
        }
    }
}

fn split_host_port(bind_address: &str) -> (String, String) {
    match bind_address.rsplit_once(':') {
        Some((host, port)) => (host.to_string(), port.to_string()),
        None => (bind_address.to_string(), "9501".to_string()),
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => match load_config(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("failed to load {}: {e}", path.display());
                return ExitCode::FAILURE;
            }
        },
        None => ProxyConfig::default(),
    };
    cli.apply(&mut config);

    if let Err(errors) = validate_config(&config) {
        for error in errors {
            eprintln!("invalid configuration: {error}");
        }
        return ExitCode::FAILURE;
    }

    if let Err(e) = init_logging(&config.observability) {
        eprintln!("failed to initialize logging: {e}");
        return ExitCode::FAILURE;
    }

    match startup::run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "Fatal error");
            ExitCode::FAILURE
        }
    }
}
