//! Periodic registration with the proxy directory.
//!
//! # Responsibilities
//! - Resolve a stable proxy id (configured, persisted, or freshly generated)
//! - POST `{ id, url, owner }` on startup and every interval
//! - Stop on shutdown

use std::path::Path;
use std::time::Duration;

use rand::Rng;
use serde::Serialize;
use tokio::sync::broadcast;
use tokio::time;

use crate::config::DialHomeConfig;

#[derive(Debug, thiserror::Error)]
pub enum DialHomeError {
    #[error("registration request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("directory rejected registration with status {0}")]
    Rejected(reqwest::StatusCode),
}

#[derive(Debug, Serialize)]
struct Registration<'a> {
    id: &'a str,
    url: &'a str,
    owner: &'a str,
}

pub struct DialHome {
    client: reqwest::Client,
    config: DialHomeConfig,
    id: String,
}

impl DialHome {
    pub fn new(config: DialHomeConfig) -> Result<Self, DialHomeError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;
        let id = resolve_id(&config);
        Ok(Self { client, config, id })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Send one registration.
    pub async fn announce(&self) -> Result<(), DialHomeError> {
        let registration = Registration {
            id: &self.id,
            url: &self.config.external_address,
            owner: &self.config.owner,
        };
        let response = self
            .client
            .post(&self.config.url)
            .json(&registration)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(DialHomeError::Rejected(response.status()));
        }
        tracing::info!(id = %self.id, url = %self.config.external_address, "Registered with proxy directory");
        Ok(())
    }

    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        if self.config.external_address.is_empty() {
            tracing::warn!("Dial-home enabled but no external address configured, skipping registration");
            return;
        }

        tracing::info!(
            id = %self.id,
            interval_secs = self.config.interval_secs,
            "Dial-home starting"
        );

        // First tick fires immediately: register on startup.
        let mut ticker = time::interval(Duration::from_secs(self.config.interval_secs));
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.announce().await {
                        tracing::warn!(error = %e, "Dial-home registration failed");
                    }
                }
                _ = shutdown.recv() => {
                    tracing::info!("Dial-home received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }
}

/// Configured name, else the persisted one, else a new random id that is
/// persisted for the next start.
fn resolve_id(config: &DialHomeConfig) -> String {
    if let Some(name) = config.name.as_deref().map(str::trim).filter(|n| !n.is_empty()) {
        return name.to_string();
    }

    let path = Path::new(&config.name_path);
    if let Ok(stored) = std::fs::read_to_string(path) {
        let stored = stored.trim();
        if !stored.is_empty() {
            return stored.to_string();
        }
    }

    let id = random_id();
    if let Err(e) = std::fs::write(path, &id) {
        tracing::warn!(path = %path.display(), error = %e, "Could not persist proxy id");
    }
    id
}

/// 16 random bytes, lowercase hex.
fn random_id() -> String {
    let bytes: [u8; 16] = rand::thread_rng().gen();
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}
