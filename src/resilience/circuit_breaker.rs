//! Ban latch for the upstream.
//!
//! # States
//! - Clear: upstream calls allowed
//! - Banned: every request fails fast, no upstream call is made
//!
//! # State Transitions
//! ```text
//! Clear → Banned: response status equals the ban status AND the body
//!                 contains the ban message
//! Banned → Clear: operator reset only (admin endpoint or restart
//!                 without a marker file)
//! ```
//!
//! A bad per-request token also yields a 401, which is why the body must
//! match as well.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};

use axum::http::StatusCode;

use crate::config::BanConfig;
use crate::observability::metrics;

pub struct BanFlag {
    banned: AtomicBool,
    status: u16,
    message: String,
    marker: Option<PathBuf>,
}

impl BanFlag {
    /// Build the flag, starting banned if the marker file exists.
    pub fn new(config: &BanConfig) -> Self {
        let marker = config.marker_path.as_ref().map(PathBuf::from);
        let banned = marker.as_ref().is_some_and(|p| p.exists());
        if banned {
            tracing::error!(
                marker = ?marker,
                "Ban marker present at startup, upstream calls are blocked"
            );
        }
        metrics::record_banned(banned);

        Self {
            banned: AtomicBool::new(banned),
            status: config.status,
            message: config.message.clone(),
            marker,
        }
    }

    pub fn is_banned(&self) -> bool {
        self.banned.load(Ordering::Acquire)
    }

    /// Whether a response is the upstream's authoritative ban signal.
    pub fn is_ban_response(&self, status: StatusCode, body: &[u8]) -> bool {
        status.as_u16() == self.status && String::from_utf8_lossy(body).contains(&self.message)
    }

    /// Inspect an upstream response, tripping on a ban. Returns true if this
    /// call tripped the flag.
    pub fn observe(&self, status: StatusCode, body: &[u8]) -> bool {
        if !self.is_ban_response(status, body) {
            return false;
        }
        self.trip()
    }

    /// Set the flag. Returns true on the clear → banned transition.
    pub fn trip(&self) -> bool {
        if self.banned.swap(true, Ordering::AcqRel) {
            return false;
        }
        tracing::error!("Upstream has banned this proxy, refusing all further upstream calls");
        metrics::record_banned(true);

        if let Some(path) = &self.marker {
            if let Err(e) = std::fs::write(path, b"banned\n") {
                tracing::warn!(marker = %path.display(), error = %e, "Failed to write ban marker");
            }
        }
        true
    }

    /// Clear the flag and delete the marker file.
    pub fn reset(&self) -> std::io::Result<()> {
        if let Some(path) = &self.marker {
            match std::fs::remove_file(path) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e),
            }
        }
        self.banned.store(false, Ordering::Release);
        metrics::record_banned(false);
        tracing::warn!("Ban flag reset by operator");
        Ok(())
    }
}
