//! Operator API on its own listener.
//!
//! ```text
//! GET  /admin/status       → version, ban flag, error budget, cache size, in-flight calls
//! POST /admin/cache/clear  → drop every cache entry
//! POST /admin/ban/reset    → clear the ban flag and its marker file
//! ```
//!
//! Every route requires `Authorization: Bearer <admin.api_key>`.

pub mod auth;
pub mod handlers;

use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use self::auth::admin_auth_middleware;
use self::handlers::*;
use crate::fetch::Orchestrator;

/// State shared by the admin handlers.
#[derive(Clone)]
pub struct AdminState {
    pub orchestrator: Arc<Orchestrator>,
    pub api_key: Arc<str>,
}

pub fn setup_admin_router(state: AdminState) -> Router {
    Router::new()
        .route("/admin/status", get(get_status))
        .route("/admin/cache/clear", post(clear_cache))
        .route("/admin/ban/reset", post(reset_ban))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            admin_auth_middleware,
        ))
        .with_state(state)
}
