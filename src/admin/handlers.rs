use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;

use crate::admin::AdminState;

#[derive(Serialize)]
pub struct ErrorBudgetStatus {
    pub remaining: i64,
    pub reset_after_secs: u64,
    pub observed_secs_ago: u64,
}

#[derive(Serialize)]
pub struct SystemStatus {
    pub version: &'static str,
    pub banned: bool,
    pub error_budget: ErrorBudgetStatus,
    /// `None` when the cache backend could not be queried.
    pub cache_entries: Option<usize>,
    pub in_flight: usize,
}

#[derive(Serialize)]
pub struct ActionResult {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ActionResult {
    fn done() -> (StatusCode, Json<Self>) {
        (StatusCode::OK, Json(Self { ok: true, error: None }))
    }

    fn failed(error: impl ToString) -> (StatusCode, Json<Self>) {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(Self {
                ok: false,
                error: Some(error.to_string()),
            }),
        )
    }
}

pub async fn get_status(State(state): State<AdminState>) -> Json<SystemStatus> {
    let orchestrator = &state.orchestrator;
    let budget = orchestrator.budget().snapshot();

    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION"),
        banned: orchestrator.ban().is_banned(),
        error_budget: ErrorBudgetStatus {
            remaining: budget.remaining,
            reset_after_secs: budget.reset_after_secs,
            observed_secs_ago: budget.observed_at.elapsed().as_secs(),
        },
        cache_entries: orchestrator.cache().len().await.ok(),
        in_flight: orchestrator.in_flight(),
    })
}

pub async fn clear_cache(State(state): State<AdminState>) -> (StatusCode, Json<ActionResult>) {
    match state.orchestrator.cache().clear().await {
        Ok(()) => {
            tracing::info!("Cache cleared by operator");
            ActionResult::done()
        }
        Err(e) => {
            tracing::error!(error = %e, "Cache clear failed");
            ActionResult::failed(e)
        }
    }
}

pub async fn reset_ban(State(state): State<AdminState>) -> (StatusCode, Json<ActionResult>) {
    match state.orchestrator.ban().reset() {
        Ok(()) => ActionResult::done(),
        Err(e) => {
            tracing::error!(error = %e, "Ban reset failed");
            ActionResult::failed(e)
        }
    }
}
