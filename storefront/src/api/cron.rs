//! Scheduled jobs, triggered by an external scheduler
//!
//! Both routes require `Authorization: Bearer <CRON_SECRET>`.

use axum::{Json, Router, extract::State, middleware, routing::get};
use serde::Serialize;

use crate::auth::cron_auth::cron_auth_middleware;
use crate::state::AppState;

use super::ApiResult;

pub fn router(state: &AppState) -> Router<AppState> {
    Router::new()
        .route("/cron/order-cleanup", get(order_cleanup))
        .route("/cron/daily-reset", get(daily_reset))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            cron_auth_middleware,
        ))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CleanupResponse {
    pub cancelled_count: u64,
}

/// GET /cron/order-cleanup
pub async fn order_cleanup(State(state): State<AppState>) -> ApiResult<CleanupResponse> {
    let cancelled_count = state.workflow.cleanup_abandoned().await?;
    Ok(Json(CleanupResponse { cancelled_count }))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResetResponse {
    pub restocked_count: u64,
}

/// GET /cron/daily-reset
pub async fn daily_reset(State(state): State<AppState>) -> ApiResult<ResetResponse> {
    let restocked_count = state.workflow.daily_reset().await?;
    Ok(Json(ResetResponse { restocked_count }))
}
