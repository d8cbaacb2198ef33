//! HTTP API for the storefront

pub mod admin;
pub mod cron;
pub mod health;
pub mod orders;
pub mod payment;
pub mod webhook;

use axum::Router;
use shared::error::AppError;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

pub type ApiResult<T> = Result<axum::Json<T>, AppError>;

/// Create the combined router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Storefront checkout (rate limited)
        .merge(orders::router(&state))
        .merge(payment::router(&state))
        // Gateway callbacks (signature verified, raw body)
        .merge(webhook::router())
        // Scheduler (cron bearer secret)
        .merge(cron::router(&state))
        // Operator API (admin JWT)
        .merge(admin::router(&state))
        .merge(health::router())
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
