//! Checkout endpoint
//!
//! POST /orders: validate, reserve stock and create a PENDING order

use axum::{Json, Router, extract::State, middleware, routing::post};

use crate::auth::rate_limit::checkout_rate_limit;
use crate::orders::{CheckoutRequest, CreatedOrder};
use crate::state::AppState;

use super::ApiResult;

pub fn router(state: &AppState) -> Router<AppState> {
    Router::new()
        .route("/orders", post(create_order))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            checkout_rate_limit,
        ))
}

pub async fn create_order(
    State(state): State<AppState>,
    Json(req): Json<CheckoutRequest>,
) -> ApiResult<CreatedOrder> {
    let created = state.workflow.create_order(&req).await?;
    Ok(Json(created))
}
