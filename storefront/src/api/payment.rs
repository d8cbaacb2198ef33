//! Payment endpoints used by the checkout widget

use axum::{Json, Router, extract::State, middleware, routing::post};
use serde::{Deserialize, Serialize};

use crate::auth::rate_limit::payment_rate_limit;
use crate::orders::{PaymentInit, PaymentVerification, VerifiedPayment};
use crate::state::AppState;

use super::ApiResult;

pub fn router(state: &AppState) -> Router<AppState> {
    Router::new()
        .route("/payment/create-order", post(create_payment))
        .route("/payment/verify", post(verify_payment))
        .route("/payment/failed", post(report_failure))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            payment_rate_limit,
        ))
}

/// POST /payment/create-order
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePaymentRequest {
    pub order_id: String,
    pub payment_init_token: String,
}

pub async fn create_payment(
    State(state): State<AppState>,
    Json(req): Json<CreatePaymentRequest>,
) -> ApiResult<PaymentInit> {
    let init = state
        .workflow
        .initiate_payment(&req.order_id, &req.payment_init_token)
        .await?;
    Ok(Json(init))
}

/// POST /payment/verify
pub async fn verify_payment(
    State(state): State<AppState>,
    Json(req): Json<PaymentVerification>,
) -> ApiResult<VerifiedPayment> {
    let verified = state.workflow.verify_payment(&req).await?;
    Ok(Json(verified))
}

/// POST /payment/failed
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentFailureRequest {
    pub order_id: String,
    pub failure_token: String,
}

#[derive(Debug, Serialize)]
pub struct SuccessResponse {
    pub success: bool,
}

pub async fn report_failure(
    State(state): State<AppState>,
    Json(req): Json<PaymentFailureRequest>,
) -> ApiResult<SuccessResponse> {
    state
        .workflow
        .report_payment_failure(&req.order_id, &req.failure_token)
        .await?;
    Ok(Json(SuccessResponse { success: true }))
}
