//! Razorpay webhook handler
//!
//! POST /payment/webhook: raw body for HMAC signature verification

use axum::Router;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;

use crate::error::ServiceError;
use crate::payment::{parse_webhook, signature};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/payment/webhook", post(handle_webhook))
}

/// Handle a gateway event.
///
/// 2xx tells the gateway to stop redelivering; infrastructure failures
/// answer 500 so the event comes back.
pub async fn handle_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> StatusCode {
    // 1. Signature header
    let Some(sig_header) = headers
        .get("x-razorpay-signature")
        .and_then(|v| v.to_str().ok())
    else {
        tracing::warn!("Missing X-Razorpay-Signature header");
        return StatusCode::BAD_REQUEST;
    };

    // 2. Verify over the raw body
    if let Err(e) = signature::verify_webhook_signature(&body, sig_header, &state.webhook_secret)
    {
        tracing::warn!(error = e, "Webhook signature verification failed");
        return StatusCode::BAD_REQUEST;
    }

    // 3. Parse
    let event_id = headers
        .get("x-razorpay-event-id")
        .and_then(|v| v.to_str().ok());
    let delivery = match parse_webhook(&body, event_id) {
        Ok(delivery) => delivery,
        Err(e) => {
            tracing::warn!(error = %e.message, "Unusable webhook payload");
            return StatusCode::BAD_REQUEST;
        }
    };
    tracing::info!(
        event_id = %delivery.event_id,
        event_type = %delivery.event_type,
        "Received Razorpay webhook"
    );

    // 4. Apply (deduplicated by event id)
    match state.workflow.handle_gateway_event(&delivery).await {
        Ok(_) => StatusCode::OK,
        Err(ServiceError::App(e)) => {
            // Redelivery cannot fix a business rejection
            tracing::warn!(event_id = %delivery.event_id, code = %e.code, "Webhook event rejected");
            StatusCode::OK
        }
        Err(ServiceError::Db(e)) => {
            tracing::error!(event_id = %delivery.event_id, error = %e, "Webhook processing failed");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}
