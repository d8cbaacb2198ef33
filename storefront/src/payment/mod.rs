//! Payment gateway adapter
//!
//! Remote intents are created through a [`PaymentGateway`]; confirmations are
//! verified locally with [`signature`].

pub mod razorpay;
pub mod signature;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use shared::error::AppError;

pub use razorpay::{RazorpayGateway, parse_webhook};

/// Remote payment intent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayIntent {
    pub gateway_order_id: String,
    /// Amount in paisa
    pub amount: i64,
    pub currency: String,
}

/// What a signed gateway webhook asks us to do
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayEvent {
    /// Money captured for a gateway order
    PaymentCaptured {
        gateway_order_id: String,
        gateway_payment_id: String,
    },
    /// An attempt on a gateway order failed
    PaymentFailed { gateway_order_id: String },
    /// Event type we do not act on
    Ignored,
}

/// Parsed webhook delivery
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebhookDelivery {
    /// Gateway-assigned id, used to skip redeliveries
    pub event_id: String,
    pub event_type: String,
    pub event: GatewayEvent,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Public key id handed to the checkout widget
    fn key_id(&self) -> &str;

    /// Create a remote intent. Failures map to `PaymentGatewayUnavailable`.
    async fn create_intent(
        &self,
        amount: i64,
        currency: &str,
        receipt: &str,
    ) -> Result<GatewayIntent, AppError>;
}
