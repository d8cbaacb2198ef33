//! Razorpay integration via REST API (no SDK dependency)

use async_trait::async_trait;
use shared::error::AppError;

use super::{GatewayEvent, GatewayIntent, PaymentGateway, WebhookDelivery};

const DEFAULT_API_BASE: &str = "https://api.razorpay.com/v1";

pub struct RazorpayGateway {
    client: reqwest::Client,
    api_base: String,
    key_id: String,
    key_secret: String,
}

impl RazorpayGateway {
    pub fn new(key_id: impl Into<String>, key_secret: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(15))
            .build()
            .unwrap_or_default();
        Self {
            client,
            api_base: DEFAULT_API_BASE.to_string(),
            key_id: key_id.into(),
            key_secret: key_secret.into(),
        }
    }

    /// Point at a different API host (sandbox proxies, local mocks)
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }
}

#[async_trait]
impl PaymentGateway for RazorpayGateway {
    fn key_id(&self) -> &str {
        &self.key_id
    }

    async fn create_intent(
        &self,
        amount: i64,
        currency: &str,
        receipt: &str,
    ) -> Result<GatewayIntent, AppError> {
        if self.key_id.is_empty() || self.key_secret.is_empty() {
            return Err(AppError::gateway_unavailable(
                "Payment gateway credentials missing",
            ));
        }

        let resp = self
            .client
            .post(format!("{}/orders", self.api_base))
            .basic_auth(&self.key_id, Some(&self.key_secret))
            .json(&serde_json::json!({
                "amount": amount,
                "currency": currency,
                "receipt": receipt,
            }))
            .send()
            .await
            .map_err(|e| {
                tracing::warn!(error = %e, "Razorpay request failed");
                AppError::gateway_unavailable("Payment gateway unreachable")
            })?;

        let status = resp.status();
        let body: serde_json::Value = resp.json().await.map_err(|e| {
            tracing::warn!(error = %e, "Razorpay response unreadable");
            AppError::gateway_unavailable("Payment gateway returned an invalid response")
        })?;

        if !status.is_success() {
            tracing::warn!(status = %status, body = %body, "Razorpay create order rejected");
            return Err(AppError::gateway_unavailable(format!(
                "Payment gateway rejected the request ({status})"
            )));
        }

        let gateway_order_id = body["id"].as_str().map(String::from).ok_or_else(|| {
            tracing::warn!(body = %body, "Razorpay response missing order id");
            AppError::gateway_unavailable("Payment gateway returned an invalid response")
        })?;

        tracing::info!(gateway_order_id = %gateway_order_id, amount, receipt, "Razorpay order created");
        Ok(GatewayIntent {
            gateway_order_id,
            amount: body["amount"].as_i64().unwrap_or(amount),
            currency: body["currency"]
                .as_str()
                .unwrap_or(currency)
                .to_string(),
        })
    }
}

/// Parse a verified webhook body.
///
/// `event_id` comes from the `X-Razorpay-Event-Id` header; when absent the
/// event type and payment id identify the delivery instead.
pub fn parse_webhook(body: &[u8], event_id: Option<&str>) -> Result<WebhookDelivery, AppError> {
    let json: serde_json::Value = serde_json::from_slice(body)
        .map_err(|e| AppError::validation(format!("Invalid webhook body: {e}")))?;
    let event_type = json["event"]
        .as_str()
        .ok_or_else(|| AppError::validation("Webhook event type missing"))?
        .to_string();

    let payment = &json["payload"]["payment"]["entity"];
    let order = &json["payload"]["order"]["entity"];
    let gateway_order_id = payment["order_id"]
        .as_str()
        .or_else(|| order["id"].as_str())
        .map(String::from);
    let gateway_payment_id = payment["id"].as_str().map(String::from);

    let event = match (event_type.as_str(), gateway_order_id, gateway_payment_id.clone()) {
        ("payment.captured" | "order.paid", Some(gateway_order_id), Some(gateway_payment_id)) => {
            GatewayEvent::PaymentCaptured {
                gateway_order_id,
                gateway_payment_id,
            }
        }
        ("payment.failed", Some(gateway_order_id), _) => {
            GatewayEvent::PaymentFailed { gateway_order_id }
        }
        ("payment.captured" | "order.paid" | "payment.failed", _, _) => {
            return Err(AppError::validation("Webhook payload missing payment references"));
        }
        _ => GatewayEvent::Ignored,
    };

    let event_id = event_id
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(String::from)
        .unwrap_or_else(|| {
            format!(
                "{}:{}",
                event_type,
                gateway_payment_id.as_deref().unwrap_or("-")
            )
        });

    Ok(WebhookDelivery {
        event_id,
        event_type,
        event,
    })
}
