//! Order workflow
//!
//! Checkout, payment initiation and verification, abandonment cleanup and
//! operator actions. [`OrderWorkflow`] coordinates the store, the payment
//! gateway and invoice storage; all state changes happen inside store
//! transactions.

pub mod number;
pub mod pricing;
pub mod workflow;


use std::sync::atomic::{AtomicI64, Ordering};

use serde::{Deserialize, Serialize};
use shared::error::{AppError, ErrorCode};
use shared::models::DeliveryDetails;

use crate::inventory;
use crate::store::{CustomerInfo, OrderDraft};
use pricing::{ClientQuote, PricingRules};

pub use workflow::{OrderWorkflow, WorkflowSettings};

/// Time source, swappable in tests
pub trait Clock: Send + Sync {
    fn now_millis(&self) -> i64;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> i64 {
        shared::util::now_millis()
    }
}

/// Manually advanced clock
#[derive(Debug, Default)]
pub struct ManualClock(AtomicI64);

impl ManualClock {
    pub fn new(start_millis: i64) -> Self {
        Self(AtomicI64::new(start_millis))
    }

    pub fn advance_minutes(&self, minutes: i64) {
        self.0.fetch_add(minutes * 60_000, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_millis(&self) -> i64 {
        self.0.load(Ordering::SeqCst)
    }
}

// ── Request / response payloads ──

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartLine {
    pub product_id: String,
    pub quantity: i32,
    /// Price the client displayed; informational only
    #[serde(default)]
    pub price_at_order: Option<i64>,
}

/// `POST /orders` body
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutRequest {
    pub phone: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    pub address: String,
    pub city: String,
    pub pincode: String,
    pub items: Vec<CartLine>,
    pub subtotal: i64,
    pub delivery_fee: i64,
    pub total: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedOrder {
    pub order_id: String,
    pub order_number: String,
    pub payment_init_token: String,
}

/// Gateway identifiers handed to the checkout widget
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentInit {
    pub gateway_order_id: String,
    pub currency: String,
    pub amount: i64,
    pub key_id: String,
    pub failure_token: String,
}

/// `POST /payment/verify` body
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentVerification {
    pub gateway_order_id: String,
    pub gateway_payment_id: String,
    pub signature: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifiedPayment {
    pub success: bool,
    pub order_id: String,
    pub invoice_url: Option<String>,
}

// ── Checkout validation ──

fn trimmed(value: &str) -> String {
    value.trim().to_string()
}

fn optional(value: Option<&str>) -> Option<String> {
    value.map(str::trim).filter(|v| !v.is_empty()).map(String::from)
}

/// Digits only; 10 to 15 of them
pub fn normalize_phone(phone: &str) -> Result<String, AppError> {
    let digits: String = phone
        .chars()
        .filter(|c| !matches!(c, ' ' | '-' | '+' | '(' | ')'))
        .collect();
    if !(10..=15).contains(&digits.len()) || !digits.chars().all(|c| c.is_ascii_digit()) {
        return Err(AppError::new(ErrorCode::CustomerPhoneInvalid).with_detail("phone", phone));
    }
    Ok(digits)
}

fn required(field: &'static str, value: &str) -> Result<String, AppError> {
    let value = trimmed(value);
    if value.is_empty() {
        return Err(AppError::new(ErrorCode::RequiredField).with_detail("field", field));
    }
    Ok(value)
}

/// Turn a checkout request into a draft the store can reserve and persist
pub fn build_draft(
    req: &CheckoutRequest,
    pricing: PricingRules,
    payment_init_token: String,
) -> Result<OrderDraft, AppError> {
    if req.items.is_empty() {
        return Err(AppError::new(ErrorCode::OrderEmpty));
    }
    let phone = normalize_phone(&req.phone)?;
    let address = required("address", &req.address)?;
    let city = required("city", &req.city)?;
    let pincode = required("pincode", &req.pincode)?;
    if pincode.len() != 6 || !pincode.chars().all(|c| c.is_ascii_digit()) {
        return Err(AppError::validation("Pincode must be 6 digits").with_detail("field", "pincode"));
    }
    let email = optional(req.email.as_deref());
    if let Some(email) = &email
        && !email.contains('@')
    {
        return Err(AppError::validation("Invalid email address").with_detail("field", "email"));
    }
    let name = optional(req.name.as_deref());

    let lines = inventory::merge_lines(
        req.items
            .iter()
            .map(|line| (line.product_id.as_str(), line.quantity)),
    )?;

    Ok(OrderDraft {
        customer: CustomerInfo {
            phone: phone.clone(),
            name: name.clone(),
            email: email.clone(),
        },
        delivery: DeliveryDetails {
            name: name.unwrap_or_else(|| "Customer".to_string()),
            phone,
            email,
            address,
            city,
            pincode,
        },
        lines,
        quote: ClientQuote {
            subtotal: req.subtotal,
            delivery_fee: req.delivery_fee,
            total: req.total,
        },
        pricing,
        payment_init_token,
    })
}
