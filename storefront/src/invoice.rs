//! Invoices
//!
//! A paid order gets a plain-text invoice uploaded to object storage. The
//! public URL is stored on the order and included in the payment receipt.

use std::fmt::Write as _;

use async_trait::async_trait;
use aws_sdk_s3::Client as S3Client;
use shared::models::Order;
use shared::money::to_major;

use crate::error::BoxError;

const SELLER: &str = "FreshCatch Seafood";

/// Object key for an order's invoice
pub fn invoice_key(order: &Order) -> String {
    format!("invoices/{}.txt", order.order_number)
}

/// Render the invoice text
pub fn render(order: &Order) -> String {
    let mut out = String::new();
    let issued = chrono::DateTime::<chrono::Utc>::from_timestamp_millis(
        order.paid_at.unwrap_or(order.updated_at),
    )
    .map(|t| t.format("%Y-%m-%d %H:%M UTC").to_string())
    .unwrap_or_default();

    // Writing to a String cannot fail
    let _ = writeln!(out, "{SELLER}");
    let _ = writeln!(out, "TAX INVOICE {}", order.order_number);
    let _ = writeln!(out, "Date: {issued}");
    let _ = writeln!(out);
    let _ = writeln!(out, "Bill to: {}", order.delivery.name);
    let _ = writeln!(out, "         {}", order.delivery.address);
    let _ = writeln!(
        out,
        "         {} {}",
        order.delivery.city, order.delivery.pincode
    );
    let _ = writeln!(out, "Phone:   {}", order.delivery.phone);
    let _ = writeln!(out);
    let _ = writeln!(out, "{:<28} {:>5} {:>10} {:>11}", "Item", "Qty", "Rate", "Amount");
    for item in &order.items {
        let _ = writeln!(
            out,
            "{:<28} {:>5} {:>10} {:>11}",
            item.product_name,
            item.quantity,
            to_major(item.price_at_time),
            to_major(item.line_total())
        );
    }
    let _ = writeln!(out);
    let _ = writeln!(out, "{:<45} {:>11}", "Subtotal", to_major(order.subtotal));
    let _ = writeln!(out, "{:<45} {:>11}", "Delivery", to_major(order.delivery_fee));
    let _ = writeln!(out, "{:<45} {:>11}", "Total (INR)", to_major(order.total));
    if let Some(payment_id) = &order.gateway_payment_id {
        let _ = writeln!(out);
        let _ = writeln!(out, "Paid online, reference {payment_id}");
    }
    out
}

/// Where invoices are stored
#[async_trait]
pub trait InvoiceStorage: Send + Sync {
    /// Store the document and return its public URL
    async fn put(&self, key: &str, body: String) -> Result<String, BoxError>;
}

pub struct S3InvoiceStorage {
    client: S3Client,
    bucket: String,
    public_base_url: String,
}

impl S3InvoiceStorage {
    pub fn new(client: S3Client, bucket: impl Into<String>, public_base_url: &str) -> Self {
        Self {
            client,
            bucket: bucket.into(),
            public_base_url: public_base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl InvoiceStorage for S3InvoiceStorage {
    async fn put(&self, key: &str, body: String) -> Result<String, BoxError> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(body.into_bytes().into())
            .content_type("text/plain; charset=utf-8")
            .send()
            .await?;
        Ok(format!("{}/{}", self.public_base_url, key))
    }
}

/// Render and upload the invoice for a paid order
pub async fn publish(storage: &dyn InvoiceStorage, order: &Order) -> Result<String, BoxError> {
    let key = invoice_key(order);
    let url = storage.put(&key, render(order)).await?;
    tracing::info!(order_id = %order.id, key = %key, "Invoice uploaded");
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::models::{DeliveryDetails, OrderItem, OrderStatus, PaymentStatus};

    fn paid_order() -> Order {
        Order {
            id: "o1".into(),
            order_number: "FC241019-52311-K7QD".into(),
            user_id: "u1".into(),
            items: vec![OrderItem {
                id: "i1".into(),
                order_id: "o1".into(),
                product_id: "p1".into(),
                product_name: "Seer Fish Steaks".into(),
                quantity: 2,
                price_at_time: 62_500,
            }],
            subtotal: 125_000,
            delivery_fee: 0,
            total: 125_000,
            delivery: DeliveryDetails {
                name: "Ravi".into(),
                phone: "9876500000".into(),
                email: None,
                address: "4 Harbour Lane".into(),
                city: "Mangalore".into(),
                pincode: "575001".into(),
            },
            status: OrderStatus::Confirmed,
            payment_status: PaymentStatus::Paid,
            cancel_reason: None,
            gateway_order_id: Some("order_X".into()),
            gateway_payment_id: Some("pay_Y".into()),
            idempotency_key: None,
            payment_failure_token: None,
            invoice_url: None,
            created_at: 1_729_348_311_000,
            updated_at: 1_729_348_311_000,
            paid_at: Some(1_729_348_311_000),
        }
    }

    #[test]
    fn test_render() {
        let text = render(&paid_order());
        assert!(text.contains("TAX INVOICE FC241019-52311-K7QD"));
        assert!(text.contains("Date: 2024-10-19 14:31 UTC"));
        assert!(text.contains("Seer Fish Steaks"));
        assert!(text.contains("1250.00"));
        assert!(text.contains("reference pay_Y"));
    }

    #[test]
    fn test_invoice_key() {
        assert_eq!(invoice_key(&paid_order()), "invoices/FC241019-52311-K7QD.txt");
    }
}
