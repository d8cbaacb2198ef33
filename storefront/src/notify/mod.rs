//! Customer and admin notifications
//!
//! State transitions enqueue a [`Notification`] in the outbox inside their own
//! transaction. The [`worker::OutboxWorker`] renders and sends them later over
//! every configured [`NotificationChannel`]. Send failures never reach the
//! workflow that produced the event.

pub mod email;
pub mod templates;
pub mod whatsapp;
pub mod worker;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use shared::models::OrderStatus;

use crate::error::BoxError;

/// Outbox payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Notification {
    /// Customer confirmation + admin new-order alert
    OrderPlaced { order_id: String },
    /// Customer receipt + admin payment alert
    PaymentConfirmed { order_id: String },
    /// Operator moved the order
    StatusChanged {
        order_id: String,
        status: OrderStatus,
    },
    /// Daily restock summary for the admin
    StockReset { restocked: u64 },
    /// Money captured for an order that stayed cancelled; needs a manual refund
    PaymentAfterCancel {
        order_id: String,
        gateway_payment_id: String,
    },
    /// A second capture for an order that was already paid
    DuplicatePayment {
        order_id: String,
        gateway_payment_id: String,
    },
}

impl Notification {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::OrderPlaced { .. } => "order_placed",
            Self::PaymentConfirmed { .. } => "payment_confirmed",
            Self::StatusChanged { .. } => "status_changed",
            Self::StockReset { .. } => "stock_reset",
            Self::PaymentAfterCancel { .. } => "payment_after_cancel",
            Self::DuplicatePayment { .. } => "duplicate_payment",
        }
    }

    pub fn order_id(&self) -> Option<&str> {
        match self {
            Self::OrderPlaced { order_id }
            | Self::PaymentConfirmed { order_id }
            | Self::StatusChanged { order_id, .. }
            | Self::PaymentAfterCancel { order_id, .. }
            | Self::DuplicatePayment { order_id, .. } => Some(order_id),
            Self::StockReset { .. } => None,
        }
    }
}

/// Rendered message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub subject: String,
    pub body: String,
}

/// Where a message goes; channels pick the address they understand
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Recipient {
    pub email: Option<String>,
    pub phone: Option<String>,
}

#[async_trait]
pub trait NotificationChannel: Send + Sync {
    fn name(&self) -> &'static str;

    /// Address of `recipient` on this channel, `None` to skip
    fn address<'a>(&self, recipient: &'a Recipient) -> Option<&'a str>;

    async fn send(&self, to: &str, message: &Message) -> Result<(), BoxError>;
}

/// Outcome of sending one message over every channel
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryReport {
    pub attempted: usize,
    pub failed: usize,
}

impl DeliveryReport {
    /// Something was attempted and nothing got through
    pub fn all_failed(&self) -> bool {
        self.attempted > 0 && self.failed == self.attempted
    }

    fn merge(&mut self, other: DeliveryReport) {
        self.attempted += other.attempted;
        self.failed += other.failed;
    }
}

/// Fans a message out over every channel
#[derive(Clone)]
pub struct Dispatcher {
    channels: Vec<Arc<dyn NotificationChannel>>,
    admin: Recipient,
}

impl Dispatcher {
    pub fn new(channels: Vec<Arc<dyn NotificationChannel>>, admin: Recipient) -> Self {
        Self { channels, admin }
    }

    pub fn admin(&self) -> &Recipient {
        &self.admin
    }

    /// Send on each channel that has an address for `recipient`. A failing
    /// channel is logged and does not stop the others.
    pub async fn deliver(&self, recipient: &Recipient, message: &Message) -> DeliveryReport {
        let mut report = DeliveryReport::default();
        for channel in &self.channels {
            let Some(to) = channel.address(recipient) else {
                continue;
            };
            report.attempted += 1;
            if let Err(e) = channel.send(to, message).await {
                report.failed += 1;
                tracing::warn!(
                    channel = channel.name(),
                    subject = %message.subject,
                    error = %e,
                    "Notification send failed"
                );
            }
        }
        report
    }

    pub async fn deliver_to_admin(&self, message: &Message) -> DeliveryReport {
        self.deliver(&self.admin, message).await
    }

    /// Customer and admin deliveries of one event, merged
    pub async fn deliver_pair(
        &self,
        customer: &Recipient,
        customer_message: &Message,
        admin_message: &Message,
    ) -> DeliveryReport {
        let mut report = self.deliver(customer, customer_message).await;
        report.merge(self.deliver_to_admin(admin_message).await);
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_notification_json_shape() {
        let n = Notification::StatusChanged {
            order_id: "o1".into(),
            status: OrderStatus::Shipped,
        };
        let json = serde_json::to_value(&n).unwrap();
        assert_eq!(json["kind"], "status_changed");
        assert_eq!(json["status"], "SHIPPED");
        assert_eq!(n.kind(), "status_changed");

        let back: Notification = serde_json::from_value(json).unwrap();
        assert_eq!(back, n);
        assert_eq!(Notification::StockReset { restocked: 3 }.order_id(), None);
    }

    #[test]
    fn test_delivery_report() {
        let report = DeliveryReport {
            attempted: 2,
            failed: 1,
        };
        assert!(!report.all_failed());
        assert!(!DeliveryReport::default().all_failed());
        assert!(
            DeliveryReport {
                attempted: 1,
                failed: 1
            }
            .all_failed()
        );
    }
}
