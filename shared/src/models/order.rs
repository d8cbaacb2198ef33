//! Order Model
//!
//! An order carries two independent axes: the fulfilment `status` and the
//! `payment_status`. Both are stored as upper-case text.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Fulfilment lifecycle of an order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    Pending,
    Confirmed,
    Processing,
    Shipped,
    Delivered,
    Cancelled,
}

impl OrderStatus {
    pub fn as_db(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Confirmed => "CONFIRMED",
            Self::Processing => "PROCESSING",
            Self::Shipped => "SHIPPED",
            Self::Delivered => "DELIVERED",
            Self::Cancelled => "CANCELLED",
        }
    }

    pub fn from_db(value: &str) -> Option<Self> {
        match value {
            "PENDING" => Some(Self::Pending),
            "CONFIRMED" => Some(Self::Confirmed),
            "PROCESSING" => Some(Self::Processing),
            "SHIPPED" => Some(Self::Shipped),
            "DELIVERED" => Some(Self::Delivered),
            "CANCELLED" => Some(Self::Cancelled),
            _ => None,
        }
    }

    /// Whether an operator may move an order from `self` to `next`.
    ///
    /// Shipping-progress statuses move freely in either direction (operators
    /// correct mistakes). Nothing re-enters `Pending`, nothing leaves
    /// `Cancelled`, and cancelling is only possible before shipping.
    pub fn admin_can_move_to(&self, next: OrderStatus) -> bool {
        if *self == next || next == Self::Pending || *self == Self::Cancelled {
            return false;
        }
        match next {
            Self::Cancelled => matches!(self, Self::Pending | Self::Confirmed | Self::Processing),
            _ => true,
        }
    }

    /// Stock for this order is still held (not yet released by a cancel)
    pub fn holds_stock(&self) -> bool {
        !matches!(self, Self::Cancelled)
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_db())
    }
}

/// Payment axis of an order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    /// No payment attempt yet
    Unset,
    /// A gateway order exists and awaits confirmation
    Pending,
    Paid,
    Failed,
}

impl PaymentStatus {
    pub fn as_db(&self) -> &'static str {
        match self {
            Self::Unset => "UNSET",
            Self::Pending => "PENDING",
            Self::Paid => "PAID",
            Self::Failed => "FAILED",
        }
    }

    pub fn from_db(value: &str) -> Option<Self> {
        match value {
            "UNSET" => Some(Self::Unset),
            "PENDING" => Some(Self::Pending),
            "PAID" => Some(Self::Paid),
            "FAILED" => Some(Self::Failed),
            _ => None,
        }
    }

    pub fn is_paid(&self) -> bool {
        matches!(self, Self::Paid)
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_db())
    }
}

/// Why an order ended up `Cancelled`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CancelReason {
    /// Released by abandonment cleanup; a late payment may revive it
    Abandoned,
    /// Cancelled by an operator; never revived
    Operator,
}

impl CancelReason {
    pub fn as_db(&self) -> &'static str {
        match self {
            Self::Abandoned => "ABANDONED",
            Self::Operator => "OPERATOR",
        }
    }

    pub fn from_db(value: &str) -> Option<Self> {
        match value {
            "ABANDONED" => Some(Self::Abandoned),
            "OPERATOR" => Some(Self::Operator),
            _ => None,
        }
    }
}

/// Delivery details copied onto the order at creation time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryDetails {
    pub name: String,
    pub phone: String,
    pub email: Option<String>,
    pub address: String,
    pub city: String,
    pub pincode: String,
}

/// Order line
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "db", derive(sqlx::FromRow))]
pub struct OrderItem {
    pub id: String,
    pub order_id: String,
    pub product_id: String,
    pub product_name: String,
    pub quantity: i32,
    /// Unit price in paisa at order time
    pub price_at_time: i64,
}

impl OrderItem {
    pub fn line_total(&self) -> i64 {
        self.price_at_time * i64::from(self.quantity)
    }
}

/// Order aggregate
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: String,
    pub order_number: String,
    pub user_id: String,
    pub items: Vec<OrderItem>,
    pub subtotal: i64,
    pub delivery_fee: i64,
    pub total: i64,
    pub delivery: DeliveryDetails,
    pub status: OrderStatus,
    pub payment_status: PaymentStatus,
    /// Set while `status` is `Cancelled`
    pub cancel_reason: Option<CancelReason>,
    /// Current gateway order; superseded ones stay resolvable by the store
    pub gateway_order_id: Option<String>,
    pub gateway_payment_id: Option<String>,
    /// Payment-init token handed to the customer at creation
    #[serde(skip_serializing, default)]
    pub idempotency_key: Option<String>,
    /// Token that authorizes reporting a failed checkout
    #[serde(skip_serializing, default)]
    pub payment_failure_token: Option<String>,
    pub invoice_url: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
    pub paid_at: Option<i64>,
}

impl Order {
    /// `total == subtotal + delivery_fee` and subtotal matches the lines
    pub fn totals_consistent(&self) -> bool {
        let lines: i64 = self.items.iter().map(OrderItem::line_total).sum();
        self.total == self.subtotal + self.delivery_fee && self.subtotal == lines
    }

    /// Pending, unpaid and created before `cutoff`
    pub fn is_abandoned(&self, cutoff: i64) -> bool {
        self.status == OrderStatus::Pending
            && !self.payment_status.is_paid()
            && self.created_at < cutoff
    }
}
