//! Order store
//!
//! Every method is one datastore transaction: it reads (and locks) what it
//! needs, re-checks mutable state, writes, and enqueues outbox notifications
//! before committing. Business errors abort the whole unit.

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use shared::error::{AppError, ErrorCode};
use shared::models::{
    CancelReason, DeliveryDetails, Order, OrderItem, OrderStatus, PaymentStatus, Product,
    StockAdjustment,
};

use crate::error::ServiceResult;
use crate::notify::Notification;
use crate::orders::pricing::{ClientQuote, PricedOrder, PricingRules};
use crate::payment::GatewayIntent;

/// Outbox events are attempted this many times before being marked failed
pub const OUTBOX_MAX_ATTEMPTS: i32 = 5;
/// How long a claimed event stays invisible to other workers
pub const OUTBOX_LEASE_MS: i64 = 60_000;
/// Order number generation attempts before giving up
pub const ORDER_NUMBER_ATTEMPTS: usize = 3;

/// Customer identity as submitted at checkout
#[derive(Debug, Clone)]
pub struct CustomerInfo {
    pub phone: String,
    pub name: Option<String>,
    pub email: Option<String>,
}

/// Validated checkout, ready to be reserved and persisted
#[derive(Debug, Clone)]
pub struct OrderDraft {
    pub customer: CustomerInfo,
    pub delivery: DeliveryDetails,
    /// Quantities merged per product id
    pub lines: BTreeMap<String, i32>,
    pub quote: ClientQuote,
    pub pricing: PricingRules,
    pub payment_init_token: String,
}

/// Gateway intent to attach to an order
#[derive(Debug, Clone)]
pub struct GatewayAttach<'a> {
    pub order_id: &'a str,
    pub payment_init_token: &'a str,
    pub intent: &'a GatewayIntent,
    pub failure_token: &'a str,
    pub now: i64,
}

#[derive(Debug, Clone)]
pub enum AttachOutcome {
    /// The intent was stored on the order
    Attached(Order),
    /// A concurrent call attached a pending intent first; this one is unused
    Existing(Order),
}

/// Every gateway order ever attached to an order, current or superseded
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayOrderRef {
    pub gateway_order_id: String,
    pub order_id: String,
    /// Payment already processed against this gateway order
    pub captured_payment_id: Option<String>,
}

#[derive(Debug, Clone)]
pub enum ConfirmOutcome {
    /// Order moved to CONFIRMED / PAID by this call
    Confirmed(Order),
    /// Nothing changed, the order was already paid
    AlreadyPaid(Order),
    /// Payment captured for a cancelled order that could not be revived
    CancelledUnavailable(Order),
    /// A second payment on an order that was already paid; refund alert queued
    DuplicatePayment(Order),
}

impl ConfirmOutcome {
    /// Outcome for a payment that was already processed once
    pub(crate) fn repeated(order: Order) -> Self {
        if order.payment_status.is_paid() {
            Self::AlreadyPaid(order)
        } else {
            Self::CancelledUnavailable(order)
        }
    }
}

/// Admin listing filter
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderFilter {
    pub status: Option<OrderStatus>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl OrderFilter {
    pub fn limit(&self) -> i64 {
        self.limit.unwrap_or(50).clamp(1, 200)
    }

    pub fn offset(&self) -> i64 {
        self.offset.unwrap_or(0).max(0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutboxStatus {
    Pending,
    Done,
    Failed,
}

impl OutboxStatus {
    pub fn as_db(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }
}

/// Queued notification
#[derive(Debug, Clone)]
pub struct OutboxEvent {
    pub id: i64,
    pub notification: Notification,
    pub status: OutboxStatus,
    pub attempts: i32,
    pub last_error: Option<String>,
    pub available_at: i64,
    pub created_at: i64,
}

/// Persistence seam for the order workflow
#[async_trait]
pub trait OrderStore: Send + Sync {
    // ── Orders ──

    /// Find-or-create the customer, reserve every line, price server-side,
    /// insert the PENDING order and enqueue `order_placed`
    async fn create_order(&self, draft: &OrderDraft, now: i64) -> ServiceResult<Order>;

    async fn find_order(&self, order_id: &str) -> ServiceResult<Option<Order>>;

    /// Resolves superseded gateway orders as well as the current one
    async fn find_order_by_gateway_id(
        &self,
        gateway_order_id: &str,
    ) -> ServiceResult<Option<Order>>;

    async fn list_orders(&self, filter: &OrderFilter) -> ServiceResult<Vec<Order>>;

    /// Store a gateway intent after re-checking token, status and any
    /// concurrently attached intent
    async fn attach_gateway_order(&self, attach: &GatewayAttach<'_>)
    -> ServiceResult<AttachOutcome>;

    /// Mark paid and confirmed, reviving an abandoned order when stock allows.
    /// Captures on a superseded gateway order count too.
    async fn confirm_payment(
        &self,
        gateway_order_id: &str,
        gateway_payment_id: &str,
        now: i64,
    ) -> ServiceResult<ConfirmOutcome>;

    /// Mark the payment failed unless it is already paid. `failure_token`
    /// is checked when given; trusted callers (signed webhooks) pass `None`.
    async fn mark_payment_failed(
        &self,
        order_id: &str,
        failure_token: Option<&str>,
        now: i64,
    ) -> ServiceResult<Order>;

    async fn set_invoice_url(&self, order_id: &str, url: &str, now: i64) -> ServiceResult<()>;

    /// Ids of PENDING unpaid orders created before `cutoff`
    async fn list_abandoned(&self, cutoff: i64) -> ServiceResult<Vec<String>>;

    /// Re-check and cancel one abandoned order, releasing its stock
    async fn cancel_if_abandoned(&self, order_id: &str, cutoff: i64, now: i64)
    -> ServiceResult<bool>;

    /// Operator status change, enqueues `status_changed`
    async fn update_status(
        &self,
        order_id: &str,
        next: OrderStatus,
        now: i64,
    ) -> ServiceResult<Order>;

    // ── Inventory ──

    async fn find_product(&self, product_id: &str) -> ServiceResult<Option<Product>>;

    /// Restock every product to its baseline, enqueues `stock_reset`
    async fn reset_stock(&self, now: i64) -> ServiceResult<u64>;

    async fn adjust_stock(
        &self,
        product_id: &str,
        change: &StockAdjustment,
        now: i64,
    ) -> ServiceResult<Product>;

    // ── Outbox ──

    /// Lease up to `limit` due events
    async fn claim_outbox(&self, limit: i64, now: i64) -> ServiceResult<Vec<OutboxEvent>>;

    async fn complete_outbox(&self, id: i64) -> ServiceResult<()>;

    /// Record a failed attempt; the event is retried later or marked failed
    async fn retry_outbox(&self, id: i64, error: &str, now: i64) -> ServiceResult<()>;

    // ── Webhooks ──

    /// Returns `false` when the event id was already recorded
    async fn record_webhook_event(
        &self,
        event_id: &str,
        event_type: &str,
        now: i64,
    ) -> ServiceResult<bool>;

    /// Drop a recorded event so a gateway redelivery is processed again
    async fn forget_webhook_event(&self, event_id: &str) -> ServiceResult<()>;
}

/// Delay before the next attempt of an event that failed `attempts` times
pub fn outbox_backoff_ms(attempts: i32) -> i64 {
    5_000 * (1_i64 << attempts.clamp(0, 10))
}

/// Build the persisted order from a priced draft
pub(crate) fn assemble_order(
    draft: &OrderDraft,
    priced: &PricedOrder,
    user_id: &str,
    order_id: String,
    order_number: String,
    now: i64,
) -> Order {
    let items = priced
        .lines
        .iter()
        .map(|line| OrderItem {
            id: shared::util::new_id(),
            order_id: order_id.clone(),
            product_id: line.product_id.clone(),
            product_name: line.product_name.clone(),
            quantity: line.quantity,
            price_at_time: line.unit_price,
        })
        .collect();

    Order {
        id: order_id,
        order_number,
        user_id: user_id.to_string(),
        items,
        subtotal: priced.subtotal,
        delivery_fee: priced.delivery_fee,
        total: priced.total,
        delivery: draft.delivery.clone(),
        status: OrderStatus::Pending,
        payment_status: PaymentStatus::Unset,
        cancel_reason: None,
        gateway_order_id: None,
        gateway_payment_id: None,
        idempotency_key: Some(draft.payment_init_token.clone()),
        payment_failure_token: None,
        invoice_url: None,
        created_at: now,
        updated_at: now,
        paid_at: None,
    }
}

/// What a valid payment confirmation does to an order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ConfirmPlan {
    AlreadyPaid,
    /// Mark paid; PENDING moves to CONFIRMED, later statuses are kept
    Confirm,
    /// Abandoned by cleanup: re-reserve stock, then confirm
    Revive,
    /// Cancelled by an operator: leave it and alert for a refund
    RefundAlert,
    /// Paid again through another gateway order: alert for a refund
    DuplicateAlert,
    /// This payment was already reported for a refund
    AlreadyAlerted,
}

/// `recorded` is the payment already processed on the captured gateway order
pub(crate) fn plan_confirm(
    order: &Order,
    recorded: Option<&str>,
    gateway_payment_id: &str,
) -> ConfirmPlan {
    let paid_with_this = order.payment_status.is_paid()
        && order.gateway_payment_id.as_deref() == Some(gateway_payment_id);
    if paid_with_this {
        return ConfirmPlan::AlreadyPaid;
    }
    if recorded == Some(gateway_payment_id) {
        return ConfirmPlan::AlreadyAlerted;
    }
    if order.payment_status.is_paid() {
        return ConfirmPlan::DuplicateAlert;
    }
    match (order.status, order.cancel_reason) {
        (OrderStatus::Cancelled, Some(CancelReason::Abandoned)) => ConfirmPlan::Revive,
        (OrderStatus::Cancelled, _) => ConfirmPlan::RefundAlert,
        _ => ConfirmPlan::Confirm,
    }
}

/// Remember a captured payment on an order that stays cancelled
pub(crate) fn note_unrefunded_payment(order: &mut Order, gateway_payment_id: &str, now: i64) {
    order.gateway_payment_id = Some(gateway_payment_id.to_string());
    order.updated_at = now;
}

/// The captured gateway order becomes the current one
pub(crate) fn apply_payment(
    order: &mut Order,
    gateway_order_id: &str,
    gateway_payment_id: &str,
    now: i64,
) {
    if matches!(order.status, OrderStatus::Pending | OrderStatus::Cancelled) {
        order.status = OrderStatus::Confirmed;
    }
    order.cancel_reason = None;
    order.payment_status = PaymentStatus::Paid;
    order.gateway_order_id = Some(gateway_order_id.to_string());
    order.gateway_payment_id = Some(gateway_payment_id.to_string());
    order.paid_at = Some(now);
    order.updated_at = now;
}

pub(crate) fn cancel(order: &mut Order, reason: CancelReason, now: i64) {
    order.status = OrderStatus::Cancelled;
    order.cancel_reason = Some(reason);
    order.updated_at = now;
}

/// Gate for attaching a gateway intent. `Ok(true)` means a pending intent is
/// already attached and must be reused.
pub(crate) fn check_attachable(order: &Order, payment_init_token: &str) -> Result<bool, AppError> {
    let token_ok = order
        .idempotency_key
        .as_deref()
        .is_some_and(|key| crate::util::secure_eq(key, payment_init_token));
    if !token_ok {
        return Err(AppError::token_mismatch());
    }
    if order.payment_status.is_paid() {
        return Err(AppError::already_paid());
    }
    if order.status == OrderStatus::Cancelled {
        return Err(AppError::order_cancelled());
    }
    Ok(order.gateway_order_id.is_some() && order.payment_status == PaymentStatus::Pending)
}

/// Gate for reporting a failed checkout. `Ok(false)` means nothing to change.
pub(crate) fn check_failable(order: &Order, failure_token: Option<&str>) -> Result<bool, AppError> {
    if let Some(token) = failure_token {
        let token_ok = order
            .payment_failure_token
            .as_deref()
            .is_some_and(|key| crate::util::secure_eq(key, token));
        if !token_ok {
            return Err(AppError::token_mismatch());
        }
    }
    Ok(!order.payment_status.is_paid()
        && order.status != OrderStatus::Cancelled
        && order.payment_status != PaymentStatus::Failed)
}

/// Gate for operator status changes
pub(crate) fn check_transition(order: &Order, next: OrderStatus) -> Result<(), AppError> {
    if order.status.admin_can_move_to(next) {
        return Ok(());
    }
    Err(AppError::new(ErrorCode::OrderInvalidTransition)
        .with_detail("from", order.status.as_db())
        .with_detail("to", next.as_db()))
}

/// Errors that mean "the stock is gone" rather than a broken request
pub(crate) fn is_stock_shortfall(e: &AppError) -> bool {
    matches!(
        e.code,
        ErrorCode::ProductOutOfStock | ErrorCode::ProductNotFound
    )
}

/// Quantities per product for stock release/re-reserve
pub(crate) fn order_lines(order: &Order) -> BTreeMap<String, i32> {
    let mut lines = BTreeMap::new();
    for item in &order.items {
        *lines.entry(item.product_id.clone()).or_insert(0) += item.quantity;
    }
    lines
}
