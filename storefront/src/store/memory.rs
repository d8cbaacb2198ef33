//! In-memory order store
//!
//! One mutex guards all tables; holding it for a whole method gives each
//! method the same all-or-nothing behavior as a database transaction. Used by
//! the test suite and by development runs without `DATABASE_URL`.

use std::collections::{BTreeMap, HashMap, HashSet};

use async_trait::async_trait;
use parking_lot::Mutex;
use shared::error::AppError;
use shared::models::{
    CancelReason, Order, OrderStatus, PaymentStatus, Product, StockAdjustment, User,
};

use super::{
    AttachOutcome, ConfirmOutcome, ConfirmPlan, GatewayAttach, GatewayOrderRef, OrderDraft,
    OrderFilter, OrderStore, OutboxEvent, OutboxStatus, ORDER_NUMBER_ATTEMPTS, OUTBOX_LEASE_MS,
    OUTBOX_MAX_ATTEMPTS,
};
use crate::error::{ServiceError, ServiceResult};
use crate::inventory;
use crate::notify::Notification;
use crate::orders::{number, pricing};

#[derive(Default)]
struct Tables {
    products: BTreeMap<String, Product>,
    /// Keyed by phone
    users: HashMap<String, User>,
    orders: HashMap<String, Order>,
    order_numbers: HashSet<String>,
    /// Keyed by gateway order id
    gateway_orders: HashMap<String, GatewayOrderRef>,
    /// Pending and failed events; completed ones are dropped
    outbox: Vec<OutboxEvent>,
    next_outbox_id: i64,
    webhook_events: HashSet<String>,
}

impl Tables {
    fn enqueue(&mut self, notification: Notification, now: i64) {
        self.next_outbox_id += 1;
        self.outbox.push(OutboxEvent {
            id: self.next_outbox_id,
            notification,
            status: OutboxStatus::Pending,
            attempts: 0,
            last_error: None,
            available_at: now,
            created_at: now,
        });
    }

    /// Copies of the products named by `lines`, to be written back on success
    fn load_products(&self, lines: &BTreeMap<String, i32>) -> Vec<Product> {
        lines
            .keys()
            .filter_map(|id| self.products.get(id).cloned())
            .collect()
    }

    fn store_products(&mut self, products: Vec<Product>, now: i64) {
        for mut product in products {
            product.updated_at = now;
            self.products.insert(product.id.clone(), product);
        }
    }

    fn order_mut(&mut self, order_id: &str) -> Result<&mut Order, AppError> {
        self.orders
            .get_mut(order_id)
            .ok_or_else(|| AppError::order_not_found(order_id))
    }

    fn record_capture(&mut self, gateway_order_id: &str, gateway_payment_id: &str) {
        if let Some(gateway) = self.gateway_orders.get_mut(gateway_order_id) {
            gateway.captured_payment_id = Some(gateway_payment_id.to_string());
        }
    }

    fn alert_unrefunded(
        &mut self,
        order_id: &str,
        gateway_order_id: &str,
        gateway_payment_id: &str,
        now: i64,
    ) -> Result<ConfirmOutcome, AppError> {
        self.record_capture(gateway_order_id, gateway_payment_id);
        let order = self.order_mut(order_id)?;
        super::note_unrefunded_payment(order, gateway_payment_id, now);
        let snapshot = order.clone();
        self.enqueue(
            Notification::PaymentAfterCancel {
                order_id: order_id.to_string(),
                gateway_payment_id: gateway_payment_id.to_string(),
            },
            now,
        );
        Ok(ConfirmOutcome::CancelledUnavailable(snapshot))
    }

    fn order_id_by_gateway(&self, gateway_order_id: &str) -> Option<String> {
        self.gateway_orders
            .get(gateway_order_id)
            .map(|g| g.order_id.clone())
    }

    fn find_or_create_user(&mut self, draft: &OrderDraft, now: i64) -> String {
        let customer = &draft.customer;
        let user = self
            .users
            .entry(customer.phone.clone())
            .or_insert_with(|| User {
                id: shared::util::new_id(),
                phone: customer.phone.clone(),
                name: None,
                email: None,
                created_at: now,
            });
        user.fill_missing(customer.name.as_deref(), customer.email.as_deref());
        user.id.clone()
    }
}

#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_products(products: impl IntoIterator<Item = Product>) -> Self {
        let store = Self::new();
        {
            let mut tables = store.tables.lock();
            for product in products {
                tables.products.insert(product.id.clone(), product);
            }
        }
        store
    }

    /// Every product, ordered by id
    pub fn products(&self) -> Vec<Product> {
        self.tables.lock().products.values().cloned().collect()
    }

    /// Every queued notification, oldest first
    pub fn outbox(&self) -> Vec<OutboxEvent> {
        self.tables.lock().outbox.clone()
    }

    /// Every customer
    pub fn users(&self) -> Vec<User> {
        self.tables.lock().users.values().cloned().collect()
    }
}

#[async_trait]
impl OrderStore for MemoryStore {
    async fn create_order(&self, draft: &OrderDraft, now: i64) -> ServiceResult<Order> {
        let mut tables = self.tables.lock();

        let mut products = tables.load_products(&draft.lines);
        inventory::reserve_all(&mut products, &draft.lines)?;
        let priced = pricing::price_lines(&products, &draft.lines, &draft.pricing)?;
        pricing::check_quote(&priced, &draft.quote)?;

        let mut order_number = None;
        for _ in 0..ORDER_NUMBER_ATTEMPTS {
            let candidate = number::generate(now);
            if !tables.order_numbers.contains(&candidate) {
                order_number = Some(candidate);
                break;
            }
        }
        let order_number = order_number.ok_or_else(|| {
            ServiceError::Db("could not allocate a unique order number".into())
        })?;

        let user_id = tables.find_or_create_user(draft, now);
        let order = super::assemble_order(
            draft,
            &priced,
            &user_id,
            shared::util::new_id(),
            order_number,
            now,
        );

        tables.store_products(products, now);
        tables.order_numbers.insert(order.order_number.clone());
        tables.orders.insert(order.id.clone(), order.clone());
        tables.enqueue(
            Notification::OrderPlaced {
                order_id: order.id.clone(),
            },
            now,
        );
        Ok(order)
    }

    async fn find_order(&self, order_id: &str) -> ServiceResult<Option<Order>> {
        Ok(self.tables.lock().orders.get(order_id).cloned())
    }

    async fn find_order_by_gateway_id(
        &self,
        gateway_order_id: &str,
    ) -> ServiceResult<Option<Order>> {
        let tables = self.tables.lock();
        Ok(tables
            .order_id_by_gateway(gateway_order_id)
            .and_then(|id| tables.orders.get(&id).cloned()))
    }

    async fn list_orders(&self, filter: &OrderFilter) -> ServiceResult<Vec<Order>> {
        let tables = self.tables.lock();
        let mut orders: Vec<Order> = tables
            .orders
            .values()
            .filter(|o| filter.status.is_none_or(|s| o.status == s))
            .cloned()
            .collect();
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(orders
            .into_iter()
            .skip(filter.offset() as usize)
            .take(filter.limit() as usize)
            .collect())
    }

    async fn attach_gateway_order(
        &self,
        attach: &GatewayAttach<'_>,
    ) -> ServiceResult<AttachOutcome> {
        let mut tables = self.tables.lock();
        let order = tables.order_mut(attach.order_id)?;
        if super::check_attachable(order, attach.payment_init_token)? {
            return Ok(AttachOutcome::Existing(order.clone()));
        }
        order.gateway_order_id = Some(attach.intent.gateway_order_id.clone());
        order.payment_status = PaymentStatus::Pending;
        order.payment_failure_token = Some(attach.failure_token.to_string());
        order.updated_at = attach.now;
        let attached = order.clone();
        tables.gateway_orders.insert(
            attach.intent.gateway_order_id.clone(),
            GatewayOrderRef {
                gateway_order_id: attach.intent.gateway_order_id.clone(),
                order_id: attach.order_id.to_string(),
                captured_payment_id: None,
            },
        );
        Ok(AttachOutcome::Attached(attached))
    }

    async fn confirm_payment(
        &self,
        gateway_order_id: &str,
        gateway_payment_id: &str,
        now: i64,
    ) -> ServiceResult<ConfirmOutcome> {
        let mut tables = self.tables.lock();
        let gateway = tables
            .gateway_orders
            .get(gateway_order_id)
            .cloned()
            .ok_or_else(|| AppError::order_not_found(gateway_order_id))?;
        let order_id = gateway.order_id;
        let snapshot = tables.order_mut(&order_id)?.clone();

        let plan = super::plan_confirm(
            &snapshot,
            gateway.captured_payment_id.as_deref(),
            gateway_payment_id,
        );
        match plan {
            ConfirmPlan::AlreadyPaid => return Ok(ConfirmOutcome::AlreadyPaid(snapshot)),
            ConfirmPlan::AlreadyAlerted => return Ok(ConfirmOutcome::repeated(snapshot)),
            ConfirmPlan::DuplicateAlert => {
                tables.record_capture(gateway_order_id, gateway_payment_id);
                tables.enqueue(
                    Notification::DuplicatePayment {
                        order_id: order_id.clone(),
                        gateway_payment_id: gateway_payment_id.to_string(),
                    },
                    now,
                );
                return Ok(ConfirmOutcome::DuplicatePayment(snapshot));
            }
            ConfirmPlan::Confirm => {}
            ConfirmPlan::Revive => {
                let lines = super::order_lines(&snapshot);
                let mut products = tables.load_products(&lines);
                match inventory::reserve_all(&mut products, &lines) {
                    Ok(()) => tables.store_products(products, now),
                    Err(e) if super::is_stock_shortfall(&e) => {
                        tracing::warn!(order_id = %order_id, reason = %e.message, "Paid order could not be revived");
                        return Ok(tables.alert_unrefunded(
                            &order_id,
                            gateway_order_id,
                            gateway_payment_id,
                            now,
                        )?);
                    }
                    Err(e) => return Err(e.into()),
                }
            }
            ConfirmPlan::RefundAlert => {
                return Ok(tables.alert_unrefunded(
                    &order_id,
                    gateway_order_id,
                    gateway_payment_id,
                    now,
                )?);
            }
        }

        tables.record_capture(gateway_order_id, gateway_payment_id);
        let order = tables.order_mut(&order_id)?;
        super::apply_payment(order, gateway_order_id, gateway_payment_id, now);
        let confirmed = order.clone();
        tables.enqueue(
            Notification::PaymentConfirmed {
                order_id: order_id.clone(),
            },
            now,
        );
        Ok(ConfirmOutcome::Confirmed(confirmed))
    }

    async fn mark_payment_failed(
        &self,
        order_id: &str,
        failure_token: Option<&str>,
        now: i64,
    ) -> ServiceResult<Order> {
        let mut tables = self.tables.lock();
        let order = tables.order_mut(order_id)?;
        if super::check_failable(order, failure_token)? {
            order.payment_status = PaymentStatus::Failed;
            order.updated_at = now;
        }
        Ok(order.clone())
    }

    async fn set_invoice_url(&self, order_id: &str, url: &str, now: i64) -> ServiceResult<()> {
        let mut tables = self.tables.lock();
        let order = tables.order_mut(order_id)?;
        order.invoice_url = Some(url.to_string());
        order.updated_at = now;
        Ok(())
    }

    async fn list_abandoned(&self, cutoff: i64) -> ServiceResult<Vec<String>> {
        let tables = self.tables.lock();
        let mut stale: Vec<&Order> = tables
            .orders
            .values()
            .filter(|o| o.is_abandoned(cutoff))
            .collect();
        stale.sort_by_key(|o| o.created_at);
        Ok(stale.into_iter().map(|o| o.id.clone()).collect())
    }

    async fn cancel_if_abandoned(
        &self,
        order_id: &str,
        cutoff: i64,
        now: i64,
    ) -> ServiceResult<bool> {
        let mut tables = self.tables.lock();
        let Some(order) = tables.orders.get(order_id) else {
            return Ok(false);
        };
        if !order.is_abandoned(cutoff) {
            return Ok(false);
        }

        let lines = super::order_lines(order);
        let mut products = tables.load_products(&lines);
        inventory::release_all(&mut products, &lines);
        tables.store_products(products, now);

        let order = tables.order_mut(order_id)?;
        super::cancel(order, CancelReason::Abandoned, now);
        order.payment_status = PaymentStatus::Failed;
        Ok(true)
    }

    async fn update_status(
        &self,
        order_id: &str,
        next: OrderStatus,
        now: i64,
    ) -> ServiceResult<Order> {
        let mut tables = self.tables.lock();
        let order = tables.order_mut(order_id)?;
        super::check_transition(order, next)?;

        if next == OrderStatus::Cancelled && order.status.holds_stock() {
            let lines = super::order_lines(order);
            let mut products = tables.load_products(&lines);
            inventory::release_all(&mut products, &lines);
            tables.store_products(products, now);
        }

        let order = tables.order_mut(order_id)?;
        if next == OrderStatus::Cancelled {
            super::cancel(order, CancelReason::Operator, now);
        } else {
            order.status = next;
            order.updated_at = now;
        }
        let updated = order.clone();
        tables.enqueue(
            Notification::StatusChanged {
                order_id: order_id.to_string(),
                status: next,
            },
            now,
        );
        Ok(updated)
    }

    async fn find_product(&self, product_id: &str) -> ServiceResult<Option<Product>> {
        Ok(self.tables.lock().products.get(product_id).cloned())
    }

    async fn reset_stock(&self, now: i64) -> ServiceResult<u64> {
        let mut tables = self.tables.lock();
        let mut restocked = 0u64;
        for product in tables.products.values_mut() {
            product.apply_stock(inventory::reset_to_default(product.stock_level()));
            product.updated_at = now;
            restocked += 1;
        }
        tables.enqueue(Notification::StockReset { restocked }, now);
        Ok(restocked)
    }

    async fn adjust_stock(
        &self,
        product_id: &str,
        change: &StockAdjustment,
        now: i64,
    ) -> ServiceResult<Product> {
        let mut tables = self.tables.lock();
        let product = tables
            .products
            .get_mut(product_id)
            .ok_or_else(|| AppError::not_found(format!("Product {product_id}")))?;
        product.apply_stock(inventory::adjust(product.stock_level(), change)?);
        product.updated_at = now;
        Ok(product.clone())
    }

    async fn claim_outbox(&self, limit: i64, now: i64) -> ServiceResult<Vec<OutboxEvent>> {
        let mut tables = self.tables.lock();
        let mut claimed = Vec::new();
        for event in tables.outbox.iter_mut() {
            if claimed.len() as i64 >= limit {
                break;
            }
            if event.status == OutboxStatus::Pending && event.available_at <= now {
                event.available_at = now + OUTBOX_LEASE_MS;
                claimed.push(event.clone());
            }
        }
        Ok(claimed)
    }

    async fn complete_outbox(&self, id: i64) -> ServiceResult<()> {
        self.tables.lock().outbox.retain(|e| e.id != id);
        Ok(())
    }

    async fn retry_outbox(&self, id: i64, error: &str, now: i64) -> ServiceResult<()> {
        let mut tables = self.tables.lock();
        if let Some(event) = tables.outbox.iter_mut().find(|e| e.id == id) {
            event.attempts += 1;
            event.last_error = Some(error.to_string());
            if event.attempts >= OUTBOX_MAX_ATTEMPTS {
                event.status = OutboxStatus::Failed;
            } else {
                event.available_at = now + super::outbox_backoff_ms(event.attempts);
            }
        }
        Ok(())
    }

    async fn record_webhook_event(
        &self,
        event_id: &str,
        _event_type: &str,
        _now: i64,
    ) -> ServiceResult<bool> {
        Ok(self.tables.lock().webhook_events.insert(event_id.to_string()))
    }

    async fn forget_webhook_event(&self, event_id: &str) -> ServiceResult<()> {
        self.tables.lock().webhook_events.remove(event_id);
        Ok(())
    }
}
