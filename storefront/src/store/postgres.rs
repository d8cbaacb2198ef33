//! Postgres order store
//!
//! READ COMMITTED with explicit row locks: every read-then-write goes through
//! `SELECT ... FOR UPDATE` on the rows it mutates. Orders are locked before
//! their products; products are locked in ascending id order.

use async_trait::async_trait;
use shared::error::AppError;
use shared::models::{CancelReason, Order, OrderStatus, PaymentStatus, Product, StockAdjustment};
use sqlx::{PgPool, Postgres, Transaction};

use super::{
    AttachOutcome, ConfirmOutcome, ConfirmPlan, GatewayAttach, OrderDraft, OrderFilter,
    OrderStore, OutboxEvent, ORDER_NUMBER_ATTEMPTS,
};
use crate::db;
use crate::error::{ServiceError, ServiceResult};
use crate::inventory;
use crate::notify::Notification;
use crate::orders::{number, pricing};

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// One creation attempt. `Ok(None)` means the order number was taken
    /// and the transaction rolled back.
    async fn try_create_order(
        &self,
        draft: &OrderDraft,
        order_number: String,
        now: i64,
    ) -> ServiceResult<Option<Order>> {
        let mut tx = self.pool.begin().await?;

        let ids: Vec<String> = draft.lines.keys().cloned().collect();
        let mut products = db::products::lock_for_update(&mut *tx, &ids).await?;
        inventory::reserve_all(&mut products, &draft.lines)?;
        let priced = pricing::price_lines(&products, &draft.lines, &draft.pricing)?;
        pricing::check_quote(&priced, &draft.quote)?;

        let user = db::users::find_or_create(
            &mut *tx,
            &draft.customer.phone,
            draft.customer.name.as_deref(),
            draft.customer.email.as_deref(),
            now,
        )
        .await?;

        let order = super::assemble_order(
            draft,
            &priced,
            &user.id,
            shared::util::new_id(),
            order_number,
            now,
        );
        if let Err(e) = db::orders::insert(&mut *tx, &order).await {
            if db::is_unique_violation(&e) {
                return Ok(None);
            }
            return Err(e.into());
        }

        db::products::save_stock(&mut *tx, &products, now).await?;
        db::outbox::insert(
            &mut *tx,
            &Notification::OrderPlaced {
                order_id: order.id.clone(),
            },
            now,
        )
        .await?;
        tx.commit().await?;
        Ok(Some(order))
    }

    async fn lock_order(
        tx: &mut Transaction<'_, Postgres>,
        order_id: &str,
    ) -> ServiceResult<Order> {
        db::orders::find_for_update(&mut *tx, order_id)
            .await?
            .ok_or_else(|| AppError::order_not_found(order_id).into())
    }

    /// Release every line of `order` back to stock
    async fn release_order_stock(
        tx: &mut Transaction<'_, Postgres>,
        order: &Order,
        now: i64,
    ) -> ServiceResult<()> {
        let lines = super::order_lines(order);
        let ids: Vec<String> = lines.keys().cloned().collect();
        let mut products = db::products::lock_for_update(&mut *tx, &ids).await?;
        inventory::release_all(&mut products, &lines);
        db::products::save_stock(&mut *tx, &products, now).await?;
        Ok(())
    }

    async fn alert_unrefunded(
        mut tx: Transaction<'_, Postgres>,
        mut order: Order,
        gateway_order_id: &str,
        gateway_payment_id: &str,
        now: i64,
    ) -> ServiceResult<ConfirmOutcome> {
        db::gateway_orders::set_captured(&mut *tx, gateway_order_id, gateway_payment_id).await?;
        super::note_unrefunded_payment(&mut order, gateway_payment_id, now);
        db::orders::save_state(&mut *tx, &order).await?;
        db::outbox::insert(
            &mut *tx,
            &Notification::PaymentAfterCancel {
                order_id: order.id.clone(),
                gateway_payment_id: gateway_payment_id.to_string(),
            },
            now,
        )
        .await?;
        tx.commit().await?;
        Ok(ConfirmOutcome::CancelledUnavailable(order))
    }
}

#[async_trait]
impl OrderStore for PgStore {
    async fn create_order(&self, draft: &OrderDraft, now: i64) -> ServiceResult<Order> {
        for attempt in 1..=ORDER_NUMBER_ATTEMPTS {
            let order_number = number::generate(now);
            match self.try_create_order(draft, order_number.clone(), now).await? {
                Some(order) => return Ok(order),
                None => {
                    tracing::warn!(attempt, order_number = %order_number, "Order number collision, retrying");
                }
            }
        }
        Err(ServiceError::Db(
            "could not allocate a unique order number".into(),
        ))
    }

    async fn find_order(&self, order_id: &str) -> ServiceResult<Option<Order>> {
        let mut conn = self.pool.acquire().await?;
        Ok(db::orders::find(&mut *conn, order_id).await?)
    }

    async fn find_order_by_gateway_id(
        &self,
        gateway_order_id: &str,
    ) -> ServiceResult<Option<Order>> {
        let mut conn = self.pool.acquire().await?;
        Ok(db::orders::find_by_gateway_id(&mut *conn, gateway_order_id, false).await?)
    }

    async fn list_orders(&self, filter: &OrderFilter) -> ServiceResult<Vec<Order>> {
        let mut conn = self.pool.acquire().await?;
        Ok(db::orders::list(&mut *conn, filter).await?)
    }

    async fn attach_gateway_order(
        &self,
        attach: &GatewayAttach<'_>,
    ) -> ServiceResult<AttachOutcome> {
        let mut tx = self.pool.begin().await?;
        let mut order = Self::lock_order(&mut tx, attach.order_id).await?;
        if super::check_attachable(&order, attach.payment_init_token)? {
            return Ok(AttachOutcome::Existing(order));
        }

        order.gateway_order_id = Some(attach.intent.gateway_order_id.clone());
        order.payment_status = PaymentStatus::Pending;
        order.payment_failure_token = Some(attach.failure_token.to_string());
        order.updated_at = attach.now;
        db::gateway_orders::insert(
            &mut *tx,
            &attach.intent.gateway_order_id,
            &order.id,
            attach.now,
        )
        .await?;
        db::orders::save_state(&mut *tx, &order).await?;
        tx.commit().await?;
        Ok(AttachOutcome::Attached(order))
    }

    async fn confirm_payment(
        &self,
        gateway_order_id: &str,
        gateway_payment_id: &str,
        now: i64,
    ) -> ServiceResult<ConfirmOutcome> {
        let mut tx = self.pool.begin().await?;
        let mut order = db::orders::find_by_gateway_id(&mut *tx, gateway_order_id, true)
            .await?
            .ok_or_else(|| AppError::order_not_found(gateway_order_id))?;
        // Read under the order lock
        let recorded = db::gateway_orders::find(&mut *tx, gateway_order_id)
            .await?
            .and_then(|g| g.captured_payment_id);

        match super::plan_confirm(&order, recorded.as_deref(), gateway_payment_id) {
            ConfirmPlan::AlreadyPaid => return Ok(ConfirmOutcome::AlreadyPaid(order)),
            ConfirmPlan::AlreadyAlerted => return Ok(ConfirmOutcome::repeated(order)),
            ConfirmPlan::DuplicateAlert => {
                db::gateway_orders::set_captured(&mut *tx, gateway_order_id, gateway_payment_id)
                    .await?;
                db::outbox::insert(
                    &mut *tx,
                    &Notification::DuplicatePayment {
                        order_id: order.id.clone(),
                        gateway_payment_id: gateway_payment_id.to_string(),
                    },
                    now,
                )
                .await?;
                tx.commit().await?;
                return Ok(ConfirmOutcome::DuplicatePayment(order));
            }
            ConfirmPlan::Confirm => {}
            ConfirmPlan::Revive => {
                let lines = super::order_lines(&order);
                let ids: Vec<String> = lines.keys().cloned().collect();
                let mut products = db::products::lock_for_update(&mut *tx, &ids).await?;
                match inventory::reserve_all(&mut products, &lines) {
                    Ok(()) => db::products::save_stock(&mut *tx, &products, now).await?,
                    Err(e) if super::is_stock_shortfall(&e) => {
                        tracing::warn!(order_id = %order.id, reason = %e.message, "Paid order could not be revived");
                        return Self::alert_unrefunded(
                            tx,
                            order,
                            gateway_order_id,
                            gateway_payment_id,
                            now,
                        )
                        .await;
                    }
                    Err(e) => return Err(e.into()),
                }
            }
            ConfirmPlan::RefundAlert => {
                return Self::alert_unrefunded(
                    tx,
                    order,
                    gateway_order_id,
                    gateway_payment_id,
                    now,
                )
                .await;
            }
        }

        db::gateway_orders::set_captured(&mut *tx, gateway_order_id, gateway_payment_id).await?;
        super::apply_payment(&mut order, gateway_order_id, gateway_payment_id, now);
        db::orders::save_state(&mut *tx, &order).await?;
        db::outbox::insert(
            &mut *tx,
            &Notification::PaymentConfirmed {
                order_id: order.id.clone(),
            },
            now,
        )
        .await?;
        tx.commit().await?;
        Ok(ConfirmOutcome::Confirmed(order))
    }

    async fn mark_payment_failed(
        &self,
        order_id: &str,
        failure_token: Option<&str>,
        now: i64,
    ) -> ServiceResult<Order> {
        let mut tx = self.pool.begin().await?;
        let mut order = Self::lock_order(&mut tx, order_id).await?;
        if super::check_failable(&order, failure_token)? {
            order.payment_status = PaymentStatus::Failed;
            order.updated_at = now;
            db::orders::save_state(&mut *tx, &order).await?;
            tx.commit().await?;
        }
        Ok(order)
    }

    async fn set_invoice_url(&self, order_id: &str, url: &str, now: i64) -> ServiceResult<()> {
        let mut conn = self.pool.acquire().await?;
        let updated = db::orders::set_invoice_url(&mut *conn, order_id, url, now).await?;
        if updated == 0 {
            return Err(AppError::order_not_found(order_id).into());
        }
        Ok(())
    }

    async fn list_abandoned(&self, cutoff: i64) -> ServiceResult<Vec<String>> {
        let mut conn = self.pool.acquire().await?;
        Ok(db::orders::list_abandoned(&mut *conn, cutoff).await?)
    }

    async fn cancel_if_abandoned(
        &self,
        order_id: &str,
        cutoff: i64,
        now: i64,
    ) -> ServiceResult<bool> {
        let mut tx = self.pool.begin().await?;
        let Some(mut order) = db::orders::find_for_update(&mut *tx, order_id).await? else {
            return Ok(false);
        };
        // Paid or moved on since it was listed
        if !order.is_abandoned(cutoff) {
            return Ok(false);
        }

        Self::release_order_stock(&mut tx, &order, now).await?;
        super::cancel(&mut order, CancelReason::Abandoned, now);
        order.payment_status = PaymentStatus::Failed;
        db::orders::save_state(&mut *tx, &order).await?;
        tx.commit().await?;
        Ok(true)
    }

    async fn update_status(
        &self,
        order_id: &str,
        next: OrderStatus,
        now: i64,
    ) -> ServiceResult<Order> {
        let mut tx = self.pool.begin().await?;
        let mut order = Self::lock_order(&mut tx, order_id).await?;
        super::check_transition(&order, next)?;

        if next == OrderStatus::Cancelled && order.status.holds_stock() {
            Self::release_order_stock(&mut tx, &order, now).await?;
        }
        if next == OrderStatus::Cancelled {
            super::cancel(&mut order, CancelReason::Operator, now);
        } else {
            order.status = next;
            order.updated_at = now;
        }
        db::orders::save_state(&mut *tx, &order).await?;
        db::outbox::insert(
            &mut *tx,
            &Notification::StatusChanged {
                order_id: order.id.clone(),
                status: next,
            },
            now,
        )
        .await?;
        tx.commit().await?;
        Ok(order)
    }

    async fn find_product(&self, product_id: &str) -> ServiceResult<Option<Product>> {
        let mut conn = self.pool.acquire().await?;
        Ok(db::products::find(&mut *conn, product_id).await?)
    }

    async fn reset_stock(&self, now: i64) -> ServiceResult<u64> {
        let mut tx = self.pool.begin().await?;
        let mut products = db::products::lock_all(&mut *tx).await?;
        for product in products.iter_mut() {
            product.apply_stock(inventory::reset_to_default(product.stock_level()));
        }
        db::products::save_stock(&mut *tx, &products, now).await?;

        let restocked = products.len() as u64;
        db::outbox::insert(&mut *tx, &Notification::StockReset { restocked }, now).await?;
        tx.commit().await?;
        Ok(restocked)
    }

    async fn adjust_stock(
        &self,
        product_id: &str,
        change: &StockAdjustment,
        now: i64,
    ) -> ServiceResult<Product> {
        let mut tx = self.pool.begin().await?;
        let mut product = db::products::lock_for_update(&mut *tx, &[product_id.to_string()])
            .await?
            .pop()
            .ok_or_else(|| AppError::not_found(format!("Product {product_id}")))?;
        product.apply_stock(inventory::adjust(product.stock_level(), change)?);
        product.updated_at = now;
        db::products::save_stock(&mut *tx, std::slice::from_ref(&product), now).await?;
        tx.commit().await?;
        Ok(product)
    }

    async fn claim_outbox(&self, limit: i64, now: i64) -> ServiceResult<Vec<OutboxEvent>> {
        let mut conn = self.pool.acquire().await?;
        Ok(db::outbox::claim(&mut *conn, limit, now).await?)
    }

    async fn complete_outbox(&self, id: i64) -> ServiceResult<()> {
        let mut conn = self.pool.acquire().await?;
        db::outbox::complete(&mut *conn, id).await?;
        Ok(())
    }

    async fn retry_outbox(&self, id: i64, error: &str, now: i64) -> ServiceResult<()> {
        let mut conn = self.pool.acquire().await?;
        db::outbox::retry(&mut *conn, id, error, now).await?;
        Ok(())
    }

    async fn record_webhook_event(
        &self,
        event_id: &str,
        event_type: &str,
        now: i64,
    ) -> ServiceResult<bool> {
        let mut conn = self.pool.acquire().await?;
        Ok(db::webhook_events::record(&mut *conn, event_id, event_type, now).await?)
    }

    async fn forget_webhook_event(&self, event_id: &str) -> ServiceResult<()> {
        let mut conn = self.pool.acquire().await?;
        db::webhook_events::forget(&mut *conn, event_id).await?;
        Ok(())
    }
}
