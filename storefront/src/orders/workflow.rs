//! Order workflow orchestrator

use std::sync::Arc;

use shared::error::AppError;
use shared::models::{Order, OrderStatus, Product, StockAdjustment};
use tokio::sync::Notify;

use super::pricing::PricingRules;
use super::{
    build_draft, CheckoutRequest, Clock, CreatedOrder, PaymentInit, PaymentVerification,
    SystemClock, VerifiedPayment,
};
use crate::error::ServiceResult;
use crate::invoice::{self, InvoiceStorage};
use crate::payment::{signature, GatewayEvent, PaymentGateway, WebhookDelivery};
use crate::store::{AttachOutcome, ConfirmOutcome, GatewayAttach, OrderFilter, OrderStore};

/// Workflow knobs taken from configuration
#[derive(Debug, Clone)]
pub struct WorkflowSettings {
    pub pricing: PricingRules,
    pub currency: String,
    /// Razorpay key secret, the payment signature key
    pub payment_secret: String,
    pub abandon_after_minutes: i64,
}

pub struct OrderWorkflow {
    store: Arc<dyn OrderStore>,
    gateway: Arc<dyn PaymentGateway>,
    invoices: Arc<dyn InvoiceStorage>,
    outbox_signal: Arc<Notify>,
    clock: Arc<dyn Clock>,
    settings: WorkflowSettings,
}

impl OrderWorkflow {
    pub fn new(
        store: Arc<dyn OrderStore>,
        gateway: Arc<dyn PaymentGateway>,
        invoices: Arc<dyn InvoiceStorage>,
        outbox_signal: Arc<Notify>,
        settings: WorkflowSettings,
    ) -> Self {
        Self {
            store,
            gateway,
            invoices,
            outbox_signal,
            clock: Arc::new(SystemClock),
            settings,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn store(&self) -> &Arc<dyn OrderStore> {
        &self.store
    }

    fn now(&self) -> i64 {
        self.clock.now_millis()
    }

    /// Committed work left notifications in the outbox
    fn wake_outbox(&self) {
        self.outbox_signal.notify_one();
    }

    // ── Checkout ──

    /// Reserve stock and persist a PENDING order
    pub async fn create_order(&self, req: &CheckoutRequest) -> ServiceResult<CreatedOrder> {
        let draft = build_draft(req, self.settings.pricing, shared::util::random_token())?;
        let order = self.store.create_order(&draft, self.now()).await?;
        self.wake_outbox();

        tracing::info!(
            order_id = %order.id,
            order_number = %order.order_number,
            total = order.total,
            lines = order.items.len(),
            "Order created"
        );
        Ok(CreatedOrder {
            order_id: order.id,
            order_number: order.order_number,
            payment_init_token: draft.payment_init_token,
        })
    }

    /// Create (or reuse) the gateway intent for an order
    pub async fn initiate_payment(
        &self,
        order_id: &str,
        payment_init_token: &str,
    ) -> ServiceResult<PaymentInit> {
        let order = self
            .store
            .find_order(order_id)
            .await?
            .ok_or_else(|| AppError::order_not_found(order_id))?;

        // Cheap pre-check; the attaching transaction checks again
        if crate::store::check_attachable(&order, payment_init_token)? {
            tracing::debug!(order_id, "Reusing pending gateway order");
            return self.payment_init(&order);
        }

        let intent = self
            .gateway
            .create_intent(order.total, &self.settings.currency, &order.order_number)
            .await?;

        let failure_token = shared::util::random_token();
        let outcome = self
            .store
            .attach_gateway_order(&GatewayAttach {
                order_id,
                payment_init_token,
                intent: &intent,
                failure_token: &failure_token,
                now: self.now(),
            })
            .await?;

        let order = match outcome {
            AttachOutcome::Attached(order) => {
                tracing::info!(
                    order_id,
                    gateway_order_id = %intent.gateway_order_id,
                    amount = intent.amount,
                    "Payment initiated"
                );
                order
            }
            AttachOutcome::Existing(order) => {
                tracing::warn!(
                    order_id,
                    unused_gateway_order_id = %intent.gateway_order_id,
                    "Concurrent payment initiation, keeping the first gateway order"
                );
                order
            }
        };
        self.payment_init(&order)
    }

    fn payment_init(&self, order: &Order) -> ServiceResult<PaymentInit> {
        let (Some(gateway_order_id), Some(failure_token)) =
            (&order.gateway_order_id, &order.payment_failure_token)
        else {
            return Err(AppError::internal("Gateway order missing after attach").into());
        };
        Ok(PaymentInit {
            gateway_order_id: gateway_order_id.clone(),
            currency: self.settings.currency.clone(),
            amount: order.total,
            key_id: self.gateway.key_id().to_string(),
            failure_token: failure_token.clone(),
        })
    }

    /// Check the checkout signature and confirm the order
    pub async fn verify_payment(&self, req: &PaymentVerification) -> ServiceResult<VerifiedPayment> {
        if let Err(reason) = signature::verify_payment_signature(
            &req.gateway_order_id,
            &req.gateway_payment_id,
            &req.signature,
            &self.settings.payment_secret,
        ) {
            tracing::warn!(
                gateway_order_id = %req.gateway_order_id,
                reason,
                "Payment signature rejected"
            );
            return Err(AppError::signature_mismatch().into());
        }

        let order = self
            .confirm(&req.gateway_order_id, &req.gateway_payment_id)
            .await?
            .ok_or_else(AppError::order_cancelled)?;
        Ok(VerifiedPayment {
            success: true,
            order_id: order.id,
            invoice_url: order.invoice_url,
        })
    }

    /// Shared confirm path for checkout verification and webhooks.
    /// `None` means the order stayed cancelled and an admin was alerted.
    async fn confirm(
        &self,
        gateway_order_id: &str,
        gateway_payment_id: &str,
    ) -> ServiceResult<Option<Order>> {
        let outcome = self
            .store
            .confirm_payment(gateway_order_id, gateway_payment_id, self.now())
            .await?;

        match outcome {
            ConfirmOutcome::Confirmed(order) => {
                tracing::info!(
                    order_id = %order.id,
                    gateway_payment_id,
                    "Payment confirmed"
                );
                let order = self.attach_invoice(order).await;
                self.wake_outbox();
                Ok(Some(order))
            }
            ConfirmOutcome::AlreadyPaid(order) if order.invoice_url.is_none() => {
                Ok(Some(self.attach_invoice(order).await))
            }
            ConfirmOutcome::AlreadyPaid(order) => Ok(Some(order)),
            ConfirmOutcome::DuplicatePayment(order) => {
                tracing::error!(
                    order_id = %order.id,
                    gateway_order_id,
                    gateway_payment_id,
                    "Second payment captured for a paid order, refund required"
                );
                self.wake_outbox();
                Ok(Some(order))
            }
            ConfirmOutcome::CancelledUnavailable(order) => {
                tracing::error!(
                    order_id = %order.id,
                    gateway_payment_id,
                    "Payment captured for a cancelled order, refund required"
                );
                self.wake_outbox();
                Ok(None)
            }
        }
    }

    /// Best effort: a failed upload leaves the order without an invoice URL
    async fn attach_invoice(&self, mut order: Order) -> Order {
        let url = match invoice::publish(self.invoices.as_ref(), &order).await {
            Ok(url) => url,
            Err(e) => {
                tracing::warn!(order_id = %order.id, error = %e, "Invoice upload failed");
                return order;
            }
        };
        if let Err(e) = self.store.set_invoice_url(&order.id, &url, self.now()).await {
            tracing::warn!(order_id = %order.id, error = %e, "Invoice URL not saved");
            return order;
        }
        order.invoice_url = Some(url);
        order
    }

    /// The storefront reports a failed or dismissed checkout
    pub async fn report_payment_failure(
        &self,
        order_id: &str,
        failure_token: &str,
    ) -> ServiceResult<Order> {
        let order = self
            .store
            .mark_payment_failed(order_id, Some(failure_token), self.now())
            .await?;
        tracing::info!(order_id, payment_status = %order.payment_status, "Payment failure reported");
        Ok(order)
    }

    /// Apply a verified gateway webhook. Returns `false` for redeliveries.
    pub async fn handle_gateway_event(&self, delivery: &WebhookDelivery) -> ServiceResult<bool> {
        let now = self.now();
        if !self
            .store
            .record_webhook_event(&delivery.event_id, &delivery.event_type, now)
            .await?
        {
            tracing::debug!(event_id = %delivery.event_id, "Duplicate webhook skipped");
            return Ok(false);
        }

        let result = self.apply_gateway_event(&delivery.event).await;
        if let Err(e) = &result {
            tracing::warn!(event_id = %delivery.event_id, error = %e, "Webhook processing failed");
            // Let the gateway's redelivery run it again
            if let Err(e) = self.store.forget_webhook_event(&delivery.event_id).await {
                tracing::error!(event_id = %delivery.event_id, error = %e, "Webhook event not released");
            }
        }
        result.map(|()| true)
    }

    async fn apply_gateway_event(&self, event: &GatewayEvent) -> ServiceResult<()> {
        match event {
            GatewayEvent::PaymentCaptured {
                gateway_order_id,
                gateway_payment_id,
            } => {
                self.confirm(gateway_order_id, gateway_payment_id).await?;
            }
            GatewayEvent::PaymentFailed { gateway_order_id } => {
                match self.store.find_order_by_gateway_id(gateway_order_id).await? {
                    // A failure on a superseded attempt says nothing about the current one
                    Some(order) if order.gateway_order_id.as_deref() != Some(gateway_order_id) => {
                        tracing::debug!(order_id = %order.id, gateway_order_id = %gateway_order_id, "Failure for a superseded gateway order ignored");
                    }
                    Some(order) => {
                        self.store
                            .mark_payment_failed(&order.id, None, self.now())
                            .await?;
                    }
                    None => {
                        tracing::warn!(gateway_order_id = %gateway_order_id, "Failed payment for unknown gateway order");
                    }
                }
            }
            GatewayEvent::Ignored => {}
        }
        Ok(())
    }

    // ── Scheduled jobs ──

    /// Cancel unpaid orders older than the abandonment window, releasing
    /// their stock. Returns how many were cancelled.
    pub async fn cleanup_abandoned(&self) -> ServiceResult<u64> {
        let now = self.now();
        let cutoff = now - self.settings.abandon_after_minutes * 60_000;
        let candidates = self.store.list_abandoned(cutoff).await?;

        let mut cancelled = 0u64;
        for order_id in &candidates {
            match self.store.cancel_if_abandoned(order_id, cutoff, now).await {
                Ok(true) => {
                    cancelled += 1;
                    tracing::info!(order_id = %order_id, "Abandoned order cancelled");
                }
                Ok(false) => {
                    tracing::debug!(order_id = %order_id, "Order no longer abandoned, skipped");
                }
                Err(e) => {
                    tracing::error!(order_id = %order_id, error = %e, "Abandoned order cleanup failed");
                }
            }
        }

        tracing::info!(candidates = candidates.len(), cancelled, "Abandonment cleanup finished");
        Ok(cancelled)
    }

    /// Restock every product to its daily baseline
    pub async fn daily_reset(&self) -> ServiceResult<u64> {
        let restocked = self.store.reset_stock(self.now()).await?;
        self.wake_outbox();
        tracing::info!(restocked, "Daily stock reset");
        Ok(restocked)
    }

    // ── Operator actions ──

    pub async fn update_status(&self, order_id: &str, next: OrderStatus) -> ServiceResult<Order> {
        let order = self.store.update_status(order_id, next, self.now()).await?;
        self.wake_outbox();
        tracing::info!(order_id, status = %next, "Order status updated");
        Ok(order)
    }

    pub async fn adjust_stock(
        &self,
        product_id: &str,
        change: &StockAdjustment,
    ) -> ServiceResult<Product> {
        let product = self
            .store
            .adjust_stock(product_id, change, self.now())
            .await?;
        tracing::info!(
            product_id,
            stock = product.stock,
            default_stock = product.default_stock,
            "Stock adjusted"
        );
        Ok(product)
    }

    pub async fn get_order(&self, order_id: &str) -> ServiceResult<Order> {
        Ok(self
            .store
            .find_order(order_id)
            .await?
            .ok_or_else(|| AppError::order_not_found(order_id))?)
    }

    pub async fn list_orders(&self, filter: &OrderFilter) -> ServiceResult<Vec<Order>> {
        self.store.list_orders(filter).await
    }
}
