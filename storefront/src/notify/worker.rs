//! Outbox worker
//!
//! Drains queued notifications. Wakes on the commit signal and on a polling
//! interval, leases due events, sends them and records the outcome. Exits when
//! the shutdown token is cancelled.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use super::templates;
use super::{DeliveryReport, Dispatcher, Notification};
use crate::error::BoxError;
use crate::store::{OrderStore, OutboxEvent};

/// Result of one drain pass
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DrainResult {
    pub claimed: usize,
    pub completed: usize,
    pub retried: usize,
}

pub struct OutboxWorker {
    store: Arc<dyn OrderStore>,
    dispatcher: Arc<Dispatcher>,
    signal: Arc<Notify>,
    poll_interval: Duration,
    batch_size: i64,
}

impl OutboxWorker {
    pub fn new(store: Arc<dyn OrderStore>, dispatcher: Arc<Dispatcher>, signal: Arc<Notify>) -> Self {
        Self {
            store,
            dispatcher,
            signal,
            poll_interval: Duration::from_secs(15),
            batch_size: 20,
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Run until `shutdown` is cancelled
    pub async fn run(self, shutdown: CancellationToken) {
        tracing::info!("Outbox worker started");
        loop {
            // Keep draining while full batches come back
            loop {
                let result = self.drain_once().await;
                if result.claimed < self.batch_size as usize {
                    break;
                }
            }

            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = self.signal.notified() => {}
                _ = tokio::time::sleep(self.poll_interval) => {}
            }
        }
        tracing::info!("Outbox worker stopped");
    }

    /// Claim and process one batch
    pub async fn drain_once(&self) -> DrainResult {
        let now = shared::util::now_millis();
        let events = match self.store.claim_outbox(self.batch_size, now).await {
            Ok(events) => events,
            Err(e) => {
                tracing::error!(error = %e, "Outbox claim failed");
                return DrainResult::default();
            }
        };

        let mut result = DrainResult {
            claimed: events.len(),
            ..Default::default()
        };
        for event in events {
            match self.process(&event).await {
                Ok(()) => {
                    if let Err(e) = self.store.complete_outbox(event.id).await {
                        tracing::error!(event_id = event.id, error = %e, "Outbox complete failed");
                    }
                    result.completed += 1;
                }
                Err(e) => {
                    tracing::warn!(
                        event_id = event.id,
                        kind = event.notification.kind(),
                        attempts = event.attempts + 1,
                        error = %e,
                        "Outbox event failed"
                    );
                    if let Err(e) = self
                        .store
                        .retry_outbox(event.id, &e.to_string(), shared::util::now_millis())
                        .await
                    {
                        tracing::error!(event_id = event.id, error = %e, "Outbox retry failed");
                    }
                    result.retried += 1;
                }
            }
        }
        result
    }

    async fn process(&self, event: &OutboxEvent) -> Result<(), BoxError> {
        let report = match &event.notification {
            Notification::StockReset { restocked } => {
                self.dispatcher
                    .deliver_to_admin(&templates::stock_reset_summary(*restocked))
                    .await
            }
            notification => {
                let order_id = notification.order_id().unwrap_or_default();
                let order = self
                    .store
                    .find_order(order_id)
                    .await
                    .map_err(|e| e.to_string())?
                    .ok_or_else(|| format!("order {order_id} not found"))?;
                let customer = templates::customer_recipient(&order);

                match notification {
                    Notification::OrderPlaced { .. } => {
                        self.dispatcher
                            .deliver_pair(
                                &customer,
                                &templates::order_placed(&order),
                                &templates::new_order_alert(&order),
                            )
                            .await
                    }
                    Notification::PaymentConfirmed { .. } => {
                        self.dispatcher
                            .deliver_pair(
                                &customer,
                                &templates::payment_confirmed(&order),
                                &templates::payment_received_alert(&order),
                            )
                            .await
                    }
                    Notification::StatusChanged { status, .. } => {
                        self.dispatcher
                            .deliver(&customer, &templates::status_changed(&order, *status))
                            .await
                    }
                    Notification::PaymentAfterCancel {
                        gateway_payment_id, ..
                    } => {
                        self.dispatcher
                            .deliver_to_admin(&templates::payment_after_cancel_alert(
                                &order,
                                gateway_payment_id,
                            ))
                            .await
                    }
                    Notification::DuplicatePayment {
                        gateway_payment_id, ..
                    } => {
                        self.dispatcher
                            .deliver_to_admin(&templates::duplicate_payment_alert(
                                &order,
                                gateway_payment_id,
                            ))
                            .await
                    }
                    Notification::StockReset { .. } => DeliveryReport::default(),
                }
            }
        };

        if report.all_failed() {
            return Err(format!("all {} deliveries failed", report.attempted).into());
        }
        tracing::debug!(
            event_id = event.id,
            kind = event.notification.kind(),
            attempted = report.attempted,
            failed = report.failed,
            "Outbox event delivered"
        );
        Ok(())
    }
}
