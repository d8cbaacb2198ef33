//! Application state for the storefront server

use std::sync::Arc;

use aws_sdk_s3::Client as S3Client;
use aws_sdk_sesv2::Client as SesClient;
use sqlx::PgPool;
use tokio::sync::Notify;

use crate::auth::{MemoryThrottle, PgThrottle, RateLimiter, ThrottleStore};
use crate::config::{Config, ThrottleBackend};
use crate::error::BoxError;
use crate::invoice::S3InvoiceStorage;
use crate::notify::email::EmailChannel;
use crate::notify::whatsapp::WhatsAppChannel;
use crate::notify::worker::OutboxWorker;
use crate::notify::{Dispatcher, NotificationChannel, Recipient};
use crate::orders::pricing::PricingRules;
use crate::orders::{OrderWorkflow, WorkflowSettings};
use crate::payment::RazorpayGateway;
use crate::store::{MemoryStore, OrderStore, PgStore};

/// Secrets checked by request middleware and handlers
#[derive(Debug, Clone)]
pub struct ApiSecrets {
    /// Razorpay webhook signing secret
    pub webhook_secret: String,
    /// Bearer token for /cron endpoints
    pub cron_secret: String,
    /// HS256 secret for admin JWTs
    pub admin_jwt_secret: String,
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Order, payment and inventory workflow
    pub workflow: Arc<OrderWorkflow>,
    /// Channels for the outbox worker
    pub dispatcher: Arc<Dispatcher>,
    /// Wakes the outbox worker after commits that queued notifications
    pub outbox_signal: Arc<Notify>,
    /// Rate limiter for checkout and payment routes
    pub rate_limiter: RateLimiter,
    /// Razorpay webhook signing secret
    pub webhook_secret: String,
    /// Bearer token for /cron endpoints
    pub cron_secret: String,
    /// HS256 secret for admin JWTs
    pub admin_jwt_secret: String,
}

impl AppState {
    /// Create a new AppState
    pub async fn new(config: &Config) -> Result<Self, BoxError> {
        let pool = match &config.database_url {
            Some(url) => {
                let pool = PgPool::connect(url).await?;
                sqlx::migrate!("./migrations").run(&pool).await?;
                tracing::info!("Database ready");
                Some(pool)
            }
            None => {
                tracing::warn!("DATABASE_URL not set, using the in-memory store");
                None
            }
        };

        let store: Arc<dyn OrderStore> = match &pool {
            Some(pool) => Arc::new(PgStore::new(pool.clone())),
            None => Arc::new(MemoryStore::new()),
        };

        let throttle: Arc<dyn ThrottleStore> = match (config.throttle_backend, &pool) {
            (ThrottleBackend::Postgres, Some(pool)) => Arc::new(PgThrottle::new(pool.clone())),
            _ => Arc::new(MemoryThrottle::new()),
        };

        let aws_config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
        let s3 = S3Client::new(&aws_config);

        let ses = if let Ok(ses_region) = std::env::var("SES_REGION") {
            let ses_config = aws_config
                .to_builder()
                .region(aws_config::Region::new(ses_region))
                .build();
            SesClient::new(&ses_config)
        } else {
            SesClient::new(&aws_config)
        };

        let mut channels: Vec<Arc<dyn NotificationChannel>> =
            vec![Arc::new(EmailChannel::new(ses, &config.ses_from_email))];
        match (&config.whatsapp_token, &config.whatsapp_phone_number_id) {
            (Some(token), Some(phone_number_id)) => {
                channels.push(Arc::new(WhatsAppChannel::new(token, phone_number_id)));
            }
            _ => tracing::info!("WhatsApp channel disabled"),
        }
        let dispatcher = Dispatcher::new(
            channels,
            Recipient {
                email: config.admin_email.clone(),
                phone: config.admin_phone.clone(),
            },
        );

        let outbox_signal = Arc::new(Notify::new());
        let workflow = OrderWorkflow::new(
            store,
            Arc::new(RazorpayGateway::new(
                &config.razorpay_key_id,
                &config.razorpay_key_secret,
            )),
            Arc::new(S3InvoiceStorage::new(
                s3,
                &config.invoice_bucket,
                &config.invoice_base_url,
            )),
            outbox_signal.clone(),
            WorkflowSettings {
                pricing: PricingRules {
                    delivery_fee: config.delivery_fee,
                    free_delivery_threshold: config.free_delivery_threshold,
                },
                currency: config.currency.clone(),
                payment_secret: config.razorpay_key_secret.clone(),
                abandon_after_minutes: config.abandon_after_minutes,
            },
        );

        Ok(Self::from_parts(
            Arc::new(workflow),
            Arc::new(dispatcher),
            outbox_signal,
            RateLimiter::new(throttle),
            ApiSecrets {
                webhook_secret: config.razorpay_webhook_secret.clone(),
                cron_secret: config.cron_secret.clone(),
                admin_jwt_secret: config.admin_jwt_secret.clone(),
            },
        ))
    }

    /// Assemble state from prebuilt collaborators. `outbox_signal` must be
    /// the one the workflow was built with.
    pub fn from_parts(
        workflow: Arc<OrderWorkflow>,
        dispatcher: Arc<Dispatcher>,
        outbox_signal: Arc<Notify>,
        rate_limiter: RateLimiter,
        secrets: ApiSecrets,
    ) -> Self {
        Self {
            workflow,
            dispatcher,
            outbox_signal,
            rate_limiter,
            webhook_secret: secrets.webhook_secret,
            cron_secret: secrets.cron_secret,
            admin_jwt_secret: secrets.admin_jwt_secret,
        }
    }

    /// Background worker that drains the notification outbox
    pub fn outbox_worker(&self) -> OutboxWorker {
        OutboxWorker::new(
            self.workflow.store().clone(),
            self.dispatcher.clone(),
            self.outbox_signal.clone(),
        )
    }
}
