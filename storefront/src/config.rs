//! Storefront server configuration

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Where rate-limit counters live
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThrottleBackend {
    /// Per-process map, fine for a single instance
    Memory,
    /// Shared table, required when running several instances
    Postgres,
}

/// Storefront server configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// PostgreSQL connection URL (unset = in-memory store, development only)
    pub database_url: Option<String>,
    /// HTTP port
    pub http_port: u16,
    /// Environment: development | staging | production
    pub environment: String,
    /// Log level filter used when RUST_LOG is unset
    pub log_level: String,
    /// Emit JSON log lines
    pub log_json: bool,
    /// Directory for daily-rolling log files (stdout when unset)
    pub log_dir: Option<String>,
    /// Razorpay key id (public, returned to the checkout widget)
    pub razorpay_key_id: String,
    /// Razorpay key secret (API auth + payment signature key)
    pub razorpay_key_secret: String,
    /// Razorpay webhook signing secret
    pub razorpay_webhook_secret: String,
    /// ISO currency code for gateway intents
    pub currency: String,
    /// Bearer token for /cron endpoints
    pub cron_secret: String,
    /// HS256 secret for admin JWTs
    pub admin_jwt_secret: String,
    /// SES sender email address
    pub ses_from_email: String,
    /// Admin alert email (alerts by email disabled when unset)
    pub admin_email: Option<String>,
    /// Admin alert WhatsApp number (alerts by WhatsApp disabled when unset)
    pub admin_phone: Option<String>,
    /// WhatsApp Cloud API access token (channel disabled when unset)
    pub whatsapp_token: Option<String>,
    /// WhatsApp Cloud API sender phone number id
    pub whatsapp_phone_number_id: Option<String>,
    /// S3 bucket for invoices
    pub invoice_bucket: String,
    /// Public base URL for invoice objects
    pub invoice_base_url: String,
    /// Flat delivery fee in paisa
    pub delivery_fee: i64,
    /// Subtotal (paisa) at or above which delivery is free
    pub free_delivery_threshold: i64,
    /// Minutes after which an unpaid PENDING order is abandoned
    pub abandon_after_minutes: i64,
    /// Rate-limit counter store
    pub throttle_backend: ThrottleBackend,
}

impl Config {
    /// Require a secret env var: must be set and non-empty in non-development environments.
    fn require_secret(name: &str, environment: &str) -> Result<String, BoxError> {
        let val = match std::env::var(name) {
            Ok(v) => v,
            Err(_) => {
                if environment != "development" {
                    return Err(format!("{name} must be set in {environment} environment").into());
                }
                format!("dev-{name}-not-for-production")
            }
        };
        if val.is_empty() && environment != "development" {
            return Err(format!("{name} must not be empty in {environment} environment").into());
        }
        Ok(val)
    }

    fn optional(name: &str) -> Option<String> {
        std::env::var(name).ok().filter(|s| !s.is_empty())
    }

    fn parsed<T: std::str::FromStr>(name: &str, default: T) -> T {
        std::env::var(name)
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(default)
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, BoxError> {
        let environment = std::env::var("ENVIRONMENT").unwrap_or_else(|_| "development".into());

        let database_url = Self::optional("DATABASE_URL");
        if database_url.is_none() && environment != "development" {
            return Err(format!("DATABASE_URL must be set in {environment} environment").into());
        }

        let throttle_backend = match std::env::var("RATE_LIMIT_BACKEND").as_deref() {
            Ok("postgres") => ThrottleBackend::Postgres,
            Ok("memory") | Err(_) => ThrottleBackend::Memory,
            Ok(other) => return Err(format!("Unknown RATE_LIMIT_BACKEND: {other}").into()),
        };
        if throttle_backend == ThrottleBackend::Postgres && database_url.is_none() {
            return Err("RATE_LIMIT_BACKEND=postgres requires DATABASE_URL".into());
        }

        Ok(Self {
            database_url,
            http_port: Self::parsed("HTTP_PORT", 8080),
            environment: environment.clone(),
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".into()),
            log_json: Self::parsed("LOG_JSON", false),
            log_dir: Self::optional("LOG_DIR"),
            razorpay_key_id: std::env::var("RAZORPAY_KEY_ID")
                .unwrap_or_else(|_| "rzp_test_dev".into()),
            razorpay_key_secret: Self::require_secret("RAZORPAY_KEY_SECRET", &environment)?,
            razorpay_webhook_secret: Self::require_secret(
                "RAZORPAY_WEBHOOK_SECRET",
                &environment,
            )?,
            currency: std::env::var("PAYMENT_CURRENCY").unwrap_or_else(|_| "INR".into()),
            cron_secret: Self::require_secret("CRON_SECRET", &environment)?,
            admin_jwt_secret: Self::require_secret("ADMIN_JWT_SECRET", &environment)?,
            ses_from_email: std::env::var("SES_FROM_EMAIL")
                .unwrap_or_else(|_| "orders@freshcatch.in".into()),
            admin_email: Self::optional("ADMIN_EMAIL"),
            admin_phone: Self::optional("ADMIN_PHONE"),
            whatsapp_token: Self::optional("WHATSAPP_TOKEN"),
            whatsapp_phone_number_id: Self::optional("WHATSAPP_PHONE_NUMBER_ID"),
            invoice_bucket: std::env::var("INVOICE_S3_BUCKET")
                .unwrap_or_else(|_| "freshcatch-invoices".into()),
            invoice_base_url: std::env::var("INVOICE_BASE_URL")
                .unwrap_or_else(|_| "https://invoices.freshcatch.in".into()),
            delivery_fee: Self::parsed("DELIVERY_FEE_PAISA", 4_900),
            free_delivery_threshold: Self::parsed("FREE_DELIVERY_THRESHOLD_PAISA", 99_900),
            abandon_after_minutes: Self::parsed("ABANDON_AFTER_MINUTES", 30),
            throttle_backend,
        })
    }

    pub fn is_development(&self) -> bool {
        self.environment == "development"
    }
}
