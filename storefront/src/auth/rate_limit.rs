//! Application-layer rate limiting for public checkout and payment routes
//!
//! Counters live behind a [`ThrottleStore`]: a per-process map for a single
//! instance, or the `rate_limits` table when several instances share traffic.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use shared::error::AppError;
use sqlx::PgPool;
use tokio::sync::Mutex;

use crate::error::BoxError;
use crate::state::AppState;

/// Fixed-window limit for one route group
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateRule {
    pub bucket: &'static str,
    pub max_requests: u32,
    pub window_ms: i64,
}

/// Order creation: 10 requests/minute per IP
pub const CHECKOUT: RateRule = RateRule {
    bucket: "checkout",
    max_requests: 10,
    window_ms: 60_000,
};

/// Payment initiation / verification / failure reports: 30 requests/minute per IP
pub const PAYMENT: RateRule = RateRule {
    bucket: "payment",
    max_requests: 30,
    window_ms: 60_000,
};

/// Windows older than this are dropped by [`RateLimiter::cleanup`]
const STALE_AFTER_MS: i64 = 300_000;

/// Rate-limit counter storage
#[async_trait]
pub trait ThrottleStore: Send + Sync {
    /// Count one hit for `key` and return the count in the current window
    async fn hit(
        &self,
        bucket: &'static str,
        key: &str,
        window_ms: i64,
        now: i64,
    ) -> Result<u32, BoxError>;

    /// Remove windows that started before `cutoff`
    async fn cleanup(&self, cutoff: i64) -> Result<u64, BoxError>;
}

struct Window {
    count: u32,
    started_at: i64,
}

/// Per-process counters
#[derive(Default)]
pub struct MemoryThrottle {
    /// bucket -> (key -> window)
    inner: Mutex<HashMap<&'static str, HashMap<String, Window>>>,
}

impl MemoryThrottle {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ThrottleStore for MemoryThrottle {
    async fn hit(
        &self,
        bucket: &'static str,
        key: &str,
        window_ms: i64,
        now: i64,
    ) -> Result<u32, BoxError> {
        let mut map = self.inner.lock().await;
        let window = map
            .entry(bucket)
            .or_default()
            .entry(key.to_owned())
            .or_insert(Window {
                count: 0,
                started_at: now,
            });

        // Reset window if expired
        if now - window.started_at >= window_ms {
            window.count = 0;
            window.started_at = now;
        }
        window.count += 1;
        Ok(window.count)
    }

    async fn cleanup(&self, cutoff: i64) -> Result<u64, BoxError> {
        let mut map = self.inner.lock().await;
        let mut removed = 0u64;
        for windows in map.values_mut() {
            let before = windows.len();
            windows.retain(|_, w| w.started_at >= cutoff);
            removed += (before - windows.len()) as u64;
        }
        map.retain(|_, windows| !windows.is_empty());
        Ok(removed)
    }
}

/// Counters in the shared `rate_limits` table
pub struct PgThrottle {
    pool: PgPool,
}

impl PgThrottle {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ThrottleStore for PgThrottle {
    async fn hit(
        &self,
        bucket: &'static str,
        key: &str,
        window_ms: i64,
        now: i64,
    ) -> Result<u32, BoxError> {
        let mut conn = self.pool.acquire().await?;
        let count = crate::db::throttle::hit(&mut *conn, bucket, key, window_ms, now).await?;
        Ok(count.max(0) as u32)
    }

    async fn cleanup(&self, cutoff: i64) -> Result<u64, BoxError> {
        let mut conn = self.pool.acquire().await?;
        Ok(crate::db::throttle::cleanup(&mut *conn, cutoff).await?)
    }
}

#[derive(Clone)]
pub struct RateLimiter {
    store: Arc<dyn ThrottleStore>,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn ThrottleStore>) -> Self {
        Self { store }
    }

    /// Returns `true` if the request is allowed. Counter errors let the
    /// request through.
    pub async fn check(&self, rule: RateRule, key: &str) -> bool {
        let now = shared::util::now_millis();
        match self.store.hit(rule.bucket, key, rule.window_ms, now).await {
            Ok(count) => count <= rule.max_requests,
            Err(e) => {
                tracing::warn!(bucket = rule.bucket, error = %e, "Rate limit check failed");
                true
            }
        }
    }

    /// Drop windows older than 5 minutes
    pub async fn cleanup(&self) {
        let cutoff = shared::util::now_millis() - STALE_AFTER_MS;
        match self.store.cleanup(cutoff).await {
            Ok(removed) if removed > 0 => {
                tracing::debug!(removed, "Rate limit windows pruned");
            }
            Ok(_) => {}
            Err(e) => tracing::warn!(error = %e, "Rate limit cleanup failed"),
        }
    }
}

/// Extract client IP: X-Forwarded-For header first (load balancer), then peer address.
fn extract_ip(request: &Request) -> String {
    if let Some(forwarded) = request.headers().get("x-forwarded-for")
        && let Ok(val) = forwarded.to_str()
    {
        // X-Forwarded-For can be comma-separated; first entry is the original client
        if let Some(first) = val.split(',').next() {
            let ip = first.trim();
            if !ip.is_empty() {
                return ip.to_owned();
            }
        }
    }

    // Fallback: peer address from extensions (ConnectInfo)
    request
        .extensions()
        .get::<axum::extract::ConnectInfo<std::net::SocketAddr>>()
        .map(|ci| ci.0.ip().to_string())
        .unwrap_or_else(|| "unknown".to_owned())
}

async fn enforce(
    state: &AppState,
    rule: RateRule,
    request: Request,
    next: Next,
) -> Result<Response, Response> {
    let ip = extract_ip(&request);
    if !state.rate_limiter.check(rule, &ip).await {
        tracing::warn!(bucket = rule.bucket, ip = %ip, "Rate limited");
        return Err(AppError::too_many_requests().into_response());
    }
    Ok(next.run(request).await)
}

pub async fn checkout_rate_limit(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, Response> {
    enforce(&state, CHECKOUT, request, next).await
}

pub async fn payment_rate_limit(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, Response> {
    enforce(&state, PAYMENT, request, next).await
}

#[cfg(test)]
mod tests {
    use super::*;

    const RULE: RateRule = RateRule {
        bucket: "test",
        max_requests: 2,
        window_ms: 60_000,
    };

    #[tokio::test]
    async fn test_window_limits_and_resets() {
        let store = MemoryThrottle::new();
        assert_eq!(store.hit("b", "1.2.3.4", 1_000, 0).await.unwrap(), 1);
        assert_eq!(store.hit("b", "1.2.3.4", 1_000, 500).await.unwrap(), 2);
        assert_eq!(store.hit("b", "5.6.7.8", 1_000, 500).await.unwrap(), 1);
        // Window elapsed
        assert_eq!(store.hit("b", "1.2.3.4", 1_000, 1_000).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_cleanup_drops_stale_windows() {
        let store = MemoryThrottle::new();
        store.hit("b", "old", 1_000, 0).await.unwrap();
        store.hit("b", "new", 1_000, 10_000).await.unwrap();
        assert_eq!(store.cleanup(5_000).await.unwrap(), 1);
        assert_eq!(store.hit("b", "new", 60_000, 10_001).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_limiter_blocks_after_max() {
        let limiter = RateLimiter::new(Arc::new(MemoryThrottle::new()));
        assert!(limiter.check(RULE, "ip").await);
        assert!(limiter.check(RULE, "ip").await);
        assert!(!limiter.check(RULE, "ip").await);
        assert!(limiter.check(RULE, "other").await);
    }
}
