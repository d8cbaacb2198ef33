//! Request authentication and throttling for the storefront API

pub mod admin_auth;
pub mod cron_auth;
pub mod rate_limit;

pub use admin_auth::AdminIdentity;
pub use rate_limit::{MemoryThrottle, PgThrottle, RateLimiter, ThrottleStore};

/// Bearer token from the `Authorization` header
pub(crate) fn bearer_token(headers: &http::HeaderMap) -> Option<&str> {
    headers
        .get(http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}
