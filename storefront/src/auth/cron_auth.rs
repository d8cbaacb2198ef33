//! Scheduler authentication for `/cron` routes

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use shared::error::AppError;

use crate::state::AppState;

/// Whether `headers` carry `Authorization: Bearer <secret>`
pub fn is_authorized(headers: &http::HeaderMap, secret: &str) -> bool {
    if secret.is_empty() {
        return false;
    }
    super::bearer_token(headers).is_some_and(|token| crate::util::secure_eq(secret, token))
}

/// Middleware that requires the cron bearer secret
pub async fn cron_auth_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, Response> {
    if !is_authorized(request.headers(), &state.cron_secret) {
        tracing::warn!(path = %request.uri().path(), "Rejected cron request");
        return Err(AppError::not_authenticated().into_response());
    }
    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::{HeaderMap, HeaderValue, header::AUTHORIZATION};

    fn headers(value: &'static str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static(value));
        headers
    }

    #[test]
    fn test_bearer_secret() {
        assert!(is_authorized(&headers("Bearer s3cret"), "s3cret"));
        assert!(!is_authorized(&headers("Bearer s3cre"), "s3cret"));
        assert!(!is_authorized(&headers("s3cret"), "s3cret"));
        assert!(!is_authorized(&HeaderMap::new(), "s3cret"));
        assert!(!is_authorized(&headers("Bearer "), ""));
    }
}
