//! Admin JWT authentication for the operator API

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use shared::error::{AppError, ErrorCode};

use crate::state::AppState;

pub const ADMIN_ROLE: &str = "admin";

/// JWT claims for operator tokens
#[derive(Debug, Serialize, Deserialize)]
pub struct AdminClaims {
    /// Operator id
    pub sub: String,
    /// Must be `admin`
    pub role: String,
    /// Expiration (Unix timestamp seconds)
    pub exp: usize,
    /// Issued at (Unix timestamp seconds)
    pub iat: usize,
}

/// Authenticated operator extracted from the JWT
#[derive(Debug, Clone)]
pub struct AdminIdentity {
    pub admin_id: String,
}

const JWT_EXPIRY_HOURS: i64 = 12;

/// Issue an admin token (operator tooling and tests)
pub fn create_token(admin_id: &str, secret: &str) -> Result<String, jsonwebtoken::errors::Error> {
    let now = chrono::Utc::now();
    let claims = AdminClaims {
        sub: admin_id.to_string(),
        role: ADMIN_ROLE.to_string(),
        exp: (now + chrono::Duration::hours(JWT_EXPIRY_HOURS)).timestamp() as usize,
        iat: now.timestamp() as usize,
    };

    jsonwebtoken::encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
}

/// Verify an admin token and return the operator identity
pub fn verify_token(token: &str, secret: &str) -> Result<AdminIdentity, AppError> {
    let validation = Validation::new(Algorithm::HS256);
    let token_data = jsonwebtoken::decode::<AdminClaims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &validation,
    )
    .map_err(|e| {
        tracing::debug!("Admin JWT validation failed: {e}");
        AppError::invalid_token("Invalid or expired token")
    })?;

    if token_data.claims.role != ADMIN_ROLE {
        return Err(AppError::new(ErrorCode::AdminRequired));
    }
    Ok(AdminIdentity {
        admin_id: token_data.claims.sub,
    })
}

/// Middleware that requires a valid admin JWT in the Authorization header
pub async fn admin_auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, Response> {
    let token = super::bearer_token(request.headers())
        .ok_or_else(|| AppError::not_authenticated().into_response())?;

    let identity =
        verify_token(token, &state.admin_jwt_secret).map_err(IntoResponse::into_response)?;
    tracing::debug!(admin_id = %identity.admin_id, path = %request.uri().path(), "Admin request");

    request.extensions_mut().insert(identity);
    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_roundtrip() {
        let token = create_token("ops-1", "secret").unwrap();
        let identity = verify_token(&token, "secret").unwrap();
        assert_eq!(identity.admin_id, "ops-1");
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let token = create_token("ops-1", "secret").unwrap();
        let err = verify_token(&token, "other").unwrap_err();
        assert_eq!(err.code, ErrorCode::TokenInvalid);
    }

    #[test]
    fn test_non_admin_role_rejected() {
        let now = chrono::Utc::now().timestamp() as usize;
        let claims = AdminClaims {
            sub: "u1".into(),
            role: "customer".into(),
            exp: now + 3600,
            iat: now,
        };
        let token = jsonwebtoken::encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(b"secret"),
        )
        .unwrap();
        let err = verify_token(&token, "secret").unwrap_err();
        assert_eq!(err.code, ErrorCode::AdminRequired);
    }
}
