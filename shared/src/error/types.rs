//! Error types and API response structures

use super::codes::ErrorCode;
use http::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use thiserror::Error;

/// Application error with structured error code and details
///
/// The storefront shows `message` verbatim for out-of-stock errors and generic
/// retry guidance for everything else, so messages stay customer-readable.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct AppError {
    /// The error code identifying the type of error
    pub code: ErrorCode,
    /// Human-readable error message
    pub message: String,
    /// Optional additional details (field-level errors, context, etc.)
    pub details: Option<HashMap<String, Value>>,
}

impl AppError {
    /// Create a new error with the default message for the error code
    pub fn new(code: ErrorCode) -> Self {
        Self {
            message: code.message().to_string(),
            code,
            details: None,
        }
    }

    /// Create a new error with a custom message
    pub fn with_message(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    /// Add a detail entry to this error
    pub fn with_detail(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.details
            .get_or_insert_with(HashMap::new)
            .insert(key.into(), value.into());
        self
    }

    /// Get the HTTP status code for this error
    pub fn http_status(&self) -> StatusCode {
        self.code.http_status()
    }

    // ==================== Convenience constructors ====================

    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::with_message(ErrorCode::ValidationFailed, msg)
    }

    /// Create a not found error
    pub fn not_found(resource: impl Into<String>) -> Self {
        let r = resource.into();
        Self::with_message(ErrorCode::NotFound, format!("{} not found", r))
            .with_detail("resource", r)
    }

    /// Create a not authenticated error
    pub fn not_authenticated() -> Self {
        Self::new(ErrorCode::NotAuthenticated)
    }

    /// Create an internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::with_message(ErrorCode::InternalError, msg)
    }

    /// Create an invalid token error
    pub fn invalid_token(msg: impl Into<String>) -> Self {
        Self::with_message(ErrorCode::TokenInvalid, msg)
    }

    /// Create a rate-limited error
    pub fn too_many_requests() -> Self {
        Self::new(ErrorCode::TooManyRequests)
    }

    // ==================== Workflow errors ====================

    /// Order lookup failed
    pub fn order_not_found(order_id: impl Into<String>) -> Self {
        Self::new(ErrorCode::OrderNotFound).with_detail("order_id", order_id.into())
    }

    /// Cart line references a product that does not exist or is inactive
    pub fn product_not_found(product_id: impl Into<String>) -> Self {
        let id = product_id.into();
        Self::with_message(ErrorCode::ProductNotFound, format!("Product {id} not found"))
            .with_detail("product_id", id)
    }

    /// Requested quantity exceeds available stock
    pub fn out_of_stock(product_name: &str, requested: i32, available: i32) -> Self {
        let message = if available > 0 {
            format!("Only {available} left of {product_name}, you asked for {requested}")
        } else {
            format!("{product_name} is out of stock")
        };
        Self::with_message(ErrorCode::ProductOutOfStock, message)
            .with_detail("requested", requested)
            .with_detail("available", available)
    }

    /// Payment-init or failure token does not belong to this order
    pub fn token_mismatch() -> Self {
        Self::new(ErrorCode::PaymentTokenMismatch)
    }

    /// Gateway call failed (network, credentials, non-2xx)
    pub fn gateway_unavailable(msg: impl Into<String>) -> Self {
        Self::with_message(ErrorCode::PaymentGatewayUnavailable, msg)
    }

    /// Signature recomputation did not match
    pub fn signature_mismatch() -> Self {
        Self::new(ErrorCode::PaymentSignatureMismatch)
    }

    /// Order is already paid
    pub fn already_paid() -> Self {
        Self::new(ErrorCode::OrderAlreadyPaid)
    }

    /// Order is cancelled
    pub fn order_cancelled() -> Self {
        Self::new(ErrorCode::OrderCancelled)
    }
}

/// Unified API response structure
///
/// - `code`: Error code (0 for success)
/// - `message`: Human-readable message
/// - `data`: Response payload (on success)
/// - `details`: Additional error details (on failure)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    /// Error code (0 for success, non-zero for errors)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<u16>,
    /// Human-readable message
    pub message: String,
    /// Response data (present on success)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    /// Additional error details (present on failure)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<HashMap<String, Value>>,
}

impl<T> ApiResponse<T> {
    /// Create a success response with data
    pub fn success(data: T) -> Self {
        Self {
            code: Some(0),
            message: "OK".to_string(),
            data: Some(data),
            details: None,
        }
    }
}

impl ApiResponse<()> {
    /// Create an error response from an AppError
    pub fn error(err: &AppError) -> Self {
        Self {
            code: Some(err.code.code()),
            message: err.message.clone(),
            data: None,
            details: err.details.clone(),
        }
    }
}

impl<T> From<AppError> for ApiResponse<T> {
    fn from(err: AppError) -> Self {
        Self {
            code: Some(err.code.code()),
            message: err.message,
            data: None,
            details: err.details,
        }
    }
}

/// Type alias for Result with AppError
pub type AppResult<T> = Result<T, AppError>;

// ===== Axum Integration =====

impl axum::response::IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        use axum::Json;

        let status = self.http_status();
        let body = ApiResponse::<()>::error(&self);

        // Log system errors
        if matches!(self.code.category(), super::category::ErrorCategory::System) {
            tracing::error!(
                code = %self.code,
                message = %self.message,
                "System error occurred"
            );
        }

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_app_error_new() {
        let err = AppError::new(ErrorCode::OrderNotFound);
        assert_eq!(err.code, ErrorCode::OrderNotFound);
        assert_eq!(err.message, "Order not found");
        assert!(err.details.is_none());
    }

    #[test]
    fn test_app_error_with_detail() {
        let err = AppError::validation("Missing required fields")
            .with_detail("field", "pincode")
            .with_detail("reason", "required");

        assert_eq!(err.code, ErrorCode::ValidationFailed);
        let details = err.details.unwrap();
        assert_eq!(details.get("field").unwrap(), "pincode");
        assert_eq!(details.get("reason").unwrap(), "required");
    }

    #[test]
    fn test_out_of_stock_message() {
        let err = AppError::out_of_stock("Tiger Prawns", 3, 1);
        assert_eq!(err.code, ErrorCode::ProductOutOfStock);
        assert_eq!(err.message, "Only 1 left of Tiger Prawns, you asked for 3");
        assert_eq!(err.http_status(), StatusCode::CONFLICT);

        let err = AppError::out_of_stock("Seer Fish", 1, 0);
        assert_eq!(err.message, "Seer Fish is out of stock");
    }

    #[test]
    fn test_workflow_constructors() {
        assert_eq!(
            AppError::token_mismatch().http_status(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            AppError::gateway_unavailable("timeout").http_status(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            AppError::signature_mismatch().http_status(),
            StatusCode::BAD_REQUEST
        );
        let err = AppError::product_not_found("p-404");
        assert_eq!(err.message, "Product p-404 not found");
        assert_eq!(err.http_status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_api_response_error() {
        let err = AppError::order_not_found("abc");
        let response = ApiResponse::<()>::error(&err);

        assert_eq!(response.code, Some(4001));
        assert_eq!(response.message, "Order not found");
        assert!(response.data.is_none());
        assert!(response.details.is_some());
    }

    #[test]
    fn test_api_response_serialize() {
        let err = AppError::new(ErrorCode::PaymentSignatureMismatch);
        let json = serde_json::to_string(&ApiResponse::<()>::error(&err)).unwrap();
        assert!(json.contains("\"code\":5007"));
        assert!(!json.contains("\"data\""));
    }
}
