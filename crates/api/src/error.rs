//! Unified error handling with Sentry integration.
//!
//! Every handler returns `Result<T, AppError>`. Service errors convert into
//! `AppError`, which decides the status code, captures server errors to
//! Sentry and renders a `{"message": ...}` body.

use axum::{
    Json,
    extract::rejection::{JsonRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

use crate::db::RepositoryError;
use crate::services::{
    auth::AuthError, checkout::CheckoutError, order_query::QueryError, orders::OrderError,
    webhook::WebhookError,
};

/// Application-level error type.
#[derive(Debug, Error)]
pub enum AppError {
    /// Malformed or missing request data.
    #[error("{0}")]
    InvalidInput(String),

    /// Webhook authenticity could not be established.
    #[error("Webhook Error: {0}")]
    InvalidSignature(String),

    /// Referenced entity does not exist.
    #[error("{0}")]
    NotFound(String),

    /// Caller is not authenticated.
    #[error("{0}")]
    Unauthorized(String),

    /// Caller lacks the required capability.
    #[error("{0}")]
    Forbidden(String),

    /// A downstream service failed.
    #[error("{0}")]
    Upstream(String),

    /// Database operation failed.
    #[error("Database error: {0}")]
    Database(#[from] RepositoryError),
}

impl AppError {
    /// HTTP status for this error.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::InvalidInput(_) | Self::InvalidSignature(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::Upstream(_) | Self::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();

        if status.is_server_error() {
            let event_id = sentry::capture_error(&self);
            tracing::error!(
                error = %self,
                sentry_event_id = %event_id,
                "Request error"
            );
        } else {
            tracing::debug!(error = %self, status = status.as_u16(), "Request rejected");
        }

        (status, Json(json!({ "message": self.to_string() }))).into_response()
    }
}

impl From<OrderError> for AppError {
    fn from(err: OrderError) -> Self {
        match err {
            OrderError::InvalidInput(msg) => Self::InvalidInput(msg),
            OrderError::ProductNotFound(_) | OrderError::NotFound => Self::NotFound(err.to_string()),
            OrderError::ProductLookup(_) => Self::Upstream(err.to_string()),
            OrderError::Repository(e) => Self::Database(e),
        }
    }
}

impl From<QueryError> for AppError {
    fn from(err: QueryError) -> Self {
        match err {
            QueryError::InvalidInput(msg) => Self::InvalidInput(msg),
            QueryError::Repository(e) => Self::Database(e),
        }
    }
}

impl From<CheckoutError> for AppError {
    fn from(err: CheckoutError) -> Self {
        match err {
            CheckoutError::InvalidInput(msg) => Self::InvalidInput(msg),
            CheckoutError::NotFound => Self::NotFound(err.to_string()),
            CheckoutError::Provider(_) | CheckoutError::Amount(_) => {
                tracing::error!(error = %err, "Checkout session creation failed");
                Self::Upstream("Could not create checkout session".to_string())
            }
            CheckoutError::Repository(e) => Self::Database(e),
        }
    }
}

impl From<WebhookError> for AppError {
    fn from(err: WebhookError) -> Self {
        match err {
            WebhookError::InvalidSignature(e) => Self::InvalidSignature(e.to_string()),
            WebhookError::MalformedEvent(_) => Self::InvalidSignature(err.to_string()),
            WebhookError::Repository(e) => Self::Database(e),
        }
    }
}

impl From<AuthError> for AppError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::NotAdmin => Self::Forbidden(err.to_string()),
            AuthError::MissingToken | AuthError::InvalidToken(_) => {
                Self::Unauthorized(err.to_string())
            }
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        Self::InvalidInput(rejection.body_text())
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        Self::InvalidInput(rejection.body_text())
    }
}

/// Result type alias for `AppError`.
pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use axum::body::to_bytes;
    use pickup_core::ProductId;

    use super::*;

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(AppError::InvalidInput("x".into()).status(), StatusCode::BAD_REQUEST);
        assert_eq!(AppError::InvalidSignature("x".into()).status(), StatusCode::BAD_REQUEST);
        assert_eq!(AppError::NotFound("x".into()).status(), StatusCode::NOT_FOUND);
        assert_eq!(AppError::Unauthorized("x".into()).status(), StatusCode::UNAUTHORIZED);
        assert_eq!(AppError::Forbidden("x".into()).status(), StatusCode::FORBIDDEN);
        assert_eq!(
            AppError::Upstream("x".into()).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            AppError::Database(RepositoryError::DataCorruption("x".into())).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[tokio::test]
    async fn test_product_not_found_message() {
        let id = ProductId::generate();
        let response = AppError::from(OrderError::ProductNotFound(id)).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(
            body_json(response).await["message"],
            format!("Product not found: {id}")
        );
    }

    #[tokio::test]
    async fn test_invalid_signature_message() {
        let response = AppError::InvalidSignature("no matching signature".into()).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            body_json(response).await["message"],
            "Webhook Error: no matching signature"
        );
    }

    #[test]
    fn test_order_not_found_maps_to_404() {
        let err = AppError::from(OrderError::NotFound);
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
        assert_eq!(err.to_string(), "Order not found");
    }
}
