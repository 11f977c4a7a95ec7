//! API error types with HTTP response mapping.

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use checkout::{CheckoutError, WebhookError};
use serde::Serialize;

/// Body of every error response: `{error, details?}`.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

/// API-level error type that maps to HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    /// Malformed or invalid request from the client.
    BadRequest(String),
    /// A required collaborator is not configured.
    ServiceUnavailable(String),
    /// Processing failed; the caller may retry.
    Internal { error: String, details: Option<String> },
}

impl ApiError {
    fn internal(error: &str, details: impl ToString) -> Self {
        ApiError::Internal {
            error: error.to_string(),
            details: Some(details.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ApiError::BadRequest(error) => (
                StatusCode::BAD_REQUEST,
                ErrorBody {
                    error,
                    details: None,
                },
            ),
            ApiError::ServiceUnavailable(error) => (
                StatusCode::SERVICE_UNAVAILABLE,
                ErrorBody {
                    error,
                    details: None,
                },
            ),
            ApiError::Internal { error, details } => {
                tracing::error!(%error, details = ?details, "request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, ErrorBody { error, details })
            }
        };

        (status, Json(body)).into_response()
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<CheckoutError> for ApiError {
    fn from(err: CheckoutError) -> Self {
        match err {
            CheckoutError::NotConfigured => {
                ApiError::ServiceUnavailable("Payment service is not configured.".to_string())
            }
            CheckoutError::Validation(message) => ApiError::BadRequest(message),
            CheckoutError::Upstream(e) => {
                ApiError::internal("Failed to create payment preference.", e)
            }
        }
    }
}

impl From<WebhookError> for ApiError {
    fn from(err: WebhookError) -> Self {
        match err {
            WebhookError::NotConfigured => {
                ApiError::ServiceUnavailable("Payment service is not configured.".to_string())
            }
            WebhookError::MissingPaymentId | WebhookError::InvalidPaymentId(_) => {
                ApiError::BadRequest(err.to_string())
            }
            WebhookError::Provider(_) | WebhookError::Fulfillment(_) => {
                ApiError::internal("Webhook processing failed.", err)
            }
        }
    }
}
