//! Checkout error types.

use store::{PaymentId, ProductId, StoreError};
use thiserror::Error;

use crate::provider::ProviderError;

/// Errors returned when creating a checkout session.
#[derive(Debug, Error)]
pub enum CheckoutError {
    /// No provider credential is configured. Raised before any network I/O.
    #[error("Payment service is not configured")]
    NotConfigured,

    /// The submitted cart is empty or malformed. Raised before any network I/O.
    #[error("Invalid checkout request: {0}")]
    Validation(String),

    /// The provider rejected or failed the preference creation.
    #[error("Failed to create payment preference: {0}")]
    Upstream(#[from] ProviderError),
}

/// Errors that abort a fulfillment. Nothing has been written when one of
/// these is returned.
#[derive(Debug, Error)]
pub enum FulfillmentError {
    /// A referenced product no longer exists.
    #[error("Product with ID {0} not found")]
    ProductNotFound(ProductId),

    /// A product cannot cover the requested quantity.
    #[error(
        "Insufficient stock for product {name} (ID: {product_id}): requested {requested}, available {available}"
    )]
    InsufficientStock {
        product_id: ProductId,
        name: String,
        requested: u64,
        available: u32,
    },

    /// Concurrent writers kept invalidating the commit.
    #[error("Gave up on payment {payment_id} after {attempts} conflicting attempts")]
    ConflictRetriesExhausted { payment_id: PaymentId, attempts: u32 },

    /// The store failed for a reason other than a conflict.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl FulfillmentError {
    /// Short label used for logs and metrics.
    pub fn reason(&self) -> &'static str {
        match self {
            FulfillmentError::ProductNotFound(_) => "product_not_found",
            FulfillmentError::InsufficientStock { .. } => "insufficient_stock",
            FulfillmentError::ConflictRetriesExhausted { .. } => "conflict_retries_exhausted",
            FulfillmentError::Store(_) => "store",
        }
    }
}

/// Errors returned while handling a provider notification.
#[derive(Debug, Error)]
pub enum WebhookError {
    /// No provider credential is configured, so the payment cannot be fetched.
    #[error("Payment service is not configured")]
    NotConfigured,

    /// A payment notification without a payment id.
    #[error("Payment notification is missing data.id")]
    MissingPaymentId,

    /// A payment id that no provider would issue, rejected before any lookup.
    #[error("Invalid payment id in notification: {0:?}")]
    InvalidPaymentId(String),

    /// Fetching the payment from the provider failed.
    #[error("Failed to fetch payment: {0}")]
    Provider(#[from] ProviderError),

    /// The approved payment could not be reconciled.
    #[error("{0}")]
    Fulfillment(#[from] FulfillmentError),
}
