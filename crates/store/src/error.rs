use thiserror::Error;

use crate::{PaymentId, ProductId, Version};

/// Errors that can occur when interacting with the catalog store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A concurrent writer changed the product after it was read.
    /// The whole commit was rolled back and may be retried.
    #[error("Concurrency conflict on product {product_id}: expected version {expected}")]
    Conflict {
        product_id: ProductId,
        expected: Version,
    },

    /// An order already exists for this payment. Nothing was written.
    #[error("An order already exists for payment {0}")]
    DuplicatePayment(PaymentId),

    /// The commit was rejected before touching storage.
    #[error("Invalid commit: {0}")]
    InvalidCommit(String),

    /// A stored document could not be mapped back to its type.
    #[error("Invalid document: {0}")]
    InvalidDocument(String),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    /// Returns true for serialization conflicts that a caller should retry.
    /// Business-rule outcomes and infrastructure failures are never retriable.
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict { .. })
    }
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
