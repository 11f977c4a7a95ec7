//! Cart error types.

use thiserror::Error;

/// Errors that can occur while editing a cart.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CartError {
    /// Product id is empty.
    #[error("Product id is required")]
    ProductIdRequired,

    /// Item not found in cart.
    #[error("Item not found: {product_id}")]
    ItemNotFound { product_id: String },

    /// Invalid quantity.
    #[error("Invalid quantity: {quantity} (must be greater than 0)")]
    InvalidQuantity { quantity: u32 },

    /// The line already holds the largest representable quantity.
    #[error("Quantity limit reached for {product_id}")]
    QuantityLimit { product_id: String },

    /// Invalid price.
    #[error("Invalid price: {price} (must not be negative)")]
    InvalidPrice { price: i64 },
}
