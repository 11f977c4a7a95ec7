//! Shared types used across the storefront checkout crates.

pub mod money;
pub mod types;

pub use money::Money;
pub use types::{OrderId, PaymentId, ProductId};
