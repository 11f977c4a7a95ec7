//! Domain layer for the storefront.
//!
//! This crate provides the client-side cart: the line items (product,
//! price snapshot, quantity) that are submitted to checkout.

pub mod cart;
pub mod error;

pub use cart::{Cart, CartLineItem};
pub use common::{Money, ProductId};
pub use error::CartError;
