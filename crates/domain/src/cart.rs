//! Client-side shopping cart.

use serde::{Deserialize, Serialize};

use crate::error::CartError;
use crate::{Money, ProductId};

/// A line in the cart. The unit price is snapshotted when the product is
/// first added and never refreshed from the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartLineItem {
    #[serde(rename = "id")]
    pub product_id: ProductId,
    pub name: String,
    #[serde(rename = "price")]
    pub unit_price: Money,
    pub quantity: u32,
}

impl CartLineItem {
    /// Creates a validated line item.
    pub fn new(
        product_id: impl Into<ProductId>,
        name: impl Into<String>,
        unit_price: Money,
        quantity: u32,
    ) -> Result<Self, CartError> {
        let product_id = product_id.into();
        if product_id.is_blank() {
            return Err(CartError::ProductIdRequired);
        }
        if unit_price.is_negative() {
            return Err(CartError::InvalidPrice {
                price: unit_price.cents(),
            });
        }
        if quantity == 0 {
            return Err(CartError::InvalidQuantity { quantity });
        }
        Ok(Self {
            product_id,
            name: name.into(),
            unit_price,
            quantity,
        })
    }

    /// Returns `unit_price * quantity`.
    pub fn line_total(&self) -> Money {
        self.unit_price.multiply(self.quantity)
    }
}

/// The cart owned by a client session.
///
/// Lines keep insertion order. The cart is the source of truth for what is
/// submitted to checkout, and is cleared once the checkout redirect happens.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Cart {
    items: Vec<CartLineItem>,
}

impl Cart {
    /// Creates an empty cart.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds one unit of a product. Repeated adds bump the quantity of the
    /// existing line and keep its original price snapshot.
    pub fn add_product(
        &mut self,
        product_id: impl Into<ProductId>,
        name: impl Into<String>,
        unit_price: Money,
    ) -> Result<(), CartError> {
        let product_id = product_id.into();
        if let Some(line) = self.find_mut(&product_id) {
            line.quantity = line
                .quantity
                .checked_add(1)
                .ok_or_else(|| CartError::QuantityLimit {
                    product_id: product_id.to_string(),
                })?;
            return Ok(());
        }
        self.items
            .push(CartLineItem::new(product_id, name, unit_price, 1)?);
        Ok(())
    }

    /// Removes a line. Returns true if it was present.
    pub fn remove(&mut self, product_id: &ProductId) -> bool {
        let before = self.items.len();
        self.items.retain(|line| &line.product_id != product_id);
        self.items.len() != before
    }

    /// Sets the quantity of a line. A quantity of zero removes it.
    pub fn update_quantity(
        &mut self,
        product_id: &ProductId,
        quantity: u32,
    ) -> Result<(), CartError> {
        if quantity == 0 {
            self.remove(product_id);
            return Ok(());
        }
        let line = self
            .find_mut(product_id)
            .ok_or_else(|| CartError::ItemNotFound {
                product_id: product_id.to_string(),
            })?;
        line.quantity = quantity;
        Ok(())
    }

    /// Empties the cart.
    pub fn clear(&mut self) {
        self.items.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Returns the cart lines in insertion order.
    pub fn items(&self) -> &[CartLineItem] {
        &self.items
    }

    /// Total number of units across all lines.
    pub fn item_count(&self) -> u32 {
        self.items
            .iter()
            .fold(0u32, |count, line| count.saturating_add(line.quantity))
    }

    /// Sum of `unit_price * quantity` over all lines.
    pub fn total(&self) -> Money {
        self.items.iter().map(CartLineItem::line_total).sum()
    }

    /// Snapshot of the lines to submit to checkout.
    pub fn checkout_items(&self) -> Vec<CartLineItem> {
        self.items.clone()
    }

    /// Serializes the cart for client-side persistence.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Restores a persisted cart. Unreadable data yields an empty cart, the
    /// same as a first visit.
    pub fn from_json(data: &str) -> Self {
        match serde_json::from_str::<Cart>(data) {
            Ok(cart) => cart,
            Err(e) => {
                tracing::warn!(error = %e, "failed to parse persisted cart, starting empty");
                Self::new()
            }
        }
    }

    fn find_mut(&mut self, product_id: &ProductId) -> Option<&mut CartLineItem> {
        self.items
            .iter_mut()
            .find(|line| &line.product_id == product_id)
    }
}
