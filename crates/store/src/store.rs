use std::collections::{HashMap, HashSet};

use async_trait::async_trait;

use crate::{
    FulfillmentCommit, Order, OrderId, OrderStatus, PaymentId, Product, ProductId, Result,
    StoreError,
};

/// Core trait for the document store backing the storefront.
///
/// Products and orders are read freely, but stock is only ever written
/// through [`CatalogStore::commit_fulfillment`], which applies every stock
/// update and the order insert as one atomic unit.
/// All implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait CatalogStore: Send + Sync {
    /// Fetches a single product.
    async fn get_product(&self, id: &ProductId) -> Result<Option<Product>>;

    /// Fetches the given products in one consistent read. Missing ids are
    /// simply absent from the returned map.
    async fn get_products(&self, ids: &[ProductId]) -> Result<HashMap<ProductId, Product>>;

    /// Inserts or replaces a product document (catalog administration).
    ///
    /// The stored version is bumped past any existing one so in-flight
    /// fulfillments that read the old document conflict.
    async fn upsert_product(&self, product: Product) -> Result<Product>;

    /// Fetches an order by id.
    async fn get_order(&self, id: OrderId) -> Result<Option<Order>>;

    /// Fetches the order created for a payment, if any.
    async fn find_order_by_payment(&self, payment_id: &PaymentId) -> Result<Option<Order>>;

    /// Lists all orders, oldest first.
    async fn list_orders(&self) -> Result<Vec<Order>>;

    /// Applies a fulfillment atomically.
    ///
    /// Fails with [`StoreError::Conflict`] if any product moved past the
    /// version the commit expects, and with [`StoreError::DuplicatePayment`]
    /// if an order already exists for the order's payment. Either way
    /// nothing is written.
    async fn commit_fulfillment(&self, commit: FulfillmentCommit) -> Result<Order>;
}

/// Extension trait providing convenience methods for catalog stores.
#[async_trait]
pub trait CatalogStoreExt: CatalogStore {
    /// Checks if a payment has already been turned into an order.
    async fn is_payment_fulfilled(&self, payment_id: &PaymentId) -> Result<bool> {
        Ok(self.find_order_by_payment(payment_id).await?.is_some())
    }

    /// Returns the current stock of a product, if it exists.
    async fn stock_of(&self, id: &ProductId) -> Result<Option<u32>> {
        Ok(self.get_product(id).await?.map(|p| p.stock))
    }
}

// Blanket implementation for all CatalogStore implementations
impl<T: CatalogStore + ?Sized> CatalogStoreExt for T {}

/// Validates a commit before it reaches storage.
pub fn validate_commit(commit: &FulfillmentCommit) -> Result<()> {
    if commit.order.items.is_empty() {
        return Err(StoreError::InvalidCommit(
            "Cannot commit an order without items".to_string(),
        ));
    }

    if commit.order.payment_id.is_none() {
        return Err(StoreError::InvalidCommit(
            "Fulfilled orders must reference a payment".to_string(),
        ));
    }

    if commit.order.status != OrderStatus::Paid {
        return Err(StoreError::InvalidCommit(format!(
            "Fulfilled orders must be paid, got {}",
            commit.order.status
        )));
    }

    // One guarded write per product
    let mut seen = HashSet::new();
    for update in &commit.stock_updates {
        if !seen.insert(&update.product_id) {
            return Err(StoreError::InvalidCommit(format!(
                "Duplicate stock update for product {}",
                update.product_id
            )));
        }
    }

    for item in &commit.order.items {
        if !seen.contains(&item.product_id) {
            return Err(StoreError::InvalidCommit(format!(
                "Order item {} has no matching stock update",
                item.product_id
            )));
        }
    }

    Ok(())
}
