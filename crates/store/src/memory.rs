use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::{
    FulfillmentCommit, Order, OrderId, PaymentId, Product, ProductId, Result, StoreError,
    store::{CatalogStore, validate_commit},
};

#[derive(Default)]
struct Documents {
    products: HashMap<ProductId, Product>,
    orders: Vec<Order>,
}

/// In-memory catalog store for tests and local runs.
///
/// Commits are serialized by a single write lock and checked against the
/// product versions they were planned from, which gives the same
/// conflict semantics as the PostgreSQL implementation.
#[derive(Clone, Default)]
pub struct InMemoryCatalogStore {
    docs: Arc<RwLock<Documents>>,
    injected_conflicts: Arc<AtomicU32>,
    committed_writes: Arc<AtomicUsize>,
}

impl InMemoryCatalogStore {
    /// Creates a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store pre-populated with the given products.
    pub async fn with_products(products: impl IntoIterator<Item = Product>) -> Self {
        let store = Self::new();
        {
            let mut docs = store.docs.write().await;
            for product in products {
                docs.products.insert(product.id.clone(), product);
            }
        }
        store
    }

    /// Makes the next `count` commits fail with a conflict, as if another
    /// writer had touched the products in between.
    pub fn inject_conflicts(&self, count: u32) {
        self.injected_conflicts.store(count, Ordering::SeqCst);
    }

    /// Returns the number of successful fulfillment commits.
    pub fn committed_writes(&self) -> usize {
        self.committed_writes.load(Ordering::SeqCst)
    }

    /// Returns the total number of orders stored.
    pub async fn order_count(&self) -> usize {
        self.docs.read().await.orders.len()
    }

    fn take_injected_conflict(&self) -> bool {
        self.injected_conflicts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl CatalogStore for InMemoryCatalogStore {
    async fn get_product(&self, id: &ProductId) -> Result<Option<Product>> {
        Ok(self.docs.read().await.products.get(id).cloned())
    }

    async fn get_products(&self, ids: &[ProductId]) -> Result<HashMap<ProductId, Product>> {
        let docs = self.docs.read().await;
        Ok(ids
            .iter()
            .filter_map(|id| docs.products.get(id).map(|p| (id.clone(), p.clone())))
            .collect())
    }

    async fn upsert_product(&self, mut product: Product) -> Result<Product> {
        let mut docs = self.docs.write().await;
        if let Some(existing) = docs.products.get(&product.id) {
            product.version = existing.version.next();
        }
        docs.products.insert(product.id.clone(), product.clone());
        Ok(product)
    }

    async fn get_order(&self, id: OrderId) -> Result<Option<Order>> {
        Ok(self
            .docs
            .read()
            .await
            .orders
            .iter()
            .find(|o| o.id == id)
            .cloned())
    }

    async fn find_order_by_payment(&self, payment_id: &PaymentId) -> Result<Option<Order>> {
        Ok(self
            .docs
            .read()
            .await
            .orders
            .iter()
            .find(|o| o.payment_id.as_ref() == Some(payment_id))
            .cloned())
    }

    async fn list_orders(&self) -> Result<Vec<Order>> {
        let mut orders = self.docs.read().await.orders.clone();
        orders.sort_by_key(|o| o.created_at);
        Ok(orders)
    }

    async fn commit_fulfillment(&self, commit: FulfillmentCommit) -> Result<Order> {
        validate_commit(&commit)?;

        let mut docs = self.docs.write().await;

        if let Some(update) = commit.stock_updates.first()
            && self.take_injected_conflict()
        {
            return Err(StoreError::Conflict {
                product_id: update.product_id.clone(),
                expected: update.expected_version,
            });
        }

        // Unique payment constraint simulation
        if let Some(payment_id) = &commit.order.payment_id
            && docs
                .orders
                .iter()
                .any(|o| o.payment_id.as_ref() == Some(payment_id))
        {
            return Err(StoreError::DuplicatePayment(payment_id.clone()));
        }

        // Check every guard before writing anything
        for update in &commit.stock_updates {
            match docs.products.get(&update.product_id) {
                Some(current) if current.version == update.expected_version => {}
                _ => {
                    return Err(StoreError::Conflict {
                        product_id: update.product_id.clone(),
                        expected: update.expected_version,
                    });
                }
            }
        }

        for update in &commit.stock_updates {
            if let Some(product) = docs.products.get_mut(&update.product_id) {
                product.stock = update.new_stock;
                product.version = product.version.next();
            }
        }

        docs.orders.push(commit.order.clone());
        self.committed_writes.fetch_add(1, Ordering::SeqCst);

        Ok(commit.order)
    }
}
