//! Atomic reconciliation of an approved payment into stock decrements and
//! an order.

use std::collections::HashMap;

use store::{
    CatalogStore, FulfillmentCommit, Order, OrderItem, PaymentId, ProductId, StockUpdate,
    StoreError,
};

use crate::error::FulfillmentError;
use crate::provider::PaymentItem;
use crate::retry::RetryPolicy;

/// Result of a successful reconciliation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reconciliation {
    /// Stock was decremented and this order was created.
    Created(Order),
    /// The payment had already been fulfilled; nothing was written.
    AlreadyFulfilled(Order),
    /// The payment carried no usable items; nothing was written.
    NothingToFulfill,
}

impl Reconciliation {
    pub fn order(&self) -> Option<&Order> {
        match self {
            Reconciliation::Created(order) | Reconciliation::AlreadyFulfilled(order) => {
                Some(order)
            }
            Reconciliation::NothingToFulfill => None,
        }
    }
}

/// A usable payment line.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Line {
    product_id: ProductId,
    quantity: u32,
}

/// Keeps lines with a product id and a positive quantity; everything else
/// is skipped with a warning instead of failing the whole payment.
fn usable_lines(payment_id: &PaymentId, items: &[PaymentItem]) -> Vec<Line> {
    items
        .iter()
        .filter_map(|item| {
            let product_id = item.id.as_deref().map(str::trim).filter(|id| !id.is_empty());
            let quantity = item
                .quantity
                .filter(|q| *q > 0)
                .and_then(|q| u32::try_from(q).ok());
            match (product_id, quantity) {
                (Some(id), Some(quantity)) => Some(Line {
                    product_id: ProductId::new(id),
                    quantity,
                }),
                _ => {
                    metrics::counter!("fulfillment_items_skipped_total").increment(1);
                    tracing::warn!(
                        %payment_id,
                        item_id = ?item.id,
                        quantity = ?item.quantity,
                        "skipping invalid payment item"
                    );
                    None
                }
            }
        })
        .collect()
}

/// Turns approved payments into orders.
///
/// Each attempt reads a snapshot of the referenced products, checks every
/// line against it and hands the store one commit holding all stock writes
/// plus the order. The store rejects the commit if any product changed
/// since the snapshot, in which case the attempt is repeated according to
/// the retry policy.
#[derive(Clone)]
pub struct FulfillmentService<S: CatalogStore> {
    store: S,
    retry: RetryPolicy,
}

impl<S: CatalogStore> FulfillmentService<S> {
    pub fn new(store: S) -> Self {
        Self::with_retry_policy(store, RetryPolicy::default())
    }

    pub fn with_retry_policy(store: S, retry: RetryPolicy) -> Self {
        Self { store, retry }
    }

    /// Decrements stock and creates a paid order for an approved payment,
    /// or writes nothing at all.
    ///
    /// Safe to call repeatedly for the same payment: once an order exists
    /// for `payment_id` it is returned as [`Reconciliation::AlreadyFulfilled`].
    #[tracing::instrument(skip(self, payment_id, items), fields(payment_id = %payment_id, item_count = items.len()))]
    pub async fn reconcile_approved_payment(
        &self,
        payment_id: &PaymentId,
        items: &[PaymentItem],
        external_reference: Option<&str>,
    ) -> Result<Reconciliation, FulfillmentError> {
        let started = std::time::Instant::now();
        let result = self
            .reconcile_with_retry(payment_id, items, external_reference)
            .await;
        metrics::histogram!("fulfillment_duration_seconds")
            .record(started.elapsed().as_secs_f64());

        match &result {
            Ok(Reconciliation::Created(order)) => {
                metrics::counter!("fulfillment_orders_created_total").increment(1);
                tracing::info!(
                    order_id = %order.id,
                    total = %order.total,
                    external_reference = ?order.external_reference,
                    "order created"
                );
            }
            Ok(Reconciliation::AlreadyFulfilled(order)) => {
                metrics::counter!("fulfillment_duplicates_total").increment(1);
                tracing::info!(order_id = %order.id, "payment already fulfilled, skipping");
            }
            Ok(Reconciliation::NothingToFulfill) => {
                tracing::warn!("approved payment has no usable items, nothing to fulfill");
            }
            Err(e) => {
                metrics::counter!("fulfillment_failures_total", "reason" => e.reason())
                    .increment(1);
                tracing::error!(error = %e, "fulfillment aborted");
            }
        }

        result
    }

    async fn reconcile_with_retry(
        &self,
        payment_id: &PaymentId,
        items: &[PaymentItem],
        external_reference: Option<&str>,
    ) -> Result<Reconciliation, FulfillmentError> {
        let lines = usable_lines(payment_id, items);
        let mut attempt = 0;

        loop {
            attempt += 1;

            if let Some(existing) = self.store.find_order_by_payment(payment_id).await? {
                return Ok(Reconciliation::AlreadyFulfilled(existing));
            }

            if lines.is_empty() {
                return Ok(Reconciliation::NothingToFulfill);
            }

            let commit = self.plan(payment_id, &lines, external_reference).await?;

            match self.store.commit_fulfillment(commit).await {
                Ok(order) => return Ok(Reconciliation::Created(order)),
                Err(StoreError::DuplicatePayment(_)) => {
                    // A concurrent delivery of the same payment won the race
                    return match self.store.find_order_by_payment(payment_id).await? {
                        Some(existing) => Ok(Reconciliation::AlreadyFulfilled(existing)),
                        None => Err(StoreError::DuplicatePayment(payment_id.clone()).into()),
                    };
                }
                Err(e) if e.is_conflict() => {
                    metrics::counter!("fulfillment_conflicts_total").increment(1);
                    if attempt >= self.retry.max_attempts {
                        return Err(FulfillmentError::ConflictRetriesExhausted {
                            payment_id: payment_id.clone(),
                            attempts: attempt,
                        });
                    }
                    let delay = self.retry.delay_for(attempt);
                    tracing::warn!(attempt, ?delay, error = %e, "store conflict, retrying");
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Builds the commit for one attempt from a fresh product snapshot.
    async fn plan(
        &self,
        payment_id: &PaymentId,
        lines: &[Line],
        external_reference: Option<&str>,
    ) -> Result<FulfillmentCommit, FulfillmentError> {
        // Requested quantity per product, in first-seen order
        let mut order_of_ids: Vec<ProductId> = Vec::new();
        let mut requested: HashMap<&ProductId, u64> = HashMap::new();
        for line in lines {
            let total = requested.entry(&line.product_id).or_insert_with(|| {
                order_of_ids.push(line.product_id.clone());
                0
            });
            *total += u64::from(line.quantity);
        }

        let products = self.store.get_products(&order_of_ids).await?;

        let mut stock_updates = Vec::with_capacity(order_of_ids.len());
        for product_id in &order_of_ids {
            let product = products
                .get(product_id)
                .ok_or_else(|| FulfillmentError::ProductNotFound(product_id.clone()))?;
            let wanted = requested[product_id];

            if u64::from(product.stock) < wanted {
                return Err(FulfillmentError::InsufficientStock {
                    product_id: product_id.clone(),
                    name: product.name.clone(),
                    requested: wanted,
                    available: product.stock,
                });
            }

            // wanted <= stock, so it fits in u32
            let new_stock = product.stock - wanted as u32;
            tracing::debug!(
                %product_id,
                from = product.stock,
                to = new_stock,
                "planned stock update"
            );
            stock_updates.push(StockUpdate {
                product_id: product_id.clone(),
                expected_version: product.version,
                new_stock,
            });
        }

        let order_items = lines
            .iter()
            .map(|line| {
                let product = &products[&line.product_id];
                OrderItem::new(
                    line.product_id.clone(),
                    product.name.clone(),
                    line.quantity,
                    product.price,
                )
            })
            .collect();

        Ok(FulfillmentCommit {
            stock_updates,
            order: Order::paid(
                payment_id.clone(),
                order_items,
                external_reference.map(str::to_string),
            ),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use store::{CatalogStoreExt, InMemoryCatalogStore, Money, OrderStatus, Product};

    async fn store_with(products: &[(&str, i64, u32)]) -> InMemoryCatalogStore {
        InMemoryCatalogStore::with_products(products.iter().map(|(id, price, stock)| {
            Product::new(*id, format!("Product {id}"), Money::from_cents(*price), *stock)
        }))
        .await
    }

    fn service(store: &InMemoryCatalogStore) -> FulfillmentService<InMemoryCatalogStore> {
        FulfillmentService::with_retry_policy(store.clone(), RetryPolicy::immediate(3))
    }

    async fn stock(store: &InMemoryCatalogStore, id: &str) -> u32 {
        store.stock_of(&ProductId::new(id)).await.unwrap().unwrap()
    }

    #[tokio::test]
    async fn sufficient_stock_creates_paid_order() {
        let store = store_with(&[("p1", 10000, 5)]).await;

        let result = service(&store)
            .reconcile_approved_payment(
                &PaymentId::new("pay-1"),
                &[PaymentItem::new("p1", "Mug", 2)],
                Some("impres-loja-1"),
            )
            .await
            .unwrap();

        let Reconciliation::Created(order) = result else {
            panic!("expected a created order");
        };
        assert_eq!(stock(&store, "p1").await, 3);
        assert_eq!(order.total.cents(), 20000);
        assert_eq!(order.status, OrderStatus::Paid);
        assert_eq!(order.payment_id, Some(PaymentId::new("pay-1")));
        assert_eq!(order.external_reference.as_deref(), Some("impres-loja-1"));
        assert_eq!(store.order_count().await, 1);
    }

    #[tokio::test]
    async fn insufficient_stock_writes_nothing_and_names_product() {
        let store = store_with(&[("p1", 10000, 5)]).await;

        let err = service(&store)
            .reconcile_approved_payment(
                &PaymentId::new("pay-1"),
                &[PaymentItem::new("p1", "Mug", 10)],
                None,
            )
            .await
            .unwrap_err();

        match err {
            FulfillmentError::InsufficientStock {
                product_id,
                requested,
                available,
                ..
            } => {
                assert_eq!(product_id, ProductId::new("p1"));
                assert_eq!(requested, 10);
                assert_eq!(available, 5);
            }
            other => panic!("expected insufficient stock, got {other:?}"),
        }
        assert_eq!(stock(&store, "p1").await, 5);
        assert_eq!(store.order_count().await, 0);
    }

    #[tokio::test]
    async fn one_short_item_aborts_all_items() {
        let store = store_with(&[("p1", 100, 5), ("p2", 200, 1)]).await;

        let result = service(&store)
            .reconcile_approved_payment(
                &PaymentId::new("pay-1"),
                &[
                    PaymentItem::new("p1", "A", 2),
                    PaymentItem::new("p2", "B", 2),
                ],
                None,
            )
            .await;

        assert!(result.is_err());
        assert_eq!(stock(&store, "p1").await, 5);
        assert_eq!(stock(&store, "p2").await, 1);
        assert_eq!(store.committed_writes(), 0);
    }

    #[tokio::test]
    async fn repeated_lines_are_checked_against_combined_quantity() {
        let store = store_with(&[("p1", 100, 3)]).await;

        let result = service(&store)
            .reconcile_approved_payment(
                &PaymentId::new("pay-1"),
                &[PaymentItem::new("p1", "A", 2), PaymentItem::new("p1", "A", 2)],
                None,
            )
            .await;

        assert!(matches!(
            result,
            Err(FulfillmentError::InsufficientStock { requested: 4, .. })
        ));
        assert_eq!(stock(&store, "p1").await, 3);
    }

    #[tokio::test]
    async fn missing_product_aborts() {
        let store = store_with(&[("p1", 100, 3)]).await;

        let result = service(&store)
            .reconcile_approved_payment(
                &PaymentId::new("pay-1"),
                &[PaymentItem::new("p1", "A", 1), PaymentItem::new("gone", "X", 1)],
                None,
            )
            .await;

        assert!(matches!(result, Err(FulfillmentError::ProductNotFound(id)) if id.as_str() == "gone"));
        assert_eq!(stock(&store, "p1").await, 3);
    }

    #[tokio::test]
    async fn invalid_items_are_skipped() {
        let store = store_with(&[("p1", 100, 3)]).await;
        let items = [
            PaymentItem::new("p1", "A", 1),
            PaymentItem::new("p1", "A", 0),
            PaymentItem::new("p1", "A", -2),
            PaymentItem {
                id: None,
                quantity: Some(1),
                ..PaymentItem::default()
            },
            PaymentItem {
                id: Some("p1".to_string()),
                quantity: None,
                ..PaymentItem::default()
            },
        ];

        let result = service(&store)
            .reconcile_approved_payment(&PaymentId::new("pay-1"), &items, None)
            .await
            .unwrap();

        assert_eq!(result.order().unwrap().items.len(), 1);
        assert_eq!(stock(&store, "p1").await, 2);
    }

    #[tokio::test]
    async fn only_invalid_items_means_nothing_to_fulfill() {
        let store = store_with(&[("p1", 100, 3)]).await;

        let result = service(&store)
            .reconcile_approved_payment(
                &PaymentId::new("pay-1"),
                &[PaymentItem::new("p1", "A", 0)],
                None,
            )
            .await
            .unwrap();

        assert_eq!(result, Reconciliation::NothingToFulfill);
        assert_eq!(store.order_count().await, 0);
    }

    #[tokio::test]
    async fn second_delivery_is_idempotent() {
        let store = store_with(&[("p1", 10000, 5)]).await;
        let service = service(&store);
        let payment_id = PaymentId::new("pay-1");
        let items = [PaymentItem::new("p1", "Mug", 2)];

        let first = service
            .reconcile_approved_payment(&payment_id, &items, None)
            .await
            .unwrap();
        let second = service
            .reconcile_approved_payment(&payment_id, &items, None)
            .await
            .unwrap();

        assert!(matches!(first, Reconciliation::Created(_)));
        assert_eq!(second, Reconciliation::AlreadyFulfilled(first.order().unwrap().clone()));
        assert_eq!(stock(&store, "p1").await, 3);
        assert_eq!(store.order_count().await, 1);
    }

    #[tokio::test]
    async fn conflicts_are_retried() {
        let store = store_with(&[("p1", 100, 5)]).await;
        store.inject_conflicts(2);

        let result = service(&store)
            .reconcile_approved_payment(
                &PaymentId::new("pay-1"),
                &[PaymentItem::new("p1", "A", 1)],
                None,
            )
            .await
            .unwrap();

        assert!(matches!(result, Reconciliation::Created(_)));
        assert_eq!(stock(&store, "p1").await, 4);
    }

    #[tokio::test]
    async fn conflicts_give_up_after_max_attempts() {
        let store = store_with(&[("p1", 100, 5)]).await;
        store.inject_conflicts(10);

        let result = service(&store)
            .reconcile_approved_payment(
                &PaymentId::new("pay-1"),
                &[PaymentItem::new("p1", "A", 1)],
                None,
            )
            .await;

        assert!(matches!(
            result,
            Err(FulfillmentError::ConflictRetriesExhausted { attempts: 3, .. })
        ));
        assert_eq!(stock(&store, "p1").await, 5);
    }

    #[tokio::test]
    async fn order_uses_catalog_name_and_price() {
        let store = store_with(&[("p1", 2500, 5)]).await;

        let result = service(&store)
            .reconcile_approved_payment(
                &PaymentId::new("pay-1"),
                &[PaymentItem {
                    id: Some("p1".to_string()),
                    title: Some("Renamed at checkout".to_string()),
                    quantity: Some(2),
                    unit_price: Some(1.0),
                }],
                None,
            )
            .await
            .unwrap();

        let order = result.order().unwrap();
        assert_eq!(order.items[0].name, "Product p1");
        assert_eq!(order.items[0].price.cents(), 2500);
        assert_eq!(order.total.cents(), 5000);
    }
}
