use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row, postgres::PgRow};
use uuid::Uuid;

use crate::{
    FulfillmentCommit, Money, Order, OrderId, OrderItem, PaymentId, Product, ProductId, Result,
    StoreError, Version,
    store::{CatalogStore, validate_commit},
};

const ORDER_COLUMNS: &str =
    "id, items, total_cents, status, payment_id, external_reference, created_at";

/// PostgreSQL-backed catalog store.
#[derive(Clone)]
pub struct PostgresCatalogStore {
    pool: PgPool,
}

impl PostgresCatalogStore {
    /// Creates a new PostgreSQL catalog store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> std::result::Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("../../migrations").run(&self.pool).await
    }

    fn row_to_product(row: PgRow) -> Result<Product> {
        let stock: i64 = row.try_get("stock")?;
        let stock = u32::try_from(stock)
            .map_err(|_| StoreError::InvalidDocument(format!("stock out of range: {stock}")))?;

        Ok(Product {
            id: ProductId::new(row.try_get::<String, _>("id")?),
            name: row.try_get("name")?,
            price: Money::from_cents(row.try_get("price_cents")?),
            stock,
            version: Version::new(row.try_get("version")?),
        })
    }

    fn row_to_order(row: PgRow) -> Result<Order> {
        let items_json: serde_json::Value = row.try_get("items")?;
        let items: Vec<OrderItem> = serde_json::from_value(items_json)?;
        let status: String = row.try_get("status")?;

        Ok(Order {
            id: OrderId::from_uuid(row.try_get::<Uuid, _>("id")?),
            items,
            total: Money::from_cents(row.try_get("total_cents")?),
            status: status.parse().map_err(StoreError::InvalidDocument)?,
            payment_id: row
                .try_get::<Option<String>, _>("payment_id")?
                .map(PaymentId::new),
            external_reference: row.try_get("external_reference")?,
            created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
        })
    }
}

/// Maps a write failure inside the fulfillment transaction.
///
/// Serialization failures and deadlocks are conflicts like a stale version;
/// the unique payment constraint means another delivery already won.
fn map_commit_error(
    err: sqlx::Error,
    payment_id: Option<&PaymentId>,
    first_product: Option<(&ProductId, Version)>,
) -> StoreError {
    if let sqlx::Error::Database(ref db_err) = err {
        if db_err.constraint() == Some("orders_payment_id_key")
            && let Some(payment_id) = payment_id
        {
            return StoreError::DuplicatePayment(payment_id.clone());
        }
        let code = db_err.code();
        if matches!(code.as_deref(), Some("40001") | Some("40P01"))
            && let Some((product_id, expected)) = first_product
        {
            return StoreError::Conflict {
                product_id: product_id.clone(),
                expected,
            };
        }
    }
    StoreError::Database(err)
}

#[async_trait]
impl CatalogStore for PostgresCatalogStore {
    async fn get_product(&self, id: &ProductId) -> Result<Option<Product>> {
        let row = sqlx::query(
            "SELECT id, name, price_cents, stock, version FROM products WHERE id = $1",
        )
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_product).transpose()
    }

    async fn get_products(&self, ids: &[ProductId]) -> Result<HashMap<ProductId, Product>> {
        let keys: Vec<String> = ids.iter().map(|id| id.as_str().to_string()).collect();
        let rows = sqlx::query(
            "SELECT id, name, price_cents, stock, version FROM products WHERE id = ANY($1)",
        )
        .bind(keys)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| Self::row_to_product(row).map(|p| (p.id.clone(), p)))
            .collect()
    }

    async fn upsert_product(&self, product: Product) -> Result<Product> {
        let row = sqlx::query(
            r#"
            INSERT INTO products (id, name, price_cents, stock, version)
            VALUES ($1, $2, $3, $4, 0)
            ON CONFLICT (id) DO UPDATE SET
                name = EXCLUDED.name,
                price_cents = EXCLUDED.price_cents,
                stock = EXCLUDED.stock,
                version = products.version + 1
            RETURNING id, name, price_cents, stock, version
            "#,
        )
        .bind(product.id.as_str())
        .bind(&product.name)
        .bind(product.price.cents())
        .bind(i64::from(product.stock))
        .fetch_one(&self.pool)
        .await?;

        Self::row_to_product(row)
    }

    async fn get_order(&self, id: OrderId) -> Result<Option<Order>> {
        let row = sqlx::query(&format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1"))
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;

        row.map(Self::row_to_order).transpose()
    }

    async fn find_order_by_payment(&self, payment_id: &PaymentId) -> Result<Option<Order>> {
        let row = sqlx::query(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE payment_id = $1"
        ))
        .bind(payment_id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_order).transpose()
    }

    async fn list_orders(&self) -> Result<Vec<Order>> {
        let rows = sqlx::query(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders ORDER BY created_at ASC, id ASC"
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_order).collect()
    }

    async fn commit_fulfillment(&self, commit: FulfillmentCommit) -> Result<Order> {
        validate_commit(&commit)?;

        let payment_id = commit.order.payment_id.as_ref();
        let first_product = commit
            .stock_updates
            .first()
            .map(|u| (&u.product_id, u.expected_version));

        // Dropping the transaction without commit rolls every write back
        let mut tx = self.pool.begin().await?;

        for update in &commit.stock_updates {
            let result = sqlx::query(
                r#"
                UPDATE products
                SET stock = $1, version = version + 1
                WHERE id = $2 AND version = $3
                "#,
            )
            .bind(i64::from(update.new_stock))
            .bind(update.product_id.as_str())
            .bind(update.expected_version.as_i64())
            .execute(&mut *tx)
            .await
            .map_err(|e| map_commit_error(e, payment_id, first_product))?;

            if result.rows_affected() == 0 {
                tracing::debug!(
                    product_id = %update.product_id,
                    expected = %update.expected_version,
                    "stock update guard failed"
                );
                return Err(StoreError::Conflict {
                    product_id: update.product_id.clone(),
                    expected: update.expected_version,
                });
            }
        }

        let items_json = serde_json::to_value(&commit.order.items)?;

        sqlx::query(
            r#"
            INSERT INTO orders (id, items, total_cents, status, payment_id, external_reference, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(commit.order.id.as_uuid())
        .bind(items_json)
        .bind(commit.order.total.cents())
        .bind(commit.order.status.as_str())
        .bind(payment_id.map(PaymentId::as_str))
        .bind(commit.order.external_reference.as_deref())
        .bind(commit.order.created_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_commit_error(e, payment_id, first_product))?;

        tx.commit()
            .await
            .map_err(|e| map_commit_error(e, payment_id, first_product))?;

        tracing::debug!(
            order_id = %commit.order.id,
            stock_updates = commit.stock_updates.len(),
            "fulfillment committed"
        );
        Ok(commit.order)
    }
}
