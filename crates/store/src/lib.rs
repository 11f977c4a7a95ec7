pub mod document;
pub mod error;
pub mod memory;
pub mod postgres;
pub mod store;

pub use common::{Money, OrderId, PaymentId, ProductId};
pub use document::{FulfillmentCommit, Order, OrderItem, OrderStatus, Product, StockUpdate, Version};
pub use error::{Result, StoreError};
pub use memory::InMemoryCatalogStore;
pub use postgres::PostgresCatalogStore;
pub use store::{CatalogStore, CatalogStoreExt, validate_commit};
