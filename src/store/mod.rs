// src/store/mod.rs
// Collaborators the use cases depend on: order/product persistence and the stock lookup

mod http_stock;
mod memory;

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::models::{Order, OrderStatus, Product};

pub use http_stock::HttpStockClient;
pub use memory::{InMemoryOrderStore, InMemoryProductStore, ProductStockClient, QUANTITY_LOG_CAPACITY};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: Uuid },

    #[error("{entity} {id} already exists")]
    Conflict { entity: &'static str, id: Uuid },

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// Sales-side order persistence.
#[async_trait]
pub trait OrderStore: Send + Sync {
    async fn get_by_id(&self, order_id: Uuid) -> Result<Option<Order>, StoreError>;

    async fn get_all(&self) -> Result<Vec<Order>, StoreError>;

    async fn add(&self, order: Order) -> Result<(), StoreError>;

    async fn update(&self, order: Order) -> Result<(), StoreError>;

    async fn update_status(&self, order_id: Uuid, status: OrderStatus) -> Result<(), StoreError>;

    async fn delete(&self, order_id: Uuid) -> Result<(), StoreError>;
}

/// Inventory-side product persistence.
#[async_trait]
pub trait ProductStore: Send + Sync {
    async fn get_by_id(&self, product_id: Uuid) -> Result<Option<Product>, StoreError>;

    async fn get_all(&self) -> Result<Vec<Product>, StoreError>;

    async fn add(&self, product: Product) -> Result<(), StoreError>;

    async fn update(&self, product: Product) -> Result<(), StoreError>;

    async fn update_quantity(&self, new_quantity: i32, product_id: Uuid) -> Result<(), StoreError>;

    async fn delete(&self, product_id: Uuid) -> Result<(), StoreError>;
}

/// "How many of product X are available", answered by the inventory boundary.
#[async_trait]
pub trait StockClient: Send + Sync {
    async fn get_available_stock(&self, product_id: Uuid) -> Result<i32, StoreError>;
}
