//! In-memory stores, used by the single-process wiring and by tests.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use uuid::Uuid;

use super::{OrderStore, ProductStore, StockClient, StoreError};
use crate::models::{Order, OrderStatus, Product};

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug, Default)]
struct OrderState {
    orders: HashMap<Uuid, Order>,
    add_calls: usize,
    unavailable: bool,
}

impl OrderState {
    fn check(&self) -> Result<(), StoreError> {
        if self.unavailable {
            return Err(StoreError::Unavailable("order store offline".to_string()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct InMemoryOrderStore {
    state: Arc<RwLock<OrderState>>,
}

impl InMemoryOrderStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every call fail with [`StoreError::Unavailable`] until reset.
    pub fn set_unavailable(&self, unavailable: bool) {
        write(&self.state).unavailable = unavailable;
    }

    pub fn add_calls(&self) -> usize {
        read(&self.state).add_calls
    }

    pub fn len(&self) -> usize {
        read(&self.state).orders.len()
    }

    pub fn is_empty(&self) -> bool {
        read(&self.state).orders.is_empty()
    }
}

#[async_trait]
impl OrderStore for InMemoryOrderStore {
    async fn get_by_id(&self, order_id: Uuid) -> Result<Option<Order>, StoreError> {
        let state = read(&self.state);
        state.check()?;
        Ok(state.orders.get(&order_id).cloned())
    }

    async fn get_all(&self) -> Result<Vec<Order>, StoreError> {
        let state = read(&self.state);
        state.check()?;
        Ok(state.orders.values().cloned().collect())
    }

    async fn add(&self, order: Order) -> Result<(), StoreError> {
        let mut state = write(&self.state);
        state.add_calls += 1;
        state.check()?;
        if state.orders.contains_key(&order.order_id) {
            return Err(StoreError::Conflict {
                entity: "Order",
                id: order.order_id,
            });
        }
        state.orders.insert(order.order_id, order);
        Ok(())
    }

    async fn update(&self, order: Order) -> Result<(), StoreError> {
        let mut state = write(&self.state);
        state.check()?;
        match state.orders.get_mut(&order.order_id) {
            Some(existing) => {
                *existing = order;
                Ok(())
            }
            None => Err(StoreError::NotFound {
                entity: "Order",
                id: order.order_id,
            }),
        }
    }

    async fn update_status(&self, order_id: Uuid, status: OrderStatus) -> Result<(), StoreError> {
        let mut state = write(&self.state);
        state.check()?;
        match state.orders.get_mut(&order_id) {
            Some(order) => {
                order.status = status;
                Ok(())
            }
            None => Err(StoreError::NotFound {
                entity: "Order",
                id: order_id,
            }),
        }
    }

    async fn delete(&self, order_id: Uuid) -> Result<(), StoreError> {
        let mut state = write(&self.state);
        state.check()?;
        state.orders.remove(&order_id);
        Ok(())
    }
}

/// How many `update_quantity` calls the product store remembers.
pub const QUANTITY_LOG_CAPACITY: usize = 256;

#[derive(Debug, Default)]
struct ProductState {
    products: HashMap<Uuid, Product>,
    quantity_updates: VecDeque<(i32, Uuid)>,
    unavailable: bool,
}

impl ProductState {
    fn check(&self) -> Result<(), StoreError> {
        if self.unavailable {
            return Err(StoreError::Unavailable("product store offline".to_string()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct InMemoryProductStore {
    state: Arc<RwLock<ProductState>>,
}

impl InMemoryProductStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_products(products: Vec<Product>) -> Self {
        let store = Self::new();
        {
            let mut state = write(&store.state);
            for product in products {
                state.products.insert(product.product_id, product);
            }
        }
        store
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        write(&self.state).unavailable = unavailable;
    }

    /// The most recent `update_quantity(new_quantity, product_id)` calls, oldest
    /// first, up to [`QUANTITY_LOG_CAPACITY`].
    pub fn quantity_updates(&self) -> Vec<(i32, Uuid)> {
        read(&self.state).quantity_updates.iter().copied().collect()
    }

    pub fn stock_of(&self, product_id: Uuid) -> Option<i32> {
        read(&self.state)
            .products
            .get(&product_id)
            .map(|product| product.stock_quantity)
    }
}

#[async_trait]
impl ProductStore for InMemoryProductStore {
    async fn get_by_id(&self, product_id: Uuid) -> Result<Option<Product>, StoreError> {
        let state = read(&self.state);
        state.check()?;
        Ok(state.products.get(&product_id).cloned())
    }

    async fn get_all(&self) -> Result<Vec<Product>, StoreError> {
        let state = read(&self.state);
        state.check()?;
        Ok(state.products.values().cloned().collect())
    }

    async fn add(&self, product: Product) -> Result<(), StoreError> {
        let mut state = write(&self.state);
        state.check()?;
        if state.products.contains_key(&product.product_id) {
            return Err(StoreError::Conflict {
                entity: "Product",
                id: product.product_id,
            });
        }
        state.products.insert(product.product_id, product);
        Ok(())
    }

    async fn update(&self, product: Product) -> Result<(), StoreError> {
        let mut state = write(&self.state);
        state.check()?;
        match state.products.get_mut(&product.product_id) {
            Some(existing) => {
                *existing = product;
                Ok(())
            }
            None => Err(StoreError::NotFound {
                entity: "Product",
                id: product.product_id,
            }),
        }
    }

    async fn update_quantity(&self, new_quantity: i32, product_id: Uuid) -> Result<(), StoreError> {
        let mut state = write(&self.state);
        state.check()?;
        if state.quantity_updates.len() == QUANTITY_LOG_CAPACITY {
            state.quantity_updates.pop_front();
        }
        state.quantity_updates.push_back((new_quantity, product_id));
        match state.products.get_mut(&product_id) {
            Some(product) => {
                product.stock_quantity = new_quantity;
                Ok(())
            }
            None => Err(StoreError::NotFound {
                entity: "Product",
                id: product_id,
            }),
        }
    }

    async fn delete(&self, product_id: Uuid) -> Result<(), StoreError> {
        let mut state = write(&self.state);
        state.check()?;
        state.products.remove(&product_id);
        Ok(())
    }
}

/// Answers stock queries straight from a product store, for single-process wiring.
#[derive(Clone)]
pub struct ProductStockClient {
    products: Arc<dyn ProductStore>,
}

impl ProductStockClient {
    pub fn new(products: Arc<dyn ProductStore>) -> Self {
        Self { products }
    }
}

#[async_trait]
impl StockClient for ProductStockClient {
    async fn get_available_stock(&self, product_id: Uuid) -> Result<i32, StoreError> {
        Ok(self
            .products
            .get_by_id(product_id)
            .await?
            .map(|product| product.available_quantity())
            .unwrap_or(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::OrderItem;

    #[tokio::test]
    async fn test_order_status_update() {
        let store = InMemoryOrderStore::new();
        let order = Order::new("customer-1", vec![OrderItem::new(Uuid::new_v4(), "Widget", 1, 5.0)]);
        let order_id = order.order_id;
        store.add(order).await.unwrap();

        store.update_status(order_id, OrderStatus::Confirmed).await.unwrap();

        let stored = store.get_by_id(order_id).await.unwrap().unwrap();
        assert_eq!(stored.status, OrderStatus::Confirmed);
        assert_eq!(store.add_calls(), 1);
    }

    #[tokio::test]
    async fn test_update_status_of_missing_order() {
        let store = InMemoryOrderStore::new();
        let result = store.update_status(Uuid::new_v4(), OrderStatus::Confirmed).await;
        assert!(matches!(result, Err(StoreError::NotFound { entity: "Order", .. })));
    }

    #[tokio::test]
    async fn test_unavailable_store_fails_calls() {
        let store = InMemoryOrderStore::new();
        store.set_unavailable(true);
        assert!(matches!(store.get_all().await, Err(StoreError::Unavailable(_))));
        store.set_unavailable(false);
        assert!(store.get_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_product_is_a_conflict() {
        let product = Product::new("Widget", 10.0, 5);
        let store = InMemoryProductStore::with_products(vec![product.clone()]);
        assert!(matches!(
            store.add(product).await,
            Err(StoreError::Conflict { entity: "Product", .. })
        ));
    }

    #[tokio::test]
    async fn test_quantity_log_keeps_only_recent_updates() {
        let product = Product::new("Widget", 10.0, 0);
        let product_id = product.product_id;
        let store = InMemoryProductStore::with_products(vec![product]);

        for quantity in 0..(QUANTITY_LOG_CAPACITY as i32 + 10) {
            store.update_quantity(quantity, product_id).await.unwrap();
        }

        let updates = store.quantity_updates();
        assert_eq!(updates.len(), QUANTITY_LOG_CAPACITY);
        assert_eq!(updates.first(), Some(&(10, product_id)));
        assert_eq!(updates.last(), Some(&(QUANTITY_LOG_CAPACITY as i32 + 9, product_id)));
    }

    #[tokio::test]
    async fn test_stock_client_reads_available_quantity() {
        let mut product = Product::new("Widget", 10.0, 20);
        product.reservation = 5;
        let product_id = product.product_id;
        let store = InMemoryProductStore::with_products(vec![product]);
        let client = ProductStockClient::new(Arc::new(store));

        assert_eq!(client.get_available_stock(product_id).await.unwrap(), 15);
        assert_eq!(client.get_available_stock(Uuid::new_v4()).await.unwrap(), 0);
    }
}
