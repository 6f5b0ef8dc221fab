// src/processing/order_confirmed.rs
use std::sync::Arc;

use tracing::{info, instrument};
use uuid::Uuid;

use super::UseCaseResult;
use crate::models::{Order, OrderStatus};
use crate::store::{OrderStore, StoreError};

/// Sales side: record the outcome the inventory side confirmed.
pub struct OrderConfirmedProcess {
    orders: Arc<dyn OrderStore>,
}

impl OrderConfirmedProcess {
    pub fn new(orders: Arc<dyn OrderStore>) -> Self {
        Self { orders }
    }

    /// Writes `status` onto the order. Store errors are returned as-is so the
    /// confirmation goes back to the queue; the order is not re-read.
    #[instrument(skip(self))]
    pub async fn handle_order(
        &self,
        order_id: Uuid,
        status: OrderStatus,
    ) -> Result<UseCaseResult<Option<Order>>, StoreError> {
        self.orders.update_status(order_id, status).await?;
        info!(status = ?status, "Order status updated");
        Ok(UseCaseResult::Success(None))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::OrderItem;
    use crate::store::InMemoryOrderStore;

    #[tokio::test]
    async fn test_confirmation_updates_status() {
        let orders = InMemoryOrderStore::new();
        let order = Order::new("customer-1", vec![OrderItem::new(Uuid::new_v4(), "Widget", 1, 5.0)]);
        let order_id = order.order_id;
        orders.add(order).await.unwrap();

        let process = OrderConfirmedProcess::new(Arc::new(orders.clone()));
        let result = process.handle_order(order_id, OrderStatus::Confirmed).await.unwrap();

        assert_eq!(result, UseCaseResult::Success(None));
        let stored = orders.get_by_id(order_id).await.unwrap().unwrap();
        assert_eq!(stored.status, OrderStatus::Confirmed);
    }

    #[tokio::test]
    async fn test_repeated_confirmation_is_harmless() {
        let orders = InMemoryOrderStore::new();
        let order = Order::new("customer-1", vec![OrderItem::new(Uuid::new_v4(), "Widget", 1, 5.0)]);
        let order_id = order.order_id;
        orders.add(order).await.unwrap();
        let process = OrderConfirmedProcess::new(Arc::new(orders.clone()));

        process.handle_order(order_id, OrderStatus::Confirmed).await.unwrap();
        process.handle_order(order_id, OrderStatus::Confirmed).await.unwrap();

        let stored = orders.get_by_id(order_id).await.unwrap().unwrap();
        assert_eq!(stored.status, OrderStatus::Confirmed);
    }

    #[tokio::test]
    async fn test_store_errors_propagate() {
        let orders = InMemoryOrderStore::new();
        let process = OrderConfirmedProcess::new(Arc::new(orders.clone()));

        let missing = process.handle_order(Uuid::new_v4(), OrderStatus::Confirmed).await;
        assert!(matches!(missing, Err(StoreError::NotFound { .. })));

        orders.set_unavailable(true);
        let offline = process.handle_order(Uuid::new_v4(), OrderStatus::Confirmed).await;
        assert!(matches!(offline, Err(StoreError::Unavailable(_))));
    }
}
