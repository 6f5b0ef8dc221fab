// src/processing/handlers.rs
// Message handlers wiring consumed events to the use cases

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use super::{OrderConfirmedProcess, ProcessStockDecrement, UseCaseResult};
use crate::message::{OrderCreated, StockConfirmed};
use crate::rabbitmq::handler::{scoped, HandlerError, HandlerFactory, MessageHandler};
use crate::rabbitmq::EventPublisher;
use crate::store::{OrderStore, ProductStore};

pub struct OrderCreatedHandler {
    process: ProcessStockDecrement,
}

impl OrderCreatedHandler {
    pub fn new(products: Arc<dyn ProductStore>, publisher: Arc<dyn EventPublisher>) -> Self {
        Self {
            process: ProcessStockDecrement::new(products, publisher),
        }
    }
}

#[async_trait]
impl MessageHandler<OrderCreated> for OrderCreatedHandler {
    async fn handle(&self, message: OrderCreated) -> Result<(), HandlerError> {
        debug!(order_id = %message.order_id, "Handling OrderCreated");
        self.process.execute(message).await.map(|_| ())
    }
}

pub struct StockConfirmedHandler {
    process: OrderConfirmedProcess,
}

impl StockConfirmedHandler {
    pub fn new(orders: Arc<dyn OrderStore>) -> Self {
        Self {
            process: OrderConfirmedProcess::new(orders),
        }
    }
}

#[async_trait]
impl MessageHandler<StockConfirmed> for StockConfirmedHandler {
    async fn handle(&self, message: StockConfirmed) -> Result<(), HandlerError> {
        debug!(order_id = %message.order_id, product_id = %message.product_id, "Handling StockConfirmed");
        match self.process.handle_order(message.order_id, message.status).await? {
            UseCaseResult::Success(_) => Ok(()),
            UseCaseResult::Fail(reason) => Err(HandlerError::Failed(reason)),
        }
    }
}

/// A fresh [`OrderCreatedHandler`] per delivery.
pub fn order_created_handlers(
    products: Arc<dyn ProductStore>,
    publisher: Arc<dyn EventPublisher>,
) -> HandlerFactory<OrderCreated> {
    scoped(move || OrderCreatedHandler::new(products.clone(), publisher.clone()))
}

/// A fresh [`StockConfirmedHandler`] per delivery.
pub fn stock_confirmed_handlers(orders: Arc<dyn OrderStore>) -> HandlerFactory<StockConfirmed> {
    scoped(move || StockConfirmedHandler::new(orders.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::OrderCreatedItem;
    use crate::models::{Order, OrderItem, OrderStatus, Product};
    use crate::rabbitmq::codec;
    use crate::rabbitmq::consumer::decide;
    use crate::rabbitmq::{Disposition, RecordingPublisher};
    use crate::store::{InMemoryOrderStore, InMemoryProductStore};
    use chrono::Utc;
    use uuid::Uuid;

    #[tokio::test]
    async fn test_order_created_delivery_is_acked() {
        let product = Product::new("Widget", 10.0, 20);
        let product_id = product.product_id;
        let products = InMemoryProductStore::with_products(vec![product]);
        let publisher = RecordingPublisher::new();
        let factory = order_created_handlers(Arc::new(products.clone()), Arc::new(publisher.clone()));

        let event = OrderCreated {
            order_id: Uuid::new_v4(),
            customer_id: "customer-1".to_string(),
            total_amount: 50.0,
            created_at: Utc::now(),
            items: vec![OrderCreatedItem {
                product_id,
                product_name: "Widget".to_string(),
                quantity: 5,
                unit_price: 10.0,
            }],
        };
        let body = codec::encode(&event).unwrap();

        assert_eq!(decide(&body, &factory).await, Disposition::Ack);
        assert_eq!(products.stock_of(product_id), Some(15));
        assert_eq!(publisher.events_of::<StockConfirmed>().len(), 1);
    }

    #[tokio::test]
    async fn test_confirmation_for_unknown_order_is_requeued() {
        let orders = InMemoryOrderStore::new();
        let factory = stock_confirmed_handlers(Arc::new(orders));

        let event = StockConfirmed {
            order_id: Uuid::new_v4(),
            product_id: Uuid::new_v4(),
            product_name: "Widget".to_string(),
            quantity_reserved: 1,
            new_stock_quantity: Some(4),
            confirmed_at: Utc::now(),
            status: OrderStatus::Confirmed,
        };
        let body = codec::encode(&event).unwrap();

        assert_eq!(decide(&body, &factory).await, Disposition::Reject { requeue: true });
    }

    #[tokio::test]
    async fn test_confirmation_updates_order() {
        let orders = InMemoryOrderStore::new();
        let order = Order::new("customer-1", vec![OrderItem::new(Uuid::new_v4(), "Widget", 1, 5.0)]);
        let order_id = order.order_id;
        orders.add(order).await.unwrap();
        let factory = stock_confirmed_handlers(Arc::new(orders.clone()));

        let handler = (factory)().unwrap();
        handler
            .handle(StockConfirmed {
                order_id,
                product_id: Uuid::new_v4(),
                product_name: "Widget".to_string(),
                quantity_reserved: 1,
                new_stock_quantity: Some(4),
                confirmed_at: Utc::now(),
                status: OrderStatus::Confirmed,
            })
            .await
            .unwrap();

        let stored = orders.get_by_id(order_id).await.unwrap().unwrap();
        assert_eq!(stored.status, OrderStatus::Confirmed);
    }
}
