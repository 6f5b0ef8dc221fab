// src/processing/order_process.rs
use std::sync::Arc;

use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use super::UseCaseResult;
use crate::message::OrderCreated;
use crate::models::{Order, OrderStatus};
use crate::rabbitmq::GenericEventProducer;
use crate::store::{OrderStore, StockClient};

/// Sales side: accept an order, check stock, persist it, announce it.
pub struct OrderProcess {
    orders: Arc<dyn OrderStore>,
    stock: Arc<dyn StockClient>,
    producer: GenericEventProducer,
}

impl OrderProcess {
    pub fn new(
        orders: Arc<dyn OrderStore>,
        stock: Arc<dyn StockClient>,
        producer: GenericEventProducer,
    ) -> Self {
        Self {
            orders,
            stock,
            producer,
        }
    }

    #[instrument(skip(self, order), fields(order_id = %order.order_id))]
    pub async fn handle_order(&self, order: Order) -> UseCaseResult<Order> {
        if let Err(e) = order.validate() {
            warn!("Rejecting invalid order: {}", e);
            return UseCaseResult::Fail(e.to_string());
        }

        // first insufficient line rejects the whole order, nothing is reserved
        for item in &order.items {
            match self.stock.get_available_stock(item.product_id).await {
                Ok(available) if available < item.quantity => {
                    warn!(
                        product_id = %item.product_id,
                        requested = item.quantity,
                        available,
                        "Insufficient stock"
                    );
                    return UseCaseResult::Fail(format!(
                        "Insufficient stock for product {}: requested {}, available {}",
                        item.product_id, item.quantity, available
                    ));
                }
                Ok(_) => {}
                Err(e) => {
                    error!(product_id = %item.product_id, "Stock check failed: {}", e);
                    return UseCaseResult::Fail(format!("Stock check failed: {}", e));
                }
            }
        }

        if let Err(e) = self.orders.add(order.clone()).await {
            error!("Failed to persist order: {}", e);
            return UseCaseResult::Fail(format!("Failed to persist order: {}", e));
        }

        let event = OrderCreated::from_order(&order);
        match self.producer.produce(&event).await {
            Ok(message_id) => {
                info!(message_id = %message_id, items = event.items.len(), "Order created and announced");
                UseCaseResult::Success(order)
            }
            Err(e) => {
                error!("Order persisted but OrderCreated was not published: {}", e);
                // leave a visible trace instead of a silent Created order nobody will confirm
                if let Err(store_err) = self
                    .orders
                    .update_status(order.order_id, OrderStatus::Failed)
                    .await
                {
                    error!("Failed to mark unannounced order as Failed: {}", store_err);
                }
                UseCaseResult::Fail(format!("Failed to publish OrderCreated: {}", e))
            }
        }
    }

    /// Explicit cancel requested by the customer.
    #[instrument(skip(self))]
    pub async fn cancel_order(&self, order_id: Uuid) -> UseCaseResult<Order> {
        let mut order = match self.orders.get_by_id(order_id).await {
            Ok(Some(order)) => order,
            Ok(None) => return UseCaseResult::Fail(format!("Order {} not found", order_id)),
            Err(e) => return UseCaseResult::Fail(e.to_string()),
        };

        if let Err(e) = order.cancel() {
            return UseCaseResult::Fail(e.to_string());
        }

        match self.orders.update(order.clone()).await {
            Ok(()) => {
                info!("Order cancelled");
                UseCaseResult::Success(order)
            }
            Err(e) => UseCaseResult::Fail(e.to_string()),
        }
    }
}
