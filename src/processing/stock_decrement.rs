// src/processing/stock_decrement.rs
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, instrument, warn};

use crate::message::{OrderCreated, StockConfirmed};
use crate::models::OrderStatus;
use crate::rabbitmq::handler::HandlerError;
use crate::rabbitmq::publisher::publish_event;
use crate::rabbitmq::{EventPublisher, QueueTopology};
use crate::store::ProductStore;

/// Inventory side: apply an order's lines to stock and confirm each one.
pub struct ProcessStockDecrement {
    products: Arc<dyn ProductStore>,
    publisher: Arc<dyn EventPublisher>,
}

impl ProcessStockDecrement {
    pub fn new(products: Arc<dyn ProductStore>, publisher: Arc<dyn EventPublisher>) -> Self {
        Self {
            products,
            publisher,
        }
    }

    /// Decrements stock for every line and publishes one confirmation per line.
    ///
    /// Availability was checked when the order was accepted, so the decrement
    /// is applied as-is and may drive stock negative. Unknown products are
    /// logged and still confirmed, with no resulting stock level.
    #[instrument(skip(self, event), fields(order_id = %event.order_id, items = event.items.len()))]
    pub async fn execute(&self, event: OrderCreated) -> Result<Vec<StockConfirmed>, HandlerError> {
        let mut confirmations = Vec::with_capacity(event.items.len());

        for item in &event.items {
            let new_stock_quantity = match self.products.get_by_id(item.product_id).await? {
                Some(product) => {
                    let new_quantity = product
                        .stock_quantity
                        .checked_sub(item.quantity)
                        .ok_or_else(|| {
                            HandlerError::Failed(format!(
                                "stock of product {} overflows: {} - {}",
                                item.product_id, product.stock_quantity, item.quantity
                            ))
                        })?;
                    if new_quantity < 0 {
                        warn!(product_id = %item.product_id, new_quantity, "Stock went negative");
                    }
                    self.products
                        .update_quantity(new_quantity, item.product_id)
                        .await?;
                    debug!(
                        product_id = %item.product_id,
                        from = product.stock_quantity,
                        to = new_quantity,
                        "Stock decremented"
                    );
                    Some(new_quantity)
                }
                None => {
                    warn!(product_id = %item.product_id, "Product not found, skipping decrement");
                    None
                }
            };

            let confirmation = StockConfirmed {
                order_id: event.order_id,
                product_id: item.product_id,
                product_name: item.product_name.clone(),
                quantity_reserved: item.quantity,
                new_stock_quantity,
                confirmed_at: Utc::now(),
                status: OrderStatus::Confirmed,
            };

            publish_event(
                self.publisher.as_ref(),
                &confirmation,
                QueueTopology::stock_confirmed_publish(),
            )
            .await?;
            confirmations.push(confirmation);
        }

        info!(confirmed = confirmations.len(), "Stock decrement complete");
        Ok(confirmations)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::OrderCreatedItem;
    use crate::models::Product;
    use crate::rabbitmq::topology::{INVENTORY_EXCHANGE, STOCK_CONFIRMED_QUEUE};
    use crate::rabbitmq::RecordingPublisher;
    use crate::store::InMemoryProductStore;
    use uuid::Uuid;

    fn order_created(lines: &[(Uuid, &str, i32)]) -> OrderCreated {
        OrderCreated {
            order_id: Uuid::new_v4(),
            customer_id: "customer-1".to_string(),
            total_amount: 10.0,
            created_at: Utc::now(),
            items: lines
                .iter()
                .map(|(product_id, name, quantity)| OrderCreatedItem {
                    product_id: *product_id,
                    product_name: name.to_string(),
                    quantity: *quantity,
                    unit_price: 1.0,
                })
                .collect(),
        }
    }

    fn process(products: &InMemoryProductStore, publisher: &RecordingPublisher) -> ProcessStockDecrement {
        ProcessStockDecrement::new(Arc::new(products.clone()), Arc::new(publisher.clone()))
    }

    #[tokio::test]
    async fn test_single_line_updates_once_and_confirms_once() {
        let product = Product::new("Widget", 10.0, 20);
        let product_id = product.product_id;
        let products = InMemoryProductStore::with_products(vec![product]);
        let publisher = RecordingPublisher::new();

        process(&products, &publisher)
            .execute(order_created(&[(product_id, "Widget", 5)]))
            .await
            .unwrap();

        assert_eq!(products.quantity_updates(), vec![(15, product_id)]);
        let confirmations = publisher.events_of::<StockConfirmed>();
        assert_eq!(confirmations.len(), 1);
        assert_eq!(confirmations[0].product_id, product_id);
        assert_eq!(confirmations[0].quantity_reserved, 5);
        assert_eq!(confirmations[0].new_stock_quantity, Some(15));
        assert_eq!(confirmations[0].status, OrderStatus::Confirmed);
    }

    #[tokio::test]
    async fn test_confirmations_go_through_inventory_exchange() {
        let product = Product::new("Widget", 10.0, 20);
        let product_id = product.product_id;
        let products = InMemoryProductStore::with_products(vec![product]);
        let publisher = RecordingPublisher::new();

        process(&products, &publisher)
            .execute(order_created(&[(product_id, "Widget", 1)]))
            .await
            .unwrap();

        let published = publisher.published();
        assert_eq!(published[0].exchange(), INVENTORY_EXCHANGE);
        assert_eq!(published[0].topology.name, STOCK_CONFIRMED_QUEUE);
    }

    #[tokio::test]
    async fn test_stock_level_is_reported_per_product() {
        let widget = Product::new("Widget", 10.0, 20);
        let gadget = Product::new("Gadget", 5.0, 7);
        let (widget_id, gadget_id) = (widget.product_id, gadget.product_id);
        let products = InMemoryProductStore::with_products(vec![widget, gadget]);
        let publisher = RecordingPublisher::new();

        let confirmations = process(&products, &publisher)
            .execute(order_created(&[(widget_id, "Widget", 5), (gadget_id, "Gadget", 3)]))
            .await
            .unwrap();

        let levels: Vec<_> = confirmations.iter().map(|c| c.new_stock_quantity).collect();
        assert_eq!(levels, vec![Some(15), Some(4)]);
        assert_eq!(publisher.count(), 2);
    }

    #[tokio::test]
    async fn test_decrement_may_go_negative() {
        let product = Product::new("Widget", 10.0, 2);
        let product_id = product.product_id;
        let products = InMemoryProductStore::with_products(vec![product]);
        let publisher = RecordingPublisher::new();

        process(&products, &publisher)
            .execute(order_created(&[(product_id, "Widget", 5)]))
            .await
            .unwrap();

        assert_eq!(products.stock_of(product_id), Some(-3));
    }

    #[tokio::test]
    async fn test_decrement_out_of_range_fails_without_writing() {
        let product = Product::new("Widget", 10.0, -10);
        let product_id = product.product_id;
        let products = InMemoryProductStore::with_products(vec![product]);
        let publisher = RecordingPublisher::new();

        let result = process(&products, &publisher)
            .execute(order_created(&[(product_id, "Widget", i32::MAX)]))
            .await;

        assert!(matches!(result, Err(HandlerError::Failed(_))));
        assert!(products.quantity_updates().is_empty());
        assert_eq!(products.stock_of(product_id), Some(-10));
        assert_eq!(publisher.count(), 0);
    }

    #[tokio::test]
    async fn test_unknown_product_is_still_confirmed() {
        let products = InMemoryProductStore::new();
        let publisher = RecordingPublisher::new();
        let missing = Uuid::new_v4();

        let confirmations = process(&products, &publisher)
            .execute(order_created(&[(missing, "Ghost", 1)]))
            .await
            .unwrap();

        assert!(products.quantity_updates().is_empty());
        assert_eq!(confirmations.len(), 1);
        assert_eq!(confirmations[0].new_stock_quantity, None);
        assert_eq!(publisher.count(), 1);
    }

    #[tokio::test]
    async fn test_store_failure_is_returned_to_the_consumer() {
        let products = InMemoryProductStore::new();
        products.set_unavailable(true);
        let publisher = RecordingPublisher::new();

        let result = process(&products, &publisher)
            .execute(order_created(&[(Uuid::new_v4(), "Widget", 1)]))
            .await;

        assert!(matches!(result, Err(HandlerError::Store(_))));
        assert_eq!(publisher.count(), 0);
    }
}
