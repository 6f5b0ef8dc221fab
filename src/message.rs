use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{Order, OrderItem, OrderStatus};
use crate::rabbitmq::topology::{ORDER_CREATED_QUEUE, STOCK_CONFIRMED_QUEUE};

/// A payload that travels over the broker.
pub trait DomainEvent: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Type tag written to the AMQP `type` property.
    const TYPE_NAME: &'static str;

    /// Queue this event type is addressed to, when it declares one.
    fn queue_name() -> Option<&'static str> {
        None
    }
}

/// Delivery metadata attached to every published payload.
#[derive(Clone, Debug, PartialEq)]
pub struct Envelope {
    pub message_id: Uuid,
    pub message_type: String,
    pub timestamp: DateTime<Utc>,
    pub persistent: bool,
    pub content_type: &'static str,
}

impl Envelope {
    pub const CONTENT_TYPE: &'static str = "application/json";

    /// Creates envelope metadata with a fresh UUID and the current timestamp.
    pub fn for_event<T: DomainEvent>() -> Self {
        Envelope {
            message_id: Uuid::new_v4(),
            message_type: T::TYPE_NAME.to_string(),
            timestamp: Utc::now(),
            persistent: true,
            content_type: Self::CONTENT_TYPE,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderCreatedItem {
    pub product_id: Uuid,
    pub product_name: String,
    pub quantity: i32,
    pub unit_price: f64,
}

/// Emitted once per successfully persisted order.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderCreated {
    pub order_id: Uuid,
    pub customer_id: String,
    pub total_amount: f64,
    pub created_at: DateTime<Utc>,
    pub items: Vec<OrderCreatedItem>,
}

impl OrderCreated {
    pub fn from_order(order: &Order) -> Self {
        OrderCreated {
            order_id: order.order_id,
            customer_id: order.customer_id.clone(),
            total_amount: order.total_amount,
            created_at: order.created_at,
            items: order.items.iter().map(OrderCreatedItem::from).collect(),
        }
    }
}

impl From<&OrderItem> for OrderCreatedItem {
    fn from(item: &OrderItem) -> Self {
        OrderCreatedItem {
            product_id: item.product_id,
            product_name: item.product_name.clone(),
            quantity: item.quantity,
            unit_price: item.unit_price,
        }
    }
}

impl DomainEvent for OrderCreated {
    const TYPE_NAME: &'static str = "OrderCreated";

    fn queue_name() -> Option<&'static str> {
        Some(ORDER_CREATED_QUEUE)
    }
}

/// One per order line, emitted by the inventory side after the decrement.
///
/// `new_stock_quantity` is the product's stock after this line was applied,
/// or `None` when the product was unknown to inventory.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StockConfirmed {
    pub order_id: Uuid,
    pub product_id: Uuid,
    pub product_name: String,
    pub quantity_reserved: i32,
    pub new_stock_quantity: Option<i32>,
    pub confirmed_at: DateTime<Utc>,
    pub status: OrderStatus,
}

impl DomainEvent for StockConfirmed {
    const TYPE_NAME: &'static str = "StockConfirmed";

    fn queue_name() -> Option<&'static str> {
        Some(STOCK_CONFIRMED_QUEUE)
    }
}
