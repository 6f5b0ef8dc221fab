// src/models/order.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error, PartialEq)]
pub enum OrderError {
    #[error("Order id cannot be empty")]
    MissingId,

    #[error("Customer id cannot be empty")]
    MissingCustomer,

    #[error("Order {0} has no items")]
    NoItems(Uuid),

    #[error("Order total must be positive, got {0}")]
    NonPositiveTotal(f64),

    #[error("Item {product_id} has invalid quantity {quantity}")]
    InvalidQuantity { product_id: Uuid, quantity: i32 },

    #[error("Order {order_id} cannot move from {from:?} to {to:?}")]
    InvalidTransition {
        order_id: Uuid,
        from: OrderStatus,
        to: OrderStatus,
    },
}

/// Order lifecycle. Serialized as the variant name ("Created", "Confirmed", ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderStatus {
    Created,
    Confirmed,
    Cancelled,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderItem {
    pub product_id: Uuid,
    pub product_name: String,
    pub quantity: i32,
    pub unit_price: f64,
}

impl OrderItem {
    pub fn new(product_id: Uuid, product_name: &str, quantity: i32, unit_price: f64) -> Self {
        Self {
            product_id,
            product_name: product_name.to_string(),
            quantity,
            unit_price,
        }
    }

    pub fn line_total(&self) -> f64 {
        self.unit_price * self.quantity as f64
    }
}

/// Sales-side order aggregate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub order_id: Uuid,
    pub customer_id: String,
    pub items: Vec<OrderItem>,
    pub total_amount: f64,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
}

impl Order {
    /// New order in `Created` status with the total computed from its lines.
    pub fn new(customer_id: &str, items: Vec<OrderItem>) -> Self {
        let total_amount = items.iter().map(OrderItem::line_total).sum();
        Self {
            order_id: Uuid::new_v4(),
            customer_id: customer_id.to_string(),
            items,
            total_amount,
            status: OrderStatus::Created,
            created_at: Utc::now(),
        }
    }

    /// Structural invariants checked before any stock lookup.
    pub fn validate(&self) -> Result<(), OrderError> {
        if self.order_id.is_nil() {
            return Err(OrderError::MissingId);
        }
        if self.customer_id.trim().is_empty() {
            return Err(OrderError::MissingCustomer);
        }
        if self.items.is_empty() {
            return Err(OrderError::NoItems(self.order_id));
        }
        if let Some(item) = self.items.iter().find(|item| item.quantity <= 0) {
            return Err(OrderError::InvalidQuantity {
                product_id: item.product_id,
                quantity: item.quantity,
            });
        }
        if !(self.total_amount > 0.0) {
            return Err(OrderError::NonPositiveTotal(self.total_amount));
        }
        Ok(())
    }

    /// Explicit cancel. A confirmed order stays confirmed.
    pub fn cancel(&mut self) -> Result<(), OrderError> {
        match self.status {
            OrderStatus::Created | OrderStatus::Failed => {
                self.status = OrderStatus::Cancelled;
                Ok(())
            }
            OrderStatus::Cancelled => Ok(()),
            OrderStatus::Confirmed => Err(OrderError::InvalidTransition {
                order_id: self.order_id,
                from: self.status,
                to: OrderStatus::Cancelled,
            }),
        }
    }
}
