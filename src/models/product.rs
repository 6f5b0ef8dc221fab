// src/models/product.rs
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Inventory-side product. `stock_quantity` may go negative: the decrement
/// trusts the availability check done when the order was placed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub product_id: Uuid,
    pub name: String,
    pub description: String,
    pub price: f64,
    pub stock_quantity: i32,
    pub reservation: i32,
}

impl Product {
    pub fn new(name: &str, price: f64, stock_quantity: i32) -> Self {
        Self {
            product_id: Uuid::new_v4(),
            name: name.to_string(),
            description: String::new(),
            price,
            stock_quantity,
            reservation: 0,
        }
    }

    pub fn with_description(mut self, description: &str) -> Self {
        self.description = description.to_string();
        self
    }

    /// Stock not held by a reservation.
    pub fn available_quantity(&self) -> i32 {
        self.stock_quantity.saturating_sub(self.reservation)
    }
}
