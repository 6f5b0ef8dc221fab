// src/models/mod.rs
mod order;
mod product;

pub use order::{Order, OrderError, OrderItem, OrderStatus};
pub use product::Product;
