// src/processing/mod.rs
// Order fulfillment choreography: the reactions each boundary runs on its events

mod handlers;
mod order_confirmed;
mod order_process;
mod stock_decrement;

pub use handlers::{order_created_handlers, stock_confirmed_handlers, OrderCreatedHandler, StockConfirmedHandler};
pub use order_confirmed::OrderConfirmedProcess;
pub use order_process::OrderProcess;
pub use stock_decrement::ProcessStockDecrement;

/// Outcome of a use case that reports failure as a value.
#[derive(Debug, Clone, PartialEq)]
pub enum UseCaseResult<T> {
    Success(T),
    Fail(String),
}

impl<T> UseCaseResult<T> {
    pub fn is_success(&self) -> bool {
        matches!(self, UseCaseResult::Success(_))
    }

    pub fn success(self) -> Option<T> {
        match self {
            UseCaseResult::Success(value) => Some(value),
            UseCaseResult::Fail(_) => None,
        }
    }

    pub fn failure(&self) -> Option<&str> {
        match self {
            UseCaseResult::Success(_) => None,
            UseCaseResult::Fail(reason) => Some(reason),
        }
    }
}
