// src/rabbitmq/topology.rs
use lapin::{options::*, types::FieldTable, Channel, ExchangeKind};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::errors::{MessagingError, Result};

pub const ORDER_EXCHANGE: &str = "order-exchange";
pub const ORDER_CREATED_ROUTING_KEY: &str = "order.created";
pub const ORDER_CREATED_QUEUE: &str = "order-created-queue";
pub const STOCK_CONFIRMED_QUEUE: &str = "inventory-stock-update-confirmed";
pub const INVENTORY_EXCHANGE: &str = "inventory-exchange";
pub const STOCK_CONFIRMED_ROUTING_KEY: &str = "inventory.stock.confirmed";

/// Queue, exchange and binding a publisher or consumer relies on.
///
/// A topology without an exchange is a "direct" queue: it is declared on its
/// own and left unbound, which lets us consume queues owned by other services.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueTopology {
    pub name: String,
    #[serde(default)]
    pub exchange: Option<String>,
    #[serde(default)]
    pub routing_key: Option<String>,
    #[serde(default = "default_durable")]
    pub durable: bool,
    #[serde(default)]
    pub auto_delete: bool,
    #[serde(default)]
    pub exclusive: bool,
}

fn default_durable() -> bool {
    true
}

impl QueueTopology {
    pub fn bound(name: &str, exchange: &str, routing_key: &str) -> Self {
        Self {
            name: name.to_string(),
            exchange: Some(exchange.to_string()),
            routing_key: Some(routing_key.to_string()),
            durable: true,
            auto_delete: false,
            exclusive: false,
        }
    }

    pub fn direct(name: &str) -> Self {
        Self {
            name: name.to_string(),
            exchange: None,
            routing_key: None,
            durable: true,
            auto_delete: false,
            exclusive: false,
        }
    }

    /// `order-created-queue` bound to `order-exchange` on `order.created`.
    pub fn order_created() -> Self {
        Self::bound(ORDER_CREATED_QUEUE, ORDER_EXCHANGE, ORDER_CREATED_ROUTING_KEY)
    }

    /// Confirmation queue, consumed without an exchange binding.
    pub fn stock_confirmed() -> Self {
        Self::direct(STOCK_CONFIRMED_QUEUE)
    }

    /// How the inventory side publishes confirmations: through its own
    /// exchange, bound to the same durable queue the sales side consumes directly.
    pub fn stock_confirmed_publish() -> Self {
        Self::bound(STOCK_CONFIRMED_QUEUE, INVENTORY_EXCHANGE, STOCK_CONFIRMED_ROUTING_KEY)
    }

    /// The exchange/routing key pair when the queue is bound.
    pub fn binding(&self) -> Option<(&str, &str)> {
        match (self.exchange.as_deref(), self.routing_key.as_deref()) {
            (Some(exchange), Some(routing_key)) if !exchange.is_empty() => {
                Some((exchange, routing_key))
            }
            _ => None,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(MessagingError::TopologyConflict(
                "queue name cannot be empty".to_string(),
            ));
        }
        let has_exchange = self.exchange.as_deref().is_some_and(|e| !e.is_empty());
        let has_key = self.routing_key.is_some();
        if has_exchange != has_key {
            return Err(MessagingError::TopologyConflict(format!(
                "queue '{}' needs both an exchange and a routing key, or neither",
                self.name
            )));
        }
        Ok(())
    }

    /// Declares exchange, queue and binding on `channel`.
    ///
    /// Repeating a declare with identical parameters is a no-op on the broker;
    /// a mismatch surfaces as [`MessagingError::TopologyConflict`].
    pub async fn declare(&self, channel: &Channel) -> Result<()> {
        self.validate()?;

        if let Some((exchange, _)) = self.binding() {
            channel
                .exchange_declare(
                    exchange,
                    ExchangeKind::Direct,
                    ExchangeDeclareOptions {
                        durable: true,
                        ..ExchangeDeclareOptions::default()
                    },
                    FieldTable::default(),
                )
                .await?;
            debug!(exchange = %exchange, "Exchange declared");
        }

        let queue = channel
            .queue_declare(
                &self.name,
                QueueDeclareOptions {
                    durable: self.durable,
                    exclusive: self.exclusive,
                    auto_delete: self.auto_delete,
                    ..QueueDeclareOptions::default()
                },
                FieldTable::default(),
            )
            .await?;

        info!(
            queue = %self.name,
            messages = queue.message_count(),
            consumers = queue.consumer_count(),
            "Queue declared"
        );

        if let Some((exchange, routing_key)) = self.binding() {
            channel
                .queue_bind(
                    &self.name,
                    exchange,
                    routing_key,
                    QueueBindOptions::default(),
                    FieldTable::default(),
                )
                .await?;
            debug!(queue = %self.name, exchange = %exchange, routing_key = %routing_key, "Queue bound");
        }

        Ok(())
    }
}
