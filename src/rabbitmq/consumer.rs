// src/rabbitmq/consumer.rs
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use futures_lite::{FutureExt, StreamExt};
use lapin::{message::Delivery, options::*, types::FieldTable, Channel, Consumer};
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::codec;
use super::connection::BrokerConnection;
use super::errors::{MessagingError, Result};
use super::handler::HandlerFactory;
use super::topology::QueueTopology;
use crate::message::DomainEvent;

/// One unacknowledged message per consumer.
pub const PREFETCH_COUNT: u16 = 1;

/// What to tell the broker about a delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Ack,
    Reject { requeue: bool },
}

/// Runs one delivery body through decoding and the handler.
///
/// * undecodable body: rejected without requeue (dropped, there is no dead-letter queue)
/// * no handler in scope: rejected without requeue
/// * handler error or panic: rejected with requeue, so it is delivered again
/// * handler success: acknowledged
pub async fn decide<T: DomainEvent>(body: &[u8], factory: &HandlerFactory<T>) -> Disposition {
    let message: T = match codec::decode(body) {
        Ok(message) => message,
        Err(e) => {
            error!(message_type = T::TYPE_NAME, "Dropping poison message: {}", e);
            return Disposition::Reject { requeue: false };
        }
    };

    let handler = match factory() {
        Some(handler) => handler,
        None => {
            warn!(
                "{}",
                MessagingError::NoHandlerRegistered(T::TYPE_NAME.to_string())
            );
            return Disposition::Reject { requeue: false };
        }
    };

    // a panicking handler must not take the delivery loop down with it
    match AssertUnwindSafe(handler.handle(message)).catch_unwind().await {
        Ok(Ok(())) => Disposition::Ack,
        Ok(Err(e)) => {
            error!(
                message_type = T::TYPE_NAME,
                "{}, requeueing",
                MessagingError::HandlerFailed(e.to_string())
            );
            Disposition::Reject { requeue: true }
        }
        Err(panic) => {
            error!(
                message_type = T::TYPE_NAME,
                "{}, requeueing",
                MessagingError::HandlerFailed(format!("handler panicked: {}", panic_message(&*panic)))
            );
            Disposition::Reject { requeue: true }
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    panic
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| panic.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}

async fn settle(delivery: &Delivery, disposition: Disposition) {
    let outcome = match disposition {
        Disposition::Ack => delivery.ack(BasicAckOptions::default()).await,
        Disposition::Reject { requeue } => {
            delivery
                .nack(BasicNackOptions {
                    requeue,
                    ..BasicNackOptions::default()
                })
                .await
        }
    };
    if let Err(e) = outcome {
        error!("Failed to settle delivery {}: {}", delivery.delivery_tag, e);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumerStatus {
    Stopped,
    Starting,
    Running,
}

/// Lifecycle surface the supervisor drives.
#[async_trait]
pub trait ManagedConsumer: Send + Sync {
    fn queue_name(&self) -> &str;

    async fn start(&self) -> Result<()>;

    async fn stop(&self) -> Result<()>;

    async fn is_running(&self) -> bool;
}

struct ConsumerState {
    status: ConsumerStatus,
    channel: Option<Channel>,
    consumer_tag: Option<String>,
    shutdown: Option<watch::Sender<bool>>,
    task: Option<JoinHandle<()>>,
}

impl ConsumerState {
    fn is_live(&self) -> bool {
        self.status == ConsumerStatus::Running
            && self.task.as_ref().is_some_and(|task| !task.is_finished())
    }
}

/// Subscribes one queue to the handler for payload type `T`.
pub struct TypedConsumer<T: DomainEvent> {
    connection: Arc<BrokerConnection>,
    topology: QueueTopology,
    factory: HandlerFactory<T>,
    state: Mutex<ConsumerState>,
}

impl<T: DomainEvent> TypedConsumer<T> {
    pub fn new(
        connection: Arc<BrokerConnection>,
        topology: QueueTopology,
        factory: HandlerFactory<T>,
    ) -> Self {
        TypedConsumer {
            connection,
            topology,
            factory,
            state: Mutex::new(ConsumerState {
                status: ConsumerStatus::Stopped,
                channel: None,
                consumer_tag: None,
                shutdown: None,
                task: None,
            }),
        }
    }

    pub fn topology(&self) -> &QueueTopology {
        &self.topology
    }

    pub async fn status(&self) -> ConsumerStatus {
        let state = self.state.lock().await;
        if state.status == ConsumerStatus::Running && !state.is_live() {
            // the delivery loop ended on its own
            return ConsumerStatus::Stopped;
        }
        state.status
    }

    /// Opens a channel, declares topology, sets QoS and registers the consumer.
    async fn subscribe(&self) -> Result<(Channel, Consumer, String)> {
        let channel = self.connection.create_channel().await?;

        if let Err(e) = self.setup_channel(&channel).await {
            channel.close(200, "Consumer setup failed").await.ok();
            return Err(e);
        }

        let consumer_tag = format!("{}-{}", self.topology.name, Uuid::new_v4());
        let consumer = match channel
            .basic_consume(
                &self.topology.name,
                &consumer_tag,
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await
        {
            Ok(consumer) => consumer,
            Err(e) => {
                channel.close(200, "Consumer setup failed").await.ok();
                return Err(MessagingError::ChannelError(format!(
                    "Failed to register consumer: {}",
                    e
                )));
            }
        };

        Ok((channel, consumer, consumer_tag))
    }

    async fn setup_channel(&self, channel: &Channel) -> Result<()> {
        self.topology.declare(channel).await?;
        channel
            .basic_qos(PREFETCH_COUNT, BasicQosOptions::default())
            .await
            .map_err(|e| MessagingError::ChannelError(format!("Failed to set QoS: {}", e)))?;
        Ok(())
    }

    async fn release_channel(&self, state: &mut ConsumerState) -> Result<()> {
        let tag = state.consumer_tag.take();
        if let Some(channel) = state.channel.take() {
            if channel.status().connected() {
                if let Some(tag) = tag {
                    if let Err(e) = channel.basic_cancel(&tag, BasicCancelOptions::default()).await {
                        warn!(queue = %self.topology.name, "Failed to cancel consumer: {}", e);
                    }
                }
                channel
                    .close(200, "Consumer stopped")
                    .await
                    .map_err(|e| MessagingError::ChannelError(e.to_string()))?;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl<T: DomainEvent> ManagedConsumer for TypedConsumer<T> {
    fn queue_name(&self) -> &str {
        &self.topology.name
    }

    async fn start(&self) -> Result<()> {
        let mut state = self.state.lock().await;

        if state.is_live() {
            warn!(queue = %self.topology.name, "Consumer already running, ignoring start");
            return Ok(());
        }

        // a dead loop leaves its channel behind
        if state.channel.is_some() {
            if let Err(e) = self.release_channel(&mut state).await {
                debug!(queue = %self.topology.name, "Discarding stale channel: {}", e);
            }
        }
        state.task = None;
        state.shutdown = None;

        state.status = ConsumerStatus::Starting;
        let (channel, consumer, consumer_tag) = match self.subscribe().await {
            Ok(subscription) => subscription,
            Err(e) => {
                state.status = ConsumerStatus::Stopped;
                error!(queue = %self.topology.name, "Failed to start consumer: {}", e);
                return Err(e);
            }
        };

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(consume_loop(
            consumer,
            self.factory.clone(),
            shutdown_rx,
            self.topology.name.clone(),
        ));

        state.channel = Some(channel);
        state.consumer_tag = Some(consumer_tag);
        state.shutdown = Some(shutdown_tx);
        state.task = Some(task);
        state.status = ConsumerStatus::Running;

        info!(
            queue = %self.topology.name,
            message_type = T::TYPE_NAME,
            "Started consuming"
        );
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        let mut state = self.state.lock().await;

        if state.status == ConsumerStatus::Stopped {
            warn!(queue = %self.topology.name, "Consumer already stopped, ignoring stop");
            return Ok(());
        }

        if let Some(shutdown) = state.shutdown.take() {
            shutdown.send(true).ok();
        }
        // let an in-flight delivery settle before the channel goes away
        if let Some(task) = state.task.take() {
            if let Err(e) = task.await {
                warn!(queue = %self.topology.name, "Consumer task ended abnormally: {}", e);
            }
        }

        let closed = self.release_channel(&mut state).await;
        state.status = ConsumerStatus::Stopped;
        info!(queue = %self.topology.name, "Consumer stopped");
        closed
    }

    async fn is_running(&self) -> bool {
        self.state.lock().await.is_live()
    }
}

async fn consume_loop<T: DomainEvent>(
    mut consumer: Consumer,
    factory: HandlerFactory<T>,
    mut shutdown: watch::Receiver<bool>,
    queue: String,
) {
    loop {
        tokio::select! {
            _ = shutdown.changed() => {
                debug!(queue = %queue, "Shutdown signalled");
                break;
            }
            delivery = consumer.next() => match delivery {
                Some(Ok(delivery)) => {
                    let message_id = delivery
                        .properties
                        .message_id()
                        .as_ref()
                        .map(|id| id.as_str().to_string())
                        .unwrap_or_default();
                    debug!(
                        queue = %queue,
                        message_id = %message_id,
                        redelivered = delivery.redelivered,
                        "Received message"
                    );

                    let disposition = decide(&delivery.data, &factory).await;
                    settle(&delivery, disposition).await;
                }
                Some(Err(e)) => {
                    error!(queue = %queue, "Error receiving message: {}", e);
                    break;
                }
                None => {
                    warn!(queue = %queue, "Consumer stream ended");
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BrokerConfig;
    use crate::message::StockConfirmed;
    use crate::models::OrderStatus;
    use crate::rabbitmq::handler::{handler_fn, scoped, unregistered, HandlerError, MessageHandler};
    use chrono::Utc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn confirmation_body() -> Vec<u8> {
        codec::encode(&StockConfirmed {
            order_id: Uuid::new_v4(),
            product_id: Uuid::new_v4(),
            product_name: "Widget".to_string(),
            quantity_reserved: 1,
            new_stock_quantity: Some(9),
            confirmed_at: Utc::now(),
            status: OrderStatus::Confirmed,
        })
        .unwrap()
    }

    fn counting_factory(calls: Arc<AtomicUsize>, failures: usize) -> HandlerFactory<StockConfirmed> {
        scoped(move || {
            let calls = calls.clone();
            handler_fn(move |_: StockConfirmed| {
                let attempt = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if attempt < failures {
                        Err(HandlerError::Failed("store unavailable".to_string()))
                    } else {
                        Ok(())
                    }
                }
            })
        })
    }

    #[tokio::test]
    async fn test_poison_message_is_dropped_without_handler_call() {
        let calls = Arc::new(AtomicUsize::new(0));
        let factory = counting_factory(calls.clone(), 0);

        let disposition = decide(b"{not json", &factory).await;

        assert_eq!(disposition, Disposition::Reject { requeue: false });
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_missing_handler_drops_message() {
        let factory = unregistered::<StockConfirmed>();
        let disposition = decide(&confirmation_body(), &factory).await;
        assert_eq!(disposition, Disposition::Reject { requeue: false });
    }

    #[tokio::test]
    async fn test_failed_handler_requeues_then_acks_on_redelivery() {
        let calls = Arc::new(AtomicUsize::new(0));
        let factory = counting_factory(calls.clone(), 1);
        let body = confirmation_body();

        let first = decide(&body, &factory).await;
        let second = decide(&body, &factory).await;

        assert_eq!(first, Disposition::Reject { requeue: true });
        assert_eq!(second, Disposition::Ack);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    struct PanickingHandler;

    #[async_trait]
    impl MessageHandler<StockConfirmed> for PanickingHandler {
        async fn handle(&self, message: StockConfirmed) -> std::result::Result<(), HandlerError> {
            panic!("no order {}", message.order_id);
        }
    }

    #[tokio::test]
    async fn test_panicking_handler_is_requeued() {
        let factory: HandlerFactory<StockConfirmed> = scoped(|| PanickingHandler);
        let body = confirmation_body();

        // runs on its own task, the way the delivery loop does
        let outcome = tokio::spawn(async move { decide(&body, &factory).await }).await;

        assert_eq!(outcome.unwrap(), Disposition::Reject { requeue: true });
    }

    #[tokio::test]
    async fn test_success_acks() {
        let calls = Arc::new(AtomicUsize::new(0));
        let factory = counting_factory(calls.clone(), 0);
        assert_eq!(decide(&confirmation_body(), &factory).await, Disposition::Ack);
    }

    #[tokio::test]
    async fn test_upper_case_keys_and_lower_case_status_are_handled() {
        let calls = Arc::new(AtomicUsize::new(0));
        let factory = counting_factory(calls.clone(), 0);
        let body = br#"{
            "ORDERID": "6f1c1a9e-6a0e-4f57-9d0e-3b8a4c6e2f11",
            "PRODUCTID": "0b7f0d5e-5d6c-4c1e-8f3a-2a9b8c7d6e5f",
            "productName": "Widget",
            "quantityReserved": 1,
            "newStockQuantity": 9,
            "confirmedAt": "2024-05-01T10:00:00Z",
            "status": "confirmed"
        }"#;

        assert_eq!(decide(body, &factory).await, Disposition::Ack);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    fn offline_consumer() -> TypedConsumer<StockConfirmed> {
        let connection = Arc::new(BrokerConnection::new(BrokerConfig {
            host: "127.0.0.1".to_string(),
            port: 9,
            connection_timeout_ms: 500,
            ..BrokerConfig::default()
        }));
        TypedConsumer::new(
            connection,
            QueueTopology::stock_confirmed(),
            unregistered::<StockConfirmed>(),
        )
    }

    #[tokio::test]
    async fn test_stop_while_stopped_is_a_no_op() {
        let consumer = offline_consumer();
        assert!(consumer.stop().await.is_ok());
        assert_eq!(consumer.status().await, ConsumerStatus::Stopped);
    }

    #[tokio::test]
    async fn test_failed_start_returns_to_stopped() {
        let consumer = offline_consumer();

        let err = consumer.start().await.unwrap_err();

        assert!(matches!(err, MessagingError::BrokerUnreachable(_)));
        assert_eq!(consumer.status().await, ConsumerStatus::Stopped);
        assert!(!consumer.is_running().await);
        assert_eq!(consumer.queue_name(), "inventory-stock-update-confirmed");
    }
}
