// src/rabbitmq/publisher.rs
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use lapin::{
    options::*,
    publisher_confirm::Confirmation,
    types::{AMQPValue, FieldTable},
    BasicProperties, Channel,
};
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use super::codec;
use super::connection::BrokerConnection;
use super::errors::{MessagingError, Result};
use super::topology::{QueueTopology, ORDER_CREATED_ROUTING_KEY, ORDER_EXCHANGE};
use crate::message::{DomainEvent, Envelope};

pub const MESSAGE_TYPE_HEADER: &str = "x-message-type";

/// An encoded event plus where it goes.
#[derive(Clone, Debug)]
pub struct PublishRequest {
    pub topology: QueueTopology,
    pub envelope: Envelope,
    pub body: Vec<u8>,
}

impl PublishRequest {
    pub fn new<T: DomainEvent>(event: &T, topology: QueueTopology) -> Result<Self> {
        Ok(PublishRequest {
            topology,
            envelope: Envelope::for_event::<T>(),
            body: codec::encode(event)?,
        })
    }

    /// Exchange to publish on; the default exchange routes by queue name.
    pub fn exchange(&self) -> &str {
        self.topology.binding().map(|(exchange, _)| exchange).unwrap_or("")
    }

    pub fn routing_key(&self) -> &str {
        self.topology
            .binding()
            .map(|(_, routing_key)| routing_key)
            .unwrap_or(&self.topology.name)
    }

    fn properties(&self) -> BasicProperties {
        let mut headers = FieldTable::default();
        headers.insert(
            MESSAGE_TYPE_HEADER.into(),
            AMQPValue::LongString(self.envelope.message_type.clone().into()),
        );

        BasicProperties::default()
            .with_message_id(self.envelope.message_id.to_string().into())
            .with_content_type(self.envelope.content_type.into())
            .with_timestamp(self.envelope.timestamp.timestamp() as u64)
            .with_type(self.envelope.message_type.clone().into())
            .with_delivery_mode(if self.envelope.persistent { 2 } else { 1 })
            .with_headers(headers)
    }
}

/// Seam between use cases and the broker.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Returns once the broker has accepted the frame.
    async fn publish(&self, request: PublishRequest) -> Result<()>;
}

/// Encodes `event` and publishes it to `topology`, returning the message id.
pub async fn publish_event<T: DomainEvent>(
    publisher: &dyn EventPublisher,
    event: &T,
    topology: QueueTopology,
) -> Result<Uuid> {
    let request = PublishRequest::new(event, topology)?;
    let message_id = request.envelope.message_id;
    publisher.publish(request).await?;
    Ok(message_id)
}

/// Publishes on a fresh confirm-mode channel per call.
pub struct Publisher {
    connection: Arc<BrokerConnection>,
}

impl Publisher {
    pub fn new(connection: Arc<BrokerConnection>) -> Self {
        Publisher { connection }
    }

    /// Publishes `message` to `queue_name` bound on `exchange`/`routing_key`.
    pub async fn publish_to<T: DomainEvent>(
        &self,
        message: &T,
        exchange: &str,
        routing_key: &str,
        queue_name: &str,
    ) -> Result<Uuid> {
        let topology = QueueTopology::bound(queue_name, exchange, routing_key);
        publish_event(self, message, topology).await
    }

    async fn publish_on(&self, channel: &Channel, request: &PublishRequest) -> Result<()> {
        request.topology.declare(channel).await.map_err(into_publish_error)?;

        channel
            .confirm_select(ConfirmSelectOptions::default())
            .await
            .map_err(|e| MessagingError::PublishFailed(format!("Failed to enable confirms: {}", e)))?;

        let confirmation = channel
            .basic_publish(
                request.exchange(),
                request.routing_key(),
                BasicPublishOptions::default(),
                &request.body,
                request.properties(),
            )
            .await
            .map_err(|e| MessagingError::PublishFailed(e.to_string()))?
            .await
            .map_err(|e| MessagingError::PublishFailed(e.to_string()))?;

        match confirmation {
            Confirmation::Nack(_) => Err(MessagingError::PublishFailed(format!(
                "broker rejected message {}",
                request.envelope.message_id
            ))),
            _ => Ok(()),
        }
    }
}

#[async_trait]
impl EventPublisher for Publisher {
    #[instrument(skip(self, request), fields(
        message_id = %request.envelope.message_id,
        message_type = %request.envelope.message_type,
        queue = %request.topology.name,
    ))]
    async fn publish(&self, request: PublishRequest) -> Result<()> {
        let channel = self.connection.create_channel().await.map_err(into_publish_error)?;

        let result = self.publish_on(&channel, &request).await;

        if let Err(e) = channel.close(200, "Publish complete").await {
            warn!("Failed to close publish channel: {}", e);
        }

        match &result {
            Ok(()) => info!(
                "Published message to exchange '{}' with routing key '{}'",
                request.exchange(),
                request.routing_key()
            ),
            Err(e) => error!("Publish failed: {}", e),
        }
        result
    }
}

// Connection and topology failures keep their identity; everything else is a failed publish.
fn into_publish_error(error: MessagingError) -> MessagingError {
    match error {
        MessagingError::BrokerUnreachable(_)
        | MessagingError::ConnectionClosed(_)
        | MessagingError::TopologyConflict(_) => error,
        other => MessagingError::PublishFailed(other.to_string()),
    }
}

/// Producer for events that name their own queue. Every such event goes
/// through `order-exchange` with routing key `order.created`.
pub struct GenericEventProducer {
    publisher: Arc<dyn EventPublisher>,
}

impl GenericEventProducer {
    pub fn new(publisher: Arc<dyn EventPublisher>) -> Self {
        GenericEventProducer { publisher }
    }

    pub async fn produce<T: DomainEvent>(&self, event: &T) -> Result<Uuid> {
        let queue_name = T::queue_name()
            .ok_or_else(|| MessagingError::UnsupportedEventType(T::TYPE_NAME.to_string()))?;
        debug!(queue = %queue_name, message_type = T::TYPE_NAME, "Producing event");

        let topology = QueueTopology::bound(queue_name, ORDER_EXCHANGE, ORDER_CREATED_ROUTING_KEY);
        publish_event(self.publisher.as_ref(), event, topology).await
    }
}

/// In-memory publisher that records every request; can be told to fail.
#[derive(Clone, Default)]
pub struct RecordingPublisher {
    published: Arc<Mutex<Vec<PublishRequest>>>,
    failing: Arc<Mutex<bool>>,
}

impl RecordingPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        *self.failing.lock().unwrap_or_else(PoisonError::into_inner) = failing;
    }

    pub fn published(&self) -> Vec<PublishRequest> {
        self.published
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn count(&self) -> usize {
        self.published.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Decodes every recorded payload tagged as `T`.
    pub fn events_of<T: DomainEvent>(&self) -> Vec<T> {
        self.published()
            .iter()
            .filter(|request| request.envelope.message_type == T::TYPE_NAME)
            .filter_map(|request| codec::decode(&request.body).ok())
            .collect()
    }
}

#[async_trait]
impl EventPublisher for RecordingPublisher {
    async fn publish(&self, request: PublishRequest) -> Result<()> {
        if *self.failing.lock().unwrap_or_else(PoisonError::into_inner) {
            return Err(MessagingError::PublishFailed("publisher set to fail".to_string()));
        }
        self.published
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(request);
        Ok(())
    }
}
