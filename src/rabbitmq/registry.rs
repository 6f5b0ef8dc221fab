// src/rabbitmq/registry.rs
use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use super::connection::BrokerConnection;
use super::consumer::{ManagedConsumer, TypedConsumer};
use super::handler::HandlerFactory;
use super::topology::QueueTopology;
use crate::message::DomainEvent;

/// Builds the consumer for one configured queue.
pub type ConsumerBuilder = Box<dyn Fn(QueueTopology) -> Arc<dyn ManagedConsumer> + Send + Sync>;

/// Dispatch table from queue name to the typed consumer for that queue.
/// One queue, one payload type.
#[derive(Default)]
pub struct ConsumerRegistry {
    builders: HashMap<String, ConsumerBuilder>,
}

impl ConsumerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Maps `queue_name` to a `TypedConsumer<T>` driven by `factory`.
    pub fn register<T: DomainEvent>(
        &mut self,
        queue_name: &str,
        connection: Arc<BrokerConnection>,
        factory: HandlerFactory<T>,
    ) -> &mut Self {
        self.register_builder(
            queue_name,
            Box::new(move |topology| {
                Arc::new(TypedConsumer::<T>::new(
                    connection.clone(),
                    topology,
                    factory.clone(),
                )) as Arc<dyn ManagedConsumer>
            }),
        )
    }

    /// Registers `T` under the queue the event type names for itself.
    /// Event types without a queue name are left out.
    pub fn register_event<T: DomainEvent>(
        &mut self,
        connection: Arc<BrokerConnection>,
        factory: HandlerFactory<T>,
    ) -> &mut Self {
        match T::queue_name() {
            Some(queue_name) => self.register(queue_name, connection, factory),
            None => {
                debug!(message_type = T::TYPE_NAME, "Event type names no queue, not registered");
                self
            }
        }
    }

    pub fn register_builder(&mut self, queue_name: &str, builder: ConsumerBuilder) -> &mut Self {
        debug!(queue = %queue_name, "Registering consumer");
        self.builders.insert(queue_name.to_string(), builder);
        self
    }

    pub fn contains(&self, queue_name: &str) -> bool {
        self.builders.contains_key(queue_name)
    }

    /// Consumer for `topology`, if its queue is registered.
    pub fn build(&self, topology: &QueueTopology) -> Option<Arc<dyn ManagedConsumer>> {
        self.builders
            .get(&topology.name)
            .map(|builder| builder(topology.clone()))
    }

    pub fn len(&self) -> usize {
        self.builders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.builders.is_empty()
    }
}
