// src/rabbitmq/mod.rs
// RabbitMQ messaging layer: connection, publishing, typed consumers, supervision

pub mod errors;
pub mod connection;
pub mod topology;
pub mod codec;
pub mod publisher;
pub mod handler;
pub mod consumer;
pub mod registry;
pub mod supervisor;

// Re-export specific items to simplify imports elsewhere
pub use connection::BrokerConnection;
pub use consumer::{ConsumerStatus, Disposition, ManagedConsumer, TypedConsumer};
pub use errors::{MessagingError, Result};
pub use handler::{HandlerError, HandlerFactory, MessageHandler};
pub use publisher::{EventPublisher, GenericEventProducer, Publisher, PublishRequest, RecordingPublisher};
pub use registry::ConsumerRegistry;
pub use supervisor::ConsumerSupervisor;
pub use topology::QueueTopology;
