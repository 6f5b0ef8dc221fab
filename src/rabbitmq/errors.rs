// src/rabbitmq/errors.rs

use lapin::Error as LapinError;
use serde_json::Error as SerdeError;
use thiserror::Error;
use tokio::time::error::Elapsed;

#[derive(Debug, Error)]
pub enum MessagingError {
    #[error("RabbitMQ broker unreachable: {0}")]
    BrokerUnreachable(String),

    #[error("RabbitMQ connection closed: {0}")]
    ConnectionClosed(String),

    #[error("RabbitMQ channel error: {0}")]
    ChannelError(String),

    /// A declare was repeated with parameters that differ from the existing entity.
    #[error("Topology conflict: {0}")]
    TopologyConflict(String),

    #[error("RabbitMQ publish failed: {0}")]
    PublishFailed(String),

    #[error("Message serialization error: {0}")]
    Serialization(#[from] SerdeError),

    #[error("Message deserialization failed: {0}")]
    DeserializationFailed(String),

    #[error("No handler registered for {0}")]
    NoHandlerRegistered(String),

    #[error("Handler failed: {0}")]
    HandlerFailed(String),

    #[error("Event type {0} does not expose a queue name")]
    UnsupportedEventType(String),

    #[error("Operation timed out: {0}")]
    Timeout(String),
}

// Custom Result type for messaging operations
pub type Result<T> = std::result::Result<T, MessagingError>;

impl MessagingError {
    /// Whether retrying the same operation later could succeed. A closed
    /// connection is final: it was disposed or will not be recovered.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            MessagingError::BrokerUnreachable(_)
                | MessagingError::ChannelError(_)
                | MessagingError::Timeout(_)
        )
    }
}

// Converting from lapin errors
impl From<LapinError> for MessagingError {
    fn from(error: LapinError) -> Self {
        // lapin reports broker-side failures as text; classify on it
        let error_text = error.to_string();
        let lowered = error_text.to_lowercase();

        if error_text.contains("PRECONDITION_FAILED") || lowered.contains("inequivalent arg") {
            MessagingError::TopologyConflict(error_text)
        } else if lowered.contains("connection")
            || lowered.contains("io error")
            || lowered.contains("refused")
        {
            MessagingError::BrokerUnreachable(error_text)
        } else if lowered.contains("channel") {
            MessagingError::ChannelError(error_text)
        } else {
            MessagingError::PublishFailed(error_text)
        }
    }
}

impl From<Elapsed> for MessagingError {
    fn from(_: Elapsed) -> Self {
        MessagingError::Timeout("broker did not answer in time".to_string())
    }
}
