// src/rabbitmq/handler.rs
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use super::errors::MessagingError;
use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Messaging error: {0}")]
    Messaging(#[from] MessagingError),

    #[error("{0}")]
    Failed(String),
}

/// Reaction to one payload type. An `Err` sends the message back to the queue.
#[async_trait]
pub trait MessageHandler<T>: Send + Sync {
    async fn handle(&self, message: T) -> Result<(), HandlerError>;
}

/// Builds a handler for a single delivery, so every message gets its own
/// scope (fresh unit of work, fresh collaborators). `None` means no handler
/// is registered for the payload type.
pub type HandlerFactory<T> = Arc<dyn Fn() -> Option<Box<dyn MessageHandler<T>>> + Send + Sync>;

/// Factory that builds a new handler from `build` for every message.
pub fn scoped<T, H, F>(build: F) -> HandlerFactory<T>
where
    T: 'static,
    H: MessageHandler<T> + 'static,
    F: Fn() -> H + Send + Sync + 'static,
{
    Arc::new(move || Some(Box::new(build()) as Box<dyn MessageHandler<T>>))
}

/// Factory for a payload type nobody handles.
pub fn unregistered<T: 'static>() -> HandlerFactory<T> {
    Arc::new(|| None)
}

/// Adapts an async closure into a [`MessageHandler`].
pub struct FnHandler<T, F> {
    func: Arc<F>,
    _phantom: PhantomData<fn(T)>,
}

impl<T, F> Clone for FnHandler<T, F> {
    fn clone(&self) -> Self {
        Self {
            func: self.func.clone(),
            _phantom: PhantomData,
        }
    }
}

pub fn handler_fn<T, F, Fut>(func: F) -> FnHandler<T, F>
where
    F: Fn(T) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
{
    FnHandler {
        func: Arc::new(func),
        _phantom: PhantomData,
    }
}

#[async_trait]
impl<T, F, Fut> MessageHandler<T> for FnHandler<T, F>
where
    T: Send + 'static,
    F: Fn(T) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
{
    async fn handle(&self, message: T) -> Result<(), HandlerError> {
        (self.func)(message).await
    }
}
