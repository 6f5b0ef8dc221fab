// src/rabbitmq/connection.rs
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use lapin::{Channel, Connection, ConnectionProperties};
use tokio::sync::Mutex;
use tokio::time::{sleep, timeout};
use tracing::{debug, error, info, warn};

use super::errors::{MessagingError, Result};
use crate::config::BrokerConfig;

const MAX_BACKOFF_MS: u64 = 30_000;

#[derive(Default)]
struct ConnectionState {
    connection: Option<Arc<Connection>>,
    last_failure: Option<Instant>,
    ever_connected: bool,
}

/// Owns the single broker connection of the process and hands out one fresh
/// channel per operation. Channels are never pooled.
pub struct BrokerConnection {
    config: BrokerConfig,
    state: Mutex<ConnectionState>,
    disposed: AtomicBool,
}

impl BrokerConnection {
    pub fn new(config: BrokerConfig) -> Self {
        Self {
            config,
            state: Mutex::new(ConnectionState::default()),
            disposed: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &BrokerConfig {
        &self.config
    }

    /// Makes sure a live connection exists. One attempt, no retry loop.
    pub async fn ensure_connected(&self) -> Result<()> {
        self.connection().await.map(|_| ())
    }

    /// Opens a new channel on the shared connection.
    pub async fn create_channel(&self) -> Result<Channel> {
        let connection = self.connection().await?;
        let channel = connection
            .create_channel()
            .await
            .map_err(|e| MessagingError::ChannelError(format!("Failed to create channel: {}", e)))?;
        debug!(channel_id = channel.id(), "Channel created");
        Ok(channel)
    }

    pub async fn is_connected(&self) -> bool {
        let state = self.state.lock().await;
        state
            .connection
            .as_ref()
            .is_some_and(|conn| conn.status().connected())
    }

    fn check_disposed(&self) -> Result<()> {
        if self.disposed.load(Ordering::SeqCst) {
            return Err(MessagingError::ConnectionClosed(
                "connection has been disposed".to_string(),
            ));
        }
        Ok(())
    }

    async fn connection(&self) -> Result<Arc<Connection>> {
        self.check_disposed()?;

        let mut state = self.state.lock().await;
        // dispose may have run while we waited for the lock
        self.check_disposed()?;

        if let Some(conn) = state.connection.as_ref() {
            if conn.status().connected() {
                return Ok(conn.clone());
            }
            if !self.config.automatic_recovery {
                return Err(MessagingError::ConnectionClosed(
                    "connection lost and automatic recovery is disabled".to_string(),
                ));
            }
            warn!("RabbitMQ connection is closed, recovering");
            state.connection = None;
        } else if state.ever_connected && !self.config.automatic_recovery {
            return Err(MessagingError::ConnectionClosed(
                "connection lost and automatic recovery is disabled".to_string(),
            ));
        }

        if let Some(failed_at) = state.last_failure {
            let interval = self.config.recovery_interval();
            if failed_at.elapsed() < interval {
                return Err(MessagingError::BrokerUnreachable(format!(
                    "last attempt failed {}ms ago, waiting for the {}ms recovery interval",
                    failed_at.elapsed().as_millis(),
                    interval.as_millis()
                )));
            }
        }

        match self.dial().await {
            Ok(conn) => {
                let conn = Arc::new(conn);
                state.connection = Some(conn.clone());
                state.last_failure = None;
                state.ever_connected = true;
                Ok(conn)
            }
            Err(err) => {
                state.last_failure = Some(Instant::now());
                Err(err)
            }
        }
    }

    async fn dial(&self) -> Result<Connection> {
        info!("Attempting to connect to RabbitMQ at {}", self.config.redacted_uri());

        let uri = self.config.amqp_uri();
        let connect = timeout(
            self.config.connection_timeout(),
            Connection::connect(&uri, ConnectionProperties::default()),
        )
        .await
        .inspect_err(|_| {
            error!(
                "Connection to RabbitMQ timed out after {}ms",
                self.config.connection_timeout_ms
            )
        })?;

        match connect {
            Ok(conn) => {
                info!("Successfully connected to RabbitMQ");
                Ok(conn)
            }
            Err(e) => {
                error!("Failed to connect to RabbitMQ: {}", e);
                Err(MessagingError::BrokerUnreachable(e.to_string()))
            }
        }
    }

    /// Startup helper: dials with exponential backoff and jitter until
    /// `max_connect_attempts` is exhausted.
    pub async fn connect_with_retry(&self) -> Result<()> {
        let max_attempts = self.config.max_connect_attempts.max(1);
        let mut delay = self.config.connect_backoff_ms;
        let mut attempt = 0;

        loop {
            attempt += 1;
            // the startup loop owns its own pacing
            self.state.lock().await.last_failure = None;

            match self.ensure_connected().await {
                Ok(()) => return Ok(()),
                Err(err) if !err.is_transient() => return Err(err),
                Err(err) => {
                    error!(
                        "Failed to connect to RabbitMQ (attempt {}/{}): {}",
                        attempt, max_attempts, err
                    );
                    if attempt >= max_attempts {
                        error!("Max reconnection attempts reached. Giving up.");
                        return Err(err);
                    }
                    let sleep_time = backoff_with_jitter(delay);
                    info!("Waiting {}ms before next connect attempt", sleep_time);
                    sleep(Duration::from_millis(sleep_time)).await;
                    delay = std::cmp::min(delay.saturating_mul(2), MAX_BACKOFF_MS);
                }
            }
        }
    }

    /// Closes the connection. Only the first call has an effect.
    pub async fn dispose(&self) -> Result<()> {
        if self.disposed.swap(true, Ordering::SeqCst) {
            debug!("Broker connection already disposed");
            return Ok(());
        }

        let connection = self.state.lock().await.connection.take();
        if let Some(conn) = connection {
            if conn.status().connected() {
                info!("Closing RabbitMQ connection gracefully");
                conn.close(200, "Service shutting down")
                    .await
                    .map_err(|e| MessagingError::ConnectionClosed(e.to_string()))?;
            }
        }
        Ok(())
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }
}

/// +/-15% jitter around `delay_ms`.
fn backoff_with_jitter(delay_ms: u64) -> u64 {
    let jitter = (rand::random::<f64>() * 0.3 - 0.15) * delay_ms as f64;
    (delay_ms as f64 + jitter).max(0.0) as u64
}
