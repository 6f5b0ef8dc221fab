// src/rabbitmq/supervisor.rs
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{error, info, warn};

use super::consumer::ManagedConsumer;
use super::registry::ConsumerRegistry;
use super::topology::QueueTopology;

/// Starts one consumer per configured queue and restarts the ones that die.
///
/// The consumer list is owned by the control loop; only [`run`](Self::run)
/// and the shutdown path touch it.
pub struct ConsumerSupervisor {
    registry: ConsumerRegistry,
    queues: Vec<QueueTopology>,
    sweep_interval: Duration,
    consumers: Vec<Arc<dyn ManagedConsumer>>,
}

impl ConsumerSupervisor {
    pub fn new(registry: ConsumerRegistry, queues: Vec<QueueTopology>, sweep_interval: Duration) -> Self {
        ConsumerSupervisor {
            registry,
            queues,
            sweep_interval,
            consumers: Vec::new(),
        }
    }

    pub fn tracked(&self) -> usize {
        self.consumers.len()
    }

    /// Builds and starts every configured consumer. Start failures are logged
    /// and left for the next sweep. Returns how many started.
    pub async fn start_all(&mut self) -> usize {
        let mut started = 0;

        for topology in &self.queues {
            let consumer = match self.registry.build(topology) {
                Some(consumer) => consumer,
                None => {
                    warn!(queue = %topology.name, "No consumer registered for queue, skipping");
                    continue;
                }
            };

            match consumer.start().await {
                Ok(()) => started += 1,
                Err(e) => error!(
                    queue = %topology.name,
                    "Consumer failed to start, will retry on next sweep: {}", e
                ),
            }
            self.consumers.push(consumer);
        }

        info!(started, configured = self.queues.len(), "Consumer startup complete");
        started
    }

    /// Restarts every consumer that is not running. Each dead consumer gets at
    /// most one start attempt per sweep. Returns how many were restarted.
    pub async fn sweep(&self) -> usize {
        let mut restarted = 0;

        for consumer in &self.consumers {
            if consumer.is_running().await {
                continue;
            }

            warn!(queue = %consumer.queue_name(), "Consumer is not running, restarting");
            match consumer.start().await {
                Ok(()) => {
                    restarted += 1;
                    info!(queue = %consumer.queue_name(), "Consumer restarted");
                }
                Err(e) => error!(queue = %consumer.queue_name(), "Consumer restart failed: {}", e),
            }
        }

        restarted
    }

    /// Stops every tracked consumer. One failing stop does not keep the others
    /// running. Returns how many stopped cleanly.
    pub async fn shutdown(&mut self) -> usize {
        let mut stopped = 0;

        for consumer in self.consumers.drain(..) {
            match consumer.stop().await {
                Ok(()) => stopped += 1,
                Err(e) => error!(queue = %consumer.queue_name(), "Error stopping consumer: {}", e),
            }
        }

        info!(stopped, "Consumer supervisor shut down");
        stopped
    }

    /// Control loop: start, sweep every interval, stop everything once
    /// `shutdown` flips (or its sender goes away).
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> usize {
        self.start_all().await;

        let mut ticker = interval(self.sweep_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // the first tick completes immediately
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.sweep().await;
                }
                _ = shutdown.changed() => {
                    info!("Supervisor shutdown requested");
                    break;
                }
            }
        }

        self.shutdown().await
    }
}
