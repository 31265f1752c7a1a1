use std::sync::Arc;
use std::time::Duration;
use arc_swap::ArcSwap;
use tokio::sync::{broadcast, mpsc, Mutex};

use crate::client::Client;
use crate::config::MonitorConfig;
use crate::error::{Error, Result};
use crate::monitor::{Broadcaster, Subscription, SubscriptionId, Worker};
use crate::poller::Poller;
use crate::reporter::Connector;
use crate::topology::TopologySource;

struct Instance {
    poller: Poller,
    client: Arc<Client>,
}

#[derive(Default)]
struct Lifecycle {
    instance: Option<Instance>,
    closed: bool,
}

/// Backlog monitor for a replication domain.
///
/// The monitor does nothing until [`Monitor::start`] is called. Each round
/// is delivered to every subscription registered with [`Monitor::listen`].
pub struct Monitor {
    config: Arc<ArcSwap<MonitorConfig>>,
    topology: Arc<dyn TopologySource>,
    connector: Arc<dyn Connector>,
    broadcaster: Arc<Broadcaster>,
    lifecycle: Mutex<Lifecycle>,
}

impl Monitor {
    pub fn new(
        config: MonitorConfig,
        topology: Arc<dyn TopologySource>,
        connector: Arc<dyn Connector>,
    ) -> Self {
        Self {
            config: Arc::new(ArcSwap::from_pointee(config)),
            topology,
            connector,
            broadcaster: Arc::new(Broadcaster::new()),
            lifecycle: Mutex::new(Lifecycle::default()),
        }
    }

    /// Current configuration.
    pub fn config(&self) -> Arc<MonitorConfig> {
        self.config.load_full()
    }

    /// Start polling. Does nothing if the monitor is already running.
    pub async fn start(&self) -> Result<()> {
        let mut lifecycle = self.lifecycle.lock().await;
        if lifecycle.closed {
            return Err(Error::Closed);
        }
        if lifecycle.instance.is_some() {
            return Ok(());
        }

        let config = self.config.load_full();
        let client = Arc::new(Client::new(config.endpoint.endpoint_config(), self.connector.clone()));
        let worker = Worker::new(
            self.topology.clone(),
            client.clone(),
            self.broadcaster.clone(),
            self.config.clone(),
        );
        let poller = Poller::new(Arc::new(worker), config.polling.interval());
        lifecycle.instance = Some(Instance { poller, client });

        tracing::info!(interval = ?config.polling.interval(), "Monitor started");
        Ok(())
    }

    /// Stop polling until [`Monitor::start`] is called again. Waits for a
    /// running round to wind down.
    pub async fn stop(&self) {
        let instance = self.lifecycle.lock().await.instance.take();
        if let Some(instance) = instance {
            instance.poller.close().await;
            tracing::info!("Monitor stopped");
        }
    }

    /// Request an immediate round without waiting for it. Does nothing if
    /// the monitor is not running.
    pub async fn update(&self) {
        let lifecycle = self.lifecycle.lock().await;
        if let Some(instance) = &lifecycle.instance {
            instance.poller.poll();
        }
    }

    /// Subscribe to polling rounds.
    ///
    /// The queue holds up to `buffer` rounds that have not been received
    /// yet. A round that doesn't fit waits for up to `timeout` and is then
    /// skipped; `None` lets it wait indefinitely.
    pub fn listen(&self, buffer: usize, timeout: Option<Duration>) -> Subscription {
        self.broadcaster.listen(buffer, timeout)
    }

    /// Remove a subscription. Returns false if it was not registered.
    pub fn unlisten(&self, id: SubscriptionId) -> bool {
        self.broadcaster.unlisten(id)
    }

    /// Apply a new configuration.
    ///
    /// Endpoint settings are applied in place. A changed polling interval
    /// restarts a running monitor.
    pub async fn update_config(&self, config: MonitorConfig) {
        let previous = self.config.swap(Arc::new(config.clone()));
        let restart = previous.polling.interval_secs != config.polling.interval_secs;

        {
            let lifecycle = self.lifecycle.lock().await;
            let Some(instance) = &lifecycle.instance else {
                return;
            };
            if !restart {
                instance.client.update_config(config.endpoint.endpoint_config());
                tracing::info!("Monitor configuration updated");
                return;
            }
        }

        tracing::info!(interval = ?config.polling.interval(), "Polling interval changed, restarting");
        self.stop().await;
        if let Err(e) = self.start().await {
            tracing::warn!(error = %e, "Monitor could not be restarted");
        }
    }

    /// Stop polling and close every subscription. The monitor cannot be
    /// restarted.
    pub async fn close(&self) {
        {
            let mut lifecycle = self.lifecycle.lock().await;
            if lifecycle.closed {
                return;
            }
            lifecycle.closed = true;
        }
        self.stop().await;
        self.broadcaster.close();
    }

    /// Start the monitor and supervise it until shutdown, applying
    /// configuration updates as they arrive.
    pub async fn run(
        &self,
        mut config_updates: mpsc::UnboundedReceiver<MonitorConfig>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<()> {
        self.start().await?;

        loop {
            tokio::select! {
                Some(config) = config_updates.recv() => {
                    self.update_config(config).await;
                }
                _ = shutdown.recv() => {
                    tracing::info!("Monitor received shutdown signal, exiting loop");
                    break;
                }
            }
        }

        self.close().await;
        Ok(())
    }
}
