//! Polling source that computes one backlog round.

use std::sync::Arc;
use arc_swap::ArcSwap;
use async_trait::async_trait;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::client::Client;
use crate::config::MonitorConfig;
use crate::monitor::Broadcaster;
use crate::observability::metrics;
use crate::poller::Source;
use crate::topology::{connections, Backlog, TopologySource};

/// Reads the topology, queries the backlog of every enabled connection and
/// publishes the results through the broadcaster.
pub struct Worker {
    topology: Arc<dyn TopologySource>,
    client: Arc<Client>,
    broadcaster: Arc<Broadcaster>,
    config: Arc<ArcSwap<MonitorConfig>>,
}

impl Worker {
    pub fn new(
        topology: Arc<dyn TopologySource>,
        client: Arc<Client>,
        broadcaster: Arc<Broadcaster>,
        config: Arc<ArcSwap<MonitorConfig>>,
    ) -> Self {
        Self {
            topology,
            client,
            broadcaster,
            config,
        }
    }
}

#[async_trait]
impl Source for Worker {
    async fn poll(&self, ctx: CancellationToken) {
        let snapshot = match self.topology.value() {
            Ok(snapshot) => snapshot,
            Err(e) => {
                tracing::warn!(error = %e, "Skipping round, topology unavailable");
                return;
            }
        };

        let targets = connections(&snapshot.domain);
        if targets.is_empty() {
            tracing::debug!(domain = %snapshot.domain.name, "No enabled connections to poll");
            return;
        }
        let size = targets.len();
        let updates = Arc::new(self.broadcaster.broadcast(snapshot, size));

        // Queries still running when the round times out are cancelled
        let round = ctx.child_token();
        let timeout = self.config.load().polling.timeout();
        {
            let round = round.clone();
            tokio::spawn(async move {
                tokio::select! {
                    _ = tokio::time::sleep(timeout) => {
                        tracing::warn!(?timeout, "Polling round timed out");
                        round.cancel();
                    }
                    _ = round.cancelled() => {}
                }
            });
        }

        let start = Instant::now();
        let mut tasks = JoinSet::new();
        for target in targets {
            let client = self.client.clone();
            let updates = updates.clone();
            let round = round.clone();
            tasks.spawn(async move {
                let (result, call) = client
                    .backlog(&round, &target.from, &target.to, target.group_id)
                    .await;
                if let Err(e) = &result {
                    tracing::debug!(from = %target.from, to = %target.to, error = %e, "Backlog query failed");
                }
                let backlog = Arc::new(Backlog::new(target, result, call));
                for update in updates.iter() {
                    update.send(backlog.clone());
                }
            });
        }
        for update in updates.iter() {
            update.set_start(start);
        }

        let mut failed = false;
        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                tracing::error!(error = %e, "Backlog computation failed");
                failed = true;
            }
        }
        let end = Instant::now();
        round.cancel();

        for update in updates.iter() {
            if failed {
                update.cancel();
            } else {
                update.set_end(end);
            }
        }

        metrics::record_round(size, end - start);
        tracing::info!(
            connections = size,
            subscribers = updates.len(),
            duration = ?(end - start),
            "Polling round complete"
        );
    }

    async fn close(&self) {
        self.client.close().await;
    }
}
