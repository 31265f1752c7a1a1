//! Multi-host replication client.
//!
//! # Responsibilities
//! - Map host names to endpoints, creating them on first use
//! - Compute the backlog between two members of a group
//! - Apply configuration changes to every endpoint
//!
//! # Design Decisions
//! - Host names are case-insensitive
//! - Endpoint lookups take the read lock; only a miss takes the write lock

use std::collections::HashMap;
use std::sync::Arc;
use parking_lot::RwLock;
use tokio_util::sync::CancellationToken;

use crate::callstat::Call;
use crate::error::{Error, Result};
use crate::health::{Endpoint, EndpointConfig, EndpointState};
use crate::reporter::{Connector, GroupId, Report, ReportFlags, Vector};

struct Endpoints {
    config: EndpointConfig,
    /// `None` once the client is closed.
    hosts: Option<HashMap<String, Arc<Endpoint>>>,
}

/// Queries backlog and report information from replication members.
///
/// Each host gets one [`Endpoint`], which monitors the health of its
/// connection. Queries against hosts known to be offline fail immediately.
pub struct Client {
    connector: Arc<dyn Connector>,
    endpoints: RwLock<Endpoints>,
}

impl Client {
    pub fn new(config: EndpointConfig, connector: Arc<dyn Connector>) -> Self {
        Self {
            connector,
            endpoints: RwLock::new(Endpoints {
                config,
                hosts: Some(HashMap::new()),
            }),
        }
    }

    pub fn config(&self) -> EndpointConfig {
        self.endpoints.read().config.clone()
    }

    /// Update the configuration of the client and all of its endpoints.
    pub fn update_config(&self, config: EndpointConfig) {
        let mut endpoints = self.endpoints.write();
        endpoints.config = config.clone();
        if let Some(hosts) = &endpoints.hosts {
            for endpoint in hosts.values() {
                endpoint.update_config(config.clone());
            }
        }
    }

    /// State of the endpoint for `host`, if one has been created.
    pub fn endpoint_state(&self, host: &str) -> Option<EndpointState> {
        let endpoints = self.endpoints.read();
        endpoints
            .hosts
            .as_ref()?
            .get(&host.to_lowercase())
            .map(|endpoint| endpoint.state())
    }

    /// Outgoing backlog from member `from` to member `to`, per folder of
    /// `group`.
    ///
    /// The reference vector is retrieved from `to`, then `from` is asked for
    /// its backlog against it.
    pub async fn backlog(
        &self,
        ctx: &CancellationToken,
        from: &str,
        to: &str,
        group: GroupId,
    ) -> (Result<Vec<i64>>, Call) {
        let mut call = Call::begin("Client.Backlog");
        let result = self.two_hop(ctx, from, to, group, &mut call).await;
        call.complete(&result);
        (result, call)
    }

    async fn two_hop(
        &self,
        ctx: &CancellationToken,
        from: &str,
        to: &str,
        group: GroupId,
        call: &mut Call,
    ) -> Result<Vec<i64>> {
        let sender = self.endpoint(from)?;
        let receiver = self.endpoint(to)?;

        let (vector, vcall) = receiver.vector(ctx, group).await;
        call.add(vcall);
        let vector = vector?;

        let (backlog, bcall) = sender.backlog(ctx, &vector).await;
        call.add(bcall);
        backlog
    }

    /// Reference version vector of `group` on `host`.
    pub async fn vector(&self, ctx: &CancellationToken, host: &str, group: GroupId) -> (Result<Vector>, Call) {
        let mut call = Call::begin("Client.Vector");
        let result = match self.endpoint(host) {
            Ok(endpoint) => {
                let (result, vcall) = endpoint.vector(ctx, group).await;
                call.add(vcall);
                result
            }
            Err(err) => Err(err),
        };
        call.complete(&result);
        (result, call)
    }

    /// Health report for `group` generated by `host`.
    ///
    /// A backlog report requires a reference vector.
    pub async fn report(
        &self,
        ctx: &CancellationToken,
        host: &str,
        group: GroupId,
        vector: Option<&Vector>,
        flags: ReportFlags,
    ) -> (Result<Report>, Call) {
        let mut call = Call::begin("Client.Report");
        let result = if flags.backlog && vector.is_none() {
            Err(Error::InvalidArgument(
                "a backlog report requires a reference vector".to_string(),
            ))
        } else {
            match self.endpoint(host) {
                Ok(endpoint) => {
                    let (result, rcall) = endpoint.report(ctx, group, vector, flags).await;
                    call.add(rcall);
                    result
                }
                Err(err) => Err(err),
            }
        };
        call.complete(&result);
        (result, call)
    }

    /// Close every endpoint. Later queries fail with [`Error::Closed`].
    pub async fn close(&self) {
        let hosts = self.endpoints.write().hosts.take();
        let Some(hosts) = hosts else {
            return;
        };
        futures_util::future::join_all(hosts.values().map(|endpoint| endpoint.close())).await;
        tracing::debug!(endpoints = hosts.len(), "Client closed");
    }

    fn endpoint(&self, host: &str) -> Result<Arc<Endpoint>> {
        let host = host.to_lowercase();

        {
            let endpoints = self.endpoints.read();
            let hosts = endpoints.hosts.as_ref().ok_or(Error::Closed)?;
            if let Some(endpoint) = hosts.get(&host) {
                return Ok(endpoint.clone());
            }
        }

        let mut endpoints = self.endpoints.write();
        let config = endpoints.config.clone();
        let hosts = endpoints.hosts.as_mut().ok_or(Error::Closed)?;
        let endpoint = hosts
            .entry(host)
            .or_insert_with_key(|host| {
                tracing::debug!(host = %host, "Creating endpoint");
                Arc::new(Endpoint::new(host, config, self.connector.clone()))
            })
            .clone();
        Ok(endpoint)
    }
}
