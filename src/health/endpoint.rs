//! Per-host connection manager.
//!
//! # Responsibilities
//! - Establish the connection to a host and rebuild it on a schedule
//! - Track connection health from the errors returned by calls
//! - Fail calls immediately while the host is offline or unresponsive
//!
//! # Design Decisions
//! - A control task owns the reconnection timer; callers and config updates
//!   talk to it through an event queue
//! - Connections are periodically replaced even while healthy, since remote
//!   servers leak resources on long-lived sessions
//! - Every connection gets a generation number; a call result only changes
//!   the state if it came from the current generation

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use futures_util::FutureExt;
use parking_lot::RwLock;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::callstat::{Call, CallTracker};
use crate::error::{Error, Result};
use crate::health::EndpointState;
use crate::observability::metrics;
use crate::reporter::{
    Cacher, Connector, DurableReporter, GroupId, Limiter, Report, ReportFlags, Reporter, Vector,
};

/// Connection policy for an endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointConfig {
    /// Cache retrieved version vectors.
    pub caching: bool,
    /// How long cached version vectors remain valid.
    pub cache_duration: Duration,
    /// Limit the number of simultaneous vector lookups.
    pub limiting: bool,
    /// Maximum number of simultaneous vector lookups.
    pub limit: usize,
    /// Time between connection rebuilds while online.
    pub online_reconnection_interval: Duration,
    /// Time between connection attempts while offline.
    pub offline_reconnection_interval: Duration,
    /// Longest a call may run before the endpoint is considered unresponsive.
    pub acceptable_call_duration: Duration,
    /// Number of times a failed call is retried on a fresh connection.
    pub retries: u32,
    /// Minimum time between reconnects made while retrying.
    pub min_recovery_interval: Duration,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            caching: true,
            cache_duration: Duration::from_secs(30),
            limiting: true,
            limit: 1,
            online_reconnection_interval: Duration::from_secs(30 * 60),
            offline_reconnection_interval: Duration::from_secs(2 * 60),
            acceptable_call_duration: Duration::from_secs(30),
            retries: 0,
            min_recovery_interval: Duration::from_secs(60),
        }
    }
}

impl EndpointConfig {
    /// Returns true if moving to `other` requires the connection stack to
    /// be rebuilt.
    fn requires_rebuild(&self, other: &EndpointConfig) -> bool {
        self.caching != other.caching
            || self.cache_duration != other.cache_duration
            || self.limiting != other.limiting
            || self.limit != other.limit
            || self.retries != other.retries
            || self.min_recovery_interval != other.min_recovery_interval
    }

    fn reconnection_interval(&self, online: bool) -> Duration {
        if online {
            self.online_reconnection_interval
        } else {
            self.offline_reconnection_interval
        }
    }
}

enum Event {
    Config(EndpointConfig),
    State(EndpointState),
}

struct Shared {
    config: EndpointConfig,
    state: EndpointState,
    connection: Option<Arc<dyn Reporter>>,
    generation: u64,
}

struct Inner {
    host: String,
    connector: Arc<dyn Connector>,
    tracker: CallTracker,
    shared: RwLock<Shared>,
    /// Set once the first connection attempt has finished, or on close.
    ready: watch::Sender<bool>,
    events: mpsc::UnboundedSender<Event>,
    shutdown: CancellationToken,
}

/// Manages the connection to a single replication member.
///
/// The endpoint connects in the background as soon as it is created. Calls
/// made before the first attempt finishes wait for it. While the endpoint is
/// offline every call fails immediately with the error that took it offline.
///
/// When finished with an endpoint, call [`Endpoint::close`] to release the
/// connection and stop the control task.
pub struct Endpoint {
    inner: Arc<Inner>,
    control: Mutex<Option<JoinHandle<()>>>,
}

impl Endpoint {
    /// Create an endpoint for `host` and start connecting to it.
    pub fn new(host: &str, config: EndpointConfig, connector: Arc<dyn Connector>) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (ready, _) = watch::channel(false);
        let state = EndpointState::new(Instant::now());

        let inner = Arc::new(Inner {
            host: host.to_string(),
            connector,
            tracker: CallTracker::new(),
            shared: RwLock::new(Shared {
                config: config.clone(),
                state: state.clone(),
                connection: None,
                generation: 0,
            }),
            ready,
            events: events_tx,
            shutdown: CancellationToken::new(),
        });

        let control = tokio::spawn(run(inner.clone(), config, state, events_rx));

        Self {
            inner,
            control: Mutex::new(Some(control)),
        }
    }

    pub fn host(&self) -> &str {
        &self.inner.host
    }

    pub fn config(&self) -> EndpointConfig {
        self.inner.shared.read().config.clone()
    }

    /// Replace the endpoint configuration.
    ///
    /// Changes to caching or limiting rebuild the connection immediately.
    /// Changes to the reconnection intervals reschedule the next rebuild
    /// relative to the last connection attempt.
    pub fn update_config(&self, config: EndpointConfig) {
        let mut shared = self.inner.shared.write();
        shared.config = config.clone();
        if !shared.state.is_closed() {
            let _ = self.inner.events.send(Event::Config(config));
        }
    }

    /// Current state of the endpoint, including its outstanding calls.
    pub fn state(&self) -> EndpointState {
        let mut state = self.inner.shared.read().state.clone();
        state.calls = self.inner.tracker.stats();
        state
    }

    /// Generation of the current connection. Incremented on every
    /// connection attempt.
    pub fn generation(&self) -> u64 {
        self.inner.shared.read().generation
    }

    /// Reference version vector for `group`.
    pub async fn vector(&self, ctx: &CancellationToken, group: GroupId) -> (Result<Vector>, Call) {
        self.call(ctx, "Endpoint.Vector", |r| async move { r.vector(ctx, group).await })
            .await
    }

    /// Backlog of the endpoint compared against `vector`.
    pub async fn backlog(&self, ctx: &CancellationToken, vector: &Vector) -> (Result<Vec<i64>>, Call) {
        self.call(ctx, "Endpoint.Backlog", |r| async move { r.backlog(ctx, vector).await })
            .await
    }

    /// Health report for `group`.
    pub async fn report(
        &self,
        ctx: &CancellationToken,
        group: GroupId,
        vector: Option<&Vector>,
        flags: ReportFlags,
    ) -> (Result<Report>, Call) {
        self.call(ctx, "Endpoint.Report", |r| async move {
            r.report(ctx, group, vector, flags).await
        })
        .await
    }

    async fn call<T, F, Fut>(&self, ctx: &CancellationToken, description: &'static str, action: F) -> (Result<T>, Call)
    where
        F: FnOnce(Arc<dyn Reporter>) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut call = Call::begin(description);
        let result = self.invoke(ctx, action).await;
        call.complete(&result);
        (result, call)
    }

    async fn invoke<T, F, Fut>(&self, ctx: &CancellationToken, action: F) -> Result<T>
    where
        F: FnOnce(Arc<dyn Reporter>) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut ready = self.inner.ready.subscribe();
        tokio::select! {
            _ = ctx.cancelled() => return Err(Error::Canceled),
            ready = ready.wait_for(|ready| *ready).map(|r| r.map(|_| ())) => {
                ready.map_err(|_| Error::Closed)?;
            }
        }

        let calls = self.inner.tracker.stats();
        let (reporter, generation) = {
            let shared = self.inner.shared.read();
            if let Some(err) = &shared.state.error {
                return Err(err.clone());
            }
            let threshold = shared.config.acceptable_call_duration;
            if calls.exceeds(threshold) {
                return Err(Error::Unresponsive(threshold));
            }
            let reporter = shared.connection.clone().ok_or(Error::Disconnected)?;
            (reporter, shared.generation)
        };

        let result = {
            let _tracked = self.inner.tracker.track();
            tokio::select! {
                result = action(reporter) => result,
                _ = ctx.cancelled() => Err(Error::Canceled),
            }
        };

        self.inner.update_state_after_call(generation, &result, Instant::now());
        result
    }

    /// Close the endpoint and its connection.
    ///
    /// Calls waiting for the first connection attempt are released with
    /// [`Error::Closed`].
    pub async fn close(&self) {
        {
            let mut shared = self.inner.shared.write();
            if shared.state.is_closed() {
                return;
            }
            shared.state.set_error(Some(Error::Closed), Instant::now());
        }
        self.inner.shutdown.cancel();

        // Wait for the control task so it can't reconnect after this point
        let control = self.control.lock().await.take();
        if let Some(control) = control {
            let _ = control.await;
        }

        self.inner.ready.send_replace(true);

        let connection = self.inner.shared.write().connection.take();
        if let Some(connection) = connection {
            connection.close().await;
        }
        tracing::debug!(host = %self.inner.host, "Endpoint closed");
    }
}

impl Drop for Endpoint {
    fn drop(&mut self) {
        self.inner.shutdown.cancel();
    }
}

impl Inner {
    /// Install the outcome of a connection attempt and return the resulting
    /// state.
    fn update_connection(&self, result: Result<Arc<dyn Reporter>>, when: Instant) -> EndpointState {
        let online = result.is_ok();
        let (retired, state) = {
            let mut shared = self.shared.write();
            if shared.state.is_closed() {
                (result.ok(), shared.state.clone())
            } else {
                let (reporter, error) = match result {
                    Ok(reporter) => (Some(reporter), None),
                    Err(err) => (None, Some(err)),
                };
                shared.generation += 1;
                let retired = std::mem::replace(&mut shared.connection, reporter);
                self.record_error(&mut shared, error, when);
                (retired, shared.state.clone())
            }
        };

        if !state.is_closed() {
            metrics::record_endpoint_connect(&self.host, online);
        }
        if let Some(retired) = retired {
            tokio::spawn(async move { retired.close().await });
        }
        if !*self.ready.borrow() {
            self.ready.send_replace(true);
        }
        state
    }

    /// Evaluate a call result and record any change in connectivity.
    fn update_state_after_call<T>(&self, generation: u64, result: &Result<T>, when: Instant) {
        let mut shared = self.shared.write();
        if shared.state.is_closed() {
            return;
        }

        if shared.state.idle_since.map_or(true, |idle| idle < when) {
            shared.state.idle_since = Some(when);
        }

        let Err(err) = result else {
            return;
        };
        if !err.is_unavailable() {
            return;
        }
        // The connection may have been replaced while the call was running
        if shared.generation != generation || shared.state.updated_at > when {
            return;
        }

        self.record_error(&mut shared, Some(err.clone()), when);
        metrics::record_endpoint_online(&self.host, false);
        let _ = self.events.send(Event::State(shared.state.clone()));
    }

    fn record_error(&self, shared: &mut Shared, error: Option<Error>, when: Instant) {
        let was_online = shared.state.is_online();
        shared.state.set_error(error, when);
        match (&shared.state.error, was_online) {
            (None, false) => tracing::info!(host = %self.host, "Endpoint online"),
            (Some(err), true) => tracing::warn!(host = %self.host, error = %err, "Endpoint offline"),
            (Some(err), false) => tracing::debug!(host = %self.host, error = %err, "Endpoint still offline"),
            (None, true) => {}
        }
    }
}

async fn create_connection(
    host: &str,
    connector: &Arc<dyn Connector>,
    config: &EndpointConfig,
) -> Result<Arc<dyn Reporter>> {
    let durable =
        DurableReporter::connect(host, connector.clone(), config.min_recovery_interval, config.retries).await?;
    let mut reporter: Arc<dyn Reporter> = Arc::new(durable);

    if config.limiting {
        reporter = match Limiter::new(reporter.clone(), config.limit) {
            Ok(limiter) => Arc::new(limiter),
            Err(err) => {
                reporter.close().await;
                return Err(err);
            }
        };
    }

    if config.caching {
        reporter = Arc::new(Cacher::new(reporter, config.cache_duration));
    }

    Ok(reporter)
}

/// Control loop. Connects whenever the timer fires and reschedules the
/// timer according to the outcome and configuration changes.
async fn run(
    inner: Arc<Inner>,
    mut config: EndpointConfig,
    mut state: EndpointState,
    mut events: mpsc::UnboundedReceiver<Event>,
) {
    let timer = tokio::time::sleep(Duration::ZERO);
    tokio::pin!(timer);
    let mut connected_at = Instant::now();

    loop {
        tokio::select! {
            _ = inner.shutdown.cancelled() => return,
            Some(event) = events.recv() => match event {
                Event::Config(update) => {
                    let rebuild = config.requires_rebuild(&update);
                    let reschedule = config.online_reconnection_interval != update.online_reconnection_interval
                        || config.offline_reconnection_interval != update.offline_reconnection_interval;
                    config = update;

                    if rebuild {
                        timer.as_mut().reset(Instant::now());
                    } else if reschedule {
                        let interval = config.reconnection_interval(state.is_online());
                        timer.as_mut().reset(connected_at + interval);
                    }
                }
                Event::State(update) => {
                    let went_offline = state.is_online() && !update.is_online();
                    state = update;
                    if went_offline {
                        timer.as_mut().reset(Instant::now());
                    }
                }
            },
            () = &mut timer => {
                connected_at = Instant::now();
                tracing::debug!(host = %inner.host, "Connecting");
                let result = tokio::select! {
                    _ = inner.shutdown.cancelled() => return,
                    result = create_connection(&inner.host, &inner.connector, &config) => result,
                };
                state = inner.update_connection(result, connected_at);
                let interval = config.reconnection_interval(state.is_online());
                timer.as_mut().reset(Instant::now() + interval);
            }
        }
    }
}
