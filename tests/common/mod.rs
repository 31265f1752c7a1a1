//! Shared fakes for integration testing.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use dfsr_monitor::error::{Error, Result};
use dfsr_monitor::health::{Endpoint, EndpointConfig};
use dfsr_monitor::reporter::{Connector, GroupId, Report, ReportFlags, Reporter, Vector};

/// Scripted behavior of a fake reporter.
#[derive(Clone, Default)]
pub struct Script {
    /// Vector data returned for every group. Defaults to the host name.
    pub vector: Option<Result<Vec<u8>>>,
    /// Backlog returned for every vector. Defaults to no folders.
    pub backlog: Option<Result<Vec<i64>>>,
    /// Time each vector lookup takes.
    pub vector_delay: Duration,
    /// Backlog queries wait for a notification before answering.
    pub backlog_gate: Option<Arc<Notify>>,
}

impl Script {
    pub fn backlog(values: Vec<i64>) -> Self {
        Self {
            backlog: Some(Ok(values)),
            ..Self::default()
        }
    }

    pub fn failing(err: Error) -> Self {
        Self {
            vector: Some(Err(err.clone())),
            backlog: Some(Err(err)),
            ..Self::default()
        }
    }
}

/// A reporter that answers from a script and counts its calls.
pub struct FakeReporter {
    pub host: String,
    script: Mutex<Script>,
    pub vector_calls: AtomicUsize,
    pub backlog_calls: AtomicUsize,
    pub report_calls: AtomicUsize,
    pub in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
    pub last_vector: Mutex<Option<Vec<u8>>>,
    pub closed: AtomicBool,
}

impl FakeReporter {
    pub fn new(host: &str, script: Script) -> Arc<Self> {
        Arc::new(Self {
            host: host.to_string(),
            script: Mutex::new(script),
            vector_calls: AtomicUsize::new(0),
            backlog_calls: AtomicUsize::new(0),
            report_calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            last_vector: Mutex::new(None),
            closed: AtomicBool::new(false),
        })
    }

    pub fn set_script(&self, script: Script) {
        *self.script.lock() = script;
    }

    pub fn vector_calls(&self) -> usize {
        self.vector_calls.load(Ordering::SeqCst)
    }

    pub fn backlog_calls(&self) -> usize {
        self.backlog_calls.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Reporter for FakeReporter {
    async fn vector(&self, _ctx: &CancellationToken, group: GroupId) -> Result<Vector> {
        self.vector_calls.fetch_add(1, Ordering::SeqCst);
        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(running, Ordering::SeqCst);

        let script = self.script.lock().clone();
        if !script.vector_delay.is_zero() {
            tokio::time::sleep(script.vector_delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        match script.vector {
            Some(Ok(data)) => Ok(Vector::new(group, data)),
            Some(Err(err)) => Err(err),
            None => Ok(Vector::new(group, self.host.as_bytes().to_vec())),
        }
    }

    async fn backlog(&self, _ctx: &CancellationToken, vector: &Vector) -> Result<Vec<i64>> {
        self.backlog_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_vector.lock() = Some(vector.data().to_vec());

        let script = self.script.lock().clone();
        if let Some(gate) = script.backlog_gate {
            gate.notified().await;
        }
        script.backlog.unwrap_or(Ok(Vec::new()))
    }

    async fn report(
        &self,
        _ctx: &CancellationToken,
        _group: GroupId,
        vector: Option<&Vector>,
        _flags: ReportFlags,
    ) -> Result<Report> {
        self.report_calls.fetch_add(1, Ordering::SeqCst);
        Ok(Report {
            data: vector.map(|v| v.data().to_vec()).unwrap_or_default(),
            text: format!("report from {}", self.host),
        })
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

#[derive(Default)]
struct Hosts {
    scripts: HashMap<String, Script>,
    failures: HashMap<String, VecDeque<Error>>,
    connects: HashMap<String, usize>,
    reporters: HashMap<String, Vec<Arc<FakeReporter>>>,
}

/// A connector that hands out fake reporters and records every attempt.
#[derive(Default)]
pub struct FakeConnector {
    hosts: Mutex<Hosts>,
}

impl FakeConnector {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Script reporters created for `host` from now on.
    pub fn script(&self, host: &str, script: Script) {
        self.hosts.lock().scripts.insert(host.to_string(), script);
    }

    /// Fail the next `n` connection attempts to `host` with `err`.
    pub fn fail_next(&self, host: &str, n: usize, err: Error) {
        let mut hosts = self.hosts.lock();
        let queue = hosts.failures.entry(host.to_string()).or_default();
        queue.extend(std::iter::repeat(err).take(n));
    }

    /// Number of connection attempts made to `host`.
    pub fn connects(&self, host: &str) -> usize {
        self.hosts.lock().connects.get(host).copied().unwrap_or(0)
    }

    /// Reporters created for `host`, oldest first.
    pub fn reporters(&self, host: &str) -> Vec<Arc<FakeReporter>> {
        self.hosts.lock().reporters.get(host).cloned().unwrap_or_default()
    }

    pub fn latest(&self, host: &str) -> Option<Arc<FakeReporter>> {
        self.reporters(host).pop()
    }
}

#[async_trait]
impl Connector for FakeConnector {
    async fn connect(&self, host: &str) -> Result<Arc<dyn Reporter>> {
        let mut hosts = self.hosts.lock();
        *hosts.connects.entry(host.to_string()).or_default() += 1;

        if let Some(err) = hosts.failures.get_mut(host).and_then(|q| q.pop_front()) {
            return Err(err);
        }

        let script = hosts.scripts.get(host).cloned().unwrap_or_default();
        let reporter = FakeReporter::new(host, script);
        hosts
            .reporters
            .entry(host.to_string())
            .or_default()
            .push(reporter.clone());
        Ok(reporter)
    }
}

/// Endpoint policy for tests: no caching, no limiting, no retries.
pub fn plain_config() -> EndpointConfig {
    EndpointConfig {
        caching: false,
        limiting: false,
        retries: 0,
        min_recovery_interval: Duration::from_secs(3600),
        ..EndpointConfig::default()
    }
}

pub fn unavailable() -> Error {
    Error::Unavailable("rpc server unavailable".to_string())
}

/// Wait until `condition` holds, polling every 10ms.
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    while !condition() {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// Wait until `endpoint` has finished its first connection attempt and is
/// online.
pub async fn wait_online(endpoint: &Endpoint) {
    wait_until(|| endpoint.state().is_online()).await;
}
