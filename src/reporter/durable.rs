//! Retrying reporter that recreates its connection on failure.
//!
//! # Responsibilities
//! - Retry failed calls up to a fixed attempt budget
//! - Reconnect between attempts, at most once per recovery interval
//! - Kick off a background reconnect when the budget is exhausted
//!
//! # Design Decisions
//! - Closed and cancelled outcomes are never retried
//! - Connection identity is a generation number, so a caller only replaces
//!   the connection it actually used
//! - Reconnects are serialized; concurrent failures trigger one reconnect

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use async_trait::async_trait;
use parking_lot::RwLock;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};
use crate::observability::metrics;
use crate::reporter::{Connector, GroupId, Report, ReportFlags, Reporter, Vector};

#[derive(Clone)]
struct Connection {
    reporter: Arc<dyn Reporter>,
    generation: u64,
}

struct Durable {
    host: String,
    connector: Arc<dyn Connector>,
    interval: Duration,
    attempts: u32,
    current: RwLock<Connection>,
    /// Time of the last recovery. Held for the duration of a reconnect.
    last_recovery: Mutex<Instant>,
    closed: AtomicBool,
}

/// A reporter that recovers from failures by reconnecting and retrying.
pub struct DurableReporter {
    inner: Arc<Durable>,
}

impl DurableReporter {
    /// Connect to `host` and wrap the connection.
    ///
    /// `interval` is the minimum time between reconnects. Failed calls are
    /// retried up to `retries` times, so each call makes at most
    /// `retries + 1` attempts.
    pub async fn connect(
        host: &str,
        connector: Arc<dyn Connector>,
        interval: Duration,
        retries: u32,
    ) -> Result<Self> {
        let reporter = connector.connect(host).await?;
        Ok(Self {
            inner: Arc::new(Durable {
                host: host.to_string(),
                connector,
                interval,
                attempts: retries.saturating_add(1),
                current: RwLock::new(Connection {
                    reporter,
                    generation: 0,
                }),
                last_recovery: Mutex::new(Instant::now()),
                closed: AtomicBool::new(false),
            }),
        })
    }

    /// Maximum number of attempts made for each call.
    pub fn attempts(&self) -> u32 {
        self.inner.attempts
    }

    /// Number of times the underlying connection has been replaced.
    pub fn generation(&self) -> u64 {
        self.inner.current.read().generation
    }
}

impl Durable {
    async fn attempt<T, F, Fut>(self: &Arc<Self>, ctx: &CancellationToken, mut action: F) -> Result<T>
    where
        F: FnMut(Arc<dyn Reporter>) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 0;
        loop {
            if self.closed.load(Ordering::Acquire) {
                return Err(Error::Closed);
            }
            if ctx.is_cancelled() {
                return Err(Error::Canceled);
            }

            let conn = self.current.read().clone();
            let err = match action(conn.reporter).await {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };
            attempt += 1;

            if err.is_terminal() || ctx.is_cancelled() {
                return Err(err);
            }

            if attempt >= self.attempts {
                // Out of attempts; recover in the background for future callers
                let durable = self.clone();
                tokio::spawn(async move {
                    if let Err(e) = durable.recover(conn.generation).await {
                        tracing::debug!(host = %durable.host, error = %e, "Background reconnect failed");
                    }
                });
                return Err(err);
            }

            metrics::record_retry(&self.host);
            tracing::debug!(
                host = %self.host,
                attempt,
                error = %err,
                "Call failed, retrying"
            );

            if let Err(e) = self.recover(conn.generation).await {
                tracing::debug!(host = %self.host, error = %e, "Reconnect failed");
            }
        }
    }

    /// Replace the connection if `generation` is still current and the
    /// recovery interval has elapsed.
    async fn recover(&self, generation: u64) -> Result<()> {
        let mut last_recovery = self.last_recovery.lock().await;
        if self.closed.load(Ordering::Acquire) {
            return Ok(());
        }
        if self.current.read().generation != generation {
            // Another caller already reconnected
            return Ok(());
        }
        if last_recovery.elapsed() < self.interval {
            return Ok(());
        }
        *last_recovery = Instant::now();

        let reporter = self.connector.connect(&self.host).await?;
        let retired = {
            let mut current = self.current.write();
            std::mem::replace(
                &mut *current,
                Connection {
                    reporter,
                    generation: generation + 1,
                },
            )
        };
        tracing::info!(host = %self.host, generation = generation + 1, "Reporter reconnected");
        tokio::spawn(async move { retired.reporter.close().await });
        Ok(())
    }
}

#[async_trait]
impl Reporter for DurableReporter {
    async fn vector(&self, ctx: &CancellationToken, group: GroupId) -> Result<Vector> {
        self.inner
            .attempt(ctx, |r| async move { r.vector(ctx, group).await })
            .await
    }

    async fn backlog(&self, ctx: &CancellationToken, vector: &Vector) -> Result<Vec<i64>> {
        self.inner
            .attempt(ctx, |r| async move { r.backlog(ctx, vector).await })
            .await
    }

    async fn report(
        &self,
        ctx: &CancellationToken,
        group: GroupId,
        vector: Option<&Vector>,
        flags: ReportFlags,
    ) -> Result<Report> {
        self.inner
            .attempt(ctx, |r| async move { r.report(ctx, group, vector, flags).await })
            .await
    }

    async fn close(&self) {
        // Wait out any reconnect in progress so it can't outlive the close
        let _guard = self.inner.last_recovery.lock().await;
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let reporter = self.inner.current.read().reporter.clone();
        reporter.close().await;
    }
}
