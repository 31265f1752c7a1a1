//! Bounded worker pool for version vector lookups.
//!
//! Vector lookups are the expensive remote query, so they are queued onto a
//! fixed number of worker tasks. Backlog and report queries pass straight
//! through to the inner reporter.

use std::sync::Arc;
use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};
use crate::reporter::{GroupId, Report, ReportFlags, Reporter, Vector};

struct VectorJob {
    ctx: CancellationToken,
    group: GroupId,
    reply: oneshot::Sender<Result<Vector>>,
}

/// A reporter that runs at most `workers` vector lookups at a time.
pub struct Limiter {
    inner: Arc<dyn Reporter>,
    jobs: parking_lot::Mutex<Option<mpsc::Sender<VectorJob>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    size: usize,
}

impl Limiter {
    /// Create a limiter with a pool of `workers` tasks.
    pub fn new(inner: Arc<dyn Reporter>, workers: usize) -> Result<Self> {
        if workers == 0 {
            return Err(Error::ZeroWorkers);
        }

        let (tx, rx) = mpsc::channel(workers);
        let rx = Arc::new(Mutex::new(rx));
        let handles = (0..workers)
            .map(|id| tokio::spawn(work(id, inner.clone(), rx.clone())))
            .collect();

        Ok(Self {
            inner,
            jobs: parking_lot::Mutex::new(Some(tx)),
            workers: Mutex::new(handles),
            size: workers,
        })
    }

    /// Number of workers in the pool.
    pub fn workers(&self) -> usize {
        self.size
    }
}

async fn work(id: usize, inner: Arc<dyn Reporter>, jobs: Arc<Mutex<mpsc::Receiver<VectorJob>>>) {
    loop {
        let job = { jobs.lock().await.recv().await };
        let Some(job) = job else {
            tracing::trace!(worker = id, "Limiter worker stopped");
            return;
        };
        if job.reply.is_closed() || job.ctx.is_cancelled() {
            continue;
        }
        let result = inner.vector(&job.ctx, job.group).await;
        let _ = job.reply.send(result);
    }
}

#[async_trait]
impl Reporter for Limiter {
    async fn vector(&self, ctx: &CancellationToken, group: GroupId) -> Result<Vector> {
        let jobs = self.jobs.lock().clone().ok_or(Error::Closed)?;
        let (reply, response) = oneshot::channel();
        let job = VectorJob {
            ctx: ctx.clone(),
            group,
            reply,
        };

        tokio::select! {
            _ = ctx.cancelled() => return Err(Error::Canceled),
            sent = jobs.send(job) => sent.map_err(|_| Error::Closed)?,
        }
        drop(jobs);

        tokio::select! {
            _ = ctx.cancelled() => Err(Error::Canceled),
            result = response => result.unwrap_or(Err(Error::Closed)),
        }
    }

    async fn backlog(&self, ctx: &CancellationToken, vector: &Vector) -> Result<Vec<i64>> {
        self.inner.backlog(ctx, vector).await
    }

    async fn report(
        &self,
        ctx: &CancellationToken,
        group: GroupId,
        vector: Option<&Vector>,
        flags: ReportFlags,
    ) -> Result<Report> {
        self.inner.report(ctx, group, vector, flags).await
    }

    async fn close(&self) {
        // Dropping the sender lets the workers drain the queue and exit
        self.jobs.lock().take();
        let handles = std::mem::take(&mut *self.workers.lock().await);
        for handle in handles {
            let _ = handle.await;
        }
        self.inner.close().await;
    }
}
