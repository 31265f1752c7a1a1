//! Health-report capability and its decorators.
//!
//! # Data Flow
//! ```text
//! Endpoint call
//!     → cacher.rs (vector lookups served from the version vector cache)
//!     → limiter.rs (vector lookups queued onto a fixed worker pool)
//!     → durable.rs (retry, reconnect through the Connector when needed)
//!     → Reporter opened by the Connector (remote server)
//! ```
//!
//! # Design Decisions
//! - Every layer implements the same `Reporter` trait and wraps exactly one
//!   inner reporter
//! - Only `vector` is cached and throttled; backlog and report queries pass
//!   through
//! - The remote transport lives behind `Connector`, which is supplied by the
//!   caller

pub mod cacher;
pub mod durable;
pub mod limiter;
pub mod types;

use std::sync::Arc;
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::Result;

pub use cacher::Cacher;
pub use durable::DurableReporter;
pub use limiter::Limiter;
pub use types::{GroupId, Report, ReportFlags, Vector};

/// Access to the health-report capability of one replication member.
///
/// Implementations must be safe to share between tasks. Callers stop waiting
/// as soon as `ctx` is cancelled, whether or not the implementation aborts
/// the remote call.
#[async_trait]
pub trait Reporter: Send + Sync {
    /// Reference version vector for a replication group.
    async fn vector(&self, ctx: &CancellationToken, group: GroupId) -> Result<Vector>;

    /// Per-folder backlog counts compared against a reference vector.
    ///
    /// A negative count marks a folder whose query failed.
    async fn backlog(&self, ctx: &CancellationToken, vector: &Vector) -> Result<Vec<i64>>;

    /// Generate a health report for a replication group.
    async fn report(
        &self,
        ctx: &CancellationToken,
        group: GroupId,
        vector: Option<&Vector>,
        flags: ReportFlags,
    ) -> Result<Report>;

    /// Release the resources held by the reporter.
    async fn close(&self);
}

/// Opens reporters for remote hosts.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Connect to the health-report capability of `host`.
    async fn connect(&self, host: &str) -> Result<Arc<dyn Reporter>>;
}
