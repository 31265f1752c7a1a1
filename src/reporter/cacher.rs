use std::sync::Arc;
use std::time::Duration;
use async_trait::async_trait;
use futures_util::FutureExt;
use tokio_util::sync::CancellationToken;

use crate::cache::VersionVectorCache;
use crate::error::Result;
use crate::reporter::{GroupId, Report, ReportFlags, Reporter, Vector};

/// A reporter that serves version vectors from an expiring cache.
///
/// Concurrent lookups for the same group share one remote query.
pub struct Cacher {
    inner: Arc<dyn Reporter>,
    vectors: VersionVectorCache,
}

impl Cacher {
    pub fn new(inner: Arc<dyn Reporter>, ttl: Duration) -> Self {
        let source = inner.clone();
        let vectors = VersionVectorCache::new(ttl, move |group: GroupId, ctx: CancellationToken| {
            let source = source.clone();
            async move { source.vector(&ctx, group).await }.boxed()
        });
        Self { inner, vectors }
    }

    /// The cache backing vector lookups.
    pub fn vectors(&self) -> &VersionVectorCache {
        &self.vectors
    }
}

#[async_trait]
impl Reporter for Cacher {
    async fn vector(&self, ctx: &CancellationToken, group: GroupId) -> Result<Vector> {
        self.vectors.lookup(ctx, group).await
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
        self.vectors.close();
        self.inner.close().await;
    }
}
