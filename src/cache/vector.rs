//! Expiring cache of reference version vectors.

use std::sync::Arc;
use std::time::Duration;
use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use tokio_util::sync::CancellationToken;

use crate::cache::expiring::ExpiringCache;
use crate::error::Result;
use crate::reporter::{GroupId, Vector};

/// A thread-safe expiring cache of version vectors keyed by replication
/// group.
///
/// Every read hands out a duplicate, so callers own what they receive and
/// the cached copy stays intact.
pub struct VersionVectorCache {
    cache: ExpiringCache<GroupId, Arc<Vector>>,
}

impl VersionVectorCache {
    /// Create a cache whose vectors survive for `ttl` and are retrieved with
    /// `lookup` on a miss.
    pub fn new<F>(ttl: Duration, lookup: F) -> Self
    where
        F: Fn(GroupId, CancellationToken) -> BoxFuture<'static, Result<Vector>>
            + Send
            + Sync
            + 'static,
    {
        let lookup = Arc::new(lookup);
        Self {
            cache: ExpiringCache::new(ttl, move |group: GroupId, ctx: CancellationToken| {
                let lookup = lookup.clone();
                async move { lookup(group, ctx).await.map(Arc::new) }.boxed()
            }),
        }
    }

    /// Return the vector for `group`, fetching it on a miss.
    pub async fn lookup(&self, ctx: &CancellationToken, group: GroupId) -> Result<Vector> {
        let vector = self.cache.lookup(ctx, group).await?;
        Ok(vector.duplicate())
    }

    /// Return the cached vector for `group` without fetching.
    pub fn value(&self, group: GroupId) -> Option<Vector> {
        self.cache.value(&group).map(|v| v.duplicate())
    }

    /// Cache `vector` for `group`, replacing any existing vector.
    pub fn set(&self, group: GroupId, vector: Vector) {
        self.cache.set(group, Arc::new(vector));
    }

    /// Drop every cached vector. Pending lookups are not affected.
    pub fn evict(&self) {
        self.cache.evict();
    }

    /// Release all vectors and prevent further use.
    pub fn close(&self) {
        self.cache.close();
    }
}
