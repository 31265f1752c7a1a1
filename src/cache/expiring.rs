//! Generic expiring cache with single-flight lookups.
//!
//! # Responsibilities
//! - Serve unexpired values from memory
//! - Collapse concurrent misses for one key into a single fetch
//! - Expire entries in insertion order with a self-terminating sweep task
//!
//! # Design Decisions
//! - Every entry shares one TTL, so a FIFO log is already in expiry order
//! - The sweep task only exists while the log is non-empty
//! - Failed fetches are never cached
//! - Cancelling a waiter detaches it; the fetch keeps running for the others

use std::collections::{HashMap, VecDeque};
use std::hash::Hash;
use std::sync::{Arc, Weak};
use std::time::Duration;
use futures_util::future::BoxFuture;
use parking_lot::RwLock;
use tokio::sync::watch;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};
use crate::observability::metrics;

/// Initial capacity of the cache's internal collections.
const CACHE_SIZE: usize = 32;

/// Function used to retrieve values on a cache miss.
pub type Lookup<K, V> =
    Arc<dyn Fn(K, CancellationToken) -> BoxFuture<'static, Result<V>> + Send + Sync>;

/// Outcome slot shared by every caller waiting on one fetch.
type Outcome<V> = Option<Result<V>>;

struct Entry<V> {
    inserted: Instant,
    value: V,
}

struct State<K, V> {
    data: HashMap<K, Entry<V>>,
    pending: HashMap<K, watch::Receiver<Outcome<V>>>,
    log: VecDeque<(Instant, K)>,
    sweeping: bool,
    closed: bool,
}

struct Shared<K, V> {
    ttl: Duration,
    lookup: Lookup<K, V>,
    state: RwLock<State<K, V>>,
    /// Cancelled on close so that in-flight fetches can wind down.
    shutdown: CancellationToken,
}

/// A thread-safe expiring cache that passes misses through to a lookup
/// function.
pub struct ExpiringCache<K, V> {
    shared: Arc<Shared<K, V>>,
}

impl<K, V> ExpiringCache<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// Create a cache whose values survive for `ttl` and are retrieved with
    /// `lookup`.
    pub fn new<F>(ttl: Duration, lookup: F) -> Self
    where
        F: Fn(K, CancellationToken) -> BoxFuture<'static, Result<V>> + Send + Sync + 'static,
    {
        Self {
            shared: Arc::new(Shared {
                ttl,
                lookup: Arc::new(lookup),
                state: RwLock::new(State {
                    data: HashMap::with_capacity(CACHE_SIZE),
                    pending: HashMap::with_capacity(CACHE_SIZE),
                    log: VecDeque::with_capacity(CACHE_SIZE),
                    sweeping: false,
                    closed: false,
                }),
                shutdown: CancellationToken::new(),
            }),
        }
    }

    /// Duration for which values remain valid.
    pub fn ttl(&self) -> Duration {
        self.shared.ttl
    }

    /// Return the value for `key`, fetching it if it is missing or expired.
    ///
    /// Concurrent callers for the same missing key share one fetch. If `ctx`
    /// is cancelled the caller stops waiting and receives `Error::Canceled`,
    /// but the fetch continues and its result is still cached.
    pub async fn lookup(&self, ctx: &CancellationToken, key: K) -> Result<V> {
        // Fast path with the read lock
        {
            let state = self.shared.state.read();
            if state.closed {
                return Err(Error::Closed);
            }
            if let Some(value) = self.shared.live(&state, &key) {
                metrics::record_cache_lookup(true);
                return Ok(value);
            }
        }

        // Slow path with the write lock
        let mut rx = {
            let mut state = self.shared.state.write();
            if state.closed {
                return Err(Error::Closed);
            }
            if let Some(value) = self.shared.live(&state, &key) {
                metrics::record_cache_lookup(true);
                return Ok(value);
            }
            metrics::record_cache_lookup(false);
            self.shared.pend(&mut state, key)
        };

        tokio::select! {
            _ = ctx.cancelled() => Err(Error::Canceled),
            outcome = rx.wait_for(Option::is_some) => match outcome {
                Ok(outcome) => (*outcome).clone().unwrap_or(Err(Error::Closed)),
                Err(_) => Err(Error::Closed),
            },
        }
    }

    /// Return the value for `key` if it is cached and unexpired. Never
    /// triggers a fetch.
    pub fn value(&self, key: &K) -> Option<V> {
        let state = self.shared.state.read();
        if state.closed {
            return None;
        }
        self.shared.live(&state, key)
    }

    /// Save `value` for `key`, replacing any existing value.
    ///
    /// Does nothing once the cache is closed.
    pub fn set(&self, key: K, value: V) {
        let now = Instant::now();
        let mut state = self.shared.state.write();
        if state.closed {
            return;
        }
        self.shared.insert(&mut state, now, key, value);
    }

    /// Drop every cached value. Pending fetches are not affected.
    pub fn evict(&self) {
        let data = {
            let mut state = self.shared.state.write();
            if state.closed {
                return;
            }
            state.log.clear();
            std::mem::replace(&mut state.data, HashMap::with_capacity(CACHE_SIZE))
        };
        drop(data);
    }

    /// Number of entries held in memory, including expired entries that the
    /// sweep task has not reached yet.
    pub fn len(&self) -> usize {
        self.shared.state.read().data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns true once `close` has been called.
    pub fn is_closed(&self) -> bool {
        self.shared.state.read().closed
    }

    /// Release every cached value and prevent further use of the cache.
    ///
    /// Values are dropped on a background task when a runtime is available.
    pub fn close(&self) {
        let data = {
            let mut state = self.shared.state.write();
            if state.closed {
                return;
            }
            state.closed = true;
            state.pending.clear();
            state.log.clear();
            std::mem::take(&mut state.data)
        };
        self.shared.shutdown.cancel();

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move { drop(data) });
            }
            Err(_) => drop(data),
        }
    }
}

impl<K, V> Shared<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// Return the unexpired value for `key`. The caller must hold a lock.
    fn live(&self, state: &State<K, V>, key: &K) -> Option<V> {
        state
            .data
            .get(key)
            .filter(|entry| entry.inserted + self.ttl > Instant::now())
            .map(|entry| entry.value.clone())
    }

    /// Register or join the pending fetch for `key`. The caller must hold
    /// the write lock.
    fn pend(self: &Arc<Self>, state: &mut State<K, V>, key: K) -> watch::Receiver<Outcome<V>> {
        if let Some(rx) = state.pending.get(&key) {
            return rx.clone();
        }

        let (tx, rx) = watch::channel(None);
        state.pending.insert(key.clone(), rx.clone());

        let shared = self.clone();
        tokio::spawn(async move { shared.retrieve(key, tx).await });
        rx
    }

    async fn retrieve(self: Arc<Self>, key: K, tx: watch::Sender<Outcome<V>>) {
        let outcome = (self.lookup)(key.clone(), self.shutdown.child_token()).await;
        let now = Instant::now();

        {
            let mut state = self.state.write();
            if !state.closed {
                match &outcome {
                    Ok(value) => self.insert(&mut state, now, key.clone(), value.clone()),
                    Err(e) => tracing::debug!(error = %e, "Cache fetch failed"),
                }
                state.pending.remove(&key);
            }
        }

        tx.send_replace(Some(outcome));
    }

    /// Insert an entry and its log record. The caller must hold the write
    /// lock.
    fn insert(self: &Arc<Self>, state: &mut State<K, V>, now: Instant, key: K, value: V) {
        state.data.insert(key.clone(), Entry { inserted: now, value });
        state.log.push_back((now, key));

        if !state.sweeping {
            state.sweeping = true;
            let first = now + self.ttl;
            tokio::spawn(sweep(Arc::downgrade(self), first));
        }
    }

    /// Remove expired entries and return the next deadline, if any entries
    /// remain in the log. The caller must hold the write lock.
    fn expire(&self, state: &mut State<K, V>, now: Instant) -> Option<Instant> {
        if state.closed {
            return None;
        }
        while let Some((inserted, key)) = state.log.pop_front() {
            let deadline = inserted + self.ttl;
            if deadline > now {
                state.log.push_front((inserted, key));
                return Some(deadline);
            }

            // The entry may have been refreshed after this log record was
            // written, so check its own timestamp.
            let expired = state
                .data
                .get(&key)
                .is_some_and(|entry| entry.inserted + self.ttl <= now);
            if expired {
                state.data.remove(&key);
            }
        }
        None
    }
}

/// Sweep task. Runs until the expiration log is drained, the cache is closed
/// or the cache is dropped.
async fn sweep<K, V>(shared: Weak<Shared<K, V>>, mut next: Instant)
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    loop {
        tokio::time::sleep_until(next).await;

        let deadline = {
            let Some(shared) = shared.upgrade() else {
                return;
            };
            let mut state = shared.state.write();
            let deadline = shared.expire(&mut state, Instant::now());
            if deadline.is_none() {
                state.sweeping = false;
            }
            deadline
        };

        match deadline {
            Some(deadline) => next = deadline,
            None => return,
        }
    }
}
