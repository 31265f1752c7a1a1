//! Fan-out of polling rounds to subscribers.

use std::sync::Arc;
use std::time::Duration;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::monitor::Update;
use crate::topology::TopologySnapshot;

/// Identifies a subscription for [`Broadcaster::unlisten`].
pub type SubscriptionId = u64;

/// A long-lived subscription to polling rounds.
///
/// Every round produces one [`Update`] for each subscription. The queue
/// closes when the subscription is removed or the broadcaster is closed.
#[derive(Debug)]
pub struct Subscription {
    id: SubscriptionId,
    updates: mpsc::Receiver<Arc<Update>>,
}

impl Subscription {
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Receive the next round. Returns `None` once the subscription is
    /// closed.
    pub async fn recv(&mut self) -> Option<Arc<Update>> {
        self.updates.recv().await
    }

    pub fn try_recv(&mut self) -> Option<Arc<Update>> {
        self.updates.try_recv().ok()
    }
}

#[derive(Default)]
struct Subscribers {
    next_id: SubscriptionId,
    queues: Vec<(SubscriptionId, mpsc::UnboundedSender<Arc<Update>>)>,
    closed: bool,
}

/// Hands each polling round to every subscriber without blocking the
/// producer.
#[derive(Default)]
pub struct Broadcaster {
    subscribers: Mutex<Subscribers>,
}

impl Broadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a subscription whose queue holds up to `buffer` rounds.
    ///
    /// When the queue is full a round waits for space for up to `timeout`
    /// and is skipped afterwards. With no timeout rounds wait indefinitely
    /// and none are lost. Rounds are delivered in order either way.
    pub fn listen(&self, buffer: usize, timeout: Option<Duration>) -> Subscription {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        let mut subscribers = self.subscribers.lock();
        let id = subscribers.next_id;
        subscribers.next_id += 1;
        if !subscribers.closed {
            let (queue, pending) = mpsc::unbounded_channel();
            subscribers.queues.push((id, queue));
            tokio::spawn(forward(id, pending, tx, timeout));
        }
        Subscription { id, updates: rx }
    }

    /// Remove a subscription. Its queue closes once rounds already handed
    /// to it have been delivered or skipped. Returns false if it was not
    /// registered.
    pub fn unlisten(&self, id: SubscriptionId) -> bool {
        let mut subscribers = self.subscribers.lock();
        let before = subscribers.queues.len();
        subscribers.queues.retain(|(sid, _)| *sid != id);
        subscribers.queues.len() != before
    }

    /// Number of registered subscriptions.
    pub fn len(&self) -> usize {
        self.subscribers.lock().queues.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Start a round of `size` results and hand it to every subscriber.
    ///
    /// Returns one update per live subscription, which the producer feeds
    /// with results. Subscriptions whose receiver was dropped are removed.
    pub fn broadcast(&self, topology: TopologySnapshot, size: usize) -> Vec<Arc<Update>> {
        let mut subscribers = self.subscribers.lock();
        let mut updates = Vec::with_capacity(subscribers.queues.len());

        subscribers.queues.retain(|(id, queue)| {
            let update = Arc::new(Update::new(topology.clone(), size));
            if queue.send(update.clone()).is_err() {
                tracing::debug!(subscription = id, "Subscriber dropped");
                return false;
            }
            updates.push(update);
            true
        });

        updates
    }

    /// Close every subscription. Later subscriptions are closed on
    /// creation.
    pub fn close(&self) {
        let mut subscribers = self.subscribers.lock();
        subscribers.closed = true;
        subscribers.queues.clear();
    }
}

/// Moves rounds from the unbounded hand-off queue into the subscriber's
/// bounded queue, one at a time.
async fn forward(
    id: SubscriptionId,
    mut pending: mpsc::UnboundedReceiver<Arc<Update>>,
    out: mpsc::Sender<Arc<Update>>,
    timeout: Option<Duration>,
) {
    loop {
        let update = tokio::select! {
            _ = out.closed() => return,
            update = pending.recv() => match update {
                Some(update) => update,
                None => return,
            },
        };

        let sent = match timeout {
            Some(timeout) => match out.send_timeout(update, timeout).await {
                Ok(()) => true,
                Err(mpsc::error::SendTimeoutError::Timeout(_)) => {
                    tracing::warn!(subscription = id, ?timeout, "Subscriber queue full, skipping round");
                    true
                }
                Err(mpsc::error::SendTimeoutError::Closed(_)) => false,
            },
            None => out.send(update).await.is_ok(),
        };
        if !sent {
            return;
        }
    }
}
