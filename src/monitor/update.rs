//! A single polling round as seen by one subscriber.

use std::sync::Arc;
use std::time::Duration;
use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;

use crate::error::{Error, Result};
use crate::topology::{Backlog, TopologySnapshot};

#[derive(Debug, Clone, Copy, Default)]
struct Progress {
    start: Option<Instant>,
    end: Option<Instant>,
    received: bool,
    canceled: bool,
}

#[derive(Default)]
struct Collected {
    values: Vec<Arc<Backlog>>,
    listeners: Vec<mpsc::UnboundedSender<Arc<Backlog>>>,
    canceled: bool,
}

/// An in-progress polling round.
///
/// Results arrive in the order their computations finish. The number of
/// results is known up front, so listeners know when the round is over.
pub struct Update {
    topology: TopologySnapshot,
    size: usize,
    progress: watch::Sender<Progress>,
    collected: Mutex<Collected>,
}

impl Update {
    pub(crate) fn new(topology: TopologySnapshot, size: usize) -> Self {
        let (progress, _) = watch::channel(Progress {
            received: size == 0,
            ..Progress::default()
        });
        Self {
            topology,
            size,
            progress,
            collected: Mutex::new(Collected {
                values: Vec::with_capacity(size),
                ..Collected::default()
            }),
        }
    }

    /// Topology the round was computed from.
    pub fn topology(&self) -> &TopologySnapshot {
        &self.topology
    }

    /// Number of results the round will produce.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Returns a queue that receives every result of the round.
    ///
    /// Results received before the call are replayed first. The queue
    /// closes after the last result, or when the round is cancelled.
    pub fn listen(&self) -> mpsc::Receiver<Arc<Backlog>> {
        let (tx, rx) = mpsc::channel(self.size.max(1));
        if self.size == 0 {
            return rx;
        }

        let (queue, pending) = mpsc::unbounded_channel();
        {
            let mut collected = self.collected.lock();
            for value in &collected.values {
                let _ = queue.send(value.clone());
            }
            if !collected.canceled && collected.values.len() < self.size {
                collected.listeners.push(queue);
            }
        }

        tokio::spawn(deliver(pending, tx, self.size));
        rx
    }

    /// Wait for the round to finish and return its results in arrival
    /// order.
    pub async fn values(&self) -> Result<Vec<Arc<Backlog>>> {
        self.wait(|p| p.received || p.canceled).await;
        let collected = self.collected.lock();
        if collected.canceled {
            return Err(Error::Canceled);
        }
        Ok(collected.values.clone())
    }

    /// Abort the round. Listener queues close and [`Update::values`]
    /// returns [`Error::Canceled`]. Does nothing once every result has been
    /// received.
    pub fn cancel(&self) {
        {
            let mut collected = self.collected.lock();
            if collected.canceled || collected.values.len() == self.size {
                return;
            }
            collected.canceled = true;
            collected.listeners.clear();
        }
        self.progress.send_modify(|p| p.canceled = true);
    }

    pub fn is_canceled(&self) -> bool {
        self.progress.borrow().canceled
    }

    /// Time at which every computation of the round had been dispatched.
    /// `None` if the round was cancelled first.
    pub async fn start(&self) -> Option<Instant> {
        self.wait(|p| p.start.is_some() || p.canceled).await.start
    }

    /// Time at which every computation of the round had completed. `None`
    /// if the round was cancelled first.
    pub async fn end(&self) -> Option<Instant> {
        self.wait(|p| p.end.is_some() || p.canceled).await.end
    }

    /// Wall time of the round.
    pub async fn duration(&self) -> Option<Duration> {
        let progress = self.wait(|p| p.end.is_some() || p.canceled).await;
        Some(progress.end? - progress.start?)
    }

    pub(crate) fn send(&self, backlog: Arc<Backlog>) {
        let complete = {
            let mut collected = self.collected.lock();
            if collected.canceled || collected.values.len() >= self.size {
                return;
            }
            collected.values.push(backlog.clone());
            for listener in &collected.listeners {
                let _ = listener.send(backlog.clone());
            }
            let complete = collected.values.len() == self.size;
            if complete {
                collected.listeners.clear();
            }
            complete
        };
        if complete {
            self.progress.send_modify(|p| p.received = true);
        }
    }

    pub(crate) fn set_start(&self, at: Instant) {
        self.progress.send_modify(|p| p.start = Some(at));
    }

    pub(crate) fn set_end(&self, at: Instant) {
        self.progress.send_modify(|p| p.end = Some(at));
    }

    async fn wait(&self, ready: impl Fn(&Progress) -> bool) -> Progress {
        let mut rx = self.progress.subscribe();
        // The sender lives in self, so the wait can't fail
        let _ = rx.wait_for(|p| ready(p)).await;
        let progress = *rx.borrow();
        progress
    }
}

async fn deliver(
    mut pending: mpsc::UnboundedReceiver<Arc<Backlog>>,
    out: mpsc::Sender<Arc<Backlog>>,
    mut remaining: usize,
) {
    while remaining > 0 {
        let Some(value) = pending.recv().await else {
            return;
        };
        if out.send(value).await.is_err() {
            return;
        }
        remaining -= 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::SystemTime;
    use uuid::Uuid;

    use crate::callstat::Call;
    use crate::topology::{Domain, Target};

    fn snapshot() -> TopologySnapshot {
        TopologySnapshot {
            domain: Arc::new(Domain::default()),
            timestamp: SystemTime::now(),
        }
    }

    fn backlog(from: &str) -> Arc<Backlog> {
        let target = Target {
            group_name: "G".into(),
            group_id: Uuid::nil(),
            folders: Vec::new(),
            from: from.into(),
            to: "y".into(),
        };
        Arc::new(Backlog::new(target, Ok(Vec::new()), Call::begin("test")))
    }

    async fn drain(mut rx: mpsc::Receiver<Arc<Backlog>>) -> Vec<String> {
        let mut hosts = Vec::new();
        while let Some(value) = rx.recv().await {
            hosts.push(value.from.clone());
        }
        hosts
    }

    #[tokio::test]
    async fn test_late_listener_gets_replay() {
        let update = Update::new(snapshot(), 3);
        let early = update.listen();

        update.send(backlog("a"));
        let late = update.listen();
        update.send(backlog("b"));
        update.send(backlog("c"));

        assert_eq!(drain(early).await, vec!["a", "b", "c"]);
        assert_eq!(drain(late).await, vec!["a", "b", "c"]);

        let values = update.values().await.unwrap();
        assert_eq!(values.len(), 3);
        assert_eq!(values[2].from, "c");
    }

    #[tokio::test]
    async fn test_cancel_closes_listeners() {
        let update = Arc::new(Update::new(snapshot(), 2));
        let rx = update.listen();
        update.send(backlog("a"));

        let waiter = {
            let update = update.clone();
            tokio::spawn(async move { update.values().await })
        };
        update.cancel();

        assert_eq!(waiter.await.unwrap().unwrap_err(), Error::Canceled);
        assert!(drain(rx).await.len() <= 1);
        assert_eq!(update.end().await, None);
        assert!(update.is_canceled());
    }

    #[tokio::test]
    async fn test_cancel_after_completion_keeps_results() {
        let update = Update::new(snapshot(), 2);
        update.send(backlog("a"));
        update.send(backlog("b"));

        update.cancel();
        assert!(!update.is_canceled());
        let values = update.values().await.unwrap();
        assert_eq!(values.len(), 2);
        assert_eq!(drain(update.listen()).await, vec!["a", "b"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timing() {
        let update = Update::new(snapshot(), 0);
        assert!(update.values().await.unwrap().is_empty());

        let start = Instant::now();
        update.set_start(start);
        tokio::time::advance(Duration::from_secs(3)).await;
        update.set_end(Instant::now());

        assert_eq!(update.start().await, Some(start));
        assert_eq!(update.duration().await, Some(Duration::from_secs(3)));
    }
}
