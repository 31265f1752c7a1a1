//! Interval and on-demand polling.
//!
//! # Responsibilities
//! - Invoke a polling source on a fixed interval
//! - Invoke it immediately when asked to
//! - Never run more than one invocation at a time
//!
//! # Design Decisions
//! - Ticks that come due while an invocation is running are dropped; the
//!   next tick stays on the original schedule
//! - Requests made while an invocation is running collapse into a single
//!   follow-up invocation
//! - Closing cancels the running invocation and waits for it before the
//!   source is closed

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;

/// Something that can be polled.
#[async_trait]
pub trait Source: Send + Sync {
    /// Perform one polling pass. `ctx` is cancelled when the poller closes.
    async fn poll(&self, ctx: CancellationToken);

    /// Release the resources held by the source.
    async fn close(&self);
}

/// Runs a [`Source`] on an interval.
///
/// The first interval-driven invocation happens one interval after the
/// poller is created. Call [`Poller::poll`] for an immediate one.
pub struct Poller {
    source: Arc<dyn Source>,
    pulse: mpsc::Sender<()>,
    shutdown: CancellationToken,
    control: Mutex<Option<JoinHandle<()>>>,
    closed: AtomicBool,
}

impl Poller {
    pub fn new(source: Arc<dyn Source>, interval: Duration) -> Self {
        let interval = interval.max(Duration::from_millis(1));
        let (pulse, pulses) = mpsc::channel(1);
        let shutdown = CancellationToken::new();
        let control = tokio::spawn(run(source.clone(), interval, pulses, shutdown.clone()));

        Self {
            source,
            pulse,
            shutdown,
            control: Mutex::new(Some(control)),
            closed: AtomicBool::new(false),
        }
    }

    /// Request an immediate invocation without waiting for it.
    ///
    /// If an invocation is already running, one more is made after it
    /// completes, no matter how many requests arrive in the meantime.
    pub fn poll(&self) {
        if self.closed.load(Ordering::Acquire) {
            return;
        }
        // A full queue already holds a pending request
        let _ = self.pulse.try_send(());
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Stop polling, wait for a running invocation to wind down, then close
    /// the source.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.shutdown.cancel();

        let control = self.control.lock().await.take();
        if let Some(control) = control {
            let _ = control.await;
        }

        self.source.close().await;
    }
}

impl Drop for Poller {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

async fn run(
    source: Arc<dyn Source>,
    interval: Duration,
    mut pulses: mpsc::Receiver<()>,
    shutdown: CancellationToken,
) {
    let mut next_tick = Instant::now() + interval;

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => return,
            _ = sleep_until(next_tick) => {}
            Some(()) = pulses.recv() => {}
        }

        source.poll(shutdown.child_token()).await;

        let now = Instant::now();
        while next_tick <= now {
            next_tick += interval;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use tokio::sync::Notify;

    #[derive(Default)]
    struct Blocking {
        calls: AtomicUsize,
        release: Notify,
        cancelled: AtomicBool,
        closed: AtomicBool,
    }

    #[async_trait]
    impl Source for Blocking {
        async fn poll(&self, ctx: CancellationToken) {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call == 0 {
                tokio::select! {
                    _ = self.release.notified() => {}
                    _ = ctx.cancelled() => self.cancelled.store(true, Ordering::SeqCst),
                }
            }
        }

        async fn close(&self) {
            assert!(self.calls.load(Ordering::SeqCst) > 0);
            self.closed.store(true, Ordering::SeqCst);
        }
    }

    async fn wait_for_calls(source: &Blocking, n: usize) {
        while source.calls.load(Ordering::SeqCst) < n {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_pulses_coalesce() {
        let source = Arc::new(Blocking::default());
        let poller = Poller::new(source.clone(), Duration::from_secs(3600));

        poller.poll();
        wait_for_calls(&source, 1).await;

        for _ in 0..10 {
            poller.poll();
        }
        source.release.notify_one();
        wait_for_calls(&source, 2).await;

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(source.calls.load(Ordering::SeqCst), 2);

        poller.close().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_ticks_during_invocation_are_dropped() {
        struct Slow(AtomicUsize);

        #[async_trait]
        impl Source for Slow {
            async fn poll(&self, _ctx: CancellationToken) {
                if self.0.fetch_add(1, Ordering::SeqCst) == 0 {
                    tokio::time::sleep(Duration::from_secs(25)).await;
                }
            }

            async fn close(&self) {}
        }

        let source = Arc::new(Slow(AtomicUsize::new(0)));
        let poller = Poller::new(source.clone(), Duration::from_secs(10));

        // First tick at 10s runs until 35s; the ticks at 20s and 30s are dropped
        tokio::time::sleep(Duration::from_secs(39)).await;
        assert_eq!(source.0.load(Ordering::SeqCst), 1);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(source.0.load(Ordering::SeqCst), 2);

        poller.close().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_cancels_running_invocation() {
        let source = Arc::new(Blocking::default());
        let poller = Poller::new(source.clone(), Duration::from_secs(3600));

        poller.poll();
        wait_for_calls(&source, 1).await;

        poller.close().await;
        assert!(source.cancelled.load(Ordering::SeqCst));
        assert!(source.closed.load(Ordering::SeqCst));

        poller.poll();
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
    }
}
