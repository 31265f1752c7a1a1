//! Outstanding call tracking.
//!
//! # Responsibilities
//! - Register calls as they begin and unregister them when they end
//! - Summarize outstanding calls for health evaluation

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use parking_lot::Mutex;
use tokio::time::Instant;

#[derive(Debug, Default)]
struct TrackerState {
    next_id: u64,
    outstanding: HashMap<u64, Instant>,
}

/// Tracks the number and age of outstanding calls.
#[derive(Debug, Clone, Default)]
pub struct CallTracker {
    state: Arc<Mutex<TrackerState>>,
}

impl CallTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new outstanding call. The call is considered finished when
    /// the returned guard is dropped.
    pub fn track(&self) -> TrackedCall {
        let mut state = self.state.lock();
        let id = state.next_id;
        state.next_id += 1;
        state.outstanding.insert(id, Instant::now());
        TrackedCall {
            id,
            state: self.state.clone(),
        }
    }

    /// Summarize the calls that are currently outstanding.
    pub fn stats(&self) -> CallStats {
        let state = self.state.lock();
        CallStats {
            outstanding: state.outstanding.len(),
            oldest: state.outstanding.values().min().copied(),
        }
    }
}

/// A RAII guard for an outstanding call.
#[derive(Debug)]
pub struct TrackedCall {
    id: u64,
    state: Arc<Mutex<TrackerState>>,
}

impl Drop for TrackedCall {
    fn drop(&mut self) {
        self.state.lock().outstanding.remove(&self.id);
    }
}

/// Snapshot of outstanding calls.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallStats {
    /// Number of calls currently in flight.
    pub outstanding: usize,
    /// Start time of the oldest call in flight.
    pub oldest: Option<Instant>,
}

impl CallStats {
    /// Time the oldest outstanding call has been running.
    pub fn max_elapsed(&self) -> Duration {
        self.oldest.map(|t| t.elapsed()).unwrap_or_default()
    }

    /// Returns true if any outstanding call has run longer than `threshold`.
    pub fn exceeds(&self, threshold: Duration) -> bool {
        self.outstanding > 0 && self.max_elapsed() > threshold
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_guard_unregisters() {
        let tracker = CallTracker::new();
        let first = tracker.track();
        tokio::time::sleep(Duration::from_secs(5)).await;
        let second = tracker.track();

        let stats = tracker.stats();
        assert_eq!(stats.outstanding, 2);
        assert_eq!(stats.max_elapsed(), Duration::from_secs(5));
        assert!(stats.exceeds(Duration::from_secs(4)));
        assert!(!stats.exceeds(Duration::from_secs(5)));

        drop(first);
        let stats = tracker.stats();
        assert_eq!(stats.outstanding, 1);
        assert_eq!(stats.max_elapsed(), Duration::ZERO);

        drop(second);
        assert_eq!(tracker.stats(), CallStats::default());
    }
}
