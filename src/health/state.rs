//! Endpoint health state.
//!
//! # States
//! - Connecting: no connection attempt has finished, callers wait
//! - Online: the last connection attempt succeeded and no call has failed
//!   with a transport error since
//! - Offline: the endpoint holds an error, calls fail immediately
//! - Closed: terminal, no further mutation
//!
//! # State Transitions
//! ```text
//! Connecting → Online: connection established
//! Connecting → Offline: connection failed
//! Online → Offline: call on the current connection reports unavailability
//! Offline → Online: reconnection succeeded
//! any → Closed: endpoint closed
//! ```
//!
//! Unresponsiveness is derived rather than stored: an online endpoint is
//! unresponsive while its oldest outstanding call has run longer than the
//! acceptable call duration.

use std::time::Duration;
use tokio::time::Instant;

use crate::callstat::CallStats;
use crate::error::Error;

/// The current condition of an endpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct EndpointState {
    /// Last connection or call error. `None` when online.
    pub error: Option<Error>,
    /// Last time the error changed.
    pub changed_at: Instant,
    /// Last time the state was updated.
    pub updated_at: Instant,
    /// Last time a call completed on the endpoint.
    pub idle_since: Option<Instant>,
    /// Outstanding calls at the time the state was read.
    pub calls: CallStats,
}

impl EndpointState {
    pub(crate) fn new(now: Instant) -> Self {
        Self {
            error: Some(Error::Disconnected),
            changed_at: now,
            updated_at: now,
            idle_since: None,
            calls: CallStats::default(),
        }
    }

    pub fn is_online(&self) -> bool {
        self.error.is_none()
    }

    pub fn is_closed(&self) -> bool {
        self.error == Some(Error::Closed)
    }

    /// Returns true if the endpoint has calls that have been running longer
    /// than `threshold`.
    pub fn is_unresponsive(&self, threshold: Duration) -> bool {
        self.calls.exceeds(threshold)
    }

    /// Record `error` as of `when`. Closed states are never modified.
    pub(crate) fn set_error(&mut self, error: Option<Error>, when: Instant) {
        if self.is_closed() {
            return;
        }
        if self.error != error {
            self.changed_at = when;
        }
        self.error = error;
        self.updated_at = when;
    }
}
