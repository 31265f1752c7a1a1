//! Error definitions shared by the client, cache and polling stack.

use std::time::Duration;
use thiserror::Error;

/// Errors that can occur while querying replication members.
///
/// Errors are cloneable because a single pending fetch hands the same
/// outcome to every caller that joined it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// The remote server could not be reached.
    #[error("the remote server is unavailable: {0}")]
    Unavailable(String),

    /// The remote server answered with a failure.
    #[error("remote call failed: {0}")]
    Remote(String),

    /// The endpoint has not established a connection yet.
    #[error("endpoint is not connected")]
    Disconnected,

    /// Outstanding calls have exceeded the acceptable call duration.
    #[error("endpoint has calls outstanding for longer than {0:?}")]
    Unresponsive(Duration),

    /// The interface is closing or already closed.
    #[error("interface is closing or already closed")]
    Closed,

    /// The caller stopped waiting for the result.
    #[error("operation canceled")]
    Canceled,

    /// A limiter was created without any workers.
    #[error("zero workers were specified for the limiter")]
    ZeroWorkers,

    /// The request was malformed.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The replication topology could not be read.
    #[error("topology unavailable: {0}")]
    Topology(String),
}

impl Error {
    /// Returns true if the error indicates that a server is disconnected or
    /// offline.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Error::Unavailable(_))
    }

    /// Returns true for errors that must never be retried.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Error::Closed | Error::Canceled)
    }
}

/// Result type for replication queries.
pub type Result<T> = std::result::Result<T, Error>;
