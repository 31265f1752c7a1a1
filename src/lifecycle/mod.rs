//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Shutdown (shutdown.rs):
//!     Trigger → Monitor::run leaves its loop
//!     → Poller cancels the running round and waits for it
//!     → Client closes every endpoint
//!     → Broadcaster closes every subscription
//! ```
//!
//! # Design Decisions
//! - Ordered shutdown: stop polling, close connections, then subscribers
//! - Every long-running task subscribes independently

pub mod shutdown;

pub use shutdown::Shutdown;
