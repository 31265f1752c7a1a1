//! Domain backlog monitor.
//!
//! # Data Flow
//! ```text
//! Poller tick or Monitor::update
//!     → worker.rs reads the topology snapshot
//!     → broadcaster.rs creates one Update per subscription
//!     → worker.rs queries every enabled connection concurrently
//!     → update.rs fans each result out to the update's listeners
//! ```
//!
//! # Design Decisions
//! - The producer never blocks on a slow subscriber; each subscription
//!   has a forwarding task that waits on a full queue for at most the
//!   subscription's timeout before the round is skipped
//! - Each listener of an update is fed by its own task

pub mod broadcaster;
#[allow(clippy::module_inception)]
pub mod monitor;
pub mod update;
pub mod worker;

pub use broadcaster::{Broadcaster, Subscription, SubscriptionId};
pub use monitor::Monitor;
pub use update::Update;
pub use worker::Worker;
