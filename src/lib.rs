//! Replication backlog monitor library.
//!
//! Polls the health-report capability of every member of a file
//! replication domain and fans the per-connection backlog out to
//! subscribers.

pub mod cache;
pub mod callstat;
pub mod client;
pub mod config;
pub mod error;
pub mod health;
pub mod lifecycle;
pub mod monitor;
pub mod observability;
pub mod poller;
pub mod reporter;
pub mod topology;

pub use client::Client;
pub use config::schema::MonitorConfig;
pub use error::{Error, Result};
pub use lifecycle::Shutdown;
pub use monitor::Monitor;
