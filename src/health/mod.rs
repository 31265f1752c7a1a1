//! Endpoint health subsystem.
//!
//! # Data Flow
//! ```text
//! Connection management (endpoint.rs):
//!     Reconnection timer
//!     → Connector opens a reporter stack for the host
//!     → Update state.rs (online / offline)
//!
//! Call results (endpoint.rs):
//!     Call fails with a transport error
//!     → Discarded if the connection was replaced meanwhile
//!     → Otherwise state.rs goes offline and the timer fires immediately
//!
//! State machine (state.rs):
//!     Connecting → Online ←→ Offline → Closed
//! ```
//!
//! # Design Decisions
//! - Offline endpoints fail calls immediately instead of waiting on the
//!   transport
//! - Health state is per-host, shared by every replication group on it

pub mod endpoint;
pub mod state;

pub use endpoint::{Endpoint, EndpointConfig};
pub use state::EndpointState;
