//! Call statistics subsystem.
//!
//! # Data Flow
//! ```text
//! Client.Backlog
//!     → call.rs (one Call record per hop, nested sub-calls)
//!     → attached to each Backlog for diagnostics
//!
//! Endpoint calls
//!     → tracker.rs (register outstanding call, RAII guard)
//!     → CallStats sampled by the endpoint state machine
//!     → unresponsiveness derived from the oldest outstanding call
//! ```
//!
//! # Design Decisions
//! - Records are plain values; composing them never takes a lock
//! - Tracking is guard based so a cancelled future still unregisters
//! - Timestamps use Tokio's clock so paused-time tests stay deterministic

pub mod call;
pub mod tracker;

pub use call::Call;
pub use tracker::{CallStats, CallTracker, TrackedCall};
