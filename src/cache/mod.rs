//! Caching subsystem.
//!
//! # Data Flow
//! ```text
//! Cacher.vector(group)
//!     → vector.rs (VersionVectorCache, duplicates on read)
//!     → expiring.rs (hit: return value)
//!     → expiring.rs (miss: join or start the single pending fetch)
//!     → lookup function (wrapped reporter)
//! ```
//!
//! # Design Decisions
//! - One read-write lock guards the map, the pending set and the expiry log
//! - Hits only take the read lock
//! - Entries expire after a fixed duration, enforced lazily by a sweep task

pub mod expiring;
pub mod vector;

pub use expiring::{ExpiringCache, Lookup};
pub use vector::VersionVectorCache;
