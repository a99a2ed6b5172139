//! # Warden Core
//!
//! Shared building blocks for coordination primitives that sit on top of a
//! hierarchical coordination service (ephemeral and persistent nodes,
//! children watches, sessions, distributed mutexes).
//!
//! ## Components
//!
//! - **Client Contract**: the [`CoordinationClient`] trait, the only seam the
//!   primitives use to reach the service
//! - **Types**: session ids, node metadata, children watch events
//! - **Paths**: validation and manipulation of node paths
//! - **Configuration**: connection settings and retry policy
//! - **Error Handling**: the [`CoordinationError`] taxonomy
//!
//! ```rust
//! use warden_core::{path::join_path, ChildEventKind};
//!
//! let candidate = join_path("/utils/autoswitch", "billing");
//! assert_eq!(candidate, "/utils/autoswitch/billing");
//! assert!(ChildEventKind::ConnectionLost.is_connection_event());
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod path;
pub mod types;

pub use client::{ChildrenWatch, CoordinationClient};
pub use config::{ClientConfig, RetryPolicy};
pub use error::*;
pub use types::*;

/// Milliseconds since the unix epoch.
pub fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}
