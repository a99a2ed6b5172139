//! # Warden Memory
//!
//! An in-process coordination service implementing the
//! [`CoordinationClient`](warden_core::CoordinationClient) contract, used to
//! run and test the coordination primitives without an external ensemble.
//!
//! ## Features
//!
//! - **Sessions**: ephemeral nodes vanish when their session is closed or
//!   expires; sessions can be suspended, reconnected and expired on demand
//! - **Children Watches**: ordered child events with initial sync and
//!   rebuild after reconnection
//! - **Distributed Mutexes**: per-session, non-reentrant, released when the
//!   holding session ends

pub mod client;
pub mod coordinator;
pub mod tree;
pub mod watch;

pub use client::InMemoryClient;
pub use coordinator::{InMemoryCoordinator, SessionStatus};
