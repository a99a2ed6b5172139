//! # Warden Failover
//!
//! Single-slot failover among instances of the same project.
//!
//! Every instance tries to create the project's ephemeral candidate node
//! under a shared root (by default `/utils/autoswitch`) and watches the
//! root. Ownership is never stored in a payload: an instance is owner while
//! the candidate that exists was created by its own session. If the owner's
//! session ends, the service drops the node, the survivors race to recreate
//! it and the single winner promotes itself.
//!
//! ## Modules
//!
//! - [`decision`]: the pure state machine ([`decide`], [`owns_candidate`])
//! - [`controller`]: the [`FailoverController`] that drives it from a
//!   children watch
//! - [`config`]: [`FailoverConfig`]

pub mod config;
pub mod controller;
pub mod decision;
pub mod errors;

pub use config::{FailoverConfig, DEFAULT_ROOT};
pub use controller::{FailoverController, FailoverStats};
pub use decision::{decide, owns_candidate, Action, ControllerState};
pub use errors::{FailoverError, FailoverResult};
