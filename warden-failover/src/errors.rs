//! Error types for failover operations.

use thiserror::Error;
use warden_core::CoordinationError;

/// Result type for failover operations
pub type FailoverResult<T> = Result<T, FailoverError>;

/// Errors that can occur while registering a candidate or waiting for
/// ownership
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FailoverError {
    /// Coordination service call failed
    #[error("Coordination error: {0}")]
    Coordination(#[from] CoordinationError),

    /// Waiting for ownership before `register()`
    #[error("Controller for project {project} is not registered")]
    NotRegistered { project: String },

    /// `register()` called twice
    #[error("Controller for project {project} is already registered")]
    AlreadyRegistered { project: String },

    /// The controller was shut down while a caller waited for ownership
    #[error("Ownership wait interrupted for project {project}")]
    Interrupted { project: String },

    /// The connection was lost or suspended; the client has been closed
    #[error("Connection suspended for project {project}, controller closed its client")]
    Suspended { project: String },

    /// Configuration error
    #[error("Configuration error: {reason}")]
    Config { reason: String },

    /// Internal system error
    #[error("Internal system error: {reason}")]
    Internal { reason: String },
}

impl FailoverError {
    /// Whether the controller can no longer become owner without a new
    /// controller instance.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            FailoverError::Interrupted { .. } | FailoverError::Suspended { .. }
        )
    }
}

impl From<anyhow::Error> for FailoverError {
    fn from(err: anyhow::Error) -> Self {
        FailoverError::Internal {
            reason: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for FailoverError {
    fn from(err: serde_json::Error) -> Self {
        FailoverError::Config {
            reason: err.to_string(),
        }
    }
}
