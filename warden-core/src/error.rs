//! # Error Types
//!
//! Error taxonomy for operations issued against the coordination service.

use crate::SessionId;
use thiserror::Error;

/// Errors returned by a [`CoordinationClient`](crate::CoordinationClient).
///
/// The variants mirror the failure classes of a hierarchical coordination
/// service. Callers of the higher-level primitives mostly care about three
/// groups:
///
/// - **Contention**: [`NodeExists`](Self::NodeExists) is the expected outcome
///   of two sessions racing to create the same node.
/// - **Connectivity**: [`ConnectionLoss`](Self::ConnectionLoss) and
///   [`SessionExpired`](Self::SessionExpired) void everything that depends on
///   a live session.
/// - **Usage**: invalid paths, operating before `start()`, releasing a mutex
///   the session does not hold.
///
/// # Examples
///
/// ```rust
/// use warden_core::CoordinationError;
///
/// let error = CoordinationError::connection_loss("socket closed");
/// assert!(error.is_retryable());
///
/// let race = CoordinationError::NodeExists { path: "/a".into() };
/// assert!(race.is_node_exists());
/// ```
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CoordinationError {
    /// A node already exists at the path
    #[error("Node already exists: {path}")]
    NodeExists { path: String },

    /// No node exists at the path (or its parent for creates)
    #[error("No node: {path}")]
    NoNode { path: String },

    /// Node still has children and cannot be deleted
    #[error("Node has children: {path}")]
    NotEmpty { path: String },

    /// Ephemeral nodes cannot have children
    #[error("Ephemeral node cannot have children: {path}")]
    NoChildrenForEphemerals { path: String },

    /// Path is not a valid absolute node path
    #[error("Invalid path '{path}': {reason}")]
    InvalidPath { path: String, reason: String },

    /// Connection to the service is unavailable
    #[error("Connection loss: {message}")]
    ConnectionLoss { message: String },

    /// The session has ended and its ephemeral state is gone
    #[error("Session {session_id} expired")]
    SessionExpired { session_id: SessionId },

    /// Client has not been started yet
    #[error("Client not started")]
    NotStarted,

    /// Client has been closed
    #[error("Client closed")]
    Closed,

    /// Releasing a mutex this session does not hold
    #[error("Session does not hold the mutex at {path}")]
    NotLockHolder { path: String },

    /// Operation exceeded its time budget
    #[error("Timeout occurred: {operation}")]
    Timeout { operation: String },

    /// Invalid client configuration
    #[error("Configuration error: {reason}")]
    Config { reason: String },

    /// Unexpected internal error
    #[error("Internal error: {message}")]
    Internal { message: String },
}

/// Result type for coordination client operations.
pub type Result<T> = std::result::Result<T, CoordinationError>;

impl CoordinationError {
    /// Creates a new connection loss error with the given message.
    pub fn connection_loss(message: impl Into<String>) -> Self {
        Self::ConnectionLoss {
            message: message.into(),
        }
    }

    /// Creates a new configuration error.
    pub fn config(reason: impl Into<String>) -> Self {
        Self::Config {
            reason: reason.into(),
        }
    }

    /// Creates a new internal error with the given message.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Creates an invalid path error.
    pub fn invalid_path(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidPath {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Whether retrying the same operation later may succeed.
    ///
    /// Only transient connectivity problems qualify; an expired session never
    /// comes back and every other variant is deterministic.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::ConnectionLoss { .. } | Self::Timeout { .. })
    }

    /// Whether this is the losing side of a creation race.
    pub fn is_node_exists(&self) -> bool {
        matches!(self, Self::NodeExists { .. })
    }

    /// Whether the error means the session can no longer be used.
    pub fn is_session_fatal(&self) -> bool {
        matches!(self, Self::SessionExpired { .. } | Self::Closed)
    }
}

impl From<anyhow::Error> for CoordinationError {
    fn from(err: anyhow::Error) -> Self {
        CoordinationError::Internal {
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for CoordinationError {
    fn from(err: serde_json::Error) -> Self {
        CoordinationError::Config {
            reason: err.to_string(),
        }
    }
}
