//! Error types for ID allocation.

use std::time::Duration;
use thiserror::Error;
use warden_core::CoordinationError;

/// Result type for ID allocation operations
pub type IdGenResult<T> = Result<T, IdGenError>;

/// Errors that can occur while checking out segments or rendering IDs
#[derive(Error, Debug, Clone, PartialEq)]
pub enum IdGenError {
    /// Coordination service call failed
    #[error("Coordination error: {0}")]
    Coordination(#[from] CoordinationError),

    /// IDs requested before `init()`
    #[error("Allocator not initialized")]
    NotInitialized,

    /// The counter mutex could not be acquired in time
    #[error("Timed out after {timeout:?} waiting for the mutex on {path}")]
    LockTimeout { path: String, timeout: Duration },

    /// The shared counter does not hold a non-negative decimal integer
    #[error("Malformed counter at {path} ({payload:?}): {reason}")]
    MalformedCounter {
        path: String,
        payload: String,
        reason: String,
    },

    /// Advancing the shared counter would overflow
    #[error("Counter at {path} exhausted: {point} + {interval} overflows")]
    CounterExhausted {
        path: String,
        point: i64,
        interval: i64,
    },

    /// A rendered ID contains a symbol outside the alphabet
    #[error("Invalid symbol {symbol:?} at position {position}")]
    InvalidSymbol { symbol: char, position: usize },

    /// A rendered ID does not fit in 64 bits
    #[error("Rendered ID {input:?} overflows 64 bits")]
    SymbolOverflow { input: String },

    /// Configuration error
    #[error("Configuration error: {reason}")]
    Config { reason: String },

    /// Internal system error
    #[error("Internal system error: {reason}")]
    Internal { reason: String },
}

impl From<anyhow::Error> for IdGenError {
    fn from(err: anyhow::Error) -> Self {
        IdGenError::Internal {
            reason: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for IdGenError {
    fn from(err: serde_json::Error) -> Self {
        IdGenError::Config {
            reason: err.to_string(),
        }
    }
}
