//! Error types for the Hivegate service.

use std::time::Duration;
use thiserror::Error;

/// Main error type for Hivegate operations.
#[derive(Error, Debug)]
pub enum GateError {
    /// Configuration-related errors, raised once while building the gate
    #[error("Configuration error: {0}")]
    Config(String),

    /// The shared counter store could not complete an operation
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl GateError {
    /// Whether this error came from the counter store rather than from setup.
    pub fn is_store(&self) -> bool {
        matches!(self, GateError::Store(_))
    }
}

/// Failure of an atomic counter store operation.
///
/// A store failure is never an admission decision; callers pick the policy.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The store could not be reached or rejected the command
    #[error("counter store unavailable: {0}")]
    Unavailable(String),

    /// The store call did not finish in time
    #[error("counter store timed out after {0:?}")]
    Timeout(Duration),

    /// Compare-and-swap kept losing to concurrent writers
    #[error("compare-and-swap on '{key}' lost {attempts} consecutive races")]
    Contention { key: String, attempts: u32 },

    /// A stored value could not be decoded
    #[error("corrupt value stored under '{0}'")]
    Corrupt(String),
}

/// Result type alias for Hivegate operations.
pub type Result<T> = std::result::Result<T, GateError>;
