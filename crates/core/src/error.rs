//! Error types for eventbench
//!
//! One error enum is shared by every layer: backends convert their driver
//! errors at the boundary, strategies and the runner propagate with `?`.
//! We use `thiserror` for automatic `Display` and `Error` trait implementations.

use crate::types::CompositeKey;
use std::io;
use std::time::Duration;
use thiserror::Error;

/// Result type alias for eventbench operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for the benchmark harness and its backends
#[derive(Debug, Error)]
pub enum Error {
    /// The operation observed the cancellation token
    #[error("operation cancelled")]
    Cancelled,

    /// Insert violated the composite uniqueness constraint
    #[error("duplicate key: {0}")]
    DuplicateKey(CompositeKey),

    /// The target table does not exist (schema not created)
    #[error("no such table: {0}")]
    NoSuchTable(String),

    /// A prepared statement was used after it was closed
    #[error("statement {0} is closed")]
    StatementClosed(u64),

    /// The backend cannot prepare this statement kind
    #[error("backend '{backend}' does not support the {statement} statement")]
    Unsupported {
        /// Backend name
        backend: &'static str,
        /// Statement kind that was requested
        statement: &'static str,
    },

    /// Statement parameters did not match what the statement expects
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// A row was not in the shape the caller expected
    #[error("unexpected row: {0}")]
    UnexpectedRow(String),

    /// Waiting for a row lock exceeded the configured timeout
    #[error("lock wait timeout exceeded after {0:?}")]
    LockWaitTimeout(Duration),

    /// A transaction was used after commit or rollback
    #[error("transaction is no longer active")]
    TransactionNotActive,

    /// Could not establish a backend connection
    #[error("connection error: {0}")]
    Connection(String),

    /// Error reported by the backend driver
    #[error("backend error: {0}")]
    Backend(String),

    /// Invalid configuration or backend target
    #[error("configuration error: {0}")]
    Config(String),

    /// Payload serialization failed
    #[error("serialization error: {0}")]
    Serialization(String),

    /// I/O error (thread spawn, files, output sink)
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl Error {
    /// Whether this error is the cancellation variant
    ///
    /// Workers additionally treat *any* error raised while the token is set
    /// as benign; this only identifies errors produced by the token itself.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Error::Cancelled)
    }

    /// Build a backend error from any displayable driver error
    pub fn backend(err: impl std::fmt::Display) -> Self {
        Error::Backend(err.to_string())
    }

    /// Build a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }
}
