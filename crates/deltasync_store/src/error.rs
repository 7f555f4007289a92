//! Error types for store operations.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A document or journal line could not be (de)serialized.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The journal or snapshot is corrupted.
    #[error("store corrupted: {0}")]
    Corrupted(String),

    /// A transaction was aborted by its closure.
    #[error("transaction aborted: {reason}")]
    TransactionAborted {
        /// Reason for abort.
        reason: String,
    },

    /// The document is not a valid record for the table.
    #[error("invalid document in table {table}: {message}")]
    InvalidDocument {
        /// Table the document was written to.
        table: String,
        /// Description of the problem.
        message: String,
    },

    /// The database has been closed.
    #[error("database is closed")]
    Closed,

    /// Another handle holds the data directory lock.
    #[error("data directory {} is locked by another process", .0.display())]
    Locked(PathBuf),

    /// The database was opened read-only.
    #[error("database is open read-only")]
    ReadOnly,
}

impl StoreError {
    /// Creates a transaction-aborted error.
    pub fn aborted(reason: impl Into<String>) -> Self {
        Self::TransactionAborted {
            reason: reason.into(),
        }
    }

    /// Creates an invalid-document error.
    pub fn invalid_document(table: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidDocument {
            table: table.into(),
            message: message.into(),
        }
    }
}
