//! Error types for the sync server.

use deltasync_protocol::{ProtocolError, RejectionKind};
use deltasync_store::StoreError;
use thiserror::Error;

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

/// Errors that can occur in the sync server.
#[derive(Error, Debug)]
pub enum ServerError {
    /// Invalid request format.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// A pushed record is malformed.
    #[error("invalid record in {table}: {message}")]
    InvalidRecord {
        /// Mobile or server table name.
        table: String,
        /// Description of the problem.
        message: String,
    },

    /// The table name is not registered.
    #[error("unknown table: {0}")]
    UnknownTable(String),

    /// The table exists but does not accept changes from clients.
    #[error("table {0} does not accept changes from clients")]
    NotAccepted(String),

    /// The table does not support the requested operation.
    #[error("table {table} does not support {operation}")]
    UnsupportedOperation {
        /// Table name.
        table: String,
        /// Operation name.
        operation: &'static str,
    },

    /// The push exceeds the configured record limit.
    #[error("push too large: {count} records exceeds limit of {limit}")]
    TooManyRecords {
        /// Records in the push.
        count: usize,
        /// Configured limit.
        limit: usize,
    },

    /// A delta query failed; the whole pull is aborted.
    #[error("delta query failed for {table}: {message}")]
    Query {
        /// Server table name.
        table: String,
        /// Underlying failure.
        message: String,
    },

    /// Invalid entity registration or server setup.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Storage error.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Malformed or invalid protocol message.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),

    /// I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl ServerError {
    /// Creates a query error for a table.
    pub fn query(table: impl Into<String>, source: &ServerError) -> Self {
        Self::Query {
            table: table.into(),
            message: source.to_string(),
        }
    }

    /// Returns true if this is a client error (4xx).
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            ServerError::InvalidRequest(_)
                | ServerError::InvalidRecord { .. }
                | ServerError::UnknownTable(_)
                | ServerError::NotAccepted(_)
                | ServerError::UnsupportedOperation { .. }
                | ServerError::TooManyRecords { .. }
                | ServerError::Protocol(_)
        )
    }

    /// Returns true if this is a server error (5xx).
    pub fn is_server_error(&self) -> bool {
        !self.is_client_error()
    }

    /// Classifies the error for a per-table push rejection.
    pub fn rejection_kind(&self) -> RejectionKind {
        match self {
            ServerError::UnknownTable(_) => RejectionKind::UnknownTable,
            ServerError::NotAccepted(_) => RejectionKind::NotAccepted,
            ServerError::InvalidRecord { .. }
            | ServerError::InvalidRequest(_)
            | ServerError::Protocol(_) => RejectionKind::InvalidRecord,
            ServerError::UnsupportedOperation { .. } | ServerError::TooManyRecords { .. } => {
                RejectionKind::Unsupported
            }
            _ => RejectionKind::Storage,
        }
    }
}
