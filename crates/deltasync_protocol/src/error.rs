//! Error types for the sync protocol.

use thiserror::Error;

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Errors that can occur while encoding, decoding or validating messages.
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// The message is not valid JSON or does not match the expected shape.
    #[error("malformed message: {0}")]
    Malformed(#[from] serde_json::Error),

    /// A field has an out-of-range or otherwise invalid value.
    #[error("invalid field {field}: {message}")]
    InvalidField {
        /// Field name as it appears on the wire.
        field: &'static str,
        /// Description of the problem.
        message: String,
    },
}

impl ProtocolError {
    /// Creates an invalid-field error.
    pub fn invalid_field(field: &'static str, message: impl Into<String>) -> Self {
        Self::InvalidField {
            field,
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = ProtocolError::invalid_field("last_pulled_at", "must not be negative");
        assert_eq!(
            err.to_string(),
            "invalid field last_pulled_at: must not be negative"
        );
    }
}
