//! Error types for port operations.

/// Local cache errors. Fatal for the foreground call that hit them: there is
/// no storage layer beneath the cache to fall back to.
#[derive(Debug, thiserror::Error)]
pub enum LocalStorageError {
    /// Storage operation failed - includes operation name for tracing.
    #[error("Local storage error in {operation}: {message}")]
    Database {
        operation: &'static str,
        message: String,
    },

    /// Serialization/deserialization failed.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl LocalStorageError {
    /// Create a Database error with operation context.
    pub fn database(operation: &'static str, message: impl ToString) -> Self {
        Self::Database {
            operation,
            message: message.to_string(),
        }
    }

    /// Create a Serialization error.
    pub fn serialization(message: impl ToString) -> Self {
        Self::Serialization(message.to_string())
    }
}

/// Remote store errors. Connectivity and rejection are kept apart because
/// only connectivity failures are worth re-attempting with the same payload.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RemoteError {
    /// Unreachable, timed out, or a transient server failure.
    #[error("Remote unreachable: {0}")]
    Network(String),

    /// The backend refused the request (validation, auth).
    #[error("Remote rejected request: {0}")]
    Rejected(String),
}

impl RemoteError {
    pub fn network(message: impl ToString) -> Self {
        Self::Network(message.to_string())
    }

    pub fn rejected(message: impl ToString) -> Self {
        Self::Rejected(message.to_string())
    }

    /// Check if re-sending the same request may succeed later.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Network(_))
    }
}
