//! Error types for tessera-core

use thiserror::Error;

/// Result type alias using our Error
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type
#[derive(Error, Debug)]
pub enum Error {
    /// Tenant context was required but is not set for the current operation
    #[error("tenant context required but not set")]
    TenantUnset,

    /// A physical scalar could not be decoded into its tenant-prefixed parts
    #[error("malformed prefixed value: {0}")]
    MalformedPrefix(String),

    /// A value failed validation (empty tenant id, delimiter in a table name, …)
    #[error("invalid value: {0}")]
    InvalidValue(String),

    /// Resource not found on the backend
    #[error("not found: {0}")]
    NotFound(String),

    /// An operation or expression form the backend implementation does not support
    #[error("unsupported operation: {0}")]
    Unsupported(String),

    /// Underlying backend failure, original cause retained
    #[error("backend error: {message}")]
    Backend {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl Error {
    /// Create a malformed-prefix error
    pub fn malformed_prefix(msg: impl Into<String>) -> Self {
        Error::MalformedPrefix(msg.into())
    }

    /// Create an invalid-value error
    pub fn invalid_value(msg: impl Into<String>) -> Self {
        Error::InvalidValue(msg.into())
    }

    /// Create a not-found error
    pub fn not_found(msg: impl Into<String>) -> Self {
        Error::NotFound(msg.into())
    }

    /// Create an unsupported-operation error
    pub fn unsupported(msg: impl Into<String>) -> Self {
        Error::Unsupported(msg.into())
    }

    /// Create a backend error from a message only
    pub fn backend(msg: impl Into<String>) -> Self {
        Error::Backend {
            message: msg.into(),
            source: None,
        }
    }

    /// Create a backend error retaining the original cause
    pub fn backend_with(
        msg: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Error::Backend {
            message: msg.into(),
            source: Some(Box::new(source)),
        }
    }
}
