//! Error types for the AWS backend

use thiserror::Error;

/// Errors from AWS backend operations
#[derive(Debug, Error)]
pub enum AwsBackendError {
    /// Resource not found
    #[error("not found: {0}")]
    NotFound(String),

    /// Invalid configuration
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// A value shape the DynamoDB translation does not handle
    #[error("unsupported value: {0}")]
    UnsupportedValue(String),

    /// DynamoDB SDK error
    #[cfg(feature = "dynamodb")]
    #[error("DynamoDB error: {0}")]
    DynamoDb(String),
}

impl AwsBackendError {
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }

    pub fn unsupported_value(msg: impl Into<String>) -> Self {
        Self::UnsupportedValue(msg.into())
    }

    #[cfg(feature = "dynamodb")]
    pub fn dynamodb(msg: impl Into<String>) -> Self {
        Self::DynamoDb(msg.into())
    }
}

/// Result type for AWS backend operations
pub type Result<T> = std::result::Result<T, AwsBackendError>;

// Convert to tessera-core errors
impl From<AwsBackendError> for tessera_core::Error {
    fn from(err: AwsBackendError) -> Self {
        match err {
            AwsBackendError::NotFound(msg) => tessera_core::Error::not_found(msg),
            other => tessera_core::Error::backend_with(other.to_string(), other),
        }
    }
}
