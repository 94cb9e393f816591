//! Error types for the metadata crate

use thiserror::Error;

/// Result type for metadata operations
pub type Result<T> = std::result::Result<T, MetadataError>;

/// Errors that can occur in metadata operations
#[derive(Error, Debug)]
pub enum MetadataError {
    /// No virtual table of this name exists for the current tenant
    #[error("virtual table not found: {0}")]
    TableNotFound(String),

    /// A virtual table of this name already exists for the current tenant
    #[error("virtual table already exists: {0}")]
    TableExists(String),

    /// Description (de)serialization failed
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Core failure (tenant context, backend call)
    #[error(transparent)]
    Core(#[from] tessera_core::Error),
}

impl MetadataError {
    /// Create a table-not-found error
    pub fn table_not_found(name: impl Into<String>) -> Self {
        Self::TableNotFound(name.into())
    }

    /// Create a table-exists error
    pub fn table_exists(name: impl Into<String>) -> Self {
        Self::TableExists(name.into())
    }
}
