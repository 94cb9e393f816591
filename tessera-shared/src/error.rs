//! Error types for the shared-table subsystem

use thiserror::Error;

/// Result type for shared-table operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while mapping and routing tenant requests
#[derive(Error, Debug)]
pub enum Error {
    /// The create-table-request factory returned no physical template
    #[error("virtual table is not supported by the physical table factory: {0}")]
    UnsupportedTable(String),

    /// Structural incompatibility between a virtual table and its physical target
    #[error("invalid table mapping: {0}")]
    InvalidMapping(String),

    /// No physical index of a matching kind is available for a virtual index
    #[error("no mappable physical index: {0}")]
    UnmappableIndex(String),

    /// A predicate the request mappers cannot translate
    #[error("unsupported predicate: {0}")]
    UnsupportedPredicate(String),

    /// Invalid builder configuration
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// A mapping-cache failure observed by a waiter of a shared build
    #[error("mapping cache error: {0}")]
    Cache(String),

    /// Metadata repository failure
    #[error(transparent)]
    Metadata(#[from] tessera_metadata::MetadataError),

    /// Core failure (tenant context, codec, backend)
    #[error(transparent)]
    Core(#[from] tessera_core::Error),
}

impl Error {
    /// Create an unsupported-table error
    pub fn unsupported_table(name: impl Into<String>) -> Self {
        Error::UnsupportedTable(name.into())
    }

    /// Create an invalid-mapping error
    pub fn invalid_mapping(msg: impl Into<String>) -> Self {
        Error::InvalidMapping(msg.into())
    }

    /// Create an unmappable-index error
    pub fn unmappable_index(msg: impl Into<String>) -> Self {
        Error::UnmappableIndex(msg.into())
    }

    /// Create an unsupported-predicate error
    pub fn unsupported_predicate(msg: impl Into<String>) -> Self {
        Error::UnsupportedPredicate(msg.into())
    }

    /// Create an invalid-configuration error
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Error::InvalidConfig(msg.into())
    }

    /// Create a cache error
    pub fn cache(msg: impl Into<String>) -> Self {
        Error::Cache(msg.into())
    }
}

/// Collapse a shared-table error onto the core error type at trait
/// boundaries that speak core errors (stream record processing).
pub(crate) fn to_core(error: Error) -> tessera_core::Error {
    match error {
        Error::Core(e) => e,
        other => tessera_core::Error::backend(other.to_string()),
    }
}
