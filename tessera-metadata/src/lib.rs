//! Virtual table description repository
//!
//! The metadata repository is the durable source of truth for tenants'
//! virtual table schemas. The router consults it on every mapping-cache miss
//! and mutates it on `create_table` / `delete_table`. Descriptions are
//! scoped to the current tenant via the injected
//! [`ContextProvider`](tessera_core::ContextProvider): two tenants may own a
//! virtual table of the same name without collision.
//!
//! The one shipped implementation, [`BackendMetadataRepo`], stores
//! descriptions as JSON documents in a dedicated table of the same backend
//! that holds the data, so tests run it against the in-memory backend and
//! production runs it against the real one.

mod error;
pub mod backend;

pub use backend::BackendMetadataRepo;
pub use error::{MetadataError, Result};

use async_trait::async_trait;
use std::fmt::Debug;
use tessera_core::TableDescription;

/// Durable store of virtual table descriptions for the current tenant
#[async_trait]
pub trait MetadataRepo: Debug + Send + Sync {
    /// Persist a new virtual table description
    async fn create_table(&self, description: TableDescription) -> Result<TableDescription>;

    /// Fetch a description; fails with [`MetadataError::TableNotFound`] on miss
    async fn get_table_description(&self, table_name: &str) -> Result<TableDescription>;

    /// Remove a description, returning what was stored
    async fn delete_table(&self, table_name: &str) -> Result<TableDescription>;
}
