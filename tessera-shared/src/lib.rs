//! Shared-table subsystem for tessera
//!
//! Presents the backend's table API to each tenant while physically
//! multiplexing many tenants' virtual tables onto a small shared set of
//! physical tables. Every request on the data path is rewritten (table
//! name, keys and items, key conditions, placeholder maps) and every
//! response decoded back to tenant-visible form; a scoping predicate keeps
//! each tenant inside its own slice of the shared tables.
//!
//! The usual wiring:
//!
//! ```ignore
//! use std::sync::Arc;
//! use tessera_core::{MemoryBackend, TaskLocalContext, TenantId};
//! use tessera_shared::SharedTableBuilder;
//!
//! let client = SharedTableBuilder::new()
//!     .backend(Arc::new(MemoryBackend::new()))
//!     .truncate_on_delete_table(true)
//!     .build()
//!     .await?;
//!
//! TaskLocalContext::scope_as(TenantId::new("acme")?, async {
//!     // create_table / put_item / query / scan as this tenant
//! })
//! .await;
//! ```

pub mod builder;
pub mod cache;
mod error;
pub mod factory;
pub mod field;
pub mod index;
pub mod item;
pub mod prefix;
pub mod query;
pub mod router;
pub mod stream;
pub mod table_mapping;

pub use builder::SharedTableBuilder;
pub use cache::TableMappingCache;
pub use error::{Error, Result};
pub use factory::{CreateTableRequestFactory, ShapeSharedTableFactory, TableMappingFactory};
pub use field::{FieldDef, FieldMapper, FieldMapping, IndexScope};
pub use index::{ByTypeIndexMapper, SecondaryIndexMapper};
pub use item::ItemMapper;
pub use prefix::{FieldPrefixCodec, FieldValue, DEFAULT_DELIMITER};
pub use query::QueryMapper;
pub use router::SharedTableClient;
pub use stream::{
    StreamHandle, TenantRecordProcessor, TenantRecordProcessorFactory, TenantStreamRecord,
};
pub use table_mapping::{IndexMapping, TableMapping};
