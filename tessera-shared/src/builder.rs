//! Builder for the shared-table client
//!
//! Provides a fluent API for wiring the backend client, metadata
//! repository, context provider, index mapper, and table factory, plus the
//! behavioral switches of the router. Only the backend is required;
//! everything else has a production default:
//!
//! - context: task-local ([`TaskLocalContext`])
//! - metadata: a dedicated table on the same backend ([`BackendMetadataRepo`])
//! - index mapper: by-type, first compatible ([`ByTypeIndexMapper`])
//! - table factory: one shared table per key shape ([`ShapeSharedTableFactory`])

use crate::cache::TableMappingCache;
use crate::error::{Error, Result};
use crate::factory::{CreateTableRequestFactory, ShapeSharedTableFactory, TableMappingFactory};
use crate::index::{ByTypeIndexMapper, SecondaryIndexMapper};
use crate::prefix::{FieldPrefixCodec, DEFAULT_DELIMITER};
use crate::router::SharedTableClient;
use std::sync::Arc;
use std::time::Duration;
use tessera_core::{BackendClient, ContextProvider, TaskLocalContext};
use tessera_metadata::{BackendMetadataRepo, MetadataRepo};

/// Builder of [`SharedTableClient`]s
#[derive(Default)]
pub struct SharedTableBuilder {
    name: Option<String>,
    backend: Option<Arc<dyn BackendClient>>,
    metadata: Option<Arc<dyn MetadataRepo>>,
    context: Option<Arc<dyn ContextProvider>>,
    index_mapper: Option<Arc<dyn SecondaryIndexMapper>>,
    create_table_factory: Option<Arc<dyn CreateTableRequestFactory>>,
    delimiter: Option<String>,
    precreate_tables: Option<bool>,
    truncate_on_delete_table: bool,
    delete_table_async: bool,
    poll_interval: Option<Duration>,
    cache_max_entries: Option<u64>,
}

impl SharedTableBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Name used in logs and `Display`
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// The backend client everything dispatches to (required)
    pub fn backend(mut self, backend: Arc<dyn BackendClient>) -> Self {
        self.backend = Some(backend);
        self
    }

    pub fn metadata_repo(mut self, metadata: Arc<dyn MetadataRepo>) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn context_provider(mut self, context: Arc<dyn ContextProvider>) -> Self {
        self.context = Some(context);
        self
    }

    pub fn secondary_index_mapper(mut self, mapper: Arc<dyn SecondaryIndexMapper>) -> Self {
        self.index_mapper = Some(mapper);
        self
    }

    pub fn create_table_request_factory(
        mut self,
        factory: Arc<dyn CreateTableRequestFactory>,
    ) -> Self {
        self.create_table_factory = Some(factory);
        self
    }

    /// Delimiter of the field-prefix codec (default `.`)
    pub fn delimiter(mut self, delimiter: impl Into<String>) -> Self {
        self.delimiter = Some(delimiter.into());
        self
    }

    /// Create the factory's precreation list at build time (default true)
    pub fn precreate_tables(mut self, enabled: bool) -> Self {
        self.precreate_tables = Some(enabled);
        self
    }

    /// Delete the tenant's rows before dropping a virtual table (default false)
    pub fn truncate_on_delete_table(mut self, enabled: bool) -> Self {
        self.truncate_on_delete_table = enabled;
        self
    }

    /// Run table deletes on a background task (default false)
    pub fn delete_table_async(mut self, enabled: bool) -> Self {
        self.delete_table_async = enabled;
        self
    }

    /// Poll interval while waiting for physical table creation (default 1s)
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = Some(interval);
        self
    }

    /// Capacity of the table-mapping cache (default 4096 entries)
    pub fn cache_max_entries(mut self, max_entries: u64) -> Self {
        self.cache_max_entries = Some(max_entries);
        self
    }

    /// Assemble the client, running table precreation when configured
    pub async fn build(self) -> Result<SharedTableClient> {
        let backend = self
            .backend
            .ok_or_else(|| Error::invalid_config("a backend client is required"))?;
        let delimiter = self
            .delimiter
            .unwrap_or_else(|| DEFAULT_DELIMITER.to_string());
        if delimiter.is_empty() {
            return Err(Error::invalid_config("the delimiter must not be empty"));
        }
        let codec = FieldPrefixCodec::new(delimiter.clone());

        let context: Arc<dyn ContextProvider> = self
            .context
            .unwrap_or_else(|| Arc::new(TaskLocalContext::new()));
        let metadata: Arc<dyn MetadataRepo> = self.metadata.unwrap_or_else(|| {
            Arc::new(BackendMetadataRepo::new(
                backend.clone(),
                context.clone(),
                delimiter,
            ))
        });
        let index_mapper: Arc<dyn SecondaryIndexMapper> = self
            .index_mapper
            .unwrap_or_else(|| Arc::new(ByTypeIndexMapper::new()));
        let create_table_factory: Arc<dyn CreateTableRequestFactory> = self
            .create_table_factory
            .unwrap_or_else(|| Arc::new(ShapeSharedTableFactory::new()));

        let factory = Arc::new(TableMappingFactory::new(
            create_table_factory,
            index_mapper,
            context.clone(),
            backend.clone(),
            codec,
            self.poll_interval.unwrap_or(Duration::from_secs(1)),
        ));
        if self.precreate_tables.unwrap_or(true) {
            factory.precreate().await?;
        }

        Ok(SharedTableClient::new(
            self.name.unwrap_or_else(|| "shared-table".to_string()),
            backend,
            metadata,
            context,
            factory,
            TableMappingCache::new(self.cache_max_entries.unwrap_or(4096)),
            self.truncate_on_delete_table,
            self.delete_table_async,
        ))
    }
}
