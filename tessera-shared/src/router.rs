//! Shared-table router
//!
//! The outward-facing client. Presents the per-tenant virtual API while
//! physically multiplexing every tenant's tables onto shared backend
//! tables: each operation looks up (or lazily builds) the
//! [`TableMapping`] for the current tenant and virtual table, rewrites the
//! request onto the physical table, dispatches it, and decodes the
//! response back to tenant-visible form.
//!
//! Supported operations: create/describe/delete table, get/put/update/
//! delete item, query, scan, and stream enumeration. Only equality
//! conditions are supported on keys. Deleting and recreating tables
//! without truncation (`truncate_on_delete_table`) may yield unexpected
//! results, since other tenants' rows of the shared table live on.

use crate::cache::TableMappingCache;
use crate::error::{Error, Result};
use crate::factory::TableMappingFactory;
use crate::prefix::FieldPrefixCodec;
use crate::stream::{StreamAdapterFactory, StreamHandle, TenantRecordProcessorFactory};
use crate::table_mapping::TableMapping;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use tessera_core::{
    BackendClient, ContextProvider, DeleteItemOutput, DeleteItemRequest, GetItemOutput,
    GetItemRequest, Item, PutItemOutput, PutItemRequest, QueryOutput, QueryRequest, ScanOutput,
    ScanRequest, TableDescription, TableStatus, TaskLocalContext, UpdateItemOutput,
    UpdateItemRequest,
};
use tessera_metadata::MetadataRepo;
use tracing::{info, warn};

/// Multi-tenant router over a shared-table backend
#[derive(Clone)]
pub struct SharedTableClient {
    name: String,
    backend: Arc<dyn BackendClient>,
    metadata: Arc<dyn MetadataRepo>,
    context: Arc<dyn ContextProvider>,
    factory: Arc<TableMappingFactory>,
    mappings: TableMappingCache,
    truncate_on_delete_table: bool,
    delete_table_async: bool,
}

impl fmt::Debug for SharedTableClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedTableClient")
            .field("name", &self.name)
            .field("mappings", &self.mappings)
            .finish()
    }
}

impl fmt::Display for SharedTableClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

impl SharedTableClient {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        name: String,
        backend: Arc<dyn BackendClient>,
        metadata: Arc<dyn MetadataRepo>,
        context: Arc<dyn ContextProvider>,
        factory: Arc<TableMappingFactory>,
        mappings: TableMappingCache,
        truncate_on_delete_table: bool,
        delete_table_async: bool,
    ) -> Self {
        Self {
            name,
            backend,
            metadata,
            context,
            factory,
            mappings,
            truncate_on_delete_table,
            delete_table_async,
        }
    }

    pub fn context(&self) -> &Arc<dyn ContextProvider> {
        &self.context
    }

    pub fn codec(&self) -> &FieldPrefixCodec {
        self.factory.codec()
    }

    /// The mapping for a virtual table of the current tenant, built on
    /// first access and cached per `(tenant, table)`
    pub async fn table_mapping(&self, table_name: &str) -> Result<Arc<TableMapping>> {
        let tenant = self.context.get().map_err(Error::from)?;
        let metadata = self.metadata.clone();
        let factory = self.factory.clone();
        let name = table_name.to_string();
        self.mappings
            .get_or_build((tenant, table_name.to_string()), move || async move {
                let description = metadata.get_table_description(&name).await?;
                factory.table_mapping(description).await
            })
            .await
    }

    /// Persist a virtual table description
    ///
    /// Does not create the physical table; physical tables are precreated
    /// or lazily created by the factory on first data-plane access.
    pub async fn create_table(&self, description: TableDescription) -> Result<TableDescription> {
        let delimiter = self.codec().delimiter();
        if description.table_name.contains(delimiter) {
            return Err(Error::from(tessera_core::Error::invalid_value(format!(
                "virtual table name '{}' contains the delimiter '{delimiter}'",
                description.table_name
            ))));
        }
        Ok(self.metadata.create_table(description).await?)
    }

    /// The virtual description, status forced to ACTIVE
    pub async fn describe_table(&self, table_name: &str) -> Result<TableDescription> {
        let mut description = self.metadata.get_table_description(table_name).await?;
        description.status = TableStatus::Active;
        Ok(description)
    }

    /// Delete a virtual table
    ///
    /// With `truncate_on_delete_table`, the tenant's rows are scanned and
    /// deleted first. With `delete_table_async`, truncation and the
    /// metadata delete run on a background task and the pre-delete
    /// description is returned immediately; background failures are logged
    /// and swallowed.
    pub async fn delete_table(&self, table_name: &str) -> Result<TableDescription> {
        if !self.delete_table_async {
            return self.delete_table_inner(table_name).await;
        }

        let description = self.metadata.get_table_description(table_name).await?;
        let tenant = self.context.get().map_err(Error::from)?;
        let this = self.clone();
        let name = table_name.to_string();
        tokio::spawn(TaskLocalContext::scope(async move {
            // The spawned task has a fresh context scope; re-establish the
            // caller's tenant inside it.
            if let Err(error) = this.context.set(Some(tenant)) {
                warn!(table = %name, %error, "async delete could not establish tenant context");
                return;
            }
            if let Err(error) = this.delete_table_inner(&name).await {
                warn!(table = %name, %error, "asynchronous table delete failed");
            }
        }));
        Ok(description)
    }

    async fn delete_table_inner(&self, table_name: &str) -> Result<TableDescription> {
        warn!(table = %table_name, "dropping virtual table");
        if self.truncate_on_delete_table {
            self.truncate_table(table_name).await?;
        } else {
            info!(table = %table_name, "truncate_on_delete_table disabled, skipping truncation");
        }
        let description = self.metadata.delete_table(table_name).await?;
        if let Ok(tenant) = self.context.get() {
            self.mappings.invalidate(&tenant, table_name).await;
        }
        warn!(table = %table_name, "dropped virtual table");
        Ok(description)
    }

    /// Scan the tenant's rows of a virtual table and delete them one by one
    async fn truncate_table(&self, table_name: &str) -> Result<()> {
        let description = self.describe_table(table_name).await?;
        let key_names: Vec<String> = description
            .key_attribute_names()
            .into_iter()
            .map(String::from)
            .collect();

        let mut start_key: Option<Item> = None;
        let mut deleted = 0usize;
        loop {
            let mut request = ScanRequest::new(table_name);
            request.exclusive_start_key = start_key.take();
            let page = self.scan(request).await?;
            for item in &page.items {
                let key: Item = key_names
                    .iter()
                    .filter_map(|name| item.get(name).map(|v| (name.clone(), v.clone())))
                    .collect();
                self.delete_item(DeleteItemRequest::new(table_name, key))
                    .await?;
                deleted += 1;
            }
            match page.last_evaluated_key {
                Some(key) => start_key = Some(key),
                None => break,
            }
        }
        warn!(table = %table_name, rows = deleted, "truncated virtual table");
        Ok(())
    }

    pub async fn get_item(&self, request: GetItemRequest) -> Result<GetItemOutput> {
        let mapping = self.table_mapping(&request.table_name).await?;
        let mapper = mapping.item_mapper();

        let mut request = request;
        request.table_name = mapping.physical_table().table_name.clone();
        request.key = mapper.apply(&request.key)?;

        let mut output = self.backend.get_item(request).await?;
        output.item = mapper.reverse_opt(output.item.as_ref())?;
        Ok(output)
    }

    pub async fn put_item(&self, request: PutItemRequest) -> Result<PutItemOutput> {
        let mapping = self.table_mapping(&request.table_name).await?;
        let mapper = mapping.item_mapper();

        let mut request = request;
        request.table_name = mapping.physical_table().table_name.clone();
        request.item = mapper.apply(&request.item)?;

        let mut output = self.backend.put_item(request).await?;
        output.attributes = mapper.reverse_opt(output.attributes.as_ref())?;
        Ok(output)
    }

    /// Update an item
    ///
    /// Only the key is rewritten. Update and condition expressions pass
    /// through unmodified.
    // TODO: rewrite update and condition expressions over mapped key
    // attributes instead of passing them through.
    pub async fn update_item(&self, request: UpdateItemRequest) -> Result<UpdateItemOutput> {
        let mapping = self.table_mapping(&request.table_name).await?;
        let mapper = mapping.item_mapper();

        let mut request = request;
        request.table_name = mapping.physical_table().table_name.clone();
        request.key = mapper.apply(&request.key)?;

        let mut output = self.backend.update_item(request).await?;
        output.attributes = mapper.reverse_opt(output.attributes.as_ref())?;
        Ok(output)
    }

    pub async fn delete_item(&self, request: DeleteItemRequest) -> Result<DeleteItemOutput> {
        let mapping = self.table_mapping(&request.table_name).await?;
        let mapper = mapping.item_mapper();

        let mut request = request;
        request.table_name = mapping.physical_table().table_name.clone();
        request.key = mapper.apply(&request.key)?;

        let mut output = self.backend.delete_item(request).await?;
        output.attributes = mapper.reverse_opt(output.attributes.as_ref())?;
        Ok(output)
    }

    pub async fn query(&self, request: QueryRequest) -> Result<QueryOutput> {
        let mapping = self.table_mapping(&request.table_name).await?;

        let mut request = request;
        mapping.query_mapper().apply_query(&mut request)?;

        let mut output = self.backend.query(request).await?;
        output.items = output
            .items
            .iter()
            .map(|item| mapping.item_mapper().reverse(item))
            .collect::<Result<_>>()?;
        Ok(output)
    }

    pub async fn scan(&self, request: ScanRequest) -> Result<ScanOutput> {
        let mapping = self.table_mapping(&request.table_name).await?;

        let mut request = request;
        mapping.query_mapper().apply_scan(&mut request)?;

        let mut output = self.backend.scan(request).await?;
        output.items = output
            .items
            .iter()
            .map(|item| mapping.item_mapper().reverse(item))
            .collect::<Result<_>>()?;
        Ok(output)
    }

    /// One stream handle per stream-enabled physical table among the
    /// cached mappings, each wrapping `factory` with the tenant-relabeling
    /// adapter
    pub fn list_streams(&self, factory: Arc<dyn TenantRecordProcessorFactory>) -> Vec<StreamHandle> {
        let mut seen = HashSet::new();
        let mut handles = Vec::new();
        for mapping in self.mappings.mappings() {
            let physical = mapping.physical_table();
            if !physical.stream_enabled() {
                continue;
            }
            if !seen.insert(physical.table_name.clone()) {
                continue;
            }
            handles.push(StreamHandle {
                label: physical.table_name.clone(),
                stream_label: physical.stream_label.clone(),
                factory: Arc::new(StreamAdapterFactory::new(
                    self.clone(),
                    factory.clone(),
                    physical.clone(),
                )),
            });
        }
        handles
    }
}
