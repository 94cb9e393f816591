//! Stream adapter
//!
//! Change records coming off a shared physical table carry tenant-qualified
//! keys and images. The adapter sits between the backend's record delivery
//! and a tenant-oblivious processor supplied by the application: it decodes
//! the tenant and virtual table from the physical hash key, reverse-maps the
//! keys and images to virtual form, and hands the processor a record
//! labeled with `(tenant, virtual table)`.
//!
//! The tenant context is set only for the narrow scope of the per-record
//! mapping lookup and restored afterwards, even on failure. Decode failures
//! surface as processing errors; records are never silently dropped.
//! Shutdown signals pass straight through to the wrapped processor.

use crate::error::{to_core, Error, Result};
use crate::prefix::FieldValue;
use crate::router::SharedTableClient;
use std::sync::Arc;
use tessera_core::{
    AttributeValue, RecordProcessor, RecordProcessorFactory, Result as CoreResult, ShutdownReason,
    StreamRecord, TableDescription, TenantId,
};

/// A stream record relabeled to tenant-visible form
#[derive(Debug, Clone, PartialEq)]
pub struct TenantStreamRecord {
    pub tenant: TenantId,
    /// The virtual table name the record belongs to
    pub table_name: String,
    /// The record with keys and images reverse-mapped to virtual names
    pub record: StreamRecord,
}

/// Consumer of tenant-labeled stream records
#[async_trait::async_trait]
pub trait TenantRecordProcessor: Send + Sync {
    fn initialize(&self, _stream_label: &str) {}

    async fn process_records(&self, records: Vec<TenantStreamRecord>) -> CoreResult<()>;

    fn shutdown(&self, _reason: ShutdownReason) {}
}

/// Factory of [`TenantRecordProcessor`]s, supplied by the application
pub trait TenantRecordProcessorFactory: Send + Sync {
    fn create_processor(&self) -> Box<dyn TenantRecordProcessor>;
}

/// One enumerable stream: a physical table's change capture, pre-wrapped
/// with the relabeling adapter
pub struct StreamHandle {
    /// Physical table name
    pub label: String,
    /// Backend-assigned stream identifier, when known
    pub stream_label: Option<String>,
    /// Adapter-wrapped processor factory to hand to the stream worker
    pub factory: Arc<dyn RecordProcessorFactory>,
}

impl std::fmt::Debug for StreamHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamHandle")
            .field("label", &self.label)
            .field("stream_label", &self.stream_label)
            .finish()
    }
}

/// Wraps a tenant-oblivious processor factory with the relabeling adapter
pub struct StreamAdapterFactory {
    client: SharedTableClient,
    inner: Arc<dyn TenantRecordProcessorFactory>,
    physical_table: TableDescription,
}

impl StreamAdapterFactory {
    pub(crate) fn new(
        client: SharedTableClient,
        inner: Arc<dyn TenantRecordProcessorFactory>,
        physical_table: TableDescription,
    ) -> Self {
        Self {
            client,
            inner,
            physical_table,
        }
    }
}

impl RecordProcessorFactory for StreamAdapterFactory {
    fn create_processor(&self) -> Box<dyn RecordProcessor> {
        Box::new(StreamAdapter {
            client: self.client.clone(),
            inner: self.inner.create_processor(),
            physical_table: self.physical_table.clone(),
        })
    }
}

/// Per-shard adapter: decodes, reverse-maps, and relabels each record
pub struct StreamAdapter {
    client: SharedTableClient,
    inner: Box<dyn TenantRecordProcessor>,
    physical_table: TableDescription,
}

impl StreamAdapter {
    async fn relabel(&self, record: StreamRecord) -> Result<TenantStreamRecord> {
        let hash_key = &self.physical_table.key.hash_key;
        let qualified = record
            .keys
            .get(hash_key)
            .and_then(AttributeValue::as_s)
            .ok_or_else(|| {
                Error::from(tessera_core::Error::malformed_prefix(format!(
                    "stream record keys have no string attribute '{hash_key}'"
                )))
            })?;
        let decoded = self.client.codec().reverse(qualified)?;

        // Fetching a table mapping requires tenant context; set it for this
        // record only and restore the prior tenant afterwards.
        let prior = self.client.context().get().ok();
        self.client
            .context()
            .set(Some(decoded.tenant.clone()))
            .map_err(Error::from)?;
        let outcome = self.reverse_record(&decoded, record).await;
        let restored = self.client.context().set(prior).map_err(Error::from);

        let record = outcome?;
        restored?;
        Ok(TenantStreamRecord {
            tenant: decoded.tenant,
            table_name: decoded.table_name,
            record,
        })
    }

    async fn reverse_record(
        &self,
        decoded: &FieldValue,
        mut record: StreamRecord,
    ) -> Result<StreamRecord> {
        let mapping = self.client.table_mapping(&decoded.table_name).await?;
        let mapper = mapping.item_mapper();
        record.keys = mapper.reverse(&record.keys)?;
        record.old_image = mapper.reverse_opt(record.old_image.as_ref())?;
        record.new_image = mapper.reverse_opt(record.new_image.as_ref())?;
        Ok(record)
    }
}

#[async_trait::async_trait]
impl RecordProcessor for StreamAdapter {
    fn initialize(&self, stream_label: &str) {
        self.inner.initialize(stream_label);
    }

    async fn process_records(&self, records: Vec<StreamRecord>) -> CoreResult<()> {
        let mut relabeled = Vec::with_capacity(records.len());
        for record in records {
            relabeled.push(self.relabel(record).await.map_err(to_core)?);
        }
        self.inner.process_records(relabeled).await
    }

    fn shutdown(&self, reason: ShutdownReason) {
        self.inner.shutdown(reason);
    }
}
