//! Table-mapping factory and physical table provisioning
//!
//! A [`CreateTableRequestFactory`] decides which physical table backs a
//! virtual one. The [`TableMappingFactory`] resolves the template, builds
//! and validates the [`TableMapping`], creates the physical table on the
//! backend when it does not exist yet, and refreshes the mapping with the
//! created table's description so backend-assigned fields (the stream
//! label) are visible.

use crate::error::{Error, Result};
use crate::index::SecondaryIndexMapper;
use crate::prefix::FieldPrefixCodec;
use crate::table_mapping::TableMapping;
use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;
use tessera_core::{
    BackendClient, ContextProvider, KeyAttributeType, PrimaryKey, StreamViewType,
    TableDescription, TableStatus,
};
use tracing::{debug, info};

/// Maximum number of poll rounds while waiting for a created table
const MAX_CREATE_WAIT_ROUNDS: u32 = 600;

/// Supplies physical table templates for virtual tables
pub trait CreateTableRequestFactory: Debug + Send + Sync {
    /// The physical template backing a virtual table, or `None` when this
    /// factory does not support the virtual table's shape
    fn physical_template(&self, virtual_table: &TableDescription) -> Option<TableDescription>;

    /// Tables to create eagerly at construction time
    fn precreate_tables(&self) -> Vec<TableDescription> {
        Vec::new()
    }
}

/// Default factory: one shared physical table per virtual key shape
///
/// Every virtual table with the same primary-key and index shape lands on
/// the same physical table, whose attributes are generic (`hk`, `rk`,
/// `gsi0_hk`, …) and whose hash keys are strings so they can hold
/// tenant-qualified values. Streams are enabled on each shared table so
/// change capture works for every tenant multiplexed onto it.
#[derive(Debug, Clone)]
pub struct ShapeSharedTableFactory {
    table_prefix: String,
    streams_enabled: bool,
    precreated: Vec<TableDescription>,
}

impl Default for ShapeSharedTableFactory {
    fn default() -> Self {
        Self {
            table_prefix: "tsr_shared_".to_string(),
            streams_enabled: true,
            precreated: Vec::new(),
        }
    }
}

impl ShapeSharedTableFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the physical table name prefix
    pub fn with_table_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.table_prefix = prefix.into();
        self
    }

    /// Disable change capture on the shared tables
    pub fn without_streams(mut self) -> Self {
        self.streams_enabled = false;
        self
    }

    /// Set the templates returned by [`CreateTableRequestFactory::precreate_tables`]
    pub fn with_precreated(mut self, templates: Vec<TableDescription>) -> Self {
        self.precreated = templates;
        self
    }

    fn key_shape(key: &PrimaryKey) -> String {
        let mut shape = "s".to_string();
        if let Some(range_type) = key.range_key_type {
            shape.push(match range_type {
                KeyAttributeType::S => 's',
                KeyAttributeType::N => 'n',
                KeyAttributeType::B => 'b',
            });
        }
        shape
    }

    fn table_shape(virtual_table: &TableDescription) -> String {
        let mut shape = Self::key_shape(&virtual_table.key);
        for gsi in virtual_table.gsis() {
            shape.push_str("_g");
            shape.push_str(&Self::key_shape(&gsi.key));
        }
        for lsi in virtual_table.lsis() {
            shape.push_str("_l");
            shape.push_str(&Self::key_shape(&lsi.key));
        }
        shape
    }
}

impl CreateTableRequestFactory for ShapeSharedTableFactory {
    fn physical_template(&self, virtual_table: &TableDescription) -> Option<TableDescription> {
        let name = format!("{}{}", self.table_prefix, Self::table_shape(virtual_table));
        let mut builder = match (&virtual_table.key.range_key, virtual_table.key.range_key_type) {
            (Some(_), Some(range_type)) => TableDescription::builder(&name).hash_range_key(
                "hk",
                KeyAttributeType::S,
                "rk",
                range_type,
            ),
            _ => TableDescription::builder(&name).hash_key("hk", KeyAttributeType::S),
        };
        for (i, gsi) in virtual_table.gsis().enumerate() {
            let key = match gsi.key.range_key_type {
                Some(range_type) => PrimaryKey::hash_range(
                    format!("gsi{i}_hk"),
                    KeyAttributeType::S,
                    format!("gsi{i}_rk"),
                    range_type,
                ),
                None => PrimaryKey::hash(format!("gsi{i}_hk"), KeyAttributeType::S),
            };
            builder = builder.global_index(format!("gsi{i}"), key);
        }
        for (i, lsi) in virtual_table.lsis().enumerate() {
            let key = match lsi.key.range_key_type {
                Some(range_type) => PrimaryKey::hash_range(
                    "hk",
                    KeyAttributeType::S,
                    format!("lsi{i}_rk"),
                    range_type,
                ),
                None => PrimaryKey::hash("hk", KeyAttributeType::S),
            };
            builder = builder.local_index(format!("lsi{i}"), key);
        }
        if self.streams_enabled {
            builder = builder.stream(StreamViewType::NewAndOldImages);
        }
        Some(builder.build())
    }

    fn precreate_tables(&self) -> Vec<TableDescription> {
        self.precreated.clone()
    }
}

/// Builds validated, backend-refreshed [`TableMapping`]s
#[derive(Debug)]
pub struct TableMappingFactory {
    create_table_factory: Arc<dyn CreateTableRequestFactory>,
    index_mapper: Arc<dyn SecondaryIndexMapper>,
    context: Arc<dyn ContextProvider>,
    backend: Arc<dyn BackendClient>,
    codec: FieldPrefixCodec,
    poll_interval: Duration,
}

impl TableMappingFactory {
    pub fn new(
        create_table_factory: Arc<dyn CreateTableRequestFactory>,
        index_mapper: Arc<dyn SecondaryIndexMapper>,
        context: Arc<dyn ContextProvider>,
        backend: Arc<dyn BackendClient>,
        codec: FieldPrefixCodec,
        poll_interval: Duration,
    ) -> Self {
        Self {
            create_table_factory,
            index_mapper,
            context,
            backend,
            codec,
            poll_interval,
        }
    }

    pub fn codec(&self) -> &FieldPrefixCodec {
        &self.codec
    }

    /// Eagerly create the factory's precreation list
    ///
    /// Runs at construction time, legitimately without a tenant context.
    pub async fn precreate(&self) -> Result<()> {
        for template in self.create_table_factory.precreate_tables() {
            self.create_table_if_not_exists(&template).await?;
        }
        Ok(())
    }

    /// Build the mapping for a virtual table, provisioning its physical
    /// table on first need
    pub async fn table_mapping(&self, virtual_table: TableDescription) -> Result<TableMapping> {
        let template = self
            .create_table_factory
            .physical_template(&virtual_table)
            .ok_or_else(|| Error::unsupported_table(&virtual_table.table_name))?;
        let mut mapping = TableMapping::build(
            virtual_table,
            template,
            self.index_mapper.as_ref(),
            self.context.clone(),
            self.codec.clone(),
        )?;
        let refreshed = self
            .create_table_if_not_exists(mapping.physical_table())
            .await?;
        mapping.set_physical_table(refreshed);
        Ok(mapping)
    }

    async fn create_table_if_not_exists(
        &self,
        template: &TableDescription,
    ) -> Result<TableDescription> {
        if self
            .backend
            .describe_table(&template.table_name)
            .await?
            .is_none()
        {
            info!(table = %template.table_name, "creating physical table");
            if let Err(create_err) = self.backend.create_table(template).await {
                // Lost a creation race with another process; fine as long
                // as the table now exists.
                if self
                    .backend
                    .describe_table(&template.table_name)
                    .await?
                    .is_none()
                {
                    return Err(create_err.into());
                }
            }
        }
        self.await_active(&template.table_name).await
    }

    async fn await_active(&self, table_name: &str) -> Result<TableDescription> {
        for round in 0..MAX_CREATE_WAIT_ROUNDS {
            let described = self.backend.describe_table(table_name).await?;
            match described {
                Some(description) if description.status == TableStatus::Active => {
                    return Ok(description);
                }
                _ => {
                    debug!(table = %table_name, round, "waiting for physical table to become active");
                    tokio::time::sleep(self.poll_interval).await;
                }
            }
        }
        Err(Error::Core(tessera_core::Error::backend(format!(
            "timed out waiting for table {table_name} to become active"
        ))))
    }
}
