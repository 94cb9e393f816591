//! Backend-table-backed metadata repository
//!
//! Persists virtual table descriptions as JSON documents in a dedicated
//! physical table of the same backend that stores item data. Each row is
//! keyed by a tenant-scoped scalar so one metadata table serves every
//! tenant.
//!
//! ## Table Schema
//!
//! ```text
//! Table: tessera_metadata (configurable)
//!
//! Primary Key:
//!   - table_key (String, Partition Key): "<tenant><delim><virtual table name>"
//!
//! Attributes:
//!   - table_key: String (PK)
//!   - description: String - JSON-serialized TableDescription
//! ```

use crate::{MetadataError, MetadataRepo, Result};
use async_trait::async_trait;
use std::fmt::Debug;
use std::sync::Arc;
use tessera_core::{
    AttributeValue, BackendClient, ContextProvider, DeleteItemRequest, Error as CoreError,
    GetItemRequest, Item, KeyAttributeType, PutItemRequest, TableDescription,
};
use tokio::sync::OnceCell;

/// Partition key attribute of the metadata table
pub const ATTR_TABLE_KEY: &str = "table_key";

/// Attribute holding the JSON-serialized description
pub const ATTR_DESCRIPTION: &str = "description";

/// Default metadata table name
pub const DEFAULT_TABLE_NAME: &str = "tessera_metadata";

/// [`MetadataRepo`] backed by a dedicated table on the backend
#[derive(Clone)]
pub struct BackendMetadataRepo {
    backend: Arc<dyn BackendClient>,
    context: Arc<dyn ContextProvider>,
    table_name: String,
    delimiter: String,
    ensured: Arc<OnceCell<()>>,
}

impl Debug for BackendMetadataRepo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendMetadataRepo")
            .field("table_name", &self.table_name)
            .finish()
    }
}

impl BackendMetadataRepo {
    pub fn new(
        backend: Arc<dyn BackendClient>,
        context: Arc<dyn ContextProvider>,
        delimiter: impl Into<String>,
    ) -> Self {
        Self {
            backend,
            context,
            table_name: DEFAULT_TABLE_NAME.to_string(),
            delimiter: delimiter.into(),
            ensured: Arc::new(OnceCell::new()),
        }
    }

    /// Override the metadata table name
    pub fn with_table_name(mut self, table_name: impl Into<String>) -> Self {
        self.table_name = table_name.into();
        self
    }

    /// Tenant-scoped row key for a virtual table name
    fn row_key(&self, table_name: &str) -> Result<String> {
        let tenant = self.context.get()?;
        if tenant.as_str().contains(&self.delimiter) {
            return Err(CoreError::invalid_value(format!(
                "tenant id '{tenant}' contains the delimiter '{}'",
                self.delimiter
            ))
            .into());
        }
        Ok(format!("{tenant}{}{table_name}", self.delimiter))
    }

    /// Create the metadata table on first use
    async fn ensure_table(&self) -> Result<()> {
        self.ensured
            .get_or_try_init(|| async {
                if self.backend.describe_table(&self.table_name).await?.is_none() {
                    let description = TableDescription::builder(&self.table_name)
                        .hash_key(ATTR_TABLE_KEY, KeyAttributeType::S)
                        .build();
                    self.backend.create_table(&description).await?;
                }
                Ok::<(), MetadataError>(())
            })
            .await?;
        Ok(())
    }

    fn key_item(row_key: String) -> Item {
        [(ATTR_TABLE_KEY.to_string(), AttributeValue::S(row_key))]
            .into_iter()
            .collect()
    }

    fn parse_description(item: &Item) -> Result<TableDescription> {
        let json = item
            .get(ATTR_DESCRIPTION)
            .and_then(AttributeValue::as_s)
            .ok_or_else(|| {
                CoreError::invalid_value(format!(
                    "metadata row is missing the '{ATTR_DESCRIPTION}' attribute"
                ))
            })?;
        Ok(serde_json::from_str(json)?)
    }
}

#[async_trait]
impl MetadataRepo for BackendMetadataRepo {
    async fn create_table(&self, description: TableDescription) -> Result<TableDescription> {
        self.ensure_table().await?;
        let row_key = self.row_key(&description.table_name)?;

        let existing = self
            .backend
            .get_item(GetItemRequest::new(
                &self.table_name,
                Self::key_item(row_key.clone()),
            ))
            .await?;
        if existing.item.is_some() {
            return Err(MetadataError::table_exists(&description.table_name));
        }

        let mut item = Self::key_item(row_key);
        item.insert(
            ATTR_DESCRIPTION.to_string(),
            AttributeValue::S(serde_json::to_string(&description)?),
        );
        self.backend
            .put_item(PutItemRequest::new(&self.table_name, item))
            .await?;
        Ok(description)
    }

    async fn get_table_description(&self, table_name: &str) -> Result<TableDescription> {
        self.ensure_table().await?;
        let row_key = self.row_key(table_name)?;
        let out = self
            .backend
            .get_item(GetItemRequest::new(&self.table_name, Self::key_item(row_key)))
            .await?;
        match out.item {
            Some(item) => Self::parse_description(&item),
            None => Err(MetadataError::table_not_found(table_name)),
        }
    }

    async fn delete_table(&self, table_name: &str) -> Result<TableDescription> {
        self.ensure_table().await?;
        let description = self.get_table_description(table_name).await?;
        let row_key = self.row_key(table_name)?;
        self.backend
            .delete_item(DeleteItemRequest::new(
                &self.table_name,
                Self::key_item(row_key),
            ))
            .await?;
        Ok(description)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_core::{FixedContext, MemoryBackend, TenantId};

    fn repo() -> (BackendMetadataRepo, Arc<FixedContext>) {
        let context = Arc::new(FixedContext::with_tenant(TenantId::new("ctx1").unwrap()));
        let backend = Arc::new(MemoryBackend::new());
        (
            BackendMetadataRepo::new(backend, context.clone(), "."),
            context,
        )
    }

    fn desc(name: &str) -> TableDescription {
        TableDescription::builder(name)
            .hash_key("hk", KeyAttributeType::S)
            .build()
    }

    #[tokio::test]
    async fn descriptions_round_trip_through_backend() {
        let (repo, _context) = repo();
        repo.create_table(desc("orders")).await.unwrap();

        let got = repo.get_table_description("orders").await.unwrap();
        assert_eq!(got, desc("orders"));

        let deleted = repo.delete_table("orders").await.unwrap();
        assert_eq!(deleted.table_name, "orders");
        assert!(matches!(
            repo.get_table_description("orders").await,
            Err(MetadataError::TableNotFound(_))
        ));
    }

    #[tokio::test]
    async fn rows_are_tenant_scoped() {
        let (repo, context) = repo();
        repo.create_table(desc("orders")).await.unwrap();

        context.set(Some(TenantId::new("ctx2").unwrap())).unwrap();
        assert!(matches!(
            repo.get_table_description("orders").await,
            Err(MetadataError::TableNotFound(_))
        ));
    }

    #[tokio::test]
    async fn delimiter_in_tenant_id_is_rejected() {
        let (repo, context) = repo();
        context
            .set(Some(TenantId::new("bad.tenant").unwrap()))
            .unwrap();
        assert!(repo.get_table_description("orders").await.is_err());
    }
}
