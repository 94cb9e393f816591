//! Backend client trait
//!
//! The subset of the wide-column database API the virtualization layer
//! dispatches to. Implementations must be safe for concurrent use; the
//! router shares one client across all tenants. The trait is
//! runtime-agnostic and uses `async_trait` for async support.
//!
//! Implementations:
//! - [`crate::MemoryBackend`]: in-memory, for tests and local development
//! - `tessera-storage-aws`: DynamoDB-backed

use crate::error::Result;
use crate::request::{
    DeleteItemOutput, DeleteItemRequest, GetItemOutput, GetItemRequest, PutItemOutput,
    PutItemRequest, QueryOutput, QueryRequest, ScanOutput, ScanRequest, UpdateItemOutput,
    UpdateItemRequest,
};
use crate::schema::TableDescription;
use async_trait::async_trait;
use std::fmt::Debug;

/// Client of the backing wide-column database
#[async_trait]
pub trait BackendClient: Debug + Send + Sync {
    /// Create a table; fails if a table of the same name already exists
    async fn create_table(&self, description: &TableDescription) -> Result<TableDescription>;

    /// Describe a table; `None` when it does not exist
    async fn describe_table(&self, table_name: &str) -> Result<Option<TableDescription>>;

    /// Delete a table, returning its final description
    async fn delete_table(&self, table_name: &str) -> Result<TableDescription>;

    async fn get_item(&self, request: GetItemRequest) -> Result<GetItemOutput>;

    async fn put_item(&self, request: PutItemRequest) -> Result<PutItemOutput>;

    async fn update_item(&self, request: UpdateItemRequest) -> Result<UpdateItemOutput>;

    async fn delete_item(&self, request: DeleteItemRequest) -> Result<DeleteItemOutput>;

    async fn query(&self, request: QueryRequest) -> Result<QueryOutput>;

    async fn scan(&self, request: ScanRequest) -> Result<ScanOutput>;
}
