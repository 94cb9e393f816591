//! Core data model and backend abstractions for tessera
//!
//! This crate defines the pieces every other tessera crate builds on:
//!
//! - [`AttributeValue`] / [`Item`]: the wire-level value model of the
//!   wide-column backend
//! - [`TableDescription`] and friends: typed descriptions of tables, primary
//!   keys, and secondary indexes (used for both virtual and physical tables)
//! - [`BackendClient`]: the subset of the backend API the virtualization
//!   layer dispatches to, as an async trait
//! - [`ContextProvider`]: the ambient per-operation tenant identity
//! - [`MemoryBackend`]: an in-memory `BackendClient` for tests and local use
//!
//! Nothing in this crate knows about tenants beyond the context provider;
//! the virtual-to-physical rewriting lives in `tessera-shared`.

pub mod client;
pub mod context;
pub mod error;
pub mod memory;
pub mod request;
pub mod schema;
pub mod stream;
pub mod value;

pub use client::BackendClient;
pub use context::{ContextProvider, FixedContext, TaskLocalContext, TenantId};
pub use error::{Error, Result};
pub use memory::MemoryBackend;
pub use request::{
    ComparisonOperator, Condition, DeleteItemRequest, DeleteItemOutput, GetItemRequest,
    GetItemOutput, PutItemRequest, PutItemOutput, QueryRequest, QueryOutput, ScanRequest,
    ScanOutput, UpdateItemRequest, UpdateItemOutput,
};
pub use schema::{
    IndexKind, KeyAttributeType, PrimaryKey, Projection, ProjectionType, SecondaryIndex,
    StreamSpecification, StreamViewType, TableDescription, TableDescriptionBuilder, TableStatus,
};
pub use stream::{RecordProcessor, RecordProcessorFactory, ShutdownReason, StreamEvent, StreamRecord};
pub use value::{AttributeValue, Item};
