//! AWS backend for tessera
//!
//! Implements the core [`BackendClient`](tessera_core::BackendClient) trait
//! on top of DynamoDB (feature `dynamodb`), translating the tessera data
//! model onto `aws-sdk-dynamodb` calls.
//!
//! ## Usage
//!
//! ```ignore
//! use tessera_storage_aws::dynamodb::{DynamoDbBackend, DynamoDbConfig};
//!
//! let sdk_config = aws_config::load_defaults(BehaviorVersion::latest()).await;
//! let backend = DynamoDbBackend::new(&sdk_config, DynamoDbConfig::default());
//! ```
//!
//! Region and credentials resolve via the standard AWS SDK chain; a custom
//! endpoint (LocalStack) can be set through [`dynamodb::DynamoDbConfig`].

pub mod error;

#[cfg(feature = "dynamodb")]
pub mod dynamodb;

pub use error::{AwsBackendError, Result};

#[cfg(feature = "dynamodb")]
pub use dynamodb::{DynamoDbBackend, DynamoDbConfig};
