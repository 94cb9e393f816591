//! DynamoDB implementation of the backend client
//!
//! Translates the core model (attribute values, table descriptions,
//! requests) onto `aws-sdk-dynamodb`. Key conditions travel as the typed
//! condition map; filter expressions and placeholder maps pass through
//! verbatim. Tables are created with on-demand billing.

use crate::error::{AwsBackendError, Result as AwsResult};
use async_trait::async_trait;
use aws_sdk_dynamodb::primitives::Blob;
use aws_sdk_dynamodb::types::{
    AttributeDefinition, AttributeValue as SdkAttributeValue, BillingMode,
    ComparisonOperator as SdkComparisonOperator, Condition as SdkCondition,
    GlobalSecondaryIndex, KeySchemaElement, KeyType, LocalSecondaryIndex,
    Projection as SdkProjection, ProjectionType as SdkProjectionType, ReturnValue,
    ScalarAttributeType, StreamSpecification as SdkStreamSpecification, StreamViewType
    as SdkStreamViewType, TableStatus as SdkTableStatus,
};
use aws_sdk_dynamodb::Client;
use aws_smithy_types::timeout::TimeoutConfig;
use std::collections::HashMap;
use std::time::Duration;
use tessera_core::{
    AttributeValue, BackendClient, ComparisonOperator, Condition, DeleteItemOutput,
    DeleteItemRequest, Error, GetItemOutput, GetItemRequest, IndexKind, Item, KeyAttributeType,
    PrimaryKey, Projection, ProjectionType, PutItemOutput, PutItemRequest, QueryOutput,
    QueryRequest, Result, ScanOutput, ScanRequest, SecondaryIndex, StreamSpecification,
    StreamViewType, TableDescription, TableStatus, UpdateItemOutput, UpdateItemRequest,
};

/// DynamoDB backend configuration
#[derive(Debug, Clone, Default)]
pub struct DynamoDbConfig {
    /// AWS region (optional, uses SDK default if not specified)
    pub region: Option<String>,
    /// Optional endpoint override (e.g. LocalStack)
    pub endpoint: Option<String>,
    /// Operation timeout in milliseconds
    pub timeout_ms: Option<u64>,
}

/// DynamoDB-backed [`BackendClient`]
#[derive(Clone)]
pub struct DynamoDbBackend {
    client: Client,
}

impl std::fmt::Debug for DynamoDbBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DynamoDbBackend").finish()
    }
}

// ─── Constructors ───────────────────────────────────────────────────────────

impl DynamoDbBackend {
    /// Create a new DynamoDB backend from SDK config.
    pub fn new(sdk_config: &aws_config::SdkConfig, config: DynamoDbConfig) -> Self {
        let mut builder = aws_sdk_dynamodb::config::Builder::from(sdk_config);

        if let Some(region) = config.region {
            builder = builder.region(aws_sdk_dynamodb::config::Region::new(region));
        }
        if let Some(endpoint) = config.endpoint {
            builder = builder.endpoint_url(endpoint);
        }
        if let Some(timeout_ms) = config.timeout_ms {
            let timeout_config = TimeoutConfig::builder()
                .operation_timeout(Duration::from_millis(timeout_ms))
                .build();
            builder = builder.timeout_config(timeout_config);
        }

        Self {
            client: Client::from_conf(builder.build()),
        }
    }

    /// Create from a pre-built client (for testing).
    pub fn from_client(client: Client) -> Self {
        Self { client }
    }
}

// ─── Value translation ──────────────────────────────────────────────────────

fn to_sdk_value(value: &AttributeValue) -> SdkAttributeValue {
    match value {
        AttributeValue::S(s) => SdkAttributeValue::S(s.clone()),
        AttributeValue::N(n) => SdkAttributeValue::N(n.clone()),
        AttributeValue::B(b) => SdkAttributeValue::B(Blob::new(b.clone())),
        AttributeValue::Bool(b) => SdkAttributeValue::Bool(*b),
        AttributeValue::Null => SdkAttributeValue::Null(true),
        AttributeValue::Ss(s) => SdkAttributeValue::Ss(s.clone()),
        AttributeValue::Ns(n) => SdkAttributeValue::Ns(n.clone()),
        AttributeValue::L(l) => SdkAttributeValue::L(l.iter().map(to_sdk_value).collect()),
        AttributeValue::M(m) => SdkAttributeValue::M(
            m.iter()
                .map(|(k, v)| (k.clone(), to_sdk_value(v)))
                .collect(),
        ),
    }
}

fn from_sdk_value(value: &SdkAttributeValue) -> AwsResult<AttributeValue> {
    Ok(match value {
        SdkAttributeValue::S(s) => AttributeValue::S(s.clone()),
        SdkAttributeValue::N(n) => AttributeValue::N(n.clone()),
        SdkAttributeValue::B(b) => AttributeValue::B(b.as_ref().to_vec()),
        SdkAttributeValue::Bool(b) => AttributeValue::Bool(*b),
        SdkAttributeValue::Null(_) => AttributeValue::Null,
        SdkAttributeValue::Ss(s) => AttributeValue::Ss(s.clone()),
        SdkAttributeValue::Ns(n) => AttributeValue::Ns(n.clone()),
        SdkAttributeValue::L(l) => {
            AttributeValue::L(l.iter().map(from_sdk_value).collect::<AwsResult<_>>()?)
        }
        SdkAttributeValue::M(m) => AttributeValue::M(
            m.iter()
                .map(|(k, v)| Ok((k.clone(), from_sdk_value(v)?)))
                .collect::<AwsResult<_>>()?,
        ),
        other => {
            return Err(AwsBackendError::unsupported_value(format!(
                "unhandled DynamoDB attribute value: {other:?}"
            )))
        }
    })
}

fn to_sdk_item(item: &Item) -> HashMap<String, SdkAttributeValue> {
    item.iter().map(|(k, v)| (k.clone(), to_sdk_value(v))).collect()
}

fn from_sdk_item(item: &HashMap<String, SdkAttributeValue>) -> AwsResult<Item> {
    item.iter()
        .map(|(k, v)| Ok((k.clone(), from_sdk_value(v)?)))
        .collect()
}

fn to_scalar_type(key_type: KeyAttributeType) -> ScalarAttributeType {
    match key_type {
        KeyAttributeType::S => ScalarAttributeType::S,
        KeyAttributeType::N => ScalarAttributeType::N,
        KeyAttributeType::B => ScalarAttributeType::B,
    }
}

fn from_scalar_type(scalar: &ScalarAttributeType) -> AwsResult<KeyAttributeType> {
    match scalar {
        ScalarAttributeType::S => Ok(KeyAttributeType::S),
        ScalarAttributeType::N => Ok(KeyAttributeType::N),
        ScalarAttributeType::B => Ok(KeyAttributeType::B),
        other => Err(AwsBackendError::unsupported_value(format!(
            "unhandled scalar attribute type: {other:?}"
        ))),
    }
}

fn to_sdk_operator(operator: ComparisonOperator) -> SdkComparisonOperator {
    match operator {
        ComparisonOperator::Eq => SdkComparisonOperator::Eq,
        ComparisonOperator::Le => SdkComparisonOperator::Le,
        ComparisonOperator::Lt => SdkComparisonOperator::Lt,
        ComparisonOperator::Ge => SdkComparisonOperator::Ge,
        ComparisonOperator::Gt => SdkComparisonOperator::Gt,
        ComparisonOperator::Between => SdkComparisonOperator::Between,
        ComparisonOperator::BeginsWith => SdkComparisonOperator::BeginsWith,
    }
}

fn to_sdk_condition(condition: &Condition) -> AwsResult<SdkCondition> {
    SdkCondition::builder()
        .comparison_operator(to_sdk_operator(condition.operator))
        .set_attribute_value_list(Some(condition.values.iter().map(to_sdk_value).collect()))
        .build()
        .map_err(|e| AwsBackendError::dynamodb(format!("invalid condition: {e}")))
}

// ─── Schema translation ─────────────────────────────────────────────────────

/// Key attributes of a description, deduplicated, for attribute definitions
fn key_attribute_definitions(description: &TableDescription) -> AwsResult<Vec<AttributeDefinition>> {
    let mut seen: HashMap<&str, KeyAttributeType> = HashMap::new();
    let mut keys = vec![&description.key];
    keys.extend(description.secondary_indexes.iter().map(|si| &si.key));
    for key in keys {
        seen.entry(&key.hash_key).or_insert(key.hash_key_type);
        if let (Some(range), Some(range_type)) = (&key.range_key, key.range_key_type) {
            seen.entry(range).or_insert(range_type);
        }
    }
    seen.into_iter()
        .map(|(name, key_type)| {
            AttributeDefinition::builder()
                .attribute_name(name)
                .attribute_type(to_scalar_type(key_type))
                .build()
                .map_err(|e| AwsBackendError::dynamodb(format!("invalid attribute definition: {e}")))
        })
        .collect()
}

fn key_schema(key: &PrimaryKey) -> AwsResult<Vec<KeySchemaElement>> {
    let mut elements = vec![KeySchemaElement::builder()
        .attribute_name(&key.hash_key)
        .key_type(KeyType::Hash)
        .build()
        .map_err(|e| AwsBackendError::dynamodb(format!("invalid key schema: {e}")))?];
    if let Some(range) = &key.range_key {
        elements.push(
            KeySchemaElement::builder()
                .attribute_name(range)
                .key_type(KeyType::Range)
                .build()
                .map_err(|e| AwsBackendError::dynamodb(format!("invalid key schema: {e}")))?,
        );
    }
    Ok(elements)
}

fn to_sdk_projection(projection: &Projection) -> SdkProjection {
    let mut builder = SdkProjection::builder().projection_type(match projection.projection_type {
        ProjectionType::All => SdkProjectionType::All,
        ProjectionType::KeysOnly => SdkProjectionType::KeysOnly,
        ProjectionType::Include => SdkProjectionType::Include,
    });
    for attribute in &projection.non_key_attributes {
        builder = builder.non_key_attributes(attribute);
    }
    builder.build()
}

/// Parse a primary key out of SDK key-schema elements plus the table's
/// attribute definitions
fn parse_key(
    elements: &[KeySchemaElement],
    attribute_types: &HashMap<String, KeyAttributeType>,
) -> AwsResult<PrimaryKey> {
    let mut hash: Option<(String, KeyAttributeType)> = None;
    let mut range: Option<(String, KeyAttributeType)> = None;
    for element in elements {
        let name = element.attribute_name().to_string();
        let key_type = attribute_types.get(&name).copied().ok_or_else(|| {
            AwsBackendError::dynamodb(format!("no attribute definition for key attribute {name}"))
        })?;
        match element.key_type() {
            KeyType::Hash => hash = Some((name, key_type)),
            KeyType::Range => range = Some((name, key_type)),
            other => {
                return Err(AwsBackendError::dynamodb(format!(
                    "unhandled key type: {other:?}"
                )))
            }
        }
    }
    let (hash_key, hash_key_type) =
        hash.ok_or_else(|| AwsBackendError::dynamodb("key schema has no hash key"))?;
    Ok(match range {
        Some((range_key, range_key_type)) => {
            PrimaryKey::hash_range(hash_key, hash_key_type, range_key, range_key_type)
        }
        None => PrimaryKey::hash(hash_key, hash_key_type),
    })
}

fn parse_table_description(
    table: &aws_sdk_dynamodb::types::TableDescription,
) -> AwsResult<TableDescription> {
    let attribute_types: HashMap<String, KeyAttributeType> = table
        .attribute_definitions()
        .iter()
        .map(|def| {
            Ok((
                def.attribute_name().to_string(),
                from_scalar_type(def.attribute_type())?,
            ))
        })
        .collect::<AwsResult<_>>()?;

    let mut secondary_indexes = Vec::new();
    for gsi in table.global_secondary_indexes() {
        secondary_indexes.push(SecondaryIndex {
            index_name: gsi.index_name().unwrap_or_default().to_string(),
            kind: IndexKind::Gsi,
            key: parse_key(gsi.key_schema(), &attribute_types)?,
            projection: Projection::default(),
        });
    }
    for lsi in table.local_secondary_indexes() {
        secondary_indexes.push(SecondaryIndex {
            index_name: lsi.index_name().unwrap_or_default().to_string(),
            kind: IndexKind::Lsi,
            key: parse_key(lsi.key_schema(), &attribute_types)?,
            projection: Projection::default(),
        });
    }

    let stream = table.stream_specification().map(|spec| StreamSpecification {
        enabled: spec.stream_enabled(),
        view_type: match spec.stream_view_type() {
            Some(SdkStreamViewType::KeysOnly) => StreamViewType::KeysOnly,
            Some(SdkStreamViewType::NewImage) => StreamViewType::NewImage,
            Some(SdkStreamViewType::OldImage) => StreamViewType::OldImage,
            _ => StreamViewType::NewAndOldImages,
        },
    });

    let status = match table.table_status() {
        Some(SdkTableStatus::Creating) => TableStatus::Creating,
        Some(SdkTableStatus::Deleting) => TableStatus::Deleting,
        _ => TableStatus::Active,
    };

    Ok(TableDescription {
        table_name: table.table_name().unwrap_or_default().to_string(),
        key: parse_key(table.key_schema(), &attribute_types)?,
        secondary_indexes,
        stream,
        stream_label: table.latest_stream_arn().map(String::from),
        status,
    })
}

// ─── BackendClient implementation ───────────────────────────────────────────

#[async_trait]
impl BackendClient for DynamoDbBackend {
    async fn create_table(&self, description: &TableDescription) -> Result<TableDescription> {
        let mut request = self
            .client
            .create_table()
            .table_name(&description.table_name)
            .set_attribute_definitions(Some(key_attribute_definitions(description)?))
            .set_key_schema(Some(key_schema(&description.key)?))
            .billing_mode(BillingMode::PayPerRequest);

        for index in &description.secondary_indexes {
            match index.kind {
                IndexKind::Gsi => {
                    request = request.global_secondary_indexes(
                        GlobalSecondaryIndex::builder()
                            .index_name(&index.index_name)
                            .set_key_schema(Some(key_schema(&index.key)?))
                            .projection(to_sdk_projection(&index.projection))
                            .build()
                            .map_err(|e| {
                                AwsBackendError::dynamodb(format!("invalid GSI: {e}"))
                            })
                            .map_err(Error::from)?,
                    );
                }
                IndexKind::Lsi => {
                    request = request.local_secondary_indexes(
                        LocalSecondaryIndex::builder()
                            .index_name(&index.index_name)
                            .set_key_schema(Some(key_schema(&index.key)?))
                            .projection(to_sdk_projection(&index.projection))
                            .build()
                            .map_err(|e| {
                                AwsBackendError::dynamodb(format!("invalid LSI: {e}"))
                            })
                            .map_err(Error::from)?,
                    );
                }
            }
        }

        if let Some(stream) = &description.stream {
            request = request.stream_specification(
                SdkStreamSpecification::builder()
                    .stream_enabled(stream.enabled)
                    .stream_view_type(match stream.view_type {
                        StreamViewType::KeysOnly => SdkStreamViewType::KeysOnly,
                        StreamViewType::NewImage => SdkStreamViewType::NewImage,
                        StreamViewType::OldImage => SdkStreamViewType::OldImage,
                        StreamViewType::NewAndOldImages => SdkStreamViewType::NewAndOldImages,
                    })
                    .build()
                    .map_err(|e| AwsBackendError::dynamodb(format!("invalid stream spec: {e}")))
                    .map_err(Error::from)?,
            );
        }

        let output = request.send().await.map_err(|e| {
            Error::from(AwsBackendError::dynamodb(format!("CreateTable failed: {e}")))
        })?;
        let table = output.table_description().ok_or_else(|| {
            Error::from(AwsBackendError::dynamodb("CreateTable returned no description"))
        })?;
        Ok(parse_table_description(table).map_err(Error::from)?)
    }

    async fn describe_table(&self, table_name: &str) -> Result<Option<TableDescription>> {
        let result = self
            .client
            .describe_table()
            .table_name(table_name)
            .send()
            .await;
        match result {
            Ok(output) => match output.table() {
                Some(table) => Ok(Some(parse_table_description(table).map_err(Error::from)?)),
                None => Ok(None),
            },
            Err(aws_sdk_dynamodb::error::SdkError::ServiceError(se))
                if matches!(
                    se.err(),
                    aws_sdk_dynamodb::operation::describe_table::DescribeTableError::ResourceNotFoundException(_)
                ) =>
            {
                Ok(None)
            }
            Err(e) => Err(Error::from(AwsBackendError::dynamodb(format!(
                "DescribeTable failed: {e}"
            )))),
        }
    }

    async fn delete_table(&self, table_name: &str) -> Result<TableDescription> {
        let output = self
            .client
            .delete_table()
            .table_name(table_name)
            .send()
            .await
            .map_err(|e| {
                Error::from(AwsBackendError::dynamodb(format!("DeleteTable failed: {e}")))
            })?;
        let table = output
            .table_description()
            .ok_or_else(|| Error::not_found(format!("table {table_name}")))?;
        Ok(parse_table_description(table).map_err(Error::from)?)
    }

    async fn get_item(&self, request: GetItemRequest) -> Result<GetItemOutput> {
        let output = self
            .client
            .get_item()
            .table_name(&request.table_name)
            .set_key(Some(to_sdk_item(&request.key)))
            .consistent_read(request.consistent_read)
            .send()
            .await
            .map_err(|e| {
                Error::from(AwsBackendError::dynamodb(format!("GetItem failed: {e}")))
            })?;
        Ok(GetItemOutput {
            item: output
                .item()
                .map(from_sdk_item)
                .transpose()
                .map_err(Error::from)?,
        })
    }

    async fn put_item(&self, request: PutItemRequest) -> Result<PutItemOutput> {
        let output = self
            .client
            .put_item()
            .table_name(&request.table_name)
            .set_item(Some(to_sdk_item(&request.item)))
            .return_values(ReturnValue::AllOld)
            .send()
            .await
            .map_err(|e| {
                Error::from(AwsBackendError::dynamodb(format!("PutItem failed: {e}")))
            })?;
        Ok(PutItemOutput {
            attributes: output
                .attributes()
                .map(from_sdk_item)
                .transpose()
                .map_err(Error::from)?,
        })
    }

    async fn update_item(&self, request: UpdateItemRequest) -> Result<UpdateItemOutput> {
        let mut call = self
            .client
            .update_item()
            .table_name(&request.table_name)
            .set_key(Some(to_sdk_item(&request.key)))
            .return_values(ReturnValue::AllNew);
        if let Some(expression) = &request.update_expression {
            call = call.update_expression(expression);
        }
        if let Some(condition) = &request.condition_expression {
            call = call.condition_expression(condition);
        }
        if !request.expression_attribute_names.is_empty() {
            call = call
                .set_expression_attribute_names(Some(request.expression_attribute_names.clone()));
        }
        if !request.expression_attribute_values.is_empty() {
            call = call.set_expression_attribute_values(Some(
                request
                    .expression_attribute_values
                    .iter()
                    .map(|(k, v)| (k.clone(), to_sdk_value(v)))
                    .collect(),
            ));
        }

        let output = call.send().await.map_err(|e| {
            Error::from(AwsBackendError::dynamodb(format!("UpdateItem failed: {e}")))
        })?;
        Ok(UpdateItemOutput {
            attributes: output
                .attributes()
                .map(from_sdk_item)
                .transpose()
                .map_err(Error::from)?,
        })
    }

    async fn delete_item(&self, request: DeleteItemRequest) -> Result<DeleteItemOutput> {
        let output = self
            .client
            .delete_item()
            .table_name(&request.table_name)
            .set_key(Some(to_sdk_item(&request.key)))
            .return_values(ReturnValue::AllOld)
            .send()
            .await
            .map_err(|e| {
                Error::from(AwsBackendError::dynamodb(format!("DeleteItem failed: {e}")))
            })?;
        Ok(DeleteItemOutput {
            attributes: output
                .attributes()
                .map(from_sdk_item)
                .transpose()
                .map_err(Error::from)?,
        })
    }

    async fn query(&self, request: QueryRequest) -> Result<QueryOutput> {
        let mut call = self
            .client
            .query()
            .table_name(&request.table_name)
            .consistent_read(request.consistent_read);
        if let Some(index_name) = &request.index_name {
            call = call.index_name(index_name);
        }
        for (attribute, condition) in &request.key_conditions {
            call = call.key_conditions(
                attribute,
                to_sdk_condition(condition).map_err(Error::from)?,
            );
        }
        if let Some(filter) = &request.filter_expression {
            call = call.filter_expression(filter);
        }
        if !request.expression_attribute_names.is_empty() {
            call = call
                .set_expression_attribute_names(Some(request.expression_attribute_names.clone()));
        }
        if !request.expression_attribute_values.is_empty() {
            call = call.set_expression_attribute_values(Some(
                request
                    .expression_attribute_values
                    .iter()
                    .map(|(k, v)| (k.clone(), to_sdk_value(v)))
                    .collect(),
            ));
        }
        if let Some(start_key) = &request.exclusive_start_key {
            call = call.set_exclusive_start_key(Some(to_sdk_item(start_key)));
        }
        if let Some(limit) = request.limit {
            call = call.limit(limit as i32);
        }

        let output = call.send().await.map_err(|e| {
            Error::from(AwsBackendError::dynamodb(format!("Query failed: {e}")))
        })?;
        Ok(QueryOutput {
            items: output
                .items()
                .iter()
                .map(from_sdk_item)
                .collect::<AwsResult<_>>()
                .map_err(Error::from)?,
            last_evaluated_key: output
                .last_evaluated_key()
                .map(from_sdk_item)
                .transpose()
                .map_err(Error::from)?,
        })
    }

    async fn scan(&self, request: ScanRequest) -> Result<ScanOutput> {
        let mut call = self.client.scan().table_name(&request.table_name);
        if let Some(index_name) = &request.index_name {
            call = call.index_name(index_name);
        }
        if let Some(filter) = &request.filter_expression {
            call = call.filter_expression(filter);
        }
        if !request.expression_attribute_names.is_empty() {
            call = call
                .set_expression_attribute_names(Some(request.expression_attribute_names.clone()));
        }
        if !request.expression_attribute_values.is_empty() {
            call = call.set_expression_attribute_values(Some(
                request
                    .expression_attribute_values
                    .iter()
                    .map(|(k, v)| (k.clone(), to_sdk_value(v)))
                    .collect(),
            ));
        }
        if let Some(start_key) = &request.exclusive_start_key {
            call = call.set_exclusive_start_key(Some(to_sdk_item(start_key)));
        }
        if let Some(limit) = request.limit {
            call = call.limit(limit as i32);
        }

        let output = call.send().await.map_err(|e| {
            Error::from(AwsBackendError::dynamodb(format!("Scan failed: {e}")))
        })?;
        Ok(ScanOutput {
            items: output
                .items()
                .iter()
                .map(from_sdk_item)
                .collect::<AwsResult<_>>()
                .map_err(Error::from)?,
            last_evaluated_key: output
                .last_evaluated_key()
                .map(from_sdk_item)
                .transpose()
                .map_err(Error::from)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn value_translation_round_trips() {
        let values = vec![
            AttributeValue::S("s".into()),
            AttributeValue::N("42".into()),
            AttributeValue::B(vec![1, 2, 3]),
            AttributeValue::Bool(true),
            AttributeValue::Null,
            AttributeValue::Ss(vec!["a".into(), "b".into()]),
            AttributeValue::L(vec![AttributeValue::N("1".into())]),
        ];
        for value in values {
            let round_tripped = from_sdk_value(&to_sdk_value(&value)).unwrap();
            assert_eq!(round_tripped, value);
        }
    }

    #[test]
    fn key_attribute_definitions_deduplicate() {
        let description = TableDescription::builder("t")
            .hash_range_key("hk", KeyAttributeType::S, "rk", KeyAttributeType::N)
            .local_index(
                "lsi0",
                PrimaryKey::hash_range("hk", KeyAttributeType::S, "lsi0_rk", KeyAttributeType::S),
            )
            .build();
        let defs = key_attribute_definitions(&description).unwrap();
        let mut names: Vec<&str> = defs.iter().map(|d| d.attribute_name()).collect();
        names.sort();
        assert_eq!(names, vec!["hk", "lsi0_rk", "rk"]);
    }

    #[test]
    fn condition_translation_carries_operator_and_values() {
        let condition = Condition::eq("x");
        let sdk = to_sdk_condition(&condition).unwrap();
        assert_eq!(sdk.comparison_operator(), &SdkComparisonOperator::Eq);
        assert_eq!(sdk.attribute_value_list().len(), 1);
    }
}
