//! In-memory backend implementation
//!
//! Stores tables in a `parking_lot`-guarded map, making it thread-safe and
//! suitable for multi-threaded async runtimes. It implements only the slice
//! of backend behavior the virtualization layer exercises:
//!
//! - item CRUD keyed by the table's hash (+ optional range) key
//! - query with equality key conditions; scan
//! - the filter-expression subset the request mappers emit
//!   (`#name = :value`, `begins_with(#name, :value)`, joined by `AND`)
//! - change capture: stream-enabled tables accumulate [`StreamRecord`]s,
//!   drained by tests via [`MemoryBackend::take_stream_records`]
//!
//! Results come back in a single page: `limit` and `exclusive_start_key`
//! are ignored and `last_evaluated_key` is always `None`. Non-equality key
//! conditions, filter clauses outside the subset above, and update or
//! condition expressions fail loudly with [`Error::Unsupported`] instead of
//! silently matching nothing.

use crate::client::BackendClient;
use crate::error::{Error, Result};
use crate::request::{
    ComparisonOperator, Condition, DeleteItemOutput, DeleteItemRequest, GetItemOutput,
    GetItemRequest, PutItemOutput, PutItemRequest, QueryOutput, QueryRequest, ScanOutput,
    ScanRequest, UpdateItemOutput, UpdateItemRequest,
};
use crate::schema::{TableDescription, TableStatus};
use crate::stream::{StreamEvent, StreamRecord};
use crate::value::{AttributeValue, Item};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Composite key an item sorts under: encoded hash key, then range key
type ItemKey = (String, Option<String>);

struct TableState {
    description: TableDescription,
    items: BTreeMap<ItemKey, Item>,
    records: Vec<StreamRecord>,
    next_sequence: u64,
}

/// In-memory [`BackendClient`] for tests and local development
#[derive(Clone, Default)]
pub struct MemoryBackend {
    tables: Arc<RwLock<HashMap<String, TableState>>>,
    stream_label_seq: Arc<AtomicU64>,
}

impl std::fmt::Debug for MemoryBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let tables = self.tables.read();
        f.debug_struct("MemoryBackend")
            .field("table_count", &tables.len())
            .finish()
    }
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drain the captured change records of a stream-enabled table
    pub fn take_stream_records(&self, table_name: &str) -> Result<Vec<StreamRecord>> {
        let mut tables = self.tables.write();
        let state = tables
            .get_mut(table_name)
            .ok_or_else(|| Error::not_found(format!("table {table_name}")))?;
        Ok(std::mem::take(&mut state.records))
    }

    fn with_table<T>(
        &self,
        table_name: &str,
        f: impl FnOnce(&mut TableState) -> Result<T>,
    ) -> Result<T> {
        let mut tables = self.tables.write();
        let state = tables
            .get_mut(table_name)
            .ok_or_else(|| Error::not_found(format!("table {table_name}")))?;
        f(state)
    }
}

/// Encode one key attribute value into its sortable string form
fn key_scalar(value: &AttributeValue) -> Result<String> {
    match value {
        AttributeValue::S(s) => Ok(s.clone()),
        AttributeValue::N(n) => Ok(n.clone()),
        AttributeValue::B(b) => Ok(b.iter().map(|byte| format!("{byte:02x}")).collect()),
        other => Err(Error::invalid_value(format!(
            "key attributes must be scalar S, N, or B, got {other:?}"
        ))),
    }
}

/// Extract an item's composite key per the table's key schema
fn item_key(description: &TableDescription, source: &Item) -> Result<ItemKey> {
    let hash = source.get(&description.key.hash_key).ok_or_else(|| {
        Error::invalid_value(format!(
            "missing hash key attribute '{}'",
            description.key.hash_key
        ))
    })?;
    let range = match &description.key.range_key {
        Some(rk) => Some(key_scalar(source.get(rk).ok_or_else(|| {
            Error::invalid_value(format!("missing range key attribute '{rk}'"))
        })?)?),
        None => None,
    };
    Ok((key_scalar(hash)?, range))
}

/// The key attributes of an item, as a sub-item
fn key_attributes(description: &TableDescription, item: &Item) -> Item {
    description
        .key_attribute_names()
        .into_iter()
        .filter_map(|name| item.get(name).map(|v| (name.to_string(), v.clone())))
        .collect()
}

fn resolve_name<'a>(token: &'a str, names: &'a HashMap<String, String>) -> Result<&'a str> {
    if token.starts_with('#') {
        names
            .get(token)
            .map(String::as_str)
            .ok_or_else(|| Error::unsupported(format!("undefined name placeholder {token}")))
    } else {
        Ok(token)
    }
}

fn resolve_value<'a>(
    token: &str,
    values: &'a HashMap<String, AttributeValue>,
) -> Result<&'a AttributeValue> {
    if token.starts_with(':') {
        values
            .get(token)
            .ok_or_else(|| Error::unsupported(format!("undefined value placeholder {token}")))
    } else {
        Err(Error::unsupported(
            "literal operands in filter expressions are not supported",
        ))
    }
}

/// Evaluate the supported filter-expression subset against one item
fn eval_filter(
    expression: &str,
    names: &HashMap<String, String>,
    values: &HashMap<String, AttributeValue>,
    item: &Item,
) -> Result<bool> {
    for clause in expression.split(" AND ") {
        let clause = clause.trim();
        let matched = if let Some(inner) = clause
            .strip_prefix("begins_with(")
            .and_then(|rest| rest.strip_suffix(')'))
        {
            let (name_tok, value_tok) = inner.split_once(',').ok_or_else(|| {
                Error::unsupported(format!("malformed begins_with clause: {clause}"))
            })?;
            let name = resolve_name(name_tok.trim(), names)?;
            let value = resolve_value(value_tok.trim(), values)?;
            let prefix = value
                .as_s()
                .ok_or_else(|| Error::unsupported("begins_with requires a string operand"))?;
            item.get(name)
                .and_then(AttributeValue::as_s)
                .map(|s| s.starts_with(prefix))
                .unwrap_or(false)
        } else if let Some((lhs, rhs)) = clause.split_once('=') {
            let name = resolve_name(lhs.trim(), names)?;
            let value = resolve_value(rhs.trim(), values)?;
            item.get(name) == Some(value)
        } else {
            return Err(Error::unsupported(format!(
                "unsupported filter clause: {clause}"
            )));
        };
        if !matched {
            return Ok(false);
        }
    }
    Ok(true)
}

fn matches_condition(attribute: Option<&AttributeValue>, condition: &Condition) -> Result<bool> {
    if condition.operator != ComparisonOperator::Eq {
        return Err(Error::unsupported(
            "only EQ key conditions are supported by the memory backend",
        ));
    }
    let operand = condition
        .values
        .first()
        .ok_or_else(|| Error::invalid_value("condition is missing an operand"))?;
    Ok(attribute == Some(operand))
}

impl TableState {
    fn capture(&mut self, event: StreamEvent, keys: Item, old: Option<Item>, new: Option<Item>) {
        if !self.description.stream_enabled() {
            return;
        }
        let sequence_number = self.next_sequence;
        self.next_sequence += 1;
        self.records.push(StreamRecord {
            event_id: format!("{}-{sequence_number}", self.description.table_name),
            event,
            sequence_number,
            keys,
            old_image: old,
            new_image: new,
        });
    }
}

#[async_trait]
impl BackendClient for MemoryBackend {
    async fn create_table(&self, description: &TableDescription) -> Result<TableDescription> {
        let mut tables = self.tables.write();
        if tables.contains_key(&description.table_name) {
            return Err(Error::backend(format!(
                "table already exists: {}",
                description.table_name
            )));
        }
        let mut description = description.clone();
        description.status = TableStatus::Active;
        if description.stream_enabled() && description.stream_label.is_none() {
            let n = self.stream_label_seq.fetch_add(1, Ordering::Relaxed);
            description.stream_label = Some(format!("stream/{}/{n:08}", description.table_name));
        }
        tables.insert(
            description.table_name.clone(),
            TableState {
                description: description.clone(),
                items: BTreeMap::new(),
                records: Vec::new(),
                next_sequence: 0,
            },
        );
        Ok(description)
    }

    async fn describe_table(&self, table_name: &str) -> Result<Option<TableDescription>> {
        Ok(self
            .tables
            .read()
            .get(table_name)
            .map(|state| state.description.clone()))
    }

    async fn delete_table(&self, table_name: &str) -> Result<TableDescription> {
        let state = self
            .tables
            .write()
            .remove(table_name)
            .ok_or_else(|| Error::not_found(format!("table {table_name}")))?;
        let mut description = state.description;
        description.status = TableStatus::Deleting;
        Ok(description)
    }

    async fn get_item(&self, request: GetItemRequest) -> Result<GetItemOutput> {
        self.with_table(&request.table_name, |state| {
            let key = item_key(&state.description, &request.key)?;
            Ok(GetItemOutput {
                item: state.items.get(&key).cloned(),
            })
        })
    }

    async fn put_item(&self, request: PutItemRequest) -> Result<PutItemOutput> {
        self.with_table(&request.table_name, |state| {
            let key = item_key(&state.description, &request.item)?;
            let keys = key_attributes(&state.description, &request.item);
            let old = state.items.insert(key, request.item.clone());
            let event = if old.is_some() {
                StreamEvent::Modify
            } else {
                StreamEvent::Insert
            };
            state.capture(event, keys, old.clone(), Some(request.item));
            Ok(PutItemOutput { attributes: old })
        })
    }

    async fn update_item(&self, request: UpdateItemRequest) -> Result<UpdateItemOutput> {
        if request.update_expression.is_some() || request.condition_expression.is_some() {
            return Err(Error::unsupported(
                "update and condition expressions are not supported by the memory backend",
            ));
        }
        // An expressionless update upserts the key attributes.
        self.with_table(&request.table_name, |state| {
            let key = item_key(&state.description, &request.key)?;
            let item = state
                .items
                .get(&key)
                .cloned()
                .unwrap_or_else(|| request.key.clone());
            let keys = key_attributes(&state.description, &item);
            let old = state.items.insert(key, item.clone());
            let event = if old.is_some() {
                StreamEvent::Modify
            } else {
                StreamEvent::Insert
            };
            state.capture(event, keys, old, Some(item.clone()));
            Ok(UpdateItemOutput {
                attributes: Some(item),
            })
        })
    }

    async fn delete_item(&self, request: DeleteItemRequest) -> Result<DeleteItemOutput> {
        self.with_table(&request.table_name, |state| {
            let key = item_key(&state.description, &request.key)?;
            let old = state.items.remove(&key);
            if let Some(old_item) = &old {
                let keys = key_attributes(&state.description, old_item);
                state.capture(StreamEvent::Remove, keys, old.clone(), None);
            }
            Ok(DeleteItemOutput { attributes: old })
        })
    }

    async fn query(&self, request: QueryRequest) -> Result<QueryOutput> {
        self.with_table(&request.table_name, |state| {
            let mut items = Vec::new();
            'items: for item in state.items.values() {
                for (attribute, condition) in &request.key_conditions {
                    if !matches_condition(item.get(attribute), condition)? {
                        continue 'items;
                    }
                }
                if let Some(expression) = &request.filter_expression {
                    if !eval_filter(
                        expression,
                        &request.expression_attribute_names,
                        &request.expression_attribute_values,
                        item,
                    )? {
                        continue;
                    }
                }
                items.push(item.clone());
            }
            Ok(QueryOutput {
                items,
                last_evaluated_key: None,
            })
        })
    }

    async fn scan(&self, request: ScanRequest) -> Result<ScanOutput> {
        self.with_table(&request.table_name, |state| {
            let mut items = Vec::new();
            for item in state.items.values() {
                if let Some(expression) = &request.filter_expression {
                    if !eval_filter(
                        expression,
                        &request.expression_attribute_names,
                        &request.expression_attribute_values,
                        item,
                    )? {
                        continue;
                    }
                }
                items.push(item.clone());
            }
            Ok(ScanOutput {
                items,
                last_evaluated_key: None,
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{KeyAttributeType, StreamViewType};

    fn item(pairs: &[(&str, &str)]) -> Item {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), AttributeValue::S(v.to_string())))
            .collect()
    }

    fn table() -> TableDescription {
        TableDescription::builder("t")
            .hash_key("hk", KeyAttributeType::S)
            .build()
    }

    #[tokio::test]
    async fn put_get_delete_round_trip() {
        let backend = MemoryBackend::new();
        backend.create_table(&table()).await.unwrap();

        let row = item(&[("hk", "a"), ("field", "v")]);
        backend
            .put_item(PutItemRequest::new("t", row.clone()))
            .await
            .unwrap();

        let got = backend
            .get_item(GetItemRequest::new("t", item(&[("hk", "a")])))
            .await
            .unwrap();
        assert_eq!(got.item, Some(row));

        backend
            .delete_item(DeleteItemRequest::new("t", item(&[("hk", "a")])))
            .await
            .unwrap();
        let got = backend
            .get_item(GetItemRequest::new("t", item(&[("hk", "a")])))
            .await
            .unwrap();
        assert_eq!(got.item, None);
    }

    #[tokio::test]
    async fn put_is_idempotent_per_key() {
        let backend = MemoryBackend::new();
        backend.create_table(&table()).await.unwrap();

        let row = item(&[("hk", "a"), ("field", "v")]);
        for _ in 0..2 {
            backend
                .put_item(PutItemRequest::new("t", row.clone()))
                .await
                .unwrap();
        }
        let out = backend.scan(ScanRequest::new("t")).await.unwrap();
        assert_eq!(out.items.len(), 1);
    }

    #[tokio::test]
    async fn scan_filter_begins_with_and_eq() {
        let backend = MemoryBackend::new();
        backend.create_table(&table()).await.unwrap();
        backend
            .put_item(PutItemRequest::new("t", item(&[("hk", "p.a"), ("f", "1")])))
            .await
            .unwrap();
        backend
            .put_item(PutItemRequest::new("t", item(&[("hk", "q.b"), ("f", "1")])))
            .await
            .unwrap();

        let mut request = ScanRequest::new("t");
        request.filter_expression = Some("begins_with(#h, :p) AND #f = :v".to_string());
        request
            .expression_attribute_names
            .extend([("#h".to_string(), "hk".to_string()), ("#f".to_string(), "f".to_string())]);
        request.expression_attribute_values.extend([
            (":p".to_string(), AttributeValue::S("p.".to_string())),
            (":v".to_string(), AttributeValue::S("1".to_string())),
        ]);
        let out = backend.scan(request).await.unwrap();
        assert_eq!(out.items.len(), 1);
        assert_eq!(out.items[0].get("hk").unwrap().as_s(), Some("p.a"));
    }

    #[tokio::test]
    async fn query_supports_eq_only() {
        let backend = MemoryBackend::new();
        backend.create_table(&table()).await.unwrap();
        backend
            .put_item(PutItemRequest::new("t", item(&[("hk", "a")])))
            .await
            .unwrap();

        let request = QueryRequest::new("t").key_condition("hk", Condition::eq("a"));
        let out = backend.query(request).await.unwrap();
        assert_eq!(out.items.len(), 1);

        let request = QueryRequest::new("t").key_condition("hk", Condition::begins_with("a"));
        assert!(matches!(
            backend.query(request).await,
            Err(Error::Unsupported(_))
        ));
    }

    #[tokio::test]
    async fn update_expressions_are_rejected() {
        let backend = MemoryBackend::new();
        backend.create_table(&table()).await.unwrap();

        let mut request = UpdateItemRequest::new("t", item(&[("hk", "a")]));
        request.update_expression = Some("SET #f = :v".to_string());
        assert!(matches!(
            backend.update_item(request).await,
            Err(Error::Unsupported(_))
        ));

        // Without expressions, update upserts the key attributes.
        backend
            .update_item(UpdateItemRequest::new("t", item(&[("hk", "a")])))
            .await
            .unwrap();
        let out = backend.scan(ScanRequest::new("t")).await.unwrap();
        assert_eq!(out.items.len(), 1);
    }

    #[tokio::test]
    async fn stream_records_capture_mutations() {
        let backend = MemoryBackend::new();
        let desc = TableDescription::builder("t")
            .hash_key("hk", KeyAttributeType::S)
            .stream(StreamViewType::NewAndOldImages)
            .build();
        let created = backend.create_table(&desc).await.unwrap();
        assert!(created.stream_label.is_some());

        backend
            .put_item(PutItemRequest::new("t", item(&[("hk", "a"), ("f", "1")])))
            .await
            .unwrap();
        backend
            .delete_item(DeleteItemRequest::new("t", item(&[("hk", "a")])))
            .await
            .unwrap();

        let records = backend.take_stream_records("t").unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].event, StreamEvent::Insert);
        assert_eq!(records[1].event, StreamEvent::Remove);
        assert_eq!(records[0].keys.get("hk").unwrap().as_s(), Some("a"));
        assert!(backend.take_stream_records("t").unwrap().is_empty());
    }
}
