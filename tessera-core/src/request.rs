//! Request and response types for the backend API subset
//!
//! These model exactly the operations the virtualization layer dispatches:
//! item CRUD, query, and scan. Key conditions use the typed
//! [`Condition`] map form; richer predicates travel as filter expressions
//! with `#name` / `:value` placeholder maps. Pagination tokens
//! (`exclusive_start_key` / `last_evaluated_key`) are opaque to this layer.

use crate::value::{AttributeValue, Item};
use std::collections::{BTreeMap, HashMap};

/// Comparison operator of a key condition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComparisonOperator {
    Eq,
    Le,
    Lt,
    Ge,
    Gt,
    Between,
    BeginsWith,
}

/// A single condition over one attribute
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    pub operator: ComparisonOperator,
    pub values: Vec<AttributeValue>,
}

impl Condition {
    /// Equality against a single value
    pub fn eq(value: impl Into<AttributeValue>) -> Self {
        Self {
            operator: ComparisonOperator::Eq,
            values: vec![value.into()],
        }
    }

    /// Prefix match against a single value
    pub fn begins_with(value: impl Into<AttributeValue>) -> Self {
        Self {
            operator: ComparisonOperator::BeginsWith,
            values: vec![value.into()],
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct GetItemRequest {
    pub table_name: String,
    pub key: Item,
    pub consistent_read: bool,
}

impl GetItemRequest {
    pub fn new(table_name: impl Into<String>, key: Item) -> Self {
        Self {
            table_name: table_name.into(),
            key,
            consistent_read: false,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct GetItemOutput {
    pub item: Option<Item>,
}

#[derive(Debug, Clone, Default)]
pub struct PutItemRequest {
    pub table_name: String,
    pub item: Item,
}

impl PutItemRequest {
    pub fn new(table_name: impl Into<String>, item: Item) -> Self {
        Self {
            table_name: table_name.into(),
            item,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct PutItemOutput {
    /// Previous item image, when the backend returns one
    pub attributes: Option<Item>,
}

#[derive(Debug, Clone, Default)]
pub struct DeleteItemRequest {
    pub table_name: String,
    pub key: Item,
}

impl DeleteItemRequest {
    pub fn new(table_name: impl Into<String>, key: Item) -> Self {
        Self {
            table_name: table_name.into(),
            key,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct DeleteItemOutput {
    pub attributes: Option<Item>,
}

/// Update request
///
/// The update and condition expressions are carried verbatim; only the
/// key is rewritten by the virtualization layer.
#[derive(Debug, Clone, Default)]
pub struct UpdateItemRequest {
    pub table_name: String,
    pub key: Item,
    pub update_expression: Option<String>,
    pub condition_expression: Option<String>,
    pub expression_attribute_names: HashMap<String, String>,
    pub expression_attribute_values: HashMap<String, AttributeValue>,
}

impl UpdateItemRequest {
    pub fn new(table_name: impl Into<String>, key: Item) -> Self {
        Self {
            table_name: table_name.into(),
            key,
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct UpdateItemOutput {
    pub attributes: Option<Item>,
}

#[derive(Debug, Clone, Default)]
pub struct QueryRequest {
    pub table_name: String,
    pub index_name: Option<String>,
    /// Key conditions, attribute name to condition. Ordered so request
    /// rewriting and logging are deterministic.
    pub key_conditions: BTreeMap<String, Condition>,
    pub filter_expression: Option<String>,
    pub expression_attribute_names: HashMap<String, String>,
    pub expression_attribute_values: HashMap<String, AttributeValue>,
    pub exclusive_start_key: Option<Item>,
    pub limit: Option<u32>,
    pub consistent_read: bool,
}

impl QueryRequest {
    pub fn new(table_name: impl Into<String>) -> Self {
        Self {
            table_name: table_name.into(),
            ..Default::default()
        }
    }

    pub fn key_condition(mut self, attribute: impl Into<String>, condition: Condition) -> Self {
        self.key_conditions.insert(attribute.into(), condition);
        self
    }

    pub fn index(mut self, index_name: impl Into<String>) -> Self {
        self.index_name = Some(index_name.into());
        self
    }
}

#[derive(Debug, Clone, Default)]
pub struct QueryOutput {
    pub items: Vec<Item>,
    pub last_evaluated_key: Option<Item>,
}

#[derive(Debug, Clone, Default)]
pub struct ScanRequest {
    pub table_name: String,
    pub index_name: Option<String>,
    pub filter_expression: Option<String>,
    pub expression_attribute_names: HashMap<String, String>,
    pub expression_attribute_values: HashMap<String, AttributeValue>,
    pub exclusive_start_key: Option<Item>,
    pub limit: Option<u32>,
}

impl ScanRequest {
    pub fn new(table_name: impl Into<String>) -> Self {
        Self {
            table_name: table_name.into(),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ScanOutput {
    pub items: Vec<Item>,
    pub last_evaluated_key: Option<Item>,
}
