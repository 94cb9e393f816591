//! Table, key, and secondary-index schema model
//!
//! One [`TableDescription`] type serves both roles in the virtualization
//! layer: tables as tenants declare them (virtual) and tables as the backend
//! actually stores them (physical). Descriptions are plain serializable data;
//! the metadata repository persists the virtual ones as JSON documents.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Scalar type of a key attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum KeyAttributeType {
    /// String
    S,
    /// Number
    N,
    /// Binary
    B,
}

impl fmt::Display for KeyAttributeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyAttributeType::S => write!(f, "S"),
            KeyAttributeType::N => write!(f, "N"),
            KeyAttributeType::B => write!(f, "B"),
        }
    }
}

/// A table or index primary key: hash key plus optional range key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrimaryKey {
    pub hash_key: String,
    pub hash_key_type: KeyAttributeType,
    pub range_key: Option<String>,
    pub range_key_type: Option<KeyAttributeType>,
}

impl PrimaryKey {
    /// Hash-only key
    pub fn hash(name: impl Into<String>, key_type: KeyAttributeType) -> Self {
        Self {
            hash_key: name.into(),
            hash_key_type: key_type,
            range_key: None,
            range_key_type: None,
        }
    }

    /// Hash + range key
    pub fn hash_range(
        hash: impl Into<String>,
        hash_type: KeyAttributeType,
        range: impl Into<String>,
        range_type: KeyAttributeType,
    ) -> Self {
        Self {
            hash_key: hash.into(),
            hash_key_type: hash_type,
            range_key: Some(range.into()),
            range_key_type: Some(range_type),
        }
    }
}

impl fmt::Display for PrimaryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{hash={}:{}", self.hash_key, self.hash_key_type)?;
        if let (Some(rk), Some(rt)) = (&self.range_key, &self.range_key_type) {
            write!(f, ", range={rk}:{rt}")?;
        }
        write!(f, "}}")
    }
}

/// Secondary index kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IndexKind {
    /// Global secondary index: its own hash key
    Gsi,
    /// Local secondary index: shares the table's hash key
    Lsi,
}

impl fmt::Display for IndexKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IndexKind::Gsi => write!(f, "GSI"),
            IndexKind::Lsi => write!(f, "LSI"),
        }
    }
}

/// Index projection type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ProjectionType {
    #[default]
    All,
    KeysOnly,
    Include,
}

/// Attributes projected into a secondary index
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Projection {
    pub projection_type: ProjectionType,
    pub non_key_attributes: Vec<String>,
}

/// A secondary index of a table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecondaryIndex {
    pub index_name: String,
    pub kind: IndexKind,
    pub key: PrimaryKey,
    pub projection: Projection,
}

/// View of item data delivered on the change stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum StreamViewType {
    KeysOnly,
    NewImage,
    OldImage,
    #[default]
    NewAndOldImages,
}

/// Change-capture settings of a table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamSpecification {
    pub enabled: bool,
    pub view_type: StreamViewType,
}

/// Table lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TableStatus {
    Creating,
    #[default]
    Active,
    Deleting,
}

impl fmt::Display for TableStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TableStatus::Creating => write!(f, "CREATING"),
            TableStatus::Active => write!(f, "ACTIVE"),
            TableStatus::Deleting => write!(f, "DELETING"),
        }
    }
}

/// Description of a table: name, primary key, secondary indexes, streaming
///
/// `stream_label` is assigned by the backend when a stream-enabled table is
/// created; it is `None` on descriptions that have not round-tripped through
/// the backend yet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableDescription {
    pub table_name: String,
    pub key: PrimaryKey,
    pub secondary_indexes: Vec<SecondaryIndex>,
    pub stream: Option<StreamSpecification>,
    pub stream_label: Option<String>,
    pub status: TableStatus,
}

impl TableDescription {
    /// Start building a description for the named table
    pub fn builder(table_name: impl Into<String>) -> TableDescriptionBuilder {
        TableDescriptionBuilder::new(table_name)
    }

    /// Global secondary indexes, in declaration order
    pub fn gsis(&self) -> impl Iterator<Item = &SecondaryIndex> {
        self.secondary_indexes
            .iter()
            .filter(|si| si.kind == IndexKind::Gsi)
    }

    /// Local secondary indexes, in declaration order
    pub fn lsis(&self) -> impl Iterator<Item = &SecondaryIndex> {
        self.secondary_indexes
            .iter()
            .filter(|si| si.kind == IndexKind::Lsi)
    }

    /// Whether change capture is enabled on this table
    pub fn stream_enabled(&self) -> bool {
        self.stream.as_ref().map(|s| s.enabled).unwrap_or(false)
    }

    /// Names of the table-level key attributes (hash, then range if present)
    pub fn key_attribute_names(&self) -> Vec<&str> {
        let mut names = vec![self.key.hash_key.as_str()];
        if let Some(rk) = &self.key.range_key {
            names.push(rk.as_str());
        }
        names
    }
}

/// Fluent builder for [`TableDescription`]
#[derive(Debug, Clone)]
pub struct TableDescriptionBuilder {
    table_name: String,
    key: Option<PrimaryKey>,
    secondary_indexes: Vec<SecondaryIndex>,
    stream: Option<StreamSpecification>,
}

impl TableDescriptionBuilder {
    pub fn new(table_name: impl Into<String>) -> Self {
        Self {
            table_name: table_name.into(),
            key: None,
            secondary_indexes: Vec::new(),
            stream: None,
        }
    }

    /// Set a hash-only primary key
    pub fn hash_key(mut self, name: impl Into<String>, key_type: KeyAttributeType) -> Self {
        self.key = Some(PrimaryKey::hash(name, key_type));
        self
    }

    /// Set a hash + range primary key
    pub fn hash_range_key(
        mut self,
        hash: impl Into<String>,
        hash_type: KeyAttributeType,
        range: impl Into<String>,
        range_type: KeyAttributeType,
    ) -> Self {
        self.key = Some(PrimaryKey::hash_range(hash, hash_type, range, range_type));
        self
    }

    /// Add a global secondary index projecting all attributes
    pub fn global_index(mut self, name: impl Into<String>, key: PrimaryKey) -> Self {
        self.secondary_indexes.push(SecondaryIndex {
            index_name: name.into(),
            kind: IndexKind::Gsi,
            key,
            projection: Projection::default(),
        });
        self
    }

    /// Add a local secondary index projecting all attributes
    pub fn local_index(mut self, name: impl Into<String>, key: PrimaryKey) -> Self {
        self.secondary_indexes.push(SecondaryIndex {
            index_name: name.into(),
            kind: IndexKind::Lsi,
            key,
            projection: Projection::default(),
        });
        self
    }

    /// Add a fully specified secondary index
    pub fn secondary_index(mut self, index: SecondaryIndex) -> Self {
        self.secondary_indexes.push(index);
        self
    }

    /// Enable change capture with the given view
    pub fn stream(mut self, view_type: StreamViewType) -> Self {
        self.stream = Some(StreamSpecification {
            enabled: true,
            view_type,
        });
        self
    }

    /// Finish the description
    ///
    /// Panics if no primary key was set; a table without a hash key is a
    /// programming error, not a runtime condition.
    pub fn build(self) -> TableDescription {
        TableDescription {
            table_name: self.table_name,
            key: self.key.expect("table description requires a primary key"),
            secondary_indexes: self.secondary_indexes,
            stream: self.stream,
            stream_label: None,
            status: TableStatus::Active,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_produces_expected_description() {
        let desc = TableDescription::builder("orders")
            .hash_range_key("customer", KeyAttributeType::S, "order_id", KeyAttributeType::N)
            .global_index(
                "by-status",
                PrimaryKey::hash("status", KeyAttributeType::S),
            )
            .stream(StreamViewType::NewAndOldImages)
            .build();

        assert_eq!(desc.table_name, "orders");
        assert_eq!(desc.key.range_key.as_deref(), Some("order_id"));
        assert_eq!(desc.gsis().count(), 1);
        assert_eq!(desc.lsis().count(), 0);
        assert!(desc.stream_enabled());
        assert_eq!(desc.status, TableStatus::Active);
    }

    #[test]
    fn key_attribute_names_include_range() {
        let desc = TableDescription::builder("t")
            .hash_range_key("h", KeyAttributeType::S, "r", KeyAttributeType::S)
            .build();
        assert_eq!(desc.key_attribute_names(), vec!["h", "r"]);
    }
}
