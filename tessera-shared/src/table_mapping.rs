//! Table mapping
//!
//! Holds the state of mapping one virtual table onto a physical table: the
//! two descriptions, the field mappings grouped virtual→physical and
//! physical→virtual, and the per-secondary-index mappings. Built once per
//! `(tenant, virtual table)` and cached; immutable afterwards except for a
//! one-time refresh of the physical description, which captures
//! backend-assigned fields such as the stream label.

use crate::error::{Error, Result};
use crate::field::{FieldDef, FieldMapper, FieldMapping, IndexScope};
use crate::index::{key_compatible, SecondaryIndexMapper};
use crate::item::ItemMapper;
use crate::prefix::FieldPrefixCodec;
use crate::query::QueryMapper;
use std::collections::HashMap;
use std::sync::Arc;
use tessera_core::{
    ContextProvider, IndexKind, KeyAttributeType, PrimaryKey, SecondaryIndex, TableDescription,
};

/// A virtual secondary index resolved onto its physical counterpart
#[derive(Debug, Clone)]
pub struct IndexMapping {
    pub physical_index: SecondaryIndex,
    pub field_mappings: Vec<FieldMapping>,
}

/// The per-virtual-table mapping artifact
#[derive(Debug)]
pub struct TableMapping {
    virtual_table: TableDescription,
    physical_table: TableDescription,
    /// Table-level primary-key mappings (hash, then range when present)
    table_field_mappings: Vec<FieldMapping>,
    /// Per virtual secondary index, keyed by virtual index name
    index_mappings: HashMap<String, IndexMapping>,
    /// All mappings keyed by virtual attribute name
    virtual_to_physical: HashMap<String, Vec<FieldMapping>>,
    /// All mappings keyed by physical attribute name
    physical_to_virtual: HashMap<String, Vec<FieldMapping>>,
    field_mapper: FieldMapper,
}

impl TableMapping {
    /// Build and validate the mapping of `virtual_table` onto
    /// `physical_table`
    pub fn build(
        virtual_table: TableDescription,
        physical_table: TableDescription,
        index_mapper: &dyn SecondaryIndexMapper,
        context: Arc<dyn ContextProvider>,
        codec: FieldPrefixCodec,
    ) -> Result<Self> {
        validate_physical_table(&physical_table)?;
        validate_primary_key_pair(&virtual_table.key, &physical_table.key).map_err(|msg| {
            Error::invalid_mapping(format!(
                "virtual to physical table primary key: {msg}, virtual_table={}, physical_table={}",
                virtual_table.table_name, physical_table.table_name
            ))
        })?;

        let index_mappings =
            build_index_mappings(&virtual_table, &physical_table, index_mapper)?;
        validate_lsi_uniqueness(&virtual_table, &index_mappings)?;

        let table_field_mappings =
            table_primary_key_mappings(&virtual_table, &physical_table);

        let mut virtual_to_physical: HashMap<String, Vec<FieldMapping>> = HashMap::new();
        for mapping in table_field_mappings
            .iter()
            .chain(index_mappings.values().flat_map(|im| im.field_mappings.iter()))
        {
            virtual_to_physical
                .entry(mapping.source.name.clone())
                .or_default()
                .push(mapping.clone());
        }

        let mut physical_to_virtual: HashMap<String, Vec<FieldMapping>> = HashMap::new();
        for mapping in virtual_to_physical.values().flatten() {
            physical_to_virtual
                .entry(mapping.target.name.clone())
                .or_insert_with(|| vec![mapping.invert()]);
        }

        let field_mapper = FieldMapper::new(context, virtual_table.table_name.clone(), codec);

        Ok(Self {
            virtual_table,
            physical_table,
            table_field_mappings,
            index_mappings,
            virtual_to_physical,
            physical_to_virtual,
            field_mapper,
        })
    }

    pub fn virtual_table(&self) -> &TableDescription {
        &self.virtual_table
    }

    pub fn physical_table(&self) -> &TableDescription {
        &self.physical_table
    }

    /// One-time refresh after the physical table has been created on the
    /// backend, so the mapping sees backend-assigned fields
    pub(crate) fn set_physical_table(&mut self, physical_table: TableDescription) {
        self.physical_table = physical_table;
    }

    pub fn item_mapper(&self) -> ItemMapper<'_> {
        ItemMapper::new(self)
    }

    pub fn query_mapper(&self) -> QueryMapper<'_> {
        QueryMapper::new(self)
    }

    pub fn field_mapper(&self) -> &FieldMapper {
        &self.field_mapper
    }

    /// Mapping of virtual to physical fields
    pub fn virtual_to_physical(&self) -> &HashMap<String, Vec<FieldMapping>> {
        &self.virtual_to_physical
    }

    /// Mapping of physical to virtual fields
    pub fn physical_to_virtual(&self) -> &HashMap<String, Vec<FieldMapping>> {
        &self.physical_to_virtual
    }

    /// Table-level primary-key mappings only
    pub fn table_field_mappings(&self) -> &[FieldMapping] {
        &self.table_field_mappings
    }

    /// The resolved mapping of a virtual secondary index
    pub fn index_mapping(&self, virtual_index_name: &str) -> Result<&IndexMapping> {
        self.index_mappings.get(virtual_index_name).ok_or_else(|| {
            Error::unmappable_index(format!(
                "virtual table '{}' has no secondary index '{virtual_index_name}'",
                self.virtual_table.table_name
            ))
        })
    }
}

/// The physical table and all of its secondary indexes must hash on strings
fn validate_physical_table(physical: &TableDescription) -> Result<()> {
    let check = |key: &PrimaryKey, what: String| -> Result<()> {
        if key.hash_key_type != KeyAttributeType::S {
            return Err(Error::invalid_mapping(format!(
                "{what} hash key must be of type S, encountered type {}",
                key.hash_key_type
            )));
        }
        Ok(())
    };
    check(
        &physical.key,
        format!("physical table '{}'", physical.table_name),
    )?;
    for index in &physical.secondary_indexes {
        check(
            &index.key,
            format!(
                "physical table '{}' {} '{}'",
                physical.table_name, index.kind, index.index_name
            ),
        )?;
    }
    Ok(())
}

/// Key-schema compatibility of one virtual/physical key pair
fn validate_primary_key_pair(
    virtual_key: &PrimaryKey,
    physical_key: &PrimaryKey,
) -> std::result::Result<(), String> {
    if virtual_key.hash_key.is_empty() {
        return Err("hash key is required on the virtual key".to_string());
    }
    if physical_key.hash_key.is_empty() {
        return Err("hash key is required on the physical key".to_string());
    }
    if physical_key.hash_key_type != KeyAttributeType::S {
        return Err(format!(
            "physical hash key must be of type S, encountered type {}",
            physical_key.hash_key_type
        ));
    }
    if virtual_key.range_key.is_some() {
        if physical_key.range_key.is_none() {
            return Err("range key exists on the virtual key but not on the physical".to_string());
        }
        if virtual_key.range_key_type != physical_key.range_key_type {
            return Err("virtual and physical range key types mismatch".to_string());
        }
    }
    Ok(())
}

/// Table-level primary-key mappings: hash (context-aware), then range
fn table_primary_key_mappings(
    virtual_table: &TableDescription,
    physical_table: &TableDescription,
) -> Vec<FieldMapping> {
    let mut mappings = vec![FieldMapping {
        source: FieldDef::new(&virtual_table.key.hash_key, virtual_table.key.hash_key_type),
        target: FieldDef::new(&physical_table.key.hash_key, physical_table.key.hash_key_type),
        virtual_index_name: virtual_table.table_name.clone(),
        physical_index_name: physical_table.table_name.clone(),
        scope: IndexScope::Table,
        context_aware: true,
    }];
    if let (Some(v_range), Some(v_type), Some(p_range), Some(p_type)) = (
        &virtual_table.key.range_key,
        virtual_table.key.range_key_type,
        &physical_table.key.range_key,
        physical_table.key.range_key_type,
    ) {
        mappings.push(FieldMapping {
            source: FieldDef::new(v_range, v_type),
            target: FieldDef::new(p_range, p_type),
            virtual_index_name: virtual_table.table_name.clone(),
            physical_index_name: physical_table.table_name.clone(),
            scope: IndexScope::Table,
            context_aware: false,
        });
    }
    mappings
}

/// Resolve every virtual secondary index and derive its field mappings
///
/// The hash mapping of an LSI carries table scope (an LSI shares the table's
/// partition key); everything else on an index is index-scoped.
fn build_index_mappings(
    virtual_table: &TableDescription,
    physical_table: &TableDescription,
    index_mapper: &dyn SecondaryIndexMapper,
) -> Result<HashMap<String, IndexMapping>> {
    let mut index_mappings = HashMap::new();
    for virtual_index in &virtual_table.secondary_indexes {
        let physical_index = index_mapper
            .lookup_physical_index(virtual_index, physical_table)
            .map_err(|e| {
                Error::invalid_mapping(format!(
                    "failure mapping virtual to physical {}: {e}, virtual_table={}, physical_table={}",
                    virtual_index.kind, virtual_table.table_name, physical_table.table_name
                ))
            })?;
        if !key_compatible(&virtual_index.key, &physical_index.key) {
            return Err(Error::invalid_mapping(format!(
                "virtual {} '{}' ({}) is incompatible with physical '{}' ({})",
                virtual_index.kind,
                virtual_index.index_name,
                virtual_index.key,
                physical_index.index_name,
                physical_index.key
            )));
        }

        let mut field_mappings = vec![FieldMapping {
            source: FieldDef::new(&virtual_index.key.hash_key, virtual_index.key.hash_key_type),
            target: FieldDef::new(&physical_index.key.hash_key, physical_index.key.hash_key_type),
            virtual_index_name: virtual_index.index_name.clone(),
            physical_index_name: physical_index.index_name.clone(),
            scope: if virtual_index.kind == IndexKind::Lsi {
                IndexScope::Table
            } else {
                IndexScope::SecondaryIndex
            },
            context_aware: true,
        }];
        if let (Some(v_range), Some(v_type), Some(p_range), Some(p_type)) = (
            &virtual_index.key.range_key,
            virtual_index.key.range_key_type,
            &physical_index.key.range_key,
            physical_index.key.range_key_type,
        ) {
            field_mappings.push(FieldMapping {
                source: FieldDef::new(v_range, v_type),
                target: FieldDef::new(p_range, p_type),
                virtual_index_name: virtual_index.index_name.clone(),
                physical_index_name: physical_index.index_name.clone(),
                scope: IndexScope::SecondaryIndex,
                context_aware: false,
            });
        }
        index_mappings.insert(
            virtual_index.index_name.clone(),
            IndexMapping {
                physical_index,
                field_mappings,
            },
        );
    }
    Ok(index_mappings)
}

/// No two virtual LSIs may land on the same physical LSI
fn validate_lsi_uniqueness(
    virtual_table: &TableDescription,
    index_mappings: &HashMap<String, IndexMapping>,
) -> Result<()> {
    let mut used: HashMap<&str, &str> = HashMap::new();
    for virtual_lsi in virtual_table.lsis() {
        let Some(mapping) = index_mappings.get(&virtual_lsi.index_name) else {
            continue;
        };
        let physical_name = mapping.physical_index.index_name.as_str();
        if let Some(previous) = used.insert(physical_name, &virtual_lsi.index_name) {
            return Err(Error::invalid_mapping(format!(
                "two virtual LSIs (one: '{previous}', two: '{}') mapped to one physical LSI '{physical_name}'",
                virtual_lsi.index_name
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::ByTypeIndexMapper;
    use std::sync::Arc;
    use tessera_core::{FixedContext, TenantId};

    fn context() -> Arc<dyn ContextProvider> {
        Arc::new(FixedContext::with_tenant(TenantId::new("ctx").unwrap()))
    }

    fn build(
        virtual_table: TableDescription,
        physical_table: TableDescription,
    ) -> Result<TableMapping> {
        TableMapping::build(
            virtual_table,
            physical_table,
            &ByTypeIndexMapper::new(),
            context(),
            FieldPrefixCodec::new("."),
        )
    }

    fn simple_virtual() -> TableDescription {
        TableDescription::builder("table1")
            .hash_key("hash_key_field", KeyAttributeType::S)
            .build()
    }

    fn simple_physical() -> TableDescription {
        TableDescription::builder("mt_s")
            .hash_key("hk", KeyAttributeType::S)
            .build()
    }

    #[test]
    fn builds_primary_key_mappings() {
        let mapping = build(simple_virtual(), simple_physical()).unwrap();

        let forward = mapping.virtual_to_physical().get("hash_key_field").unwrap();
        assert_eq!(forward.len(), 1);
        assert_eq!(forward[0].target.name, "hk");
        assert!(forward[0].context_aware);

        let backward = mapping.physical_to_virtual().get("hk").unwrap();
        assert_eq!(backward[0].target.name, "hash_key_field");
    }

    #[test]
    fn non_string_physical_hash_fails() {
        let physical = TableDescription::builder("mt_n")
            .hash_key("hk", KeyAttributeType::N)
            .build();
        assert!(matches!(
            build(simple_virtual(), physical),
            Err(Error::InvalidMapping(_))
        ));
    }

    #[test]
    fn non_string_physical_index_hash_fails() {
        let physical = TableDescription::builder("mt")
            .hash_key("hk", KeyAttributeType::S)
            .global_index("gsi0", PrimaryKey::hash("gsi0_hk", KeyAttributeType::N))
            .build();
        assert!(matches!(
            build(simple_virtual(), physical),
            Err(Error::InvalidMapping(_))
        ));
    }

    #[test]
    fn missing_physical_range_key_fails() {
        let virtual_table = TableDescription::builder("t")
            .hash_range_key("h", KeyAttributeType::S, "r", KeyAttributeType::N)
            .build();
        assert!(matches!(
            build(virtual_table, simple_physical()),
            Err(Error::InvalidMapping(_))
        ));
    }

    #[test]
    fn range_key_type_mismatch_fails() {
        let virtual_table = TableDescription::builder("t")
            .hash_range_key("h", KeyAttributeType::S, "r", KeyAttributeType::N)
            .build();
        let physical = TableDescription::builder("mt")
            .hash_range_key("hk", KeyAttributeType::S, "rk", KeyAttributeType::S)
            .build();
        assert!(matches!(
            build(virtual_table, physical),
            Err(Error::InvalidMapping(_))
        ));
    }

    #[test]
    fn virtual_hash_key_feeds_every_physical_target() {
        // The virtual hash key doubles as a GSI hash key; both physical
        // targets must appear in the forward map.
        let virtual_table = TableDescription::builder("t")
            .hash_key("field", KeyAttributeType::S)
            .global_index("by-field", PrimaryKey::hash("field", KeyAttributeType::S))
            .build();
        let physical = TableDescription::builder("mt")
            .hash_key("hk", KeyAttributeType::S)
            .global_index("gsi0", PrimaryKey::hash("gsi0_hk", KeyAttributeType::S))
            .build();

        let mapping = build(virtual_table, physical).unwrap();
        let forward = mapping.virtual_to_physical().get("field").unwrap();
        let targets: Vec<&str> = forward.iter().map(|m| m.target.name.as_str()).collect();
        assert_eq!(targets, vec!["hk", "gsi0_hk"]);
    }

    #[test]
    fn lsi_hash_mapping_is_table_scoped() {
        let virtual_table = TableDescription::builder("t")
            .hash_range_key("h", KeyAttributeType::S, "r", KeyAttributeType::S)
            .local_index(
                "local",
                PrimaryKey::hash_range("h", KeyAttributeType::S, "other", KeyAttributeType::S),
            )
            .build();
        let physical = TableDescription::builder("mt")
            .hash_range_key("hk", KeyAttributeType::S, "rk", KeyAttributeType::S)
            .local_index(
                "lsi0",
                PrimaryKey::hash_range("hk", KeyAttributeType::S, "lsi0_rk", KeyAttributeType::S),
            )
            .build();

        let mapping = build(virtual_table, physical).unwrap();
        let index_mapping = mapping.index_mapping("local").unwrap();
        assert_eq!(index_mapping.field_mappings[0].scope, IndexScope::Table);
        assert_eq!(
            index_mapping.field_mappings[1].scope,
            IndexScope::SecondaryIndex
        );
    }

    #[test]
    fn duplicate_lsi_targets_fail() {
        let virtual_table = TableDescription::builder("t")
            .hash_range_key("h", KeyAttributeType::S, "r", KeyAttributeType::S)
            .local_index(
                "one",
                PrimaryKey::hash_range("h", KeyAttributeType::S, "a", KeyAttributeType::S),
            )
            .local_index(
                "two",
                PrimaryKey::hash_range("h", KeyAttributeType::S, "b", KeyAttributeType::S),
            )
            .build();
        let physical = TableDescription::builder("mt")
            .hash_range_key("hk", KeyAttributeType::S, "rk", KeyAttributeType::S)
            .local_index(
                "lsi0",
                PrimaryKey::hash_range("hk", KeyAttributeType::S, "lsi0_rk", KeyAttributeType::S),
            )
            .build();

        let err = build(virtual_table, physical).unwrap_err();
        assert!(matches!(err, Error::InvalidMapping(_)));
        assert!(err.to_string().contains("one physical LSI"));
    }

    #[test]
    fn unmappable_index_surfaces_as_invalid_mapping() {
        let virtual_table = TableDescription::builder("t")
            .hash_key("h", KeyAttributeType::S)
            .global_index("by-field", PrimaryKey::hash("field", KeyAttributeType::S))
            .build();
        assert!(matches!(
            build(virtual_table, simple_physical()),
            Err(Error::InvalidMapping(_))
        ));
    }
}
