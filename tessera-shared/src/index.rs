//! Secondary-index mapping
//!
//! For each virtual secondary index the mapper chooses exactly one physical
//! index of compatible shape. The default implementation matches by kind
//! (GSI with GSI, LSI with LSI), then takes the first physical index in
//! declaration order whose key schema is compatible. Distinct virtual LSIs
//! landing on the same physical LSI is rejected later, when the table
//! mapping validates.

use crate::error::{Error, Result};
use std::fmt::Debug;
use tessera_core::{KeyAttributeType, PrimaryKey, SecondaryIndex, TableDescription};

/// Chooses a physical secondary index for each virtual one
pub trait SecondaryIndexMapper: Debug + Send + Sync {
    /// The physical index a virtual index maps to; fails with
    /// [`Error::UnmappableIndex`] when no physical index of the matching
    /// kind has a compatible key schema.
    fn lookup_physical_index(
        &self,
        virtual_index: &SecondaryIndex,
        physical_table: &TableDescription,
    ) -> Result<SecondaryIndex>;
}

/// Whether a virtual key can be served by a physical key
///
/// The physical hash key must be a string (it stores the tenant-qualified
/// form). A virtual range key requires a physical range key of the exact
/// same type; a virtual index without a range key matches regardless of
/// whether the physical index carries one.
pub(crate) fn key_compatible(virtual_key: &PrimaryKey, physical_key: &PrimaryKey) -> bool {
    if physical_key.hash_key_type != KeyAttributeType::S {
        return false;
    }
    match (&virtual_key.range_key, &physical_key.range_key) {
        (None, _) => true,
        (Some(_), None) => false,
        (Some(_), Some(_)) => virtual_key.range_key_type == physical_key.range_key_type,
    }
}

/// Default mapper: match by index kind, first compatible wins
#[derive(Debug, Clone, Copy, Default)]
pub struct ByTypeIndexMapper;

impl ByTypeIndexMapper {
    pub fn new() -> Self {
        Self
    }
}

impl SecondaryIndexMapper for ByTypeIndexMapper {
    fn lookup_physical_index(
        &self,
        virtual_index: &SecondaryIndex,
        physical_table: &TableDescription,
    ) -> Result<SecondaryIndex> {
        physical_table
            .secondary_indexes
            .iter()
            .filter(|candidate| candidate.kind == virtual_index.kind)
            .find(|candidate| key_compatible(&virtual_index.key, &candidate.key))
            .cloned()
            .ok_or_else(|| {
                Error::unmappable_index(format!(
                    "no physical {} with a key compatible with virtual index '{}' ({}) on physical table '{}'",
                    virtual_index.kind,
                    virtual_index.index_name,
                    virtual_index.key,
                    physical_table.table_name
                ))
            })
    }
}
