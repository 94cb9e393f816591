//! Item mapping
//!
//! Rewrites whole attribute maps between virtual and physical form. Mapped
//! attributes are renamed and (when context-aware) value-qualified; unknown
//! attributes pass through unchanged. When one virtual attribute feeds
//! several physical targets (a virtual hash key that is also an index hash
//! key), `apply` emits every target, each independently encoded.

use crate::error::Result;
use crate::table_mapping::TableMapping;
use tessera_core::Item;

/// Rewrites items for one table mapping
#[derive(Debug, Clone, Copy)]
pub struct ItemMapper<'a> {
    mapping: &'a TableMapping,
}

impl<'a> ItemMapper<'a> {
    pub(crate) fn new(mapping: &'a TableMapping) -> Self {
        Self { mapping }
    }

    /// Virtual item to physical item
    pub fn apply(&self, item: &Item) -> Result<Item> {
        let field_mapper = self.mapping.field_mapper();
        let mut out = Item::with_capacity(item.len());
        for (name, value) in item {
            match self.mapping.virtual_to_physical().get(name) {
                Some(mappings) => {
                    for mapping in mappings {
                        out.insert(
                            mapping.target.name.clone(),
                            field_mapper.apply(mapping, value)?,
                        );
                    }
                }
                None => {
                    out.insert(name.clone(), value.clone());
                }
            }
        }
        Ok(out)
    }

    /// Physical item back to virtual item
    pub fn reverse(&self, item: &Item) -> Result<Item> {
        let field_mapper = self.mapping.field_mapper();
        let mut out = Item::with_capacity(item.len());
        for (name, value) in item {
            match self.mapping.physical_to_virtual().get(name) {
                Some(mappings) => {
                    for mapping in mappings {
                        out.insert(
                            mapping.target.name.clone(),
                            field_mapper.reverse(mapping, value)?,
                        );
                    }
                }
                None => {
                    out.insert(name.clone(), value.clone());
                }
            }
        }
        Ok(out)
    }

    /// Optional-item convenience: `None` reverses to `None`
    pub fn reverse_opt(&self, item: Option<&Item>) -> Result<Option<Item>> {
        item.map(|i| self.reverse(i)).transpose()
    }
}
