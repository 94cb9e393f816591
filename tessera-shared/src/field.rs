//! Field mappings and the field mapper
//!
//! A [`FieldMapping`] is the rewrite rule for one attribute between its
//! virtual and physical form. Context-aware mappings (all hash keys) fold
//! the ambient tenant and the virtual table name into the stored value via
//! the prefix codec; every other mapping is a plain rename.
//!
//! The [`FieldMapper`] is deliberately constructed from capabilities (a
//! context provider, the virtual table name, a codec) rather than a
//! reference back to the owning table mapping.

use crate::prefix::FieldPrefixCodec;
use std::sync::Arc;
use tessera_core::{AttributeValue, ContextProvider, Error, KeyAttributeType, Result};

/// Whether a mapping belongs to the table itself or to a secondary index
///
/// An LSI's hash-key mapping carries [`IndexScope::Table`]: the LSI shares
/// the table's partition key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexScope {
    Table,
    SecondaryIndex,
}

/// One side of a field mapping: attribute name plus declared key type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDef {
    pub name: String,
    pub attr_type: KeyAttributeType,
}

impl FieldDef {
    pub fn new(name: impl Into<String>, attr_type: KeyAttributeType) -> Self {
        Self {
            name: name.into(),
            attr_type,
        }
    }
}

/// The rewrite rule for one attribute
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldMapping {
    pub source: FieldDef,
    pub target: FieldDef,
    pub virtual_index_name: String,
    pub physical_index_name: String,
    pub scope: IndexScope,
    pub context_aware: bool,
}

impl FieldMapping {
    /// The reverse rule: source and target trade places
    pub fn invert(&self) -> FieldMapping {
        FieldMapping {
            source: self.target.clone(),
            target: self.source.clone(),
            virtual_index_name: self.virtual_index_name.clone(),
            physical_index_name: self.physical_index_name.clone(),
            scope: self.scope,
            context_aware: self.context_aware,
        }
    }
}

/// Stringify a scalar for embedding in a qualified value
fn encode_scalar(value: &AttributeValue) -> Result<String> {
    match value {
        AttributeValue::S(s) => Ok(s.clone()),
        AttributeValue::N(n) => Ok(n.clone()),
        AttributeValue::B(b) => Ok(b.iter().map(|byte| format!("{byte:02x}")).collect()),
        other => Err(Error::invalid_value(format!(
            "context-aware fields must be scalar S, N, or B, got {other:?}"
        ))),
    }
}

/// Re-coerce a decoded string back to the declared key type
fn decode_scalar(attr_type: KeyAttributeType, value: &str) -> Result<AttributeValue> {
    match attr_type {
        KeyAttributeType::S => Ok(AttributeValue::S(value.to_string())),
        KeyAttributeType::N => Ok(AttributeValue::N(value.to_string())),
        KeyAttributeType::B => {
            if value.len() % 2 != 0 {
                return Err(Error::malformed_prefix(value.to_string()));
            }
            let bytes = (0..value.len())
                .step_by(2)
                .map(|i| u8::from_str_radix(&value[i..i + 2], 16))
                .collect::<std::result::Result<Vec<u8>, _>>()
                .map_err(|_| Error::malformed_prefix(value.to_string()))?;
            Ok(AttributeValue::B(bytes))
        }
    }
}

/// Applies field mappings to attribute values
#[derive(Debug, Clone)]
pub struct FieldMapper {
    context: Arc<dyn ContextProvider>,
    virtual_table_name: String,
    codec: FieldPrefixCodec,
}

impl FieldMapper {
    pub fn new(
        context: Arc<dyn ContextProvider>,
        virtual_table_name: impl Into<String>,
        codec: FieldPrefixCodec,
    ) -> Self {
        Self {
            context,
            virtual_table_name: virtual_table_name.into(),
            codec,
        }
    }

    /// Map a virtual attribute value to its physical form
    ///
    /// Context-aware mappings always produce a string attribute holding the
    /// qualified value; identity mappings return the value unchanged.
    pub fn apply(&self, mapping: &FieldMapping, value: &AttributeValue) -> Result<AttributeValue> {
        if !mapping.context_aware {
            return Ok(value.clone());
        }
        let raw = encode_scalar(value)?;
        let tenant = self.context.get()?;
        let qualified = self
            .codec
            .apply(&tenant, &self.virtual_table_name, &raw)?
            .qualified;
        Ok(AttributeValue::S(qualified))
    }

    /// Map a physical attribute value back to its virtual form
    ///
    /// The decoded string is re-coerced to the virtual schema's declared key
    /// type (`mapping.target` on a reverse mapping).
    pub fn reverse(&self, mapping: &FieldMapping, value: &AttributeValue) -> Result<AttributeValue> {
        if !mapping.context_aware {
            return Ok(value.clone());
        }
        let qualified = value.as_s().ok_or_else(|| {
            Error::malformed_prefix(format!(
                "physical attribute '{}' is not a string",
                mapping.source.name
            ))
        })?;
        let decoded = self.codec.reverse(qualified)?;
        decode_scalar(mapping.target.attr_type, &decoded.value)
    }

    /// The current tenant's scope prefix for this virtual table
    pub fn scope_prefix(&self) -> Result<String> {
        let tenant = self.context.get()?;
        self.codec.scope_prefix(&tenant, &self.virtual_table_name)
    }
}
