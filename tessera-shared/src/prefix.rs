//! Field-prefix codec
//!
//! The on-wire form of every tenant-scoped scalar is
//! `tenant ⊕ delim ⊕ virtual-table ⊕ delim ⊕ value`. The codec is a pure
//! function pair: `apply` qualifies a raw value, `reverse` splits a
//! qualified value back apart. `reverse` splits on the delimiter exactly
//! twice from the left, so the original value may itself contain the
//! delimiter; tenant ids and virtual table names may not.

use tessera_core::{Error, Result, TenantId};

/// Default delimiter between the tenant, table, and value segments
pub const DEFAULT_DELIMITER: &str = ".";

/// A scalar in both its raw and tenant-qualified forms
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldValue {
    pub tenant: TenantId,
    pub table_name: String,
    pub qualified: String,
    pub value: String,
}

/// Bijective encoder of `(tenant, virtual table, value)` onto one scalar
#[derive(Debug, Clone)]
pub struct FieldPrefixCodec {
    delimiter: String,
}

impl Default for FieldPrefixCodec {
    fn default() -> Self {
        Self::new(DEFAULT_DELIMITER)
    }
}

impl FieldPrefixCodec {
    pub fn new(delimiter: impl Into<String>) -> Self {
        Self {
            delimiter: delimiter.into(),
        }
    }

    pub fn delimiter(&self) -> &str {
        &self.delimiter
    }

    fn check_segment(&self, segment: &str, what: &str) -> Result<()> {
        if segment.contains(&self.delimiter) {
            return Err(Error::invalid_value(format!(
                "{what} '{segment}' contains the delimiter '{}'",
                self.delimiter
            )));
        }
        Ok(())
    }

    /// Qualify a raw value with the tenant and virtual table name
    pub fn apply(&self, tenant: &TenantId, table_name: &str, value: &str) -> Result<FieldValue> {
        self.check_segment(tenant.as_str(), "tenant id")?;
        self.check_segment(table_name, "virtual table name")?;
        let qualified = format!(
            "{tenant}{delim}{table_name}{delim}{value}",
            delim = self.delimiter
        );
        Ok(FieldValue {
            tenant: tenant.clone(),
            table_name: table_name.to_string(),
            qualified,
            value: value.to_string(),
        })
    }

    /// Split a qualified value back into its parts
    pub fn reverse(&self, qualified: &str) -> Result<FieldValue> {
        let mut parts = qualified.splitn(3, &self.delimiter);
        let (Some(tenant), Some(table_name), Some(value)) =
            (parts.next(), parts.next(), parts.next())
        else {
            return Err(Error::malformed_prefix(qualified.to_string()));
        };
        let tenant = TenantId::new(tenant)
            .map_err(|_| Error::malformed_prefix(qualified.to_string()))?;
        Ok(FieldValue {
            tenant,
            table_name: table_name.to_string(),
            qualified: qualified.to_string(),
            value: value.to_string(),
        })
    }

    /// The `tenant ⊕ delim ⊕ table ⊕ delim` prefix every qualified value of
    /// one virtual table starts with; the operand of scoping predicates
    pub fn scope_prefix(&self, tenant: &TenantId, table_name: &str) -> Result<String> {
        self.check_segment(tenant.as_str(), "tenant id")?;
        self.check_segment(table_name, "virtual table name")?;
        Ok(format!(
            "{tenant}{delim}{table_name}{delim}",
            delim = self.delimiter
        ))
    }
}
