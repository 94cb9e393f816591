//! Query and scan request mapping
//!
//! Rewrites a request onto the physical table: substitutes the table name,
//! resolves the target index, translates equality key conditions, rewrites
//! the `#name` / `:value` placeholder maps, and appends the tenant/table
//! scoping predicate so a shared physical table only ever answers with the
//! current tenant's rows.
//!
//! Only equality conditions on mapped key attributes are translated; any
//! other operator on a mapped key fails. Filter expressions pass through in
//! placeholder-substituted form; aliased equality operands over mapped
//! fields are re-encoded, everything else is left untouched.

use crate::error::{Error, Result};
use crate::field::{FieldMapping, IndexScope};
use crate::table_mapping::TableMapping;
use std::collections::{BTreeMap, HashMap};
use tessera_core::{
    AttributeValue, ComparisonOperator, Condition, QueryRequest, ScanRequest,
};

/// Placeholder stem of the appended scoping predicate
const SCOPE_NAME_ALIAS: &str = "#scope_hk";
const SCOPE_VALUE_ALIAS: &str = ":scope_prefix";

/// Rewrites query and scan requests for one table mapping
#[derive(Debug, Clone, Copy)]
pub struct QueryMapper<'a> {
    mapping: &'a TableMapping,
}

impl<'a> QueryMapper<'a> {
    pub(crate) fn new(mapping: &'a TableMapping) -> Self {
        Self { mapping }
    }

    /// Rewrite a query request in place
    pub fn apply_query(&self, request: &mut QueryRequest) -> Result<()> {
        request.table_name = self.mapping.physical_table().table_name.clone();

        // Resolve the target index and the key mappings that apply to it.
        let (relevant, physical_index_name, physical_hash_key) = match request.index_name.take() {
            Some(virtual_index_name) => {
                let index_mapping = self.mapping.index_mapping(&virtual_index_name)?;
                request.index_name = Some(index_mapping.physical_index.index_name.clone());
                (
                    index_mapping.field_mappings.as_slice(),
                    Some(index_mapping.physical_index.index_name.clone()),
                    index_mapping.physical_index.key.hash_key.clone(),
                )
            }
            None => (
                self.mapping.table_field_mappings(),
                None,
                self.mapping.physical_table().key.hash_key.clone(),
            ),
        };

        // Translate key conditions: equality only on mapped keys.
        let mut hash_pinned = false;
        let mut rewritten = BTreeMap::new();
        for (attribute, condition) in std::mem::take(&mut request.key_conditions) {
            match relevant.iter().find(|m| m.source.name == attribute) {
                Some(mapping) => {
                    if condition.operator != ComparisonOperator::Eq
                        || condition.values.len() != 1
                    {
                        return Err(Error::unsupported_predicate(format!(
                            "only equality conditions are supported on key attribute '{attribute}'"
                        )));
                    }
                    let value = self
                        .mapping
                        .field_mapper()
                        .apply(mapping, &condition.values[0])?;
                    if mapping.target.name == physical_hash_key {
                        hash_pinned = true;
                    }
                    rewritten.insert(mapping.target.name.clone(), Condition::eq(value));
                }
                None => {
                    rewritten.insert(attribute, condition);
                }
            }
        }
        request.key_conditions = rewritten;

        let filter = request.filter_expression.clone();
        self.rewrite_placeholders(
            filter.as_deref(),
            physical_index_name.as_deref(),
            &mut request.expression_attribute_names,
            &mut request.expression_attribute_values,
        )?;

        // An equality pin on the physical hash key already scopes the
        // result set; otherwise the begins_with predicate does.
        if !hash_pinned {
            self.append_scope_predicate(
                &physical_hash_key,
                &mut request.filter_expression,
                &mut request.expression_attribute_names,
                &mut request.expression_attribute_values,
            )?;
        }
        Ok(())
    }

    /// Rewrite a scan request in place
    pub fn apply_scan(&self, request: &mut ScanRequest) -> Result<()> {
        request.table_name = self.mapping.physical_table().table_name.clone();

        let (physical_index_name, physical_hash_key) = match request.index_name.take() {
            Some(virtual_index_name) => {
                let index_mapping = self.mapping.index_mapping(&virtual_index_name)?;
                request.index_name = Some(index_mapping.physical_index.index_name.clone());
                (
                    Some(index_mapping.physical_index.index_name.clone()),
                    index_mapping.physical_index.key.hash_key.clone(),
                )
            }
            None => (None, self.mapping.physical_table().key.hash_key.clone()),
        };

        let filter = request.filter_expression.clone();
        self.rewrite_placeholders(
            filter.as_deref(),
            physical_index_name.as_deref(),
            &mut request.expression_attribute_names,
            &mut request.expression_attribute_values,
        )?;

        self.append_scope_predicate(
            &physical_hash_key,
            &mut request.filter_expression,
            &mut request.expression_attribute_names,
            &mut request.expression_attribute_values,
        )
    }

    /// Pick the mapping that best fits the resolved target: the one bound
    /// to the target physical index, else the table-scoped one, else the
    /// first declared.
    fn pick_mapping<'m>(
        mappings: &'m [FieldMapping],
        physical_index_name: Option<&str>,
    ) -> Option<&'m FieldMapping> {
        if let Some(index_name) = physical_index_name {
            if let Some(m) = mappings
                .iter()
                .find(|m| m.physical_index_name == index_name)
            {
                return Some(m);
            }
        }
        mappings
            .iter()
            .find(|m| m.scope == IndexScope::Table)
            .or_else(|| mappings.first())
    }

    /// Rewrite the placeholder maps of a filter expression
    ///
    /// Name placeholders over mapped virtual fields are renamed to the
    /// physical attribute. Value placeholders are re-encoded only where the
    /// filter uses them in an equality clause against a rewritten alias;
    /// non-equality clauses keep their operands untouched.
    fn rewrite_placeholders(
        &self,
        filter_expression: Option<&str>,
        physical_index_name: Option<&str>,
        names: &mut HashMap<String, String>,
        values: &mut HashMap<String, AttributeValue>,
    ) -> Result<()> {
        let mut rewritten_aliases: HashMap<String, FieldMapping> = HashMap::new();
        for (alias, field_name) in names.iter_mut() {
            if let Some(mappings) = self.mapping.virtual_to_physical().get(field_name.as_str()) {
                if let Some(mapping) = Self::pick_mapping(mappings, physical_index_name) {
                    *field_name = mapping.target.name.clone();
                    rewritten_aliases.insert(alias.clone(), mapping.clone());
                }
            }
        }
        let Some(expression) = filter_expression else {
            return Ok(());
        };
        for clause in expression.split(" AND ") {
            let Some((lhs, rhs)) = clause.split_once('=') else {
                continue;
            };
            let (lhs, rhs) = (lhs.trim(), rhs.trim());
            let Some(mapping) = rewritten_aliases.get(lhs) else {
                continue;
            };
            if !rhs.starts_with(':') {
                continue;
            }
            if let Some(operand) = values.get(rhs) {
                let encoded = self.mapping.field_mapper().apply(mapping, operand)?;
                values.insert(rhs.to_string(), encoded);
            }
        }
        Ok(())
    }

    /// Append `begins_with(physical hash, tenant ⊕ delim ⊕ table ⊕ delim)`
    fn append_scope_predicate(
        &self,
        physical_hash_key: &str,
        filter_expression: &mut Option<String>,
        names: &mut HashMap<String, String>,
        values: &mut HashMap<String, AttributeValue>,
    ) -> Result<()> {
        let prefix = self.mapping.field_mapper().scope_prefix()?;

        let name_alias = fresh_alias(SCOPE_NAME_ALIAS, |a| !names.contains_key(a));
        names.insert(name_alias.clone(), physical_hash_key.to_string());
        let value_alias = fresh_alias(SCOPE_VALUE_ALIAS, |a| !values.contains_key(a));
        values.insert(value_alias.clone(), AttributeValue::S(prefix));

        let clause = format!("begins_with({name_alias}, {value_alias})");
        *filter_expression = Some(match filter_expression.take() {
            Some(existing) => format!("{existing} AND {clause}"),
            None => clause,
        });
        Ok(())
    }
}

/// First free alias from `stem`, `stem2`, `stem3`, …
fn fresh_alias(stem: &str, free: impl Fn(&str) -> bool) -> String {
    if free(stem) {
        return stem.to_string();
    }
    (2..)
        .map(|n| format!("{stem}{n}"))
        .find(|candidate| free(candidate))
        .expect("alias space exhausted")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::ByTypeIndexMapper;
    use crate::prefix::FieldPrefixCodec;
    use std::sync::Arc;
    use tessera_core::{
        FixedContext, KeyAttributeType, PrimaryKey, TableDescription, TenantId,
    };

    fn mapping_with_index() -> TableMapping {
        let virtual_table = TableDescription::builder("table1")
            .hash_key("vhk", KeyAttributeType::S)
            .global_index("by-field", PrimaryKey::hash("vfield", KeyAttributeType::S))
            .build();
        let physical_table = TableDescription::builder("mt")
            .hash_key("hk", KeyAttributeType::S)
            .global_index("gsi0", PrimaryKey::hash("gsi0_hk", KeyAttributeType::S))
            .build();
        TableMapping::build(
            virtual_table,
            physical_table,
            &ByTypeIndexMapper::new(),
            Arc::new(FixedContext::with_tenant(TenantId::new("ctx").unwrap())),
            FieldPrefixCodec::new("."),
        )
        .unwrap()
    }

    #[test]
    fn query_rewrites_table_name_and_hash_equality() {
        let mapping = mapping_with_index();
        let mut request = QueryRequest::new("table1").key_condition("vhk", Condition::eq("1"));
        mapping.query_mapper().apply_query(&mut request).unwrap();

        assert_eq!(request.table_name, "mt");
        let condition = request.key_conditions.get("hk").expect("rewritten key");
        assert_eq!(
            condition.values[0],
            AttributeValue::S("ctx.table1.1".to_string())
        );
        // Equality-pinned hash key: no scoping predicate appended.
        assert!(request.filter_expression.is_none());
    }

    #[test]
    fn query_on_index_resolves_physical_index() {
        let mapping = mapping_with_index();
        let mut request = QueryRequest::new("table1")
            .index("by-field")
            .key_condition("vfield", Condition::eq("x"));
        mapping.query_mapper().apply_query(&mut request).unwrap();

        assert_eq!(request.index_name.as_deref(), Some("gsi0"));
        let condition = request.key_conditions.get("gsi0_hk").unwrap();
        assert_eq!(
            condition.values[0],
            AttributeValue::S("ctx.table1.x".to_string())
        );
    }

    #[test]
    fn non_equality_on_mapped_key_is_rejected() {
        let mapping = mapping_with_index();
        let mut request = QueryRequest::new("table1").key_condition(
            "vhk",
            Condition {
                operator: ComparisonOperator::BeginsWith,
                values: vec![AttributeValue::S("1".into())],
            },
        );
        assert!(matches!(
            mapping.query_mapper().apply_query(&mut request),
            Err(Error::UnsupportedPredicate(_))
        ));
    }

    #[test]
    fn unpinned_query_gets_scope_predicate() {
        let mapping = mapping_with_index();
        let mut request = QueryRequest::new("table1");
        mapping.query_mapper().apply_query(&mut request).unwrap();

        let filter = request.filter_expression.expect("scoping predicate");
        assert_eq!(filter, "begins_with(#scope_hk, :scope_prefix)");
        assert_eq!(
            request.expression_attribute_names.get("#scope_hk").unwrap(),
            "hk"
        );
        assert_eq!(
            request
                .expression_attribute_values
                .get(":scope_prefix")
                .unwrap(),
            &AttributeValue::S("ctx.table1.".to_string())
        );
    }

    #[test]
    fn scan_appends_scope_and_preserves_existing_filter() {
        let mapping = mapping_with_index();
        let mut request = ScanRequest::new("table1");
        request.filter_expression = Some("#f = :v".to_string());
        request
            .expression_attribute_names
            .insert("#f".to_string(), "somefield".to_string());
        request
            .expression_attribute_values
            .insert(":v".to_string(), AttributeValue::S("1".to_string()));

        mapping.query_mapper().apply_scan(&mut request).unwrap();

        assert_eq!(request.table_name, "mt");
        let filter = request.filter_expression.unwrap();
        assert_eq!(
            filter,
            "#f = :v AND begins_with(#scope_hk, :scope_prefix)"
        );
        // Unmapped placeholder entries pass through untouched.
        assert_eq!(
            request.expression_attribute_names.get("#f").unwrap(),
            "somefield"
        );
        assert_eq!(
            request.expression_attribute_values.get(":v").unwrap(),
            &AttributeValue::S("1".to_string())
        );
    }

    #[test]
    fn filter_over_mapped_field_is_re_encoded() {
        let mapping = mapping_with_index();
        let mut request = ScanRequest::new("table1");
        request.filter_expression = Some("#k = :k".to_string());
        request
            .expression_attribute_names
            .insert("#k".to_string(), "vhk".to_string());
        request
            .expression_attribute_values
            .insert(":k".to_string(), AttributeValue::S("1".to_string()));

        mapping.query_mapper().apply_scan(&mut request).unwrap();

        assert_eq!(request.expression_attribute_names.get("#k").unwrap(), "hk");
        assert_eq!(
            request.expression_attribute_values.get(":k").unwrap(),
            &AttributeValue::S("ctx.table1.1".to_string())
        );
    }

    #[test]
    fn scope_alias_avoids_collisions() {
        let mapping = mapping_with_index();
        let mut request = ScanRequest::new("table1");
        request
            .expression_attribute_names
            .insert("#scope_hk".to_string(), "unrelated".to_string());

        mapping.query_mapper().apply_scan(&mut request).unwrap();

        let filter = request.filter_expression.unwrap();
        assert!(filter.contains("begins_with(#scope_hk2, :scope_prefix)"));
        assert_eq!(
            request.expression_attribute_names.get("#scope_hk2").unwrap(),
            "hk"
        );
    }
}
