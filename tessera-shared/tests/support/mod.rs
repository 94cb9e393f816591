//! Shared test harness for tessera-shared integration tests.

// Kept as a shared utility module across the integration tests. Individual
// test crates intentionally do not use every helper.
#![allow(dead_code)]

use std::sync::Arc;
use tessera_core::{AttributeValue, Item, KeyAttributeType, MemoryBackend, TableDescription, TenantId};
use tessera_shared::{SharedTableBuilder, SharedTableClient};

/// Build a memory-backed client with truncation on delete enabled.
pub async fn shared_client(backend: Arc<MemoryBackend>) -> SharedTableClient {
    SharedTableBuilder::new()
        .name("it-shared")
        .backend(backend)
        .truncate_on_delete_table(true)
        .build()
        .await
        .expect("build shared client")
}

/// Hash-only (`hash_key_field:S`) virtual table description.
pub fn simple_table(name: &str) -> TableDescription {
    TableDescription::builder(name)
        .hash_key("hash_key_field", KeyAttributeType::S)
        .build()
}

pub fn tenant(id: &str) -> TenantId {
    TenantId::new(id).expect("valid tenant id")
}

pub fn s(value: &str) -> AttributeValue {
    AttributeValue::S(value.to_string())
}

/// Item of string attributes.
pub fn item(pairs: &[(&str, &str)]) -> Item {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), s(v)))
        .collect()
}

/// Extract the `S` values of one attribute across items, sorted.
pub fn attr_values(items: &[Item], name: &str) -> Vec<String> {
    let mut values: Vec<String> = items
        .iter()
        .filter_map(|i| i.get(name).and_then(AttributeValue::as_s))
        .map(String::from)
        .collect();
    values.sort();
    values
}
