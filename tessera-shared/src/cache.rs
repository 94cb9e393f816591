//! Table-mapping cache
//!
//! A bounded cache of mapping artifacts keyed by `(tenant, virtual table
//! name)`, so a tenant switch can never observe another tenant's mapping.
//!
//! Concurrency properties come from moka's `try_get_with`: concurrent
//! misses for the same key share a single build, failed builds are not
//! cached (the next caller retries), and a build cancelled mid-flight does
//! not poison the key — waiters observe the abandonment and retry.

use crate::error::{Error, Result};
use crate::table_mapping::TableMapping;
use std::future::Future;
use std::sync::Arc;
use tessera_core::TenantId;

/// Cache key: the tenant plus the virtual table name
pub type MappingKey = (TenantId, String);

/// Bounded per-tenant cache of [`TableMapping`]s
#[derive(Clone)]
pub struct TableMappingCache {
    cache: moka::future::Cache<MappingKey, Arc<TableMapping>>,
}

impl std::fmt::Debug for TableMappingCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TableMappingCache")
            .field("entry_count", &self.cache.entry_count())
            .finish()
    }
}

impl TableMappingCache {
    /// Create a cache bounded to `max_entries` mappings
    pub fn new(max_entries: u64) -> Self {
        Self {
            cache: moka::future::Cache::builder()
                .max_capacity(max_entries)
                .build(),
        }
    }

    /// Get the mapping for a key, building it at most once concurrently
    pub async fn get_or_build<F, Fut>(&self, key: MappingKey, build: F) -> Result<Arc<TableMapping>>
    where
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = Result<TableMapping>> + Send,
    {
        self.cache
            .try_get_with(key, async move { build().await.map(Arc::new) })
            .await
            .map_err(|shared: Arc<Error>| {
                // The builder usually holds the only reference and gets its
                // error back intact; waiters see the shared message.
                Arc::try_unwrap(shared).unwrap_or_else(|e| Error::cache(e.to_string()))
            })
    }

    /// Drop a tenant's mapping (on virtual table deletion)
    pub async fn invalidate(&self, tenant: &TenantId, table_name: &str) {
        self.cache
            .invalidate(&(tenant.clone(), table_name.to_string()))
            .await;
    }

    /// Snapshot of every cached mapping
    pub fn mappings(&self) -> Vec<Arc<TableMapping>> {
        self.cache.iter().map(|(_, mapping)| mapping).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::ByTypeIndexMapper;
    use crate::prefix::FieldPrefixCodec;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tessera_core::{FixedContext, KeyAttributeType, TableDescription};

    fn build_mapping() -> Result<TableMapping> {
        let virtual_table = TableDescription::builder("t")
            .hash_key("h", KeyAttributeType::S)
            .build();
        let physical_table = TableDescription::builder("mt")
            .hash_key("hk", KeyAttributeType::S)
            .build();
        TableMapping::build(
            virtual_table,
            physical_table,
            &ByTypeIndexMapper::new(),
            Arc::new(FixedContext::with_tenant(
                TenantId::new("ctx").unwrap(),
            )),
            FieldPrefixCodec::new("."),
        )
    }

    fn key(tenant: &str, table: &str) -> MappingKey {
        (TenantId::new(tenant).unwrap(), table.to_string())
    }

    #[tokio::test]
    async fn builds_once_per_key() {
        let cache = TableMappingCache::new(16);
        let builds = AtomicUsize::new(0);

        for _ in 0..3 {
            cache
                .get_or_build(key("ctx", "t"), || {
                    builds.fetch_add(1, Ordering::SeqCst);
                    async { build_mapping() }
                })
                .await
                .unwrap();
        }
        assert_eq!(builds.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn keys_are_tenant_scoped() {
        let cache = TableMappingCache::new(16);
        let builds = AtomicUsize::new(0);

        for tenant in ["a", "b"] {
            cache
                .get_or_build(key(tenant, "t"), || {
                    builds.fetch_add(1, Ordering::SeqCst);
                    async { build_mapping() }
                })
                .await
                .unwrap();
        }
        assert_eq!(builds.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn failed_builds_are_not_cached() {
        let cache = TableMappingCache::new(16);

        let err = cache
            .get_or_build(key("ctx", "t"), || async {
                Err(Error::unsupported_table("t"))
            })
            .await
            .unwrap_err();
        assert!(err.to_string().contains("not supported"));

        // The next caller retries the build.
        cache
            .get_or_build(key("ctx", "t"), || async { build_mapping() })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn invalidate_forces_rebuild() {
        let cache = TableMappingCache::new(16);
        let builds = AtomicUsize::new(0);

        let do_build = || {
            builds.fetch_add(1, Ordering::SeqCst);
            async { build_mapping() }
        };
        cache.get_or_build(key("ctx", "t"), do_build).await.unwrap();
        cache.invalidate(&TenantId::new("ctx").unwrap(), "t").await;
        cache.get_or_build(key("ctx", "t"), do_build).await.unwrap();

        assert_eq!(builds.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn concurrent_misses_share_one_build() {
        let cache = Arc::new(TableMappingCache::new(16));
        let builds = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let cache = cache.clone();
            let builds = builds.clone();
            handles.push(tokio::spawn(async move {
                cache
                    .get_or_build(key("ctx", "t"), move || {
                        builds.fetch_add(1, Ordering::SeqCst);
                        async {
                            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
                            build_mapping()
                        }
                    })
                    .await
                    .unwrap()
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(builds.load(Ordering::SeqCst), 1);
    }
}
