//! End-to-end router tests against the in-memory backend.
//!
//! Each test drives the full path: virtual request → mapping → physical
//! backend → reverse mapping, under task-local tenant context.

mod support;

use std::sync::Arc;
use std::time::Duration;
use support::{attr_values, item, s, shared_client, simple_table, tenant};
use tessera_core::{
    BackendClient, Condition, DeleteItemRequest, GetItemRequest, KeyAttributeType, MemoryBackend,
    PrimaryKey, PutItemRequest, QueryRequest, ScanRequest, TableDescription, TableStatus,
    TaskLocalContext,
};
use tessera_metadata::MetadataError;
use tessera_shared::{Error, SharedTableBuilder};

#[tokio::test]
async fn cross_tenant_isolation() {
    let backend = Arc::new(MemoryBackend::new());
    let client = shared_client(backend.clone()).await;

    // Two tenants create the same virtual table and write the same key.
    for ctx in ["ctx1", "ctx2"] {
        let client = client.clone();
        TaskLocalContext::scope_as(tenant(ctx), async move {
            client.create_table(simple_table("table1")).await.unwrap();
            client
                .put_item(PutItemRequest::new(
                    "table1",
                    item(&[("hash_key_field", "1"), ("some_field", "value-1")]),
                ))
                .await
                .unwrap();
        })
        .await;
    }

    // Each tenant's scan returns exactly its own row, in virtual form.
    for ctx in ["ctx1", "ctx2"] {
        let client = client.clone();
        TaskLocalContext::scope_as(tenant(ctx), async move {
            let out = client.scan(ScanRequest::new("table1")).await.unwrap();
            assert_eq!(out.items.len(), 1, "tenant {ctx} sees exactly one row");
            assert_eq!(
                out.items[0],
                item(&[("hash_key_field", "1"), ("some_field", "value-1")])
            );
        })
        .await;
    }

    // The physical rows carry tenant-qualified hash keys side by side.
    let physical = backend.scan(ScanRequest::new("tsr_shared_s")).await.unwrap();
    assert_eq!(
        attr_values(&physical.items, "hk"),
        vec!["ctx1.table1.1".to_string(), "ctx2.table1.1".to_string()]
    );
}

#[tokio::test]
async fn same_tenant_two_tables_do_not_mix() {
    let backend = Arc::new(MemoryBackend::new());
    let client = shared_client(backend).await;

    TaskLocalContext::scope_as(tenant("ctx1"), async move {
        for table in ["table1", "table2"] {
            client.create_table(simple_table(table)).await.unwrap();
        }
        client
            .put_item(PutItemRequest::new(
                "table1",
                item(&[("hash_key_field", "1"), ("which", "one")]),
            ))
            .await
            .unwrap();
        client
            .put_item(PutItemRequest::new(
                "table2",
                item(&[("hash_key_field", "1"), ("which", "two")]),
            ))
            .await
            .unwrap();

        let one = client.scan(ScanRequest::new("table1")).await.unwrap();
        assert_eq!(one.items.len(), 1);
        assert_eq!(one.items[0].get("which").unwrap(), &s("one"));

        let two = client.scan(ScanRequest::new("table2")).await.unwrap();
        assert_eq!(two.items.len(), 1);
        assert_eq!(two.items[0].get("which").unwrap(), &s("two"));
    })
    .await;
}

#[tokio::test]
async fn get_item_reverses_to_virtual_form() {
    let backend = Arc::new(MemoryBackend::new());
    let client = shared_client(backend).await;

    TaskLocalContext::scope_as(tenant("ctx1"), async move {
        client.create_table(simple_table("table1")).await.unwrap();
        client
            .put_item(PutItemRequest::new(
                "table1",
                item(&[("hash_key_field", "1"), ("some_field", "value-1")]),
            ))
            .await
            .unwrap();

        let out = client
            .get_item(GetItemRequest::new(
                "table1",
                item(&[("hash_key_field", "1")]),
            ))
            .await
            .unwrap();
        assert_eq!(
            out.item.unwrap(),
            item(&[("hash_key_field", "1"), ("some_field", "value-1")])
        );
    })
    .await;
}

#[tokio::test]
async fn query_by_hash_key_equality() {
    let backend = Arc::new(MemoryBackend::new());
    let client = shared_client(backend).await;

    TaskLocalContext::scope_as(tenant("ctx1"), async move {
        client.create_table(simple_table("table1")).await.unwrap();
        for key in ["1", "2"] {
            client
                .put_item(PutItemRequest::new(
                    "table1",
                    item(&[("hash_key_field", key)]),
                ))
                .await
                .unwrap();
        }

        let out = client
            .query(QueryRequest::new("table1").key_condition(
                "hash_key_field",
                Condition::eq("1"),
            ))
            .await
            .unwrap();
        assert_eq!(out.items.len(), 1);
        assert_eq!(out.items[0].get("hash_key_field").unwrap(), &s("1"));
    })
    .await;
}

#[tokio::test]
async fn query_on_secondary_index() {
    let backend = Arc::new(MemoryBackend::new());
    let client = shared_client(backend).await;

    TaskLocalContext::scope_as(tenant("ctx1"), async move {
        let table = TableDescription::builder("orders")
            .hash_key("order_id", KeyAttributeType::S)
            .global_index("by-status", PrimaryKey::hash("status", KeyAttributeType::S))
            .build();
        client.create_table(table).await.unwrap();

        for (id, status) in [("o1", "open"), ("o2", "open"), ("o3", "closed")] {
            client
                .put_item(PutItemRequest::new(
                    "orders",
                    item(&[("order_id", id), ("status", status)]),
                ))
                .await
                .unwrap();
        }

        let out = client
            .query(
                QueryRequest::new("orders")
                    .index("by-status")
                    .key_condition("status", Condition::eq("open")),
            )
            .await
            .unwrap();
        assert_eq!(attr_values(&out.items, "order_id"), vec!["o1", "o2"]);
        // The indexed attribute decodes back to its raw virtual value.
        assert_eq!(out.items[0].get("status").unwrap(), &s("open"));
    })
    .await;
}

#[tokio::test]
async fn delete_table_truncates_tenant_rows_only() {
    let backend = Arc::new(MemoryBackend::new());
    let client = shared_client(backend.clone()).await;

    // A bystander tenant shares the physical table.
    {
        let client = client.clone();
        TaskLocalContext::scope_as(tenant("ctx2"), async move {
            client.create_table(simple_table("table1")).await.unwrap();
            client
                .put_item(PutItemRequest::new(
                    "table1",
                    item(&[("hash_key_field", "keep")]),
                ))
                .await
                .unwrap();
        })
        .await;
    }

    {
        let client = client.clone();
        TaskLocalContext::scope_as(tenant("ctx1"), async move {
            client.create_table(simple_table("table1")).await.unwrap();
            for key in ["1", "2"] {
                client
                    .put_item(PutItemRequest::new(
                        "table1",
                        item(&[("hash_key_field", key)]),
                    ))
                    .await
                    .unwrap();
            }
            client.delete_table("table1").await.unwrap();

            // Recreate and scan: the tenant's slice is empty again.
            client.create_table(simple_table("table1")).await.unwrap();
            let out = client.scan(ScanRequest::new("table1")).await.unwrap();
            assert!(out.items.is_empty(), "recreated table must be empty");
        })
        .await;
    }

    // The bystander's row survived the truncation.
    let client2 = client.clone();
    TaskLocalContext::scope_as(tenant("ctx2"), async move {
        let out = client2.scan(ScanRequest::new("table1")).await.unwrap();
        assert_eq!(out.items.len(), 1);
    })
    .await;
}

#[tokio::test]
async fn async_delete_returns_immediately_and_completes() {
    let backend = Arc::new(MemoryBackend::new());
    let client = SharedTableBuilder::new()
        .backend(backend)
        .truncate_on_delete_table(true)
        .delete_table_async(true)
        .build()
        .await
        .unwrap();

    TaskLocalContext::scope_as(tenant("ctx1"), async move {
        client.create_table(simple_table("table1")).await.unwrap();
        client
            .put_item(PutItemRequest::new(
                "table1",
                item(&[("hash_key_field", "1")]),
            ))
            .await
            .unwrap();

        // The synchronous result is the pre-delete description.
        let description = client.delete_table("table1").await.unwrap();
        assert_eq!(description.table_name, "table1");

        // The background worker eventually removes the description.
        let mut deleted = false;
        for _ in 0..100 {
            match client.describe_table("table1").await {
                Err(Error::Metadata(MetadataError::TableNotFound(_))) => {
                    deleted = true;
                    break;
                }
                _ => tokio::time::sleep(Duration::from_millis(10)).await,
            }
        }
        assert!(deleted, "async delete should complete");
    })
    .await;
}

#[tokio::test]
async fn repeated_identical_puts_leave_one_row() {
    let backend = Arc::new(MemoryBackend::new());
    let client = shared_client(backend).await;

    TaskLocalContext::scope_as(tenant("ctx1"), async move {
        client.create_table(simple_table("table1")).await.unwrap();
        for _ in 0..2 {
            client
                .put_item(PutItemRequest::new(
                    "table1",
                    item(&[("hash_key_field", "1"), ("some_field", "value-1")]),
                ))
                .await
                .unwrap();
        }
        let out = client.scan(ScanRequest::new("table1")).await.unwrap();
        assert_eq!(out.items.len(), 1);
    })
    .await;
}

#[tokio::test]
async fn describe_table_forces_active_status() {
    let backend = Arc::new(MemoryBackend::new());
    let client = shared_client(backend).await;

    TaskLocalContext::scope_as(tenant("ctx1"), async move {
        client.create_table(simple_table("table1")).await.unwrap();
        let description = client.describe_table("table1").await.unwrap();
        assert_eq!(description.status, TableStatus::Active);
    })
    .await;
}

#[tokio::test]
async fn unknown_virtual_table_fails_cleanly() {
    let backend = Arc::new(MemoryBackend::new());
    let client = shared_client(backend).await;

    TaskLocalContext::scope_as(tenant("ctx1"), async move {
        let err = client
            .get_item(GetItemRequest::new("missing", item(&[("hash_key_field", "1")])))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Metadata(MetadataError::TableNotFound(_))
        ));
    })
    .await;
}

#[tokio::test]
async fn data_plane_requires_tenant_context() {
    let backend = Arc::new(MemoryBackend::new());
    let client = shared_client(backend).await;

    // No TaskLocalContext scope here: the ambient tenant is unavailable.
    let err = client
        .put_item(PutItemRequest::new(
            "table1",
            item(&[("hash_key_field", "1")]),
        ))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        Error::Core(tessera_core::Error::TenantUnset)
    ));
}

#[tokio::test]
async fn delete_then_recreate_with_different_shape() {
    let backend = Arc::new(MemoryBackend::new());
    let client = shared_client(backend).await;

    TaskLocalContext::scope_as(tenant("ctx1"), async move {
        client.create_table(simple_table("t")).await.unwrap();
        client
            .put_item(PutItemRequest::new("t", item(&[("hash_key_field", "1")])))
            .await
            .unwrap();
        client.delete_table("t").await.unwrap();

        // Recreate with a range key: a different shared physical table.
        let ranged = TableDescription::builder("t")
            .hash_range_key(
                "hash_key_field",
                KeyAttributeType::S,
                "sort_field",
                KeyAttributeType::S,
            )
            .build();
        client.create_table(ranged).await.unwrap();
        client
            .put_item(PutItemRequest::new(
                "t",
                item(&[("hash_key_field", "1"), ("sort_field", "a")]),
            ))
            .await
            .unwrap();

        let out = client.scan(ScanRequest::new("t")).await.unwrap();
        assert_eq!(out.items.len(), 1);
        assert_eq!(out.items[0].get("sort_field").unwrap(), &s("a"));
    })
    .await;
}

#[tokio::test]
async fn deleting_items_by_virtual_key() {
    let backend = Arc::new(MemoryBackend::new());
    let client = shared_client(backend).await;

    TaskLocalContext::scope_as(tenant("ctx1"), async move {
        client.create_table(simple_table("table1")).await.unwrap();
        client
            .put_item(PutItemRequest::new(
                "table1",
                item(&[("hash_key_field", "1")]),
            ))
            .await
            .unwrap();
        client
            .delete_item(DeleteItemRequest::new(
                "table1",
                item(&[("hash_key_field", "1")]),
            ))
            .await
            .unwrap();

        let out = client.scan(ScanRequest::new("table1")).await.unwrap();
        assert!(out.items.is_empty());
    })
    .await;
}
