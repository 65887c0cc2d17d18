use std::{
    sync::atomic::{AtomicU32, Ordering},
    time::Duration
};

use async_trait::async_trait;
use sql_query_sentinel::{
    error::{AppResult, error_message},
    schema::{Catalog, ColumnClass, RawColumn, SchemaCache, snapshot_from_ddl, snapshot_summary}
};

/// Counts fetches so tests can observe cache hits and misses.
struct CountingCatalog {
    fetches: AtomicU32
}

impl CountingCatalog {
    fn new() -> Self {
        Self {
            fetches: AtomicU32::new(0)
        }
    }

    fn fetch_count(&self) -> u32 {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Catalog for CountingCatalog {
    async fn fetch_columns(&self, table: &str) -> AppResult<Vec<RawColumn>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if table == "missing_table" {
            return Ok(Vec::new());
        }
        Ok(vec![
            RawColumn {
                name:      "id".to_string(),
                data_type: "uuid".to_string()
            },
            RawColumn {
                name:      "amount".to_string(),
                data_type: "jsonb".to_string()
            },
        ])
    }
}

#[tokio::test]
async fn test_describe_populates_cache() {
    let catalog = CountingCatalog::new();
    let cache = SchemaCache::new(Duration::from_secs(300));

    let first = cache.describe("fact_invoice", &catalog).await.unwrap();
    let second = cache.describe("fact_invoice", &catalog).await.unwrap();

    assert_eq!(first.len(), 2);
    assert_eq!(first.len(), second.len());
    assert_eq!(catalog.fetch_count(), 1);
}

#[tokio::test]
async fn test_describe_unknown_table_fails() {
    let catalog = CountingCatalog::new();
    let cache = SchemaCache::new(Duration::from_secs(300));

    let result = cache.describe("missing_table", &catalog).await;
    assert!(result.is_err());
    let message = error_message(&result.unwrap_err());
    assert!(message.contains("missing_table"));
}

#[tokio::test]
async fn test_failed_lookup_is_not_cached() {
    let catalog = CountingCatalog::new();
    let cache = SchemaCache::new(Duration::from_secs(300));

    assert!(cache.describe("missing_table", &catalog).await.is_err());
    assert!(cache.describe("missing_table", &catalog).await.is_err());
    assert_eq!(catalog.fetch_count(), 2);
}

#[tokio::test]
async fn test_invalidate_forces_refetch() {
    let catalog = CountingCatalog::new();
    let cache = SchemaCache::new(Duration::from_secs(300));

    cache.describe("fact_invoice", &catalog).await.unwrap();
    cache.invalidate("fact_invoice");
    cache.describe("fact_invoice", &catalog).await.unwrap();

    assert_eq!(catalog.fetch_count(), 2);
}

#[tokio::test]
async fn test_invalidate_is_per_table() {
    let catalog = CountingCatalog::new();
    let cache = SchemaCache::new(Duration::from_secs(300));

    cache.describe("fact_invoice", &catalog).await.unwrap();
    cache.describe("documents", &catalog).await.unwrap();
    cache.invalidate("fact_invoice");
    cache.describe("documents", &catalog).await.unwrap();

    // The documents entry survived the other table's invalidation.
    assert_eq!(catalog.fetch_count(), 2);
}

#[tokio::test]
async fn test_expired_entry_is_refetched() {
    let catalog = CountingCatalog::new();
    let cache = SchemaCache::new(Duration::from_millis(0));

    cache.describe("fact_invoice", &catalog).await.unwrap();
    cache.describe("fact_invoice", &catalog).await.unwrap();

    assert_eq!(catalog.fetch_count(), 2);
}

#[tokio::test]
async fn test_descriptors_carry_classification() {
    let catalog = CountingCatalog::new();
    let cache = SchemaCache::new(Duration::from_secs(300));

    let columns = cache.describe("fact_invoice", &catalog).await.unwrap();
    let id = columns.iter().find(|c| c.column == "id").unwrap();
    assert_eq!(id.class, ColumnClass::Identifier);
    assert!(id.is_identifier);
    assert!(id.json_shape.is_none());

    let amount = columns.iter().find(|c| c.column == "amount").unwrap();
    assert_eq!(amount.class, ColumnClass::Numeric);
    let shape = amount.json_shape.as_ref().expect("jsonb column carries a shape");
    assert_eq!(shape.value_key, "value");
}

#[test]
fn test_ddl_snapshot_matches_live_classification() {
    let ddl = r#"
        CREATE TABLE fact_invoice (
            id UUID PRIMARY KEY,
            document_id UUID,
            invoice_number JSONB,
            due_date JSONB,
            amount JSONB
        );
    "#;
    let snapshot = snapshot_from_ddl(ddl).unwrap();
    let columns = &snapshot["fact_invoice"];

    let by_name = |name: &str| columns.iter().find(|c| c.column == name).unwrap();
    assert_eq!(by_name("document_id").class, ColumnClass::Reference);
    assert_eq!(by_name("invoice_number").class, ColumnClass::Identifier);
    assert_eq!(by_name("due_date").class, ColumnClass::Date);
    assert_eq!(by_name("amount").class, ColumnClass::Numeric);
}

#[test]
fn test_summary_lists_tables_in_order() {
    let ddl = r#"
        CREATE TABLE vendors (id UUID, name TEXT);
        CREATE TABLE documents (id UUID);
    "#;
    let snapshot = snapshot_from_ddl(ddl).unwrap();
    let summary = snapshot_summary(&snapshot);

    let documents_at = summary.find("Table: documents").unwrap();
    let vendors_at = summary.find("Table: vendors").unwrap();
    assert!(documents_at < vendors_at);
}
