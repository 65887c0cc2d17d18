//! Schema introspection, classification, and caching.
//!
//! Column metadata comes from two sources: a live [`Catalog`] (the query
//! gateway's information schema) and offline DDL bootstrap for lint runs
//! without a database. Columns are classified by naming heuristics because
//! the extraction layer stores most business fields as JSON-wrapped text;
//! the declared database type alone says nothing about how a column may be
//! cast.
//!
//! # Example
//!
//! ```
//! use sql_query_sentinel::schema::{ColumnClass, snapshot_from_ddl};
//!
//! let ddl = r#"
//!     CREATE TABLE fact_invoice (
//!         id UUID PRIMARY KEY,
//!         document_id UUID,
//!         due_date JSONB,
//!         amount JSONB
//!     );
//! "#;
//!
//! let snapshot = snapshot_from_ddl(ddl).unwrap();
//! let cols = snapshot.get("fact_invoice").unwrap();
//! assert_eq!(cols.len(), 4);
//!
//! let due = cols.iter().find(|c| c.column == "due_date").unwrap();
//! assert_eq!(due.class, ColumnClass::Date);
//! assert!(due.json_shape.is_some());
//! ```

use std::{
    collections::{BTreeMap, HashMap},
    fmt,
    sync::RwLock,
    time::{Duration, Instant}
};

use async_trait::async_trait;
use sqlparser::{dialect::PostgreSqlDialect, parser::Parser};

use crate::error::{AppResult, ddl_parse_error, error_message, schema_lookup_error};

/// How a column may safely appear in generated SQL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnClass {
    /// Business key of the row itself (invoice number, vendor code)
    Identifier,
    /// Foreign key pointing at another record (`document_id`, `vendor_id`)
    Reference,
    Numeric,
    Date,
    Text
}

impl fmt::Display for ColumnClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Identifier => "identifier",
            Self::Reference => "reference",
            Self::Numeric => "numeric",
            Self::Date => "date",
            Self::Text => "text"
        };
        write!(f, "{}", label)
    }
}

/// JSON wrapper layout of an extracted column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JsonShape {
    /// Key holding the extracted value ("value" by convention)
    pub value_key:     String,
    /// What the wrapped value is declared to contain
    pub declared_kind: ColumnClass
}

/// Everything the pipeline knows about one column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDescriptor {
    pub table:         String,
    pub column:        String,
    /// Declared type as reported by the metadata source
    pub data_type:     String,
    pub class:         ColumnClass,
    pub is_identifier: bool,
    /// Present when the column stores a JSON-wrapped extracted value
    pub json_shape:    Option<JsonShape>
}

/// Point-in-time view of table metadata, keyed by table name.
///
/// `BTreeMap` keeps iteration deterministic for summaries and tests.
pub type SchemaSnapshot = BTreeMap<String, Vec<ColumnDescriptor>>;

/// Column name and declared type as reported by a metadata source.
#[derive(Debug, Clone)]
pub struct RawColumn {
    pub name:      String,
    pub data_type: String
}

/// Source of raw column metadata, usually the query gateway's
/// information schema.
#[async_trait]
pub trait Catalog: Send + Sync {
    /// Fetch column names and declared types for one table.
    ///
    /// An empty result means the table does not exist.
    async fn fetch_columns(&self, table: &str) -> AppResult<Vec<RawColumn>>;
}

const IDENTIFIER_TOKENS: &[&str] = &["id", "number", "num", "no", "code", "key", "ref"];
const NUMERIC_TOKENS: &[&str] = &[
    "amount", "total", "subtotal", "qty", "quantity", "price", "rate", "cost", "balance", "tax",
    "count", "sum",
];
const DATE_TOKENS: &[&str] = &["date", "day", "month", "year", "time"];

/// Classify a column by naming keywords, falling back to the declared type.
///
/// Name heuristics run first: the extraction layer wraps most values in
/// JSON, so the declared type is frequently `jsonb` regardless of content.
pub fn classify(table: &str, column: &str, data_type: &str) -> ColumnClass {
    let name = column.to_ascii_lowercase();

    if let Some(stem) = name.strip_suffix("_id").or_else(|| name.strip_suffix("_ref")) {
        if !table.to_ascii_lowercase().contains(stem) {
            return ColumnClass::Reference;
        }
        return ColumnClass::Identifier;
    }

    if name.ends_with("_at") || has_token(&name, DATE_TOKENS) {
        return ColumnClass::Date;
    }
    if has_token(&name, NUMERIC_TOKENS) {
        return ColumnClass::Numeric;
    }
    if has_token(&name, IDENTIFIER_TOKENS) {
        return ColumnClass::Identifier;
    }

    let ty = data_type.to_ascii_lowercase();
    if ty.contains("uuid") {
        ColumnClass::Identifier
    } else if ty.contains("int")
        || ty.contains("numeric")
        || ty.contains("decimal")
        || ty.contains("real")
        || ty.contains("double")
        || ty.contains("money")
    {
        ColumnClass::Numeric
    } else if ty.contains("date") || ty.contains("time") {
        ColumnClass::Date
    } else {
        ColumnClass::Text
    }
}

fn has_token(name: &str, tokens: &[&str]) -> bool {
    name.split('_').any(|part| tokens.contains(&part))
}

/// Build the descriptor for one column of one table.
pub fn build_descriptor(table: &str, name: &str, data_type: &str) -> ColumnDescriptor {
    let class = classify(table, name, data_type);
    let json_shape = data_type
        .to_ascii_lowercase()
        .contains("json")
        .then(|| JsonShape {
            value_key:     String::from("value"),
            declared_kind: class
        });

    ColumnDescriptor {
        table: table.to_string(),
        column: name.to_string(),
        data_type: data_type.to_string(),
        is_identifier: class == ColumnClass::Identifier,
        class,
        json_shape
    }
}

/// Parse `CREATE TABLE` statements into a snapshot for offline lint runs.
pub fn snapshot_from_ddl(sql: &str) -> AppResult<SchemaSnapshot> {
    let statements = Parser::parse_sql(&PostgreSqlDialect {}, sql)
        .map_err(|e| ddl_parse_error(e.to_string()))?;

    let mut snapshot = SchemaSnapshot::new();
    for stmt in statements {
        if let sqlparser::ast::Statement::CreateTable(create) = stmt {
            let table = create.name.to_string();
            let columns = create
                .columns
                .iter()
                .map(|col| build_descriptor(&table, &col.name.to_string(), &col.data_type.to_string()))
                .collect();
            snapshot.insert(table, columns);
        }
    }
    Ok(snapshot)
}

/// Summarize a snapshot for generation prompts.
pub fn snapshot_summary(snapshot: &SchemaSnapshot) -> String {
    let mut summary = String::from("Database schema:\n\n");
    for (table, columns) in snapshot {
        summary.push_str(&format!("Table: {}\n", table));
        for col in columns {
            let wrapped = if col.json_shape.is_some() {
                ", JSON-wrapped: access via ->>'value'"
            } else {
                ""
            };
            summary.push_str(&format!(
                "  - {} {} [{}{}]\n",
                col.column, col.data_type, col.class, wrapped
            ));
        }
        summary.push('\n');
    }
    summary
}

struct CachedTable {
    columns:    Vec<ColumnDescriptor>,
    fetched_at: Instant
}

/// Table-level metadata cache with an injectable staleness bound.
///
/// Entries live for the process lifetime unless they age past the TTL or
/// are explicitly invalidated after DDL changes. Reads are concurrent;
/// concurrent refreshes of the same table are last-writer-wins.
pub struct SchemaCache {
    entries: RwLock<HashMap<String, CachedTable>>,
    ttl:     Duration
}

impl SchemaCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl
        }
    }

    /// Describe one table, fetching through `catalog` on miss or expiry.
    ///
    /// # Errors
    ///
    /// Returns a schema lookup error when the catalog fails or reports no
    /// columns for the table.
    pub async fn describe(
        &self,
        table: &str,
        catalog: &dyn Catalog
    ) -> AppResult<Vec<ColumnDescriptor>> {
        if let Some(columns) = self.fresh_entry(table) {
            return Ok(columns);
        }

        let raw = catalog
            .fetch_columns(table)
            .await
            .map_err(|e| schema_lookup_error(table, error_message(&e)))?;
        if raw.is_empty() {
            return Err(schema_lookup_error(table, "table not present in catalog"));
        }

        let columns: Vec<ColumnDescriptor> = raw
            .iter()
            .map(|col| build_descriptor(table, &col.name, &col.data_type))
            .collect();
        self.store(table, columns.clone());
        Ok(columns)
    }

    /// Drop one table's cached entry; the next describe re-fetches.
    pub fn invalidate(&self, table: &str) {
        if let Ok(mut entries) = self.entries.write() {
            entries.remove(table);
        }
    }

    fn fresh_entry(&self, table: &str) -> Option<Vec<ColumnDescriptor>> {
        let entries = self.entries.read().ok()?;
        let entry = entries.get(table)?;
        if entry.fetched_at.elapsed() >= self.ttl {
            return None;
        }
        Some(entry.columns.clone())
    }

    fn store(&self, table: &str, columns: Vec<ColumnDescriptor>) {
        if let Ok(mut entries) = self.entries.write() {
            entries.insert(
                table.to_string(),
                CachedTable {
                    columns,
                    fetched_at: Instant::now()
                }
            );
        }
    }
}
