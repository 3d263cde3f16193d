// envclone/src/inspect/mod.rs
//! Best-effort schema discovery by sampling rows.
//!
//! The stores expose no catalog, so a table's structure is inferred from one
//! sampled row. Empty tables yield an empty column list. Callers must treat
//! the result as a heuristic: two environments can disagree on an inferred
//! type without their real schemas differing.

use regex::Regex;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeSet;
use std::sync::LazyLock;
use tracing::debug;

use crate::store::{Row, StoreError, TableStore};

static ISO_TIMESTAMP: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\d{4}-\d{2}-\d{2}T\d{2}:\d{2}:\d{2}").expect("timestamp pattern is valid")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum InferredType {
    Boolean,
    Integer,
    Numeric,
    Timestamp,
    Uuid,
    Text,
    Json,
}

impl InferredType {
    pub fn sql_type(&self) -> &'static str {
        match self {
            InferredType::Boolean => "boolean",
            InferredType::Integer => "integer",
            InferredType::Numeric => "numeric",
            InferredType::Timestamp => "timestamp with time zone",
            InferredType::Uuid => "uuid",
            InferredType::Text => "text",
            InferredType::Json => "jsonb",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnInfo {
    pub name: String,
    pub inferred_type: InferredType,
    /// The sampled value was null, so the type is a guess.
    pub nullable: bool,
    pub position: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TableDescriptor {
    pub name: String,
    pub columns: Vec<ColumnInfo>,
    pub exists: bool,
    pub row_count: u64,
}

impl TableDescriptor {
    pub fn missing(name: &str) -> Self {
        Self {
            name: name.to_string(),
            columns: Vec::new(),
            exists: false,
            row_count: 0,
        }
    }

    pub fn column_names(&self) -> BTreeSet<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    pub fn column(&self, name: &str) -> Option<&ColumnInfo> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// True when the table exists but no row was available to sample.
    pub fn structure_unknown(&self) -> bool {
        self.exists && self.columns.is_empty()
    }
}

pub fn infer_type(value: &Value) -> InferredType {
    match value {
        Value::Null => InferredType::Text,
        Value::Bool(_) => InferredType::Boolean,
        Value::Number(n) => {
            if n.is_i64() || n.is_u64() {
                InferredType::Integer
            } else if n.as_f64().is_some_and(|f| f.fract() == 0.0) {
                InferredType::Integer
            } else {
                InferredType::Numeric
            }
        }
        Value::String(s) => {
            if ISO_TIMESTAMP.is_match(s) {
                InferredType::Timestamp
            } else if s.len() == 36 && uuid::Uuid::parse_str(s).is_ok() {
                InferredType::Uuid
            } else {
                InferredType::Text
            }
        }
        Value::Array(_) | Value::Object(_) => InferredType::Json,
    }
}

pub fn columns_from_sample(sample: &Row) -> Vec<ColumnInfo> {
    sample
        .iter()
        .enumerate()
        .map(|(index, (name, value))| ColumnInfo {
            name: name.clone(),
            inferred_type: infer_type(value),
            nullable: value.is_null(),
            position: index + 1,
        })
        .collect()
}

/// Inspects one table. A missing relation is reported as `exists: false`;
/// any other store failure is returned to the caller.
pub async fn inspect(store: &dyn TableStore, table: &str) -> Result<TableDescriptor, StoreError> {
    let row_count = match store.count(table).await {
        Ok(count) => count,
        Err(e) if e.is_relation_missing() => {
            debug!(table, "relation absent");
            return Ok(TableDescriptor::missing(table));
        }
        Err(e) => return Err(e),
    };

    let mut descriptor = TableDescriptor {
        name: table.to_string(),
        columns: Vec::new(),
        exists: true,
        row_count,
    };

    if row_count > 0 {
        let sample = store.select_page(table, 0, 1).await?;
        if let Some(first) = sample.first() {
            descriptor.columns = columns_from_sample(first);
        }
    } else {
        match store.select_page(table, 0, 0).await {
            Ok(_) => {}
            Err(e) if e.is_relation_missing() => return Ok(TableDescriptor::missing(table)),
            Err(e) => return Err(e),
        }
    }

    Ok(descriptor)
}

/// Existence check only; non-relation failures are propagated.
pub async fn table_exists(store: &dyn TableStore, table: &str) -> Result<bool, StoreError> {
    match store.select_page(table, 0, 1).await {
        Ok(_) => Ok(true),
        Err(e) if e.is_relation_missing() => Ok(false),
        Err(e) => Err(e),
    }
}

/// Reads a whole table in offset/limit windows, so N rows at page size P
/// cost `ceil(N/P)` requests. Without a known count a short page ends the
/// read. With one, reading continues from the rows actually received until
/// `expected` rows arrived or a page comes back empty, since the server may
/// cap responses below the requested page size.
pub async fn fetch_all_rows(
    store: &dyn TableStore,
    table: &str,
    page_size: usize,
    expected: Option<u64>,
) -> Result<Vec<Row>, StoreError> {
    let page = page_size.max(1) as u64;
    let mut rows: Vec<Row> = Vec::new();
    let mut offset = 0u64;

    loop {
        if expected.is_some_and(|n| rows.len() as u64 >= n) {
            break;
        }
        let batch = store.select_page(table, offset, page).await?;
        let fetched = batch.len() as u64;
        rows.extend(batch);
        if fetched == 0 || (expected.is_none() && fetched < page) {
            break;
        }
        if fetched < page {
            debug!(table, fetched, page, "short page before the expected count");
        }
        offset += fetched;
    }

    Ok(rows)
}

/// Counts rows by paging through them, for accuracy on large tables.
pub async fn count_rows_paged(
    store: &dyn TableStore,
    table: &str,
    page_size: usize,
) -> Result<u64, StoreError> {
    let page = page_size.max(1) as u64;
    let mut total = 0u64;
    let mut offset = 0u64;

    loop {
        let fetched = store.select_page(table, offset, page).await?.len() as u64;
        total += fetched;
        if fetched < page {
            break;
        }
        offset += page;
    }

    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::{row, MemoryStore};
    use serde_json::json;

    fn numbered_rows(n: usize) -> Vec<Row> {
        (0..n).map(|i| row(json!({ "id": i, "label": format!("row {}", i) }))).collect()
    }

    #[test]
    fn test_infer_type() {
        assert_eq!(infer_type(&json!(true)), InferredType::Boolean);
        assert_eq!(infer_type(&json!(42)), InferredType::Integer);
        assert_eq!(infer_type(&json!(3.0)), InferredType::Integer);
        assert_eq!(infer_type(&json!(3.5)), InferredType::Numeric);
        assert_eq!(infer_type(&json!("2024-05-01T10:00:00+00:00")), InferredType::Timestamp);
        assert_eq!(
            infer_type(&json!("6f1c2d3e-4b5a-4c6d-8e7f-901234567890")),
            InferredType::Uuid
        );
        assert_eq!(infer_type(&json!("2024-05-01")), InferredType::Text);
        assert_eq!(infer_type(&json!({ "a": 1 })), InferredType::Json);
        assert_eq!(infer_type(&json!([1, 2])), InferredType::Json);
        assert_eq!(infer_type(&Value::Null), InferredType::Text);
    }

    #[tokio::test]
    async fn test_inspect_populated_table() {
        let store = MemoryStore::new().with_table(
            "currencies",
            vec![
                row(json!({ "id": "6f1c2d3e-4b5a-4c6d-8e7f-901234567890", "code": "DZD", "ratio": 1.5, "is_default": true, "deleted_at": null })),
                row(json!({ "id": "7f1c2d3e-4b5a-4c6d-8e7f-901234567890", "code": "EUR", "ratio": 0.007, "is_default": false, "deleted_at": null })),
            ],
        );

        let descriptor = inspect(&store, "currencies").await.unwrap();
        assert!(descriptor.exists);
        assert_eq!(descriptor.row_count, 2);
        let names: Vec<_> = descriptor.columns.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["id", "code", "ratio", "is_default", "deleted_at"]);
        assert_eq!(descriptor.column("id").unwrap().inferred_type, InferredType::Uuid);
        assert_eq!(descriptor.column("ratio").unwrap().inferred_type, InferredType::Numeric);
        assert_eq!(descriptor.column("is_default").unwrap().position, 4);
        assert!(descriptor.column("deleted_at").unwrap().nullable);
    }

    #[tokio::test]
    async fn test_inspect_empty_and_missing_tables() {
        let store = MemoryStore::new().with_table("settings", vec![]);

        let empty = inspect(&store, "settings").await.unwrap();
        assert!(empty.exists);
        assert!(empty.structure_unknown());
        assert_eq!(store.page_requests("settings", 0), 1);

        let missing = inspect(&store, "zone_areas").await.unwrap();
        assert!(!missing.exists);
        assert_eq!(missing.row_count, 0);
    }

    #[tokio::test]
    async fn test_inspect_propagates_connectivity_errors() {
        let store = MemoryStore::new().unreachable("timeout");
        let err = inspect(&store, "lofts").await.unwrap_err();
        assert!(!err.is_relation_missing());
    }

    #[tokio::test]
    async fn test_fetch_all_rows_page_count_with_known_size() {
        let store = MemoryStore::new().with_table("lofts", numbered_rows(5000));
        let rows = fetch_all_rows(&store, "lofts", 1000, Some(5000)).await.unwrap();
        assert_eq!(rows.len(), 5000);
        assert_eq!(store.page_requests("lofts", 1000), 5);
    }

    #[tokio::test]
    async fn test_fetch_all_rows_stops_on_short_page() {
        let store = MemoryStore::new().with_table("tasks", numbered_rows(2500));
        let rows = fetch_all_rows(&store, "tasks", 1000, None).await.unwrap();
        assert_eq!(rows.len(), 2500);
        assert_eq!(store.page_requests("tasks", 1000), 3);

        let store = MemoryStore::new().with_table("tasks", numbered_rows(0));
        let rows = fetch_all_rows(&store, "tasks", 1000, Some(0)).await.unwrap();
        assert!(rows.is_empty());
        assert_eq!(store.page_requests("tasks", 1000), 0);
    }

    #[tokio::test]
    async fn test_fetch_all_rows_survives_server_row_cap() {
        let store = MemoryStore::new()
            .with_table("lofts", numbered_rows(5))
            .with_max_rows(3);
        let rows = fetch_all_rows(&store, "lofts", 4, Some(5)).await.unwrap();
        assert_eq!(rows.len(), 5);
        let ids: Vec<_> = rows.iter().map(|r| r["id"].as_u64().unwrap()).collect();
        assert_eq!(ids, vec![0, 1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn test_fetch_all_rows_ends_when_rows_vanish() {
        let store = MemoryStore::new().with_table("tasks", numbered_rows(3));
        let rows = fetch_all_rows(&store, "tasks", 2, Some(10)).await.unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(store.page_requests("tasks", 2), 3);
    }

    #[tokio::test]
    async fn test_count_rows_paged() {
        let store = MemoryStore::new().with_table("transactions", numbered_rows(1234));
        assert_eq!(count_rows_paged(&store, "transactions", 500).await.unwrap(), 1234);
        assert_eq!(store.page_requests("transactions", 500), 3);
    }
}
