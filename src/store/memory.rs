// envclone/src/store/memory.rs
//! In-memory [`TableStore`] used by the unit tests. Records every call so tests
//! can assert on request counts and on what was written.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::Mutex;

use super::{Row, StoreError, TableStore};

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Count(String),
    Select { table: String, offset: u64, limit: u64 },
    Insert { table: String, rows: usize },
    Upsert { table: String, rows: usize },
    DeleteAll(String),
}

#[derive(Default)]
struct MemTable {
    columns: Option<BTreeSet<String>>,
    rows: Vec<Row>,
}

#[derive(Default)]
struct Inner {
    tables: BTreeMap<String, MemTable>,
    calls: Vec<Call>,
    unreachable: Option<String>,
    max_rows: Option<usize>,
    failing_inserts: HashSet<String>,
}

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a table whose columns are whatever the rows carry.
    pub fn with_table(self, name: &str, rows: Vec<Row>) -> Self {
        self.inner.lock().unwrap().tables.insert(
            name.to_string(),
            MemTable { columns: None, rows },
        );
        self
    }

    /// Adds a table with a fixed column set; writes with other columns fail.
    pub fn with_schema(self, name: &str, columns: &[&str], rows: Vec<Row>) -> Self {
        let columns = columns.iter().map(|c| c.to_string()).collect();
        self.inner.lock().unwrap().tables.insert(
            name.to_string(),
            MemTable { columns: Some(columns), rows },
        );
        self
    }

    /// Every call fails with a non-relation error.
    pub fn unreachable(self, message: &str) -> Self {
        self.inner.lock().unwrap().unreachable = Some(message.to_string());
        self
    }

    /// Caps every read at `max_rows`, like a server-side row limit.
    pub fn with_max_rows(self, max_rows: usize) -> Self {
        self.inner.lock().unwrap().max_rows = Some(max_rows);
        self
    }

    pub fn fail_inserts_for(self, table: &str) -> Self {
        self.inner.lock().unwrap().failing_inserts.insert(table.to_string());
        self
    }

    pub fn rows(&self, table: &str) -> Vec<Row> {
        self.inner
            .lock()
            .unwrap()
            .tables
            .get(table)
            .map(|t| t.rows.clone())
            .unwrap_or_default()
    }

    pub fn calls(&self) -> Vec<Call> {
        self.inner.lock().unwrap().calls.clone()
    }

    /// Number of reads against `table` that asked for exactly `limit` rows.
    pub fn page_requests(&self, table: &str, limit: u64) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, Call::Select { table: t, limit: l, .. } if t == table && *l == limit))
            .count()
    }

    fn begin(&self, call: Call) -> Result<std::sync::MutexGuard<'_, Inner>, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        inner.calls.push(call);
        if let Some(message) = &inner.unreachable {
            return Err(StoreError::Api {
                status: 503,
                code: None,
                message: message.clone(),
            });
        }
        Ok(inner)
    }
}

fn check_columns(table: &MemTable, rows: &[Row]) -> Result<(), StoreError> {
    if let Some(columns) = &table.columns {
        for row in rows {
            if let Some(unknown) = row.keys().find(|k| !columns.contains(*k)) {
                return Err(StoreError::Api {
                    status: 400,
                    code: Some("PGRST204".to_string()),
                    message: format!("Could not find the '{}' column in the schema cache", unknown),
                });
            }
        }
    }
    Ok(())
}

fn key_of<'a>(row: &'a Row, key: &str) -> Option<&'a Value> {
    row.get(key).filter(|v| !v.is_null())
}

#[async_trait]
impl TableStore for MemoryStore {
    async fn count(&self, table: &str) -> Result<u64, StoreError> {
        let inner = self.begin(Call::Count(table.to_string()))?;
        inner
            .tables
            .get(table)
            .map(|t| t.rows.len() as u64)
            .ok_or_else(|| StoreError::RelationMissing(table.to_string()))
    }

    async fn select_page(
        &self,
        table: &str,
        offset: u64,
        limit: u64,
    ) -> Result<Vec<Row>, StoreError> {
        let inner = self.begin(Call::Select {
            table: table.to_string(),
            offset,
            limit,
        })?;
        let t = inner
            .tables
            .get(table)
            .ok_or_else(|| StoreError::RelationMissing(table.to_string()))?;
        let limit = match inner.max_rows {
            Some(max) => (limit as usize).min(max),
            None => limit as usize,
        };
        Ok(t.rows
            .iter()
            .skip(offset as usize)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn insert(&self, table: &str, rows: &[Row]) -> Result<(), StoreError> {
        let mut inner = self.begin(Call::Insert {
            table: table.to_string(),
            rows: rows.len(),
        })?;
        if inner.failing_inserts.contains(table) {
            return Err(StoreError::Api {
                status: 409,
                code: Some("23503".to_string()),
                message: "insert or update violates foreign key constraint".to_string(),
            });
        }
        let t = inner
            .tables
            .get_mut(table)
            .ok_or_else(|| StoreError::RelationMissing(table.to_string()))?;
        check_columns(t, rows)?;
        t.rows.extend(rows.iter().cloned());
        Ok(())
    }

    async fn upsert(&self, table: &str, rows: &[Row], conflict_key: &str) -> Result<(), StoreError> {
        let mut inner = self.begin(Call::Upsert {
            table: table.to_string(),
            rows: rows.len(),
        })?;
        let t = inner
            .tables
            .get_mut(table)
            .ok_or_else(|| StoreError::RelationMissing(table.to_string()))?;
        check_columns(t, rows)?;
        for row in rows {
            let existing = key_of(row, conflict_key).and_then(|key| {
                t.rows
                    .iter()
                    .position(|r| key_of(r, conflict_key) == Some(key))
            });
            match existing {
                Some(index) => {
                    for (column, value) in row {
                        t.rows[index].insert(column.clone(), value.clone());
                    }
                }
                None => t.rows.push(row.clone()),
            }
        }
        Ok(())
    }

    async fn delete_all(&self, table: &str, key_column: &str) -> Result<(), StoreError> {
        let mut inner = self.begin(Call::DeleteAll(table.to_string()))?;
        let t = inner
            .tables
            .get_mut(table)
            .ok_or_else(|| StoreError::RelationMissing(table.to_string()))?;
        t.rows.retain(|r| key_of(r, key_column).is_none());
        Ok(())
    }
}

/// Builds a row from a JSON object literal.
pub fn row(value: Value) -> Row {
    match value {
        Value::Object(map) => map,
        other => panic!("expected a JSON object, got {}", other),
    }
}
