// envclone/src/sync/logic.rs
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{debug, warn};

use super::sql::{self, ScriptHeader};
use crate::inspect::{inspect, InferredType, TableDescriptor};
use crate::store::TableStore;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TypeMismatch {
    pub table: String,
    pub column: String,
    pub master_type: InferredType,
    pub target_type: InferredType,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncResult {
    pub environment: String,
    pub source: String,
    pub tables_created: Vec<String>,
    pub columns_added: Vec<String>,
    /// Columns guarded in the script because the target table was empty and
    /// its structure could not be sampled.
    pub unverified_columns: Vec<String>,
    pub type_mismatches: Vec<TypeMismatch>,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub sql_script: String,
}

impl SyncResult {
    pub fn has_changes(&self) -> bool {
        !self.tables_created.is_empty() || !self.columns_added.is_empty()
    }
}

/// Inspects every table of the source environment. Tables that could not be
/// inspected are returned as errors, not as missing tables.
pub async fn analyze_master_schema(
    source: &dyn TableStore,
    tables: &[String],
) -> (Vec<TableDescriptor>, Vec<String>) {
    let mut master = Vec::with_capacity(tables.len());
    let mut errors = Vec::new();
    for table in tables {
        match inspect(source, table).await {
            Ok(descriptor) => {
                debug!(table = %table, exists = descriptor.exists, columns = descriptor.columns.len(), "master table inspected");
                master.push(descriptor);
            }
            Err(e) => {
                warn!(table = %table, error = %e, "master table inspection failed");
                errors.push(format!("{}: {}", table, e));
            }
        }
    }
    (master, errors)
}

/// Inspects the target's copy of every existing master table, then diffs.
pub async fn diff_against(
    source_name: &str,
    master: &[TableDescriptor],
    target_name: &str,
    target: &dyn TableStore,
    generated_at: DateTime<Utc>,
) -> SyncResult {
    let mut target_tables = Vec::new();
    let mut errors = Vec::new();
    for table in master.iter().filter(|t| t.exists) {
        match inspect(target, &table.name).await {
            Ok(descriptor) => target_tables.push(descriptor),
            Err(e) => errors.push(format!("{}: {}", table.name, e)),
        }
    }
    let mut result = diff_tables(source_name, master, target_name, &target_tables, generated_at);
    result.errors.extend(errors);
    result
}

/// Pure diff of a master schema against target descriptors. Master tables
/// without a target descriptor (inspection failed) are skipped.
pub fn diff_tables(
    source_name: &str,
    master: &[TableDescriptor],
    target_name: &str,
    target_tables: &[TableDescriptor],
    generated_at: DateTime<Utc>,
) -> SyncResult {
    let targets: BTreeMap<&str, &TableDescriptor> =
        target_tables.iter().map(|t| (t.name.as_str(), t)).collect();
    let mut result = SyncResult {
        environment: target_name.to_string(),
        source: source_name.to_string(),
        ..Default::default()
    };
    let mut statements = Vec::new();
    let mut unverified = Vec::new();
    let mut notes = Vec::new();

    for master_table in master.iter().filter(|t| t.exists) {
        let Some(target_table) = targets.get(master_table.name.as_str()) else {
            continue;
        };

        if master_table.structure_unknown() {
            if !target_table.exists {
                result.warnings.push(format!(
                    "{} is empty in {} and missing in {}; no columns to create it from",
                    master_table.name, source_name, target_name
                ));
            }
            continue;
        }

        if !target_table.exists {
            result.tables_created.push(master_table.name.clone());
            statements.push(sql::create_table(master_table));
            continue;
        }

        if target_table.structure_unknown() {
            for column in &master_table.columns {
                result
                    .unverified_columns
                    .push(format!("{}.{}", master_table.name, column.name));
                unverified.push(sql::add_column(&master_table.name, column));
            }
            result.warnings.push(format!(
                "{} is empty in {}; its columns could not be checked and are guarded in the script",
                master_table.name, target_name
            ));
            continue;
        }

        for column in &master_table.columns {
            match target_table.column(&column.name) {
                None => {
                    result
                        .columns_added
                        .push(format!("{}.{}", master_table.name, column.name));
                    statements.push(sql::add_column(&master_table.name, column));
                }
                Some(existing)
                    if !column.nullable
                        && !existing.nullable
                        && existing.inferred_type != column.inferred_type =>
                {
                    notes.push(format!(
                        "{}.{}: {} in {}, {} in {}",
                        master_table.name,
                        column.name,
                        column.inferred_type.sql_type(),
                        source_name,
                        existing.inferred_type.sql_type(),
                        target_name
                    ));
                    result.type_mismatches.push(TypeMismatch {
                        table: master_table.name.clone(),
                        column: column.name.clone(),
                        master_type: column.inferred_type,
                        target_type: existing.inferred_type,
                    });
                }
                Some(_) => {}
            }
        }
    }

    let header = ScriptHeader {
        source: source_name,
        target: target_name,
        generated_at,
    };
    result.sql_script = sql::render_script(
        &header,
        &statements,
        &unverified,
        &notes,
        &[
            ("Tables created", result.tables_created.len()),
            ("Columns added", result.columns_added.len()),
            ("Unverified columns", result.unverified_columns.len()),
            ("Type mismatches", result.type_mismatches.len()),
        ],
    );
    result
}

pub fn print_sync_result(result: &SyncResult) {
    println!("\n🔧 {} → {}", result.source, result.environment);
    for table in &result.tables_created {
        println!("  🆕 create table {}", table);
    }
    for column in &result.columns_added {
        println!("  ➕ add column {}", column);
    }
    if !result.unverified_columns.is_empty() {
        println!(
            "  ❔ {} column(s) guarded on empty tables",
            result.unverified_columns.len()
        );
    }
    for m in &result.type_mismatches {
        println!(
            "  ⚠️ {}.{}: {} vs {}",
            m.table,
            m.column,
            m.master_type.sql_type(),
            m.target_type.sql_type()
        );
    }
    for e in &result.errors {
        println!("  ❌ {}", e);
    }
    if !result.has_changes() && result.errors.is_empty() {
        println!("  ✅ schema already in sync");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inspect::ColumnInfo;
    use crate::store::memory::{row, MemoryStore};
    use serde_json::json;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    /// Applies what the script would do to the target descriptors. Created
    /// tables start empty, as they would in the database.
    fn apply(target: &mut Vec<TableDescriptor>, master: &[TableDescriptor], result: &SyncResult) {
        for name in &result.tables_created {
            let mut created = TableDescriptor::missing(name);
            created.exists = true;
            target.push(created);
        }
        for qualified in &result.columns_added {
            let (table, column) = qualified.split_once('.').unwrap();
            let source_col = master
                .iter()
                .find(|t| t.name == table)
                .and_then(|t| t.column(column))
                .unwrap()
                .clone();
            let t = target.iter_mut().find(|t| t.name == table).unwrap();
            t.columns.push(ColumnInfo {
                nullable: true,
                position: t.columns.len() + 1,
                ..source_col
            });
        }
    }

    #[tokio::test]
    async fn test_diff_reports_missing_tables_and_columns() {
        let source = MemoryStore::new()
            .with_table("lofts", vec![row(json!({ "id": 1, "name": "A", "price": 10.5, "owner_id": null }))])
            .with_table("zone_areas", vec![row(json!({ "id": "6f1c2d3e-4b5a-4c6d-8e7f-901234567890", "name": "N" }))])
            .with_table("settings", vec![row(json!({ "id": 1, "value": "x" }))])
            .with_table("teams", vec![]);
        let target = MemoryStore::new()
            .with_table("lofts", vec![row(json!({ "id": 1, "name": 7 }))])
            .with_table("settings", vec![]);

        let tables = names(&["lofts", "zone_areas", "settings", "teams", "ghost"]);
        let (master, errors) = analyze_master_schema(&source, &tables).await;
        assert!(errors.is_empty());
        assert_eq!(master.len(), 5);

        let result = diff_against("prod", &master, "test", &target, Utc::now()).await;
        assert_eq!(result.tables_created, names(&["zone_areas"]));
        assert_eq!(result.columns_added, names(&["lofts.price", "lofts.owner_id"]));
        assert_eq!(result.unverified_columns, names(&["settings.id", "settings.value"]));
        assert_eq!(result.type_mismatches.len(), 1);
        assert_eq!(result.type_mismatches[0].column, "name");
        assert!(result.warnings.iter().any(|w| w.contains("teams")));
        assert!(result.has_changes());

        let sql = &result.sql_script;
        assert!(sql.contains("CREATE TABLE IF NOT EXISTS \"zone_areas\""));
        assert!(sql.contains("ALTER TABLE \"lofts\" ADD COLUMN IF NOT EXISTS \"price\" numeric;"));
        let unverified = sql.find("-- Unverified: target tables are empty").unwrap();
        let settings = sql.find("ALTER TABLE \"settings\" ADD COLUMN IF NOT EXISTS \"value\" text;").unwrap();
        assert!(unverified < settings);
        assert!(sql.contains("--   lofts.name: text in prod, integer in test"));
        assert!(!sql.contains("NOT NULL"));
        assert!(!sql.contains("DROP"));
    }

    #[tokio::test]
    async fn test_sync_is_idempotent_once_applied() {
        let source = MemoryStore::new()
            .with_table("lofts", vec![row(json!({ "id": 1, "name": "A", "price": 10.5 }))])
            .with_table("tasks", vec![row(json!({ "id": 1, "title": "Fix" }))]);
        let target = MemoryStore::new().with_table("lofts", vec![row(json!({ "id": 1, "name": "B" }))]);

        let tables = names(&["lofts", "tasks"]);
        let (master, _) = analyze_master_schema(&source, &tables).await;
        let first = diff_against("prod", &master, "dev", &target, Utc::now()).await;
        assert!(first.has_changes());

        let mut target_tables: Vec<TableDescriptor> = Vec::new();
        for table in &tables {
            target_tables.push(inspect(&target, table).await.unwrap());
        }
        apply(&mut target_tables, &master, &first);

        let second = diff_tables("prod", &master, "dev", &target_tables, Utc::now());
        assert!(!second.has_changes());
        assert!(second.tables_created.is_empty());
        assert!(second.columns_added.is_empty());

        let script = &second.sql_script;
        assert!(!script.contains("CREATE TABLE"));
        let label = script.find("-- Unverified: target tables are empty").unwrap();
        assert!(script.find("ALTER TABLE").is_some_and(|alter| alter > label));
    }

    #[tokio::test]
    async fn test_null_samples_never_report_type_mismatch() {
        let source = MemoryStore::new().with_table("tasks", vec![row(json!({ "id": 1, "due": null }))]);
        let target = MemoryStore::new().with_table("tasks", vec![row(json!({ "id": 2, "due": "2025-01-01T00:00:00Z" }))]);
        let (master, _) = analyze_master_schema(&source, &names(&["tasks"])).await;
        let result = diff_against("prod", &master, "test", &target, Utc::now()).await;
        assert!(result.type_mismatches.is_empty());
        assert!(!result.has_changes());
    }

    #[tokio::test]
    async fn test_unreachable_target_records_errors() {
        let source = MemoryStore::new().with_table("tasks", vec![row(json!({ "id": 1 }))]);
        let target = MemoryStore::new().unreachable("timeout");
        let (master, _) = analyze_master_schema(&source, &names(&["tasks"])).await;
        let result = diff_against("prod", &master, "test", &target, Utc::now()).await;
        assert_eq!(result.errors.len(), 1);
        assert!(!result.has_changes());
    }
}
