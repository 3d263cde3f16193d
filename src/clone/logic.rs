// envclone/src/clone/logic.rs
use chrono::Utc;
use tracing::{debug, info, warn};

use super::anonymize::Anonymizer;
use super::job::CloneJob;
use super::report::{CloneReport, TableResult, TableStatus};
use super::shaping::shape_rows;
use super::writer::{write_rows, WriteStrategy};
use crate::config::CloneSettings;
use crate::environment::Environment;
use crate::errors::{AppError, Result};
use crate::inspect::{fetch_all_rows, inspect, table_exists, TableDescriptor};
use crate::store::{Row, TableStore};

/// Copies tables from one environment to another, one table at a time.
/// Failures are contained at the table boundary: the run always produces a
/// report covering every requested table.
pub struct DataCloner<'a> {
    source: &'a Environment,
    target: &'a Environment,
    settings: &'a CloneSettings,
    anonymizer: Anonymizer,
}

impl<'a> DataCloner<'a> {
    pub fn new(source: &'a Environment, target: &'a Environment, settings: &'a CloneSettings) -> Self {
        Self {
            source,
            target,
            settings,
            anonymizer: Anonymizer::new(target.name, Utc::now()),
        }
    }

    /// Checks the must-have tables on both sides. Never fatal.
    pub async fn preflight(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        for environment in [self.source, self.target] {
            for table in &self.settings.preflight_tables {
                match table_exists(environment.store(), table).await {
                    Ok(true) => {}
                    Ok(false) => warnings.push(format!("{} is missing in {}", table, environment.name)),
                    Err(e) => warnings.push(format!("could not check {} in {}: {}", table, environment.name, e)),
                }
            }
        }
        warnings
    }

    pub async fn run(&self, job: &CloneJob) -> CloneReport {
        let mut report = CloneReport::new(
            self.source.name.as_str(),
            self.target.name.as_str(),
            job.dry_run(),
            Utc::now(),
        );

        if let Some(down) = [self.source, self.target].into_iter().find(|e| !e.is_connected()) {
            let message = down.connectivity_error().to_string();
            println!("❌ {}; no table will be contacted", message);
            for table in job.tables() {
                report.push(TableResult::error(table, message.clone()));
            }
            report.finish(Utc::now());
            return report;
        }

        println!(
            "🚀 Cloning {} table(s) from {} to {}{}",
            job.tables().len(),
            self.source.name,
            self.target.name,
            if job.dry_run() { " (dry run)" } else { "" }
        );

        for warning in self.preflight().await {
            println!("⚠️ Preflight: {}", warning);
            report.warnings.push(format!("preflight: {}", warning));
        }

        for table in job.tables() {
            println!("\n📋 {}", table);
            let result = match self.clone_table(job, table).await {
                Ok(result) => result,
                Err(e) => {
                    warn!(table = %table, error = %e, "table clone failed");
                    TableResult::error(table, e.to_string())
                }
            };
            print_table_result(&result);
            report.push(result);
        }

        report.finish(Utc::now());
        info!(
            source = %self.source.name,
            target = %self.target.name,
            tables = report.tables.len(),
            "clone finished"
        );
        report
    }

    async fn clone_table(&self, job: &CloneJob, table: &str) -> Result<TableResult> {
        let target_desc = inspect(self.target.store(), table)
            .await
            .map_err(|e| AppError::table(table, e))?;
        if !target_desc.exists {
            return Ok(TableResult::empty(table, "table missing in target"));
        }

        let source_desc = inspect(self.source.store(), table)
            .await
            .map_err(|e| AppError::table(table, e))?;
        if !source_desc.exists {
            return Ok(TableResult::empty(table, "table missing in source"));
        }

        let rows = fetch_all_rows(
            self.source.store(),
            table,
            job.page_size(),
            Some(source_desc.row_count),
        )
        .await
        .map_err(|e| AppError::table(table, e))?;
        debug!(table, rows = rows.len(), "source rows read");
        let short_read = ((rows.len() as u64) < source_desc.row_count).then(|| {
            format!(
                "read {} of {} rows counted in source; rows changed during the read",
                rows.len(),
                source_desc.row_count
            )
        });

        if rows.is_empty() {
            return Ok(TableResult::empty(table, "no rows in source"));
        }
        if job.dry_run() {
            let result = TableResult::dry_run(table, rows.len() as u64);
            return Ok(match short_read {
                Some(warning) => result.warn(warning),
                None => result,
            });
        }

        let anonymizer = self
            .settings
            .is_sensitive(table)
            .then_some(&self.anonymizer);
        let result = deliver_rows(
            self.target.store(),
            &target_desc,
            table,
            rows,
            self.settings,
            job.batch_size(),
            anonymizer,
        )
        .await?;
        Ok(match short_read {
            Some(warning) => result.warn(warning),
            None => result,
        })
    }
}

/// Shapes rows onto the target's known columns, anonymizes them when asked,
/// and writes them with the table's strategy. Shared by clone and restore.
pub async fn deliver_rows(
    target: &dyn TableStore,
    target_desc: &TableDescriptor,
    table: &str,
    rows: Vec<Row>,
    settings: &CloneSettings,
    batch_size: usize,
    anonymizer: Option<&Anonymizer>,
) -> Result<TableResult> {
    let mut warnings = Vec::new();

    let (shaped, dropped) = shape_rows(rows, &target_desc.column_names());
    if !dropped.is_empty() {
        let dropped: Vec<&str> = dropped.iter().map(String::as_str).collect();
        warnings.push(format!("columns absent in target dropped: {}", dropped.join(", ")));
    }
    if target_desc.structure_unknown() {
        warnings.push("target table is empty, columns could not be checked".to_string());
    }

    let read = shaped.len();
    let rows = match anonymizer {
        Some(anonymizer) => anonymizer.apply(table, shaped),
        None => shaped,
    };
    if rows.len() < read {
        warnings.push(format!("{} row(s) withheld by anonymization", read - rows.len()));
    }

    let strategy = if settings.uses_upsert(table) {
        WriteStrategy::Upsert {
            conflict_key: conflict_key(&settings.key_column, target_desc, &rows),
        }
    } else {
        WriteStrategy::Replace
    };
    let outcome = write_rows(target, table, &rows, &strategy, batch_size, &settings.key_column)
        .await
        .map_err(|e| AppError::table(table, e))?;

    let mut result = if outcome.all_failed() {
        TableResult::error(
            table,
            outcome
                .first_error
                .clone()
                .unwrap_or_else(|| "every batch failed".to_string()),
        )
    } else {
        TableResult::success(table, outcome.written as u64)
    };
    result.failed_records = outcome.failed as u64;
    result.warnings.extend(warnings);
    result.warnings.extend(outcome.warnings);
    Ok(result)
}

/// The configured key when the table has it, otherwise the first column.
fn conflict_key(key_column: &str, target_desc: &TableDescriptor, rows: &[Row]) -> String {
    let has_key = target_desc.column(key_column).is_some()
        || rows.first().is_some_and(|r| r.contains_key(key_column));
    if has_key {
        return key_column.to_string();
    }
    let mut columns: Vec<_> = target_desc.columns.iter().collect();
    columns.sort_by_key(|c| c.position);
    columns
        .first()
        .map(|c| c.name.clone())
        .or_else(|| rows.first().and_then(|r| r.keys().next().cloned()))
        .unwrap_or_else(|| key_column.to_string())
}

fn print_table_result(result: &TableResult) {
    match result.status {
        TableStatus::Error => println!(
            "{} {}: {}",
            result.status.icon(),
            result.table,
            result.error.as_deref().unwrap_or("failed")
        ),
        TableStatus::Empty => println!(
            "{} {}: nothing to copy ({})",
            result.status.icon(),
            result.table,
            result.warnings.join("; ")
        ),
        TableStatus::DryRun => println!(
            "{} {}: would copy {} records",
            result.status.icon(),
            result.table,
            result.records
        ),
        TableStatus::Success if result.failed_records > 0 => println!(
            "⚠️ {}: {} records copied, {} failed",
            result.table, result.records, result.failed_records
        ),
        TableStatus::Success => println!(
            "{} {}: {} records copied",
            result.status.icon(),
            result.table,
            result.records
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clone::anonymize::is_credential_column;
    use crate::clone::job::CloneOptions;
    use crate::environment::EnvName;
    use crate::store::memory::{row, Call, MemoryStore};
    use serde_json::json;
    use std::sync::Arc;

    fn env(name: EnvName, store: &Arc<MemoryStore>) -> Environment {
        let store: Arc<dyn TableStore> = store.clone();
        Environment::new(name, &format!("https://{}.supabase.co", name), store)
    }

    fn settings(tables: &[&str]) -> CloneSettings {
        CloneSettings {
            table_order: tables.iter().map(|t| t.to_string()).collect(),
            preflight_tables: Vec::new(),
            ..CloneSettings::default()
        }
    }

    fn job(tables: &[&str], dry_run: bool, settings: &CloneSettings) -> CloneJob {
        let options = CloneOptions {
            tables: Some(tables.iter().map(|t| t.to_string()).collect()),
            dry_run,
            ..Default::default()
        };
        CloneJob::new(EnvName::Prod, EnvName::Test, options, settings).unwrap()
    }

    fn currencies() -> Vec<Row> {
        vec![
            row(json!({ "id": 1, "code": "DZD", "name": "Dinar" })),
            row(json!({ "id": 2, "code": "EUR", "name": "Euro" })),
            row(json!({ "id": 3, "code": "USD", "name": "Dollar" })),
        ]
    }

    #[tokio::test]
    async fn test_upsert_without_id_keys_on_first_column() {
        let target = MemoryStore::new().with_table(
            "settings",
            vec![row(json!({ "name": "theme", "value": "dark" }))],
        );
        let target_desc = inspect(&target, "settings").await.unwrap();
        let settings = CloneSettings::default();

        let result = deliver_rows(
            &target,
            &target_desc,
            "settings",
            vec![row(json!({ "name": "theme", "value": "light" }))],
            &settings,
            settings.batch_size,
            None,
        )
        .await
        .unwrap();

        assert_eq!(result.status, TableStatus::Success);
        assert_eq!(target.rows("settings"), vec![row(json!({ "name": "theme", "value": "light" }))]);
        assert!(!target.calls().contains(&Call::DeleteAll("settings".to_string())));
    }

    #[tokio::test]
    async fn test_clone_reads_past_server_row_cap() {
        let source = Arc::new(
            MemoryStore::new()
                .with_table("currencies", currencies())
                .with_max_rows(2),
        );
        let target = Arc::new(MemoryStore::new().with_table("currencies", vec![row(json!({ "id": 9, "code": "GBP", "name": "Pound" }))]));
        let (src, tgt) = (env(EnvName::Prod, &source), env(EnvName::Test, &target));
        let settings = settings(&["currencies"]);

        let report = DataCloner::new(&src, &tgt, &settings)
            .run(&job(&["currencies"], false, &settings))
            .await;

        let result = report.result("currencies").unwrap();
        assert_eq!(result.status, TableStatus::Success);
        assert_eq!(result.records, 3);
        assert!(result.warnings.is_empty());
        assert_eq!(target.rows("currencies"), currencies());
    }

    #[tokio::test]
    async fn test_clone_into_empty_target_table() {
        let source = Arc::new(MemoryStore::new().with_table("currencies", currencies()));
        let target = Arc::new(MemoryStore::new().with_schema("currencies", &["id", "code", "name"], vec![]));
        let (src, tgt) = (env(EnvName::Prod, &source), env(EnvName::Test, &target));
        let settings = settings(&["currencies"]);

        let report = DataCloner::new(&src, &tgt, &settings)
            .run(&job(&["currencies"], false, &settings))
            .await;

        let result = report.result("currencies").unwrap();
        assert_eq!(result.status, TableStatus::Success);
        assert_eq!(result.records, 3);
        assert_eq!(target.rows("currencies"), currencies());
    }

    #[tokio::test]
    async fn test_missing_target_table_is_empty_and_run_continues() {
        let source = Arc::new(
            MemoryStore::new()
                .with_table("zone_areas", vec![row(json!({ "id": 1, "name": "North" }))])
                .with_table("currencies", currencies()),
        );
        let target = Arc::new(MemoryStore::new().with_table("currencies", vec![]));
        let (src, tgt) = (env(EnvName::Prod, &source), env(EnvName::Test, &target));
        let settings = settings(&["zone_areas", "currencies"]);

        let report = DataCloner::new(&src, &tgt, &settings)
            .run(&job(&["zone_areas", "currencies"], false, &settings))
            .await;

        let zones = report.result("zone_areas").unwrap();
        assert_eq!(zones.status, TableStatus::Empty);
        assert_eq!(zones.records, 0);
        assert_eq!(report.result("currencies").unwrap().status, TableStatus::Success);
        assert_eq!(target.rows("currencies").len(), 3);
    }

    #[tokio::test]
    async fn test_dry_run_reads_everything_and_writes_nothing() {
        let rows: Vec<Row> = (0..5000).map(|i| row(json!({ "id": i, "name": format!("loft {}", i) }))).collect();
        let existing = vec![row(json!({ "id": 1, "name": "kept" }))];
        let source = Arc::new(MemoryStore::new().with_table("lofts", rows));
        let target = Arc::new(MemoryStore::new().with_table("lofts", existing.clone()));
        let (src, tgt) = (env(EnvName::Prod, &source), env(EnvName::Test, &target));
        let settings = settings(&["lofts"]);

        let report = DataCloner::new(&src, &tgt, &settings)
            .run(&job(&["lofts"], true, &settings))
            .await;

        let result = report.result("lofts").unwrap();
        assert_eq!(result.status, TableStatus::DryRun);
        assert_eq!(result.records, 5000);
        assert_eq!(source.page_requests("lofts", 1000), 5);
        assert_eq!(target.rows("lofts"), existing);
        assert!(target.calls().iter().all(|c| matches!(c, Call::Count(_) | Call::Select { .. })));
    }

    #[tokio::test]
    async fn test_rows_are_shaped_to_target_columns() {
        let source = Arc::new(MemoryStore::new().with_table(
            "lofts",
            vec![
                row(json!({ "id": 1, "name": "A", "tv_subscription": "x" })),
                row(json!({ "id": 2, "name": "B", "tv_subscription": "y" })),
            ],
        ));
        let target = Arc::new(MemoryStore::new().with_schema(
            "lofts",
            &["id", "name"],
            vec![row(json!({ "id": 9, "name": "old" }))],
        ));
        let (src, tgt) = (env(EnvName::Prod, &source), env(EnvName::Test, &target));
        let settings = settings(&["lofts"]);

        let report = DataCloner::new(&src, &tgt, &settings)
            .run(&job(&["lofts"], false, &settings))
            .await;

        let result = report.result("lofts").unwrap();
        assert_eq!(result.status, TableStatus::Success);
        assert!(result.warnings.iter().any(|w| w.contains("tv_subscription")));
        for stored in target.rows("lofts") {
            assert!(stored.keys().all(|k| k == "id" || k == "name"));
        }
        assert_eq!(target.rows("lofts").len(), 2);
    }

    #[tokio::test]
    async fn test_sensitive_tables_are_anonymized() {
        let source = Arc::new(
            MemoryStore::new()
                .with_table(
                    "profiles",
                    vec![row(json!({
                        "id": "a1", "email": "boss@example.com", "full_name": "Boss",
                        "airbnb_access_token": "t1", "updated_at": "2024-01-01T00:00:00+00:00"
                    }))],
                )
                .with_table("user_sessions", vec![row(json!({ "id": 1, "session_token": "s" }))]),
        );
        let target = Arc::new(
            MemoryStore::new()
                .with_table(
                    "profiles",
                    vec![row(json!({
                        "id": "z9", "email": "old@test.local", "full_name": "Old",
                        "airbnb_access_token": null, "updated_at": "2024-01-01T00:00:00+00:00"
                    }))],
                )
                .with_table("user_sessions", vec![row(json!({ "id": 5, "session_token": "old" }))]),
        );
        let (src, tgt) = (env(EnvName::Prod, &source), env(EnvName::Test, &target));
        let settings = settings(&[]);

        let report = DataCloner::new(&src, &tgt, &settings)
            .run(&job(&["profiles", "user_sessions"], false, &settings))
            .await;

        assert_eq!(report.result("profiles").unwrap().status, TableStatus::Success);
        let profile = target
            .rows("profiles")
            .into_iter()
            .find(|r| r["id"] == json!("a1"))
            .unwrap();
        assert_ne!(profile["email"], json!("boss@example.com"));
        assert!(profile["email"].as_str().unwrap().ends_with("@test.local"));
        for (column, value) in &profile {
            if is_credential_column(column) {
                assert!(value.is_null());
            }
        }

        let sessions = report.result("user_sessions").unwrap();
        assert_eq!(sessions.status, TableStatus::Success);
        assert_eq!(sessions.records, 0);
        assert!(target.rows("user_sessions").is_empty());
    }

    #[tokio::test]
    async fn test_upsert_tables_are_never_cleared() {
        let source = Arc::new(MemoryStore::new().with_table("settings", vec![row(json!({ "id": 1, "value": "new" }))]));
        let target = Arc::new(MemoryStore::new().with_table(
            "settings",
            vec![row(json!({ "id": 1, "value": "old" })), row(json!({ "id": 2, "value": "local" }))],
        ));
        let (src, tgt) = (env(EnvName::Prod, &source), env(EnvName::Test, &target));
        let settings = settings(&["settings"]);

        DataCloner::new(&src, &tgt, &settings)
            .run(&job(&["settings"], false, &settings))
            .await;

        assert!(!target.calls().iter().any(|c| matches!(c, Call::DeleteAll(_))));
        let rows = target.rows("settings");
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["value"], json!("new"));
    }

    #[tokio::test]
    async fn test_failing_table_does_not_stop_later_tables() {
        let source = Arc::new(
            MemoryStore::new()
                .with_table("transactions", vec![row(json!({ "id": 1, "amount": 10 }))])
                .with_table("currencies", currencies()),
        );
        let target = Arc::new(
            MemoryStore::new()
                .with_table("transactions", vec![])
                .with_table("currencies", vec![])
                .fail_inserts_for("transactions"),
        );
        let (src, tgt) = (env(EnvName::Prod, &source), env(EnvName::Test, &target));
        let settings = settings(&["transactions", "currencies"]);

        let report = DataCloner::new(&src, &tgt, &settings)
            .run(&job(&["transactions", "currencies"], false, &settings))
            .await;

        let failed = report.result("transactions").unwrap();
        assert_eq!(failed.status, TableStatus::Error);
        assert_eq!(failed.failed_records, 1);
        assert!(failed.error.as_ref().unwrap().contains("foreign key"));
        assert_eq!(report.result("currencies").unwrap().status, TableStatus::Success);
        assert_eq!(report.summary().failed, 1);
    }

    #[tokio::test]
    async fn test_partial_batch_failure_is_success_with_warnings() {
        let mut rows: Vec<Row> = (0..4).map(|i| row(json!({ "id": i, "name": "ok" }))).collect();
        rows.push(row(json!({ "id": 4, "name": "bad", "legacy": true })));
        let source = Arc::new(MemoryStore::new().with_table("tasks", rows));
        // Target is empty, so shaping cannot drop the unknown column.
        let target = Arc::new(MemoryStore::new().with_schema("tasks", &["id", "name"], vec![]));
        let (src, tgt) = (env(EnvName::Prod, &source), env(EnvName::Test, &target));
        let settings = CloneSettings { batch_size: 2, ..settings(&["tasks"]) };

        let report = DataCloner::new(&src, &tgt, &settings)
            .run(&job(&["tasks"], false, &settings))
            .await;

        let result = report.result("tasks").unwrap();
        assert_eq!(result.status, TableStatus::Success);
        assert_eq!(result.records, 4);
        assert_eq!(result.failed_records, 1);
        assert!(result.warnings.iter().any(|w| w.starts_with("batch 3")));
    }

    #[tokio::test]
    async fn test_unreachable_target_marks_every_table_without_contact() {
        let source = Arc::new(MemoryStore::new().with_table("currencies", currencies()));
        let target = Arc::new(MemoryStore::new().unreachable("connection refused"));
        let src = env(EnvName::Prod, &source);
        let mut tgt = env(EnvName::Test, &target);
        tgt.test_connection("profiles").await;
        let calls_before = target.calls().len();
        let settings = settings(&["currencies", "lofts"]);

        let report = DataCloner::new(&src, &tgt, &settings)
            .run(&job(&["currencies", "lofts"], false, &settings))
            .await;

        assert_eq!(report.tables.len(), 2);
        assert!(report.tables.iter().all(|r| r.status == TableStatus::Error));
        assert!(source.calls().is_empty());
        assert_eq!(target.calls().len(), calls_before);
    }

    #[tokio::test]
    async fn test_preflight_reports_missing_tables() {
        let source = Arc::new(MemoryStore::new().with_table("profiles", vec![]));
        let target = Arc::new(MemoryStore::new());
        let (src, tgt) = (env(EnvName::Prod, &source), env(EnvName::Test, &target));
        let settings = CloneSettings {
            preflight_tables: vec!["profiles".to_string()],
            ..CloneSettings::default()
        };

        let warnings = DataCloner::new(&src, &tgt, &settings).preflight().await;
        assert_eq!(warnings, vec!["profiles is missing in test".to_string()]);
    }
}
