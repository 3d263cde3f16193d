// envclone/src/restore/logic.rs
use anyhow::Result;
use chrono::Utc;
use std::path::Path;
use tracing::warn;

use crate::backup::snapshot::{read_manifest, read_table_rows};
use crate::clone::logic::deliver_rows;
use crate::clone::report::{CloneReport, TableResult};
use crate::config::CloneSettings;
use crate::environment::Environment;
use crate::errors::AppError;
use crate::inspect::inspect;

/// Replays an extracted snapshot into `target` in manifest order, through the
/// same shaping and write path as a clone. Rows are written as archived, with
/// no anonymization.
pub async fn restore_snapshot(
    target: &Environment,
    settings: &CloneSettings,
    snapshot_dir: &Path,
    source_label: &str,
    only_tables: Option<&[String]>,
) -> Result<CloneReport> {
    let manifest = read_manifest(snapshot_dir)?;
    if manifest.environment != target.name.as_str() {
        println!(
            "⚠️ Snapshot was taken from {}, restoring into {}",
            manifest.environment, target.name
        );
    }

    let entries: Vec<_> = manifest
        .tables
        .iter()
        .filter(|e| only_tables.is_none_or(|list| list.contains(&e.table)))
        .collect();

    let mut report = CloneReport::new(source_label, target.name.as_str(), false, Utc::now());
    if !target.is_connected() {
        let message = target.connectivity_error().to_string();
        for entry in entries {
            report.push(TableResult::error(&entry.table, message.clone()));
        }
        report.finish(Utc::now());
        return Ok(report);
    }

    for entry in entries {
        println!("\n📋 {} ({} archived rows)", entry.table, entry.rows);
        let result = match restore_table(target, settings, snapshot_dir, &entry.table).await {
            Ok(result) => result,
            Err(e) => {
                warn!(table = %entry.table, error = %e, "table restore failed");
                TableResult::error(&entry.table, format!("{:#}", e))
            }
        };
        println!("{} {}: {} records", result.status.icon(), result.table, result.records);
        report.push(result);
    }
    report.finish(Utc::now());
    Ok(report)
}

async fn restore_table(
    target: &Environment,
    settings: &CloneSettings,
    snapshot_dir: &Path,
    table: &str,
) -> Result<TableResult> {
    let rows = read_table_rows(snapshot_dir, table)?;
    let target_desc = inspect(target.store(), table)
        .await
        .map_err(|e| AppError::table(table, e))?;
    if !target_desc.exists {
        return Ok(TableResult::empty(table, "table missing in target"));
    }
    Ok(deliver_rows(
        target.store(),
        &target_desc,
        table,
        rows,
        settings,
        settings.batch_size,
        None,
    )
    .await?)
}
