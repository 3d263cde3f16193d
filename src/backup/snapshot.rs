// envclone/src/backup/snapshot.rs
//! JSON table snapshots: one `<table>.json` array per table plus a
//! `manifest.json` listing the tables in restore order.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::inspect::{fetch_all_rows, inspect};
use crate::store::{Row, TableStore};

pub const MANIFEST_FILE: &str = "manifest.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestEntry {
    pub table: String,
    pub rows: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotManifest {
    pub environment: String,
    pub created_at: DateTime<Utc>,
    pub tables: Vec<ManifestEntry>,
}

/// Table names become file names, so only plain identifiers are accepted.
fn check_table_name(table: &str) -> Result<()> {
    if table.is_empty() || !table.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        anyhow::bail!("Refusing to use '{}' as a snapshot table name", table);
    }
    Ok(())
}

/// Dumps every existing table of `tables` into `dir`. Missing tables are
/// left out of the manifest.
pub async fn write_snapshot(
    store: &dyn TableStore,
    environment: &str,
    tables: &[String],
    page_size: usize,
    dir: &Path,
) -> Result<SnapshotManifest> {
    let mut manifest = SnapshotManifest {
        environment: environment.to_string(),
        created_at: Utc::now(),
        tables: Vec::new(),
    };

    for table in tables {
        check_table_name(table)?;
        let descriptor = inspect(store, table)
            .await
            .with_context(|| format!("Failed to inspect {} in {}", table, environment))?;
        if !descriptor.exists {
            println!("  ℹ️ {} not present in {}, skipped", table, environment);
            continue;
        }

        let rows = fetch_all_rows(store, table, page_size, Some(descriptor.row_count))
            .await
            .with_context(|| format!("Failed to read {} from {}", table, environment))?;
        let path = dir.join(format!("{}.json", table));
        let content = serde_json::to_vec(&rows)
            .with_context(|| format!("Failed to serialize rows of {}", table))?;
        fs::write(&path, content)
            .with_context(|| format!("Failed to write snapshot file {}", path.display()))?;

        println!("  ✓ {}: {} rows", table, rows.len());
        manifest.tables.push(ManifestEntry {
            table: table.clone(),
            rows: rows.len() as u64,
        });
    }

    let manifest_path = dir.join(MANIFEST_FILE);
    let content = serde_json::to_string_pretty(&manifest).context("Failed to serialize manifest")?;
    fs::write(&manifest_path, content)
        .with_context(|| format!("Failed to write {}", manifest_path.display()))?;
    Ok(manifest)
}

pub fn read_manifest(dir: &Path) -> Result<SnapshotManifest> {
    let path = dir.join(MANIFEST_FILE);
    let content = fs::read_to_string(&path)
        .with_context(|| format!("Snapshot manifest not found at {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("Invalid snapshot manifest {}", path.display()))
}

pub fn read_table_rows(dir: &Path, table: &str) -> Result<Vec<Row>> {
    check_table_name(table)?;
    let path = dir.join(format!("{}.json", table));
    let content = fs::read(&path)
        .with_context(|| format!("Snapshot file missing for {}: {}", table, path.display()))?;
    serde_json::from_slice(&content).with_context(|| format!("Invalid snapshot file {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::{row, MemoryStore};
    use serde_json::json;

    #[tokio::test]
    async fn test_snapshot_writes_tables_and_manifest() -> anyhow::Result<()> {
        let store = MemoryStore::new()
            .with_table("currencies", vec![row(json!({ "id": 1, "code": "DZD" }))])
            .with_table("settings", vec![]);
        let dir = tempfile::tempdir()?;
        let tables = vec!["currencies".to_string(), "zone_areas".to_string(), "settings".to_string()];

        let manifest = write_snapshot(&store, "test", &tables, 1000, dir.path()).await?;
        assert_eq!(
            manifest.tables,
            vec![
                ManifestEntry { table: "currencies".to_string(), rows: 1 },
                ManifestEntry { table: "settings".to_string(), rows: 0 },
            ]
        );
        assert_eq!(read_manifest(dir.path())?, manifest);
        assert_eq!(read_table_rows(dir.path(), "currencies")?, store.rows("currencies"));
        assert!(!dir.path().join("zone_areas.json").exists());
        Ok(())
    }

    #[test]
    fn test_table_names_are_checked() {
        let dir = tempfile::tempdir().unwrap();
        assert!(read_table_rows(dir.path(), "../etc/passwd").is_err());
        assert!(check_table_name("team_members").is_ok());
    }
}
