// envclone/src/sync/mod.rs
pub(crate) mod logic;
pub(crate) mod sql;

use anyhow::{Context, Result};
use chrono::Utc;
use serde::Serialize;

use crate::clone::loaded;
use crate::config::AppConfig;
use crate::environment::{EnvName, EnvironmentRegistry};
use crate::errors::AppError;
use crate::utils::{file_timestamp, write_artifact, write_json_artifact};

pub use logic::{analyze_master_schema, diff_against, SyncResult};

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SyncRunReport<'a> {
    generated_at: chrono::DateTime<Utc>,
    source: String,
    master_tables: Vec<MasterTableSummary>,
    master_errors: &'a [String],
    results: &'a [SyncResult],
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct MasterTableSummary {
    table: String,
    exists: bool,
    columns: usize,
    row_count: u64,
}

/// Public entry point for the `sync` command. With no arguments prod is the
/// master and every other loaded environment a target; one argument picks
/// the master; two pick master and target. SQL is written, never executed.
pub async fn run_sync_flow(
    app_config: &AppConfig,
    registry: &mut EnvironmentRegistry,
    source: Option<EnvName>,
    target: Option<EnvName>,
) -> Result<Vec<SyncResult>> {
    let source = source.unwrap_or(EnvName::Prod);
    let targets: Vec<EnvName> = match target {
        Some(t) if t == source => {
            return Err(AppError::InvalidInput(format!(
                "source and target are both {}; nothing to compare",
                source
            ))
            .into());
        }
        Some(t) => {
            registry.connect(&[source, t], &app_config.check_table).await?;
            vec![t]
        }
        None => {
            registry.connect(&[source], &app_config.check_table).await?;
            let mut others = Vec::new();
            for name in EnvName::ALL.into_iter().filter(|n| *n != source) {
                if !registry.env_file_path(name).exists() {
                    continue;
                }
                match registry.load(name) {
                    Ok(_) => others.push(name),
                    Err(e) => println!("⚠️ {} skipped: {}", name, e),
                }
            }
            registry.connect(&others, &app_config.check_table).await?;
            others
        }
    };

    let source_env = loaded(registry, source)?;
    if !source_env.is_connected() {
        return Err(source_env.connectivity_error().into());
    }
    if targets.is_empty() {
        println!("ℹ️ No other environment configured; nothing to sync against {}", source);
    }

    println!("🔍 Analyzing master schema in {}...", source);
    let (master, master_errors) =
        analyze_master_schema(source_env.store(), &app_config.expected_tables).await;
    for e in &master_errors {
        println!("  ❌ {}", e);
    }
    println!(
        "  {} of {} expected tables present",
        master.iter().filter(|t| t.exists).count(),
        app_config.expected_tables.len()
    );

    let generated_at = Utc::now();
    let ts = file_timestamp(&generated_at);
    let mut results = Vec::new();
    for name in targets {
        let target_env = loaded(registry, name)?;
        let result = if target_env.is_connected() {
            let result = diff_against(
                source.as_str(),
                &master,
                name.as_str(),
                target_env.store(),
                generated_at,
            )
            .await;
            let path = write_artifact(
                &app_config.report_dir,
                &format!("sync_to_{}_{}.sql", name, ts),
                &result.sql_script,
            )
            .with_context(|| format!("Failed to write SQL script for {}", name))?;
            println!("📝 SQL for {} written to {}", name, path.display());
            result
        } else {
            SyncResult {
                environment: name.to_string(),
                source: source.to_string(),
                errors: vec![target_env.connectivity_error().to_string()],
                ..Default::default()
            }
        };
        logic::print_sync_result(&result);
        results.push(result);
    }

    let report = SyncRunReport {
        generated_at,
        source: source.to_string(),
        master_tables: master
            .iter()
            .map(|t| MasterTableSummary {
                table: t.name.clone(),
                exists: t.exists,
                columns: t.columns.len(),
                row_count: t.row_count,
            })
            .collect(),
        master_errors: &master_errors,
        results: &results,
    };
    let path = write_json_artifact(
        &app_config.report_dir,
        &format!("schema_sync_report_{}.json", ts),
        &report,
    )
    .context("Failed to write schema sync report")?;
    println!("📝 Sync report written to {}", path.display());
    println!("👉 Review each script, then apply it manually in the target's SQL editor.");
    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RawJsonConfig;

    #[tokio::test]
    async fn test_same_source_and_target_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let config = AppConfig::from_raw(RawJsonConfig::default()).unwrap();
        let mut registry = EnvironmentRegistry::new(dir.path(), config.request_timeout);
        let err = run_sync_flow(&config, &mut registry, Some(EnvName::Test), Some(EnvName::Test))
            .await
            .unwrap_err();
        assert!(matches!(err.downcast_ref::<AppError>(), Some(AppError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn test_missing_master_env_file_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let config = AppConfig::from_raw(RawJsonConfig::default()).unwrap();
        let mut registry = EnvironmentRegistry::new(dir.path(), config.request_timeout);
        let err = run_sync_flow(&config, &mut registry, None, None).await.unwrap_err();
        assert!(matches!(err.downcast_ref::<AppError>(), Some(AppError::Config(_))));
    }
}
