// envclone/src/diagnose/mod.rs
pub(crate) mod logic;

use anyhow::{Context, Result};

use crate::config::AppConfig;
use crate::environment::EnvironmentRegistry;
use crate::utils::{file_timestamp, write_json_artifact};

pub use logic::{diagnose, DiagnosisReport};

/// Public entry point for the `diagnose` command. Read-only: loads every
/// environment it can, checks their connections and reports drift between the connected ones.
pub async fn run_diagnose_flow(
    app_config: &AppConfig,
    registry: &mut EnvironmentRegistry,
) -> Result<DiagnosisReport> {
    println!("🔍 Loading environments from {}", app_config.env_dir.display());
    registry.load_all();
    registry.test_all(&app_config.check_table).await;

    let report = diagnose(registry, &app_config.expected_tables).await;
    logic::print_diagnosis(&report);

    let path = write_json_artifact(
        &app_config.report_dir,
        &format!("complete_sync_diagnosis_{}.json", file_timestamp(&report.timestamp)),
        &report,
    )
    .context("Failed to write diagnosis report")?;
    println!("📝 Diagnosis written to {}", path.display());
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RawJsonConfig;

    #[tokio::test]
    async fn test_diagnose_without_env_files_still_reports() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let mut config = AppConfig::from_raw(RawJsonConfig::default())?;
        config.env_dir = dir.path().to_path_buf();
        config.report_dir = dir.path().join("reports");
        let mut registry = EnvironmentRegistry::new(&config.env_dir, config.request_timeout);

        let report = run_diagnose_flow(&config, &mut registry).await?;
        assert_eq!(report.summary.connected_environments, 0);
        assert!(report.global_issues.iter().any(|i| i.contains("fewer than two")));
        assert_eq!(std::fs::read_dir(dir.path().join("reports"))?.count(), 1);
        Ok(())
    }
}
