// envclone/src/restore/mod.rs
mod logic;
pub(crate) mod s3_download;

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tempfile::Builder as TempDirBuilder;

use crate::backup::archive::extract_tar_gz_archive;
use crate::clone::{ensure_writable_target, loaded, CloneReport};
use crate::config::AppConfig;
use crate::environment::{EnvName, EnvironmentRegistry};
use crate::errors::AppError;
use crate::utils::confirm;

pub use logic::restore_snapshot;

/// Public entry point for the `restore` command. `archive` is a local path or
/// an `s3://bucket/key` URI.
pub async fn run_restore_flow(
    app_config: &AppConfig,
    registry: &mut EnvironmentRegistry,
    archive: &str,
    target: EnvName,
    tables: Option<Vec<String>>,
    assume_yes: bool,
) -> Result<CloneReport> {
    ensure_writable_target(target)?;
    registry.load(target)?;
    if archive.starts_with("s3://") && app_config.spaces_config.is_none() {
        return Err(AppError::Config(
            "restoring from s3:// requires s3_storage in config.json".to_string(),
        )
        .into());
    }

    if !assume_yes {
        let prompt = format!("⚠️ Restoring {} will replace data in {}. Continue?", archive, target);
        if !confirm(&prompt, "yes")? {
            return Err(AppError::Cancelled(format!("restore into {} declined", target)).into());
        }
    }

    let work_dir = TempDirBuilder::new()
        .prefix("envclone_restore_")
        .tempdir()
        .context("Failed to create temporary restore directory")?;

    let archive_path = match (archive.strip_prefix("s3://"), &app_config.spaces_config) {
        (Some(_), Some(spaces_config)) => {
            let (bucket, key) = s3_download::parse_s3_uri(archive)?;
            let file_name = Path::new(&key)
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_else(|| "snapshot.tar.gz".to_string());
            s3_download::download_file_from_s3(spaces_config, &bucket, &key, &work_dir.path().join(file_name))
                .await?
        }
        _ => PathBuf::from(archive),
    };

    let extracted = extract_tar_gz_archive(&archive_path, &work_dir.path().join("extracted"))?;
    let label = format!(
        "archive:{}",
        archive_path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| archive.to_string())
    );

    registry.connect(&[target], &app_config.check_table).await?;
    let target_env = loaded(registry, target)?;
    let report = restore_snapshot(
        target_env,
        &app_config.clone,
        &extracted,
        &label,
        tables.as_deref(),
    )
    .await?;

    report.print_summary();
    let path = report
        .save_json(&app_config.report_dir)
        .context("Failed to save restore report")?;
    println!("📝 Report written to {}", path.display());
    Ok(report)
}
