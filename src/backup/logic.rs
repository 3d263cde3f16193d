// envclone/src/backup/logic.rs
use anyhow::{Context, Result};
use std::path::PathBuf;
use tempfile::Builder as TempDirBuilder;
use tracing::{info, warn};

use super::archive::create_tar_gz_archive;
use super::s3_upload::{object_key, upload_file_to_s3};
use super::snapshot::write_snapshot;
use crate::config::AppConfig;
use crate::environment::Environment;
use crate::utils::file_timestamp;

/// Snapshots `tables` of one environment into
/// `<backup_dir>/backup_<env>_<ts>.tar.gz` and uploads the archive when S3
/// storage is configured. A failed upload keeps the local archive.
pub async fn snapshot_environment(
    app_config: &AppConfig,
    environment: &Environment,
    tables: &[String],
) -> Result<PathBuf> {
    let temp_dir = TempDirBuilder::new()
        .prefix(&format!("envclone_snapshot_{}_", environment.name))
        .tempdir()
        .context("Failed to create temporary snapshot directory")?;

    let manifest = write_snapshot(
        environment.store(),
        environment.name.as_str(),
        tables,
        app_config.clone.page_size,
        temp_dir.path(),
    )
    .await?;

    let file_name = format!(
        "backup_{}_{}.tar.gz",
        environment.name,
        file_timestamp(&manifest.created_at)
    );
    let archive_path = create_tar_gz_archive(temp_dir.path(), &app_config.backup_dir.join(&file_name))?;
    let total_rows: u64 = manifest.tables.iter().map(|t| t.rows).sum();
    info!(
        environment = %environment.name,
        tables = manifest.tables.len(),
        rows = total_rows,
        archive = %archive_path.display(),
        "snapshot archived"
    );

    if let Some(spaces_config) = &app_config.spaces_config {
        let key = object_key(spaces_config, &file_name);
        if let Err(e) = upload_file_to_s3(spaces_config, &archive_path, &key).await {
            warn!(error = %e, "snapshot upload failed");
            println!("⚠️ Upload failed, archive kept locally: {:#}", e);
        }
    }

    println!(
        "💾 Snapshot of {} done: {} table(s), {} rows at {}",
        environment.name,
        manifest.tables.len(),
        total_rows,
        archive_path.display()
    );
    Ok(archive_path)
}
