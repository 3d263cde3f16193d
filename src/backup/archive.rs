// envclone/src/backup/archive.rs
use anyhow::{Context, Result};
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs::File;
use std::path::{Path, PathBuf};
use tar::Builder;
use walkdir::WalkDir;

/// Packs the snapshot files of `source_dir` into a `.tar.gz` at
/// `archive_dest_path`, with paths relative to `source_dir`.
pub fn create_tar_gz_archive(source_dir: &Path, archive_dest_path: &Path) -> Result<PathBuf> {
    if !source_dir.is_dir() {
        anyhow::bail!("Snapshot directory is not a directory: {}", source_dir.display());
    }
    if let Some(parent) = archive_dest_path.parent() {
        std::fs::create_dir_all(parent).with_context(|| {
            format!("Failed to create backup directory: {}", parent.display())
        })?;
    }

    let archive_file = File::create(archive_dest_path).with_context(|| {
        format!("Failed to create archive file: {}", archive_dest_path.display())
    })?;
    let mut tar_builder = Builder::new(GzEncoder::new(archive_file, Compression::default()));

    // Snapshots are flat: only the files directly inside the directory.
    for entry in WalkDir::new(source_dir).min_depth(1).max_depth(1).sort_by_file_name() {
        let entry = entry.with_context(|| format!("Failed to walk {}", source_dir.display()))?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let name = path.strip_prefix(source_dir).with_context(|| {
            format!("Failed to strip prefix {} from {}", source_dir.display(), path.display())
        })?;
        tar_builder.append_path_with_name(path, name).with_context(|| {
            format!("Failed to add {} to archive", path.display())
        })?;
    }

    let encoder = tar_builder.into_inner().with_context(|| {
        format!("Failed to finish tar stream for {}", archive_dest_path.display())
    })?;
    encoder.finish().with_context(|| {
        format!("Failed to finish gzip stream for {}", archive_dest_path.display())
    })?;

    println!("✓ Snapshot archive created at {}", archive_dest_path.display());
    Ok(archive_dest_path.to_path_buf())
}

/// Unpacks a snapshot archive into `extract_to_dir`.
pub fn extract_tar_gz_archive(archive_path: &Path, extract_to_dir: &Path) -> Result<PathBuf> {
    if !archive_path.is_file() {
        anyhow::bail!("Snapshot archive not found: {}", archive_path.display());
    }
    std::fs::create_dir_all(extract_to_dir).with_context(|| {
        format!("Failed to create extraction directory: {}", extract_to_dir.display())
    })?;

    let archive_file = File::open(archive_path)
        .with_context(|| format!("Failed to open archive: {}", archive_path.display()))?;
    let mut archive = tar::Archive::new(flate2::read::GzDecoder::new(archive_file));
    archive.unpack(extract_to_dir).with_context(|| {
        format!(
            "Failed to unpack {} into {}",
            archive_path.display(),
            extract_to_dir.display()
        )
    })?;

    println!("✓ Snapshot archive extracted to {}", extract_to_dir.display());
    Ok(extract_to_dir.to_path_buf())
}
