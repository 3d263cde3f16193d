// envclone/src/restore/s3_download.rs
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tokio::fs::File;
use tokio::io::AsyncWriteExt;

use crate::backup::s3_upload::spaces_client;
use crate::config::SpacesConfig;

/// Splits `s3://bucket/key` into bucket and key.
pub fn parse_s3_uri(s3_uri: &str) -> Result<(String, String)> {
    let uri = url::Url::parse(s3_uri).with_context(|| format!("Invalid S3 URI: {}", s3_uri))?;
    if uri.scheme() != "s3" {
        anyhow::bail!("S3 URI must start with s3://");
    }
    let bucket = uri.host_str().context("S3 URI is missing the bucket name")?.to_string();
    let key = uri.path().trim_start_matches('/').to_string();
    if key.is_empty() {
        anyhow::bail!("S3 URI is missing the object key");
    }
    Ok((bucket, key))
}

/// Streams an archive from S3-compatible storage to `destination_path`.
pub async fn download_file_from_s3(
    spaces_config: &SpacesConfig,
    s3_bucket: &str,
    s3_key: &str,
    destination_path: &Path,
) -> Result<PathBuf> {
    println!("☁️ Downloading s3://{}/{}", s3_bucket, s3_key);

    if let Some(parent_dir) = destination_path.parent() {
        tokio::fs::create_dir_all(parent_dir)
            .await
            .with_context(|| format!("Failed to create {}", parent_dir.display()))?;
    }

    let client = spaces_client(spaces_config).await;
    let mut object = client
        .get_object()
        .bucket(s3_bucket)
        .key(s3_key)
        .send()
        .await
        .with_context(|| format!("Failed to get object s3://{}/{}", s3_bucket, s3_key))?;

    let mut output_file = File::create(destination_path)
        .await
        .with_context(|| format!("Failed to create {}", destination_path.display()))?;

    let mut downloaded = 0usize;
    while let Some(chunk) = object
        .body
        .try_next()
        .await
        .with_context(|| format!("Failed while reading s3://{}/{}", s3_bucket, s3_key))?
    {
        output_file
            .write_all(&chunk)
            .await
            .with_context(|| format!("Failed to write {}", destination_path.display()))?;
        downloaded += chunk.len();
    }
    output_file
        .flush()
        .await
        .with_context(|| format!("Failed to flush {}", destination_path.display()))?;

    println!("✅ Downloaded {} bytes to {}", downloaded, destination_path.display());
    Ok(destination_path.to_path_buf())
}
