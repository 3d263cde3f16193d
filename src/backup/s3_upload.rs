// envclone/src/backup/s3_upload.rs
use anyhow::{Context, Result};
use aws_sdk_s3 as s3;
use s3::config::Region;
use s3::primitives::ByteStream;
use std::path::Path;

use crate::config::SpacesConfig;

/// S3 client for the configured S3-compatible storage.
pub(crate) async fn spaces_client(spaces_config: &SpacesConfig) -> s3::Client {
    let sdk_config = aws_config::defaults(s3::config::BehaviorVersion::latest())
        .endpoint_url(&spaces_config.endpoint_url)
        .region(Region::new(spaces_config.region.clone()))
        .credentials_provider(s3::config::Credentials::new(
            &spaces_config.access_key_id,
            &spaces_config.secret_access_key,
            None,
            None,
            "Static",
        ))
        .load()
        .await;
    s3::Client::new(&sdk_config)
}

/// Object key for an archive: `<folder_prefix>/<file name>`.
pub fn object_key(spaces_config: &SpacesConfig, file_name: &str) -> String {
    match spaces_config.folder_prefix.as_deref().map(|p| p.trim_matches('/')) {
        Some(prefix) if !prefix.is_empty() => format!("{}/{}", prefix, file_name),
        _ => file_name.to_string(),
    }
}

/// Uploads a snapshot archive; returns its `s3://` URI.
pub async fn upload_file_to_s3(
    spaces_config: &SpacesConfig,
    file_path: &Path,
    s3_key: &str,
) -> Result<String> {
    println!(
        "☁️ Uploading {} to bucket {} as {}",
        file_path.display(),
        spaces_config.bucket_name,
        s3_key
    );

    let client = spaces_client(spaces_config).await;
    let body = ByteStream::from_path(file_path)
        .await
        .with_context(|| format!("Failed to read {} for upload", file_path.display()))?;

    client
        .put_object()
        .bucket(&spaces_config.bucket_name)
        .key(s3_key)
        .body(body)
        .send()
        .await
        .with_context(|| {
            format!(
                "Failed to upload {} to bucket {} with key {}",
                file_path.display(),
                spaces_config.bucket_name,
                s3_key
            )
        })?;

    let uri = format!("s3://{}/{}", spaces_config.bucket_name, s3_key);
    println!("✅ Uploaded snapshot to {}", uri);
    Ok(uri)
}
