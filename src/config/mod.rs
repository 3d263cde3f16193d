// envclone/src/config/mod.rs
use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::utils::tables;

pub const DEFAULT_CONFIG_FILE: &str = "config.json";
const DEFAULT_PAGE_SIZE: usize = 1000;
const DEFAULT_BATCH_SIZE: usize = 500;
const DEFAULT_TIMEOUT_SECS: u64 = 30;

// Structs for deserializing config.json
#[derive(Debug, Clone, Deserialize)]
pub struct JsonS3StorageConfig {
    pub bucket_name: Option<String>,
    pub region: Option<String>,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    pub endpoint_url: Option<String>,
    pub folder_prefix: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawJsonConfig {
    pub env_dir: Option<PathBuf>,
    pub report_dir: Option<PathBuf>,
    pub backup_dir: Option<PathBuf>,
    pub log_dir: Option<PathBuf>,
    pub page_size: Option<usize>,
    pub batch_size: Option<usize>,
    pub request_timeout_secs: Option<u64>,
    pub check_table: Option<String>,
    pub table_order: Option<Vec<String>>,
    pub sensitive_tables: Option<Vec<String>>,
    pub upsert_tables: Option<Vec<String>>,
    pub preflight_tables: Option<Vec<String>>,
    pub expected_tables: Option<Vec<String>>,
    pub s3_storage: Option<JsonS3StorageConfig>,
}

// Application's internal configuration structs
#[derive(Clone)]
pub struct SpacesConfig {
    pub endpoint_url: String,
    pub region: String,
    pub access_key_id: String,
    pub secret_access_key: String,
    pub bucket_name: String,
    pub folder_prefix: Option<String>,
}

impl std::fmt::Debug for SpacesConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpacesConfig")
            .field("endpoint_url", &self.endpoint_url)
            .field("region", &self.region)
            .field("bucket_name", &self.bucket_name)
            .field("folder_prefix", &self.folder_prefix)
            .finish_non_exhaustive()
    }
}

/// Table lists and sizes shared by the cloner, backup and restore.
#[derive(Debug, Clone)]
pub struct CloneSettings {
    pub page_size: usize,
    pub batch_size: usize,
    /// Dependency-respecting order: referenced tables first.
    pub table_order: Vec<String>,
    pub sensitive_tables: Vec<String>,
    /// Written with upsert-by-key instead of delete + insert.
    pub upsert_tables: Vec<String>,
    pub preflight_tables: Vec<String>,
    pub key_column: String,
}

impl CloneSettings {
    pub fn is_sensitive(&self, table: &str) -> bool {
        self.sensitive_tables.iter().any(|t| t == table)
    }

    pub fn uses_upsert(&self, table: &str) -> bool {
        self.upsert_tables.iter().any(|t| t == table)
    }

    /// Every table a full clone touches: the base order then the sensitive tables.
    pub fn all_tables(&self) -> Vec<String> {
        let mut out = self.table_order.clone();
        for table in &self.sensitive_tables {
            if !out.contains(table) {
                out.push(table.clone());
            }
        }
        out
    }
}

impl Default for CloneSettings {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            batch_size: DEFAULT_BATCH_SIZE,
            table_order: tables::owned(tables::CLONE_ORDER),
            sensitive_tables: tables::owned(tables::SENSITIVE_TABLES),
            upsert_tables: tables::owned(tables::UPSERT_TABLES),
            preflight_tables: tables::owned(tables::PREFLIGHT_TABLES),
            key_column: "id".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub env_dir: PathBuf,
    pub report_dir: PathBuf,
    pub backup_dir: PathBuf,
    pub log_dir: PathBuf,
    pub request_timeout: Duration,
    pub check_table: String,
    pub expected_tables: Vec<String>,
    pub clone: CloneSettings,
    pub spaces_config: Option<SpacesConfig>,
}

impl AppConfig {
    /// Loads `config.json` when present. An explicitly requested file must
    /// exist; the default one is optional.
    pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
        match explicit_path {
            Some(path) => Self::load_from_json(path),
            None => {
                let default_path = Path::new(DEFAULT_CONFIG_FILE);
                if default_path.is_file() {
                    Self::load_from_json(default_path)
                } else {
                    Self::from_raw(RawJsonConfig::default())
                }
            }
        }
    }

    pub fn load_from_json(config_path: &Path) -> Result<Self> {
        let config_content = fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read config file at {}", config_path.display()))?;
        let raw_json_config: RawJsonConfig = serde_json::from_str(&config_content)
            .with_context(|| {
                format!(
                    "Failed to parse JSON from config file at {}",
                    config_path.display()
                )
            })?;
        Self::from_raw(raw_json_config)
    }

    pub fn from_raw(raw: RawJsonConfig) -> Result<Self> {
        let defaults = CloneSettings::default();

        let page_size = raw.page_size.unwrap_or(defaults.page_size);
        if page_size == 0 {
            anyhow::bail!("page_size must be greater than zero in config.json");
        }
        let batch_size = raw.batch_size.unwrap_or(defaults.batch_size);
        if batch_size == 0 {
            anyhow::bail!("batch_size must be greater than zero in config.json");
        }

        let table_order = non_empty_list(raw.table_order, "table_order")?
            .unwrap_or(defaults.table_order);

        let clone = CloneSettings {
            page_size,
            batch_size,
            table_order,
            sensitive_tables: raw.sensitive_tables.unwrap_or(defaults.sensitive_tables),
            upsert_tables: raw.upsert_tables.unwrap_or(defaults.upsert_tables),
            preflight_tables: raw.preflight_tables.unwrap_or(defaults.preflight_tables),
            key_column: defaults.key_column,
        };

        let expected_tables = non_empty_list(raw.expected_tables, "expected_tables")?
            .unwrap_or_else(|| tables::owned(tables::EXPECTED_TABLES));

        let spaces_config = raw.s3_storage.as_ref().and_then(spaces_from_raw);

        Ok(AppConfig {
            env_dir: raw.env_dir.unwrap_or_else(|| PathBuf::from(".")),
            report_dir: raw.report_dir.unwrap_or_else(|| PathBuf::from("./reports")),
            backup_dir: raw.backup_dir.unwrap_or_else(|| PathBuf::from("./backups")),
            log_dir: raw.log_dir.unwrap_or_else(|| PathBuf::from("./logs")),
            request_timeout: Duration::from_secs(
                raw.request_timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS),
            ),
            check_table: raw.check_table.unwrap_or_else(|| "profiles".to_string()),
            expected_tables,
            clone,
            spaces_config,
        })
    }
}

fn non_empty_list(list: Option<Vec<String>>, field: &str) -> Result<Option<Vec<String>>> {
    match list {
        Some(items) if items.iter().all(|t| t.trim().is_empty()) => {
            Err(anyhow::anyhow!("{} cannot be empty in config.json", field))
        }
        Some(items) => Ok(Some(
            items
                .into_iter()
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty())
                .collect(),
        )),
        None => Ok(None),
    }
}

fn spaces_from_raw(s3_raw: &JsonS3StorageConfig) -> Option<SpacesConfig> {
    if let (Some(bucket), Some(region), Some(key_id), Some(secret), Some(endpoint)) = (
        s3_raw.bucket_name.as_ref().filter(|s| !s.is_empty()),
        s3_raw.region.as_ref().filter(|s| !s.is_empty()),
        s3_raw.access_key_id.as_ref().filter(|s| !s.is_empty()),
        s3_raw.secret_access_key.as_ref().filter(|s| !s.is_empty()),
        s3_raw.endpoint_url.as_ref().filter(|s| !s.is_empty()),
    ) {
        Some(SpacesConfig {
            bucket_name: bucket.clone(),
            region: region.clone(),
            access_key_id: key_id.clone(),
            secret_access_key: secret.clone(),
            endpoint_url: endpoint.clone(),
            folder_prefix: s3_raw.folder_prefix.clone().filter(|s| !s.is_empty()),
        })
    } else {
        // Only warn when some S3 fields were provided but are incomplete
        if s3_raw.bucket_name.is_some()
            || s3_raw.region.is_some()
            || s3_raw.access_key_id.is_some()
            || s3_raw.secret_access_key.is_some()
            || s3_raw.endpoint_url.is_some()
        {
            println!("⚠️ s3_storage is present in config.json but some required fields (bucket_name, region, access_key_id, secret_access_key, endpoint_url) are missing or empty. Snapshot upload/download is disabled.");
        }
        None
    }
}
