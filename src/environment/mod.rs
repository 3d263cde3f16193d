// envclone/src/environment/mod.rs
//! Named environments and the registry that resolves them to store handles.

pub(crate) mod env_file;

use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

use crate::errors::{AppError, Result};
use crate::store::{RestStore, TableStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EnvName {
    Prod,
    Test,
    Dev,
}

impl EnvName {
    pub const ALL: [EnvName; 3] = [EnvName::Prod, EnvName::Test, EnvName::Dev];

    pub fn as_str(&self) -> &'static str {
        match self {
            EnvName::Prod => "prod",
            EnvName::Test => "test",
            EnvName::Dev => "dev",
        }
    }

    /// Configuration file for this environment, e.g. `.env.development`.
    pub fn env_file_name(&self) -> &'static str {
        match self {
            EnvName::Prod => ".env.production",
            EnvName::Test => ".env.test",
            EnvName::Dev => ".env.development",
        }
    }
}

impl fmt::Display for EnvName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EnvName {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "prod" | "production" => Ok(EnvName::Prod),
            "test" => Ok(EnvName::Test),
            "dev" | "development" => Ok(EnvName::Dev),
            other => Err(AppError::InvalidInput(format!(
                "unknown environment '{}' (expected prod, test or dev)",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    Connected,
    Error,
}

/// Serializable view of an environment, safe to write into reports.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvironmentSummary {
    pub name: String,
    pub url: String,
    pub project_ref: String,
    pub status: ConnectionStatus,
    pub error: Option<String>,
}

pub struct Environment {
    pub name: EnvName,
    pub url: String,
    pub project_ref: String,
    pub status: ConnectionStatus,
    pub last_error: Option<String>,
    store: Arc<dyn TableStore>,
}

impl fmt::Debug for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Environment")
            .field("name", &self.name)
            .field("url", &self.url)
            .field("project_ref", &self.project_ref)
            .field("status", &self.status)
            .field("last_error", &self.last_error)
            .finish_non_exhaustive()
    }
}

impl Environment {
    pub fn new(name: EnvName, url: &str, store: Arc<dyn TableStore>) -> Self {
        Self {
            name,
            url: url.to_string(),
            project_ref: project_ref_from_url(url),
            status: ConnectionStatus::Connected,
            last_error: None,
            store,
        }
    }

    pub fn store(&self) -> &dyn TableStore {
        self.store.as_ref()
    }

    pub fn is_connected(&self) -> bool {
        self.status == ConnectionStatus::Connected
    }

    pub fn mark_error(&mut self, message: impl Into<String>) {
        self.status = ConnectionStatus::Error;
        self.last_error = Some(message.into());
    }

    /// Count-only query against a well-known table. A missing relation still
    /// proves the endpoint answers, so only other failures mark the
    /// environment as errored.
    pub async fn test_connection(&mut self, check_table: &str) {
        match self.store.count(check_table).await {
            Ok(_) => {
                debug!(environment = %self.name, "connection check succeeded");
            }
            Err(e) if e.is_relation_missing() => {
                debug!(environment = %self.name, table = check_table, "check table absent, endpoint reachable");
            }
            Err(e) => {
                warn!(environment = %self.name, error = %e, "connection check failed");
                self.mark_error(e.to_string());
            }
        }
    }

    pub fn summary(&self) -> EnvironmentSummary {
        EnvironmentSummary {
            name: self.name.to_string(),
            url: self.url.clone(),
            project_ref: self.project_ref.clone(),
            status: self.status,
            error: self.last_error.clone(),
        }
    }

    pub fn connectivity_error(&self) -> AppError {
        AppError::Connectivity {
            environment: self.name.to_string(),
            message: self
                .last_error
                .clone()
                .unwrap_or_else(|| "environment unreachable".to_string()),
        }
    }
}

/// Project identifier: the first host label for `*.supabase.co`, otherwise the host.
pub fn project_ref_from_url(url: &str) -> String {
    let Ok(parsed) = Url::parse(url) else {
        return "unknown".to_string();
    };
    match parsed.host_str() {
        Some(host) if host.ends_with(".supabase.co") => host
            .split('.')
            .next()
            .unwrap_or("unknown")
            .to_string(),
        Some(host) => host.to_string(),
        None => "unknown".to_string(),
    }
}

/// Holds the environments loaded for one run. Passed explicitly to every
/// component; dropped at process exit.
pub struct EnvironmentRegistry {
    env_dir: PathBuf,
    request_timeout: Duration,
    environments: BTreeMap<EnvName, Environment>,
    unavailable: BTreeMap<EnvName, String>,
}

impl EnvironmentRegistry {
    pub fn new(env_dir: &Path, request_timeout: Duration) -> Self {
        Self {
            env_dir: env_dir.to_path_buf(),
            request_timeout,
            environments: BTreeMap::new(),
            unavailable: BTreeMap::new(),
        }
    }

    pub fn env_file_path(&self, name: EnvName) -> PathBuf {
        self.env_dir.join(name.env_file_name())
    }

    /// Loads one environment from its `.env.*` file. Configuration problems
    /// are fatal and happen before any remote call.
    pub fn load(&mut self, name: EnvName) -> Result<&mut Environment> {
        if !self.environments.contains_key(&name) {
            let environment = self.build(name)?;
            self.environments.insert(name, environment);
        }
        self.environments
            .get_mut(&name)
            .ok_or_else(|| AppError::Config(format!("environment {} not loaded", name)))
    }

    fn build(&self, name: EnvName) -> Result<Environment> {
        let path = self.env_file_path(name);
        let creds = env_file::load_credentials(&path)?;
        let endpoint = Url::parse(&creds.url).map_err(|e| {
            AppError::Config(format!("invalid endpoint URL in {}: {}", path.display(), e))
        })?;
        let store = RestStore::new(&endpoint, &creds.service_key, self.request_timeout)
            .map_err(|e| AppError::Config(format!("{}: {}", path.display(), e)))?;

        info!(environment = %name, file = %path.display(), "environment loaded");
        Ok(Environment::new(name, &creds.url, Arc::new(store)))
    }

    /// Loads every known environment. Missing files are skipped; other
    /// configuration errors are kept so reports can show them.
    pub fn load_all(&mut self) -> Vec<EnvName> {
        let mut loaded = Vec::new();
        for name in EnvName::ALL {
            if !self.env_file_path(name).exists() {
                println!("⚠️ {}: {} not found, skipping", name, name.env_file_name());
                continue;
            }
            match self.load(name) {
                Ok(_) => {
                    println!("✅ {}: configuration loaded", name);
                    loaded.push(name);
                }
                Err(e) => {
                    println!("❌ {}: {}", name, e);
                    self.unavailable.insert(name, e.to_string());
                }
            }
        }
        loaded
    }

    /// Registers an already-built environment (tests and alternate stores).
    pub fn insert(&mut self, environment: Environment) {
        self.environments.insert(environment.name, environment);
    }

    pub fn get(&self, name: EnvName) -> Option<&Environment> {
        self.environments.get(&name)
    }

    /// Loads `names` then checks each one. Configuration errors are returned
    /// before any remote call is made; unreachable environments are only marked.
    pub async fn connect(&mut self, names: &[EnvName], check_table: &str) -> Result<()> {
        for name in names {
            self.load(*name)?;
        }
        for name in names {
            let environment = self.load(*name)?;
            environment.test_connection(check_table).await;
            if environment.is_connected() {
                println!("✅ {} connected ({})", environment.name, environment.project_ref);
            } else {
                println!(
                    "❌ {} unreachable: {}",
                    environment.name,
                    environment.last_error.as_deref().unwrap_or("unknown error")
                );
            }
        }
        Ok(())
    }

    pub async fn test_all(&mut self, check_table: &str) {
        for environment in self.environments.values_mut() {
            environment.test_connection(check_table).await;
        }
    }

    /// Summaries of loaded and unavailable environments, in name order.
    pub fn summaries(&self) -> Vec<EnvironmentSummary> {
        let mut out: BTreeMap<EnvName, EnvironmentSummary> = self
            .environments
            .iter()
            .map(|(name, env)| (*name, env.summary()))
            .collect();
        for (name, error) in &self.unavailable {
            out.entry(*name).or_insert_with(|| EnvironmentSummary {
                name: name.to_string(),
                url: String::new(),
                project_ref: "unknown".to_string(),
                status: ConnectionStatus::Error,
                error: Some(error.clone()),
            });
        }
        out.into_values().collect()
    }

    pub fn connected(&self) -> Vec<&Environment> {
        self.environments.values().filter(|e| e.is_connected()).collect()
    }
}
