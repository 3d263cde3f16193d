// envclone/src/environment/env_file.rs
use regex::Regex;
use std::collections::HashMap;
use std::path::Path;
use std::sync::LazyLock;

use crate::errors::{AppError, Result};

/// Keys accepted for the endpoint URL, in order of preference.
pub const URL_KEYS: &[&str] = &["NEXT_PUBLIC_SUPABASE_URL", "SUPABASE_URL"];
/// Keys accepted for the privileged access key.
pub const SERVICE_KEY_KEYS: &[&str] = &["SUPABASE_SERVICE_ROLE_KEY"];

/// `[PROJECT_REF]`-style or `<your-key>`-style tokens. Bracketed runs must
/// start with a letter and hold no `:`, so IPv6 hosts such as `[::1]` pass.
static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\[[A-Za-z][A-Za-z0-9_\- ]*\]|<[^>]+>").expect("placeholder pattern is valid")
});

/// Credentials read from one `.env.*` file.
#[derive(Clone)]
pub struct EnvCredentials {
    pub url: String,
    pub service_key: String,
}

impl std::fmt::Debug for EnvCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EnvCredentials")
            .field("url", &self.url)
            .field("service_key", &"<redacted>")
            .finish()
    }
}

/// Reads `KEY=VALUE` pairs without touching the process environment.
pub fn read_env_file(path: &Path) -> Result<HashMap<String, String>> {
    if !path.is_file() {
        return Err(AppError::Config(format!(
            "environment file not found: {}",
            path.display()
        )));
    }

    let iter = dotenv::from_path_iter(path).map_err(|e| {
        AppError::Config(format!("failed to open {}: {}", path.display(), e))
    })?;

    let mut vars = HashMap::new();
    for item in iter {
        let (key, value) = item.map_err(|e| {
            AppError::Config(format!("failed to parse {}: {}", path.display(), e))
        })?;
        vars.insert(key, value.trim().to_string());
    }
    Ok(vars)
}

pub fn contains_placeholder(value: &str) -> bool {
    PLACEHOLDER.is_match(value)
}

fn first_present<'a>(vars: &'a HashMap<String, String>, keys: &[&str]) -> Option<&'a String> {
    keys.iter()
        .filter_map(|k| vars.get(*k))
        .find(|v| !v.is_empty())
}

/// Extracts and validates the endpoint URL and service key.
pub fn credentials_from_vars(
    vars: &HashMap<String, String>,
    source: &Path,
) -> Result<EnvCredentials> {
    let url = first_present(vars, URL_KEYS).ok_or_else(|| {
        AppError::Config(format!(
            "missing {} in {}",
            URL_KEYS.join(" / "),
            source.display()
        ))
    })?;
    let service_key = first_present(vars, SERVICE_KEY_KEYS).ok_or_else(|| {
        AppError::Config(format!(
            "missing {} in {}",
            SERVICE_KEY_KEYS.join(" / "),
            source.display()
        ))
    })?;

    if contains_placeholder(url) || contains_placeholder(service_key) {
        return Err(AppError::Config(format!(
            "{} still contains placeholder values; configure the real endpoint and key",
            source.display()
        )));
    }

    Ok(EnvCredentials {
        url: url.clone(),
        service_key: service_key.clone(),
    })
}

pub fn load_credentials(path: &Path) -> Result<EnvCredentials> {
    let vars = read_env_file(path)?;
    credentials_from_vars(&vars, path)
}
