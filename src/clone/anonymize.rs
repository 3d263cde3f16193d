// envclone/src/clone/anonymize.rs
//! Deterministic anonymization of sensitive rows before they reach a
//! non-production target.
//!
//! Runs after shaping and only rewrites columns already present in the row,
//! so it never adds a column the target lacks.

use chrono::{DateTime, Utc};
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::environment::EnvName;
use crate::store::Row;

pub const PLACEHOLDER_MESSAGE: &str = "Anonymized test message";

pub struct Anonymizer {
    target: EnvName,
    now: DateTime<Utc>,
}

impl Anonymizer {
    pub fn new(target: EnvName, now: DateTime<Utc>) -> Self {
        Self { target, now }
    }

    /// Applies the policy for `table`. Tables without a dedicated policy still
    /// get credentials nulled and emails rewritten.
    pub fn apply(&self, table: &str, rows: Vec<Row>) -> Vec<Row> {
        match table {
            // Sessions are never carried across environments.
            "user_sessions" => Vec::new(),
            "profiles" => rows.into_iter().map(|r| self.profile(r)).collect(),
            "notifications" => rows.into_iter().map(|r| self.notification(r)).collect(),
            "messages" => rows.into_iter().map(|r| self.message(r)).collect(),
            _ => rows.into_iter().map(|r| self.generic(r)).collect(),
        }
    }

    fn local_domain(&self) -> String {
        format!("{}.local", self.target)
    }

    fn timestamp(&self) -> Value {
        Value::String(self.now.to_rfc3339())
    }

    /// Nulls credentials and rewrites every non-null email column. Null
    /// emails stay null.
    fn generic(&self, mut row: Row) -> Row {
        null_credentials(&mut row);
        let rewritten: Vec<(String, String)> = row
            .iter()
            .filter(|(column, value)| is_email_column(column) && value.is_string())
            .map(|(column, _)| (column.clone(), self.anonymized_email(&row, column)))
            .collect();
        for (column, email) in rewritten {
            row.insert(column, Value::String(email));
        }
        row
    }

    fn profile(&self, row: Row) -> Row {
        let mut row = self.generic(row);
        let suffix = stable_suffix(&row);

        if let Some(full_name) = row.get("full_name").cloned() {
            let name = match full_name.as_str().filter(|n| !n.is_empty()) {
                Some(n) => format!("{} ({})", n, self.target.as_str().to_uppercase()),
                None => format!("User {}", suffix.to_uppercase()),
            };
            row.insert("full_name".to_string(), Value::String(name));
        }
        if row.contains_key("updated_at") {
            row.insert("updated_at".to_string(), self.timestamp());
        }
        row
    }

    fn notification(&self, row: Row) -> Row {
        let mut row = self.generic(row);
        let mentions_email = row
            .get("message")
            .and_then(Value::as_str)
            .is_some_and(|m| m.contains('@'));
        if mentions_email {
            row.insert("message".to_string(), Value::String(PLACEHOLDER_MESSAGE.to_string()));
        }
        if row.contains_key("is_read") {
            row.insert("is_read".to_string(), Value::Bool(true));
        }
        if row.contains_key("read_at") {
            row.insert("read_at".to_string(), self.timestamp());
        }
        row
    }

    fn message(&self, row: Row) -> Row {
        let mut row = self.generic(row);
        if row.contains_key("content") {
            row.insert("content".to_string(), Value::String(PLACEHOLDER_MESSAGE.to_string()));
        }
        if let Some(Value::Object(metadata)) = row.get_mut("metadata") {
            metadata.insert("anonymized".to_string(), Value::Bool(true));
        }
        row
    }

    /// `<role>_<hash>@<target>.local`, stable across runs for the same row
    /// and column.
    fn anonymized_email(&self, row: &Row, column: &str) -> String {
        let role = row
            .get("role")
            .and_then(Value::as_str)
            .filter(|r| !r.is_empty() && r.chars().all(|c| c.is_ascii_alphanumeric() || c == '_'))
            .unwrap_or("user")
            .to_ascii_lowercase();
        let suffix = if column == "email" {
            stable_suffix(row)
        } else {
            column_suffix(row, column)
        };
        format!("{}_{}@{}", role, suffix, self.local_domain())
    }
}

/// Credential-like column names: tokens, passwords, secrets, API and access keys.
pub fn is_credential_column(column: &str) -> bool {
    let lower = column.to_ascii_lowercase();
    lower.ends_with("_token")
        || lower == "token"
        || lower == "apikey"
        || lower.contains("password")
        || lower.contains("secret")
        || lower.contains("api_key")
        || lower.contains("access_key")
        || lower.contains("private_key")
}

/// `email` itself and columns such as `owner_email` or `contact_email`.
fn is_email_column(column: &str) -> bool {
    let lower = column.to_ascii_lowercase();
    lower == "email" || lower.ends_with("_email")
}

fn null_credentials(row: &mut Row) {
    for (column, value) in row.iter_mut() {
        if is_credential_column(column) {
            *value = Value::Null;
        }
    }
}

/// First 8 hex chars of SHA-256 over the row id, or the original email when
/// the row has no id.
fn stable_suffix(row: &Row) -> String {
    let seed = match row.get("id") {
        Some(Value::String(id)) => id.clone(),
        Some(Value::Number(id)) => id.to_string(),
        _ => row
            .get("email")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
    };
    short_hash(&seed)
}

/// Like [`stable_suffix`] but keyed by column too, so two email columns of
/// one row do not collapse onto the same address.
fn column_suffix(row: &Row, column: &str) -> String {
    let id = match row.get("id") {
        Some(Value::String(id)) => id.clone(),
        Some(Value::Number(id)) => id.to_string(),
        _ => row
            .get(column)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
    };
    short_hash(&format!("{}|{}", id, column))
}

fn short_hash(seed: &str) -> String {
    let digest = Sha256::digest(seed.as_bytes());
    hex::encode(digest)[..8].to_string()
}
