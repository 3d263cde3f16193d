// envclone/src/utils/mod.rs
pub mod tables;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fs;
use std::io::{Write, stdin, stdout};
use std::path::{Path, PathBuf};

/// Timestamp fragment for artifact file names, e.g. `20250101T101500Z`.
pub fn file_timestamp(at: &DateTime<Utc>) -> String {
    at.format("%Y%m%dT%H%M%SZ").to_string()
}

/// Writes a text artifact, creating the parent directory when needed.
pub fn write_artifact(dir: &Path, file_name: &str, content: &str) -> Result<PathBuf> {
    fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create output directory: {}", dir.display()))?;
    let path = dir.join(file_name);
    fs::write(&path, content)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(path)
}

pub fn write_json_artifact<T: Serialize>(dir: &Path, file_name: &str, value: &T) -> Result<PathBuf> {
    let content = serde_json::to_string_pretty(value)
        .with_context(|| format!("Failed to serialize {}", file_name))?;
    write_artifact(dir, file_name, &content)
}

/// Asks the operator to type `expected` to continue.
pub fn confirm(prompt: &str, expected: &str) -> Result<bool> {
    print!("{} (type {}): ", prompt, expected);
    stdout().flush().context("Failed to flush stdout")?;

    let mut input = String::new();
    stdin().read_line(&mut input).context("Failed to read user input")?;
    Ok(input.trim() == expected)
}
