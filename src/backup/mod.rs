// envclone/src/backup/mod.rs
mod logic;
pub(crate) mod archive;
pub(crate) mod s3_upload;
pub(crate) mod snapshot;

use anyhow::Result;
use std::path::PathBuf;

use crate::clone::loaded;
use crate::config::AppConfig;
use crate::environment::{EnvName, EnvironmentRegistry};

pub use logic::snapshot_environment;

/// Public entry point for the `backup` command.
pub async fn run_backup_flow(
    app_config: &AppConfig,
    registry: &mut EnvironmentRegistry,
    environment: EnvName,
    tables: Option<Vec<String>>,
) -> Result<PathBuf> {
    registry.connect(&[environment], &app_config.check_table).await?;
    let env = loaded(registry, environment)?;
    if !env.is_connected() {
        return Err(env.connectivity_error().into());
    }

    let tables = tables.unwrap_or_else(|| app_config.clone.all_tables());
    println!("💾 Backing up {} table(s) from {}...", tables.len(), environment);
    snapshot_environment(app_config, env, &tables).await
}
