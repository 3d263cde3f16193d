//! Environment cloning and schema-sync tool
//!
//! Copies data between the prod, test and dev environments of the property
//! management app, and reports or scripts the schema drift between them.

// envclone/src/main.rs
mod backup;
mod clone;
mod config;
mod diagnose;
mod environment;
mod errors;
mod inspect;
mod restore;
mod store;
mod sync;
mod utils;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

use clone::{CloneOptions, CloneRequest};
use config::AppConfig;
use environment::{EnvName, EnvironmentRegistry};

#[derive(Parser)]
#[command(name = "envclone")]
#[command(about = "Clone data and sync schemas between prod, test and dev", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to config.json (defaults to ./config.json when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Directory holding the .env.production / .env.test / .env.development files
    #[arg(long, global = true)]
    env_dir: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

fn parse_env_name(value: &str) -> std::result::Result<EnvName, String> {
    value.parse::<EnvName>().map_err(|e| e.to_string())
}

#[derive(Subcommand)]
enum Commands {
    /// Copy table data from one environment to another
    Clone {
        #[arg(value_parser = parse_env_name)]
        source: EnvName,
        #[arg(value_parser = parse_env_name)]
        target: EnvName,
        /// Read everything, write nothing
        #[arg(long)]
        dry_run: bool,
        /// Leave profiles, sessions, notifications and messages out
        #[arg(long)]
        exclude_sensitive: bool,
        /// Only these tables (comma-separated)
        #[arg(long, value_delimiter = ',')]
        tables: Option<Vec<String>>,
        /// Rows per read request
        #[arg(long)]
        page_size: Option<usize>,
        /// Recount every table on both sides afterwards
        #[arg(long)]
        verify: bool,
        /// Skip the snapshot of the target taken before writing
        #[arg(long)]
        no_backup: bool,
        /// Also write a Markdown summary to the log directory
        #[arg(long)]
        markdown: bool,
        /// Skip confirmation prompt
        #[arg(short = 'y', long)]
        yes: bool,
    },
    /// Compare row counts between two environments
    Verify {
        #[arg(value_parser = parse_env_name)]
        source: EnvName,
        #[arg(value_parser = parse_env_name)]
        target: EnvName,
        #[arg(long, value_delimiter = ',')]
        tables: Option<Vec<String>>,
    },
    /// Generate SQL scripts that bring other environments up to a master schema
    Sync {
        #[arg(value_parser = parse_env_name)]
        source: Option<EnvName>,
        #[arg(value_parser = parse_env_name)]
        target: Option<EnvName>,
    },
    /// Report schema drift across every environment
    Diagnose,
    /// Snapshot an environment's tables into a .tar.gz archive
    Backup {
        #[arg(value_parser = parse_env_name)]
        environment: EnvName,
        #[arg(long, value_delimiter = ',')]
        tables: Option<Vec<String>>,
    },
    /// Restore a snapshot archive (local path or s3://bucket/key) into an environment
    Restore {
        archive: String,
        #[arg(value_parser = parse_env_name)]
        target: EnvName,
        #[arg(long, value_delimiter = ',')]
        tables: Option<Vec<String>>,
        #[arg(short = 'y', long)]
        yes: bool,
    },
    /// Daily refresh of test or dev from prod, without sensitive tables
    Daily {
        #[arg(value_parser = parse_env_name, default_value = "test")]
        target: EnvName,
        #[arg(short = 'y', long)]
        yes: bool,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("envclone=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    match run_app().await {
        Ok(_) => {
            println!("✅ Operation completed successfully.");
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("❌ Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run_app() -> Result<()> {
    let cli = Cli::parse();

    let mut app_config = AppConfig::load(cli.config.as_deref())
        .context("Failed to load application configuration")?;
    if let Some(env_dir) = cli.env_dir {
        app_config.env_dir = env_dir;
    }
    let mut registry = EnvironmentRegistry::new(&app_config.env_dir, app_config.request_timeout);

    match cli.command {
        Commands::Clone {
            source,
            target,
            dry_run,
            exclude_sensitive,
            tables,
            page_size,
            verify,
            no_backup,
            markdown,
            yes,
        } => {
            println!("🚀 Starting clone {} → {}...", source, target);
            let request = CloneRequest {
                options: CloneOptions {
                    tables,
                    exclude_sensitive,
                    dry_run,
                    page_size,
                },
                verify,
                backup: !no_backup,
                markdown,
                assume_yes: yes,
            };
            clone::run_clone_flow(&app_config, &mut registry, source, target, request)
                .await
                .context("Clone failed")?;
        }
        Commands::Verify { source, target, tables } => {
            println!("🔍 Verifying {} against {}...", target, source);
            clone::run_verify_flow(&app_config, &mut registry, source, target, tables)
                .await
                .context("Verification failed")?;
        }
        Commands::Sync { source, target } => {
            println!("⚙️ Starting schema sync...");
            sync::run_sync_flow(&app_config, &mut registry, source, target)
                .await
                .context("Schema sync failed")?;
        }
        Commands::Diagnose => {
            diagnose::run_diagnose_flow(&app_config, &mut registry)
                .await
                .context("Diagnosis failed")?;
        }
        Commands::Backup { environment, tables } => {
            let archive = backup::run_backup_flow(&app_config, &mut registry, environment, tables)
                .await
                .context("Backup failed")?;
            println!("💾 Archive: {}", archive.display());
        }
        Commands::Restore {
            archive,
            target,
            tables,
            yes,
        } => {
            println!("🔄 Restoring {} into {}...", archive, target);
            restore::run_restore_flow(&app_config, &mut registry, &archive, target, tables, yes)
                .await
                .context("Restore failed")?;
        }
        Commands::Daily { target, yes } => {
            clone::run_daily_flow(&app_config, &mut registry, target, yes)
                .await
                .context("Daily clone failed")?;
        }
    }
    Ok(())
}
