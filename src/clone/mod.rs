// envclone/src/clone/mod.rs
pub(crate) mod anonymize;
pub(crate) mod job;
pub(crate) mod logic;
pub(crate) mod report;
pub(crate) mod shaping;
pub(crate) mod verification;
pub(crate) mod writer;

use anyhow::{Context, Result};
use chrono::Utc;
use std::fmt::Write as _;
use std::path::PathBuf;
use tracing::warn;

use crate::backup;
use crate::config::AppConfig;
use crate::environment::{EnvName, Environment, EnvironmentRegistry};
use crate::errors::AppError;
use crate::utils::{confirm, file_timestamp, write_artifact, write_json_artifact};

pub use job::{ensure_writable_target, CloneJob, CloneOptions};
pub use logic::DataCloner;
pub use report::CloneReport;

/// Everything the `clone` command needs besides the configuration.
#[derive(Debug, Clone, Default)]
pub struct CloneRequest {
    pub options: CloneOptions,
    pub verify: bool,
    pub backup: bool,
    pub markdown: bool,
    pub assume_yes: bool,
}

pub(crate) fn loaded<'r>(registry: &'r EnvironmentRegistry, name: EnvName) -> Result<&'r Environment> {
    registry
        .get(name)
        .ok_or_else(|| AppError::Config(format!("environment {} is not loaded", name)).into())
}

pub async fn run_clone_flow(
    app_config: &AppConfig,
    registry: &mut EnvironmentRegistry,
    source: EnvName,
    target: EnvName,
    request: CloneRequest,
) -> Result<CloneReport> {
    let job = CloneJob::new(source, target, request.options.clone(), &app_config.clone)?;

    for name in [source, target] {
        registry.load(name)?;
    }

    if !job.dry_run() && !request.assume_yes {
        let prompt = format!(
            "⚠️ This replaces data in {} with data from {} ({} tables). Continue?",
            target,
            source,
            job.tables().len()
        );
        if !confirm(&prompt, "yes")? {
            return Err(AppError::Cancelled(format!("clone {} → {} declined", source, target)).into());
        }
    }

    registry.connect(&[source, target], &app_config.check_table).await?;

    let mut backup_archive: Option<PathBuf> = None;
    if request.backup && !job.dry_run() {
        let target_env = loaded(registry, target)?;
        if target_env.is_connected() {
            println!("\n💾 Taking a snapshot of {} before writing...", target);
            match backup::snapshot_environment(app_config, target_env, job.tables()).await {
                Ok(path) => backup_archive = Some(path),
                Err(e) => {
                    warn!(environment = %target, error = %e, "pre-clone backup failed");
                    println!("⚠️ Pre-clone backup failed, continuing without it: {:#}", e);
                }
            }
        }
    }

    let source_env = loaded(registry, source)?;
    let target_env = loaded(registry, target)?;
    let mut report = DataCloner::new(source_env, target_env, &app_config.clone)
        .run(&job)
        .await;
    report.backup_archive = backup_archive.map(|p| p.display().to_string());

    if request.verify && !job.dry_run() && source_env.is_connected() && target_env.is_connected() {
        verification::verify_clone(&mut report, source_env.store(), target_env.store(), job.page_size()).await;
        if let Some(entries) = &report.verification {
            verification::print_verification(entries);
        }
    }

    report.print_summary();
    let json_path = report
        .save_json(&app_config.report_dir)
        .context("Failed to save clone report")?;
    println!("📝 Report written to {}", json_path.display());
    if request.markdown {
        let md_path = report
            .save_markdown(&app_config.log_dir)
            .context("Failed to save Markdown summary")?;
        println!("📝 Summary written to {}", md_path.display());
    }
    Ok(report)
}

/// Recounts tables in two environments without writing anything.
pub async fn run_verify_flow(
    app_config: &AppConfig,
    registry: &mut EnvironmentRegistry,
    source: EnvName,
    target: EnvName,
    tables: Option<Vec<String>>,
) -> Result<Vec<verification::VerificationEntry>> {
    registry.connect(&[source, target], &app_config.check_table).await?;
    let source_env = loaded(registry, source)?;
    let target_env = loaded(registry, target)?;
    for environment in [source_env, target_env] {
        if !environment.is_connected() {
            return Err(environment.connectivity_error().into());
        }
    }

    let tables = tables.unwrap_or_else(|| app_config.clone.all_tables());
    let entries = verification::verify_tables(
        &tables,
        source_env.store(),
        target_env.store(),
        app_config.clone.page_size,
    )
    .await;
    verification::print_verification(&entries);

    let name = format!(
        "verification_{}_to_{}_{}.json",
        source,
        target,
        file_timestamp(&Utc::now())
    );
    let path = write_json_artifact(&app_config.report_dir, &name, &entries)
        .context("Failed to save verification report")?;
    println!("📝 Verification written to {}", path.display());
    Ok(entries)
}

/// Scheduled refresh of a non-production environment from production,
/// without sensitive tables.
pub async fn run_daily_flow(
    app_config: &AppConfig,
    registry: &mut EnvironmentRegistry,
    target: EnvName,
    assume_yes: bool,
) -> Result<()> {
    ensure_writable_target(target)?;
    let started = Utc::now();

    if !assume_yes {
        let prompt = format!(
            "⚠️ Daily clone will replace non-sensitive data in {} with production data.",
            target
        );
        if !confirm(&prompt, "YES")? {
            return Err(AppError::Cancelled("daily clone declined".to_string()).into());
        }
    }

    let request = CloneRequest {
        options: CloneOptions {
            exclude_sensitive: true,
            ..Default::default()
        },
        verify: true,
        backup: true,
        markdown: true,
        assume_yes: true,
    };

    match run_clone_flow(app_config, registry, EnvName::Prod, target, request).await {
        Ok(report) => {
            let summary = report.summary();
            println!(
                "🎉 Daily clone to {} finished: {} records, {} table(s) failed",
                target, summary.total_records, summary.failed
            );
            Ok(())
        }
        Err(e) => {
            let path = write_error_summary(app_config, target, started, &e)?;
            println!("📝 Error summary written to {}", path.display());
            Err(e)
        }
    }
}

fn write_error_summary(
    app_config: &AppConfig,
    target: EnvName,
    started: chrono::DateTime<Utc>,
    error: &anyhow::Error,
) -> Result<PathBuf> {
    let mut md = String::new();
    let _ = writeln!(md, "# Daily clone failed: prod → {}\n", target);
    let _ = writeln!(md, "- Started: {}", started.to_rfc3339());
    let _ = writeln!(md, "- Failed: {}\n", Utc::now().to_rfc3339());
    let _ = writeln!(md, "## Error\n\n```\n{:#}\n```", error);
    let name = format!("clone-error-{}-{}.md", target, file_timestamp(&started));
    write_artifact(&app_config.log_dir, &name, &md)
}
