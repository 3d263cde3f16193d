// envclone/src/clone/job.rs
use crate::config::CloneSettings;
use crate::environment::EnvName;
use crate::errors::{AppError, Result};

/// Options as given on the command line.
#[derive(Debug, Clone, Default)]
pub struct CloneOptions {
    pub tables: Option<Vec<String>>,
    pub exclude_sensitive: bool,
    pub dry_run: bool,
    pub page_size: Option<usize>,
}

/// One source → target migration request. Construction enforces the safety
/// rules, so a `CloneJob` that exists is always allowed to run.
#[derive(Debug, Clone)]
pub struct CloneJob {
    source: EnvName,
    target: EnvName,
    tables: Vec<String>,
    include_sensitive: bool,
    dry_run: bool,
    page_size: usize,
    batch_size: usize,
}

/// Production is never a write target, whatever the flags.
pub fn ensure_writable_target(target: EnvName) -> Result<()> {
    if target == EnvName::Prod {
        return Err(AppError::Safety(
            "production cannot be used as a target; destructive operations against prod are refused".to_string(),
        ));
    }
    Ok(())
}

impl CloneJob {
    pub fn new(
        source: EnvName,
        target: EnvName,
        options: CloneOptions,
        settings: &CloneSettings,
    ) -> Result<Self> {
        ensure_writable_target(target)?;
        if source == target {
            return Err(AppError::Safety(format!(
                "source and target are both {}; refusing to clone an environment onto itself",
                source
            )));
        }

        let page_size = options.page_size.unwrap_or(settings.page_size);
        if page_size == 0 {
            return Err(AppError::InvalidInput("page size must be greater than zero".to_string()));
        }

        let include_sensitive = !options.exclude_sensitive;
        let tables = match options.tables {
            Some(list) => {
                let list: Vec<String> = list
                    .into_iter()
                    .map(|t| t.trim().to_string())
                    .filter(|t| !t.is_empty())
                    .filter(|t| include_sensitive || !settings.is_sensitive(t))
                    .collect();
                if list.is_empty() {
                    return Err(AppError::InvalidInput(
                        "no tables left to clone after applying --tables and --exclude-sensitive".to_string(),
                    ));
                }
                list
            }
            None if include_sensitive => settings.all_tables(),
            None => settings.table_order.clone(),
        };

        Ok(Self {
            source,
            target,
            tables,
            include_sensitive,
            dry_run: options.dry_run,
            page_size,
            batch_size: settings.batch_size,
        })
    }

    pub fn source(&self) -> EnvName {
        self.source
    }

    pub fn target(&self) -> EnvName {
        self.target
    }

    pub fn tables(&self) -> &[String] {
        &self.tables
    }

    pub fn include_sensitive(&self) -> bool {
        self.include_sensitive
    }

    pub fn dry_run(&self) -> bool {
        self.dry_run
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }
}
