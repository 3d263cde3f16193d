// envclone/src/clone/report.rs
//! Run reports for clone and restore jobs. Results are appended as tables
//! finish; nothing in a report is ever rewritten except the verification
//! section and the finish time.

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use super::verification::{VerificationEntry, VerificationStatus};
use crate::utils::{file_timestamp, write_artifact, write_json_artifact};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum TableStatus {
    Success,
    Error,
    Empty,
    DryRun,
}

impl TableStatus {
    pub fn icon(&self) -> &'static str {
        match self {
            TableStatus::Success => "✅",
            TableStatus::Error => "❌",
            TableStatus::Empty => "ℹ️",
            TableStatus::DryRun => "🧪",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            TableStatus::Success => "success",
            TableStatus::Error => "error",
            TableStatus::Empty => "empty",
            TableStatus::DryRun => "dry-run",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TableResult {
    pub table: String,
    pub status: TableStatus,
    pub records: u64,
    pub failed_records: u64,
    pub error: Option<String>,
    pub warnings: Vec<String>,
}

impl TableResult {
    fn with_status(table: &str, status: TableStatus, records: u64) -> Self {
        Self {
            table: table.to_string(),
            status,
            records,
            failed_records: 0,
            error: None,
            warnings: Vec::new(),
        }
    }

    pub fn success(table: &str, records: u64) -> Self {
        Self::with_status(table, TableStatus::Success, records)
    }

    pub fn empty(table: &str, reason: &str) -> Self {
        Self::with_status(table, TableStatus::Empty, 0).warn(reason)
    }

    pub fn dry_run(table: &str, records: u64) -> Self {
        Self::with_status(table, TableStatus::DryRun, records)
    }

    pub fn error(table: &str, message: impl Into<String>) -> Self {
        let mut result = Self::with_status(table, TableStatus::Error, 0);
        result.error = Some(message.into());
        result
    }

    pub fn warn(mut self, warning: impl Into<String>) -> Self {
        self.warnings.push(warning.into());
        self
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportSummary {
    pub total_records: u64,
    pub succeeded: usize,
    pub failed: usize,
    pub empty: usize,
    pub dry_run: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CloneReport {
    pub source: String,
    pub target: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub dry_run: bool,
    pub tables: Vec<TableResult>,
    pub warnings: Vec<String>,
    pub verification: Option<Vec<VerificationEntry>>,
    pub backup_archive: Option<String>,
}

#[derive(Serialize)]
struct ReportDocument<'a> {
    #[serde(flatten)]
    report: &'a CloneReport,
    summary: ReportSummary,
}

impl CloneReport {
    pub fn new(source: &str, target: &str, dry_run: bool, started_at: DateTime<Utc>) -> Self {
        Self {
            source: source.to_string(),
            target: target.to_string(),
            started_at,
            finished_at: None,
            dry_run,
            tables: Vec::new(),
            warnings: Vec::new(),
            verification: None,
            backup_archive: None,
        }
    }

    pub fn push(&mut self, result: TableResult) {
        self.tables.push(result);
    }

    pub fn finish(&mut self, at: DateTime<Utc>) {
        self.finished_at = Some(at);
    }

    pub fn result(&self, table: &str) -> Option<&TableResult> {
        self.tables.iter().find(|r| r.table == table)
    }

    pub fn summary(&self) -> ReportSummary {
        self.tables.iter().fold(ReportSummary::default(), |mut s, r| {
            match r.status {
                TableStatus::Success => {
                    s.succeeded += 1;
                    s.total_records += r.records;
                }
                TableStatus::Error => s.failed += 1,
                TableStatus::Empty => s.empty += 1,
                TableStatus::DryRun => {
                    s.dry_run += 1;
                    s.total_records += r.records;
                }
            }
            s
        })
    }

    pub fn print_summary(&self) {
        let summary = self.summary();
        println!("\n📊 Clone summary: {} → {}", self.source, self.target);
        for result in &self.tables {
            let mut line = format!(
                "  {} {:<34} {:>8} records",
                result.status.icon(),
                result.table,
                result.records
            );
            if result.failed_records > 0 {
                let _ = write!(line, " ({} failed)", result.failed_records);
            }
            if let Some(error) = &result.error {
                let _ = write!(line, " - {}", error);
            }
            println!("{}", line);
        }
        println!(
            "  Total: {} records, {} succeeded, {} failed, {} empty, {} dry-run",
            summary.total_records, summary.succeeded, summary.failed, summary.empty, summary.dry_run
        );
        if let Some(entries) = &self.verification {
            let mismatches = entries
                .iter()
                .filter(|e| e.status == VerificationStatus::Mismatch)
                .count();
            if mismatches == 0 {
                println!("  🔍 Verification: all counts match");
            } else {
                println!("  ⚠️ Verification: {} table(s) with mismatched counts", mismatches);
            }
        }
    }

    fn file_slug(&self) -> String {
        format!("{}_to_{}", slug(&self.source), slug(&self.target))
    }

    pub fn save_json(&self, report_dir: &Path) -> Result<PathBuf> {
        let name = format!(
            "clone_report_{}_{}.json",
            self.file_slug(),
            file_timestamp(&self.started_at)
        );
        let document = ReportDocument {
            report: self,
            summary: self.summary(),
        };
        write_json_artifact(report_dir, &name, &document)
    }

    pub fn save_markdown(&self, log_dir: &Path) -> Result<PathBuf> {
        let name = format!(
            "clone-report-{}-{}.md",
            slug(&self.target),
            file_timestamp(&self.started_at)
        );
        write_artifact(log_dir, &name, &self.to_markdown())
    }

    pub fn to_markdown(&self) -> String {
        let summary = self.summary();
        let mut md = String::new();
        let _ = writeln!(md, "# Clone report: {} → {}\n", self.source, self.target);
        let _ = writeln!(md, "- Started: {}", self.started_at.to_rfc3339());
        if let Some(finished) = self.finished_at {
            let _ = writeln!(md, "- Finished: {}", finished.to_rfc3339());
        }
        let _ = writeln!(md, "- Mode: {}", if self.dry_run { "dry run" } else { "live" });
        if let Some(archive) = &self.backup_archive {
            let _ = writeln!(md, "- Backup: `{}`", archive);
        }

        let _ = writeln!(md, "\n## Summary\n");
        let _ = writeln!(md, "| Metric | Value |\n|---|---|");
        let _ = writeln!(md, "| Records | {} |", summary.total_records);
        let _ = writeln!(md, "| Succeeded | {} |", summary.succeeded);
        let _ = writeln!(md, "| Failed | {} |", summary.failed);
        let _ = writeln!(md, "| Empty | {} |", summary.empty);
        let _ = writeln!(md, "| Dry run | {} |", summary.dry_run);

        let _ = writeln!(md, "\n## Tables\n");
        let _ = writeln!(md, "| Table | Status | Records | Failed | Notes |\n|---|---|---|---|---|");
        for r in &self.tables {
            let mut notes: Vec<String> = r.error.iter().cloned().collect();
            notes.extend(r.warnings.iter().cloned());
            let _ = writeln!(
                md,
                "| {} | {} {} | {} | {} | {} |",
                r.table,
                r.status.icon(),
                r.status.label(),
                r.records,
                r.failed_records,
                notes.join("; ").replace('|', "\\|")
            );
        }

        if !self.warnings.is_empty() {
            let _ = writeln!(md, "\n## Warnings\n");
            for w in &self.warnings {
                let _ = writeln!(md, "- {}", w);
            }
        }

        if let Some(entries) = &self.verification {
            let _ = writeln!(md, "\n## Verification\n");
            let _ = writeln!(md, "| Table | Source | Target | Status |\n|---|---|---|---|");
            for e in entries {
                let _ = writeln!(
                    md,
                    "| {} | {} | {} | {} |",
                    e.table,
                    count_cell(e.source_count),
                    count_cell(e.target_count),
                    e.status.label()
                );
            }
        }
        md
    }
}

fn count_cell(count: Option<u64>) -> String {
    count.map(|c| c.to_string()).unwrap_or_else(|| "-".to_string())
}

/// File-name-safe form of an environment or archive label.
fn slug(label: &str) -> String {
    label
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
        .collect()
}
