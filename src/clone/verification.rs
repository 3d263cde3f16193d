// envclone/src/clone/verification.rs
use serde::Serialize;
use tracing::warn;

use super::report::CloneReport;
use crate::inspect::count_rows_paged;
use crate::store::TableStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum VerificationStatus {
    Match,
    Mismatch,
    Skipped,
}

impl VerificationStatus {
    pub fn label(&self) -> &'static str {
        match self {
            VerificationStatus::Match => "match",
            VerificationStatus::Mismatch => "mismatch",
            VerificationStatus::Skipped => "skipped",
        }
    }

    pub fn icon(&self) -> &'static str {
        match self {
            VerificationStatus::Match => "✅",
            VerificationStatus::Mismatch => "⚠️",
            VerificationStatus::Skipped => "ℹ️",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationEntry {
    pub table: String,
    pub source_count: Option<u64>,
    pub target_count: Option<u64>,
    pub status: VerificationStatus,
    pub note: Option<String>,
}

impl VerificationEntry {
    fn skipped(table: &str, source_count: Option<u64>, target_count: Option<u64>, note: String) -> Self {
        Self {
            table: table.to_string(),
            source_count,
            target_count,
            status: VerificationStatus::Skipped,
            note: Some(note),
        }
    }
}

async fn paged_count(store: &dyn TableStore, table: &str, page_size: usize) -> Result<u64, String> {
    count_rows_paged(store, table, page_size).await.map_err(|e| {
        if e.is_relation_missing() {
            "table missing".to_string()
        } else {
            e.to_string()
        }
    })
}

/// Recounts every table on both sides with paginated reads.
pub async fn verify_tables(
    tables: &[String],
    source: &dyn TableStore,
    target: &dyn TableStore,
    page_size: usize,
) -> Vec<VerificationEntry> {
    let mut entries = Vec::with_capacity(tables.len());
    for table in tables {
        let source_count = match paged_count(source, table, page_size).await {
            Ok(count) => count,
            Err(reason) => {
                entries.push(VerificationEntry::skipped(table, None, None, format!("source: {}", reason)));
                continue;
            }
        };
        let target_count = match paged_count(target, table, page_size).await {
            Ok(count) => count,
            Err(reason) => {
                entries.push(VerificationEntry::skipped(
                    table,
                    Some(source_count),
                    None,
                    format!("target: {}", reason),
                ));
                continue;
            }
        };

        let entry = if source_count == target_count {
            VerificationEntry {
                table: table.clone(),
                source_count: Some(source_count),
                target_count: Some(target_count),
                status: VerificationStatus::Match,
                note: None,
            }
        } else {
            warn!(table = %table, source_count, target_count, "row counts differ after clone");
            VerificationEntry {
                table: table.clone(),
                source_count: Some(source_count),
                target_count: Some(target_count),
                status: VerificationStatus::Mismatch,
                note: Some(format!(
                    "target has {} rows, source has {}",
                    target_count, source_count
                )),
            }
        };
        entries.push(entry);
    }
    entries
}

/// Verifies the tables of a finished clone and attaches the result. Returns
/// the number of mismatches.
pub async fn verify_clone(
    report: &mut CloneReport,
    source: &dyn TableStore,
    target: &dyn TableStore,
    page_size: usize,
) -> usize {
    let tables: Vec<String> = report.tables.iter().map(|r| r.table.clone()).collect();
    let entries = verify_tables(&tables, source, target, page_size).await;
    let mismatches = entries
        .iter()
        .filter(|e| e.status == VerificationStatus::Mismatch)
        .count();
    for entry in entries.iter().filter(|e| e.status == VerificationStatus::Mismatch) {
        if let Some(note) = &entry.note {
            report.warnings.push(format!("verification mismatch on {}: {}", entry.table, note));
        }
    }
    report.verification = Some(entries);
    mismatches
}

pub fn print_verification(entries: &[VerificationEntry]) {
    println!("\n🔍 Verification");
    for e in entries {
        let counts = match (e.source_count, e.target_count) {
            (Some(s), Some(t)) => format!("{} / {}", s, t),
            (Some(s), None) => format!("{} / -", s),
            _ => "- / -".to_string(),
        };
        match &e.note {
            Some(note) => println!("  {} {:<34} {} ({})", e.status.icon(), e.table, counts, note),
            None => println!("  {} {:<34} {}", e.status.icon(), e.table, counts),
        }
    }
}
