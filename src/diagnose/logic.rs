// envclone/src/diagnose/logic.rs
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use tracing::warn;

use crate::environment::{Environment, EnvironmentRegistry, EnvironmentSummary};
use crate::inspect::{inspect, ColumnInfo, TableDescriptor};

pub const TOO_FEW_ENVIRONMENTS: &str = "fewer than two environments connected; cannot diagnose drift";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    Medium,
    Low,
}

impl Priority {
    pub fn icon(&self) -> &'static str {
        match self {
            Priority::High => "🔴",
            Priority::Medium => "🟠",
            Priority::Low => "🟢",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Recommendation {
    pub priority: Priority,
    pub message: String,
}

impl Recommendation {
    fn new(priority: Priority, message: impl Into<String>) -> Self {
        Self {
            priority,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvTableState {
    pub exists: bool,
    pub columns: Vec<String>,
    pub record_count: u64,
    pub structure: Vec<ColumnInfo>,
}

impl From<&TableDescriptor> for EnvTableState {
    fn from(d: &TableDescriptor) -> Self {
        Self {
            exists: d.exists,
            columns: d.columns.iter().map(|c| c.name.clone()).collect(),
            record_count: d.row_count,
            structure: d.columns.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TableAnalysis {
    pub name: String,
    pub environments: BTreeMap<String, EnvTableState>,
    pub issues: Vec<String>,
    pub recommendations: Vec<Recommendation>,
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagnosisSummary {
    pub total_environments: usize,
    pub connected_environments: usize,
    pub total_tables: usize,
    pub tables_with_issues: usize,
    pub total_issues: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagnosisReport {
    pub timestamp: DateTime<Utc>,
    pub environments: Vec<EnvironmentSummary>,
    pub tables: Vec<TableAnalysis>,
    pub global_issues: Vec<String>,
    pub recommendations: Vec<Recommendation>,
    pub summary: DiagnosisSummary,
}

/// Compares one table across the environments that could be inspected.
/// `states` holds `(environment, descriptor)` in environment order.
pub fn analyze_table(name: &str, states: &[(String, TableDescriptor)]) -> TableAnalysis {
    let mut analysis = TableAnalysis {
        name: name.to_string(),
        environments: states
            .iter()
            .map(|(env, d)| (env.clone(), EnvTableState::from(d)))
            .collect(),
        issues: Vec::new(),
        recommendations: Vec::new(),
    };

    let present: Vec<&(String, TableDescriptor)> = states.iter().filter(|(_, d)| d.exists).collect();
    let missing_in: Vec<&str> = states
        .iter()
        .filter(|(_, d)| !d.exists)
        .map(|(env, _)| env.as_str())
        .collect();
    if present.is_empty() {
        return analysis;
    }
    if !missing_in.is_empty() {
        analysis.issues.push(format!("table missing in: {}", missing_in.join(", ")));
        analysis.recommendations.push(Recommendation::new(
            Priority::High,
            format!("Create table {} in: {}", name, missing_in.join(", ")),
        ));
    }

    let known: Vec<&(String, TableDescriptor)> = present
        .iter()
        .copied()
        .filter(|(_, d)| !d.structure_unknown())
        .collect();
    for (env, _) in present.iter().filter(|(_, d)| d.structure_unknown()) {
        analysis
            .issues
            .push(format!("structure unknown in {} (table is empty)", env));
        if !known.is_empty() {
            analysis.recommendations.push(Recommendation::new(
                Priority::Low,
                format!("Seed or clone {} into {} so its columns can be compared", name, env),
            ));
        }
    }

    for (i, (env_a, a)) in known.iter().map(|p| (&p.0, &p.1)).enumerate() {
        for (env_b, b) in known.iter().skip(i + 1).map(|p| (&p.0, &p.1)) {
            compare_columns(&mut analysis, env_a, a, env_b, b);
            compare_columns(&mut analysis, env_b, b, env_a, a);
            for column in &a.columns {
                let Some(other) = b.column(&column.name) else {
                    continue;
                };
                if !column.nullable && !other.nullable && column.inferred_type != other.inferred_type {
                    analysis.issues.push(format!(
                        "column {} is {} in {} but {} in {}",
                        column.name,
                        column.inferred_type.sql_type(),
                        env_a,
                        other.inferred_type.sql_type(),
                        env_b
                    ));
                    analysis.recommendations.push(Recommendation::new(
                        Priority::Low,
                        format!("Review the type of {}.{} in {} and {}", name, column.name, env_a, env_b),
                    ));
                }
            }
        }
    }
    analysis
}

/// Records columns of `from` that `to` lacks.
fn compare_columns(
    analysis: &mut TableAnalysis,
    from_env: &str,
    from: &TableDescriptor,
    to_env: &str,
    to: &TableDescriptor,
) {
    let theirs: BTreeSet<String> = to.column_names();
    let missing: Vec<&str> = from
        .columns
        .iter()
        .filter(|c| !theirs.contains(&c.name))
        .map(|c| c.name.as_str())
        .collect();
    if missing.is_empty() {
        return;
    }
    analysis.issues.push(format!(
        "columns in {} missing in {}: {}",
        from_env,
        to_env,
        missing.join(", ")
    ));
    analysis.recommendations.push(Recommendation::new(
        Priority::Medium,
        format!("Add columns to {}.{}: {}", to_env, analysis.name, missing.join(", ")),
    ));
}

/// Keeps the first occurrence of each message at its highest priority, then
/// sorts by priority.
pub fn prioritize(recommendations: Vec<Recommendation>) -> Vec<Recommendation> {
    let mut unique: Vec<Recommendation> = Vec::new();
    for rec in recommendations {
        match unique.iter_mut().find(|r| r.message == rec.message) {
            Some(existing) => existing.priority = existing.priority.min(rec.priority),
            None => unique.push(rec),
        }
    }
    unique.sort_by_key(|r| r.priority);
    unique
}

async fn inspect_environment(environment: &Environment, tables: &[String]) -> BTreeMap<String, Result<TableDescriptor, String>> {
    let mut out = BTreeMap::new();
    for table in tables {
        let state = inspect(environment.store(), table).await.map_err(|e| {
            warn!(environment = %environment.name, table = %table, error = %e, "inspection failed");
            e.to_string()
        });
        out.insert(table.clone(), state);
    }
    out
}

/// Read-only drift analysis across every connected environment of the
/// registry. Unreachable environments are never inspected.
pub async fn diagnose(registry: &EnvironmentRegistry, tables: &[String]) -> DiagnosisReport {
    let connected = registry.connected();
    let mut inspected: Vec<(String, BTreeMap<String, Result<TableDescriptor, String>>)> = Vec::new();
    for environment in &connected {
        println!("🔍 Inspecting {}...", environment.name);
        inspected.push((
            environment.name.to_string(),
            inspect_environment(environment, tables).await,
        ));
    }

    let mut global_issues = Vec::new();
    let mut recommendations = Vec::new();
    let mut analyses = Vec::with_capacity(tables.len());
    let mut missing_everywhere = Vec::new();

    for table in tables {
        let mut states = Vec::new();
        let mut inspection_errors = Vec::new();
        for (env, results) in &inspected {
            match results.get(table) {
                Some(Ok(descriptor)) => states.push((env.clone(), descriptor.clone())),
                Some(Err(e)) => inspection_errors.push(format!("could not inspect in {}: {}", env, e)),
                None => {}
            }
        }

        let mut analysis = analyze_table(table, &states);
        analysis.issues.extend(inspection_errors);
        if !states.is_empty() && states.iter().all(|(_, d)| !d.exists) {
            missing_everywhere.push(table.clone());
        }
        recommendations.extend(analysis.recommendations.iter().cloned());
        analyses.push(analysis);
    }

    if connected.len() < 2 {
        global_issues.push(TOO_FEW_ENVIRONMENTS.to_string());
        recommendations.push(Recommendation::new(
            Priority::High,
            "Check the .env files and credentials of the unreachable environments",
        ));
    }
    if !missing_everywhere.is_empty() {
        global_issues.push(format!(
            "tables missing in every environment: {}",
            missing_everywhere.join(", ")
        ));
        recommendations.push(Recommendation::new(
            Priority::High,
            "Apply the base schema to every environment",
        ));
    }

    let tables_with_issues = analyses.iter().filter(|a| !a.issues.is_empty()).count();
    if tables_with_issues > 0 {
        recommendations.push(Recommendation::new(
            Priority::Medium,
            "Run `envclone sync` and apply the generated scripts",
        ));
        recommendations.push(Recommendation::new(
            Priority::Low,
            "Rehearse with `envclone clone --dry-run` before cloning data",
        ));
    }

    let environments = registry.summaries();
    let summary = DiagnosisSummary {
        total_environments: environments.len(),
        connected_environments: connected.len(),
        total_tables: tables.len(),
        tables_with_issues,
        total_issues: analyses.iter().map(|a| a.issues.len()).sum::<usize>() + global_issues.len(),
    };

    DiagnosisReport {
        timestamp: Utc::now(),
        environments,
        tables: analyses,
        global_issues,
        recommendations: prioritize(recommendations),
        summary,
    }
}

pub fn print_diagnosis(report: &DiagnosisReport) {
    println!("\n🩺 Environment diagnosis");
    for env in &report.environments {
        match &env.error {
            None => println!("  ✅ {} ({})", env.name, env.project_ref),
            Some(e) => println!("  ❌ {}: {}", env.name, e),
        }
    }
    for table in report.tables.iter().filter(|t| !t.issues.is_empty()) {
        println!("\n  📋 {}", table.name);
        for issue in &table.issues {
            println!("    ⚠️ {}", issue);
        }
    }
    if !report.global_issues.is_empty() {
        println!("\n  Global issues:");
        for issue in &report.global_issues {
            println!("    ❌ {}", issue);
        }
    }
    if !report.recommendations.is_empty() {
        println!("\n  Recommendations:");
        for rec in &report.recommendations {
            println!("    {} {}", rec.priority.icon(), rec.message);
        }
    }
    let s = &report.summary;
    println!(
        "\n  {} of {} environments connected, {} of {} tables with issues, {} issues total",
        s.connected_environments, s.total_environments, s.tables_with_issues, s.total_tables, s.total_issues
    );
}
