// envclone/src/sync/sql.rs
//! SQL rendering for schema sync scripts. Every statement is guarded with
//! `IF NOT EXISTS`; nothing here drops, renames or retypes anything.

use chrono::{DateTime, Utc};
use std::fmt::Write as _;

use crate::inspect::{ColumnInfo, TableDescriptor};

/// Always double-quotes, so keywords such as `end` or `user` stay valid names.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Column definitions never carry `NOT NULL`: a sampled value says nothing
/// about the constraint, and adding it would fail on populated tables.
pub fn column_definition(column: &ColumnInfo) -> String {
    let mut def = format!("{} {}", quote_ident(&column.name), column.inferred_type.sql_type());
    if column.name == "id" {
        def.push_str(" PRIMARY KEY");
    }
    def
}

pub fn create_table(table: &TableDescriptor) -> String {
    let mut columns: Vec<&ColumnInfo> = table.columns.iter().collect();
    columns.sort_by_key(|c| c.position);
    let body: Vec<String> = columns.iter().map(|c| format!("  {}", column_definition(c))).collect();
    format!(
        "-- Create table {name}\nCREATE TABLE IF NOT EXISTS {ident} (\n{body}\n);\n",
        name = table.name,
        ident = quote_ident(&table.name),
        body = body.join(",\n")
    )
}

pub fn add_column(table: &str, column: &ColumnInfo) -> String {
    // Added columns are never primary keys.
    format!(
        "-- Add column {table}.{column}\nALTER TABLE {t} ADD COLUMN IF NOT EXISTS {c} {ty};\n",
        table = table,
        column = column.name,
        t = quote_ident(table),
        c = quote_ident(&column.name),
        ty = column.inferred_type.sql_type()
    )
}

pub struct ScriptHeader<'a> {
    pub source: &'a str,
    pub target: &'a str,
    pub generated_at: DateTime<Utc>,
}

/// Wraps statement blocks in a single transaction with a header and a
/// trailing summary. `unverified` statements target tables whose columns
/// could not be sampled and get their own labelled section. `notes` are
/// emitted as comments only.
pub fn render_script(
    header: &ScriptHeader<'_>,
    statements: &[String],
    unverified: &[String],
    notes: &[String],
    summary: &[(&str, usize)],
) -> String {
    let rule = "-- =====================================================";
    let mut sql = String::new();
    let _ = writeln!(sql, "{}", rule);
    let _ = writeln!(sql, "-- Schema sync: {} -> {}", header.source, header.target.to_uppercase());
    let _ = writeln!(sql, "-- Generated: {}", header.generated_at.to_rfc3339());
    let _ = writeln!(sql, "-- Review before applying. This script is never executed automatically.");
    if !unverified.is_empty() {
        let _ = writeln!(
            sql,
            "-- {} guarded statement(s) target empty tables whose columns could not be checked;",
            unverified.len()
        );
        let _ = writeln!(sql, "-- they are no-ops where the columns already exist.");
    }
    let _ = writeln!(sql, "{}\n", rule);
    let _ = writeln!(sql, "BEGIN;\n");
    for statement in statements {
        let _ = writeln!(sql, "{}", statement);
    }
    if !unverified.is_empty() {
        let _ = writeln!(sql, "-- Unverified: target tables are empty");
        for statement in unverified {
            let _ = writeln!(sql, "{}", statement);
        }
    }
    if !notes.is_empty() {
        let _ = writeln!(sql, "-- Not changed by this script:");
        for note in notes {
            let _ = writeln!(sql, "--   {}", note);
        }
        let _ = writeln!(sql);
    }
    let _ = writeln!(sql, "COMMIT;\n");
    let _ = writeln!(sql, "{}", rule);
    for (label, count) in summary {
        let _ = writeln!(sql, "-- {}: {}", label, count);
    }
    let _ = writeln!(sql, "{}", rule);
    sql
}
