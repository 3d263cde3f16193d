// envclone/src/clone/shaping.rs
use std::collections::BTreeSet;

use crate::store::Row;

/// Projects a row onto the allowed columns, dropping everything else.
pub fn project(row: &Row, allowed: &BTreeSet<String>) -> Row {
    row.iter()
        .filter(|(column, _)| allowed.contains(*column))
        .map(|(column, value)| (column.clone(), value.clone()))
        .collect()
}

/// Shapes rows for a target whose inferred columns are `target_columns`.
/// An empty set means the target structure is unknown and rows pass through.
pub fn shape_rows(rows: Vec<Row>, target_columns: &BTreeSet<String>) -> (Vec<Row>, BTreeSet<String>) {
    if target_columns.is_empty() {
        return (rows, BTreeSet::new());
    }

    let mut dropped = BTreeSet::new();
    let shaped = rows
        .iter()
        .map(|row| {
            for column in row.keys() {
                if !target_columns.contains(column) {
                    dropped.insert(column.clone());
                }
            }
            project(row, target_columns)
        })
        .collect();
    (shaped, dropped)
}
