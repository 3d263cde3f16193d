// envclone/src/clone/writer.rs
use tracing::{debug, warn};

use crate::store::{Row, StoreError, TableStore};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteStrategy {
    /// `delete_all` then batched inserts. The two phases are not atomic: a
    /// failure after the delete leaves the table partially filled, and the
    /// report shows it.
    Replace,
    /// Batched upserts on `conflict_key`; existing rows are never cleared.
    Upsert { conflict_key: String },
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct WriteOutcome {
    pub written: usize,
    pub failed: usize,
    pub warnings: Vec<String>,
    pub first_error: Option<String>,
}

impl WriteOutcome {
    /// Every batch failed and at least one row was attempted.
    pub fn all_failed(&self) -> bool {
        self.written == 0 && self.failed > 0
    }
}

/// Writes `rows` to `table` in batches of `batch_size`. A failed batch is
/// logged and skipped without retry; only a failed clear aborts the write.
pub async fn write_rows(
    store: &dyn TableStore,
    table: &str,
    rows: &[Row],
    strategy: &WriteStrategy,
    batch_size: usize,
    key_column: &str,
) -> Result<WriteOutcome, StoreError> {
    if *strategy == WriteStrategy::Replace {
        // No inserts after a failed clear: the table keeps its previous rows
        // and the caller reports it as an error.
        store.delete_all(table, key_column).await?;
        debug!(table, "target cleared");
    }

    let mut outcome = WriteOutcome::default();
    for (index, batch) in rows.chunks(batch_size.max(1)).enumerate() {
        let result = match strategy {
            WriteStrategy::Replace => store.insert(table, batch).await,
            WriteStrategy::Upsert { conflict_key } => store.upsert(table, batch, conflict_key).await,
        };
        match result {
            Ok(()) => outcome.written += batch.len(),
            Err(e) => {
                warn!(table, batch = index + 1, rows = batch.len(), error = %e, "batch write failed, skipping");
                outcome.failed += batch.len();
                outcome
                    .warnings
                    .push(format!("batch {} ({} rows) failed: {}", index + 1, batch.len(), e));
                outcome.first_error.get_or_insert_with(|| e.to_string());
            }
        }
    }
    Ok(outcome)
}
