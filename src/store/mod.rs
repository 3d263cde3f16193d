// envclone/src/store/mod.rs
//! Remote tabular store abstraction.
//!
//! Every environment is reached through a [`TableStore`]: a REST-like surface
//! with counting, paged reads, inserts, upserts and bulk deletes. There are no
//! transactions and no way to run SQL, so callers compose these primitives.

pub(crate) mod rest;
#[cfg(test)]
pub(crate) mod memory;

use async_trait::async_trait;
use serde_json::{Map, Value};
use thiserror::Error;

pub use rest::RestStore;

/// A single row as returned by the remote store, keyed by column name.
pub type Row = Map<String, Value>;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("relation \"{0}\" does not exist")]
    RelationMissing(String),

    #[error("request failed with status {status}: {message}")]
    Api {
        status: u16,
        code: Option<String>,
        message: String,
    },

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("unexpected response: {0}")]
    Protocol(String),
}

impl StoreError {
    /// True when the failure means the table is absent rather than unreachable.
    pub fn is_relation_missing(&self) -> bool {
        matches!(self, StoreError::RelationMissing(_))
    }
}

#[async_trait]
pub trait TableStore: Send + Sync {
    /// Exact row count without transferring rows.
    async fn count(&self, table: &str) -> Result<u64, StoreError>;

    /// Reads `limit` rows starting at `offset`. A `limit` of zero only
    /// confirms that the relation is readable.
    async fn select_page(&self, table: &str, offset: u64, limit: u64)
        -> Result<Vec<Row>, StoreError>;

    async fn insert(&self, table: &str, rows: &[Row]) -> Result<(), StoreError>;

    async fn upsert(&self, table: &str, rows: &[Row], conflict_key: &str)
        -> Result<(), StoreError>;

    /// Deletes every row whose `key_column` is set. Not atomic with any
    /// following insert.
    async fn delete_all(&self, table: &str, key_column: &str) -> Result<(), StoreError>;
}
