// envclone/src/errors.rs
use thiserror::Error;

use crate::store::StoreError;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Connectivity error ({environment}): {message}")]
    Connectivity { environment: String, message: String },

    #[error("Safety violation: {0}")]
    Safety(String),

    #[error("Table operation failed on {table}: {message}")]
    TableOperation { table: String, message: String },

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("URL parsing error: {0}")]
    UrlParse(#[from] url::ParseError),

    #[error("Serde JSON error: {0}")]
    SerdeJson(#[from] serde_json::Error),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Operation cancelled: {0}")]
    Cancelled(String),
}

impl AppError {
    pub fn table(table: &str, err: impl std::fmt::Display) -> Self {
        AppError::TableOperation {
            table: table.to_string(),
            message: err.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
