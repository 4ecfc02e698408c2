//! Store error types.

use ratefeed_fx::SourceError;
use thiserror::Error;

/// Errors from the persisted store.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Invalid row: {0}")]
    InvalidRow(String),

    #[error("Invalid notification channel: {0}")]
    InvalidChannel(String),
}

impl From<StoreError> for SourceError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Database(sqlx::Error::RowNotFound) => {
                SourceError::NotFound("no rows in store".to_string())
            }
            StoreError::Database(
                e @ (sqlx::Error::ColumnDecode { .. }
                | sqlx::Error::Decode(_)
                | sqlx::Error::ColumnNotFound(_)
                | sqlx::Error::TypeNotFound { .. }),
            ) => SourceError::Parse(e.to_string()),
            StoreError::Database(e) => SourceError::Network(e.to_string()),
            StoreError::InvalidRow(msg) => SourceError::Parse(msg),
            StoreError::InvalidChannel(name) => {
                SourceError::Parse(format!("invalid channel {name}"))
            }
        }
    }
}
