//! Error kinds for the storage engine.
//!
//! Every store-facing operation returns [`StoreError`]. Validation failures
//! are raised before any store mutation; transient failures leave prior
//! state untouched because each operation is transactional per key, so the
//! caller may retry the whole call.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    /// Malformed input rejected before reaching the store.
    #[error("invalid input: {0}")]
    Validation(String),

    /// Store-level uniqueness or constraint violation not absorbed by
    /// upsert semantics.
    #[error("constraint violation: {0}")]
    Conflict(String),

    /// Read of an absent key.
    #[error("not found: {0}")]
    NotFound(String),

    /// Connectivity or transaction failure. Retryable.
    #[error("store error: {0}")]
    Transient(#[source] sqlx::Error),
}

impl StoreError {
    pub fn validation(msg: impl Into<String>) -> Self {
        StoreError::Validation(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        StoreError::NotFound(msg.into())
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::RowNotFound => StoreError::NotFound("row not found".to_string()),
            sqlx::Error::Database(db) => {
                use sqlx::error::ErrorKind;
                match db.kind() {
                    ErrorKind::UniqueViolation
                    | ErrorKind::ForeignKeyViolation
                    | ErrorKind::NotNullViolation
                    | ErrorKind::CheckViolation => StoreError::Conflict(db.message().to_string()),
                    _ => StoreError::Transient(err),
                }
            }
            _ => StoreError::Transient(err),
        }
    }
}
