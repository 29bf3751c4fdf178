//! Error types for the record store.

use thiserror::Error;

/// Result type for all store operations.
pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    /// Lock file, store file, journal, or upload I/O failed.
    #[error("storage i/o failure: {0}")]
    Io(#[from] std::io::Error),

    /// The store document or a journal line could not be (de)serialized.
    #[error("storage serialization failure: {0}")]
    Serde(#[from] serde_json::Error),

    /// Append targeted a table that is not part of the declared schema.
    #[error("unknown table: {0}")]
    UnknownTable(String),

    /// The referenced session id is not registered.
    #[error("invalid session")]
    InvalidSession,

    /// A required field was absent from the payload.
    #[error("missing required field: {0}")]
    MissingField(String),
}
