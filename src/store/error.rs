//! Relational store error types

use thiserror::Error;

/// Errors raised by a relational store
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    /// Statement was rejected or failed; the enclosing transaction must be rolled back
    #[error("Query failed: {message} [{statement}]")]
    BadQuery {
        /// Statement text as issued
        statement: String,
        /// Store diagnostic
        message: String,
    },

    /// Result set shape did not match what the statement builder expected
    #[error("Unexpected field count: expected {expected}, got {actual}")]
    BadFieldCount { expected: usize, actual: usize },

    /// Store could not be opened or configured
    #[error("Cannot open store: {0}")]
    Open(String),
}

impl StoreError {
    pub(crate) fn bad_query(statement: &str, err: impl std::fmt::Display) -> Self {
        StoreError::BadQuery {
            statement: statement.to_string(),
            message: err.to_string(),
        }
    }
}

/// Result type alias for store operations
pub type StoreResult<T> = Result<T, StoreError>;
