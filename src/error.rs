//! Crate error types
//!
//! Area errors (`ValueError`, `StoreError`, `ConfigError`) fold into one
//! [`Error`]; [`Error::kind`] flattens it for callers that only branch on the
//! failure category.

use crate::config::ConfigError;
use crate::store::StoreError;
use crate::value::ValueError;
use thiserror::Error;

/// Errors surfaced by catalog, shadow-index, planner and record operations
#[derive(Error, Debug)]
pub enum Error {
    /// Allocation failed while building a statement
    #[error("Out of memory while building a statement")]
    OutOfMemory,

    /// Store rejected or failed a statement; the enclosing transaction is unusable
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Value parsing or conversion failed
    #[error(transparent)]
    Value(#[from] ValueError),

    /// Configuration could not be loaded
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Temporary relation name space exhausted
    #[error("Temporary relation names exhausted after {0} allocations")]
    Overflow(u64),

    /// Shadow index creation attempted while the creation gate is closed
    #[error("Shadow index creation is disabled: {0}")]
    PermissionDenied(String),

    /// Series is not in the catalog
    #[error("Unknown series: {0}")]
    UnknownSeries(String),

    /// Attribute is not part of the series
    #[error("Unknown attribute {attribute} in series {series}")]
    UnknownAttribute { series: String, attribute: String },

    /// Query request is malformed
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Series definition is malformed
    #[error("Invalid series definition: {0}")]
    InvalidDefinition(String),

    /// Shadow index disagrees with the primary table
    #[error("Shadow index inconsistent for {series}: {detail}")]
    Inconsistent { series: String, detail: String },
}

/// Flat error taxonomy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    OutOfMemory,
    BadQuery,
    BadFieldCount,
    Overflow,
    PermissionDenied,
    UnknownSeries,
    UnknownAttribute,
    Range,
    Inexact,
    BadString,
    InvalidRequest,
    InvalidDefinition,
    Inconsistent,
    Config,
}

impl Error {
    /// Category of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::OutOfMemory => ErrorKind::OutOfMemory,
            Error::Store(StoreError::BadFieldCount { .. }) => ErrorKind::BadFieldCount,
            Error::Store(_) => ErrorKind::BadQuery,
            Error::Value(ValueError::Range { .. }) => ErrorKind::Range,
            Error::Value(ValueError::Inexact { .. }) => ErrorKind::Inexact,
            Error::Value(ValueError::BadString { .. }) => ErrorKind::BadString,
            Error::Config(_) => ErrorKind::Config,
            Error::Overflow(_) => ErrorKind::Overflow,
            Error::PermissionDenied(_) => ErrorKind::PermissionDenied,
            Error::UnknownSeries(_) => ErrorKind::UnknownSeries,
            Error::UnknownAttribute { .. } => ErrorKind::UnknownAttribute,
            Error::InvalidRequest(_) => ErrorKind::InvalidRequest,
            Error::InvalidDefinition(_) => ErrorKind::InvalidDefinition,
            Error::Inconsistent { .. } => ErrorKind::Inconsistent,
        }
    }
}

impl From<std::collections::TryReserveError> for Error {
    fn from(_: std::collections::TryReserveError) -> Self {
        Error::OutOfMemory
    }
}

/// Result type alias for crate operations
pub type Result<T> = std::result::Result<T, Error>;
