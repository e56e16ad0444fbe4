#![forbid(unsafe_code)]

use std::fmt;

use serde::Serialize;
use thiserror::Error;

/// Result alias used across the catalog core.
pub type Result<T> = std::result::Result<T, CatalogError>;

/// Stable status codes surfaced to callers of the catalog core.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// The database holds no catalog tables.
    NotFound,
    /// Transient race; retry at the connection level.
    Aborted,
    /// Version bookkeeping is corrupt or inconsistent.
    DataLoss,
    /// Version skew the library refuses to bridge.
    FailedPrecondition,
    /// Malformed caller input.
    InvalidArgument,
    /// Executor-level invariant violation or backend failure.
    Internal,
    /// The connection was closed on purpose after a requested downgrade.
    Cancelled,
}

impl ErrorCode {
    /// Returns the snake_case name of the code.
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::NotFound => "not_found",
            ErrorCode::Aborted => "aborted",
            ErrorCode::DataLoss => "data_loss",
            ErrorCode::FailedPrecondition => "failed_precondition",
            ErrorCode::InvalidArgument => "invalid_argument",
            ErrorCode::Internal => "internal",
            ErrorCode::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Operational errors returned by the executor, pagination helper and migration engine.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("aborted: {0}")]
    Aborted(String),
    #[error("data loss: {0}")]
    DataLoss(String),
    #[error("failed precondition: {0}")]
    FailedPrecondition(String),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("internal: {0}")]
    Internal(String),
    #[error("cancelled: {0}")]
    Cancelled(String),
    /// Failure reported by the relational backend.
    #[error("backend error: {message}")]
    Backend {
        /// Message produced by the backend.
        message: String,
    },
    /// An inner error annotated by one propagation hop.
    #[error("{context}: {source}")]
    Context {
        /// Description of the failing step.
        context: String,
        /// The wrapped error.
        source: Box<CatalogError>,
    },
}

impl CatalogError {
    /// Status code of the innermost error.
    pub fn code(&self) -> ErrorCode {
        match self {
            CatalogError::NotFound(_) => ErrorCode::NotFound,
            CatalogError::Aborted(_) => ErrorCode::Aborted,
            CatalogError::DataLoss(_) => ErrorCode::DataLoss,
            CatalogError::FailedPrecondition(_) => ErrorCode::FailedPrecondition,
            CatalogError::InvalidArgument(_) => ErrorCode::InvalidArgument,
            CatalogError::Internal(_) | CatalogError::Backend { .. } => ErrorCode::Internal,
            CatalogError::Cancelled(_) => ErrorCode::Cancelled,
            CatalogError::Context { source, .. } => source.code(),
        }
    }

    /// Returns the error with every context layer removed.
    pub fn root(&self) -> &CatalogError {
        match self {
            CatalogError::Context { source, .. } => source.root(),
            other => other,
        }
    }

    /// True when the backend rejected creating an object that already exists.
    pub fn is_already_exists(&self) -> bool {
        match self.root() {
            CatalogError::Backend { message } => {
                message.contains("already exists") || message.contains("Duplicate key name")
            }
            _ => false,
        }
    }

    pub(crate) fn backend(message: impl Into<String>) -> Self {
        CatalogError::Backend {
            message: message.into(),
        }
    }
}

impl From<rusqlite::Error> for CatalogError {
    fn from(err: rusqlite::Error) -> Self {
        CatalogError::backend(err.to_string())
    }
}

/// Adds a context layer to a failing [`Result`].
pub trait ResultExt<T> {
    /// Wraps the error with a fixed context message.
    fn context(self, context: impl Into<String>) -> Result<T>;

    /// Wraps the error with a lazily built context message.
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|source| CatalogError::Context {
            context: context.into(),
            source: Box::new(source),
        })
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|source| CatalogError::Context {
            context: f(),
            source: Box::new(source),
        })
    }
}
