//! Error types for simcheck.
//!
//! All errors in simcheck are strongly typed using thiserror. Each layer
//! owns its own enum and [`CheckError`] aggregates them so callers at the
//! scenario boundary can classify a failure (tooling, schema, divergence)
//! without string matching.

use std::path::PathBuf;

use thiserror::Error;

use crate::schema::ColumnType;
use crate::storage::{BackendKind, StoreError};

/// Errors raised while projecting a column out of a record set.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[allow(missing_docs)]
pub enum ProjectionError {
    #[error("Unknown column '{column}' in table '{table}'")]
    UnknownColumn {
        table: String,
        column: String,
    },

    #[error("Column '{table}.{column}' row {row}: expected {expected}, found {found}")]
    TypeMismatch {
        table: String,
        column: String,
        row: usize,
        expected: ColumnType,
        found: &'static str,
    },
}

/// Errors raised while invoking the external simulation engine.
#[derive(Debug, Error)]
#[allow(missing_docs)]
pub enum RunError {
    #[error("Failed to launch engine '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Engine exited with {}:\n{output}", code.map_or_else(|| "a signal".to_string(), |c| format!("status {c}")))]
    EngineFailed {
        code: Option<i32>,
        output: String,
    },

    #[error("Engine reported success but produced no output at {path}")]
    OutputMissing {
        path: PathBuf,
        output: String,
    },

    #[error("I/O error during run: {0}")]
    Io(#[from] std::io::Error),
}

/// Raised when two backends disagree about the same logical run.
#[derive(Debug, Clone, PartialEq, Error)]
#[allow(missing_docs)]
pub enum DivergenceError {
    #[error("Backends {left} and {right} disagree on '{check}': {left} => {left_outcome}; {right} => {right_outcome}")]
    BackendDivergence {
        left: BackendKind,
        right: BackendKind,
        check: String,
        left_outcome: String,
        right_outcome: String,
    },
}

/// Configuration loading and validation errors.
#[derive(Debug, Error)]
#[allow(missing_docs)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config {path}: {reason}")]
    Parse {
        path: PathBuf,
        reason: String,
    },

    #[error("Invalid config: {reason}")]
    Invalid {
        reason: String,
    },
}

/// Top-level error type for simcheck.
#[derive(Debug, Error)]
#[allow(missing_docs)]
pub enum CheckError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Projection error: {0}")]
    Projection(#[from] ProjectionError),

    #[error("Run error: {0}")]
    Run(#[from] RunError),

    #[error("Divergence: {0}")]
    Divergence(#[from] DivergenceError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Internal error: {message}")]
    Internal {
        message: String,
    },
}

impl CheckError {
    /// Creates an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns true for failures of the tooling around the validator:
    /// the engine, the filesystem, or a store that cannot be opened at all.
    #[must_use]
    pub const fn is_tooling(&self) -> bool {
        match self {
            Self::Run(_) => true,
            Self::Store(e) => matches!(
                e,
                StoreError::StoreNotFound { .. }
                    | StoreError::UnsupportedBackend { .. }
                    | StoreError::Io(_)
            ),
            _ => false,
        }
    }

    /// Returns true when the produced output does not match the table
    /// schema: a missing table, a missing column, an uncoercible value or
    /// a corrupt container.
    #[must_use]
    pub const fn is_schema(&self) -> bool {
        match self {
            Self::Projection(_) => true,
            Self::Store(e) => matches!(
                e,
                StoreError::SchemaMissing { .. }
                    | StoreError::Corrupt { .. }
                    | StoreError::Unreadable { .. }
                    | StoreError::Backend(_)
            ),
            _ => false,
        }
    }

    /// The error text without file paths, so the same failure on two
    /// backends renders identically.
    #[must_use]
    pub fn cause(&self) -> String {
        match self {
            Self::Store(StoreError::Corrupt { reason, .. }) => format!("Corrupt store: {reason}"),
            Self::Store(StoreError::StoreNotFound { .. }) => "Store not found".to_string(),
            Self::Store(StoreError::UnsupportedBackend { reason, .. }) => format!("Unsupported backend: {reason}"),
            other => other.to_string(),
        }
    }

    /// Returns true if this is a cross-backend divergence.
    #[must_use]
    pub const fn is_divergence(&self) -> bool {
        matches!(self, Self::Divergence(_))
    }

    /// Returns true if this is a configuration error.
    #[must_use]
    pub const fn is_config(&self) -> bool {
        matches!(self, Self::Config(_))
    }
}

/// Result type alias for simcheck operations.
pub type CheckResult<T> = Result<T, CheckError>;
