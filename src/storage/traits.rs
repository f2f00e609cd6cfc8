//! Abstract table-store interface.
//!
//! A [`TableStore`] exposes the tables of one finished simulation run as
//! [`RecordSet`]s, hiding whether the run was written to the columnar array
//! container or to a relational database file. Callers never branch on the
//! backend kind outside this module.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::record::RecordSet;
use crate::schema::{ColumnInfo, TableName};

/// Errors that can occur while opening or reading a store.
#[derive(Debug, Error)]
#[allow(missing_docs)]
pub enum StoreError {
    /// The physical file does not exist.
    #[error("Store not found: {}", path.display())]
    StoreNotFound { path: PathBuf },

    /// The file extension does not name a supported backend.
    #[error("Unsupported backend for {}: {reason}", path.display())]
    UnsupportedBackend { path: PathBuf, reason: String },

    /// One or more required tables are absent from the store.
    #[error("Schema missing table(s): {}", tables.join(", "))]
    SchemaMissing { tables: Vec<String> },

    /// The container is truncated or fails its integrity checks.
    #[error("Corrupt store {}: {reason}", path.display())]
    Corrupt { path: PathBuf, reason: String },

    /// A table is listed by the store but its rows cannot be decoded.
    #[error("Table '{table}' is unreadable: {reason}")]
    Unreadable { table: String, reason: String },

    /// A value cannot be represented by the target backend.
    #[error("Unsupported value: {reason}")]
    Unsupported { reason: String },

    /// Error reported by the underlying database library.
    #[error("Storage backend error: {0}")]
    Backend(String),

    /// Filesystem error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    pub(crate) fn schema_missing(table: impl Into<String>) -> Self {
        Self::SchemaMissing {
            tables: vec![table.into()],
        }
    }

    pub(crate) fn corrupt(path: &Path, reason: impl Into<String>) -> Self {
        Self::Corrupt {
            path: path.to_path_buf(),
            reason: reason.into(),
        }
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Backend(err.to_string())
    }
}

/// Physical storage format of an output file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// Columnar array container: one node per table.
    Array,
    /// Relational database file: one SQL table per table.
    Relational,
}

impl BackendKind {
    /// Every backend, in the order passes run.
    pub const ALL: [Self; 2] = [Self::Array, Self::Relational];

    /// Lower-case name used in logs and reports.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Array => "array",
            Self::Relational => "relational",
        }
    }

    /// Canonical file extension, used when naming generated outputs.
    pub const fn extension(self) -> &'static str {
        match self {
            Self::Array => "nda",
            Self::Relational => "sqlite",
        }
    }

    /// Selects the backend from an output path's extension.
    pub fn from_path(path: &Path) -> Result<Self, StoreError> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();
        match ext.as_str() {
            "nda" => Ok(Self::Array),
            "sqlite" | "sqlite3" | "db" => Ok(Self::Relational),
            "" => Err(StoreError::UnsupportedBackend {
                path: path.to_path_buf(),
                reason: "file has no extension".to_string(),
            }),
            other => Err(StoreError::UnsupportedBackend {
                path: path.to_path_buf(),
                reason: format!("unknown extension '.{other}'"),
            }),
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Location and format of one output file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreHandle {
    /// Location of the output file.
    pub path: PathBuf,
    /// Format the file is read as.
    pub kind: BackendKind,
}

impl StoreHandle {
    /// A handle with an explicit backend.
    pub fn new(path: impl Into<PathBuf>, kind: BackendKind) -> Self {
        Self {
            path: path.into(),
            kind,
        }
    }

    /// Builds a handle, inferring the backend from the extension.
    pub fn from_path(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let kind = BackendKind::from_path(&path)?;
        Ok(Self { path, kind })
    }
}

/// Read-only access to the tables of one run.
pub trait TableStore {
    /// Backend this store reads.
    fn kind(&self) -> BackendKind;

    /// Path of the underlying file.
    fn path(&self) -> &Path;

    /// Names of every table present, in storage order.
    fn table_names(&self) -> Vec<String>;

    /// Whether a table (or node) with this name exists.
    fn has_table(&self, name: &str) -> bool {
        let name = name.strip_prefix('/').unwrap_or(name);
        self.table_names().iter().any(|t| t == name)
    }

    /// Reads a whole table in persisted row order.
    ///
    /// # Errors
    /// - `SchemaMissing`: the table does not exist
    /// - `Corrupt` / `Backend`: the stored data cannot be decoded
    fn read_table(&self, name: &str) -> Result<RecordSet, StoreError>;

    /// Describes the physical columns of a table.
    fn schema(&self, name: &str) -> Result<Vec<ColumnInfo>, StoreError>;

    /// Reads one of the canonical tables.
    fn read_canonical(&self, table: TableName) -> Result<RecordSet, StoreError> {
        self.read_table(table.as_str())
    }
}
