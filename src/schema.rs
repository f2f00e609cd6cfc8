//! Fixed logical schema of the engine's output tables.
//!
//! Every backend is read through the same table and column names. Only the
//! columns listed here are required; stores may carry extra columns, which
//! stay readable by name but are never validated.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Logical type of a column after projection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnType {
    /// Signed integer.
    Int,
    /// Double precision float.
    Float,
    /// UTF-8 string.
    Text,
    /// Opaque bytes.
    Blob,
}

impl ColumnType {
    /// Lower-case name used in reports.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Int => "int",
            Self::Float => "float",
            Self::Text => "text",
            Self::Blob => "blob",
        }
    }

    /// Maps a relational declared type onto a column type using SQLite's
    /// affinity rules. Returns `None` for untyped columns.
    pub fn from_declared(declared: &str) -> Option<Self> {
        let upper = declared.to_ascii_uppercase();
        if upper.contains("INT") {
            Some(Self::Int)
        } else if upper.contains("CHAR") || upper.contains("CLOB") || upper.contains("TEXT") {
            Some(Self::Text)
        } else if upper.contains("BLOB") {
            Some(Self::Blob)
        } else if upper.contains("REAL") || upper.contains("FLOA") || upper.contains("DOUB") {
            Some(Self::Float)
        } else {
            None
        }
    }

    /// Declared type used when materializing a relational table.
    pub const fn declared(self) -> &'static str {
        match self {
            Self::Int => "INTEGER",
            Self::Float => "REAL",
            Self::Text => "TEXT",
            Self::Blob => "BLOB",
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A required column of a canonical table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnDef {
    /// Column name.
    pub name: &'static str,
    /// Type the column must project as.
    pub ty: ColumnType,
}

const fn col(name: &'static str, ty: ColumnType) -> ColumnDef {
    ColumnDef { name, ty }
}

const AGENT_ENTRY: &[ColumnDef] = &[col("AgentId", ColumnType::Int), col("Spec", ColumnType::Text)];
const RESOURCES: &[ColumnDef] = &[
    col("ResourceId", ColumnType::Int),
    col("Quantity", ColumnType::Float),
];
const TRANSACTIONS: &[ColumnDef] = &[
    col("TransactionId", ColumnType::Int),
    col("SenderId", ColumnType::Int),
    col("ReceiverId", ColumnType::Int),
];
// Info is opaque: existence checks only.
const INFO: &[ColumnDef] = &[];

/// Optional columns whose type is still fixed when present.
const OPTIONAL: &[(TableName, ColumnDef)] = &[
    (TableName::Transactions, col("ResourceId", ColumnType::Int)),
    (TableName::AgentEntry, col("SimId", ColumnType::Blob)),
];

/// The four canonical output tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum TableName {
    /// Agent registry: `AgentId`, `Spec`.
    AgentEntry,
    /// Resource ledger: `ResourceId`, `Quantity`.
    Resources,
    /// Transaction ledger: `TransactionId`, `SenderId`, `ReceiverId`.
    Transactions,
    /// Run metadata; only its presence is checked.
    Info,
}

impl TableName {
    /// All canonical tables, in the order the engine writes them.
    pub const ALL: [Self; 4] = [Self::AgentEntry, Self::Resources, Self::Transactions, Self::Info];

    /// Table name as stored.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::AgentEntry => "AgentEntry",
            Self::Resources => "Resources",
            Self::Transactions => "Transactions",
            Self::Info => "Info",
        }
    }

    /// Parses a physical table or node name. A leading `/` (node path
    /// syntax) is accepted.
    pub fn parse(name: &str) -> Option<Self> {
        let name = name.strip_prefix('/').unwrap_or(name);
        Self::ALL.into_iter().find(|t| t.as_str() == name)
    }

    /// The fixed schema of this table.
    pub const fn schema(self) -> TableSchema {
        let columns = match self {
            Self::AgentEntry => AGENT_ENTRY,
            Self::Resources => RESOURCES,
            Self::Transactions => TRANSACTIONS,
            Self::Info => INFO,
        };
        TableSchema { table: self, columns }
    }
}

impl fmt::Display for TableName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Required columns of one canonical table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(missing_docs)]
pub struct TableSchema {
    pub table: TableName,
    pub columns: &'static [ColumnDef],
}

impl TableSchema {
    /// Looks up a required column.
    pub fn column(&self, name: &str) -> Option<&ColumnDef> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Type fixed by the schema for `name`, covering required and known
    /// optional columns.
    pub fn column_type(&self, name: &str) -> Option<ColumnType> {
        self.column(name).map(|c| c.ty).or_else(|| {
            OPTIONAL
                .iter()
                .find(|(t, c)| *t == self.table && c.name == name)
                .map(|(_, c)| c.ty)
        })
    }

    /// Required columns absent from `present`.
    pub fn missing_columns<'a>(&self, present: impl IntoIterator<Item = &'a str> + Clone) -> Vec<&'static str> {
        self.columns
            .iter()
            .filter(|c| !present.clone().into_iter().any(|p| p == c.name))
            .map(|c| c.name)
            .collect()
    }
}

/// Introspected description of one physical column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[allow(missing_docs)]
pub struct ColumnInfo {
    pub table: String,
    pub name: String,
    pub index: usize,
    pub ty: Option<ColumnType>,
}
