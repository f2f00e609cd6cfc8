//! In-memory view of one table.
//!
//! A [`RecordSet`] is what a backend hands back from a table read: the field
//! list plus every row, in the order the engine persisted them. Values are
//! addressed by column name, never by position, so the validator does not
//! care how either backend orders its columns.

use serde::{Deserialize, Serialize};

use crate::schema::{ColumnType, TableName, TableSchema};
use crate::storage::StoreError;
use crate::value::Value;

/// A named column of a record set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    /// Column name as written by the engine.
    pub name: String,
    /// Stored type, when the backend declares one.
    pub ty: Option<ColumnType>,
}

impl Field {
    /// A field with an optional declared type.
    pub fn new(name: impl Into<String>, ty: Option<ColumnType>) -> Self {
        Self {
            name: name.into(),
            ty,
        }
    }
}

/// All rows of one table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordSet {
    table: String,
    fields: Vec<Field>,
    rows: Vec<Vec<Value>>,
}

impl RecordSet {
    /// Creates a record set, checking every row against the field count.
    pub fn new(
        table: impl Into<String>,
        fields: Vec<Field>,
        rows: Vec<Vec<Value>>,
    ) -> Result<Self, StoreError> {
        let table = table.into();
        if let Some((idx, row)) = rows.iter().enumerate().find(|(_, r)| r.len() != fields.len()) {
            return Err(StoreError::Unsupported {
                reason: format!(
                    "table '{table}' row {idx} has {} values for {} fields",
                    row.len(),
                    fields.len()
                ),
            });
        }
        Ok(Self { table, fields, rows })
    }

    /// Starts a builder for hand-assembled tables.
    pub fn builder(table: impl Into<String>) -> RecordSetBuilder {
        RecordSetBuilder {
            table: table.into(),
            fields: Vec::new(),
            rows: Vec::new(),
        }
    }

    /// Table name.
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Canonical schema for this table, if it is one of the four.
    pub fn schema(&self) -> Option<TableSchema> {
        TableName::parse(&self.table).map(TableName::schema)
    }

    /// Fields in column order.
    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    /// Field names in column order.
    pub fn field_names(&self) -> impl Iterator<Item = &str> + Clone {
        self.fields.iter().map(|f| f.name.as_str())
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// True when there are no rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Position of the column named `name`.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }

    /// True when a column named `name` exists.
    pub fn has_column(&self, name: &str) -> bool {
        self.column_index(name).is_some()
    }

    /// Row `idx` with named access.
    pub fn row(&self, idx: usize) -> Option<Record<'_>> {
        self.rows.get(idx).map(|values| Record {
            fields: &self.fields,
            values,
        })
    }

    /// Every row in storage order.
    pub fn records(&self) -> impl Iterator<Item = Record<'_>> {
        self.rows.iter().map(|values| Record {
            fields: &self.fields,
            values,
        })
    }

    pub(crate) fn raw_rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    /// Values of one column in row order, without coercion.
    pub(crate) fn column_values(&self, idx: usize) -> impl Iterator<Item = &Value> {
        self.rows.iter().map(move |r| &r[idx])
    }
}

/// A borrowed row with named access.
#[derive(Debug, Clone, Copy)]
pub struct Record<'a> {
    fields: &'a [Field],
    values: &'a [Value],
}

impl<'a> Record<'a> {
    /// Value of the column named `name`.
    pub fn get(&self, name: &str) -> Option<&'a Value> {
        self.fields
            .iter()
            .position(|f| f.name == name)
            .map(|idx| &self.values[idx])
    }

    /// Values in column order.
    pub fn values(&self) -> &'a [Value] {
        self.values
    }
}

/// Builder for [`RecordSet`].
///
/// # Example
/// ```
/// use simcheck::{ColumnType, RecordSet, Value};
///
/// let agents = RecordSet::builder("AgentEntry")
///     .column("AgentId", ColumnType::Int)
///     .column("Spec", ColumnType::Text)
///     .row(vec![Value::Int(12), Value::from(":agents:Source")])
///     .build()
///     .unwrap();
/// assert_eq!(agents.len(), 1);
/// ```
#[derive(Debug, Clone)]
pub struct RecordSetBuilder {
    table: String,
    fields: Vec<Field>,
    rows: Vec<Vec<Value>>,
}

impl RecordSetBuilder {
    /// Adds a typed column.
    pub fn column(mut self, name: impl Into<String>, ty: ColumnType) -> Self {
        self.fields.push(Field::new(name, Some(ty)));
        self
    }

    /// Adds a column with no declared type.
    pub fn untyped_column(mut self, name: impl Into<String>) -> Self {
        self.fields.push(Field::new(name, None));
        self
    }

    /// Appends one row.
    pub fn row(mut self, values: Vec<Value>) -> Self {
        self.rows.push(values);
        self
    }

    /// Appends many rows.
    pub fn rows(mut self, rows: impl IntoIterator<Item = Vec<Value>>) -> Self {
        self.rows.extend(rows);
        self
    }

    /// # Errors
    /// `Unsupported` when a row's width differs from the column count.
    pub fn build(self) -> Result<RecordSet, StoreError> {
        RecordSet::new(self.table, self.fields, self.rows)
    }
}
