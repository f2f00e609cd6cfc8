//! Relational database backend.
//!
//! Each canonical table is an SQL table of the same name. The file is
//! opened read-only; nothing in the verifier ever mutates an output.

use std::fs;
use std::path::{Path, PathBuf};

use rusqlite::types::{Value as SqlValue, ValueRef};
use rusqlite::{params_from_iter, Connection, OpenFlags};
use tracing::debug;
use uuid::Uuid;

use crate::record::{Field, RecordSet};
use crate::schema::{ColumnInfo, ColumnType};
use crate::storage::traits::{BackendKind, StoreError, TableStore};
use crate::value::Value;

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Read-only view of a relational output file.
#[derive(Debug)]
pub struct RelationalStore {
    path: PathBuf,
    conn: Connection,
    tables: Vec<String>,
}

impl RelationalStore {
    /// Opens a database file read-only and lists its tables.
    ///
    /// # Errors
    /// - `StoreNotFound`: the file does not exist
    /// - `Backend`: the file is not a readable database
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(StoreError::StoreNotFound {
                path: path.to_path_buf(),
            });
        }
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        let tables = {
            let mut stmt = conn.prepare("SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY rowid")?;
            let names = stmt.query_map([], |row| row.get::<_, String>(0))?;
            names.collect::<Result<Vec<_>, _>>()?
        };
        debug!(path = %path.display(), tables = tables.len(), "opened relational store");
        Ok(Self {
            path: path.to_path_buf(),
            conn,
            tables,
        })
    }

    fn resolve(&self, name: &str) -> Result<&str, StoreError> {
        let name = name.strip_prefix('/').unwrap_or(name);
        self.tables
            .iter()
            .find(|t| *t == name)
            .map(String::as_str)
            .ok_or_else(|| StoreError::schema_missing(name))
    }

    fn declared_columns(&self, table: &str) -> Result<Vec<(String, Option<ColumnType>)>, StoreError> {
        let mut stmt = self.conn.prepare(&format!("PRAGMA table_info({})", quote_ident(table)))?;
        let columns = stmt.query_map([], |row| {
            let name: String = row.get(1)?;
            let declared: Option<String> = row.get(2)?;
            Ok((name, declared.as_deref().and_then(ColumnType::from_declared)))
        })?;
        Ok(columns.collect::<Result<Vec<_>, _>>()?)
    }
}

fn from_sql(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(v) => Value::Int(v),
        ValueRef::Real(v) => Value::Float(v),
        ValueRef::Text(v) => match std::str::from_utf8(v) {
            Ok(s) => Value::Text(s.to_string()),
            Err(_) => Value::Blob(v.to_vec()),
        },
        ValueRef::Blob(v) => Value::Blob(v.to_vec()),
    }
}

fn to_sql(value: &Value) -> SqlValue {
    match value {
        Value::Int(v) => SqlValue::Integer(*v),
        Value::Float(v) => SqlValue::Real(*v),
        Value::Text(v) => SqlValue::Text(v.clone()),
        Value::Blob(v) => SqlValue::Blob(v.clone()),
        Value::Null => SqlValue::Null,
    }
}

impl TableStore for RelationalStore {
    fn kind(&self) -> BackendKind {
        BackendKind::Relational
    }

    fn path(&self) -> &Path {
        &self.path
    }

    fn table_names(&self) -> Vec<String> {
        self.tables.clone()
    }

    fn read_table(&self, name: &str) -> Result<RecordSet, StoreError> {
        let table = self.resolve(name)?;
        let declared = self.declared_columns(table)?;

        let mut stmt = self.conn.prepare(&format!("SELECT * FROM {} ORDER BY rowid", quote_ident(table)))?;
        let names: Vec<String> = stmt.column_names().into_iter().map(str::to_string).collect();
        let fields = names
            .iter()
            .map(|n| {
                let ty = declared.iter().find(|(d, _)| d == n).and_then(|(_, ty)| *ty);
                Field::new(n.clone(), ty)
            })
            .collect();

        let width = names.len();
        let mut rows = Vec::new();
        let mut cursor = stmt.query([])?;
        while let Some(row) = cursor.next()? {
            let mut values = Vec::with_capacity(width);
            for idx in 0..width {
                values.push(from_sql(row.get_ref(idx)?));
            }
            rows.push(values);
        }
        RecordSet::new(table, fields, rows)
    }

    fn schema(&self, name: &str) -> Result<Vec<ColumnInfo>, StoreError> {
        let table = self.resolve(name)?;
        Ok(self
            .declared_columns(table)?
            .into_iter()
            .enumerate()
            .map(|(index, (name, ty))| ColumnInfo {
                table: table.to_string(),
                name,
                index,
                ty,
            })
            .collect())
    }
}

/// Materializes record sets as a relational database file.
///
/// Tables are written inside one transaction into a temporary file that is
/// renamed over the final path on [`finish`](Self::finish).
pub struct RelationalStoreWriter {
    final_path: PathBuf,
    temp_path: Option<PathBuf>,
    conn: Option<Connection>,
}

impl RelationalStoreWriter {
    /// Opens a temporary database next to `final_path`.
    ///
    /// # Errors
    /// The temporary database cannot be created.
    pub fn create(final_path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let final_path = final_path.into();
        let temp_path = final_path.with_extension(format!("sqlite.tmp.{}", Uuid::new_v4()));
        let conn = Connection::open(&temp_path)?;
        Ok(Self {
            final_path,
            temp_path: Some(temp_path),
            conn: Some(conn),
        })
    }

    /// Creates a table and inserts every row in order.
    pub fn add_table(&mut self, records: &RecordSet) -> Result<(), StoreError> {
        if records.fields().is_empty() {
            return Err(StoreError::Unsupported {
                reason: format!("table '{}' has no columns", records.table()),
            });
        }
        let conn = self
            .conn
            .as_mut()
            .ok_or_else(|| StoreError::Backend("writer already finished".to_string()))?;

        let columns: Vec<String> = records
            .fields()
            .iter()
            .map(|f| match f.ty {
                Some(ty) => format!("{} {}", quote_ident(&f.name), ty.declared()),
                None => quote_ident(&f.name),
            })
            .collect();
        let table = quote_ident(records.table());

        let tx = conn.transaction()?;
        tx.execute(&format!("CREATE TABLE {table} ({})", columns.join(", ")), [])?;
        {
            let placeholders = vec!["?"; records.fields().len()].join(", ");
            let mut insert = tx.prepare(&format!("INSERT INTO {table} VALUES ({placeholders})"))?;
            for row in records.raw_rows() {
                insert.execute(params_from_iter(row.iter().map(to_sql)))?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    /// Closes the database and renames it into place.
    pub fn finish(mut self) -> Result<PathBuf, StoreError> {
        if let Some(conn) = self.conn.take() {
            conn.close().map_err(|(_, err)| StoreError::from(err))?;
        }
        let temp_path = self
            .temp_path
            .take()
            .ok_or_else(|| StoreError::Backend("writer already finished".to_string()))?;
        if let Err(err) = fs::rename(&temp_path, &self.final_path) {
            let _ = fs::remove_file(&temp_path);
            return Err(err.into());
        }
        debug!(path = %self.final_path.display(), "wrote relational store");
        Ok(self.final_path.clone())
    }
}

impl Drop for RelationalStoreWriter {
    fn drop(&mut self) {
        self.conn.take();
        if let Some(ref temp_path) = self.temp_path {
            if temp_path.exists() {
                let _ = fs::remove_file(temp_path);
            }
        }
    }
}
