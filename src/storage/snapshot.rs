//! Backend-neutral collection of tables.
//!
//! A [`Snapshot`] is the unit moved between backends: read every table from
//! one store, write the same tables to another.

use std::path::PathBuf;

use crate::record::RecordSet;
use crate::storage::array::ArrayStoreWriter;
use crate::storage::relational::RelationalStoreWriter;
use crate::storage::traits::{BackendKind, StoreError, StoreHandle, TableStore};

/// An ordered set of tables.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    tables: Vec<RecordSet>,
}

impl Snapshot {
    /// An empty snapshot.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a table, replacing any table with the same name.
    #[must_use]
    pub fn with_table(mut self, table: RecordSet) -> Self {
        self.insert(table);
        self
    }

    /// Adds a table in place, replacing any table with the same name.
    pub fn insert(&mut self, table: RecordSet) {
        match self.tables.iter_mut().find(|t| t.table() == table.table()) {
            Some(slot) => *slot = table,
            None => self.tables.push(table),
        }
    }

    /// Removes and returns the table named `name`.
    pub fn remove(&mut self, name: &str) -> Option<RecordSet> {
        let idx = self.tables.iter().position(|t| t.table() == name)?;
        Some(self.tables.remove(idx))
    }

    /// The table named `name`.
    pub fn table(&self, name: &str) -> Option<&RecordSet> {
        self.tables.iter().find(|t| t.table() == name)
    }

    /// Every table in insertion order.
    pub fn tables(&self) -> &[RecordSet] {
        &self.tables
    }

    /// Reads every table of a store.
    pub fn read_from(store: &dyn TableStore) -> Result<Self, StoreError> {
        let tables = store
            .table_names()
            .iter()
            .map(|name| store.read_table(name))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { tables })
    }

    /// Writes every table to `handle` in that handle's backend format,
    /// replacing any existing file.
    pub fn write(&self, handle: &StoreHandle) -> Result<PathBuf, StoreError> {
        match handle.kind {
            BackendKind::Array => {
                let mut writer = ArrayStoreWriter::new(&handle.path);
                for table in &self.tables {
                    writer.add_table(table)?;
                }
                writer.finish()
            }
            BackendKind::Relational => {
                if handle.path.exists() {
                    std::fs::remove_file(&handle.path)?;
                }
                let mut writer = RelationalStoreWriter::create(&handle.path)?;
                for table in &self.tables {
                    writer.add_table(table)?;
                }
                writer.finish()
            }
        }
    }
}
