//! Read side of the array container.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use super::codec::{self, NodeEntry};
use crate::record::{Field, RecordSet};
use crate::schema::ColumnInfo;
use crate::storage::traits::{BackendKind, StoreError, TableStore};

/// A columnar array container loaded into memory.
///
/// The file is read once at open and no handle is held afterwards. Record
/// blocks are checksummed and decoded lazily, per table read.
#[derive(Debug)]
pub struct ArrayStore {
    path: PathBuf,
    bytes: Vec<u8>,
    nodes: Vec<NodeEntry>,
}

impl ArrayStore {
    /// Opens and indexes a container.
    ///
    /// # Errors
    /// - `StoreNotFound`: the file does not exist
    /// - `Corrupt`: the header or node directory is malformed
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(StoreError::StoreNotFound {
                path: path.to_path_buf(),
            });
        }
        let bytes = fs::read(path)?;
        let nodes = codec::decode_directory(&bytes).map_err(|reason| StoreError::corrupt(path, reason))?;
        debug!(path = %path.display(), nodes = nodes.len(), "opened array container");
        Ok(Self {
            path: path.to_path_buf(),
            bytes,
            nodes,
        })
    }

    fn node(&self, name: &str) -> Result<&NodeEntry, StoreError> {
        let name = name.strip_prefix('/').unwrap_or(name);
        self.nodes
            .iter()
            .find(|n| n.layout.name == name)
            .ok_or_else(|| StoreError::schema_missing(name))
    }
}

impl TableStore for ArrayStore {
    fn kind(&self) -> BackendKind {
        BackendKind::Array
    }

    fn path(&self) -> &Path {
        &self.path
    }

    fn table_names(&self) -> Vec<String> {
        self.nodes.iter().map(|n| n.layout.name.clone()).collect()
    }

    fn read_table(&self, name: &str) -> Result<RecordSet, StoreError> {
        let entry = self.node(name)?;
        let rows = codec::decode_rows(&self.bytes, entry).map_err(|reason| StoreError::corrupt(&self.path, reason))?;
        let fields = entry
            .layout
            .fields
            .iter()
            .map(|f| Field::new(f.name.clone(), Some(f.kind.column_type())))
            .collect();
        RecordSet::new(entry.layout.name.clone(), fields, rows)
    }

    fn schema(&self, name: &str) -> Result<Vec<ColumnInfo>, StoreError> {
        let entry = self.node(name)?;
        Ok(entry
            .layout
            .fields
            .iter()
            .enumerate()
            .map(|(index, f)| ColumnInfo {
                table: entry.layout.name.clone(),
                name: f.name.clone(),
                index,
                ty: Some(f.kind.column_type()),
            })
            .collect())
    }
}
