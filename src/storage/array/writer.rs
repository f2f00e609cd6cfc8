//! Write side of the array container.

use std::fs::{self, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use tracing::debug;
use uuid::Uuid;

use super::codec::{self, FieldKind, FieldLayout, NodeLayout};
use crate::record::RecordSet;
use crate::schema::ColumnType;
use crate::storage::traits::StoreError;
use crate::value::Value;

/// Derives the fixed-width layout used to store a record set.
///
/// Declared field types win; untyped fields take the type of their first
/// non-null value. Text and blob widths are the longest stored value.
pub fn layout_for(records: &RecordSet) -> Result<NodeLayout, StoreError> {
    let mut fields = Vec::with_capacity(records.fields().len());
    for (idx, field) in records.fields().iter().enumerate() {
        let ty = field
            .ty
            .or_else(|| records.column_values(idx).find_map(inferred_type))
            .unwrap_or(ColumnType::Text);

        let kind = match ty {
            ColumnType::Int => FieldKind::I64,
            ColumnType::Float => FieldKind::F64,
            ColumnType::Text | ColumnType::Blob => {
                let longest = records
                    .column_values(idx)
                    .filter_map(Value::as_bytes)
                    .map(<[u8]>::len)
                    .max()
                    .unwrap_or(0)
                    .max(1);
                let width = u32::try_from(longest)
                    .ok()
                    .filter(|w| *w <= codec::MAX_FIELD_WIDTH)
                    .ok_or_else(|| StoreError::Unsupported {
                        reason: format!(
                            "column '{}.{}' holds a {longest}-byte value, above the container limit",
                            records.table(),
                            field.name
                        ),
                    })?;
                if ty == ColumnType::Text {
                    FieldKind::Text(width)
                } else {
                    FieldKind::Bytes(width)
                }
            }
        };
        fields.push(FieldLayout {
            name: field.name.clone(),
            kind,
        });
    }
    Ok(NodeLayout {
        name: records.table().to_string(),
        fields,
    })
}

const fn inferred_type(value: &Value) -> Option<ColumnType> {
    match value {
        Value::Int(_) => Some(ColumnType::Int),
        Value::Float(_) => Some(ColumnType::Float),
        Value::Text(_) => Some(ColumnType::Text),
        Value::Blob(_) => Some(ColumnType::Blob),
        Value::Null => None,
    }
}

/// Builds an array container atomically.
///
/// Nodes are encoded as they are added and written to a temporary file on
/// [`finish`](Self::finish), which is then renamed over the final path.
/// Dropping an unfinished writer leaves no file behind.
pub struct ArrayStoreWriter {
    final_path: PathBuf,
    temp_path: Option<PathBuf>,
    nodes: Vec<Vec<u8>>,
    names: Vec<String>,
}

impl ArrayStoreWriter {
    /// A writer that publishes to `final_path` on [`ArrayStoreWriter::finish`].
    pub fn new(final_path: impl Into<PathBuf>) -> Self {
        let final_path = final_path.into();
        let temp_path = final_path.with_extension(format!("nda.tmp.{}", Uuid::new_v4()));
        Self {
            final_path,
            temp_path: Some(temp_path),
            nodes: Vec::new(),
            names: Vec::new(),
        }
    }

    /// Encodes one table as a node.
    ///
    /// # Errors
    /// - `Unsupported`: a value is null, does not match its column, or a
    ///   table with the same name was already added
    pub fn add_table(&mut self, records: &RecordSet) -> Result<(), StoreError> {
        if self.names.iter().any(|n| n == records.table()) {
            return Err(StoreError::Unsupported {
                reason: format!("table '{}' added twice", records.table()),
            });
        }
        let layout = layout_for(records)?;
        let encoded = codec::encode_node(&layout, records.raw_rows()).map_err(|reason| StoreError::Unsupported {
            reason: format!("table '{}': {reason}", records.table()),
        })?;
        self.names.push(records.table().to_string());
        self.nodes.push(encoded);
        Ok(())
    }

    /// Writes, syncs and renames the container into place.
    pub fn finish(mut self) -> Result<PathBuf, StoreError> {
        let temp_path = self
            .temp_path
            .clone()
            .ok_or_else(|| StoreError::Backend("writer already finished".to_string()))?;

        let header = codec::encode_header(self.nodes.len()).map_err(|reason| StoreError::Unsupported { reason })?;
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&temp_path)?;
        let mut writer = BufWriter::new(file);
        writer.write_all(&header)?;
        for node in &self.nodes {
            writer.write_all(node)?;
        }
        writer.flush()?;
        writer.get_ref().sync_all()?;
        drop(writer);

        fs::rename(&temp_path, &self.final_path)?;
        self.temp_path = None;
        debug!(path = %self.final_path.display(), tables = ?self.names, "wrote array container");
        Ok(self.final_path.clone())
    }

    /// Final path of the container.
    pub fn path(&self) -> &Path {
        &self.final_path
    }
}

impl Drop for ArrayStoreWriter {
    fn drop(&mut self) {
        if let Some(ref temp_path) = self.temp_path {
            if temp_path.exists() {
                let _ = fs::remove_file(temp_path);
            }
        }
    }
}
