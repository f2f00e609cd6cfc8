//! Table store adapter.
//!
//! Opens an output file through the backend its extension names and checks
//! that the tables a caller needs are present before handing it out.

pub mod array;
pub mod relational;
mod snapshot;
mod traits;

use tracing::{debug, warn};

use crate::schema::TableName;

pub use array::{ArrayStore, ArrayStoreWriter};
pub use relational::{RelationalStore, RelationalStoreWriter};
pub use snapshot::Snapshot;
pub use traits::{BackendKind, StoreError, StoreHandle, TableStore};

/// Opens a store and requires all four canonical tables.
///
/// # Errors
/// - `StoreNotFound`: the file does not exist
/// - `SchemaMissing`: one or more canonical tables are absent
pub fn open_store(handle: &StoreHandle) -> Result<Box<dyn TableStore>, StoreError> {
    open_store_with(handle, &TableName::ALL)
}

/// Opens a store and requires only the listed tables.
///
/// Every missing table is reported, not just the first.
pub fn open_store_with(handle: &StoreHandle, required: &[TableName]) -> Result<Box<dyn TableStore>, StoreError> {
    if !handle.path.exists() {
        return Err(StoreError::StoreNotFound {
            path: handle.path.clone(),
        });
    }

    let store: Box<dyn TableStore> = match handle.kind {
        BackendKind::Array => Box::new(ArrayStore::open(&handle.path)?),
        BackendKind::Relational => Box::new(RelationalStore::open(&handle.path)?),
    };

    let missing: Vec<String> = required
        .iter()
        .filter(|t| !store.has_table(t.as_str()))
        .map(|t| t.as_str().to_string())
        .collect();
    if !missing.is_empty() {
        warn!(path = %handle.path.display(), missing = ?missing, "store is missing required tables");
        return Err(StoreError::SchemaMissing { tables: missing });
    }

    debug!(path = %handle.path.display(), backend = %handle.kind, "store opened");
    Ok(store)
}
