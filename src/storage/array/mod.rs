//! Columnar array container backend.
//!
//! One file holds one node per table; see [`codec`] for the layout.

pub mod codec;
mod store;
mod writer;

pub use store::ArrayStore;
pub use writer::{layout_for, ArrayStoreWriter};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::RecordSet;
    use crate::schema::ColumnType;
    use crate::storage::traits::{StoreError, TableStore};
    use crate::value::Value;
    use tempfile::tempdir;

    fn agents() -> RecordSet {
        RecordSet::builder("AgentEntry")
            .column("AgentId", ColumnType::Int)
            .column("Spec", ColumnType::Text)
            .untyped_column("SimId")
            .row(vec![Value::Int(12), Value::from(":agents:Source"), Value::Blob(vec![1; 16])])
            .row(vec![Value::Int(13), Value::from(":agents:Sink"), Value::Blob(vec![1; 16])])
            .build()
            .unwrap()
    }

    #[test]
    fn test_written_tables_read_back_identically() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.nda");

        let mut writer = ArrayStoreWriter::new(&path);
        writer.add_table(&agents()).unwrap();
        writer.finish().unwrap();

        let store = ArrayStore::open(&path).unwrap();
        assert_eq!(store.table_names(), vec!["AgentEntry".to_string()]);
        assert!(store.has_table("/AgentEntry"));

        let read = store.read_table("AgentEntry").unwrap();
        assert_eq!(read.raw_rows(), agents().raw_rows());
        assert_eq!(read.fields()[2].ty, Some(ColumnType::Blob));

        let schema = store.schema("AgentEntry").unwrap();
        assert_eq!(schema[1].name, "Spec");
        assert_eq!(schema[1].ty, Some(ColumnType::Text));
    }

    #[test]
    fn test_missing_node_and_missing_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.nda");
        let mut writer = ArrayStoreWriter::new(&path);
        writer.add_table(&agents()).unwrap();
        writer.finish().unwrap();

        let store = ArrayStore::open(&path).unwrap();
        match store.read_table("Transactions") {
            Err(StoreError::SchemaMissing { tables }) => assert_eq!(tables, vec!["Transactions"]),
            other => panic!("expected SchemaMissing, got {other:?}"),
        }

        let missing = ArrayStore::open(dir.path().join("absent.nda"));
        assert!(matches!(missing, Err(StoreError::StoreNotFound { .. })));
    }

    #[test]
    fn test_null_values_are_rejected() {
        let dir = tempdir().unwrap();
        let table = RecordSet::builder("Resources")
            .column("Quantity", ColumnType::Float)
            .row(vec![Value::Null])
            .build()
            .unwrap();
        let mut writer = ArrayStoreWriter::new(dir.path().join("out.nda"));
        assert!(matches!(writer.add_table(&table), Err(StoreError::Unsupported { .. })));
    }

    #[test]
    fn test_dropped_writer_leaves_no_files() {
        let dir = tempdir().unwrap();
        {
            let mut writer = ArrayStoreWriter::new(dir.path().join("out.nda"));
            writer.add_table(&agents()).unwrap();
        }
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
