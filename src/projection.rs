//! Record projection: turns one column of a record set into a typed vector.
//!
//! The target type comes from the canonical schema when the table and column
//! are known, then from the backend's declared field type, then from the
//! first non-null value. Coercion is strict: integers never come from
//! floats, and nulls are always a mismatch.

use crate::error::ProjectionError;
use crate::record::RecordSet;
use crate::schema::ColumnType;
use crate::value::Value;

/// A projected column, in row order.
#[derive(Debug, Clone, PartialEq)]
#[allow(missing_docs)]
pub enum Column {
    Int(Vec<i64>),
    Float(Vec<f64>),
    Text(Vec<String>),
    Blob(Vec<Vec<u8>>),
}

impl Column {
    /// Element type of the column.
    pub const fn ty(&self) -> ColumnType {
        match self {
            Self::Int(_) => ColumnType::Int,
            Self::Float(_) => ColumnType::Float,
            Self::Text(_) => ColumnType::Text,
            Self::Blob(_) => ColumnType::Blob,
        }
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        match self {
            Self::Int(v) => v.len(),
            Self::Float(v) => v.len(),
            Self::Text(v) => v.len(),
            Self::Blob(v) => v.len(),
        }
    }

    /// True when the table has no rows.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn target_type(records: &RecordSet, idx: usize, name: &str) -> ColumnType {
    records
        .schema()
        .and_then(|s| s.column_type(name))
        .or(records.fields()[idx].ty)
        .or_else(|| {
            records.column_values(idx).find_map(|v| match v {
                Value::Int(_) => Some(ColumnType::Int),
                Value::Float(_) => Some(ColumnType::Float),
                Value::Text(_) => Some(ColumnType::Text),
                Value::Blob(_) => Some(ColumnType::Blob),
                Value::Null => None,
            })
        })
        .unwrap_or(ColumnType::Text)
}

/// Projects a column using its inferred type.
///
/// # Errors
/// - `UnknownColumn`: the record set has no such column
/// - `TypeMismatch`: a value cannot be coerced to the column type
pub fn project(records: &RecordSet, name: &str) -> Result<Column, ProjectionError> {
    let idx = column_index(records, name)?;
    let ty = target_type(records, idx, name);
    project_index(records, idx, name, ty)
}

/// Projects a column as integers.
///
/// # Errors
/// `UnknownColumn`, or `TypeMismatch` naming the first offending row.
pub fn project_ints(records: &RecordSet, name: &str) -> Result<Vec<i64>, ProjectionError> {
    collect(records, column_index(records, name)?, name, ColumnType::Int, Value::as_int)
}

/// Projects a column as floats; integers widen.
pub fn project_floats(records: &RecordSet, name: &str) -> Result<Vec<f64>, ProjectionError> {
    collect(records, column_index(records, name)?, name, ColumnType::Float, Value::as_float)
}

/// Projects a column as text.
pub fn project_texts(records: &RecordSet, name: &str) -> Result<Vec<String>, ProjectionError> {
    collect(records, column_index(records, name)?, name, ColumnType::Text, |v| {
        v.as_text().map(str::to_string)
    })
}

/// Projects a column as raw bytes.
pub fn project_blobs(records: &RecordSet, name: &str) -> Result<Vec<Vec<u8>>, ProjectionError> {
    collect(records, column_index(records, name)?, name, ColumnType::Blob, |v| {
        v.as_bytes().map(<[u8]>::to_vec)
    })
}

fn column_index(records: &RecordSet, name: &str) -> Result<usize, ProjectionError> {
    records.column_index(name).ok_or_else(|| ProjectionError::UnknownColumn {
        table: records.table().to_string(),
        column: name.to_string(),
    })
}

fn collect<T>(
    records: &RecordSet,
    idx: usize,
    name: &str,
    ty: ColumnType,
    convert: impl Fn(&Value) -> Option<T>,
) -> Result<Vec<T>, ProjectionError> {
    records
        .column_values(idx)
        .enumerate()
        .map(|(row, value)| {
            convert(value).ok_or_else(|| ProjectionError::TypeMismatch {
                table: records.table().to_string(),
                column: name.to_string(),
                row,
                expected: ty,
                found: value.type_name(),
            })
        })
        .collect()
}

fn project_index(records: &RecordSet, idx: usize, name: &str, ty: ColumnType) -> Result<Column, ProjectionError> {
    match ty {
        ColumnType::Int => collect(records, idx, name, ty, Value::as_int).map(Column::Int),
        ColumnType::Float => collect(records, idx, name, ty, Value::as_float).map(Column::Float),
        ColumnType::Text => collect(records, idx, name, ty, |v| v.as_text().map(str::to_string)).map(Column::Text),
        ColumnType::Blob => collect(records, idx, name, ty, |v| v.as_bytes().map(<[u8]>::to_vec)).map(Column::Blob),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn transactions(ids: &[Value]) -> RecordSet {
        RecordSet::builder("Transactions")
            .untyped_column("TransactionId")
            .column("Commodity", ColumnType::Text)
            .rows(ids.iter().map(|id| vec![id.clone(), Value::from("fuel")]))
            .build()
            .unwrap()
    }

    #[test]
    fn test_schema_type_wins_over_values() {
        let rs = transactions(&[Value::Int(0), Value::Int(1)]);
        assert_eq!(project(&rs, "TransactionId").unwrap(), Column::Int(vec![0, 1]));
        assert_eq!(
            project(&rs, "Commodity").unwrap(),
            Column::Text(vec!["fuel".to_string(), "fuel".to_string()])
        );
    }

    #[test]
    fn test_float_in_int_column_is_a_mismatch() {
        let rs = transactions(&[Value::Int(0), Value::Float(1.0)]);
        match project(&rs, "TransactionId") {
            Err(ProjectionError::TypeMismatch { row, expected, found, .. }) => {
                assert_eq!(row, 1);
                assert_eq!(expected, ColumnType::Int);
                assert_eq!(found, "float");
            }
            other => panic!("expected TypeMismatch, got {other:?}"),
        }
    }

    #[test]
    fn test_null_is_a_mismatch() {
        let rs = transactions(&[Value::Null]);
        assert!(matches!(
            project(&rs, "TransactionId"),
            Err(ProjectionError::TypeMismatch { found: "null", .. })
        ));
    }

    #[test]
    fn test_unknown_column() {
        let rs = transactions(&[]);
        assert_eq!(
            project(&rs, "Quantity").unwrap_err(),
            ProjectionError::UnknownColumn {
                table: "Transactions".to_string(),
                column: "Quantity".to_string(),
            }
        );
        assert!(project(&rs, "TransactionId").unwrap().is_empty());
    }

    #[test]
    fn test_untyped_extra_column_infers_from_values() {
        let rs = RecordSet::builder("Compositions")
            .untyped_column("MassFrac")
            .row(vec![Value::Null])
            .row(vec![Value::Float(0.7)])
            .build()
            .unwrap();
        let err = project(&rs, "MassFrac").unwrap_err();
        assert!(matches!(err, ProjectionError::TypeMismatch { expected: ColumnType::Float, row: 0, .. }));
    }

    #[test]
    fn test_ints_widen_to_floats_and_text_reads_as_blob() {
        let rs = RecordSet::builder("Resources")
            .column("Quantity", ColumnType::Float)
            .column("Units", ColumnType::Text)
            .row(vec![Value::Int(10), Value::from("kg")])
            .build()
            .unwrap();
        assert_eq!(project_floats(&rs, "Quantity").unwrap(), vec![10.0]);
        assert_eq!(project_blobs(&rs, "Units").unwrap(), vec![b"kg".to_vec()]);
        assert!(project_ints(&rs, "Units").is_err());
        assert_eq!(project_texts(&rs, "Units").unwrap(), vec!["kg".to_string()]);
    }

    proptest! {
        #[test]
        fn prop_int_projection_preserves_order(ids in prop::collection::vec(any::<i64>(), 0..64)) {
            let values: Vec<Value> = ids.iter().copied().map(Value::Int).collect();
            let rs = transactions(&values);
            prop_assert_eq!(project_ints(&rs, "TransactionId").unwrap(), ids);
        }

        #[test]
        fn prop_float_projection_accepts_ints(ints in prop::collection::vec(-1_000_000i64..1_000_000, 1..32)) {
            let rs = RecordSet::builder("Resources")
                .column("Quantity", ColumnType::Float)
                .rows(ints.iter().map(|i| vec![Value::Int(*i)]))
                .build()
                .unwrap();
            let floats = project_floats(&rs, "Quantity").unwrap();
            prop_assert_eq!(floats.len(), ints.len());
            for (f, i) in floats.iter().zip(&ints) {
                #[allow(clippy::cast_precision_loss)]
                let expected = *i as f64;
                prop_assert_eq!(*f, expected);
            }
        }
    }
}
