//! Table definitions and in-memory row storage.

use crate::error::{StorageError, StorageResult};
use crate::types::{ColKey, RowKey};
use crate::value::Value;
use std::collections::BTreeMap;

/// The declared type of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    /// 64-bit signed integer.
    Int,
    /// UTF-8 string.
    String,
    /// Byte blob.
    Bytes,
    /// 12-byte object identifier.
    ObjectId,
    /// Millisecond-precision timestamp.
    Timestamp,
    /// Ordered list of links to rows of another table.
    LinkList,
}

impl ColumnType {
    /// Returns a short name for diagnostics.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            ColumnType::Int => "int",
            ColumnType::String => "string",
            ColumnType::Bytes => "bytes",
            ColumnType::ObjectId => "object_id",
            ColumnType::Timestamp => "timestamp",
            ColumnType::LinkList => "link_list",
        }
    }

    fn accepts(self, value: &Value) -> bool {
        matches!(
            (self, value),
            (ColumnType::Int, Value::Int(_))
                | (ColumnType::String, Value::String(_))
                | (ColumnType::Bytes, Value::Bytes(_))
                | (ColumnType::ObjectId, Value::ObjectId(_))
                | (ColumnType::Timestamp, Value::Timestamp(_))
                | (ColumnType::LinkList, Value::LinkList(_))
        )
    }
}

/// Declaration of a single column.
#[derive(Debug, Clone)]
pub struct ColumnSpec {
    /// Column name, unique within its table.
    pub name: String,
    /// Declared type.
    pub ty: ColumnType,
    /// Whether `Null` may be stored.
    pub nullable: bool,
}

impl ColumnSpec {
    /// Creates a non-nullable column spec.
    #[must_use]
    pub fn new(name: impl Into<String>, ty: ColumnType) -> Self {
        Self {
            name: name.into(),
            ty,
            nullable: false,
        }
    }

    /// Creates a nullable column spec.
    #[must_use]
    pub fn nullable(name: impl Into<String>, ty: ColumnType) -> Self {
        Self {
            name: name.into(),
            ty,
            nullable: true,
        }
    }
}

/// Declaration of a table.
#[derive(Debug, Clone)]
pub struct TableSpec {
    /// Table name, unique within the database.
    pub name: String,
    /// Ordered column declarations.
    pub columns: Vec<ColumnSpec>,
    /// Name of the primary-key column, if any.
    pub primary_key: Option<String>,
}

impl TableSpec {
    /// Creates a table spec without a primary key.
    #[must_use]
    pub fn new(name: impl Into<String>, columns: Vec<ColumnSpec>) -> Self {
        Self {
            name: name.into(),
            columns,
            primary_key: None,
        }
    }

    /// Sets the primary-key column by name.
    #[must_use]
    pub fn with_primary_key(mut self, column: impl Into<String>) -> Self {
        self.primary_key = Some(column.into());
        self
    }
}

#[derive(Debug, Clone)]
pub(crate) struct Column {
    pub key: ColKey,
    pub spec: ColumnSpec,
}

/// In-memory representation of a table, cloned wholesale into snapshots.
#[derive(Debug, Clone)]
pub(crate) struct Table {
    pub name: String,
    pub columns: Vec<Column>,
    pub primary_key: Option<ColKey>,
    pub rows: BTreeMap<RowKey, BTreeMap<u64, Value>>,
    pub next_row: u64,
}

impl Table {
    pub fn column(&self, key: ColKey) -> StorageResult<&Column> {
        self.columns
            .iter()
            .find(|c| c.key == key)
            .ok_or(StorageError::UnknownColumnKey {
                table: self.name.clone(),
                key: key.as_u64(),
            })
    }

    pub fn column_by_name(&self, name: &str) -> StorageResult<&Column> {
        self.columns
            .iter()
            .find(|c| c.spec.name == name)
            .ok_or_else(|| StorageError::column_not_found(&self.name, name))
    }

    pub fn get(&self, row: RowKey, col: ColKey) -> StorageResult<Value> {
        let column = self.column(col)?;
        let fields = self.rows.get(&row).ok_or(StorageError::RowNotFound {
            table: self.name.clone(),
            row: row.as_u64(),
        })?;
        // Unwritten cells read as Null.
        Ok(fields
            .get(&col.as_u64())
            .cloned()
            .unwrap_or(match column.spec.ty {
                ColumnType::LinkList => Value::LinkList(Vec::new()),
                _ => Value::Null,
            }))
    }

    pub fn set(&mut self, row: RowKey, col: ColKey, value: Value) -> StorageResult<()> {
        let column = self.column(col)?;
        if value.is_null() {
            if !column.spec.nullable {
                return Err(StorageError::NotNullable {
                    column: format!("{}.{}", self.name, column.spec.name),
                });
            }
        } else if !column.spec.ty.accepts(&value) {
            return Err(StorageError::type_mismatch(
                format!("{}.{}", self.name, column.spec.name),
                column.spec.ty.name(),
                value.type_name(),
            ));
        }
        let fields = self.rows.get_mut(&row).ok_or(StorageError::RowNotFound {
            table: self.name.clone(),
            row: row.as_u64(),
        })?;
        fields.insert(col.as_u64(), value);
        Ok(())
    }

    pub fn insert_row(&mut self) -> RowKey {
        let key = RowKey::new(self.next_row);
        self.next_row += 1;
        self.rows.insert(key, BTreeMap::new());
        key
    }

    pub fn delete_row(&mut self, row: RowKey) -> StorageResult<()> {
        self.rows
            .remove(&row)
            .map(|_| ())
            .ok_or(StorageError::RowNotFound {
                table: self.name.clone(),
                row: row.as_u64(),
            })
    }

    pub fn find_first(&self, col: ColKey, value: &Value) -> StorageResult<Option<RowKey>> {
        self.column(col)?;
        for (&row, fields) in &self.rows {
            if fields.get(&col.as_u64()) == Some(value) {
                return Ok(Some(row));
            }
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ColKey;

    fn test_table() -> Table {
        Table {
            name: "t".to_string(),
            columns: vec![
                Column {
                    key: ColKey::new(1),
                    spec: ColumnSpec::new("n", ColumnType::Int),
                },
                Column {
                    key: ColKey::new(2),
                    spec: ColumnSpec::nullable("s", ColumnType::String),
                },
            ],
            primary_key: None,
            rows: BTreeMap::new(),
            next_row: 0,
        }
    }

    #[test]
    fn set_and_get_roundtrip() {
        let mut table = test_table();
        let row = table.insert_row();
        table.set(row, ColKey::new(1), Value::Int(42)).unwrap();
        assert_eq!(table.get(row, ColKey::new(1)).unwrap(), Value::Int(42));
    }

    #[test]
    fn unwritten_cell_reads_null() {
        let mut table = test_table();
        let row = table.insert_row();
        assert_eq!(table.get(row, ColKey::new(2)).unwrap(), Value::Null);
    }

    #[test]
    fn type_mismatch_rejected() {
        let mut table = test_table();
        let row = table.insert_row();
        let err = table.set(row, ColKey::new(1), Value::from("x")).unwrap_err();
        assert!(matches!(err, StorageError::TypeMismatch { .. }));
    }

    #[test]
    fn null_rejected_on_non_nullable() {
        let mut table = test_table();
        let row = table.insert_row();
        let err = table.set(row, ColKey::new(1), Value::Null).unwrap_err();
        assert!(matches!(err, StorageError::NotNullable { .. }));
        table.set(row, ColKey::new(2), Value::Null).unwrap();
    }

    #[test]
    fn row_keys_are_insertion_ordered() {
        let mut table = test_table();
        let r1 = table.insert_row();
        let r2 = table.insert_row();
        assert!(r1 < r2);
        table.delete_row(r1).unwrap();
        let r3 = table.insert_row();
        assert!(r3 > r2, "row keys are never reused");
    }

    #[test]
    fn find_first_matches_written_value() {
        let mut table = test_table();
        let r1 = table.insert_row();
        let r2 = table.insert_row();
        table.set(r1, ColKey::new(1), Value::Int(1)).unwrap();
        table.set(r2, ColKey::new(1), Value::Int(2)).unwrap();
        assert_eq!(
            table.find_first(ColKey::new(1), &Value::Int(2)).unwrap(),
            Some(r2)
        );
        assert_eq!(
            table.find_first(ColKey::new(1), &Value::Int(3)).unwrap(),
            None
        );
    }
}
