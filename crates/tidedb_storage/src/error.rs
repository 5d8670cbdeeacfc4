//! Error types for the storage backend.

use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur in storage operations.
///
/// Storage errors are cloneable so that layers above can carry them inside
/// notification resolutions without consuming the original.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StorageError {
    /// A table with the given name already exists.
    #[error("table already exists: {name}")]
    TableExists {
        /// Name of the conflicting table.
        name: String,
    },

    /// The table key does not refer to a live table.
    #[error("unknown table key: {key}")]
    UnknownTableKey {
        /// The stale key.
        key: u32,
    },

    /// No column with the given name exists on the table.
    #[error("column not found: {table}.{name}")]
    ColumnNotFound {
        /// Table the lookup ran against.
        table: String,
        /// Column name that was looked up.
        name: String,
    },

    /// The column key does not refer to a column of the table.
    #[error("unknown column key {key} on table {table}")]
    UnknownColumnKey {
        /// Table the lookup ran against.
        table: String,
        /// The stale key.
        key: u64,
    },

    /// The row key does not refer to a live row.
    #[error("row {row} not found in table {table}")]
    RowNotFound {
        /// Table the lookup ran against.
        table: String,
        /// The stale row key.
        row: u64,
    },

    /// A value of the wrong type was written to or read from a column.
    #[error("type mismatch on column {column}: expected {expected}, got {actual}")]
    TypeMismatch {
        /// Column the access ran against.
        column: String,
        /// The column's declared type.
        expected: String,
        /// The type of the offending value.
        actual: String,
    },

    /// Null was written to a non-nullable column.
    #[error("column {column} is not nullable")]
    NotNullable {
        /// The offending column.
        column: String,
    },

    /// The table declares no primary key.
    #[error("table {table} has no primary key")]
    NoPrimaryKey {
        /// Table the lookup ran against.
        table: String,
    },
}

impl StorageError {
    /// Creates a column-not-found error.
    pub fn column_not_found(table: impl Into<String>, name: impl Into<String>) -> Self {
        Self::ColumnNotFound {
            table: table.into(),
            name: name.into(),
        }
    }

    /// Creates a type-mismatch error.
    pub fn type_mismatch(
        column: impl Into<String>,
        expected: impl Into<String>,
        actual: impl Into<String>,
    ) -> Self {
        Self::TypeMismatch {
            column: column.into(),
            expected: expected.into(),
            actual: actual.into(),
        }
    }
}
