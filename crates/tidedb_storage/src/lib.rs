//! # TideDB Storage
//!
//! Metadata storage backend for TideDB.
//!
//! This crate provides:
//! - Named tables with typed, optionally nullable columns
//! - Opaque table, column, and row keys
//! - Snapshot-isolated read transactions
//! - Single-writer write transactions with monotonic commit versions
//! - Commit observers for post-commit dispatch
//!
//! The backend is an in-memory store sized for metadata tables. It is not a
//! general-purpose database engine; TideDB's sync layer stores a handful of
//! small rows here and relies on the versioning and isolation guarantees.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod database;
mod error;
mod table;
mod transaction;
mod types;
mod value;

pub use database::Database;
pub use error::{StorageError, StorageResult};
pub use table::{ColumnSpec, ColumnType, TableSpec};
pub use transaction::{ReadTransaction, WriteTransaction};
pub use types::{ColKey, RowKey, TableKey};
pub use value::{ObjectId, Timestamp, Value};
