//! # TideDB Schema
//!
//! Schema engine for TideDB.
//!
//! This crate provides:
//! - [`Property`] and [`ObjectSchema`] descriptors for columns and object classes
//! - [`Schema`], an ordered collection with lookup, validation, and diffing
//! - [`SchemaChange`], the ordered migration steps produced by a diff
//!
//! Validation collects every problem before failing, so callers see the full
//! set of errors in one [`SchemaError`]. Diffing emits changes in the order a
//! migration executor must apply them: tables first, then columns, then
//! table-type changes.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod change;
mod error;
mod graph;
mod object_schema;
mod property;
mod schema;

pub use change::{IndexKind, SchemaChange};
pub use error::{SchemaError, SchemaResult};
pub use object_schema::{ObjectSchema, TableType};
pub use property::{BaseType, CollectionKind, Property, PropertyType};
pub use schema::{Schema, SchemaMode, SchemaSubsetMode, SchemaValidationMode};
