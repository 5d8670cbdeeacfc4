//! Migration steps produced by a schema diff.

use crate::object_schema::{ObjectSchema, TableType};
use crate::property::Property;

/// The kind of index an [`SchemaChange::AddIndex`] step creates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexKind {
    /// A general-purpose equality index.
    General,
    /// A full-text index.
    Fulltext,
}

/// One step of a schema migration.
///
/// Changes borrow into the existing and target schemas they were produced
/// from; both must outlive the consumption of the change list. Equality is
/// structural: the variant tag first, then the referenced descriptors
/// field-wise.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaChange<'a> {
    /// Create the table for a class that exists only in the target.
    AddTable {
        /// The class to create, from the target schema.
        object: &'a ObjectSchema,
    },
    /// Drop the table for a class that exists only in the existing schema.
    RemoveTable {
        /// The class to drop, from the existing schema.
        object: &'a ObjectSchema,
    },
    /// Change a class between top-level, asymmetric, and embedded storage.
    ChangeTableType {
        /// The class being changed, from the target schema.
        object: &'a ObjectSchema,
        /// The table type in the existing schema.
        old_table_type: TableType,
        /// The table type in the target schema.
        new_table_type: TableType,
    },
    /// Populate every column of a freshly added table.
    AddInitialProperties {
        /// The freshly added class, from the target schema.
        object: &'a ObjectSchema,
    },
    /// Add one column to an existing table.
    AddProperty {
        /// The class being changed, from the existing schema.
        object: &'a ObjectSchema,
        /// The column to add, from the target schema.
        property: &'a Property,
    },
    /// Remove one column from an existing table.
    RemoveProperty {
        /// The class being changed, from the existing schema.
        object: &'a ObjectSchema,
        /// The column to remove, from the existing schema.
        property: &'a Property,
    },
    /// Replace a column whose type changed.
    ChangePropertyType {
        /// The class being changed, from the existing schema.
        object: &'a ObjectSchema,
        /// The column as it exists.
        old_property: &'a Property,
        /// The column as the target declares it.
        new_property: &'a Property,
    },
    /// Allow nulls in a previously required column.
    MakePropertyNullable {
        /// The class being changed, from the existing schema.
        object: &'a ObjectSchema,
        /// The column being relaxed, from the existing schema.
        property: &'a Property,
    },
    /// Forbid nulls in a previously nullable column.
    MakePropertyRequired {
        /// The class being changed, from the existing schema.
        object: &'a ObjectSchema,
        /// The column being tightened, from the existing schema.
        property: &'a Property,
    },
    /// Create an index on a column.
    AddIndex {
        /// The class being changed, from the existing schema.
        object: &'a ObjectSchema,
        /// The column to index, from the existing schema.
        property: &'a Property,
        /// Which kind of index to create.
        kind: IndexKind,
    },
    /// Drop the index on a column.
    RemoveIndex {
        /// The class being changed, from the existing schema.
        object: &'a ObjectSchema,
        /// The column to de-index, from the existing schema.
        property: &'a Property,
    },
    /// Change which column is the primary key.
    ChangePrimaryKey {
        /// The class being changed, from the existing schema.
        object: &'a ObjectSchema,
        /// The new primary-key column from the target schema, or `None` to
        /// drop the primary key.
        property: Option<&'a Property>,
    },
}

impl SchemaChange<'_> {
    /// Returns the name of the class this change applies to.
    #[must_use]
    pub fn object_name(&self) -> &str {
        match self {
            SchemaChange::AddTable { object }
            | SchemaChange::RemoveTable { object }
            | SchemaChange::ChangeTableType { object, .. }
            | SchemaChange::AddInitialProperties { object }
            | SchemaChange::AddProperty { object, .. }
            | SchemaChange::RemoveProperty { object, .. }
            | SchemaChange::ChangePropertyType { object, .. }
            | SchemaChange::MakePropertyNullable { object, .. }
            | SchemaChange::MakePropertyRequired { object, .. }
            | SchemaChange::AddIndex { object, .. }
            | SchemaChange::RemoveIndex { object, .. }
            | SchemaChange::ChangePrimaryKey { object, .. } => &object.name,
        }
    }
}
