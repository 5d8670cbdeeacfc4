//! Property descriptors.

use std::fmt;
use tidedb_storage::ColKey;

/// The base type of a property, before collection shape and nullability.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BaseType {
    /// Boolean.
    Bool,
    /// 64-bit signed integer.
    Int,
    /// 32-bit float.
    Float,
    /// 64-bit float.
    Double,
    /// UTF-8 string.
    String,
    /// Byte blob.
    Binary,
    /// Millisecond-precision timestamp.
    Timestamp,
    /// A 12-byte object identifier.
    ObjectId,
    /// Any of the above, decided per value.
    Mixed,
    /// A link to another object class.
    Object,
}

impl BaseType {
    /// Returns a short name for diagnostics.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            BaseType::Bool => "bool",
            BaseType::Int => "int",
            BaseType::Float => "float",
            BaseType::Double => "double",
            BaseType::String => "string",
            BaseType::Binary => "binary",
            BaseType::Timestamp => "timestamp",
            BaseType::ObjectId => "object_id",
            BaseType::Mixed => "mixed",
            BaseType::Object => "object",
        }
    }

    /// Whether a general index may be placed on this base type.
    #[must_use]
    pub fn is_indexable(self) -> bool {
        matches!(
            self,
            BaseType::Bool
                | BaseType::Int
                | BaseType::String
                | BaseType::Timestamp
                | BaseType::ObjectId
                | BaseType::Mixed
        )
    }
}

/// The collection shape of a property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CollectionKind {
    /// A single value.
    #[default]
    Single,
    /// An ordered list.
    List,
    /// An unordered set.
    Set,
    /// A string-keyed dictionary.
    Dictionary,
}

/// The full type of a property: base type, collection shape, and nullability.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PropertyType {
    /// The base type.
    pub base: BaseType,
    /// The collection shape.
    pub collection: CollectionKind,
    /// Whether values (or collection elements) may be null.
    pub nullable: bool,
}

impl PropertyType {
    /// A single required value of the given base type.
    #[must_use]
    pub const fn scalar(base: BaseType) -> Self {
        Self {
            base,
            collection: CollectionKind::Single,
            nullable: false,
        }
    }

    /// A list of the given base type.
    #[must_use]
    pub const fn list(base: BaseType) -> Self {
        Self {
            base,
            collection: CollectionKind::List,
            nullable: false,
        }
    }

    /// A set of the given base type.
    #[must_use]
    pub const fn set(base: BaseType) -> Self {
        Self {
            base,
            collection: CollectionKind::Set,
            nullable: false,
        }
    }

    /// A dictionary of the given base type.
    #[must_use]
    pub const fn dictionary(base: BaseType) -> Self {
        Self {
            base,
            collection: CollectionKind::Dictionary,
            nullable: false,
        }
    }

    /// Returns the same type with nullability flipped on.
    #[must_use]
    pub const fn into_nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    /// Whether the base type is an object link.
    #[must_use]
    pub const fn is_object(self) -> bool {
        matches!(self.base, BaseType::Object)
    }

    /// Whether the property is a list, set, or dictionary.
    #[must_use]
    pub const fn is_collection(self) -> bool {
        !matches!(self.collection, CollectionKind::Single)
    }
}

impl fmt::Display for PropertyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.collection {
            CollectionKind::Single => write!(f, "{}", self.base.name())?,
            CollectionKind::List => write!(f, "list<{}>", self.base.name())?,
            CollectionKind::Set => write!(f, "set<{}>", self.base.name())?,
            CollectionKind::Dictionary => write!(f, "dictionary<{}>", self.base.name())?,
        }
        if self.nullable {
            write!(f, "?")?;
        }
        Ok(())
    }
}

/// Descriptor of one column of an object class.
///
/// Properties are value types; the opaque `column_key` is assigned by the
/// storage backend and imported via `Schema::copy_keys_from`. Two properties
/// compare equal when everything except the backend key matches.
#[derive(Debug, Clone)]
pub struct Property {
    /// Property name, unique within its object class.
    pub name: String,
    /// The full type.
    pub ty: PropertyType,
    /// Target class name; present iff the base type is an object link.
    pub object_type: Option<String>,
    /// Whether this property is the object's primary key.
    pub is_primary: bool,
    /// Whether a general index is requested.
    pub is_indexed: bool,
    /// Whether a full-text index is requested.
    pub is_fulltext_indexed: bool,
    /// Opaque backend column key; zero until imported.
    pub column_key: ColKey,
}

impl Property {
    /// Creates a property with the given name and type.
    #[must_use]
    pub fn new(name: impl Into<String>, ty: PropertyType) -> Self {
        Self {
            name: name.into(),
            ty,
            object_type: None,
            is_primary: false,
            is_indexed: false,
            is_fulltext_indexed: false,
            column_key: ColKey::default(),
        }
    }

    /// Creates an object-link property targeting the given class.
    #[must_use]
    pub fn object(name: impl Into<String>, target: impl Into<String>) -> Self {
        let mut prop = Self::new(
            name,
            PropertyType::scalar(BaseType::Object).into_nullable(),
        );
        prop.object_type = Some(target.into());
        prop
    }

    /// Creates a list-of-links property targeting the given class.
    #[must_use]
    pub fn object_list(name: impl Into<String>, target: impl Into<String>) -> Self {
        let mut prop = Self::new(name, PropertyType::list(BaseType::Object));
        prop.object_type = Some(target.into());
        prop
    }

    /// Marks this property as the primary key.
    #[must_use]
    pub fn primary(mut self) -> Self {
        self.is_primary = true;
        self
    }

    /// Requests a general index.
    #[must_use]
    pub fn indexed(mut self) -> Self {
        self.is_indexed = true;
        self
    }

    /// Requests a full-text index.
    #[must_use]
    pub fn fulltext_indexed(mut self) -> Self {
        self.is_fulltext_indexed = true;
        self
    }

    /// Whether this property wants a general index.
    #[must_use]
    pub fn requires_index(&self) -> bool {
        self.is_indexed
    }

    /// Whether this property wants a full-text index.
    #[must_use]
    pub fn requires_fulltext_index(&self) -> bool {
        self.is_fulltext_indexed
    }

    /// Whether this property is an object link or a collection of links.
    #[must_use]
    pub fn is_link(&self) -> bool {
        self.ty.is_object()
    }
}

impl PartialEq for Property {
    fn eq(&self, other: &Self) -> bool {
        // column_key is backend-assigned and not part of the logical identity.
        self.name == other.name
            && self.ty == other.ty
            && self.object_type == other.object_type
            && self.is_primary == other.is_primary
            && self.is_indexed == other.is_indexed
            && self.is_fulltext_indexed == other.is_fulltext_indexed
    }
}

impl Eq for Property {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_display() {
        assert_eq!(PropertyType::scalar(BaseType::Int).to_string(), "int");
        assert_eq!(
            PropertyType::list(BaseType::String).into_nullable().to_string(),
            "list<string>?"
        );
        assert_eq!(
            PropertyType::dictionary(BaseType::Object).to_string(),
            "dictionary<object>"
        );
    }

    #[test]
    fn equality_ignores_column_key() {
        let a = Property::new("x", PropertyType::scalar(BaseType::Int));
        let mut b = a.clone();
        b.column_key = ColKey::new(7);
        assert_eq!(a, b);
    }

    #[test]
    fn object_constructor_sets_target() {
        let prop = Property::object("author", "Person");
        assert!(prop.is_link());
        assert!(prop.ty.nullable);
        assert_eq!(prop.object_type.as_deref(), Some("Person"));

        let list = Property::object_list("books", "Book");
        assert!(list.is_link());
        assert!(list.ty.is_collection());
        assert!(!list.ty.nullable);
    }

    #[test]
    fn indexable_base_types() {
        assert!(BaseType::Int.is_indexable());
        assert!(BaseType::String.is_indexable());
        assert!(!BaseType::Float.is_indexable());
        assert!(!BaseType::Binary.is_indexable());
    }
}
