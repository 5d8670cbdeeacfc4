//! Object class descriptors.

use crate::property::{BaseType, CollectionKind, Property};
use crate::schema::Schema;
use tidedb_storage::TableKey;

/// How an object class is stored and referenced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TableType {
    /// A standalone class referenced by primary key.
    #[default]
    TopLevel,
    /// A standalone write-only class whose rows are not kept locally.
    TopLevelAsymmetric,
    /// A class owned by exactly one parent row, with no standalone lifetime.
    Embedded,
}

impl TableType {
    /// Returns a short name for diagnostics.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            TableType::TopLevel => "top-level",
            TableType::TopLevelAsymmetric => "asymmetric",
            TableType::Embedded => "embedded",
        }
    }

    /// Whether this is the embedded table type.
    #[must_use]
    pub fn is_embedded(self) -> bool {
        matches!(self, TableType::Embedded)
    }
}

/// Descriptor of one object class: its properties, table type, and keys.
///
/// Object schemas are value types. The opaque `table_key` is assigned by the
/// storage backend and imported via `Schema::copy_keys_from`; it does not
/// participate in equality.
#[derive(Debug, Clone, Default)]
pub struct ObjectSchema {
    /// Class name, unique within a schema.
    pub name: String,
    /// How the class is stored.
    pub table_type: TableType,
    /// Name of the primary-key property, if any.
    pub primary_key: Option<String>,
    /// Stored properties, in declaration order.
    pub persisted_properties: Vec<Property>,
    /// Derived properties; never added by a migration.
    pub computed_properties: Vec<Property>,
    /// Opaque backend table key; zero until imported.
    pub table_key: TableKey,
}

impl ObjectSchema {
    /// Creates an object schema with the given properties.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        table_type: TableType,
        persisted_properties: Vec<Property>,
    ) -> Self {
        Self {
            name: name.into(),
            table_type,
            primary_key: None,
            persisted_properties,
            computed_properties: Vec::new(),
            table_key: TableKey::default(),
        }
    }

    /// Declares the primary key, flagging the named property as primary.
    #[must_use]
    pub fn with_primary_key(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        for prop in &mut self.persisted_properties {
            prop.is_primary = prop.name == name;
        }
        self.primary_key = Some(name);
        self
    }

    /// Attaches computed properties.
    #[must_use]
    pub fn with_computed_properties(mut self, props: Vec<Property>) -> Self {
        self.computed_properties = props;
        self
    }

    /// Finds a persisted property by name.
    #[must_use]
    pub fn property_for_name(&self, name: &str) -> Option<&Property> {
        self.persisted_properties.iter().find(|p| p.name == name)
    }

    pub(crate) fn property_for_name_mut(&mut self, name: &str) -> Option<&mut Property> {
        self.persisted_properties.iter_mut().find(|p| p.name == name)
    }

    /// Finds a property by name across persisted and computed properties.
    #[must_use]
    pub fn property_for_name_including_computed(&self, name: &str) -> Option<&Property> {
        self.property_for_name(name)
            .or_else(|| self.computed_properties.iter().find(|p| p.name == name))
    }

    /// Returns the primary-key property, if one is declared and present.
    #[must_use]
    pub fn primary_key_property(&self) -> Option<&Property> {
        self.primary_key
            .as_deref()
            .and_then(|name| self.property_for_name(name))
    }

    /// Whether the given property is one of this object's computed properties.
    #[must_use]
    pub fn property_is_computed(&self, prop: &Property) -> bool {
        self.computed_properties.iter().any(|p| p.name == prop.name)
    }

    /// Collects every problem with this object schema into `errors`.
    ///
    /// Link targets are resolved against `schema`, so this assumes the
    /// schema's member list is final.
    pub(crate) fn validate(&self, schema: &Schema, errors: &mut Vec<String>) {
        // Duplicate property names, across persisted and computed.
        let mut names: Vec<&str> = self
            .persisted_properties
            .iter()
            .chain(&self.computed_properties)
            .map(|p| p.name.as_str())
            .collect();
        names.sort_unstable();
        for pair in names.windows(2) {
            if pair[0] == pair[1] {
                errors.push(format!(
                    "Property '{}.{}' appears more than once in the object schema.",
                    self.name, pair[0]
                ));
            }
        }

        for prop in &self.persisted_properties {
            self.validate_property(prop, schema, errors);
        }

        for prop in &self.computed_properties {
            if let Some(target) = &prop.object_type {
                if schema.find_by_name(target).is_none() {
                    errors.push(format!(
                        "Computed property '{}.{}' has unknown object type '{}'.",
                        self.name, prop.name, target
                    ));
                }
            }
        }

        self.validate_primary_key(errors);
    }

    fn validate_property(&self, prop: &Property, schema: &Schema, errors: &mut Vec<String>) {
        let qualified = format!("{}.{}", self.name, prop.name);

        if prop.ty.is_object() {
            match &prop.object_type {
                None => {
                    errors.push(format!(
                        "Property '{qualified}' of type 'object' must specify an object type."
                    ));
                }
                Some(target) => match schema.find_by_name(target) {
                    None => {
                        errors.push(format!(
                            "Property '{qualified}' of type 'object' has unknown object type '{target}'."
                        ));
                    }
                    Some(target_schema) => {
                        if target_schema.table_type == TableType::TopLevelAsymmetric {
                            errors.push(format!(
                                "Property '{qualified}' of type 'object' cannot link to asymmetric object type '{target}'."
                            ));
                        }
                    }
                },
            }
            match prop.ty.collection {
                CollectionKind::Single | CollectionKind::Dictionary => {
                    if !prop.ty.nullable {
                        errors.push(format!(
                            "Property '{qualified}' of type '{}' must be nullable.",
                            prop.ty
                        ));
                    }
                }
                CollectionKind::List | CollectionKind::Set => {
                    if prop.ty.nullable {
                        errors.push(format!(
                            "Property '{qualified}' of type '{}' cannot be nullable.",
                            prop.ty
                        ));
                    }
                }
            }
        } else if prop.object_type.is_some() {
            errors.push(format!(
                "Property '{qualified}' of type '{}' cannot specify an object type.",
                prop.ty
            ));
        }

        if prop.is_indexed && prop.is_fulltext_indexed {
            errors.push(format!(
                "Property '{qualified}' cannot be both indexed and full-text indexed."
            ));
        }
        if prop.is_fulltext_indexed
            && (prop.ty.base != BaseType::String || prop.ty.is_collection())
        {
            errors.push(format!(
                "Full-text index is not supported for property '{qualified}' of type '{}'.",
                prop.ty
            ));
        }
        if prop.is_indexed && (!prop.ty.base.is_indexable() || prop.ty.is_collection()) {
            errors.push(format!(
                "Property '{qualified}' of type '{}' cannot be indexed.",
                prop.ty
            ));
        }
    }

    fn validate_primary_key(&self, errors: &mut Vec<String>) {
        match self.primary_key.as_deref() {
            Some(pk) => {
                if self.table_type.is_embedded() {
                    errors.push(format!(
                        "Embedded object '{}' cannot have a primary key.",
                        self.name
                    ));
                }
                match self.property_for_name(pk) {
                    None => {
                        errors.push(format!(
                            "Specified primary key '{}.{pk}' does not exist.",
                            self.name
                        ));
                    }
                    Some(prop) => {
                        let valid_type = matches!(
                            prop.ty.base,
                            BaseType::Int | BaseType::String | BaseType::ObjectId
                        ) && !prop.ty.is_collection();
                        if !valid_type {
                            errors.push(format!(
                                "Property '{}.{pk}' of type '{}' cannot be made the primary key.",
                                self.name, prop.ty
                            ));
                        }
                        if !prop.is_primary {
                            errors.push(format!(
                                "Primary key property '{}.{pk}' must be flagged as primary.",
                                self.name
                            ));
                        }
                    }
                }
            }
            None => {
                for prop in &self.persisted_properties {
                    if prop.is_primary {
                        errors.push(format!(
                            "Property '{}.{}' is flagged as primary, but the object has no primary key.",
                            self.name, prop.name
                        ));
                    }
                }
            }
        }
        if let Some(pk) = self.primary_key.as_deref() {
            for prop in &self.persisted_properties {
                if prop.is_primary && prop.name != pk {
                    errors.push(format!(
                        "Property '{}.{}' is flagged as primary, but the object's primary key is '{pk}'.",
                        self.name, prop.name
                    ));
                }
            }
        }
    }
}

impl PartialEq for ObjectSchema {
    fn eq(&self, other: &Self) -> bool {
        // table_key is backend-assigned and not part of the logical identity.
        self.name == other.name
            && self.table_type == other.table_type
            && self.primary_key == other.primary_key
            && self.persisted_properties == other.persisted_properties
            && self.computed_properties == other.computed_properties
    }
}

impl Eq for ObjectSchema {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::property::PropertyType;

    fn validate_alone(object: ObjectSchema) -> Vec<String> {
        let schema = Schema::new([object.clone()]);
        let mut errors = Vec::new();
        object.validate(&schema, &mut errors);
        errors
    }

    #[test]
    fn valid_object_produces_no_errors() {
        let object = ObjectSchema::new(
            "Book",
            TableType::TopLevel,
            vec![
                Property::new("id", PropertyType::scalar(BaseType::Int)),
                Property::new("title", PropertyType::scalar(BaseType::String)).indexed(),
            ],
        )
        .with_primary_key("id");
        assert!(validate_alone(object).is_empty());
    }

    #[test]
    fn duplicate_property_reported() {
        let object = ObjectSchema::new(
            "A",
            TableType::TopLevel,
            vec![
                Property::new("x", PropertyType::scalar(BaseType::Int)),
                Property::new("x", PropertyType::scalar(BaseType::String)),
            ],
        );
        let errors = validate_alone(object);
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("'A.x' appears more than once"));
    }

    #[test]
    fn link_must_resolve() {
        let object = ObjectSchema::new(
            "A",
            TableType::TopLevel,
            vec![Property::object("b", "Missing")],
        );
        let errors = validate_alone(object);
        assert!(errors[0].contains("unknown object type 'Missing'"));
    }

    #[test]
    fn non_link_cannot_name_a_target() {
        let mut prop = Property::new("x", PropertyType::scalar(BaseType::Int));
        prop.object_type = Some("B".into());
        let object = ObjectSchema::new("A", TableType::TopLevel, vec![prop]);
        let errors = validate_alone(object);
        assert!(errors[0].contains("cannot specify an object type"));
    }

    #[test]
    fn single_link_must_be_nullable() {
        let mut prop = Property::object("b", "A");
        prop.ty.nullable = false;
        let object = ObjectSchema::new("A", TableType::TopLevel, vec![prop]);
        let errors = validate_alone(object);
        assert!(errors.iter().any(|e| e.contains("must be nullable")));
    }

    #[test]
    fn embedded_cannot_have_primary_key() {
        let object = ObjectSchema::new(
            "E",
            TableType::Embedded,
            vec![Property::new("id", PropertyType::scalar(BaseType::Int))],
        )
        .with_primary_key("id");
        let errors = validate_alone(object);
        assert!(errors
            .iter()
            .any(|e| e.contains("Embedded object 'E' cannot have a primary key")));
    }

    #[test]
    fn primary_key_base_types() {
        let object = ObjectSchema::new(
            "A",
            TableType::TopLevel,
            vec![Property::new("id", PropertyType::scalar(BaseType::ObjectId))],
        )
        .with_primary_key("id");
        assert!(validate_alone(object).is_empty());

        let object = ObjectSchema::new(
            "B",
            TableType::TopLevel,
            vec![Property::new("id", PropertyType::scalar(BaseType::Float))],
        )
        .with_primary_key("id");
        let errors = validate_alone(object);
        assert!(errors
            .iter()
            .any(|e| e.contains("'B.id' of type 'float' cannot be made the primary key")));
    }

    #[test]
    fn missing_primary_key_property_reported() {
        let object = ObjectSchema::new("A", TableType::TopLevel, vec![]).with_primary_key("id");
        let errors = validate_alone(object);
        assert!(errors[0].contains("Specified primary key 'A.id' does not exist"));
    }

    #[test]
    fn index_rules() {
        let object = ObjectSchema::new(
            "A",
            TableType::TopLevel,
            vec![
                Property::new("f", PropertyType::scalar(BaseType::Float)).indexed(),
                Property::new("s", PropertyType::scalar(BaseType::String))
                    .indexed()
                    .fulltext_indexed(),
                Property::new("n", PropertyType::scalar(BaseType::Int)).fulltext_indexed(),
            ],
        );
        let errors = validate_alone(object);
        assert!(errors.iter().any(|e| e.contains("'A.f'") && e.contains("cannot be indexed")));
        assert!(errors
            .iter()
            .any(|e| e.contains("'A.s' cannot be both indexed and full-text indexed")));
        assert!(errors
            .iter()
            .any(|e| e.contains("Full-text index is not supported for property 'A.n'")));
    }

    #[test]
    fn equality_ignores_table_key() {
        let a = ObjectSchema::new("A", TableType::TopLevel, vec![]);
        let mut b = a.clone();
        b.table_key = TableKey::new(9);
        assert_eq!(a, b);
    }
}
