//! Round-trip tests: executing the changes a diff produces must transform
//! the existing schema into the target schema.

use proptest::prelude::*;
use std::collections::BTreeMap;
use tidedb_schema::{
    BaseType, ObjectSchema, Property, PropertyType, Schema, SchemaChange, SchemaMode, TableType,
};

/// A minimal migration executor, enough to verify diff round-trips.
fn apply(existing: &Schema, changes: &[SchemaChange<'_>]) -> Schema {
    let mut objects: BTreeMap<String, ObjectSchema> = existing
        .iter()
        .cloned()
        .map(|o| (o.name.clone(), o))
        .collect();

    for change in changes {
        match change {
            SchemaChange::AddTable { object } => {
                objects.insert(
                    object.name.clone(),
                    ObjectSchema::new(object.name.clone(), object.table_type, vec![]),
                );
            }
            SchemaChange::AddInitialProperties { object } => {
                objects.insert(object.name.clone(), (*object).clone());
            }
            SchemaChange::RemoveTable { object } => {
                objects.remove(&object.name);
            }
            SchemaChange::ChangeTableType {
                object,
                new_table_type,
                ..
            } => {
                objects.get_mut(&object.name).unwrap().table_type = *new_table_type;
            }
            SchemaChange::AddProperty { object, property } => {
                objects
                    .get_mut(&object.name)
                    .unwrap()
                    .persisted_properties
                    .push((*property).clone());
            }
            SchemaChange::RemoveProperty { object, property } => {
                objects
                    .get_mut(&object.name)
                    .unwrap()
                    .persisted_properties
                    .retain(|p| p.name != property.name);
            }
            SchemaChange::ChangePropertyType {
                object,
                old_property,
                new_property,
            } => {
                let obj = objects.get_mut(&object.name).unwrap();
                let slot = obj
                    .persisted_properties
                    .iter_mut()
                    .find(|p| p.name == old_property.name)
                    .unwrap();
                *slot = (*new_property).clone();
            }
            SchemaChange::MakePropertyNullable { object, property } => {
                objects
                    .get_mut(&object.name)
                    .unwrap()
                    .persisted_properties
                    .iter_mut()
                    .find(|p| p.name == property.name)
                    .unwrap()
                    .ty
                    .nullable = true;
            }
            SchemaChange::MakePropertyRequired { object, property } => {
                objects
                    .get_mut(&object.name)
                    .unwrap()
                    .persisted_properties
                    .iter_mut()
                    .find(|p| p.name == property.name)
                    .unwrap()
                    .ty
                    .nullable = false;
            }
            SchemaChange::AddIndex {
                object,
                property,
                kind,
            } => {
                let prop = objects
                    .get_mut(&object.name)
                    .unwrap()
                    .persisted_properties
                    .iter_mut()
                    .find(|p| p.name == property.name)
                    .unwrap();
                match kind {
                    tidedb_schema::IndexKind::General => prop.is_indexed = true,
                    tidedb_schema::IndexKind::Fulltext => prop.is_fulltext_indexed = true,
                }
            }
            SchemaChange::RemoveIndex { object, property } => {
                let prop = objects
                    .get_mut(&object.name)
                    .unwrap()
                    .persisted_properties
                    .iter_mut()
                    .find(|p| p.name == property.name)
                    .unwrap();
                // The change references the existing property; its flags say
                // which index is being removed.
                if property.is_fulltext_indexed {
                    prop.is_fulltext_indexed = false;
                } else {
                    prop.is_indexed = false;
                }
            }
            SchemaChange::ChangePrimaryKey { object, property } => {
                let obj = objects.get_mut(&object.name).unwrap();
                let pk = property.map(|p| p.name.clone());
                for prop in &mut obj.persisted_properties {
                    prop.is_primary = pk.as_deref() == Some(prop.name.as_str());
                }
                obj.primary_key = pk;
            }
        }
    }

    Schema::new(objects.into_values())
}

/// Equality up to property order, which the diff neither detects nor
/// recreates; real executors control physical column order themselves.
fn canonical(schema: &Schema) -> Schema {
    Schema::new(schema.iter().cloned().map(|mut o| {
        o.persisted_properties.sort_by(|a, b| a.name.cmp(&b.name));
        o
    }))
}

#[test]
fn renaming_a_property_round_trips() {
    let existing = Schema::new([ObjectSchema::new(
        "A",
        TableType::TopLevel,
        vec![
            Property::new("id", PropertyType::scalar(BaseType::Int)),
            Property::new("x", PropertyType::scalar(BaseType::String)),
        ],
    )
    .with_primary_key("id")]);
    let target = Schema::new([ObjectSchema::new(
        "A",
        TableType::TopLevel,
        vec![
            Property::new("id", PropertyType::scalar(BaseType::Int)),
            Property::new("y", PropertyType::scalar(BaseType::String)),
        ],
    )
    .with_primary_key("id")]);

    let changes = existing.compare(&target, SchemaMode::Automatic, true);
    assert_eq!(changes.len(), 2);
    assert!(matches!(
        changes[0],
        SchemaChange::AddProperty { property, .. } if property.name == "y"
    ));
    assert!(matches!(
        changes[1],
        SchemaChange::RemoveProperty { property, .. } if property.name == "x"
    ));

    assert_eq!(canonical(&apply(&existing, &changes)), canonical(&target));
}

#[test]
fn embedding_a_class_round_trips() {
    let existing = Schema::new([
        ObjectSchema::new(
            "Parent",
            TableType::TopLevel,
            vec![Property::object("child", "Child")],
        ),
        ObjectSchema::new(
            "Child",
            TableType::TopLevel,
            vec![Property::new("n", PropertyType::scalar(BaseType::Int))],
        ),
    ]);
    let target = Schema::new([
        ObjectSchema::new(
            "Parent",
            TableType::TopLevel,
            vec![Property::object("child", "Child")],
        ),
        ObjectSchema::new(
            "Child",
            TableType::Embedded,
            vec![Property::new("n", PropertyType::scalar(BaseType::Int))],
        ),
    ]);

    let changes = existing.compare(&target, SchemaMode::Automatic, true);
    assert_eq!(canonical(&apply(&existing, &changes)), canonical(&target));
}

#[derive(Debug, Clone, Copy)]
enum IndexFlag {
    None,
    General,
    Fulltext,
}

fn property_value_strategy() -> impl Strategy<Value = Property> {
    (
        prop::sample::select(vec![
            BaseType::Bool,
            BaseType::Int,
            BaseType::Float,
            BaseType::Double,
            BaseType::String,
            BaseType::Binary,
            BaseType::Timestamp,
            BaseType::ObjectId,
        ]),
        any::<bool>(),
        prop::sample::select(vec![IndexFlag::None, IndexFlag::General, IndexFlag::Fulltext]),
    )
        .prop_map(|(base, nullable, index)| {
            let mut ty = PropertyType::scalar(base);
            ty.nullable = nullable;
            let mut prop = Property::new("unnamed", ty);
            match index {
                IndexFlag::None => {}
                IndexFlag::General => prop.is_indexed = true,
                IndexFlag::Fulltext => prop.is_fulltext_indexed = true,
            }
            prop
        })
}

fn schema_strategy() -> impl Strategy<Value = Schema> {
    prop::collection::btree_map(
        prop::sample::select(vec!["A", "B", "C", "D"]),
        prop::collection::btree_map(
            prop::sample::select(vec!["p0", "p1", "p2", "p3", "p4"]),
            property_value_strategy(),
            0..4,
        ),
        0..4,
    )
    .prop_map(|objects| {
        Schema::new(objects.into_iter().map(|(name, props)| {
            ObjectSchema::new(
                name,
                TableType::TopLevel,
                props
                    .into_iter()
                    .map(|(prop_name, mut prop)| {
                        prop.name = prop_name.to_string();
                        prop
                    })
                    .collect(),
            )
        }))
    })
}

proptest! {
    #[test]
    fn diff_round_trips(existing in schema_strategy(), target in schema_strategy()) {
        let changes = existing.compare(&target, SchemaMode::Automatic, true);
        prop_assert_eq!(canonical(&apply(&existing, &changes)), canonical(&target));
    }

    #[test]
    fn self_diff_is_empty(schema in schema_strategy()) {
        prop_assert!(schema.compare(&schema, SchemaMode::Automatic, true).is_empty());
        prop_assert!(schema.compare(&schema, SchemaMode::AdditiveDiscovered, false).is_empty());
    }
}
