//! The schema container: lookup, validation, and diffing.

use crate::change::{IndexKind, SchemaChange};
use crate::error::{SchemaError, SchemaResult};
use crate::graph;
use crate::object_schema::ObjectSchema;
use std::cmp::Ordering;
use std::collections::BTreeSet;
use tidedb_storage::TableKey;

/// Flags controlling which validations run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SchemaValidationMode {
    /// Report embedded classes unreachable from any top-level class.
    pub reject_embedded_orphans: bool,
}

impl SchemaValidationMode {
    /// The base validation set.
    pub const BASIC: Self = Self {
        reject_embedded_orphans: false,
    };
    /// Base validations plus orphan rejection.
    pub const REJECT_EMBEDDED_ORPHANS: Self = Self {
        reject_embedded_orphans: true,
    };
}

/// How a diff treats classes the target discovered but does not reach.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SchemaMode {
    /// Diff the schemas as declared.
    #[default]
    Automatic,
    /// The target was discovered from an additive source: embedded orphans in
    /// the target are silently excluded from table additions.
    AdditiveDiscovered,
}

/// Which parts of a backend schema `copy_keys_from` may inherit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SchemaSubsetMode {
    /// Inherit classes the backend has but the target schema does not mention.
    pub include_types: bool,
    /// Inherit properties the backend has but a matched class does not mention.
    pub include_properties: bool,
}

impl SchemaSubsetMode {
    /// Import keys only; inherit nothing.
    pub const STRICT: Self = Self {
        include_types: false,
        include_properties: false,
    };
    /// Inherit backend-only classes.
    pub const ALL_CLASSES: Self = Self {
        include_types: true,
        include_properties: false,
    };
    /// Inherit backend-only properties of matched classes.
    pub const ALL_PROPERTIES: Self = Self {
        include_types: false,
        include_properties: true,
    };
    /// Inherit everything the backend has.
    pub const COMPLETE: Self = Self {
        include_types: true,
        include_properties: true,
    };
}

/// An ordered collection of object schemas, kept sorted by class name.
///
/// Lookup by name is a binary search; lookup by table key is linear, which
/// is fine at metadata scale. Schemas are value types and freely copyable.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Schema {
    objects: Vec<ObjectSchema>,
}

impl Schema {
    /// Creates a schema from the given classes, sorting them by name.
    ///
    /// No validation happens here; call [`Schema::validate`] once the schema
    /// is assembled.
    #[must_use]
    pub fn new(types: impl IntoIterator<Item = ObjectSchema>) -> Self {
        let mut objects: Vec<_> = types.into_iter().collect();
        objects.sort_by(|a, b| a.name.cmp(&b.name));
        Self { objects }
    }

    /// Returns the number of classes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    /// Returns true if the schema has no classes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Iterates the classes in name order.
    pub fn iter(&self) -> std::slice::Iter<'_, ObjectSchema> {
        self.objects.iter()
    }

    /// Returns the classes as a slice, in name order.
    #[must_use]
    pub fn as_slice(&self) -> &[ObjectSchema] {
        &self.objects
    }

    /// Finds a class by name.
    #[must_use]
    pub fn find_by_name(&self, name: &str) -> Option<&ObjectSchema> {
        self.objects
            .binary_search_by(|o| o.name.as_str().cmp(name))
            .ok()
            .map(|idx| &self.objects[idx])
    }

    /// Finds the member matching another class descriptor, by name.
    #[must_use]
    pub fn find(&self, object: &ObjectSchema) -> Option<&ObjectSchema> {
        self.find_by_name(&object.name)
    }

    /// Finds a class by its opaque backend table key.
    #[must_use]
    pub fn find_by_table_key(&self, key: TableKey) -> Option<&ObjectSchema> {
        if key == TableKey::default() {
            return None;
        }
        self.objects.iter().find(|o| o.table_key == key)
    }

    /// Validates the whole schema, collecting every problem before failing.
    ///
    /// Validation runs in phases so later phases can assume earlier
    /// invariants: duplicate names first, then per-class checks, and only on
    /// a clean schema the embedded-cycle check and (under
    /// `reject_embedded_orphans`) orphan detection, both of which rely on
    /// all link targets being defined.
    pub fn validate(&self, mode: SchemaValidationMode) -> SchemaResult<()> {
        let mut errors = Vec::new();

        // The list is sorted, so duplicates are adjacent.
        for pair in self.objects.windows(2) {
            if pair[0].name == pair[1].name {
                errors.push(format!(
                    "Type '{}' appears more than once in the schema.",
                    pair[0].name
                ));
            }
        }

        for object in &self.objects {
            object.validate(self, &mut errors);
        }

        if errors.is_empty() {
            for object in &self.objects {
                if object.table_type.is_embedded() {
                    if let Some(path) = graph::embedded_cycle_path(self, object) {
                        errors.push(format!(
                            "Cycles containing embedded objects are not currently supported: '{path}'"
                        ));
                    }
                }
            }

            if mode.reject_embedded_orphans {
                for name in graph::embedded_orphans(self) {
                    errors.push(format!(
                        "Embedded object '{name}' is unreachable by any link path from top level objects."
                    ));
                }
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(SchemaError::validation(errors))
        }
    }

    /// Diffs `self` (the existing schema) against `target`, producing the
    /// migration steps that transform one into the other.
    ///
    /// The emitted order is part of the contract: table additions and
    /// removals first, then per-class column changes in match order, then
    /// table-type changes last so they observe the final column graph.
    #[must_use]
    pub fn compare<'a>(
        &'a self,
        target: &'a Schema,
        mode: SchemaMode,
        include_table_removals: bool,
    ) -> Vec<SchemaChange<'a>> {
        let orphans = match mode {
            SchemaMode::AdditiveDiscovered => graph::embedded_orphans(target),
            SchemaMode::Automatic => BTreeSet::new(),
        };
        let mut changes = Vec::new();

        // Add and remove tables.
        zip_matching(&target.objects, &self.objects, |target_obj, existing| {
            match (target_obj, existing) {
                (Some(t), None) => {
                    if !orphans.contains(&t.name) {
                        changes.push(SchemaChange::AddTable { object: t });
                    }
                }
                (None, Some(e)) => {
                    if include_table_removals {
                        changes.push(SchemaChange::RemoveTable { object: e });
                    }
                }
                _ => {}
            }
        });

        // Modify columns.
        zip_matching(&target.objects, &self.objects, |target_obj, existing| {
            match (target_obj, existing) {
                (Some(t), Some(e)) => compare_objects(e, t, &mut changes),
                (Some(t), None) => {
                    if !orphans.contains(&t.name) {
                        changes.push(SchemaChange::AddInitialProperties { object: t });
                    }
                }
                _ => {}
            }
        });

        // Table-type changes run last, after column changes settle the link
        // graph they may depend on.
        zip_matching(&target.objects, &self.objects, |target_obj, existing| {
            if let (Some(t), Some(e)) = (target_obj, existing) {
                if e.table_type != t.table_type {
                    changes.push(SchemaChange::ChangeTableType {
                        object: t,
                        old_table_type: e.table_type,
                        new_table_type: t.table_type,
                    });
                }
            }
        });

        changes
    }

    /// Imports opaque backend keys from `other` onto matching classes and
    /// properties of `self`.
    ///
    /// With `include_properties`, backend-only properties of matched classes
    /// are appended. With `include_types`, backend-only classes are appended
    /// whole (with exactly the properties listed in `other`) and the schema
    /// is re-sorted.
    pub fn copy_keys_from(&mut self, other: &Schema, subset_mode: SchemaSubsetMode) {
        let mut inherited: Vec<ObjectSchema> = Vec::new();
        let (mut i, mut j) = (0, 0);

        while i < self.objects.len() && j < other.objects.len() {
            match self.objects[i].name.cmp(&other.objects[j].name) {
                Ordering::Less => i += 1,
                Ordering::Greater => {
                    if subset_mode.include_types {
                        inherited.push(other.objects[j].clone());
                    }
                    j += 1;
                }
                Ordering::Equal => {
                    let other_obj = &other.objects[j];
                    let existing = &mut self.objects[i];
                    existing.table_key = other_obj.table_key;
                    for other_prop in &other_obj.persisted_properties {
                        if let Some(prop) = existing.property_for_name_mut(&other_prop.name) {
                            prop.column_key = other_prop.column_key;
                        } else if subset_mode.include_properties {
                            existing.persisted_properties.push(other_prop.clone());
                        }
                    }
                    i += 1;
                    j += 1;
                }
            }
        }
        if subset_mode.include_types {
            inherited.extend(other.objects[j..].iter().cloned());
        }

        if !inherited.is_empty() {
            self.objects.extend(inherited);
            self.objects.sort_by(|a, b| a.name.cmp(&b.name));
        }
    }
}

impl FromIterator<ObjectSchema> for Schema {
    fn from_iter<T: IntoIterator<Item = ObjectSchema>>(iter: T) -> Self {
        Self::new(iter)
    }
}

impl<'a> IntoIterator for &'a Schema {
    type Item = &'a ObjectSchema;
    type IntoIter = std::slice::Iter<'a, ObjectSchema>;

    fn into_iter(self) -> Self::IntoIter {
        self.objects.iter()
    }
}

/// Merge-walks two name-sorted class lists, calling `f` with the matched
/// pair, or with one side `None` where a name is missing from the other
/// list.
fn zip_matching<'a>(
    a: &'a [ObjectSchema],
    b: &'a [ObjectSchema],
    mut f: impl FnMut(Option<&'a ObjectSchema>, Option<&'a ObjectSchema>),
) {
    let (mut i, mut j) = (0, 0);
    while i < a.len() && j < b.len() {
        match a[i].name.cmp(&b[j].name) {
            Ordering::Equal => {
                f(Some(&a[i]), Some(&b[j]));
                i += 1;
                j += 1;
            }
            Ordering::Less => {
                f(Some(&a[i]), None);
                i += 1;
            }
            Ordering::Greater => {
                f(None, Some(&b[j]));
                j += 1;
            }
        }
    }
    for obj in &a[i..] {
        f(Some(obj), None);
    }
    for obj in &b[j..] {
        f(None, Some(obj));
    }
}

/// Diffs the columns of one matched class pair.
///
/// Additions are emitted before removals and modifications so that executors
/// observe new columns before old ones disappear.
fn compare_objects<'a>(
    existing: &'a ObjectSchema,
    target: &'a ObjectSchema,
    changes: &mut Vec<SchemaChange<'a>>,
) {
    for target_prop in &target.persisted_properties {
        if existing
            .property_for_name_including_computed(&target_prop.name)
            .is_none()
        {
            changes.push(SchemaChange::AddProperty {
                object: existing,
                property: target_prop,
            });
        }
    }

    for current_prop in &existing.persisted_properties {
        let Some(target_prop) = target.property_for_name_including_computed(&current_prop.name)
        else {
            changes.push(SchemaChange::RemoveProperty {
                object: existing,
                property: current_prop,
            });
            continue;
        };
        if target.property_is_computed(target_prop) {
            changes.push(SchemaChange::RemoveProperty {
                object: existing,
                property: current_prop,
            });
            continue;
        }
        if current_prop.ty.base != target_prop.ty.base
            || current_prop.object_type != target_prop.object_type
            || current_prop.ty.collection != target_prop.ty.collection
        {
            changes.push(SchemaChange::ChangePropertyType {
                object: existing,
                old_property: current_prop,
                new_property: target_prop,
            });
            continue;
        }
        if current_prop.ty.nullable != target_prop.ty.nullable {
            if current_prop.ty.nullable {
                changes.push(SchemaChange::MakePropertyRequired {
                    object: existing,
                    property: current_prop,
                });
            } else {
                changes.push(SchemaChange::MakePropertyNullable {
                    object: existing,
                    property: current_prop,
                });
            }
        }
        if target_prop.requires_index() {
            if !current_prop.is_indexed {
                changes.push(SchemaChange::AddIndex {
                    object: existing,
                    property: current_prop,
                    kind: IndexKind::General,
                });
            }
        } else if current_prop.requires_index() {
            changes.push(SchemaChange::RemoveIndex {
                object: existing,
                property: current_prop,
            });
        }
        if target_prop.requires_fulltext_index() {
            if !current_prop.is_fulltext_indexed {
                changes.push(SchemaChange::AddIndex {
                    object: existing,
                    property: current_prop,
                    kind: IndexKind::Fulltext,
                });
            }
        } else if current_prop.requires_fulltext_index() {
            changes.push(SchemaChange::RemoveIndex {
                object: existing,
                property: current_prop,
            });
        }
    }

    if existing.primary_key != target.primary_key {
        changes.push(SchemaChange::ChangePrimaryKey {
            object: existing,
            property: target.primary_key_property(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object_schema::TableType;
    use crate::property::{BaseType, Property, PropertyType};
    use tidedb_storage::ColKey;

    fn object(name: &str, props: Vec<Property>) -> ObjectSchema {
        ObjectSchema::new(name, TableType::TopLevel, props)
    }

    fn int_prop(name: &str) -> Property {
        Property::new(name, PropertyType::scalar(BaseType::Int))
    }

    fn string_prop(name: &str) -> Property {
        Property::new(name, PropertyType::scalar(BaseType::String))
    }

    #[test]
    fn construction_sorts_by_name() {
        let schema = Schema::new([object("Zebra", vec![]), object("Apple", vec![])]);
        let names: Vec<_> = schema.iter().map(|o| o.name.as_str()).collect();
        assert_eq!(names, vec!["Apple", "Zebra"]);
    }

    #[test]
    fn find_by_name_uses_the_sorted_order() {
        let schema = Schema::new([
            object("B", vec![]),
            object("A", vec![]),
            object("C", vec![]),
        ]);
        assert!(schema.find_by_name("A").is_some());
        assert!(schema.find_by_name("C").is_some());
        assert!(schema.find_by_name("D").is_none());
    }

    #[test]
    fn find_by_table_key_ignores_unset_keys() {
        let mut with_key = object("A", vec![]);
        with_key.table_key = TableKey::new(4);
        let schema = Schema::new([with_key, object("B", vec![])]);
        assert_eq!(
            schema.find_by_table_key(TableKey::new(4)).map(|o| o.name.as_str()),
            Some("A")
        );
        // The default key never matches, even though B carries it.
        assert!(schema.find_by_table_key(TableKey::default()).is_none());
    }

    #[test]
    fn duplicate_type_names_reported() {
        let schema = Schema::new([object("A", vec![]), object("A", vec![]), object("B", vec![])]);
        let err = schema.validate(SchemaValidationMode::BASIC).unwrap_err();
        assert_eq!(err.messages().len(), 1);
        assert!(err.messages()[0].contains("Type 'A' appears more than once in the schema."));
    }

    #[test]
    fn embedded_cycle_reported() {
        let schema = Schema::new([
            object("Root", vec![Property::object("emb", "E")]),
            ObjectSchema::new("E", TableType::Embedded, vec![Property::object("next", "E")]),
        ]);
        let err = schema.validate(SchemaValidationMode::BASIC).unwrap_err();
        assert_eq!(
            err.messages(),
            &["Cycles containing embedded objects are not currently supported: 'E.next'"]
        );
    }

    #[test]
    fn cycle_check_skipped_when_earlier_phases_fail() {
        // The cycle check relies on link targets resolving, so a broken link
        // suppresses it.
        let schema = Schema::new([
            ObjectSchema::new("E", TableType::Embedded, vec![Property::object("next", "E")]),
            object("Root", vec![Property::object("missing", "Nowhere")]),
        ]);
        let err = schema.validate(SchemaValidationMode::BASIC).unwrap_err();
        assert!(err.messages().iter().all(|m| !m.contains("Cycles")));
    }

    #[test]
    fn orphans_reported_only_when_requested() {
        let schema = Schema::new([
            object("Root", vec![]),
            ObjectSchema::new("Orphan", TableType::Embedded, vec![]),
        ]);
        assert!(schema.validate(SchemaValidationMode::BASIC).is_ok());

        let err = schema
            .validate(SchemaValidationMode::REJECT_EMBEDDED_ORPHANS)
            .unwrap_err();
        assert_eq!(
            err.messages(),
            &["Embedded object 'Orphan' is unreachable by any link path from top level objects."]
        );
    }

    #[test]
    fn self_compare_is_empty() {
        let schema = Schema::new([
            object("A", vec![int_prop("id"), string_prop("x").indexed()]).with_primary_key("id"),
            object("B", vec![Property::object("a", "A")]),
        ]);
        assert!(schema
            .compare(&schema, SchemaMode::Automatic, true)
            .is_empty());
    }

    #[test]
    fn renamed_property_adds_then_removes() {
        let existing = Schema::new([
            object("A", vec![int_prop("id"), string_prop("x")]).with_primary_key("id")
        ]);
        let target = Schema::new([
            object("A", vec![int_prop("id"), string_prop("y")]).with_primary_key("id")
        ]);
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
    }

    #[test]
    fn table_addition_and_removal() {
        let existing = Schema::new([object("Old", vec![])]);
        let target = Schema::new([object("New", vec![int_prop("n")])]);

        let changes = existing.compare(&target, SchemaMode::Automatic, true);
        assert_eq!(changes.len(), 3);
        assert!(matches!(
            changes[0],
            SchemaChange::AddTable { object } if object.name == "New"
        ));
        assert!(matches!(
            changes[1],
            SchemaChange::RemoveTable { object } if object.name == "Old"
        ));
        assert!(matches!(
            changes[2],
            SchemaChange::AddInitialProperties { object } if object.name == "New"
        ));

        let without_removals = existing.compare(&target, SchemaMode::Automatic, false);
        assert!(without_removals
            .iter()
            .all(|c| !matches!(c, SchemaChange::RemoveTable { .. })));
    }

    #[test]
    fn type_change_suppresses_further_property_diffs() {
        let existing = Schema::new([object("A", vec![int_prop("x").indexed()])]);
        let target = Schema::new([object(
            "A",
            vec![Property::new("x", PropertyType::scalar(BaseType::String).into_nullable())],
        )]);
        let changes = existing.compare(&target, SchemaMode::Automatic, true);
        // Only ChangePropertyType, no nullability or index steps.
        assert_eq!(changes.len(), 1);
        assert!(matches!(changes[0], SchemaChange::ChangePropertyType { .. }));
    }

    #[test]
    fn nullability_and_index_transitions() {
        let existing = Schema::new([object(
            "A",
            vec![int_prop("a"), string_prop("b").indexed(), string_prop("c")],
        )]);
        let target = Schema::new([object(
            "A",
            vec![
                Property::new("a", PropertyType::scalar(BaseType::Int).into_nullable())
                    .indexed(),
                string_prop("b"),
                string_prop("c").fulltext_indexed(),
            ],
        )]);
        let changes = existing.compare(&target, SchemaMode::Automatic, true);
        assert_eq!(
            changes,
            vec![
                SchemaChange::MakePropertyNullable {
                    object: &existing.as_slice()[0],
                    property: &existing.as_slice()[0].persisted_properties[0],
                },
                SchemaChange::AddIndex {
                    object: &existing.as_slice()[0],
                    property: &existing.as_slice()[0].persisted_properties[0],
                    kind: IndexKind::General,
                },
                SchemaChange::RemoveIndex {
                    object: &existing.as_slice()[0],
                    property: &existing.as_slice()[0].persisted_properties[1],
                },
                SchemaChange::AddIndex {
                    object: &existing.as_slice()[0],
                    property: &existing.as_slice()[0].persisted_properties[2],
                    kind: IndexKind::Fulltext,
                },
            ]
        );
    }

    #[test]
    fn computed_target_property_is_removed() {
        let existing = Schema::new([object("A", vec![Property::object("links", "A")])]);
        let target = Schema::new([object("A", vec![])
            .with_computed_properties(vec![Property::object("links", "A")])]);
        let changes = existing.compare(&target, SchemaMode::Automatic, true);
        assert_eq!(changes.len(), 1);
        assert!(matches!(changes[0], SchemaChange::RemoveProperty { .. }));
    }

    #[test]
    fn primary_key_change_emitted() {
        let existing = Schema::new([object("A", vec![int_prop("a"), int_prop("b")])
            .with_primary_key("a")]);
        let target = Schema::new([object("A", vec![int_prop("a"), int_prop("b")])
            .with_primary_key("b")]);
        let changes = existing.compare(&target, SchemaMode::Automatic, true);
        // The is_primary flag is not part of the property diff; only the
        // primary-key change is emitted, carrying the new key property.
        assert_eq!(changes.len(), 1);
        assert!(matches!(
            changes[0],
            SchemaChange::ChangePrimaryKey { property: Some(p), .. } if p.name == "b"
        ));
    }

    #[test]
    fn additive_discovered_skips_orphans() {
        let existing = Schema::new([]);
        let target = Schema::new([
            object("Root", vec![]),
            ObjectSchema::new("Orphan", TableType::Embedded, vec![]),
        ]);
        let changes = existing.compare(&target, SchemaMode::AdditiveDiscovered, true);
        let added: Vec<_> = changes
            .iter()
            .filter_map(|c| match c {
                SchemaChange::AddTable { object } => Some(object.name.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(added, vec!["Root"]);
        assert!(changes.iter().all(|c| c.object_name() != "Orphan"));

        // In the default mode the orphan is added like anything else.
        let changes = existing.compare(&target, SchemaMode::Automatic, true);
        assert!(changes
            .iter()
            .any(|c| matches!(c, SchemaChange::AddTable { object } if object.name == "Orphan")));
    }

    #[test]
    fn table_type_changes_come_last() {
        let existing = Schema::new([
            object("A", vec![int_prop("x")]),
            object("B", vec![]),
        ]);
        let target = Schema::new([
            ObjectSchema::new("A", TableType::Embedded, vec![]),
            object("B", vec![int_prop("y")]),
        ]);
        let changes = existing.compare(&target, SchemaMode::Automatic, true);
        let last = changes.last().unwrap();
        assert!(matches!(
            last,
            SchemaChange::ChangeTableType {
                old_table_type: TableType::TopLevel,
                new_table_type: TableType::Embedded,
                ..
            }
        ));
    }

    #[test]
    fn copy_keys_from_imports_matching_keys() {
        let mut target = Schema::new([object("A", vec![int_prop("x"), int_prop("y")])]);
        let mut backend_obj = object("A", vec![int_prop("x")]);
        backend_obj.table_key = TableKey::new(11);
        backend_obj.persisted_properties[0].column_key = ColKey::new(21);
        let backend = Schema::new([backend_obj]);

        target.copy_keys_from(&backend, SchemaSubsetMode::STRICT);

        let a = target.find_by_name("A").unwrap();
        assert_eq!(a.table_key, TableKey::new(11));
        assert_eq!(a.property_for_name("x").unwrap().column_key, ColKey::new(21));
        // y has no backend match and keeps its default key.
        assert_eq!(a.property_for_name("y").unwrap().column_key, ColKey::default());
    }

    #[test]
    fn copy_keys_from_inherits_per_subset_mode() {
        let backend = Schema::new([
            object("A", vec![int_prop("x"), int_prop("extra")]),
            object("BackendOnly", vec![int_prop("z")]),
        ]);

        let mut strict = Schema::new([object("A", vec![int_prop("x")])]);
        strict.copy_keys_from(&backend, SchemaSubsetMode::STRICT);
        assert!(strict.find_by_name("BackendOnly").is_none());
        assert!(strict
            .find_by_name("A")
            .unwrap()
            .property_for_name("extra")
            .is_none());

        let mut complete = Schema::new([object("A", vec![int_prop("x")])]);
        complete.copy_keys_from(&backend, SchemaSubsetMode::COMPLETE);
        let inherited = complete.find_by_name("BackendOnly").unwrap();
        assert_eq!(inherited.persisted_properties.len(), 1);
        assert!(complete
            .find_by_name("A")
            .unwrap()
            .property_for_name("extra")
            .is_some());
    }
}
