//! Shared traversal over the object-link graph.
//!
//! Both embedded-cycle detection and orphan detection walk the same edges:
//! properties whose base type is an object link, with collections of links
//! counting as a single edge keyed on the element type.

use crate::object_schema::ObjectSchema;
use crate::property::Property;
use crate::schema::Schema;
use std::collections::{BTreeSet, HashSet, VecDeque};

fn link_properties(object: &ObjectSchema) -> impl Iterator<Item = &Property> {
    object.persisted_properties.iter().filter(|p| p.is_link())
}

/// Searches for a path from `root` back to itself that stays inside the
/// embedded subgraph, returning the dotted property path of the first cycle
/// found.
///
/// Links into non-embedded classes terminate the path: top-level objects are
/// referenced by primary key and break cycles by construction. The search is
/// breadth-first in property declaration order, and each embedded type is
/// expanded at most once per root.
pub(crate) fn embedded_cycle_path<'a>(
    schema: &'a Schema,
    root: &'a ObjectSchema,
) -> Option<String> {
    struct Visit<'a> {
        object: &'a ObjectSchema,
        path: String,
    }

    let mut to_visit = VecDeque::new();
    to_visit.push_back(Visit {
        object: root,
        path: root.name.clone(),
    });
    let mut expanded: HashSet<&'a str> = HashSet::new();

    while let Some(current) = to_visit.pop_front() {
        for prop in link_properties(current.object) {
            let Some(target_name) = prop.object_type.as_deref() else {
                continue;
            };
            let Some(target) = schema.find_by_name(target_name) else {
                continue;
            };
            if !target.table_type.is_embedded() {
                continue;
            }
            if expanded.contains(target_name) {
                continue;
            }
            let next_path = format!("{}.{}", current.path, prop.name);
            if target_name == root.name {
                return Some(next_path);
            }
            expanded.insert(target_name);
            to_visit.push_back(Visit {
                object: target,
                path: next_path,
            });
        }
    }
    None
}

/// Returns the embedded classes not reachable from any non-embedded class
/// via object-link edges.
pub(crate) fn embedded_orphans(schema: &Schema) -> BTreeSet<String> {
    let mut to_check: VecDeque<&ObjectSchema> = schema
        .iter()
        .filter(|o| !o.table_type.is_embedded())
        .collect();
    let mut reachable: HashSet<&str> = to_check.iter().map(|o| o.name.as_str()).collect();

    while let Some(object) = to_check.pop_front() {
        for prop in link_properties(object) {
            let Some(target_name) = prop.object_type.as_deref() else {
                continue;
            };
            let Some(target) = schema.find_by_name(target_name) else {
                continue;
            };
            if target.table_type.is_embedded() && reachable.insert(target.name.as_str()) {
                to_check.push_back(target);
            }
        }
    }

    schema
        .iter()
        .filter(|o| o.table_type.is_embedded() && !reachable.contains(o.name.as_str()))
        .map(|o| o.name.clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object_schema::TableType;
    use crate::property::Property;

    fn embedded(name: &str, links: &[(&str, &str)]) -> ObjectSchema {
        ObjectSchema::new(
            name,
            TableType::Embedded,
            links
                .iter()
                .map(|(prop, target)| Property::object(*prop, *target))
                .collect(),
        )
    }

    fn top_level(name: &str, links: &[(&str, &str)]) -> ObjectSchema {
        ObjectSchema::new(
            name,
            TableType::TopLevel,
            links
                .iter()
                .map(|(prop, target)| Property::object(*prop, *target))
                .collect(),
        )
    }

    #[test]
    fn self_loop_is_a_cycle() {
        let schema = Schema::new([
            top_level("Root", &[("emb", "E")]),
            embedded("E", &[("next", "E")]),
        ]);
        let root = schema.find_by_name("E").unwrap();
        assert_eq!(embedded_cycle_path(&schema, root).as_deref(), Some("E.next"));
    }

    #[test]
    fn longer_cycle_reports_full_path() {
        let schema = Schema::new([
            embedded("A", &[("b", "B")]),
            embedded("B", &[("c", "C")]),
            embedded("C", &[("a", "A")]),
        ]);
        let root = schema.find_by_name("A").unwrap();
        assert_eq!(
            embedded_cycle_path(&schema, root).as_deref(),
            Some("A.b.c.a")
        );
    }

    #[test]
    fn top_level_link_breaks_the_path() {
        // E links to Root which links back to E, but Root is top-level, so
        // the path terminates there.
        let schema = Schema::new([
            top_level("Root", &[("emb", "E")]),
            embedded("E", &[("root", "Root")]),
        ]);
        let root = schema.find_by_name("E").unwrap();
        assert_eq!(embedded_cycle_path(&schema, root), None);
    }

    #[test]
    fn shared_nodes_are_expanded_once() {
        // Two paths into C; the second must not re-expand it.
        let schema = Schema::new([
            embedded("A", &[("b", "B"), ("f", "F")]),
            embedded("B", &[("c", "C")]),
            embedded("F", &[("c", "C")]),
            embedded("C", &[]),
        ]);
        let root = schema.find_by_name("A").unwrap();
        assert_eq!(embedded_cycle_path(&schema, root), None);
    }

    #[test]
    fn orphan_is_unreachable_embedded() {
        let schema = Schema::new([
            top_level("Root", &[("e", "Reached")]),
            embedded("Reached", &[]),
            embedded("Orphan", &[]),
        ]);
        let orphans = embedded_orphans(&schema);
        assert_eq!(orphans.into_iter().collect::<Vec<_>>(), vec!["Orphan"]);
    }

    #[test]
    fn transitively_reached_embedded_is_not_an_orphan() {
        let schema = Schema::new([
            top_level("Root", &[("a", "A")]),
            embedded("A", &[("b", "B")]),
            embedded("B", &[]),
        ]);
        assert!(embedded_orphans(&schema).is_empty());
    }

    #[test]
    fn embedded_only_reachable_from_embedded_orphan_is_orphan() {
        // A cluster of embedded objects linking each other with no top-level
        // entry point is entirely orphaned.
        let schema = Schema::new([
            top_level("Root", &[]),
            embedded("X", &[("y", "Y")]),
            embedded("Y", &[]),
        ]);
        let orphans = embedded_orphans(&schema);
        assert_eq!(
            orphans.into_iter().collect::<Vec<_>>(),
            vec!["X".to_string(), "Y".to_string()]
        );
    }
}
