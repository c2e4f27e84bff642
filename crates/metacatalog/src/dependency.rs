//! Dependency ordering of schema definitions for import.
//!
//! Schemas are imported so that every schema comes after the schemas it
//! depends on. A schema depends on:
//!
//! - every schema it references
//! - every supplemental schema whose primary schema it is
//! - transitively, whatever the schemas it references (within the set) depend on
//!
//! # Examples
//!
//! ```
//! use metacatalog::{build_dependency_ordered_list, SchemaDef, SchemaKey, SchemaVersion};
//!
//! let v = SchemaVersion::new(1, 0, 0);
//! let z = SchemaDef::new("Z", "z", v);
//! let y = SchemaDef::new("Y", "y", v).with_reference(SchemaKey::new("Z", v));
//! let x = SchemaDef::new("X", "x", v).with_reference(SchemaKey::new("Y", v));
//! let set = vec![x, z, y];
//!
//! let order: Vec<&str> = build_dependency_ordered_list(&set)
//!     .iter()
//!     .map(|s| s.name.as_str())
//!     .collect();
//! assert_eq!(order, ["Z", "Y", "X"]);
//! ```

use std::collections::HashSet;

use crate::SchemaDef;

fn find<'a>(set: &'a [SchemaDef], name: &str) -> Option<&'a SchemaDef> {
    set.iter().find(|s| s.is_named(name))
}

/// True when `a` has to be imported after `b`.
pub fn depends_on(a: &SchemaDef, b: &SchemaDef, set: &[SchemaDef]) -> bool {
    let mut visited = HashSet::new();
    depends_on_guarded(a, b, set, &mut visited)
}

fn depends_on_guarded(
    a: &SchemaDef,
    b: &SchemaDef,
    set: &[SchemaDef],
    visited: &mut HashSet<String>,
) -> bool {
    if !visited.insert(a.name.to_ascii_lowercase()) {
        return false;
    }
    if a.references_schema(&b.name) {
        return true;
    }
    // Any version of the primary schema picks up its supplementals.
    if let Some(info) = &b.supplemental {
        if info.primary_schema.eq_ignore_ascii_case(&a.name) {
            return true;
        }
    }
    a.references
        .iter()
        .filter_map(|key| find(set, &key.name))
        .any(|referenced| depends_on_guarded(referenced, b, set, visited))
}

/// Insert `schema` after the last entry it depends on, or at the front.
/// Does nothing when the schema is already listed.
pub fn insert_in_order<'a>(list: &mut Vec<&'a SchemaDef>, schema: &'a SchemaDef, set: &[SchemaDef]) {
    if list.iter().any(|listed| listed.is_named(&schema.name)) {
        return;
    }
    let position = list
        .iter()
        .rposition(|listed| depends_on(schema, listed, set))
        .map_or(0, |index| index + 1);
    list.insert(position, schema);
}

/// Every schema of `set`, dependencies first.
pub fn build_dependency_ordered_list(set: &[SchemaDef]) -> Vec<&SchemaDef> {
    let mut list = Vec::with_capacity(set.len());
    let mut expanded = HashSet::new();
    for schema in set {
        insert_with_references(&mut list, schema, set, &mut expanded);
    }
    list
}

fn insert_with_references<'a>(
    list: &mut Vec<&'a SchemaDef>,
    schema: &'a SchemaDef,
    set: &'a [SchemaDef],
    expanded: &mut HashSet<String>,
) {
    insert_in_order(list, schema, set);
    if !expanded.insert(schema.name.to_ascii_lowercase()) {
        return;
    }
    for key in &schema.references {
        if let Some(referenced) = find(set, &key.name) {
            insert_with_references(list, referenced, set, expanded);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{SchemaKey, SchemaVersion, SupplementalInfo};

    fn v() -> SchemaVersion {
        SchemaVersion::new(1, 0, 0)
    }

    fn schema(name: &str, references: &[&str]) -> SchemaDef {
        references.iter().fold(
            SchemaDef::new(name, name.to_ascii_lowercase(), v()),
            |def, reference| def.with_reference(SchemaKey::new(*reference, v())),
        )
    }

    fn names<'a>(list: &[&'a SchemaDef]) -> Vec<&'a str> {
        list.iter().map(|s| s.name.as_str()).collect()
    }

    #[test]
    fn test_chain_is_reversed() {
        let set = vec![schema("X", &["Y"]), schema("Z", &[]), schema("Y", &["Z"])];
        assert_eq!(names(&build_dependency_ordered_list(&set)), ["Z", "Y", "X"]);
    }

    #[test]
    fn test_transitive_dependency() {
        let set = vec![schema("A", &["B"]), schema("B", &["C"]), schema("C", &[])];
        assert!(depends_on(&set[0], &set[2], &set));
        assert!(!depends_on(&set[2], &set[0], &set));
    }

    #[test]
    fn test_reinsertion_is_noop() {
        let set = vec![schema("X", &["Y"]), schema("Y", &[])];
        let mut list = build_dependency_ordered_list(&set);
        let before = names(&list);
        insert_in_order(&mut list, &set[0], &set);
        insert_in_order(&mut list, &set[1], &set);
        assert_eq!(names(&list), before);
    }

    #[test]
    fn test_supplemental_precedes_primary() {
        let primary = schema("Plant", &[]);
        let supplemental = schema("Plant_Supplemental_Ui", &[]).with_supplemental(SupplementalInfo {
            primary_schema: "plant".into(),
            primary_version: SchemaVersion::new(2, 0, 0),
            precedence: 200,
            purpose: "Ui".into(),
        });
        let set = vec![primary, supplemental];
        assert!(depends_on(&set[0], &set[1], &set));
        assert_eq!(
            names(&build_dependency_ordered_list(&set)),
            ["Plant_Supplemental_Ui", "Plant"]
        );
    }

    #[test]
    fn test_reference_cycle_terminates() {
        let set = vec![schema("A", &["B"]), schema("B", &["A"])];
        let list = build_dependency_ordered_list(&set);
        assert_eq!(list.len(), 2);
    }
}
