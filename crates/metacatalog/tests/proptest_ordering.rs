//! Property-based tests for dependency-ordered schema import.
//!
//! Schema sets are random reference DAGs presented in random order.

use proptest::prelude::*;
use metacatalog::{
    build_dependency_ordered_list, depends_on, insert_in_order, SchemaDef, SchemaKey,
    SchemaVersion,
};

fn version() -> SchemaVersion {
    SchemaVersion::new(1, 0, 0)
}

fn schema_name(index: usize) -> String {
    format!("Schema{}", index)
}

/// Schema `i` may only reference schemas `j < i`, so the graph is acyclic.
fn build_schemas(edges: &[Vec<bool>]) -> Vec<SchemaDef> {
    edges
        .iter()
        .enumerate()
        .map(|(i, row)| {
            let mut schema = SchemaDef::new(schema_name(i), format!("s{}", i), version());
            for (j, &linked) in row.iter().enumerate().take(i) {
                if linked {
                    schema = schema.with_reference(SchemaKey::new(schema_name(j), version()));
                }
            }
            schema
        })
        .collect()
}

// Strategy for generating a reference DAG in shuffled presentation order
fn shuffled_dag_strategy() -> impl Strategy<Value = Vec<SchemaDef>> {
    (1usize..9)
        .prop_flat_map(|n| prop::collection::vec(prop::collection::vec(any::<bool>(), n), n))
        .prop_map(|edges| build_schemas(&edges))
        .prop_shuffle()
}

// Strategy for generating a single reference chain in shuffled order
fn shuffled_chain_strategy() -> impl Strategy<Value = Vec<SchemaDef>> {
    (1usize..9)
        .prop_map(|n| {
            let edges: Vec<Vec<bool>> = (0..n).map(|i| (0..n).map(|j| j + 1 == i).collect()).collect();
            build_schemas(&edges)
        })
        .prop_shuffle()
}

proptest! {
    #[test]
    fn test_order_is_a_permutation(set in shuffled_dag_strategy()) {
        let order = build_dependency_ordered_list(&set);
        prop_assert_eq!(order.len(), set.len());

        let mut names: Vec<&str> = order.iter().map(|s| s.name.as_str()).collect();
        names.sort_unstable();
        names.dedup();
        prop_assert_eq!(names.len(), set.len());
    }

    #[test]
    fn test_dependencies_come_first(set in shuffled_dag_strategy()) {
        let order = build_dependency_ordered_list(&set);
        for (i, later) in order.iter().enumerate() {
            for earlier in &order[..i] {
                prop_assert!(
                    !depends_on(earlier, later, &set),
                    "{} is listed before its dependency {}",
                    earlier.name,
                    later.name
                );
            }
        }
    }

    #[test]
    fn test_chain_is_restored(set in shuffled_chain_strategy()) {
        let order: Vec<String> = build_dependency_ordered_list(&set)
            .iter()
            .map(|s| s.name.clone())
            .collect();
        let expected: Vec<String> = (0..set.len()).map(schema_name).collect();
        prop_assert_eq!(order, expected);
    }

    #[test]
    fn test_reinsert_is_idempotent(set in shuffled_dag_strategy()) {
        let mut order = build_dependency_ordered_list(&set);
        let before: Vec<String> = order.iter().map(|s| s.name.clone()).collect();
        for schema in &set {
            insert_in_order(&mut order, schema, &set);
        }
        let after: Vec<String> = order.iter().map(|s| s.name.clone()).collect();
        prop_assert_eq!(before, after);
    }
}

#[test]
fn test_depends_on_is_transitive() {
    let edges = vec![
        vec![false, false, false],
        vec![true, false, false],
        vec![false, true, false],
    ];
    let set = build_schemas(&edges);
    assert!(depends_on(&set[2], &set[0], &set));
    assert!(!depends_on(&set[0], &set[2], &set));
}
