//! Integration tests for the metadata algebra: aggregation tables, the
//! registry, and unit-set subset reasoning across granularities.

use metapath::{
    AggregationTable, IncludedUnits, MetadataRegistry, MetapathError, UnitSet, UnitSetUnion,
    VariableSpec,
};

mod fixtures {
    use super::*;
    use metapath::Variable;

    /// Age groups: single years (0) roll up to 5-year bands (1) and bands to
    /// coarse groups (2). No direct table from 0 to 2.
    pub fn age_registry() -> MetadataRegistry {
        let mut registry = MetadataRegistry::new();
        registry.register_aggregation_graph("age", &[0, 1, 2], &[(0, 1), (1, 2)]);
        registry
            .register_aggregation_table(AggregationTable::new(
                "age",
                0,
                1,
                [
                    ("0-4", vec!["0", "1", "2", "3", "4"]),
                    ("5-9", vec!["5", "6", "7", "8", "9"]),
                ],
            ))
            .unwrap();
        registry
            .register_aggregation_table(AggregationTable::new(
                "age",
                1,
                2,
                [("young", vec!["0-4", "5-9"])],
            ))
            .unwrap();
        registry
    }

    pub fn persons() -> Variable {
        Variable::new("person", 0)
    }

    pub fn age_units(name: &str, values: &[&str]) -> IncludedUnits {
        IncludedUnits::new(
            name,
            persons(),
            [VariableSpec::new("age", 0, values.iter().copied())],
        )
    }
}

use fixtures::{age_registry, age_units};

#[test]
fn chained_table_is_synthesised_and_cached() {
    let registry = age_registry();
    let graph = registry.aggregation_graph("age").unwrap();

    let first = graph.get_table(0, 2).expect("synthesised table");
    assert_eq!(first.shortcut_path, vec![1]);
    assert_eq!(
        first.value_map["young"],
        ["0", "1", "2", "3", "4", "5", "6", "7", "8", "9"]
            .map(String::from)
            .into()
    );

    let second = graph.get_table(0, 2).expect("cached table");
    assert_eq!(first.value_map, second.value_map);
}

#[test]
fn subset_antisymmetry_up_to_name() {
    let registry = age_registry();
    let a = VariableSpec::new("age", 0, ["0", "1"]);
    let b = VariableSpec::new("age", 0, ["0", "1"]);
    assert!(a.is_subset(&b, &registry).unwrap());
    assert!(b.is_subset(&a, &registry).unwrap());
    assert_eq!(a, b);
}

#[test]
fn intersection_is_a_lower_bound() {
    let registry = age_registry();
    let fine = VariableSpec::new("age", 0, ["0", "1", "5"]);
    let coarse = VariableSpec::new("age", 1, ["0-4"]);
    let glb = fine.intersection(&coarse, &registry).unwrap().unwrap();
    assert!(glb.is_subset(&fine, &registry).unwrap());
    assert!(glb.is_subset(&coarse, &registry).unwrap());
}

#[test]
fn union_is_an_upper_bound() {
    let registry = age_registry();
    let fine = VariableSpec::new("age", 0, ["7"]);
    let coarse = VariableSpec::new("age", 1, ["0-4"]);
    let lub = fine.union(&coarse, &registry).unwrap().unwrap();
    assert!(fine.is_subset(&lub, &registry).unwrap());
    assert!(coarse.is_subset(&lub, &registry).unwrap());
}

#[test]
fn straddling_set_is_subset_of_the_union_via_split() {
    let registry = age_registry();

    // u1 covers ages 0..=4, u2 covers 5..=9, s covers all ten. No single
    // member hosts s, so only the adjust-and-split path can prove it.
    let union = UnitSet::Union(
        UnitSetUnion::new([
            age_units("u1", &["0", "1", "2", "3", "4"]),
            age_units("u2", &["5", "6", "7", "8", "9"]),
        ])
        .unwrap(),
    );
    let straddling = UnitSet::Simple(age_units(
        "s",
        &["0", "1", "2", "3", "4", "5", "6", "7", "8", "9"],
    ));

    assert!(straddling.is_subset(&union, &registry).unwrap());
    assert!(union.is_subset(&straddling, &registry).unwrap());
}

#[test]
fn coarse_member_is_hosted_after_granularity_adjustment() {
    let registry = age_registry();

    let coarse = UnitSet::Simple(IncludedUnits::new(
        "coarse",
        fixtures::persons(),
        [VariableSpec::new("age", 1, ["0-4", "5-9"])],
    ));
    let union = UnitSet::Union(
        UnitSetUnion::new([
            age_units("u1", &["0", "1", "2", "3", "4"]),
            age_units("u2", &["5", "6", "7", "8", "9"]),
        ])
        .unwrap(),
    );

    assert!(coarse.is_subset(&union, &registry).unwrap());
}

#[test]
fn missing_aggregation_route_is_soft() {
    let mut registry = age_registry();
    registry.register_aggregation_graph("income", &[0, 1], &[]);
    let a = VariableSpec::new("income", 0, ["low"]);
    let b = VariableSpec::new("income", 1, ["all"]);
    assert!(!a.is_subset(&b, &registry).unwrap());
    assert!(a.intersection(&b, &registry).unwrap().is_none());
}

#[test]
fn unregistered_variable_is_fatal() {
    let registry = age_registry();
    let a = VariableSpec::new("height", 0, ["tall"]);
    let b = VariableSpec::new("height", 1, ["any"]);
    assert!(matches!(
        a.is_subset(&b, &registry),
        Err(MetapathError::NotInitialised(_))
    ));
}
