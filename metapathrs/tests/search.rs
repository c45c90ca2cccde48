//! Integration tests for the search driver: aggregation, combination, and
//! model steps, right-hand-side preprocessing, and the failure diagnostics.

use metapath::{
    a_star, preprocess_rhs, AggregationTable, Data, IncludedUnits, MetadataRegistry, Model,
    SearchOptions, SearchOutcome, SetOfSources, SingleUseModel, StepMethod, UnitsRule, Variable,
    VariableSpec,
};

mod fixtures {
    use super::*;

    pub fn units(name: &str, years: &[&str]) -> IncludedUnits {
        IncludedUnits::new(
            name,
            Variable::new("business", 0),
            [VariableSpec::new("year", 0, years.iter().copied())],
        )
    }

    /// Registry where measurement variables have no conversions and the
    /// identifier `region` aggregates 0 → 1.
    pub fn region_registry(measurements: &[&str]) -> MetadataRegistry {
        let mut registry = MetadataRegistry::new();
        registry.register_aggregation_graph("region", &[0, 1], &[(0, 1)]);
        registry.register_conversion_graph("region", &[0, 1], &[]);
        registry
            .register_aggregation_table(AggregationTable::new(
                "region",
                0,
                1,
                [("north", vec!["a", "b"]), ("south", vec!["c", "d"])],
            ))
            .unwrap();
        registry.register_aggregation_graph("year", &[0], &[]);
        for name in measurements {
            registry.register_conversion_graph(name, &[0, 1], &[]);
        }
        registry
    }

    pub fn source(name: &str, left: &[(&str, u32)], right: &[(&str, u32)], years: &[&str]) -> Data {
        Data::new(
            left.iter().map(|&(n, g)| Variable::new(n, g)),
            right.iter().map(|&(n, g)| Variable::new(n, g)),
            units("I", years),
            name,
        )
    }
}

use fixtures::{region_registry, source, units};

#[test]
fn single_aggregation_reaches_the_goal() {
    let mut registry = region_registry(&["turnover"]);
    let start = SetOfSources::new([source("pool", &[("turnover", 0)], &[("region", 0)], &["2024"])]);
    let goal = source("goal", &[("turnover", 0)], &[("region", 1)], &["2024"]);

    let outcome = a_star(
        &mut registry,
        &start,
        &goal,
        &[],
        &[],
        20,
        &SearchOptions::default(),
    )
    .unwrap();

    let found = outcome.into_found().expect("goal should be reached");
    assert!(found.contains(&goal));
    let methods: Vec<StepMethod> = found.path.iter().map(|step| step.method).collect();
    assert_eq!(methods, vec![StepMethod::StartSet, StepMethod::Aggregation]);
    assert_eq!(found.path[1].method_detail, "region: 0 → 1");
}

#[test]
fn columnwise_combination_reaches_the_goal() {
    let mut registry = region_registry(&["turnover", "costs"]);
    let start = SetOfSources::new([
        source("first", &[("turnover", 1)], &[("region", 0)], &["2024"]),
        source("second", &[("costs", 1)], &[("region", 0)], &["2024"]),
    ]);
    let goal = source(
        "goal",
        &[("turnover", 1), ("costs", 1)],
        &[("region", 0)],
        &["2024"],
    );

    let outcome = a_star(
        &mut registry,
        &start,
        &goal,
        &[],
        &[],
        20,
        &SearchOptions::default(),
    )
    .unwrap();

    let found = outcome.into_found().expect("goal should be reached");
    let combine_steps: Vec<_> = found
        .path
        .iter()
        .filter(|step| step.method == StepMethod::Combine)
        .collect();
    assert_eq!(combine_steps.len(), 1);
    assert_eq!(combine_steps[0].method_detail, "columnwise");
}

#[test]
fn model_with_intersection_rule_reaches_the_goal() {
    let mut registry = region_registry(&["gas", "electricity", "energy"]);

    let gas_template = source("T1", &[("gas", 1)], &[("region", 0)], &["2024"]);
    let electricity_template = source("T2", &[("electricity", 1)], &[("region", 0)], &["2024"]);
    let output = source("energy", &[("energy", 1)], &[("region", 0)], &["2024"]);
    let model = Model::new(
        [gas_template, electricity_template],
        output,
        UnitsRule::Intersection,
        "energy use",
    );

    let start = SetOfSources::new([
        Data::new(
            [Variable::new("gas", 1)],
            [Variable::new("region", 0)],
            units("J", &["2023", "2024"]),
            "gas",
        ),
        Data::new(
            [Variable::new("electricity", 1)],
            [Variable::new("region", 0)],
            units("K", &["2024", "2025"]),
            "electricity",
        ),
    ]);
    // The model output is constrained to the overlap J ∩ K = {2024}.
    let goal = Data::new(
        [Variable::new("energy", 1)],
        [Variable::new("region", 0)],
        units("L", &["2024"]),
        "goal",
    );

    let outcome = a_star(
        &mut registry,
        &start,
        &goal,
        &[model],
        &[],
        20,
        &SearchOptions::default(),
    )
    .unwrap();

    let found = outcome.into_found().expect("goal should be reached");
    let model_steps: Vec<_> = found
        .path
        .iter()
        .filter(|step| step.method == StepMethod::Model)
        .collect();
    assert_eq!(model_steps.len(), 1);
    assert_eq!(model_steps[0].method_detail, "energy use");
}

#[test]
fn preprocessing_aggregates_towards_the_goal_right_hand_side() {
    let mut registry = MetadataRegistry::new();
    registry.register_aggregation_graph("district", &[0, 1, 2], &[(0, 1), (1, 2)]);
    registry.register_conversion_graph("population", &[0], &[]);
    registry.register_aggregation_graph("year", &[0], &[]);

    let start = SetOfSources::new([source(
        "pool",
        &[("population", 0)],
        &[("district", 0)],
        &["2024"],
    )]);
    let goal = source("goal", &[("population", 0)], &[("district", 2)], &["2024"]);

    let preprocessed = preprocess_rhs(&start, &goal, &registry).unwrap();
    assert_eq!(preprocessed.len(), 2);
    assert!(preprocessed.contains(&goal));
    let aggregation_steps: Vec<_> = preprocessed
        .path
        .iter()
        .filter(|step| step.method == StepMethod::Aggregation)
        .collect();
    assert_eq!(aggregation_steps.len(), 1);
    assert_eq!(aggregation_steps[0].method_detail, "district: 0 → 2");

    // With preprocessing enabled the driver finds the goal in the start
    // state itself.
    let outcome = a_star(
        &mut registry,
        &start,
        &goal,
        &[],
        &[],
        20,
        &SearchOptions {
            preprocess_rhs: true,
            ..SearchOptions::default()
        },
    )
    .unwrap();
    assert!(outcome.is_success());
}

#[test]
fn shedding_still_finds_a_direct_path() {
    let mut registry = region_registry(&["turnover"]);
    let start = SetOfSources::new([source("pool", &[("turnover", 0)], &[("region", 0)], &["2024"])]);
    let goal = source("goal", &[("turnover", 0)], &[("region", 1)], &["2024"]);

    let outcome = a_star(
        &mut registry,
        &start,
        &goal,
        &[],
        &[],
        20,
        &SearchOptions {
            shedding: true,
            shedding_n: 1,
            ..SearchOptions::default()
        },
    )
    .unwrap();
    assert!(outcome.is_success());
}

#[test]
fn goal_reached_by_shrinking_records_a_subset_step() {
    let mut registry = region_registry(&["turnover", "costs"]);
    let start = SetOfSources::new([source(
        "wide",
        &[("turnover", 0), ("costs", 0)],
        &[("region", 0)],
        &["2024"],
    )]);
    let goal = source("goal", &[("turnover", 0)], &[("region", 0)], &["2024"]);

    let outcome = a_star(
        &mut registry,
        &start,
        &goal,
        &[],
        &[],
        20,
        &SearchOptions::default(),
    )
    .unwrap();

    let found = outcome.into_found().expect("goal should be reached");
    let last = found.path.last().unwrap();
    assert_eq!(last.method, StepMethod::Subset);
    assert_eq!(last.method_detail, "remove variables or units");
}

#[test]
fn unreachable_goal_exhausts_the_frontier() {
    let mut registry = region_registry(&["turnover"]);
    // No conversions, no useful aggregations: expanding the start state
    // yields the single aggregation neighbour and then nothing new.
    let start = SetOfSources::new([source("pool", &[("turnover", 0)], &[("region", 0)], &["2024"])]);
    let goal = source("goal", &[("wages", 0)], &[("region", 0)], &["2024"]);

    let outcome = a_star(
        &mut registry,
        &start,
        &goal,
        &[],
        &[],
        50,
        &SearchOptions::default(),
    )
    .unwrap();

    match outcome {
        SearchOutcome::Exhausted(diagnostic) => {
            assert!(diagnostic.iterations > 0);
            assert!(diagnostic.shedding.is_none());
        }
        other => panic!("expected exhaustion, got {other:?}"),
    }
}

#[test]
fn iteration_budget_is_reported() {
    let mut registry = region_registry(&["turnover"]);
    let start = SetOfSources::new([source("pool", &[("turnover", 0)], &[("region", 0)], &["2024"])]);
    let goal = source("goal", &[("wages", 0)], &[("region", 0)], &["2024"]);

    let outcome = a_star(
        &mut registry,
        &start,
        &goal,
        &[],
        &[],
        1,
        &SearchOptions::default(),
    )
    .unwrap();

    match outcome {
        SearchOutcome::IterationBudget(diagnostic) => {
            assert_eq!(diagnostic.iterations, 1);
        }
        other => panic!("expected an exhausted budget, got {other:?}"),
    }
}

#[test]
fn simulate_reports_timing_over_repeated_runs() {
    let mut registry = region_registry(&["turnover"]);
    let start = SetOfSources::new([source("pool", &[("turnover", 0)], &[("region", 0)], &["2024"])]);
    let goal = source("goal", &[("turnover", 0)], &[("region", 1)], &["2024"]);

    let report = metapath::simulate(
        3,
        &mut registry,
        &start,
        &goal,
        &[],
        20,
        &SearchOptions::default(),
    )
    .unwrap();

    assert_eq!(report.runs, 3);
    assert_eq!(report.successful_runs, 3);
    assert!(report.mean_secs >= 0.0);
    assert!(report.ci_half_width_secs >= 0.0);
}

#[test]
fn single_use_model_opens_a_conversion_edge() {
    struct Deflator;

    impl SingleUseModel for Deflator {
        fn name(&self) -> &str {
            "price deflator"
        }

        fn apply(&self, registry: &mut MetadataRegistry) -> metapath::error::Result<bool> {
            registry
                .conversion_graph_mut("turnover")?
                .add_model_edge(0, 1, "price deflator");
            Ok(true)
        }
    }

    let mut registry = region_registry(&["turnover"]);
    let start = SetOfSources::new([source("pool", &[("turnover", 0)], &[("region", 0)], &["2024"])]);
    // Reachable only through the conversion edge the deflator contributes.
    let goal = source("goal", &[("turnover", 1)], &[("region", 0)], &["2024"]);

    let outcome = a_star(
        &mut registry,
        &start,
        &goal,
        &[],
        &[Box::new(Deflator)],
        20,
        &SearchOptions::default(),
    )
    .unwrap();

    let found = outcome.into_found().expect("goal should be reached");
    let model_steps: Vec<_> = found
        .path
        .iter()
        .filter(|step| step.method == StepMethod::Model)
        .collect();
    assert_eq!(model_steps.len(), 1);
    assert_eq!(model_steps[0].method_detail, "price deflator turnover: 0 → 1");
}

#[test]
fn multiple_paths_mode_collects_solutions() {
    let mut registry = region_registry(&["turnover"]);
    let start = SetOfSources::new([source("pool", &[("turnover", 0)], &[("region", 0)], &["2024"])]);
    // The goal is already in the start set; the driver should record the
    // solution and keep exploring until the frontier runs dry.
    let goal = source("goal", &[("turnover", 0)], &[("region", 0)], &["2024"]);

    let outcome = a_star(
        &mut registry,
        &start,
        &goal,
        &[],
        &[],
        50,
        &SearchOptions {
            find_multiple_paths: true,
            ..SearchOptions::default()
        },
    )
    .unwrap();

    match outcome {
        SearchOutcome::FoundMany(solutions) => {
            assert!(!solutions.is_empty());
            assert!(solutions[0].contains(&goal));
        }
        other => panic!("expected collected solutions, got {other:?}"),
    }
}
