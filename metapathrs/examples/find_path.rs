//! End-to-end demo: register metadata for a small statistical system, then
//! search for a path from the available sources to a goal table.
//!
//! Run with: cargo run --example find_path

use metapath::{
    a_star, AggregationTable, Data, IncludedUnits, MetadataRegistry, Model, SearchOptions,
    SearchOutcome, SetOfSources, UnitsRule, Variable, VariableSpec,
};

fn build_registry() -> anyhow::Result<MetadataRegistry> {
    let mut registry = MetadataRegistry::new();

    // The identifier `municipality` aggregates to provinces (1) and the
    // whole country (2).
    registry.register_aggregation_graph("municipality", &[0, 1, 2], &[(0, 1), (1, 2)]);
    registry.register_conversion_graph("municipality", &[0, 1, 2], &[]);
    registry.register_aggregation_table(AggregationTable::new(
        "municipality",
        0,
        1,
        [
            ("groningen", vec!["stad", "westerkwartier"]),
            ("drenthe", vec!["assen", "emmen"]),
        ],
    ))?;
    registry.register_aggregation_table(AggregationTable::new(
        "municipality",
        1,
        2,
        [("nl", vec!["groningen", "drenthe"])],
    ))?;

    // Energy measurements convert between cubic metres (0) and kWh (1).
    for name in ["gas", "electricity", "energy"] {
        registry.register_conversion_graph(name, &[0, 1], &[(0, 1)]);
    }
    registry.register_aggregation_graph("year", &[0], &[]);

    Ok(registry)
}

fn units(name: &str, years: &[&str]) -> IncludedUnits {
    IncludedUnits::new(
        name,
        Variable::new("household", 0),
        [VariableSpec::new("year", 0, years.iter().copied())],
    )
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let mut registry = build_registry()?;

    let gas = Data::new(
        [Variable::new("gas", 0)],
        [Variable::new("municipality", 0)],
        units("admin", &["2023", "2024"]),
        "gas register",
    );
    let electricity = Data::new(
        [Variable::new("electricity", 1)],
        [Variable::new("municipality", 0)],
        units("survey", &["2024"]),
        "electricity survey",
    );
    let start = SetOfSources::new([gas, electricity]);

    // Total energy use is a model over gas and electricity in kWh; its units
    // are the overlap of the inputs.
    let energy_model = Model::new(
        [
            Data::new(
                [Variable::new("gas", 1)],
                [Variable::new("municipality", 0)],
                units("T1", &["2024"]),
                "gas kwh",
            ),
            Data::new(
                [Variable::new("electricity", 1)],
                [Variable::new("municipality", 0)],
                units("T2", &["2024"]),
                "electricity kwh",
            ),
        ],
        Data::new(
            [Variable::new("energy", 1)],
            [Variable::new("municipality", 0)],
            units("out", &["2024"]),
            "energy use",
        ),
        UnitsRule::Intersection,
        "energy use model",
    );

    let goal = Data::new(
        [Variable::new("energy", 1)],
        [Variable::new("municipality", 1)],
        units("goal", &["2024"]),
        "energy per province",
    );

    let outcome = a_star(
        &mut registry,
        &start,
        &goal,
        &[energy_model],
        &[],
        100,
        &SearchOptions::default(),
    )?;

    match outcome {
        SearchOutcome::Found(state) => {
            println!("goal reached: {}", goal.notation());
            println!("path:");
            for step in &state.path {
                println!("  {step}");
            }
        }
        SearchOutcome::FoundMany(solutions) => {
            println!("{} paths found", solutions.len());
        }
        SearchOutcome::Exhausted(diagnostic) => {
            println!("no path: {diagnostic}");
        }
        SearchOutcome::IterationBudget(diagnostic) => {
            println!("gave up: {diagnostic}");
        }
    }

    Ok(())
}
