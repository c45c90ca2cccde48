//! The best-first search loop.
//!
//! States are sets of sources; neighbours come from models first, then from
//! conversion, aggregation, and combination. Scoring is heuristic and not
//! admissible, so there is no optimality guarantee on path length. Shedding
//! prunes the frontier to the best few states, trading completeness for
//! speed.

use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::data::{Data, ShrinkPolicy, SimilarityVariant, SimilarityWeights};
use crate::error::Result;
use crate::model::{Model, SingleUseModel};
use crate::registry::MetadataRegistry;
use crate::search::scoring::{score_state, SimilarityChoice};
use crate::search::sources::SetOfSources;
use crate::variable::Variable;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchOptions {
    pub similarity: SimilarityChoice,
    pub variant: SimilarityVariant,
    pub weights: SimilarityWeights,
    /// Aggregate right-hand variables toward the goal before the loop
    /// starts; plain aggregation is then deprioritised until the search
    /// stalls.
    pub preprocess_rhs: bool,
    /// Keep collecting solutions instead of returning the first.
    pub find_multiple_paths: bool,
    /// Prune the frontier to the best `shedding_n` states. May lose
    /// solutions.
    pub shedding: bool,
    pub shedding_n: usize,
    /// Multiplier for `topsum`: how many scores count, per goal variable.
    pub score_parameter: f64,
    pub shrink_policy: ShrinkPolicy,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            similarity: SimilarityChoice::Sum,
            variant: SimilarityVariant::Base,
            weights: SimilarityWeights::default(),
            preprocess_rhs: false,
            find_multiple_paths: false,
            shedding: false,
            shedding_n: 10,
            score_parameter: 3.0,
            shrink_policy: ShrinkPolicy::DropRight,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchDiagnostic {
    /// Iterations completed when the search ended.
    pub iterations: usize,
    /// The beam width, when shedding was active.
    pub shedding: Option<usize>,
}

impl std::fmt::Display for SearchDiagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ran for {} iterations", self.iterations)?;
        match self.shedding {
            Some(n) => write!(
                f,
                "; shedding kept the {n} best branches, trying more branches or no shedding may help"
            ),
            None => write!(f, "; no more solutions will be found"),
        }
    }
}

#[derive(Debug, Clone)]
pub enum SearchOutcome {
    /// A state containing (or shrinkable to) the goal, with its path.
    Found(SetOfSources),
    /// All solutions collected in multiple-paths mode; may be empty when the
    /// iteration budget ran out first.
    FoundMany(Vec<SetOfSources>),
    /// The frontier ran dry without reaching the goal.
    Exhausted(SearchDiagnostic),
    /// The iteration budget ran out.
    IterationBudget(SearchDiagnostic),
}

impl SearchOutcome {
    pub fn is_success(&self) -> bool {
        match self {
            SearchOutcome::Found(_) => true,
            SearchOutcome::FoundMany(solutions) => !solutions.is_empty(),
            SearchOutcome::Exhausted(_) | SearchOutcome::IterationBudget(_) => false,
        }
    }

    pub fn into_found(self) -> Option<SetOfSources> {
        match self {
            SearchOutcome::Found(state) => Some(state),
            SearchOutcome::FoundMany(mut solutions) => {
                if solutions.is_empty() {
                    None
                } else {
                    Some(solutions.remove(0))
                }
            }
            _ => None,
        }
    }
}

/// Aggregate every source's right-hand variables toward granularities that
/// appear in the goal's right-hand side. Each changed source is added next
/// to its original in the returned start state.
pub fn preprocess_rhs(
    start_set: &SetOfSources,
    goal: &Data,
    registry: &MetadataRegistry,
) -> Result<SetOfSources> {
    let mut preprocessed = start_set.clone();

    for source in start_set.sources() {
        let mut adjusted = source.clone();
        let mut steps = Vec::new();

        for variable in &source.right_variables {
            let graph = registry.aggregation_graph(&variable.name)?;
            for granularity in graph.reachable(variable.granularity) {
                let target = Variable::new(variable.name.clone(), granularity);
                if goal.right_variables.contains(&target) {
                    if let Some(step) = adjusted.aggregate_variable(variable, &target, registry)? {
                        steps.push(step);
                    }
                    // Variable names are unique per side, one target is
                    // enough.
                    break;
                }
            }
        }

        if &adjusted != source {
            preprocessed.add_source(adjusted, steps, -1);
        }
    }

    Ok(preprocessed)
}

/// Best-first search from `start_set` to a state containing the goal.
///
/// Single-use models fire before the loop; from then on the registry is
/// read-only. Model neighbours are tried before the regular ones each
/// iteration. States already seen, under `Data` equality of their sources,
/// are not re-opened.
#[tracing::instrument(skip_all, fields(goal = %goal.notation(), max_iterations = max_iterations))]
pub fn a_star(
    registry: &mut MetadataRegistry,
    start_set: &SetOfSources,
    goal: &Data,
    models: &[Model],
    setup_models: &[Box<dyn SingleUseModel>],
    max_iterations: usize,
    options: &SearchOptions,
) -> Result<SearchOutcome> {
    for model in setup_models {
        if model.apply(registry)? {
            tracing::debug!(model = %model.name(), "single-use model applied");
        } else {
            tracing::warn!(model = %model.name(), "single-use model could not be applied");
        }
    }
    let registry: &MetadataRegistry = registry;

    let mut open: Vec<SetOfSources> = Vec::new();
    let mut closed: Vec<SetOfSources> = Vec::new();
    let mut successes: Vec<SetOfSources> = Vec::new();

    let mut agg = true;
    if options.preprocess_rhs {
        open.push(preprocess_rhs(start_set, goal, registry)?);
        // Aggregation was prepared up front; give it zero priority until the
        // search is completely stuck.
        agg = false;
    } else {
        open.push(start_set.clone());
    }

    for iteration in 0..max_iterations {
        if open.is_empty() {
            if options.find_multiple_paths && !successes.is_empty() {
                return Ok(SearchOutcome::FoundMany(successes));
            }
            return Ok(SearchOutcome::Exhausted(SearchDiagnostic {
                iterations: iteration,
                shedding: options.shedding.then_some(options.shedding_n),
            }));
        }

        let scores: Vec<f64> = open
            .iter()
            .map(|state| {
                score_state(
                    state,
                    goal,
                    options.similarity,
                    options.variant,
                    options.weights,
                    options.score_parameter,
                )
            })
            .collect();

        // First index of the maximum keeps tie-breaking deterministic.
        let mut current_index = 0;
        for (index, score) in scores.iter().enumerate() {
            if *score > scores[current_index] {
                current_index = index;
            }
        }
        let current_score = scores[current_index];
        let mut current = open[current_index].clone();

        if options.shedding && open.len() > options.shedding_n {
            let mut ranked: Vec<usize> = (0..open.len()).collect();
            ranked.sort_by(|a, b| scores[*b].total_cmp(&scores[*a]));
            ranked.truncate(options.shedding_n);
            ranked.sort_unstable();
            let mut keep = 0;
            open = open
                .into_iter()
                .enumerate()
                .filter_map(|(index, state)| {
                    if ranked.get(keep) == Some(&index) {
                        keep += 1;
                        Some(state)
                    } else {
                        None
                    }
                })
                .collect();
        }

        // The current state may already have been dropped by shedding.
        if let Some(position) = open.iter().position(|state| state == &current) {
            open.remove(position);
        }
        closed.push(current.clone());

        tracing::debug!(
            iteration,
            open = open.len(),
            closed = closed.len(),
            score = current_score,
            sources = current.len(),
            "expanding state"
        );

        let goal_found = current.contains(goal)
            || current.contains_shrink(goal, registry, options.shrink_policy)?;
        if goal_found {
            if !options.find_multiple_paths {
                return Ok(SearchOutcome::Found(current));
            }
            successes.push(current.clone());
        }

        // Models first; regular neighbours can always be found again later.
        let model_neighbours = current.neighbours_models(models, registry, options.shrink_policy)?;
        let mut inserted_model_neighbours = 0;
        for (neighbour, step) in model_neighbours {
            let mut next = current.clone();
            next.add_source(neighbour, [step], iteration as i64);
            if !open.contains(&next) && !closed.contains(&next) {
                open.push(next);
                inserted_model_neighbours += 1;
            }
        }

        if inserted_model_neighbours == 0 {
            let mut regular = current.neighbours(registry, agg)?;
            if !agg && regular.is_empty() {
                // Aggregation was deprioritised and nothing else moved; try
                // once with it.
                regular = current.neighbours(registry, true)?;
            }
            for (neighbour, step) in regular {
                let mut next = current.clone();
                next.add_source(neighbour, [step], iteration as i64);
                if !open.contains(&next) && !closed.contains(&next) {
                    open.push(next);
                }
            }
        }
    }

    if options.find_multiple_paths {
        Ok(SearchOutcome::FoundMany(successes))
    } else {
        Ok(SearchOutcome::IterationBudget(SearchDiagnostic {
            iterations: max_iterations,
            shedding: options.shedding.then_some(options.shedding_n),
        }))
    }
}

/// Timing report of repeated searches.
#[derive(Debug, Clone, PartialEq)]
pub struct SimulationReport {
    pub runs: usize,
    pub successful_runs: usize,
    pub mean_secs: f64,
    /// Half-width of the 95% confidence interval around the mean.
    pub ci_half_width_secs: f64,
}

/// Run the same search `n` times and report mean wall-clock time with a 95%
/// confidence half-width.
pub fn simulate(
    n: usize,
    registry: &mut MetadataRegistry,
    start_set: &SetOfSources,
    goal: &Data,
    models: &[Model],
    max_iterations: usize,
    options: &SearchOptions,
) -> Result<SimulationReport> {
    let mut times = Vec::with_capacity(n);
    let mut successful_runs = 0;

    for _ in 0..n {
        let started = Instant::now();
        let outcome = a_star(
            registry,
            start_set,
            goal,
            models,
            &[],
            max_iterations,
            options,
        )?;
        times.push(started.elapsed().as_secs_f64());
        if outcome.is_success() {
            successful_runs += 1;
        }
    }

    let mean = times.iter().sum::<f64>() / times.len().max(1) as f64;
    let ci_half_width = if times.len() > 1 {
        let variance = times.iter().map(|t| (t - mean).powi(2)).sum::<f64>()
            / (times.len() - 1) as f64;
        1.96 * variance.sqrt() / (times.len() as f64).sqrt()
    } else {
        0.0
    };

    Ok(SimulationReport {
        runs: n,
        successful_runs,
        mean_secs: mean,
        ci_half_width_secs: ci_half_width,
    })
}
