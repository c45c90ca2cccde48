//! Search states: sets of available data sources with their audit trail.

use std::cell::Cell;
use std::collections::BTreeSet;
use std::hash::{Hash, Hasher};

use itertools::Itertools;

use crate::data::{combines, Data, ShrinkPolicy};
use crate::error::Result;
use crate::model::Model;
use crate::registry::MetadataRegistry;
use crate::search::path_step::{PathStep, StepMethod};

/// A set of sources, the path that produced it, and the iteration numbers
/// that extended the path. Equality and hashing cover the sources only, so
/// two states reached along different paths collapse in the frontier.
#[derive(Debug, Clone)]
pub struct SetOfSources {
    sources: BTreeSet<Data>,
    pub path: Vec<PathStep>,
    pub tree: Vec<i64>,
    score: Cell<Option<f64>>,
}

impl SetOfSources {
    pub fn new(start_set: impl IntoIterator<Item = Data>) -> Self {
        Self {
            sources: start_set.into_iter().collect(),
            path: vec![PathStep::start()],
            tree: Vec::new(),
            score: Cell::new(None),
        }
    }

    pub fn sources(&self) -> &BTreeSet<Data> {
        &self.sources
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    pub(crate) fn cached_score(&self) -> Option<f64> {
        self.score.get()
    }

    pub(crate) fn set_cached_score(&self, score: f64) {
        self.score.set(Some(score));
    }

    /// Add a source plus the steps that created it, tagged with the loop
    /// iteration for diagnostic replay.
    pub fn add_source(
        &mut self,
        data: Data,
        steps: impl IntoIterator<Item = PathStep>,
        iteration: i64,
    ) {
        self.sources.insert(data);
        self.path.extend(steps);
        self.tree.push(iteration);
        self.score.set(None);
    }

    /// Whether the goal is present by equality.
    pub fn contains(&self, goal: &Data) -> bool {
        self.sources.contains(goal)
    }

    /// Whether some source shrinks to the goal. Fires a `subset` path step
    /// per shrinkable source and adds the goal itself, so the final state
    /// witnesses how the goal was obtained.
    pub fn contains_shrink(
        &mut self,
        goal: &Data,
        registry: &MetadataRegistry,
        policy: ShrinkPolicy,
    ) -> Result<bool> {
        let mut candidates = Vec::new();
        for source in &self.sources {
            if source.shrink(goal, registry, policy)? {
                candidates.push(source.clone());
            }
        }
        if candidates.is_empty() {
            return Ok(false);
        }
        for candidate in candidates {
            self.add_source(
                goal.clone(),
                [PathStep::new(
                    StepMethod::Subset,
                    "remove variables or units",
                    vec![candidate],
                    vec![goal.clone()],
                )],
                -1,
            );
        }
        Ok(true)
    }

    /// Sources matching `data` by variable shape alone, ignoring units.
    pub fn contains_variables_only(&self, data: &Data, policy: ShrinkPolicy) -> Vec<&Data> {
        if self.sources.contains(data) {
            self.sources
                .iter()
                .filter(|source| source.equal_variables_only(data))
                .collect()
        } else {
            self.sources
                .iter()
                .filter(|source| source.shrink_variables_only(data, policy))
                .collect()
        }
    }

    pub fn sources_with_left_variable(&self, name: &str) -> Vec<&Data> {
        self.sources
            .iter()
            .filter(|source| source.contains_left_variable(name))
            .collect()
    }

    pub fn sources_with_right_variable(&self, name: &str) -> Vec<&Data> {
        self.sources
            .iter()
            .filter(|source| source.contains_right_variable(name))
            .collect()
    }

    /// All sources one manipulation away from this set: unary conversion and
    /// aggregation neighbours of each member, then every pairwise
    /// combination.
    pub fn neighbours(
        &self,
        registry: &MetadataRegistry,
        agg: bool,
    ) -> Result<Vec<(Data, PathStep)>> {
        let mut out: Vec<(Data, PathStep)> = Vec::new();

        for source in &self.sources {
            for (neighbour, step) in source.neighbours(registry, agg)? {
                if !out.iter().any(|(existing, _)| existing == &neighbour) {
                    out.push((neighbour, step));
                }
            }
        }

        for (a, b) in self.sources.iter().tuple_combinations() {
            let (rowwise, columnwise) = combines(a, b, registry)?;
            if let Some(combined) = rowwise {
                let step = PathStep::new(
                    StepMethod::Combine,
                    "rowwise",
                    vec![a.clone(), b.clone()],
                    vec![combined.clone()],
                );
                out.push((combined, step));
            }
            if let Some(combined) = columnwise {
                let step = PathStep::new(
                    StepMethod::Combine,
                    "columnwise",
                    vec![a.clone(), b.clone()],
                    vec![combined.clone()],
                );
                out.push((combined, step));
            }
        }

        Ok(out)
    }

    /// Sources reachable with exactly one model application, over every
    /// selection of the model's input arity from this set.
    pub fn neighbours_models(
        &self,
        models: &[Model],
        registry: &MetadataRegistry,
        policy: ShrinkPolicy,
    ) -> Result<Vec<(Data, PathStep)>> {
        let mut out: Vec<(Data, PathStep)> = Vec::new();

        for model in models {
            let arity = model.input_data.len();
            for selection in self.sources.iter().combinations(arity) {
                let Some(results) = model.apply(&selection, registry, policy)? else {
                    continue;
                };
                for output in results {
                    if !out.iter().any(|(existing, _)| existing == &output) {
                        let step = PathStep::new(
                            StepMethod::Model,
                            model.name.clone(),
                            model.input_data.iter().cloned().collect(),
                            vec![output.clone()],
                        );
                        out.push((output, step));
                    }
                }
            }
        }

        Ok(out)
    }
}

impl PartialEq for SetOfSources {
    fn eq(&self, other: &Self) -> bool {
        self.sources == other.sources
    }
}

impl Eq for SetOfSources {}

impl Hash for SetOfSources {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.sources.hash(state);
    }
}

impl std::fmt::Display for SetOfSources {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let members: Vec<String> = self.sources.iter().map(|d| d.notation()).collect();
        write!(f, "{{{}}}", members.join(",\n "))
    }
}
