//! Data sources described by metadata only.
//!
//! A `Data` is a table of left-hand (measurement) variables keyed by
//! right-hand (identifier) variables, populated for the units its unit set
//! describes. No rows are ever touched; everything the search does happens on
//! these descriptions.

use std::cell::Cell;
use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::registry::MetadataRegistry;
use crate::search::{PathStep, StepMethod};
use crate::units::UnitSet;
use crate::variable::Variable;

/// Whether `shrink` may drop right-hand (identifier) variables.
///
/// Dropping an identifier can merge units that were distinct under the full
/// key. `DropRight` allows it anyway; `KeepRight` demands equal right-hand
/// sides.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShrinkPolicy {
    #[default]
    DropRight,
    KeepRight,
}

/// Weights of the per-source similarity score.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimilarityWeights {
    pub left_eq: f64,
    pub left_sim: f64,
    pub right_eq: f64,
    pub right_sim: f64,
    pub units: f64,
}

impl Default for SimilarityWeights {
    fn default() -> Self {
        Self {
            left_eq: 5.0,
            left_sim: 2.0,
            right_eq: 5.0,
            right_sim: 1.0,
            units: 5.0,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SimilarityVariant {
    /// Weighted sum of match counts.
    #[default]
    Base,
    /// Left-hand sum times right-hand-plus-units sum.
    BaseCoupled,
    /// Per goal variable, divided by the source's variable count; penalises
    /// oversized sources.
    Individual,
    /// Base divided by the maximum achievable for this goal.
    Normalized,
    /// Coupled base divided by the maximum achievable coupled score.
    NormalizedCoupled,
}

#[derive(Debug, Clone)]
pub struct Data {
    pub left_variables: BTreeSet<Variable>,
    pub right_variables: BTreeSet<Variable>,
    pub units: UnitSet,
    /// For printing paths; carries a `*` per manipulation applied.
    pub name: String,
    pub description: String,
    score: Cell<Option<f64>>,
}

impl Data {
    pub fn new(
        left_variables: impl IntoIterator<Item = Variable>,
        right_variables: impl IntoIterator<Item = Variable>,
        units: impl Into<UnitSet>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            left_variables: left_variables.into_iter().collect(),
            right_variables: right_variables.into_iter().collect(),
            units: units.into(),
            name: name.into(),
            description: String::new(),
            score: Cell::new(None),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Compact rendering: `(left | right)_units`.
    pub fn notation(&self) -> String {
        let left: Vec<String> = self.left_variables.iter().map(ToString::to_string).collect();
        let right: Vec<String> = self
            .right_variables
            .iter()
            .map(ToString::to_string)
            .collect();
        format!(
            "({} | {})_{}",
            left.join(", "),
            right.join(", "),
            self.units.name()
        )
    }

    pub fn left_variable_names(&self) -> BTreeSet<&str> {
        self.left_variables.iter().map(|v| v.name.as_str()).collect()
    }

    pub fn right_variable_names(&self) -> BTreeSet<&str> {
        self.right_variables
            .iter()
            .map(|v| v.name.as_str())
            .collect()
    }

    pub fn contains_left_variable(&self, name: &str) -> bool {
        self.left_variables.iter().any(|v| v.name == name)
    }

    pub fn contains_right_variable(&self, name: &str) -> bool {
        self.right_variables.iter().any(|v| v.name == name)
    }

    /// Shape-only equality: same variables, units disregarded.
    pub fn equal_variables_only(&self, other: &Data) -> bool {
        self.left_variables == other.left_variables
            && self.right_variables == other.right_variables
    }

    /// Drop the cached similarity score. Must be called after any mutation
    /// of the semantic fields.
    pub fn reset_score(&self) {
        self.score.set(None);
    }

    /// Heuristic similarity of this source to the goal, cached until the
    /// source changes. Exact matches count name and granularity, near
    /// matches count the name alone, and equal unit sets add the units
    /// weight.
    pub fn similarity(
        &self,
        goal: &Data,
        variant: SimilarityVariant,
        weights: SimilarityWeights,
    ) -> f64 {
        if let Some(score) = self.score.get() {
            return score;
        }

        let left_equal = self
            .left_variables
            .intersection(&goal.left_variables)
            .count() as f64;
        let right_equal = self
            .right_variables
            .intersection(&goal.right_variables)
            .count() as f64;
        let left_similar = self
            .left_variable_names()
            .intersection(&goal.left_variable_names())
            .count() as f64
            - left_equal;
        let right_similar = self
            .right_variable_names()
            .intersection(&goal.right_variable_names())
            .count() as f64
            - right_equal;
        let units_score = if self.units == goal.units {
            weights.units
        } else {
            0.0
        };

        let left_sum = weights.left_eq * left_equal + weights.left_sim * left_similar;
        let right_sum = weights.right_eq * right_equal + weights.right_sim * right_similar;
        let base = left_sum + right_sum + units_score;

        let left_equal_max = goal.left_variables.len() as f64;
        let right_equal_max = goal.right_variables.len() as f64;

        let score = match variant {
            SimilarityVariant::Base => base,
            SimilarityVariant::BaseCoupled => left_sum * (right_sum + units_score),
            SimilarityVariant::Individual => {
                let mut score = 0.0;
                for goal_variable in &goal.left_variables {
                    if self.left_variables.contains(goal_variable) {
                        score += weights.left_eq;
                    } else if self.contains_left_variable(&goal_variable.name) {
                        score += weights.left_sim;
                    }
                }
                for goal_variable in &goal.right_variables {
                    if self.right_variables.contains(goal_variable) {
                        score += weights.right_eq;
                    } else if self.contains_right_variable(&goal_variable.name) {
                        score += weights.right_sim;
                    }
                }
                if self.units == goal.units {
                    score += weights.units;
                }
                score / (self.left_variables.len() + self.right_variables.len()) as f64
            }
            SimilarityVariant::Normalized => {
                base / (weights.left_eq * left_equal_max
                    + weights.right_eq * right_equal_max
                    + weights.units)
            }
            SimilarityVariant::NormalizedCoupled => {
                (left_sum * (right_sum + units_score))
                    / (weights.left_eq
                        * left_equal_max
                        * (weights.right_eq * right_equal_max + weights.units))
            }
        };

        self.score.set(Some(score));
        score
    }

    /// Swap a left-hand variable for the same variable at another
    /// granularity. The caller must have checked the conversion graph; this
    /// records the change and returns the path step.
    pub fn convert_variable(
        &mut self,
        remove: &Variable,
        add: &Variable,
        registry: &MetadataRegistry,
    ) -> Result<Option<PathStep>> {
        if remove.name != add.name {
            return Ok(None);
        }
        let before = self.clone();

        self.left_variables.remove(remove);
        self.left_variables.insert(add.clone());
        self.name.push('*');
        self.reset_score();

        let graph = registry.conversion_graph(&remove.name)?;
        let (model, detail) = graph.path_detail(remove.granularity, add.granularity);
        let (method, method_detail) = match model {
            Some(model_name) => (StepMethod::Model, format!("{model_name} {detail}")),
            None => (StepMethod::Conversion, detail),
        };

        Ok(Some(PathStep::new(
            method,
            method_detail,
            vec![before],
            vec![self.clone()],
        )))
    }

    /// Swap a right-hand variable for a coarser granularity of itself. The
    /// caller must have checked the aggregation graph.
    pub fn aggregate_variable(
        &mut self,
        remove: &Variable,
        add: &Variable,
        registry: &MetadataRegistry,
    ) -> Result<Option<PathStep>> {
        if remove.name != add.name {
            return Ok(None);
        }
        // The graph must exist even though the detail is formatted locally.
        registry.aggregation_graph(&remove.name)?;
        let before = self.clone();

        self.right_variables.remove(remove);
        self.right_variables.insert(add.clone());
        self.name.push('*');
        self.reset_score();

        let method_detail = format!(
            "{}: {} → {}",
            remove.name, remove.granularity, add.granularity
        );
        Ok(Some(PathStep::new(
            StepMethod::Aggregation,
            method_detail,
            vec![before],
            vec![self.clone()],
        )))
    }

    /// All sources one manipulation away: one per convertible left-hand
    /// granularity and, when `agg` is set, one per reachable right-hand
    /// aggregation. Combination needs two sources and lives on the set.
    pub fn neighbours(
        &self,
        registry: &MetadataRegistry,
        agg: bool,
    ) -> Result<Vec<(Data, PathStep)>> {
        let mut out = Vec::new();

        for variable in &self.left_variables {
            let graph = registry.conversion_graph(&variable.name)?;
            for granularity in graph.reachable(variable.granularity) {
                let replacement = Variable::new(variable.name.clone(), granularity);
                let mut converted = self.clone();
                if let Some(step) = converted.convert_variable(variable, &replacement, registry)? {
                    out.push((converted, step));
                }
            }
        }

        if agg {
            for variable in &self.right_variables {
                let graph = registry.aggregation_graph(&variable.name)?;
                for granularity in graph.reachable(variable.granularity) {
                    let replacement = Variable::new(variable.name.clone(), granularity);
                    let mut aggregated = self.clone();
                    if let Some(step) =
                        aggregated.aggregate_variable(variable, &replacement, registry)?
                    {
                        out.push((aggregated, step));
                    }
                }
            }
        }

        Ok(out)
    }

    /// Whether this source can be reduced to `other` by dropping variables
    /// and narrowing units.
    pub fn shrink(
        &self,
        other: &Data,
        registry: &MetadataRegistry,
        policy: ShrinkPolicy,
    ) -> Result<bool> {
        if !self.shrink_variables_only(other, policy) {
            return Ok(false);
        }
        other.units.is_subset(&self.units, registry)
    }

    /// `shrink` without the unit-set condition.
    pub fn shrink_variables_only(&self, other: &Data, policy: ShrinkPolicy) -> bool {
        let right_ok = match policy {
            ShrinkPolicy::DropRight => other.right_variables.is_subset(&self.right_variables),
            ShrinkPolicy::KeepRight => self.right_variables == other.right_variables,
        };
        right_ok && other.left_variables.is_subset(&self.left_variables)
    }
}

impl PartialEq for Data {
    fn eq(&self, other: &Self) -> bool {
        self.left_variables == other.left_variables
            && self.right_variables == other.right_variables
            && self.units == other.units
    }
}

impl Eq for Data {}

impl PartialOrd for Data {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Data {
    fn cmp(&self, other: &Self) -> Ordering {
        self.left_variables
            .cmp(&other.left_variables)
            .then_with(|| self.right_variables.cmp(&other.right_variables))
            .then_with(|| self.units.cmp(&other.units))
    }
}

impl Hash for Data {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.left_variables.hash(state);
        self.right_variables.hash(state);
        self.units.hash(state);
    }
}

impl fmt::Display for Data {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.name, self.notation())
    }
}

/// Try both ways of combining two sources with equal right-hand sides.
///
/// Rowwise keeps the shared left-hand variables over the union of the unit
/// sets; columnwise takes all left-hand variables over the intersection.
/// Either, both, or neither may be possible.
pub fn combines(
    a: &Data,
    b: &Data,
    registry: &MetadataRegistry,
) -> Result<(Option<Data>, Option<Data>)> {
    if a.right_variables != b.right_variables {
        return Ok((None, None));
    }
    let name = format!("combine ({}+{})", a.name, b.name);

    let mut rowwise = None;
    if a.left_variables.intersection(&b.left_variables).next().is_some() {
        if let Some(units) = a.units.union(&b.units, registry)? {
            rowwise = Some(Data::new(
                a.left_variables
                    .intersection(&b.left_variables)
                    .cloned()
                    .collect::<Vec<_>>(),
                a.right_variables.iter().cloned().collect::<Vec<_>>(),
                units,
                name.clone(),
            ));
        }
    }

    let mut columnwise = None;
    if let Some(units) = a.units.intersection(&b.units, registry)? {
        columnwise = Some(Data::new(
            a.left_variables
                .union(&b.left_variables)
                .cloned()
                .collect::<Vec<_>>(),
            a.right_variables.iter().cloned().collect::<Vec<_>>(),
            units,
            name,
        ));
    }

    Ok((rowwise, columnwise))
}
