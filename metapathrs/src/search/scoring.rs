//! Scoring of search states against the goal.
//!
//! A state's score combines the per-source similarities into one number; the
//! combination function is chosen per run. `sum` rewards hoarding sources,
//! `topsum` bounds that by only counting the best few, the max/mean/min
//! family trades greed against balance, and the per-variable functions score
//! the best source for each goal variable separately.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::data::{Data, SimilarityVariant, SimilarityWeights};
use crate::search::sources::SetOfSources;
use crate::variable::Variable;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SimilarityChoice {
    #[default]
    Sum,
    /// Sum of the top `parameter × |goal variables|` source scores.
    Topsum,
    Max,
    Mean,
    Median,
    Min,
    /// max × min.
    Minmax,
    /// max + mean.
    Maxmean,
    /// max × mean × min.
    Maxmeanmin,
    /// Mean of per-goal-left-variable maxima, taken over the sources that
    /// carry the variable.
    MaxPerVariable,
    /// `MaxPerVariable` with a bonus for overlapping right-hand sides among
    /// the best sources.
    MaxPerVariableBonus,
}

/// Score a state against the goal; cached on the state until it changes.
pub fn score_state(
    state: &SetOfSources,
    goal: &Data,
    choice: SimilarityChoice,
    variant: SimilarityVariant,
    weights: SimilarityWeights,
    parameter: f64,
) -> f64 {
    if let Some(score) = state.cached_score() {
        return score;
    }

    let scores: Vec<f64> = state
        .sources()
        .iter()
        .map(|source| source.similarity(goal, variant, weights))
        .collect();

    let score = match choice {
        SimilarityChoice::Sum => scores.iter().sum(),
        SimilarityChoice::Topsum => {
            let keep =
                (parameter * (goal.left_variables.len() + goal.right_variables.len()) as f64)
                    .max(0.0) as usize;
            let mut sorted = scores.clone();
            sorted.sort_by(|a, b| b.total_cmp(a));
            sorted.iter().take(keep).sum()
        }
        SimilarityChoice::Max => max(&scores),
        SimilarityChoice::Mean => mean(&scores),
        SimilarityChoice::Median => median(&scores),
        SimilarityChoice::Min => min(&scores),
        SimilarityChoice::Minmax => max(&scores) * min(&scores),
        SimilarityChoice::Maxmean => max(&scores) + mean(&scores),
        SimilarityChoice::Maxmeanmin => max(&scores) * mean(&scores) * min(&scores),
        SimilarityChoice::MaxPerVariable => {
            mean(&per_variable_maxima(state, goal, variant, weights).0)
        }
        SimilarityChoice::MaxPerVariableBonus => {
            let (maxima, best_rights) = per_variable_maxima(state, goal, variant, weights);
            mean(&maxima) * (right_overlap_ratio(&best_rights) + 1.0) / 2.0
        }
    };

    state.set_cached_score(score);
    score
}

/// For each left-hand goal variable, the best score among sources carrying
/// it (zero when none does), plus the right-hand sides of those best
/// sources.
fn per_variable_maxima<'a>(
    state: &'a SetOfSources,
    goal: &Data,
    variant: SimilarityVariant,
    weights: SimilarityWeights,
) -> (Vec<f64>, Vec<&'a BTreeSet<Variable>>) {
    let mut maxima = Vec::with_capacity(goal.left_variables.len());
    let mut best_rights = Vec::new();

    for variable in &goal.left_variables {
        let candidates = state.sources_with_left_variable(&variable.name);
        let best = candidates
            .iter()
            .map(|source| (*source, source.similarity(goal, variant, weights)))
            .max_by(|(_, a), (_, b)| a.total_cmp(b));
        match best {
            Some((source, score)) => {
                maxima.push(score);
                best_rights.push(&source.right_variables);
            }
            None => maxima.push(0.0),
        }
    }
    (maxima, best_rights)
}

/// |intersection| / |union| of the right-hand sides; zero when there is
/// nothing to overlap.
fn right_overlap_ratio(rights: &[&BTreeSet<Variable>]) -> f64 {
    let Some((first, rest)) = rights.split_first() else {
        return 0.0;
    };
    let mut intersection = (*first).clone();
    let mut union = (*first).clone();
    for right in rest {
        intersection = intersection.intersection(right).cloned().collect();
        union.extend((*right).iter().cloned());
    }
    if union.is_empty() {
        return 0.0;
    }
    intersection.len() as f64 / union.len() as f64
}

fn max(scores: &[f64]) -> f64 {
    scores.iter().copied().fold(f64::NEG_INFINITY, f64::max)
}

fn min(scores: &[f64]) -> f64 {
    scores.iter().copied().fold(f64::INFINITY, f64::min)
}

fn mean(scores: &[f64]) -> f64 {
    if scores.is_empty() {
        return 0.0;
    }
    scores.iter().sum::<f64>() / scores.len() as f64
}

fn median(scores: &[f64]) -> f64 {
    if scores.is_empty() {
        return 0.0;
    }
    let mut sorted = scores.to_vec();
    sorted.sort_by(f64::total_cmp);
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}
