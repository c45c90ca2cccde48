//! Declarative models.
//!
//! A model states that if certain input sources are available, a declared
//! output source can be produced. Inputs are matched by variable shape so a
//! model applies as widely as possible; the units rule then pins down which
//! units the output actually covers. Single-use models are different beasts:
//! they mutate the registry once before the search starts, typically to add
//! an edge that is normally unavailable.

use std::collections::BTreeSet;
use std::fmt;

use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::data::{Data, ShrinkPolicy};
use crate::error::Result;
use crate::registry::MetadataRegistry;
use crate::units::UnitSet;

/// How the unit sets of the matched inputs determine the output's units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitsRule {
    /// Inputs must be present as declared (or shrinkable to it); the output
    /// is emitted unchanged.
    Exact,
    /// Output units are the intersection of the matched inputs' units.
    Intersection,
    /// Output units are the union of the matched inputs' units.
    Union,
    /// All matched inputs must have equal units; the output gets them.
    Equal,
}

impl fmt::Display for UnitsRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            UnitsRule::Exact => "exact",
            UnitsRule::Intersection => "intersection",
            UnitsRule::Union => "union",
            UnitsRule::Equal => "equal",
        };
        f.write_str(text)
    }
}

#[derive(Debug, Clone)]
pub struct Model {
    /// Input templates; all must be matched for the model to fire.
    pub input_data: BTreeSet<Data>,
    pub output_data: Data,
    pub units_rule: UnitsRule,
    pub name: String,
}

impl Model {
    pub fn new(
        input_data: impl IntoIterator<Item = Data>,
        output_data: Data,
        units_rule: UnitsRule,
        name: impl Into<String>,
    ) -> Self {
        Self {
            input_data: input_data.into_iter().collect(),
            output_data,
            units_rule,
            name: name.into(),
        }
    }

    /// Apply the model to a candidate selection of sources. Returns the
    /// realised outputs, several when input matching is ambiguous, or `None`
    /// when the inputs or the units rule are not satisfied.
    pub fn apply(
        &self,
        potential_input: &[&Data],
        registry: &MetadataRegistry,
        policy: ShrinkPolicy,
    ) -> Result<Option<BTreeSet<Data>>> {
        match self.units_rule {
            UnitsRule::Exact => self.apply_exact(potential_input, registry, policy),
            UnitsRule::Intersection | UnitsRule::Union | UnitsRule::Equal => {
                self.apply_units_rule(potential_input, policy, registry)
            }
        }
    }

    fn apply_exact(
        &self,
        potential_input: &[&Data],
        registry: &MetadataRegistry,
        policy: ShrinkPolicy,
    ) -> Result<Option<BTreeSet<Data>>> {
        let exact = self
            .input_data
            .iter()
            .all(|required| potential_input.iter().any(|source| *source == required));
        if exact {
            return Ok(Some([self.output_data.clone()].into()));
        }

        // Shrinkable sources satisfy the requirement as well.
        for required in &self.input_data {
            let mut satisfied = false;
            for source in potential_input {
                if source.shrink(required, registry, policy)? {
                    satisfied = true;
                    break;
                }
            }
            if !satisfied {
                return Ok(None);
            }
        }
        Ok(Some([self.output_data.clone()].into()))
    }

    fn apply_units_rule(
        &self,
        potential_input: &[&Data],
        policy: ShrinkPolicy,
        registry: &MetadataRegistry,
    ) -> Result<Option<BTreeSet<Data>>> {
        // Per required template, every candidate unit set whose source covers
        // the template's variables.
        let mut unit_candidates: Vec<Vec<&UnitSet>> = Vec::new();
        for required in &self.input_data {
            let candidates: Vec<&UnitSet> = potential_input
                .iter()
                .filter(|source| source.shrink_variables_only(required, policy))
                .map(|source| &source.units)
                .collect();
            if candidates.is_empty() {
                return Ok(None);
            }
            unit_candidates.push(candidates);
        }

        let mut outputs: BTreeSet<Data> = BTreeSet::new();
        for selection in unit_candidates
            .iter()
            .map(|candidates| candidates.iter().copied())
            .multi_cartesian_product()
        {
            if let Some(units) = self.combine_units(&selection, registry)? {
                let mut output = self.output_data.clone();
                output.units = units;
                output.reset_score();
                outputs.insert(output);
            }
        }

        if outputs.is_empty() {
            Ok(None)
        } else {
            Ok(Some(outputs))
        }
    }

    fn combine_units(
        &self,
        selection: &[&UnitSet],
        registry: &MetadataRegistry,
    ) -> Result<Option<UnitSet>> {
        let Some((first, rest)) = selection.split_first() else {
            return Ok(None);
        };
        match self.units_rule {
            UnitsRule::Intersection => {
                let mut combined = (*first).clone();
                for units in rest {
                    match combined.intersection(units, registry)? {
                        Some(next) => combined = next,
                        None => return Ok(None),
                    }
                }
                Ok(Some(combined))
            }
            UnitsRule::Union => {
                let mut combined = (*first).clone();
                for units in rest {
                    match combined.union(units, registry)? {
                        Some(next) => combined = next,
                        None => return Ok(None),
                    }
                }
                Ok(Some(combined))
            }
            UnitsRule::Equal => {
                if rest.iter().all(|units| *units == *first) {
                    Ok(Some((*first).clone()))
                } else {
                    Ok(None)
                }
            }
            UnitsRule::Exact => Ok(None),
        }
    }
}

impl fmt::Display for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inputs: Vec<String> = self.input_data.iter().map(|d| d.notation()).collect();
        write!(
            f,
            "{}: {} -> {}",
            self.name,
            inputs.join(" + "),
            self.output_data.notation()
        )
    }
}

/// A model applied once, before the search starts, by mutating the registry.
///
/// The usual example is adding an aggregation or conversion edge that is
/// normally unavailable. Returns whether the model could be applied, so a
/// refusal can be relayed to the user.
pub trait SingleUseModel {
    fn name(&self) -> &str;
    fn apply(&self, registry: &mut MetadataRegistry) -> Result<bool>;
}
