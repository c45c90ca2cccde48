//! Unit-set descriptions.
//!
//! An `IncludedUnits` describes which units a source covers: a unit-type
//! variable (persons, businesses, road segments) plus specifying variables
//! with their available values (country = NL, year in {2024, 2025}). A
//! variable that is not mentioned is unconstrained. Unions that cannot be
//! simplified to a single description are kept in disjunctive form as
//! `UnitSetUnion`; the `UnitSet` sum type dispatches every operation over
//! both shapes.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::hash::{Hash, Hasher};

use itertools::Itertools;

use crate::error::{MetapathError, Result};
use crate::registry::MetadataRegistry;
use crate::variable::{Variable, VariableSpec};

/// A single (conjunctive) unit-set description.
///
/// Equality, ordering, and hashing ignore `name`, which exists for printing
/// only. Specifying variables are keyed by name, so names are unique within
/// one description by construction.
#[derive(Debug, Clone)]
pub struct IncludedUnits {
    pub name: String,
    pub unit_type: Variable,
    pub specifying: BTreeMap<String, VariableSpec>,
}

impl IncludedUnits {
    pub fn new(
        name: impl Into<String>,
        unit_type: Variable,
        specifying: impl IntoIterator<Item = VariableSpec>,
    ) -> Self {
        Self {
            name: name.into(),
            unit_type,
            specifying: specifying
                .into_iter()
                .map(|spec| (spec.name.clone(), spec))
                .collect(),
        }
    }

    pub fn specifying_variable(&self, name: &str) -> Option<&VariableSpec> {
        self.specifying.get(name)
    }

    /// Whether the units described by `self` are contained in those
    /// described by `other`.
    ///
    /// Every variable `other` constrains must be constrained at least as
    /// tightly by `self`; variables only `self` constrains shrink `self`
    /// further and cannot break containment.
    pub fn is_subset(&self, other: &IncludedUnits, registry: &MetadataRegistry) -> Result<bool> {
        if self.unit_type != other.unit_type {
            return Ok(false);
        }

        let mut unchecked_other: BTreeSet<&String> = other.specifying.keys().collect();
        for (name, spec) in &self.specifying {
            if let Some(other_spec) = other.specifying.get(name) {
                unchecked_other.remove(name);
                if !spec.is_subset(other_spec, registry)? {
                    return Ok(false);
                }
            }
        }
        // A variable constrained only by other excludes some units of self.
        Ok(unchecked_other.is_empty())
    }

    /// Intersection of two descriptions. `None` when the unit types differ
    /// or the intersection is empty.
    pub fn intersection(
        &self,
        other: &IncludedUnits,
        registry: &MetadataRegistry,
    ) -> Result<Option<IncludedUnits>> {
        if self.unit_type != other.unit_type {
            return Ok(None);
        }
        if self.is_subset(other, registry)? {
            return Ok(Some(self.clone()));
        }
        if other.is_subset(self, registry)? {
            return Ok(Some(other.clone()));
        }

        let names: BTreeSet<&String> = self
            .specifying
            .keys()
            .chain(other.specifying.keys())
            .collect();
        let mut specifying = BTreeMap::new();
        for name in names {
            let spec = match (self.specifying.get(name), other.specifying.get(name)) {
                (Some(a), Some(b)) => {
                    let Some(intersected) = a.intersection(b, registry)? else {
                        return Ok(None);
                    };
                    if intersected.values_available.is_empty() {
                        // One empty specifying variable empties the whole set.
                        return Ok(None);
                    }
                    intersected
                }
                (Some(a), None) => a.clone(),
                (None, Some(b)) => b.clone(),
                (None, None) => continue,
            };
            specifying.insert(name.clone(), spec);
        }

        let mut names = [self.name.as_str(), other.name.as_str()];
        names.sort_unstable();
        Ok(Some(IncludedUnits {
            name: names.join(" ∩ "),
            unit_type: self.unit_type.clone(),
            specifying,
        }))
    }

    /// Re-express specifying variables at the requested granularities by
    /// translating their values through aggregation tables. A variable that
    /// is absent was implicitly complete and is added with every value known
    /// at the desired granularity.
    pub fn adjust_granularities(
        &self,
        desired: &BTreeMap<String, u32>,
        registry: &MetadataRegistry,
    ) -> Result<IncludedUnits> {
        let mut adjusted = self.clone();
        for (name, &desired_granularity) in desired {
            match self.specifying.get(name) {
                Some(spec) if spec.granularity != desired_granularity => {
                    let graph = registry.aggregation_graph(name)?;
                    if let Some(table) = graph.get_table(desired_granularity, spec.granularity) {
                        adjusted.specifying.insert(
                            name.clone(),
                            VariableSpec {
                                name: name.clone(),
                                granularity: desired_granularity,
                                values_available: table.translated_values(&spec.values_available),
                            },
                        );
                    }
                }
                Some(_) => {}
                None => {
                    let graph = registry.aggregation_graph(name)?;
                    adjusted.specifying.insert(
                        name.clone(),
                        VariableSpec {
                            name: name.clone(),
                            granularity: desired_granularity,
                            values_available: graph.all_values(desired_granularity),
                        },
                    );
                }
            }
        }
        Ok(adjusted)
    }

    /// Split into atomic descriptions, one per combination of single values
    /// over all specifying variables. Their disjunctive union equals `self`.
    pub fn split(&self) -> Vec<IncludedUnits> {
        if self.specifying.is_empty() {
            return vec![IncludedUnits {
                name: format!("{}_0", self.name),
                unit_type: self.unit_type.clone(),
                specifying: BTreeMap::new(),
            }];
        }

        let specs: Vec<&VariableSpec> = self.specifying.values().collect();
        specs
            .iter()
            .map(|spec| spec.values_available.iter())
            .multi_cartesian_product()
            .enumerate()
            .map(|(index, combination)| {
                let atoms = specs.iter().zip(combination).map(|(spec, value)| {
                    VariableSpec::new(spec.name.clone(), spec.granularity, [value.clone()])
                });
                IncludedUnits::new(
                    format!("{}_{}", self.name, index),
                    self.unit_type.clone(),
                    atoms,
                )
            })
            .collect()
    }
}

impl PartialEq for IncludedUnits {
    fn eq(&self, other: &Self) -> bool {
        self.unit_type == other.unit_type && self.specifying == other.specifying
    }
}

impl Eq for IncludedUnits {}

impl PartialOrd for IncludedUnits {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for IncludedUnits {
    fn cmp(&self, other: &Self) -> Ordering {
        self.unit_type
            .cmp(&other.unit_type)
            .then_with(|| self.specifying.cmp(&other.specifying))
    }
}

impl Hash for IncludedUnits {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.unit_type.hash(state);
        self.specifying.hash(state);
    }
}

impl fmt::Display for IncludedUnits {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let specs: Vec<String> = self.specifying.values().map(ToString::to_string).collect();
        write!(
            f,
            "{}: {{{} -- {}}}",
            self.name,
            self.unit_type,
            specs.join(", ")
        )
    }
}

/// Disjunctive union of descriptions sharing one unit type.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct UnitSetUnion {
    unit_type: Variable,
    members: BTreeSet<IncludedUnits>,
}

impl UnitSetUnion {
    /// Build a union; all members must share the unit type, otherwise the
    /// union is not well defined.
    pub fn new(members: impl IntoIterator<Item = IncludedUnits>) -> Result<Self> {
        let members: BTreeSet<IncludedUnits> = members.into_iter().collect();
        let unit_type = {
            let mut unit_types = members.iter().map(|member| &member.unit_type);
            let Some(first) = unit_types.next() else {
                return Err(MetapathError::BadUnion(
                    "a union of unit sets needs at least one member".to_string(),
                ));
            };
            if unit_types.any(|unit_type| unit_type != first) {
                return Err(MetapathError::BadUnion(
                    "a union was attempted between sets of units with different unit types"
                        .to_string(),
                ));
            }
            first.clone()
        };
        Ok(Self { unit_type, members })
    }

    pub fn unit_type(&self) -> &Variable {
        &self.unit_type
    }

    pub fn members(&self) -> &BTreeSet<IncludedUnits> {
        &self.members
    }

    /// Per specifying-variable name, the minimum granularity appearing in
    /// any member.
    pub fn minimum_granularities(&self) -> BTreeMap<String, u32> {
        let mut minimum: BTreeMap<String, u32> = BTreeMap::new();
        for member in &self.members {
            for (name, spec) in &member.specifying {
                minimum
                    .entry(name.clone())
                    .and_modify(|granularity| *granularity = (*granularity).min(spec.granularity))
                    .or_insert(spec.granularity);
            }
        }
        minimum
    }

    pub fn name(&self) -> String {
        let mut names: Vec<String> = self
            .members
            .iter()
            .map(|member| {
                if member.name.contains('∩') {
                    format!("({})", member.name)
                } else {
                    member.name.clone()
                }
            })
            .collect();
        names.sort_unstable();
        names.join(" ∪ ")
    }
}

impl fmt::Display for UnitSetUnion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let members: Vec<String> = self.members.iter().map(ToString::to_string).collect();
        write!(f, "{}: {{{}}}", self.name(), members.join(", "))
    }
}

/// A unit set in either shape. Every operation dispatches exhaustively over
/// the two variants.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum UnitSet {
    Simple(IncludedUnits),
    Union(UnitSetUnion),
}

impl UnitSet {
    pub fn unit_type(&self) -> &Variable {
        match self {
            UnitSet::Simple(simple) => &simple.unit_type,
            UnitSet::Union(union) => union.unit_type(),
        }
    }

    pub fn name(&self) -> String {
        match self {
            UnitSet::Simple(simple) => simple.name.clone(),
            UnitSet::Union(union) => union.name(),
        }
    }

    fn members(&self) -> Vec<&IncludedUnits> {
        match self {
            UnitSet::Simple(simple) => vec![simple],
            UnitSet::Union(union) => union.members().iter().collect(),
        }
    }

    fn minimum_granularities(&self) -> BTreeMap<String, u32> {
        match self {
            UnitSet::Simple(simple) => simple
                .specifying
                .iter()
                .map(|(name, spec)| (name.clone(), spec.granularity))
                .collect(),
            UnitSet::Union(union) => union.minimum_granularities(),
        }
    }

    pub fn is_subset(&self, other: &UnitSet, registry: &MetadataRegistry) -> Result<bool> {
        if self.unit_type() != other.unit_type() {
            return Ok(false);
        }
        match (self, other) {
            (UnitSet::Simple(simple), UnitSet::Simple(other_simple)) => {
                simple.is_subset(other_simple, registry)
            }
            _ => union_is_subset(&self.members(), other, registry),
        }
    }

    /// Pairwise intersection, discarding empty results. `None` when nothing
    /// survives.
    pub fn intersection(
        &self,
        other: &UnitSet,
        registry: &MetadataRegistry,
    ) -> Result<Option<UnitSet>> {
        if let (UnitSet::Simple(a), UnitSet::Simple(b)) = (self, other) {
            return Ok(a.intersection(b, registry)?.map(UnitSet::Simple));
        }

        let mut survivors: BTreeSet<IncludedUnits> = BTreeSet::new();
        for a in self.members() {
            for b in other.members() {
                if let Some(intersected) = a.intersection(b, registry)? {
                    survivors.insert(intersected);
                }
            }
        }
        collapse(survivors)
    }

    /// Union of the two unit sets. When neither contains the other the
    /// result cannot always be written as a single description and is kept
    /// in disjunctive form.
    pub fn union(&self, other: &UnitSet, registry: &MetadataRegistry) -> Result<Option<UnitSet>> {
        if self.unit_type() != other.unit_type() {
            return Ok(None);
        }
        if let (UnitSet::Simple(a), UnitSet::Simple(b)) = (self, other) {
            if a.is_subset(b, registry)? {
                return Ok(Some(other.clone()));
            }
            if b.is_subset(a, registry)? {
                return Ok(Some(self.clone()));
            }
            return Ok(Some(UnitSet::Union(UnitSetUnion::new([
                a.clone(),
                b.clone(),
            ])?)));
        }

        let members: BTreeSet<IncludedUnits> = self
            .members()
            .into_iter()
            .chain(other.members())
            .cloned()
            .collect();
        collapse(members)
    }
}

impl fmt::Display for UnitSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnitSet::Simple(simple) => simple.fmt(f),
            UnitSet::Union(union) => union.fmt(f),
        }
    }
}

impl From<IncludedUnits> for UnitSet {
    fn from(units: IncludedUnits) -> Self {
        UnitSet::Simple(units)
    }
}

impl From<UnitSetUnion> for UnitSet {
    fn from(union: UnitSetUnion) -> Self {
        UnitSet::Union(union)
    }
}

fn collapse(members: BTreeSet<IncludedUnits>) -> Result<Option<UnitSet>> {
    if members.len() <= 1 {
        return Ok(members.into_iter().next().map(UnitSet::Simple));
    }
    Ok(Some(UnitSet::Union(UnitSetUnion::new(members)?)))
}

/// Subset test with a union on the left: each member must be hosted by a
/// single member of `other` or, failing that, refine to the coarsest common
/// granularities and check its atoms one by one — a member may straddle
/// several members of `other`.
fn union_is_subset(
    members: &[&IncludedUnits],
    other: &UnitSet,
    registry: &MetadataRegistry,
) -> Result<bool> {
    let other_members = other.members();
    let minimum_granularities = other.minimum_granularities();

    for member in members {
        let mut hosted = false;
        for candidate in &other_members {
            if member.is_subset(candidate, registry)? {
                hosted = true;
                break;
            }
        }
        if hosted {
            continue;
        }

        let adjusted = member.adjust_granularities(&minimum_granularities, registry)?;
        for atom in adjusted.split() {
            let mut atom_hosted = false;
            for candidate in &other_members {
                if atom.is_subset(candidate, registry)? {
                    atom_hosted = true;
                    break;
                }
            }
            if !atom_hosted {
                return Ok(false);
            }
        }
    }
    Ok(true)
}
