//! Variables and value-constrained variable specifications.
//!
//! A `Variable` is a name plus a granularity level (smaller = finer). A
//! `VariableSpec` additionally enumerates the values available for the units
//! it describes; its set algebra is granularity-aware, translating values
//! through aggregation tables when the two operands sit at different levels.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::registry::MetadataRegistry;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Variable {
    pub name: String,
    pub granularity: u32,
}

impl Variable {
    pub fn new(name: impl Into<String>, granularity: u32) -> Self {
        Self {
            name: name.into(),
            granularity,
        }
    }

    pub fn equal_name(&self, other: &Variable) -> bool {
        self.name == other.name
    }
}

impl fmt::Display for Variable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.name, self.granularity)
    }
}

/// A variable together with the set of values available for it.
///
/// Used inside unit-set descriptions: the described units are those for which
/// this variable takes one of the available values.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct VariableSpec {
    pub name: String,
    pub granularity: u32,
    pub values_available: BTreeSet<String>,
}

impl VariableSpec {
    pub fn new<I, S>(name: impl Into<String>, granularity: u32, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            granularity,
            values_available: values.into_iter().map(Into::into).collect(),
        }
    }

    pub fn variable(&self) -> Variable {
        Variable::new(self.name.clone(), self.granularity)
    }

    /// All values known for this variable at this granularity are available.
    pub fn is_complete(&self, registry: &MetadataRegistry) -> Result<bool> {
        let graph = registry.aggregation_graph(&self.name)?;
        Ok(self.values_available == graph.all_values(self.granularity))
    }

    /// Whether the units selected by `self` are contained in those selected
    /// by `other`, were each the only constraint on a unit set.
    ///
    /// Across granularities this needs an aggregation table in one direction:
    /// - `self` finer: every value of `self` must lift into a coarse value
    ///   that `other` retains;
    /// - `self` coarser: `other` must retain every fine value that each value
    ///   of `self` expands into.
    pub fn is_subset(&self, other: &VariableSpec, registry: &MetadataRegistry) -> Result<bool> {
        if self.name != other.name {
            return Ok(false);
        }

        if self.granularity == other.granularity {
            return Ok(self.values_available.is_subset(&other.values_available));
        }

        let graph = registry.aggregation_graph(&self.name)?;

        if let Some(table) = graph.get_table(self.granularity, other.granularity) {
            for value in &self.values_available {
                let lifted = other.values_available.iter().any(|coarse| {
                    table
                        .value_map
                        .get(coarse)
                        .is_some_and(|fine| fine.contains(value))
                });
                if !lifted {
                    return Ok(false);
                }
            }
            Ok(true)
        } else if let Some(table) = graph.get_table(other.granularity, self.granularity) {
            for value in &self.values_available {
                let retained = table
                    .value_map
                    .get(value)
                    .is_some_and(|fine| fine.is_subset(&other.values_available));
                if !retained {
                    return Ok(false);
                }
            }
            Ok(true)
        } else {
            // No aggregation route in either direction.
            Ok(false)
        }
    }

    /// Intersection of the unit selections. The result keeps the finer
    /// operand's granularity. `None` when no aggregation route exists.
    pub fn intersection(
        &self,
        other: &VariableSpec,
        registry: &MetadataRegistry,
    ) -> Result<Option<VariableSpec>> {
        if self.name != other.name {
            return Ok(None);
        }

        if self.granularity == other.granularity {
            return Ok(Some(VariableSpec {
                name: self.name.clone(),
                granularity: self.granularity,
                values_available: self
                    .values_available
                    .intersection(&other.values_available)
                    .cloned()
                    .collect(),
            }));
        }

        let Some((finer, coarser, table)) = orient(self, other, registry)? else {
            return Ok(None);
        };

        // A fine value survives iff some available coarse value subsumes it.
        let values = finer
            .values_available
            .iter()
            .filter(|value| {
                coarser.values_available.iter().any(|coarse| {
                    table
                        .value_map
                        .get(coarse)
                        .is_some_and(|fine| fine.contains(*value))
                })
            })
            .cloned()
            .collect();

        Ok(Some(VariableSpec {
            name: self.name.clone(),
            granularity: finer.granularity,
            values_available: values,
        }))
    }

    /// Union of the unit selections, expressed at the finer granularity by
    /// expanding the coarser operand's values through the table.
    pub fn union(
        &self,
        other: &VariableSpec,
        registry: &MetadataRegistry,
    ) -> Result<Option<VariableSpec>> {
        if self.name != other.name {
            return Ok(None);
        }

        if self.granularity == other.granularity {
            return Ok(Some(VariableSpec {
                name: self.name.clone(),
                granularity: self.granularity,
                values_available: self
                    .values_available
                    .union(&other.values_available)
                    .cloned()
                    .collect(),
            }));
        }

        let Some((finer, coarser, table)) = orient(self, other, registry)? else {
            return Ok(None);
        };

        let mut values = finer.values_available.clone();
        for coarse in &coarser.values_available {
            if let Some(fine) = table.value_map.get(coarse) {
                values.extend(fine.iter().cloned());
            }
        }

        Ok(Some(VariableSpec {
            name: self.name.clone(),
            granularity: finer.granularity,
            values_available: values,
        }))
    }
}

/// Order two specs of the same variable as (finer, coarser) along with the
/// finer-to-coarser table, or `None` when no route has tables.
fn orient<'a>(
    a: &'a VariableSpec,
    b: &'a VariableSpec,
    registry: &MetadataRegistry,
) -> Result<Option<(&'a VariableSpec, &'a VariableSpec, crate::aggregation::AggregationTable)>> {
    let graph = registry.aggregation_graph(&a.name)?;
    if let Some(table) = graph.get_table(a.granularity, b.granularity) {
        Ok(Some((a, b, table)))
    } else if let Some(table) = graph.get_table(b.granularity, a.granularity) {
        Ok(Some((b, a, table)))
    } else {
        Ok(None)
    }
}

impl fmt::Display for VariableSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let values: Vec<&str> = self.values_available.iter().map(String::as_str).collect();
        write!(
            f,
            "{}_{}: {{{}}}",
            self.name,
            self.granularity,
            values.join(", ")
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::MetadataRegistry;

    fn region_registry() -> MetadataRegistry {
        let mut registry = MetadataRegistry::new();
        registry.register_aggregation_graph("region", &[0, 1], &[(0, 1)]);
        registry
            .register_aggregation_table(crate::aggregation::AggregationTable::new(
                "region",
                0,
                1,
                [
                    ("north", vec!["a", "b"]),
                    ("south", vec!["c", "d"]),
                ],
            ))
            .unwrap();
        registry
    }

    #[test]
    fn subset_same_granularity_is_value_subset() {
        let registry = region_registry();
        let small = VariableSpec::new("region", 0, ["a"]);
        let large = VariableSpec::new("region", 0, ["a", "b"]);
        assert!(small.is_subset(&large, &registry).unwrap());
        assert!(!large.is_subset(&small, &registry).unwrap());
    }

    #[test]
    fn subset_across_granularities_lifts_fine_values() {
        let registry = region_registry();
        let fine = VariableSpec::new("region", 0, ["a", "b"]);
        let coarse = VariableSpec::new("region", 1, ["north"]);
        assert!(fine.is_subset(&coarse, &registry).unwrap());

        let stray = VariableSpec::new("region", 0, ["a", "c"]);
        assert!(!stray.is_subset(&coarse, &registry).unwrap());
    }

    #[test]
    fn coarse_subset_requires_full_expansion() {
        let registry = region_registry();
        let coarse = VariableSpec::new("region", 1, ["north"]);
        let full = VariableSpec::new("region", 0, ["a", "b", "c"]);
        let partial = VariableSpec::new("region", 0, ["a"]);
        assert!(coarse.is_subset(&full, &registry).unwrap());
        assert!(!coarse.is_subset(&partial, &registry).unwrap());
    }

    #[test]
    fn intersection_keeps_finer_granularity() {
        let registry = region_registry();
        let fine = VariableSpec::new("region", 0, ["a", "c"]);
        let coarse = VariableSpec::new("region", 1, ["north"]);
        let result = fine.intersection(&coarse, &registry).unwrap().unwrap();
        assert_eq!(result.granularity, 0);
        assert_eq!(result.values_available, ["a".to_string()].into());
    }

    #[test]
    fn union_expands_coarse_values() {
        let registry = region_registry();
        let fine = VariableSpec::new("region", 0, ["c"]);
        let coarse = VariableSpec::new("region", 1, ["north"]);
        let result = fine.union(&coarse, &registry).unwrap().unwrap();
        assert_eq!(result.granularity, 0);
        assert_eq!(
            result.values_available,
            ["a".to_string(), "b".to_string(), "c".to_string()].into()
        );
    }

    #[test]
    fn mismatched_names_are_inapplicable() {
        let registry = region_registry();
        let a = VariableSpec::new("region", 0, ["a"]);
        let b = VariableSpec::new("year", 0, ["2025"]);
        assert!(!a.is_subset(&b, &registry).unwrap());
        assert!(a.intersection(&b, &registry).unwrap().is_none());
        assert!(a.union(&b, &registry).unwrap().is_none());
    }

    #[test]
    fn completeness_compares_against_all_known_values() {
        let registry = region_registry();
        let complete = VariableSpec::new("region", 0, ["a", "b", "c", "d"]);
        let partial = VariableSpec::new("region", 0, ["a", "b"]);
        assert!(complete.is_complete(&registry).unwrap());
        assert!(!partial.is_complete(&registry).unwrap());
    }
}
