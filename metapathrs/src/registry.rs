//! The metadata registry: aggregation and conversion graphs per variable.
//!
//! The registry is an explicit handle passed through the API. It is written
//! during session setup (and by single-use models, before the search starts)
//! and read-only afterwards. Registering a graph for a variable that already
//! has one overwrites it with a warning; looking up a variable that was never
//! registered is a fatal `NotInitialised`.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;

use glob::glob;
use serde::Deserialize;

use crate::aggregation::{AggregationGraph, AggregationTable};
use crate::conversion::ConversionGraph;
use crate::error::{MetapathError, Result};

#[derive(Debug, Clone, Default)]
pub struct MetadataRegistry {
    aggregation: BTreeMap<String, AggregationGraph>,
    conversion: BTreeMap<String, ConversionGraph>,
}

impl MetadataRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_aggregation_graph(
        &mut self,
        variable_name: &str,
        granularities: &[u32],
        edges: &[(u32, u32)],
    ) {
        let graph = AggregationGraph::new(variable_name, granularities, edges);
        if self
            .aggregation
            .insert(variable_name.to_string(), graph)
            .is_some()
        {
            tracing::warn!(variable = %variable_name, "overwriting aggregation graph");
        }
    }

    pub fn register_conversion_graph(
        &mut self,
        variable_name: &str,
        granularities: &[u32],
        edges: &[(u32, u32)],
    ) {
        let graph = ConversionGraph::new(variable_name, granularities, edges);
        if self
            .conversion
            .insert(variable_name.to_string(), graph)
            .is_some()
        {
            tracing::warn!(variable = %variable_name, "overwriting conversion graph");
        }
    }

    /// Attach a table to the aggregation graph of its variable, which must
    /// already be registered.
    pub fn register_aggregation_table(&mut self, table: AggregationTable) -> Result<()> {
        let name = table.variable_name.clone();
        let graph = self.aggregation_graph_mut(&name)?;
        graph.set_table(table);
        Ok(())
    }

    pub fn has_aggregation_graph(&self, variable_name: &str) -> bool {
        self.aggregation.contains_key(variable_name)
    }

    pub fn has_conversion_graph(&self, variable_name: &str) -> bool {
        self.conversion.contains_key(variable_name)
    }

    pub fn aggregation_graph(&self, variable_name: &str) -> Result<&AggregationGraph> {
        self.aggregation.get(variable_name).ok_or_else(|| {
            MetapathError::NotInitialised(format!("aggregation graph {variable_name}"))
        })
    }

    pub fn aggregation_graph_mut(&mut self, variable_name: &str) -> Result<&mut AggregationGraph> {
        self.aggregation.get_mut(variable_name).ok_or_else(|| {
            MetapathError::NotInitialised(format!("aggregation graph {variable_name}"))
        })
    }

    pub fn conversion_graph(&self, variable_name: &str) -> Result<&ConversionGraph> {
        self.conversion.get(variable_name).ok_or_else(|| {
            MetapathError::NotInitialised(format!("conversion graph {variable_name}"))
        })
    }

    pub fn conversion_graph_mut(&mut self, variable_name: &str) -> Result<&mut ConversionGraph> {
        self.conversion.get_mut(variable_name).ok_or_else(|| {
            MetapathError::NotInitialised(format!("conversion graph {variable_name}"))
        })
    }

    /// Load variable definitions from a directory of YAML files, one
    /// variable per file.
    pub fn load_from_dir<P: AsRef<Path>>(root: P) -> Result<Self> {
        let mut registry = MetadataRegistry::new();
        let root = root.as_ref();
        if !root.exists() {
            return Err(MetapathError::Validation(format!(
                "definitions directory not found: {}",
                root.display()
            )));
        }
        for pattern in ["*.yml", "*.yaml"] {
            for entry in glob(&format!("{}/{}", root.display(), pattern))
                .map_err(|e| MetapathError::Other(e.into()))?
                .flatten()
            {
                registry.load_definition_file(&entry)?;
            }
        }
        Ok(registry)
    }

    fn load_definition_file(&mut self, path: &Path) -> Result<()> {
        let contents = fs::read_to_string(path)?;
        let definition: VariableDefinition = serde_yaml::from_str(&contents)?;
        tracing::debug!(variable = %definition.variable, file = %path.display(), "loading variable definition");
        self.register_aggregation_graph(
            &definition.variable,
            &definition.granularities,
            &definition.aggregation_edges,
        );
        self.register_conversion_graph(
            &definition.variable,
            &definition.granularities,
            &definition.conversion_edges,
        );
        for table in definition.tables {
            self.register_aggregation_table(AggregationTable {
                variable_name: definition.variable.clone(),
                granularity_from: table.from,
                granularity_to: table.to,
                value_map: table.value_map,
                shortcut_path: Vec::new(),
            })?;
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct VariableDefinition {
    variable: String,
    granularities: Vec<u32>,
    #[serde(default)]
    aggregation_edges: Vec<(u32, u32)>,
    #[serde(default)]
    conversion_edges: Vec<(u32, u32)>,
    #[serde(default)]
    tables: Vec<TableDefinition>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct TableDefinition {
    from: u32,
    to: u32,
    value_map: BTreeMap<String, BTreeSet<String>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_graph_is_not_initialised() {
        let registry = MetadataRegistry::new();
        assert!(matches!(
            registry.aggregation_graph("region"),
            Err(MetapathError::NotInitialised(_))
        ));
    }

    #[test]
    fn table_registration_requires_the_graph() {
        let mut registry = MetadataRegistry::new();
        let table = AggregationTable::new("region", 0, 1, [("n", vec!["a"])]);
        assert!(registry.register_aggregation_table(table).is_err());
    }

    #[test]
    fn loads_definitions_from_yaml_dir() {
        let dir = tempfile::tempdir().unwrap();
        let yaml = "\
variable: region
granularities: [0, 1]
aggregation_edges: [[0, 1]]
tables:
  - from: 0
    to: 1
    value_map:
      north: [a, b]
      south: [c, d]
";
        std::fs::write(dir.path().join("region.yml"), yaml).unwrap();

        let registry = MetadataRegistry::load_from_dir(dir.path()).unwrap();
        let graph = registry.aggregation_graph("region").unwrap();
        assert!(graph.get_table(0, 1).is_some());
        assert!(registry.conversion_graph("region").is_ok());
    }
}
