//! Aggregation graphs and value-mapping tables.
//!
//! Per variable, a directed graph over granularities records which
//! aggregations are known. An edge may carry an `AggregationTable` that
//! quantifies the finer-to-coarser value mapping; edges without a table
//! witness reachability only. Requesting a table for a pair without a direct
//! one synthesises it by chaining tables along the shortest fully-quantified
//! path, and caches the result.

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use petgraph::algo::astar;
use petgraph::graphmap::DiGraphMap;
use petgraph::visit::{Bfs, Reversed};
use serde::{Deserialize, Serialize};

/// Finer-to-coarser value mapping along one aggregation edge.
///
/// Keys of `value_map` are coarse values; each maps to the set of fine values
/// it subsumes. Discrete values only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregationTable {
    pub variable_name: String,
    pub granularity_from: u32,
    pub granularity_to: u32,
    pub value_map: BTreeMap<String, BTreeSet<String>>,
    /// Intermediate granularities, set when this table was synthesised by
    /// chaining tables along a path.
    #[serde(default)]
    pub shortcut_path: Vec<u32>,
}

impl AggregationTable {
    pub fn new<I, K, V>(
        variable_name: impl Into<String>,
        granularity_from: u32,
        granularity_to: u32,
        value_map: I,
    ) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: IntoIterator,
        V::Item: Into<String>,
    {
        Self {
            variable_name: variable_name.into(),
            granularity_from,
            granularity_to,
            value_map: value_map
                .into_iter()
                .map(|(coarse, fine)| {
                    (
                        coarse.into(),
                        fine.into_iter().map(Into::into).collect(),
                    )
                })
                .collect(),
            shortcut_path: Vec::new(),
        }
    }

    /// Expand a set of coarse values to the union of the fine values they
    /// subsume.
    pub fn translated_values(&self, coarse_values: &BTreeSet<String>) -> BTreeSet<String> {
        coarse_values
            .iter()
            .filter_map(|coarse| self.value_map.get(coarse))
            .flat_map(|fine| fine.iter().cloned())
            .collect()
    }

    /// Chain two tables that share a common granularity into one spanning
    /// table. The inputs may be passed in either order; the result is
    /// oriented from the outer fine granularity to the outer coarse one.
    pub fn chain(&self, other: &AggregationTable) -> Option<AggregationTable> {
        if self.variable_name != other.variable_name {
            tracing::warn!(
                left = %self.variable_name,
                right = %other.variable_name,
                "chaining aggregation tables of different variables"
            );
            return None;
        }

        let (from, to, map_from_mid, map_mid_to, shortcut_path) =
            if self.granularity_to == other.granularity_from {
                let mut path = self.shortcut_path.clone();
                path.push(self.granularity_to);
                path.extend(&other.shortcut_path);
                (
                    self.granularity_from,
                    other.granularity_to,
                    &self.value_map,
                    &other.value_map,
                    path,
                )
            } else if self.granularity_from == other.granularity_to {
                let mut path = other.shortcut_path.clone();
                path.push(other.granularity_to);
                path.extend(&self.shortcut_path);
                (
                    other.granularity_from,
                    self.granularity_to,
                    &other.value_map,
                    &self.value_map,
                    path,
                )
            } else {
                tracing::warn!(
                    variable = %self.variable_name,
                    "chaining aggregation tables without a common granularity"
                );
                return None;
            };

        // Keys of the chained map are the keys of the outer coarse map; each
        // mid value routes its fine values to the coarse key that holds it.
        let mut chained: BTreeMap<String, BTreeSet<String>> = map_mid_to
            .keys()
            .map(|coarse| (coarse.clone(), BTreeSet::new()))
            .collect();
        for (mid_value, fine_values) in map_from_mid {
            if let Some((coarse, _)) = map_mid_to
                .iter()
                .find(|(_, mid_values)| mid_values.contains(mid_value))
            {
                chained
                    .entry(coarse.clone())
                    .or_default()
                    .extend(fine_values.iter().cloned());
            }
        }

        Some(AggregationTable {
            variable_name: self.variable_name.clone(),
            granularity_from: from,
            granularity_to: to,
            value_map: chained,
            shortcut_path,
        })
    }
}

impl fmt::Display for AggregationTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "AggregationTable of variable {}: {}",
            self.variable_name, self.granularity_from
        )?;
        for step in &self.shortcut_path {
            write!(f, " → {step}")?;
        }
        write!(f, " → {}.", self.granularity_to)?;
        for (coarse, fine) in &self.value_map {
            let fine: Vec<&str> = fine.iter().map(String::as_str).collect();
            write!(f, "\n      {coarse}: {{{}}}", fine.join(", "))?;
        }
        Ok(())
    }
}

/// Directed graph of granularities for one variable, with optional tables on
/// the edges.
#[derive(Debug, Clone)]
pub struct AggregationGraph {
    variable_name: String,
    graph: DiGraphMap<u32, ()>,
    tables: BTreeMap<(u32, u32), AggregationTable>,
    // Tables synthesised by `get_table`, cached so repeated lookups chain
    // only once.
    synthesised: RefCell<BTreeMap<(u32, u32), AggregationTable>>,
}

impl AggregationGraph {
    pub fn new(variable_name: impl Into<String>, granularities: &[u32], edges: &[(u32, u32)]) -> Self {
        let mut graph = DiGraphMap::new();
        for &g in granularities {
            graph.add_node(g);
        }
        for &(from, to) in edges {
            graph.add_edge(from, to, ());
        }
        Self {
            variable_name: variable_name.into(),
            graph,
            tables: BTreeMap::new(),
            synthesised: RefCell::new(BTreeMap::new()),
        }
    }

    pub fn variable_name(&self) -> &str {
        &self.variable_name
    }

    pub fn granularities(&self) -> BTreeSet<u32> {
        self.graph.nodes().collect()
    }

    pub fn add_granularity(&mut self, granularity: u32) {
        self.graph.add_node(granularity);
    }

    pub fn add_edge(&mut self, from: u32, to: u32) {
        self.graph.add_edge(from, to, ());
    }

    /// Whether an aggregation path exists, quantified or not.
    pub fn has_route(&self, from: u32, to: u32) -> bool {
        petgraph::algo::has_path_connecting(&self.graph, from, to, None)
    }

    /// All granularities reachable from `from`, excluding `from` itself.
    pub fn reachable(&self, from: u32) -> BTreeSet<u32> {
        if !self.graph.contains_node(from) {
            return BTreeSet::new();
        }
        let mut bfs = Bfs::new(&self.graph, from);
        let mut out = BTreeSet::new();
        while let Some(node) = bfs.next(&self.graph) {
            out.insert(node);
        }
        out.remove(&from);
        out
    }

    /// All granularities from which `to` can be reached, excluding `to`.
    pub fn reachable_reversed(&self, to: u32) -> BTreeSet<u32> {
        if !self.graph.contains_node(to) {
            return BTreeSet::new();
        }
        let reversed = Reversed(&self.graph);
        let mut bfs = Bfs::new(reversed, to);
        let mut out = BTreeSet::new();
        while let Some(node) = bfs.next(reversed) {
            out.insert(node);
        }
        out.remove(&to);
        out
    }

    /// Attach a table to the `(from, to)` edge, creating the edge if needed.
    /// Registering over an existing table overwrites it with a warning.
    pub fn set_table(&mut self, table: AggregationTable) {
        let key = (table.granularity_from, table.granularity_to);
        self.graph.add_edge(key.0, key.1, ());
        if self.tables.insert(key, table).is_some() {
            tracing::warn!(
                variable = %self.variable_name,
                from = key.0,
                to = key.1,
                "overwriting aggregation table"
            );
        }
    }

    /// The table from `from` to `to`: the direct one if registered, otherwise
    /// one synthesised by chaining along the shortest path whose edges all
    /// carry tables. `None` when no such path exists or `from == to`.
    pub fn get_table(&self, from: u32, to: u32) -> Option<AggregationTable> {
        if from == to {
            return None;
        }
        if let Some(table) = self.tables.get(&(from, to)) {
            return Some(table.clone());
        }
        if let Some(table) = self.synthesised.borrow().get(&(from, to)) {
            return Some(table.clone());
        }

        // Restrict to quantified edges; the shortest path minimises the
        // number of chaining steps whose assumptions stack up.
        let mut quantified = DiGraphMap::new();
        for node in self.graph.nodes() {
            quantified.add_node(node);
        }
        for &(a, b) in self.tables.keys() {
            quantified.add_edge(a, b, ());
        }
        let (_, path) = astar(&quantified, from, |node| node == to, |_| 1u32, |_| 0)?;

        let mut chained = self.tables.get(&(path[0], path[1]))?.clone();
        for hop in path.windows(2).skip(1) {
            chained = chained.chain(self.tables.get(&(hop[0], hop[1]))?)?;
        }

        self.synthesised
            .borrow_mut()
            .insert((from, to), chained.clone());
        Some(chained)
    }

    /// Best available approximation of the variable's domain at a
    /// granularity: the union of fine values of tables leaving it and coarse
    /// keys of tables arriving at it.
    pub fn all_values(&self, granularity: u32) -> BTreeSet<String> {
        let mut values = BTreeSet::new();
        for to in self.reachable(granularity) {
            if let Some(table) = self.get_table(granularity, to) {
                for fine in table.value_map.values() {
                    values.extend(fine.iter().cloned());
                }
            }
        }
        for from in self.reachable_reversed(granularity) {
            if let Some(table) = self.get_table(from, granularity) {
                values.extend(table.value_map.keys().cloned());
            }
        }
        values
    }
}
