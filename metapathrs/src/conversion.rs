//! Conversion graphs.
//!
//! Per variable, an undirected graph of granularities whose edges are
//! value-preserving conversions on the measurement side. Edges contributed
//! by models are tagged with the model's name so path steps can report them.

use std::collections::{BTreeMap, BTreeSet};

use petgraph::algo::astar;
use petgraph::graphmap::UnGraphMap;
use petgraph::visit::Bfs;

#[derive(Debug, Clone)]
pub struct ConversionGraph {
    variable_name: String,
    graph: UnGraphMap<u32, ()>,
    // Keyed on the normalised (low, high) endpoint pair.
    model_edges: BTreeMap<(u32, u32), String>,
}

impl ConversionGraph {
    pub fn new(variable_name: impl Into<String>, granularities: &[u32], edges: &[(u32, u32)]) -> Self {
        let mut graph = UnGraphMap::new();
        for &g in granularities {
            graph.add_node(g);
        }
        for &(a, b) in edges {
            graph.add_edge(a, b, ());
        }
        Self {
            variable_name: variable_name.into(),
            graph,
            model_edges: BTreeMap::new(),
        }
    }

    pub fn variable_name(&self) -> &str {
        &self.variable_name
    }

    pub fn add_edge(&mut self, a: u32, b: u32) {
        self.graph.add_edge(a, b, ());
    }

    /// Add an edge that exists only because a model provides the conversion.
    pub fn add_model_edge(&mut self, a: u32, b: u32, model_name: impl Into<String>) {
        self.graph.add_edge(a, b, ());
        self.model_edges
            .insert((a.min(b), a.max(b)), model_name.into());
    }

    pub fn has_route(&self, from: u32, to: u32) -> bool {
        petgraph::algo::has_path_connecting(&self.graph, from, to, None)
    }

    /// Granularities in the same connected component as `from`, excluding
    /// `from` itself.
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

    /// Describe the conversion from one granularity to another for a path
    /// step. Returns the names of any models whose edges the shortest route
    /// passes through, plus a human-readable detail string.
    pub fn path_detail(&self, from: u32, to: u32) -> (Option<String>, String) {
        let detail = format!("{}: {} → {}", self.variable_name, from, to);

        let Some((_, path)) = astar(&self.graph, from, |node| node == to, |_| 1u32, |_| 0) else {
            return (None, detail);
        };

        let models: Vec<&str> = path
            .windows(2)
            .filter_map(|hop| {
                self.model_edges
                    .get(&(hop[0].min(hop[1]), hop[0].max(hop[1])))
                    .map(String::as_str)
            })
            .collect();

        if models.is_empty() {
            (None, detail)
        } else {
            (Some(models.join("; ")), detail)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reachable_is_the_connected_component_without_self() {
        let graph = ConversionGraph::new("price", &[0, 1, 2, 3], &[(0, 1), (1, 2)]);
        assert_eq!(graph.reachable(0), [1, 2].into());
        assert_eq!(graph.reachable(2), [0, 1].into());
        assert!(graph.reachable(3).is_empty());
    }

    #[test]
    fn model_edges_are_reported_in_path_detail() {
        let mut graph = ConversionGraph::new("price", &[0, 1], &[]);
        graph.add_model_edge(0, 1, "deflate");
        let (model, detail) = graph.path_detail(0, 1);
        assert_eq!(model.as_deref(), Some("deflate"));
        assert_eq!(detail, "price: 0 → 1");
    }

    #[test]
    fn plain_edges_are_plain_conversions() {
        let graph = ConversionGraph::new("price", &[0, 1], &[(0, 1)]);
        let (model, _) = graph.path_detail(0, 1);
        assert!(model.is_none());
    }
}
