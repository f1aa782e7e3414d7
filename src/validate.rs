//! Per-combination working subgraphs and the single-terminal check.
//!
//! A [`Subgraph`] is the edge-induced subgraph of the catalog graph on a
//! combination's candidate edges. It stores catalog node indices only, so the
//! catalog itself is never copied or mutated.

use std::collections::{BTreeSet, HashMap};

use petgraph::{
    graph::{DiGraph, NodeIndex},
    Direction,
};
use tracing::trace;

use crate::graph::{Edge, Index, Node, RGraph, ReactionGraph};

pub(crate) type SGraph = DiGraph<NodeIndex<Index>, (), Index>;

/// Edge-induced subgraph over catalog node indices.
///
/// Local node order follows catalog node order, which makes every scan over
/// the subgraph deterministic.
#[derive(Debug, Clone)]
pub struct Subgraph {
    graph: SGraph,
}

impl Subgraph {
    /// Induce the subgraph of `catalog` spanned by `edges`. Only endpoints of
    /// `edges` become nodes. Edges naming nodes unknown to the catalog are
    /// dropped.
    pub fn induce(catalog: &ReactionGraph, edges: &BTreeSet<Edge>) -> Self {
        let mut pairs = Vec::with_capacity(edges.len());
        let mut endpoints = BTreeSet::new();
        for (source, target) in edges {
            match (catalog.index_of(source), catalog.index_of(target)) {
                (Some(s), Some(t)) => {
                    endpoints.insert(s);
                    endpoints.insert(t);
                    pairs.push((s, t));
                }
                _ => trace!(%source, %target, "edge outside the catalog graph"),
            }
        }

        let mut graph = SGraph::with_capacity(endpoints.len(), pairs.len());
        let local: HashMap<_, _> = endpoints
            .into_iter()
            .map(|ix| (ix, graph.add_node(ix)))
            .collect();
        for (s, t) in pairs {
            graph.update_edge(local[&s], local[&t], ());
        }
        Self { graph }
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Local node indices in stable order.
    pub fn nodes(&self) -> impl Iterator<Item = NodeIndex<Index>> + '_ {
        self.graph.node_indices()
    }

    /// The catalog node behind local node `local`.
    pub fn catalog_index(&self, local: NodeIndex<Index>) -> NodeIndex<Index> {
        self.graph[local]
    }

    pub fn predecessors(
        &self,
        local: NodeIndex<Index>,
    ) -> impl Iterator<Item = NodeIndex<Index>> + '_ {
        self.graph.neighbors_directed(local, Direction::Incoming)
    }

    pub fn successors(
        &self,
        local: NodeIndex<Index>,
    ) -> impl Iterator<Item = NodeIndex<Index>> + '_ {
        self.graph.neighbors_directed(local, Direction::Outgoing)
    }

    /// Local nodes with out-degree 0.
    pub fn sinks(&self) -> Vec<NodeIndex<Index>> {
        self.graph
            .node_indices()
            .filter(|&n| self.successors(n).next().is_none())
            .collect()
    }

    /// A standalone copy carrying the catalog's node data, for rendering.
    pub(crate) fn to_reaction_graph(&self, catalog: &ReactionGraph) -> RGraph {
        self.graph.map(|_, ix| catalog.node(*ix).clone(), |_, _| ())
    }

    /// The catalog node behind `local`.
    pub fn node<'c>(&self, catalog: &'c ReactionGraph, local: NodeIndex<Index>) -> &'c Node {
        catalog.node(self.catalog_index(local))
    }
}

/// Outcome of checking a combination's subgraph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Validation {
    /// Number of out-degree-0 nodes.
    pub sinks: usize,
    /// The unique sink, when there is exactly one.
    pub terminal: Option<NodeIndex<Index>>,
}

impl Validation {
    pub fn is_valid(&self) -> bool {
        self.terminal.is_some()
    }
}

/// A subgraph is valid iff it has exactly one sink, which becomes the terminal
/// node. No sinks (a cycle) and several sinks are not told apart.
pub fn validate(subgraph: &Subgraph) -> Validation {
    let sinks = subgraph.sinks();
    Validation {
        sinks: sinks.len(),
        terminal: match sinks.as_slice() {
            [terminal] => Some(*terminal),
            _ => None,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{build_graph, AttrMap};

    fn edges(pairs: &[(&str, &str)]) -> BTreeSet<Edge> {
        pairs
            .iter()
            .map(|(s, t)| (s.to_string(), t.to_string()))
            .collect()
    }

    fn catalog(pairs: &[(&str, &str)]) -> ReactionGraph {
        let e: Vec<Edge> = pairs
            .iter()
            .map(|(s, t)| (s.to_string(), t.to_string()))
            .collect();
        build_graph(&e, &AttrMap::new(), &AttrMap::new(), &AttrMap::new(), None)
    }

    #[test]
    fn single_sink_is_terminal() {
        let g = catalog(&[("A", "R1"), ("B", "R1"), ("R1", "P1"), ("C", "R2"), ("R2", "P2")]);
        let sub = Subgraph::induce(&g, &edges(&[("A", "R1"), ("B", "R1"), ("R1", "P1")]));
        assert_eq!(sub.node_count(), 4);

        let v = validate(&sub);
        assert!(v.is_valid());
        assert_eq!(sub.node(&g, v.terminal.unwrap()).name(), "P1");
    }

    #[test]
    fn subgraph_is_edge_induced() {
        let g = catalog(&[("A", "R1"), ("R1", "P1"), ("P1", "R2"), ("R2", "P2")]);
        // P1 -> R2 exists in the catalog but is not a candidate edge.
        let sub = Subgraph::induce(&g, &edges(&[("A", "R1"), ("R1", "P1"), ("R2", "P2")]));
        assert_eq!(sub.edge_count(), 3);
        let v = validate(&sub);
        assert_eq!(v.sinks, 2);
        assert!(!v.is_valid());
    }

    #[test]
    fn cycles_have_no_terminal() {
        let g = catalog(&[("P1", "R1"), ("R1", "P1")]);
        let v = validate(&Subgraph::induce(&g, &edges(&[("P1", "R1"), ("R1", "P1")])));
        assert_eq!(v.sinks, 0);
        assert_eq!(v.terminal, None);
    }

    #[test]
    fn local_order_follows_catalog_order() {
        let g = catalog(&[("B", "R1"), ("A", "R1"), ("R1", "P1")]);
        let sub = Subgraph::induce(&g, &edges(&[("A", "R1"), ("B", "R1"), ("R1", "P1")]));
        let names: Vec<_> = sub.nodes().map(|n| sub.node(&g, n).name()).collect();
        assert_eq!(names, ["B", "R1", "A", "P1"]);
    }

    #[test]
    fn unknown_endpoints_are_dropped() {
        let g = catalog(&[("A", "R1")]);
        let sub = Subgraph::induce(&g, &edges(&[("A", "R1"), ("Z", "R1")]));
        assert_eq!(sub.edge_count(), 1);
        assert_eq!(sub.node_count(), 2);
    }
}
