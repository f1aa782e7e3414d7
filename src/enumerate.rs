//! Enumerate building-block combinations and assemble the reaction edges each
//! combination participates in.
//!
//! A combination picks one whitelist entry per building-block position. Its
//! candidate edges are the entries' direct edges plus every component of the
//! shared reaction graph that explains how to synthesize one of the nodes the
//! direct edges touch.

use std::collections::{BTreeMap, BTreeSet};

use petgraph::{unionfind::UnionFind, visit::EdgeRef, Direction};
use serde::Deserialize;

use crate::graph::{Edge, ReactionGraph};

/// One admissible choice for a building-block position.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct WhitelistEntry {
    /// Position within the whitelist, recorded as the combination's code.
    pub index: u32,
    /// Reaction this entry feeds.
    pub reaction: String,
    /// Upstream node the reaction also consumes.
    #[serde(alias = "educt")]
    pub reactant: String,
    /// Node the reaction produces.
    pub product: String,
    /// Starting material this entry introduces, if any.
    #[serde(
        default,
        alias = "smiles",
        deserialize_with = "crate::utils::optional_text"
    )]
    pub structure: Option<String>,
}

/// One element of the Cartesian product of all whitelists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Combination<'a> {
    ordinal: usize,
    entries: Vec<&'a WhitelistEntry>,
}

impl<'a> Combination<'a> {
    /// Position of this combination in enumeration order.
    pub fn ordinal(&self) -> usize {
        self.ordinal
    }

    pub fn entries(&self) -> &[&'a WhitelistEntry] {
        &self.entries
    }

    /// The whitelist index of each chosen entry, in position order.
    pub fn codes(&self) -> Vec<u32> {
        self.entries.iter().map(|e| e.index).collect()
    }

    /// Codes joined with `_`, as used in diagnostic file names.
    pub fn label(&self) -> String {
        self.entries
            .iter()
            .map(|e| e.index.to_string())
            .collect::<Vec<_>>()
            .join("_")
    }

    /// The direct edges of every chosen entry at its `position`:
    /// `(position, reaction)`, `(reaction, product)` and `(reactant, reaction)`.
    pub fn direct_edges(&self, positions: &[String]) -> BTreeSet<Edge> {
        let mut edges = BTreeSet::new();
        for (position, entry) in positions.iter().zip(&self.entries) {
            edges.extend(entry_edges(position, entry));
        }
        edges
    }
}

/// The three edges a whitelist entry contributes at `position`.
pub fn entry_edges(position: &str, entry: &WhitelistEntry) -> [Edge; 3] {
    [
        (position.to_string(), entry.reaction.clone()),
        (entry.reaction.clone(), entry.product.clone()),
        (entry.reactant.clone(), entry.reaction.clone()),
    ]
}

/// The whitelists span more combinations than can be addressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("the whitelists span more than {} combinations", usize::MAX)]
pub struct CombinationOverflow;

/// Lazy, restartable Cartesian product over whitelists.
///
/// Combinations are produced in row-major order: the first whitelist varies
/// slowest. An empty whitelist yields no combinations; no whitelists at all
/// yield a single empty combination.
#[derive(Debug, Clone)]
pub struct Combinations<'a> {
    lists: Vec<&'a [WhitelistEntry]>,
    next: usize,
    total: usize,
}

impl<'a> Combinations<'a> {
    pub fn new(lists: Vec<&'a [WhitelistEntry]>) -> Result<Self, CombinationOverflow> {
        let total = lists
            .iter()
            .try_fold(1usize, |acc, l| acc.checked_mul(l.len()))
            .ok_or(CombinationOverflow)?;
        Ok(Self {
            lists,
            next: 0,
            total,
        })
    }

    /// Total number of combinations, independent of iteration progress.
    pub fn total(&self) -> usize {
        self.total
    }

    /// The `ordinal`-th combination in enumeration order.
    pub fn get(&self, ordinal: usize) -> Option<Combination<'a>> {
        if ordinal >= self.total {
            return None;
        }
        let mut entries = Vec::with_capacity(self.lists.len());
        let mut rest = ordinal;
        for &list in self.lists.iter().rev() {
            entries.push(&list[rest % list.len()]);
            rest /= list.len();
        }
        entries.reverse();
        Some(Combination { ordinal, entries })
    }

    /// Start over from the first combination.
    pub fn restart(&mut self) {
        self.next = 0;
    }
}

impl<'a> Iterator for Combinations<'a> {
    type Item = Combination<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let combination = self.get(self.next)?;
        self.next += 1;
        Some(combination)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.total.saturating_sub(self.next);
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for Combinations<'_> {}

/// A weakly connected component of the shared reaction graph.
#[derive(Debug, Clone, Default)]
struct Component {
    edges: Vec<Edge>,
    sinks: BTreeSet<String>,
}

/// Reactions that are not specific to any building block, split into weakly
/// connected components.
#[derive(Debug, Clone, Default)]
pub struct SharedReactions {
    components: Vec<Component>,
}

impl SharedReactions {
    /// Split `graph` into weakly connected components and record, for each,
    /// its edges and its out-degree-0 nodes.
    pub fn new(graph: &ReactionGraph) -> Self {
        let g = graph.graph();
        let mut uf = UnionFind::<usize>::new(g.node_count());
        for e in g.edge_references() {
            uf.union(e.source().index(), e.target().index());
        }

        // Components are numbered by the first node that reaches them.
        let mut slots = BTreeMap::new();
        let mut components: Vec<Component> = Vec::new();
        let mut slot_of = vec![0; g.node_count()];
        for ix in g.node_indices() {
            let root = uf.find(ix.index());
            let slot = *slots.entry(root).or_insert_with(|| {
                components.push(Component::default());
                components.len() - 1
            });
            slot_of[ix.index()] = slot;
            if g.neighbors_directed(ix, Direction::Outgoing).next().is_none() {
                components[slot].sinks.insert(g[ix].name().to_string());
            }
        }
        for e in g.edge_references() {
            components[slot_of[e.source().index()]].edges.push((
                g[e.source()].name().to_string(),
                g[e.target()].name().to_string(),
            ));
        }

        Self { components }
    }

    pub fn component_count(&self) -> usize {
        self.components.len()
    }

    /// Edges of every component in which one of `nodes` is a sink.
    pub fn pull_in(&self, nodes: &BTreeSet<&str>) -> Vec<&Edge> {
        self.components
            .iter()
            .filter(|c| nodes.iter().any(|n| c.sinks.contains(*n)))
            .flat_map(|c| c.edges.iter())
            .collect()
    }
}

/// Assemble the candidate edges of `combination`: its direct edges plus the
/// shared components that explain how to synthesize any node they touch.
pub fn candidate_edges(
    positions: &[String],
    combination: &Combination<'_>,
    shared: &SharedReactions,
) -> BTreeSet<Edge> {
    let mut edges = combination.direct_edges(positions);
    let pulled: Vec<Edge> = {
        let bb_nodes: BTreeSet<&str> = edges
            .iter()
            .flat_map(|(s, t)| [s.as_str(), t.as_str()])
            .collect();
        shared.pull_in(&bb_nodes).into_iter().cloned().collect()
    };
    edges.extend(pulled);
    edges
}
