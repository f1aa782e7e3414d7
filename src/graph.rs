//! Typed reaction graph over compounds, building blocks, reactions and
//! products.
//!
//! Edges mean "source is consumed by, or feeds into, target". The graph is
//! built once per catalog from flat edge lists; node kinds and attributes are
//! then overlaid from the per-kind attribute maps.

use std::{
    collections::{BTreeMap, HashMap},
    fmt::Display,
};

use petgraph::graph::{DiGraph, EdgeIndex, NodeIndex};

pub(crate) type Index = u32;
pub(crate) type RGraph = DiGraph<Node, (), Index>;

/// A directed `(source, target)` pair of node names.
pub type Edge = (String, String);

/// Attribute maps keyed by node name.
pub type AttrMap = BTreeMap<String, Attrs>;

/// The role a node plays in the synthesis scheme.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum NodeKind {
    /// Catalog starting material with a known structure.
    Compound,
    /// Enumeration axis whose structure comes from the chosen whitelist entry.
    BuildingBlock,
    /// Transformation described by a reaction template, or a pass-through.
    Reaction,
    /// Intermediate or final compound computed by a reaction.
    Product,
}

impl Display for NodeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            NodeKind::Compound => "compound",
            NodeKind::BuildingBlock => "building_block",
            NodeKind::Reaction => "reaction",
            NodeKind::Product => "product",
        })
    }
}

/// Raw node attributes as found in the catalog.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Attrs {
    pub structure: Option<String>,
    pub template: Option<String>,
}

impl Attrs {
    pub fn with_structure(structure: impl Into<String>) -> Self {
        Self {
            structure: Some(structure.into()),
            template: None,
        }
    }

    pub fn with_template(template: impl Into<String>) -> Self {
        Self {
            structure: None,
            template: Some(template.into()),
        }
    }
}

/// The nodes of a [`ReactionGraph`].
///
/// Nodes only named in edge lists carry no kind and default attributes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    name: String,
    kind: Option<NodeKind>,
    attrs: Attrs,
}

impl Node {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            kind: None,
            attrs: Attrs::default(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> Option<NodeKind> {
        self.kind
    }

    pub fn attrs(&self) -> &Attrs {
        &self.attrs
    }

    pub fn is_reaction(&self) -> bool {
        self.kind == Some(NodeKind::Reaction)
    }
}

impl Display for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.name)
    }
}

/// A directed graph of named, typed nodes with set semantics for edges.
///
/// Node indices follow first appearance in the edge list, which fixes the
/// iteration order used everywhere downstream.
#[derive(Debug, Clone, Default)]
pub struct ReactionGraph {
    graph: RGraph,
    names: HashMap<String, NodeIndex<Index>>,
}

impl ReactionGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add the edge `source -> target`, creating missing endpoints. Adding an
    /// existing edge is a no-op.
    pub fn add_edge(&mut self, source: &str, target: &str) {
        let s = self.node_or_insert(source);
        let t = self.node_or_insert(target);
        self.graph.update_edge(s, t, ());
    }

    fn node_or_insert(&mut self, name: &str) -> NodeIndex<Index> {
        if let Some(ix) = self.names.get(name) {
            return *ix;
        }
        let ix = self.graph.add_node(Node::new(name));
        self.names.insert(name.to_string(), ix);
        ix
    }

    /// Tag every node named in `attrs` with `kind` and replace its attributes.
    /// Names absent from the graph are ignored.
    fn overlay(&mut self, attrs: &AttrMap, kind: NodeKind) {
        for (name, value) in attrs {
            if let Some(ix) = self.names.get(name) {
                let node = &mut self.graph[*ix];
                node.kind = Some(kind);
                node.attrs = value.clone();
            }
        }
    }

    pub fn index_of(&self, name: &str) -> Option<NodeIndex<Index>> {
        self.names.get(name).copied()
    }

    pub fn node(&self, ix: NodeIndex<Index>) -> &Node {
        &self.graph[ix]
    }

    pub fn get(&self, name: &str) -> Option<&Node> {
        self.index_of(name).map(|ix| &self.graph[ix])
    }

    pub fn find_edge(&self, source: &str, target: &str) -> Option<EdgeIndex<Index>> {
        self.graph
            .find_edge(self.index_of(source)?, self.index_of(target)?)
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Iterate over nodes in insertion order.
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.graph.node_weights()
    }

    pub(crate) fn graph(&self) -> &RGraph {
        &self.graph
    }
}

/// Build a [`ReactionGraph`] from `edges` and per-kind attribute maps.
///
/// All edges are added first; attributes are then overlaid in the order
/// compounds, products, building blocks, reactions, so that a name present in
/// several maps ends up with the kind and attributes of the last one. Reactions
/// come last because their templates must never be shadowed.
pub fn build_graph<'a>(
    edges: impl IntoIterator<Item = &'a Edge>,
    reactions: &AttrMap,
    compounds: &AttrMap,
    products: &AttrMap,
    building_blocks: Option<&AttrMap>,
) -> ReactionGraph {
    let mut g = ReactionGraph::new();
    for (source, target) in edges {
        g.add_edge(source, target);
    }

    g.overlay(compounds, NodeKind::Compound);
    g.overlay(products, NodeKind::Product);
    if let Some(building_blocks) = building_blocks {
        g.overlay(building_blocks, NodeKind::BuildingBlock);
    }
    g.overlay(reactions, NodeKind::Reaction);
    g
}

/// The experiment-wide reactions and compounds, plus the declared products.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    pub reactions: AttrMap,
    pub compounds: AttrMap,
    pub products: AttrMap,
}

impl Catalog {
    /// Build the graph over `edges` with this catalog's attributes.
    pub fn graph<'a>(
        &self,
        edges: impl IntoIterator<Item = &'a Edge>,
        building_blocks: Option<&AttrMap>,
    ) -> ReactionGraph {
        build_graph(
            edges,
            &self.reactions,
            &self.compounds,
            &self.products,
            building_blocks,
        )
    }
}
