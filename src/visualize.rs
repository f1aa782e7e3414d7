//! Graphviz rendering of reaction graphs for diagnostics.

use std::{fs, io, path::Path};

use clap::ValueEnum;
use petgraph::dot::{Config, Dot};

use crate::graph::{Node, NodeKind, RGraph, ReactionGraph};

/// Which per-combination graphs to render while enumerating.
#[derive(Copy, Clone, Default, PartialEq, Eq, PartialOrd, Ord, ValueEnum, Debug)]
pub enum DebugMode {
    /// Render nothing per combination.
    #[default]
    Off,
    /// Render every combination after validation.
    All,
    /// Render combinations that resolve to a single terminal node.
    #[value(alias = "valid-only")]
    Valid,
    /// Render combinations whose reaction completion failed.
    #[value(alias = "invalid-only")]
    Invalid,
}

impl DebugMode {
    /// Whether to render a combination right after validating it.
    pub fn after_validation(self, is_valid: bool) -> bool {
        match self {
            DebugMode::All => true,
            DebugMode::Valid => is_valid,
            DebugMode::Off | DebugMode::Invalid => false,
        }
    }

    /// Whether to render a combination whose completion failed.
    pub fn on_failure(self) -> bool {
        self == DebugMode::Invalid
    }
}

fn node_style(node: &Node) -> &'static str {
    match node.kind() {
        Some(NodeKind::Compound) => "shape=circle, style=filled, fillcolor=lightblue",
        Some(NodeKind::BuildingBlock) => "shape=circle, style=filled, fillcolor=mediumorchid",
        Some(NodeKind::Product) => "shape=circle, style=filled, fillcolor=salmon",
        Some(NodeKind::Reaction) => "shape=box, style=filled, fillcolor=lightgreen",
        None => "shape=circle",
    }
}

pub(crate) fn render_graph(g: &RGraph) -> String {
    let labelled = g.map(|_, node| node, |_, _| "");
    let dot = Dot::with_attr_getters(
        &labelled,
        &[Config::EdgeNoLabel],
        &|_, _| String::new(),
        &|_, (_, node)| node_style(node).to_string(),
    );
    format!("{dot}")
}

/// Render `graph` in DOT format, colouring nodes by kind.
pub fn render(graph: &ReactionGraph) -> String {
    render_graph(graph.graph())
}

/// Write the DOT rendering of `graph` to `path`.
pub fn write_dot(graph: &ReactionGraph, path: &Path) -> io::Result<()> {
    fs::write(path, render(graph))
}
