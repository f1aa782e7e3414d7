//! Resolve the structures of a combination's subgraph reaction by reaction.
//!
//! Structures are first overlaid onto the subgraph's nodes from the catalog
//! and the chosen whitelist entries. The engine then repeatedly picks the
//! first ready reaction (all predecessors resolved, product still unresolved)
//! in subgraph order, applies it, and stores the product, until no reaction is
//! ready. Every product is written at most once, so the loop always ends.

use std::{
    collections::{BTreeMap, BTreeSet},
    fmt::Display,
};

use clap::ValueEnum;
use petgraph::graph::NodeIndex;
use tracing::{debug, trace};

use crate::{
    chemistry::{ReactionTemplate, Reactor, ReactorError, Structure},
    graph::{Catalog, Index, NodeKind, ReactionGraph},
    validate::Subgraph,
};

/// What to do when a combination's reactions cannot be resolved.
#[derive(Copy, Clone, Default, PartialEq, Eq, PartialOrd, Ord, ValueEnum, Debug)]
pub enum ErrorPolicy {
    /// Abort the whole enumeration at the first failure.
    #[default]
    Raise,
    /// Skip the failing combination and carry on.
    Ignore,
}

/// State of one subgraph node at the time of a failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeState {
    pub name: String,
    pub kind: Option<NodeKind>,
    pub structure: Option<Structure>,
    pub template: Option<ReactionTemplate>,
}

/// Every node of a subgraph with its attributes, in subgraph order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot(pub Vec<NodeState>);

impl Display for Snapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for node in &self.0 {
            let kind = node.kind.map_or_else(|| "untyped".to_string(), |k| k.to_string());
            write!(f, "\n  {} ({kind})", node.name)?;
            if let Some(template) = &node.template {
                write!(f, " template={template}")?;
            }
            match &node.structure {
                Some(structure) => write!(f, " structure={structure}")?,
                None => write!(f, " unresolved")?,
            }
        }
        Ok(())
    }
}

/// Why a combination's subgraph could not be completed.
#[derive(Debug, thiserror::Error)]
pub enum CompletionError {
    #[error(
        "reaction `{reaction}` has no template but {} predecessors [{}]; a pass-through needs exactly one",
        predecessors.len(),
        predecessors.join(", ")
    )]
    MalformedPassThrough {
        reaction: String,
        predecessors: Vec<String>,
    },
    #[error(
        "reaction `{reaction}` must feed exactly one node, found [{}]{snapshot}",
        successors.join(", ")
    )]
    Successors {
        reaction: String,
        successors: Vec<String>,
        snapshot: Snapshot,
    },
    #[error(
        "reaction `{reaction}` ({template}) yielded {} products from [{}]{snapshot}",
        candidates.len(),
        format_reactants(reactants)
    )]
    Unresolvable {
        reaction: String,
        template: ReactionTemplate,
        reactants: Vec<(String, Structure)>,
        candidates: Vec<Structure>,
        snapshot: Snapshot,
    },
    #[error("no reaction is ready and terminal node `{terminal}` is unresolved{snapshot}")]
    Stalled { terminal: String, snapshot: Snapshot },
    #[error("pass-through reaction `{reaction}` has no predecessors{snapshot}")]
    NoReactants { reaction: String, snapshot: Snapshot },
    #[error("reactor failed on reaction `{reaction}`: {source}{snapshot}")]
    Reactor {
        reaction: String,
        #[source]
        source: ReactorError,
        snapshot: Snapshot,
    },
    #[error("structure of `{node}` is invalid: {source}")]
    Structure {
        node: String,
        #[source]
        source: ReactorError,
    },
}

fn format_reactants(reactants: &[(String, Structure)]) -> String {
    reactants
        .iter()
        .map(|(name, structure)| format!("{name}={structure}"))
        .collect::<Vec<_>>()
        .join(", ")
}

impl CompletionError {
    /// Errors that stop the run whatever the [`ErrorPolicy`].
    pub fn is_configuration_error(&self) -> bool {
        matches!(self, CompletionError::MalformedPassThrough { .. })
    }

    /// Whether this error aborts the run under `policy`.
    pub fn is_fatal(&self, policy: ErrorPolicy) -> bool {
        policy == ErrorPolicy::Raise || self.is_configuration_error()
    }
}

/// A reaction whose inputs are all resolved and whose product is not.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Ready {
    reaction: NodeIndex<Index>,
    reactants: Vec<NodeIndex<Index>>,
    product: NodeIndex<Index>,
}

/// Resolution state of one combination's subgraph.
pub struct Completion<'a> {
    catalog: &'a ReactionGraph,
    subgraph: &'a Subgraph,
    structures: Vec<Option<Structure>>,
    templates: Vec<Option<ReactionTemplate>>,
}

impl<'a> Completion<'a> {
    /// Overlay structures and templates onto `subgraph`, in the order
    /// compounds, products, building blocks, reactions.
    ///
    /// `building_blocks` maps a position to the raw structure of its chosen
    /// entry; positions whose entry has no structure are left out, so a node
    /// that is also a catalog compound keeps the compound's structure.
    pub fn new(
        catalog_graph: &'a ReactionGraph,
        subgraph: &'a Subgraph,
        catalog: &Catalog,
        building_blocks: &BTreeMap<&str, &str>,
        reactor: &dyn Reactor,
    ) -> Result<Self, CompletionError> {
        let parse = |node: &str, raw: &str| {
            reactor
                .parse_structure(raw)
                .map_err(|source| CompletionError::Structure {
                    node: node.to_string(),
                    source,
                })
        };

        let mut structures = Vec::with_capacity(subgraph.node_count());
        let mut templates = Vec::with_capacity(subgraph.node_count());
        for local in subgraph.nodes() {
            let node = subgraph.node(catalog_graph, local);
            let name = node.name();

            let mut structure = None;
            if let Some(compound) = catalog.compounds.get(name) {
                structure = compound
                    .structure
                    .as_deref()
                    .map(|raw| parse(name, raw))
                    .transpose()?;
            }
            if let Some(product) = catalog.products.get(name) {
                structure = product
                    .structure
                    .as_deref()
                    .map(|raw| parse(name, raw))
                    .transpose()?;
            }
            if let Some(raw) = building_blocks.get(name) {
                structure = Some(parse(name, *raw)?);
            }
            structures.push(structure);

            templates.push(node.attrs().template.as_deref().map(ReactionTemplate::new));
        }

        Ok(Self {
            catalog: catalog_graph,
            subgraph,
            structures,
            templates,
        })
    }

    fn name(&self, local: NodeIndex<Index>) -> &'a str {
        self.subgraph.node(self.catalog, local).name()
    }

    /// The resolved structure of local node `local`, if any.
    pub fn structure(&self, local: NodeIndex<Index>) -> Option<&Structure> {
        self.structures[local.index()].as_ref()
    }

    /// Every node with its current structure and template.
    pub fn snapshot(&self) -> Snapshot {
        Snapshot(
            self.subgraph
                .nodes()
                .map(|local| NodeState {
                    name: self.name(local).to_string(),
                    kind: self.subgraph.node(self.catalog, local).kind(),
                    structure: self.structures[local.index()].clone(),
                    template: self.templates[local.index()].clone(),
                })
                .collect(),
        )
    }

    fn sorted_by_name(
        &self,
        nodes: impl Iterator<Item = NodeIndex<Index>>,
    ) -> Vec<NodeIndex<Index>> {
        let mut nodes: Vec<_> = nodes.collect();
        nodes.sort_by_key(|&n| self.name(n));
        nodes
    }

    /// The first ready reaction among `pending`, in subgraph order.
    fn next_ready(
        &self,
        pending: &BTreeSet<NodeIndex<Index>>,
    ) -> Result<Option<Ready>, CompletionError> {
        for &reaction in pending {
            let reactants = self.sorted_by_name(self.subgraph.predecessors(reaction));
            let successors = self.sorted_by_name(self.subgraph.successors(reaction));
            let [product] = successors[..] else {
                return Err(CompletionError::Successors {
                    reaction: self.name(reaction).to_string(),
                    successors: successors.iter().map(|&s| self.name(s).to_string()).collect(),
                    snapshot: self.snapshot(),
                });
            };

            if self.structure(product).is_none()
                && reactants.iter().all(|&r| self.structure(r).is_some())
            {
                return Ok(Some(Ready {
                    reaction,
                    reactants,
                    product,
                }));
            }
        }
        Ok(None)
    }

    /// Compute the product structure of a ready reaction.
    fn apply(&self, ready: &Ready, reactor: &dyn Reactor) -> Result<Structure, CompletionError> {
        let reaction = self.name(ready.reaction);
        let reactants: Vec<Structure> = ready
            .reactants
            .iter()
            .filter_map(|&r| self.structure(r).cloned())
            .collect();

        let Some(template) = &self.templates[ready.reaction.index()] else {
            let mut reactants = reactants.into_iter();
            return match (reactants.next(), reactants.next()) {
                (Some(reactant), None) => Ok(reactant),
                (None, _) => Err(CompletionError::NoReactants {
                    reaction: reaction.to_string(),
                    snapshot: self.snapshot(),
                }),
                (Some(_), Some(_)) => Err(CompletionError::MalformedPassThrough {
                    reaction: reaction.to_string(),
                    predecessors: ready
                        .reactants
                        .iter()
                        .map(|&r| self.name(r).to_string())
                        .collect(),
                }),
            };
        };

        let reactor_error = |source| CompletionError::Reactor {
            reaction: reaction.to_string(),
            source,
            snapshot: self.snapshot(),
        };
        let mut candidates = reactor
            .apply(template, &reactants)
            .map_err(reactor_error)?;
        if candidates.is_empty() {
            // Templates can be sensitive to reactant order.
            let reversed: Vec<Structure> = reactants.iter().rev().cloned().collect();
            trace!(reaction, "retrying with reversed reactants");
            candidates = reactor.apply(template, &reversed).map_err(reactor_error)?;
        }

        let mut candidates = candidates.into_iter();
        match (candidates.next(), candidates.next()) {
            (Some(product), None) => Ok(product),
            (first, second) => Err(CompletionError::Unresolvable {
                reaction: reaction.to_string(),
                template: template.clone(),
                reactants: ready
                    .reactants
                    .iter()
                    .map(|&r| self.name(r).to_string())
                    .zip(reactants)
                    .collect(),
                candidates: first.into_iter().chain(second).chain(candidates).collect(),
                snapshot: self.snapshot(),
            }),
        }
    }

    /// Resolve reactions until none is ready and return the structure of
    /// `terminal`.
    pub fn run(
        mut self,
        terminal: NodeIndex<Index>,
        reactor: &dyn Reactor,
    ) -> Result<Structure, CompletionError> {
        let mut pending: BTreeSet<_> = self
            .subgraph
            .nodes()
            .filter(|&n| self.subgraph.node(self.catalog, n).is_reaction())
            .collect();

        while let Some(ready) = self.next_ready(&pending)? {
            let product = self.apply(&ready, reactor)?;
            debug!(
                reaction = self.name(ready.reaction),
                product = self.name(ready.product),
                structure = %product,
                "resolved reaction"
            );
            self.structures[ready.product.index()] = Some(product);
            pending.remove(&ready.reaction);
        }

        match self.structures[terminal.index()].take() {
            Some(structure) => Ok(structure),
            None => Err(CompletionError::Stalled {
                terminal: self.name(terminal).to_string(),
                snapshot: self.snapshot(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        chemistry::MockReactor,
        graph::{AttrMap, Attrs, Edge},
        validate::validate,
    };

    struct Fixture {
        catalog: Catalog,
        graph: ReactionGraph,
        subgraph: Subgraph,
    }

    fn fixture(
        edges: &[(&str, &str)],
        reactions: &[(&str, Option<&str>)],
        compounds: &[(&str, &str)],
    ) -> Fixture {
        let edges: Vec<Edge> = edges.iter().map(|(s, t)| (s.to_string(), t.to_string())).collect();
        let catalog = Catalog {
            reactions: reactions
                .iter()
                .map(|(n, t)| {
                    let attrs = t.map(Attrs::with_template).unwrap_or_default();
                    (n.to_string(), attrs)
                })
                .collect(),
            compounds: compounds
                .iter()
                .map(|(n, s)| (n.to_string(), Attrs::with_structure(*s)))
                .collect(),
            products: AttrMap::new(),
        };
        let graph = catalog.graph(&edges, None);
        let subgraph = Subgraph::induce(&graph, &edges.iter().cloned().collect());
        Fixture {
            catalog,
            graph,
            subgraph,
        }
    }

    impl Fixture {
        fn complete(
            &self,
            bbs: &[(&str, &str)],
            reactor: &MockReactor,
        ) -> Result<Structure, CompletionError> {
            let bbs: BTreeMap<&str, &str> = bbs.iter().copied().collect();
            let terminal = validate(&self.subgraph).terminal.expect("single terminal");
            Completion::new(&self.graph, &self.subgraph, &self.catalog, &bbs, reactor)?
                .run(terminal, reactor)
        }
    }

    #[test]
    fn pass_through_copies_its_reactant() {
        let f = fixture(&[("A", "R1"), ("R1", "P1")], &[("R1", None)], &[("A", "CCO")]);
        assert_eq!(f.complete(&[], &MockReactor::new()).unwrap(), Structure::new("CCO"));
    }

    #[test]
    fn pass_through_with_two_reactants_is_malformed() {
        let f = fixture(
            &[("A", "R1"), ("B", "R1"), ("R1", "P1")],
            &[("R1", None)],
            &[("A", "C"), ("B", "N")],
        );
        let err = f.complete(&[], &MockReactor::new()).unwrap_err();
        assert!(err.is_configuration_error());
        assert!(err.is_fatal(ErrorPolicy::Ignore));
    }

    #[test]
    fn pass_through_without_reactants_follows_the_policy() {
        let f = fixture(
            &[("R0", "A"), ("A", "R1"), ("R1", "P1")],
            &[("R0", None), ("R1", None)],
            &[],
        );
        let err = f.complete(&[], &MockReactor::new()).unwrap_err();
        assert!(matches!(
            err,
            CompletionError::NoReactants { ref reaction, .. } if reaction == "R0"
        ));
        assert!(!err.is_configuration_error());
        assert!(!err.is_fatal(ErrorPolicy::Ignore));
        assert!(err.is_fatal(ErrorPolicy::Raise));
    }

    #[test]
    fn reactants_are_ordered_by_name() {
        let f = fixture(
            &[("B", "R1"), ("A", "R1"), ("R1", "P1")],
            &[("R1", Some("t"))],
            &[("A", "[A]"), ("B", "[B]")],
        );
        let reactor = MockReactor::new().with_rule("t", &["[A]", "[B]"], &["[P1]"]);
        assert_eq!(f.complete(&[], &reactor).unwrap(), Structure::new("[P1]"));
    }

    #[test]
    fn reversed_order_is_retried() {
        let f = fixture(
            &[("A", "R1"), ("B", "R1"), ("R1", "P1")],
            &[("R1", Some("t"))],
            &[("A", "[A]"), ("B", "[B]")],
        );
        let reactor = MockReactor::new().with_rule("t", &["[B]", "[A]"], &["[P1]"]);
        assert_eq!(f.complete(&[], &reactor).unwrap(), Structure::new("[P1]"));
    }

    #[test]
    fn ambiguous_products_are_unresolvable() {
        let f = fixture(&[("A", "R1"), ("R1", "P1")], &[("R1", Some("t"))], &[("A", "[A]")]);
        let reactor = MockReactor::new().with_rule("t", &["[A]"], &["X", "Y"]);
        let err = f.complete(&[], &reactor).unwrap_err();
        match &err {
            CompletionError::Unresolvable {
                reaction,
                candidates,
                snapshot,
                ..
            } => {
                assert_eq!(reaction, "R1");
                assert_eq!(candidates.len(), 2);
                assert_eq!(snapshot.0.len(), 3);
            }
            other => panic!("unexpected error {other}"),
        }
        assert!(!err.is_fatal(ErrorPolicy::Ignore));
        assert!(err.is_fatal(ErrorPolicy::Raise));
    }

    #[test]
    fn unmatched_templates_are_unresolvable() {
        let f = fixture(&[("A", "R1"), ("R1", "P1")], &[("R1", Some("t"))], &[("A", "[A]")]);
        let err = f.complete(&[], &MockReactor::new()).unwrap_err();
        assert!(matches!(
            err,
            CompletionError::Unresolvable { candidates, .. } if candidates.is_empty()
        ));
    }

    #[test]
    fn chains_resolve_in_dependency_order() {
        let f = fixture(
            &[("P1", "R2"), ("R2", "P2"), ("A", "R1"), ("R1", "P1")],
            &[("R1", Some("t1")), ("R2", Some("t2"))],
            &[("A", "[A]")],
        );
        let reactor = MockReactor::new()
            .with_rule("t1", &["[A]"], &["[P1]"])
            .with_rule("t2", &["[P1]"], &["[P2]"]);
        assert_eq!(f.complete(&[], &reactor).unwrap(), Structure::new("[P2]"));
    }

    #[test]
    fn building_block_structure_overrides_compound() {
        let f = fixture(&[("B0", "R1"), ("R1", "P1")], &[("R1", None)], &[("B0", "[cat]")]);
        let reactor = MockReactor::new();
        assert_eq!(f.complete(&[("B0", "[bb]")], &reactor).unwrap(), Structure::new("[bb]"));
        assert_eq!(f.complete(&[], &reactor).unwrap(), Structure::new("[cat]"));
    }

    #[test]
    fn unresolved_inputs_stall() {
        let f = fixture(
            &[("B0", "R1"), ("A", "R1"), ("R1", "P1")],
            &[("R1", Some("t"))],
            &[("A", "[A]")],
        );
        let err = f.complete(&[], &MockReactor::new()).unwrap_err();
        match err {
            CompletionError::Stalled { terminal, snapshot } => {
                assert_eq!(terminal, "P1");
                assert!(snapshot.to_string().contains("B0 (untyped) unresolved"));
            }
            other => panic!("unexpected error {other}"),
        }
    }

    #[test]
    fn reactor_failures_carry_the_reaction() {
        let f = fixture(&[("A", "R1"), ("R1", "P1")], &[("R1", Some("t"))], &[("A", "[A]")]);
        let reactor = MockReactor::new().with_failure("t", &["[A]"], "sanitization failed");
        let err = f.complete(&[], &reactor).unwrap_err();
        assert!(matches!(err, CompletionError::Reactor { ref reaction, .. } if reaction == "R1"));
        assert!(err.to_string().contains("sanitization failed"));
    }

    #[test]
    fn reactions_feeding_several_nodes_are_rejected() {
        let f = fixture(
            &[("A", "R1"), ("R1", "P1"), ("R1", "P2"), ("P1", "R2"), ("P2", "R2"), ("R2", "P3")],
            &[("R1", Some("t")), ("R2", Some("u"))],
            &[("A", "[A]")],
        );
        let err = f.complete(&[], &MockReactor::new()).unwrap_err();
        assert!(matches!(
            err,
            CompletionError::Successors { ref successors, .. } if successors.len() == 2
        ));
    }
}
