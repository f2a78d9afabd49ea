//! Ownership attribution for maximal anonymous subgraphs.
//!
//! Each subgraph's entry boundary nodes are classified through the registry's
//! hash label tables: *gencode* entries mark the code generator that wrote the
//! region (unreliable for ownership - JIT engines are shared infrastructure),
//! *execution* entries mark genuine control-flow arrivals. The owner must appear
//! on both sides: candidate owners are the modules with a gencode entry,
//! intersected with the modules that also execute into the subgraph.
//!
//! Resolution is strict: exactly one candidate wins; zero or several means
//! ownership is indeterminate and the subgraph is **dropped**, never guessed. A
//! subgraph with no execution exit and no return-type node is likewise dropped
//! as structurally incomplete - there is no way to attribute control flow
//! leaving it.

use std::collections::BTreeSet;

use tracing::{debug, warn};

use crate::{
    graph::{AnonymousGraph, MetaNodeType, NodeId},
    registry::{ModuleId, ModuleRegistry},
};

/// Attributes maximal anonymous subgraphs to their owning units.
pub struct OwnershipResolver<'a> {
    registry: &'a ModuleRegistry,
}

impl<'a> OwnershipResolver<'a> {
    /// Creates a resolver over the configured registry.
    #[must_use]
    pub fn new(registry: &'a ModuleRegistry) -> Self {
        OwnershipResolver { registry }
    }

    /// Resolves ownership for every subgraph, returning the attributed survivors.
    ///
    /// Unresolvable subgraphs are logged (with a BFS dump of their shape) and
    /// discarded from the result.
    #[must_use]
    pub fn resolve_all(&self, graphs: Vec<AnonymousGraph>) -> Vec<AnonymousGraph> {
        let mut resolved = Vec::with_capacity(graphs.len());
        for mut graph in graphs {
            match self.resolve(&graph) {
                Some(owner) => {
                    graph.set_owner(owner);
                    debug!(
                        graph = graph.graph().name(),
                        owner = self.registry.unit_name(owner),
                        "anonymous subgraph attributed"
                    );
                    resolved.push(graph);
                }
                None => self.dump_discarded(&graph),
            }
        }
        resolved
    }

    /// Resolves one subgraph's owner, or `None` when it must be discarded.
    #[must_use]
    pub fn resolve(&self, graph: &AnonymousGraph) -> Option<ModuleId> {
        if !self.has_attributable_exit(graph) {
            warn!(
                graph = graph.graph().name(),
                "anonymous subgraph has no execution exit and no return node, discarding"
            );
            return None;
        }

        // BTreeSet keeps candidate iteration deterministic
        let mut owners: BTreeSet<ModuleId> = BTreeSet::new();
        let mut entry_modules: BTreeSet<ModuleId> = BTreeSet::new();

        for (hash, _) in graph.graph().entry_points() {
            if let Some(label) = self.registry.gencode_label(hash) {
                owners.insert(label.from_module);
                continue;
            }
            if let Some(label) = self.registry.anonymous_entry_label(hash) {
                entry_modules.insert(label.from_module);
                continue;
            }
            if let Some(label) = self.registry.interception_label(hash) {
                entry_modules.insert(label.from_module);
                continue;
            }
            warn!(
                graph = graph.graph().name(),
                hash = format_args!("{hash:#x}"),
                "unlabeled entry point on anonymous subgraph"
            );
        }

        owners.retain(|module| entry_modules.contains(module));

        if owners.is_empty() {
            warn!(
                graph = graph.graph().name(),
                entry_modules = entry_modules.len(),
                "no gencode owner also executes into anonymous subgraph, discarding"
            );
            return None;
        }

        // A module executing into the region without also generating it leaves
        // its control flow unattributed, which makes the whole subgraph ambiguous
        if owners.len() > 1 || entry_modules.iter().any(|module| !owners.contains(module)) {
            warn!(
                graph = graph.graph().name(),
                candidates = owners.len(),
                entry_modules = entry_modules.len(),
                "ambiguous ownership of anonymous subgraph, discarding"
            );
            return None;
        }

        owners.into_iter().next()
    }

    /// A subgraph is attributable only if control flow leaving it can be
    /// observed: through an execution exit point or a return-type node.
    fn has_attributable_exit(&self, graph: &AnonymousGraph) -> bool {
        let has_execution_exit = graph
            .graph()
            .exit_points()
            .any(|(hash, _)| self.registry.anonymous_exit_label(hash).is_some());
        if has_execution_exit {
            return true;
        }

        graph
            .graph()
            .data()
            .nodes()
            .any(|node| node.meta_type() == MetaNodeType::Return)
    }

    /// Logs the full shape of a discarded subgraph for offline correlation.
    fn dump_discarded(&self, graph: &AnonymousGraph) {
        let seeds: Vec<NodeId> = graph.graph().entry_points().map(|(_, id)| id).collect();
        let order = graph.graph().bfs_from(&seeds);
        warn!(
            graph = graph.graph().name(),
            nodes = graph.node_count(),
            reached = order.len(),
            "discarding anonymous subgraph"
        );
        for id in order {
            if let Some(node) = graph.graph().node(id) {
                warn!(
                    node = ?node.key(),
                    hash = format_args!("{:#x}", node.hash()),
                    meta_type = %node.meta_type(),
                    "  discarded subgraph node"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        graph::{BoundarySide, Edge, EdgeType, Node, NodeKey},
        registry::{HashLabel, HashLabelKind},
    };

    struct Fixture {
        registry: ModuleRegistry,
        app: ModuleId,
        helper: ModuleId,
    }

    fn fixture() -> Fixture {
        let mut registry = ModuleRegistry::new();
        let app = registry.register_unit("app.exe");
        let helper = registry.register_unit("helper.dll");

        // app both generates code (gencode label) and executes into it
        registry.register_gencode_label(HashLabel {
            hash: 0x10,
            kind: HashLabelKind::GencodeWrite,
            from_module: app,
            to_module: None,
        });
        registry.register_anonymous_entry_label(HashLabel {
            hash: 0x20,
            kind: HashLabelKind::Callback,
            from_module: app,
            to_module: None,
        });
        registry.register_anonymous_entry_label(HashLabel {
            hash: 0x21,
            kind: HashLabelKind::Callback,
            from_module: helper,
            to_module: None,
        });
        registry.register_anonymous_exit_label(HashLabel {
            hash: 0x30,
            kind: HashLabelKind::Export,
            from_module: app,
            to_module: None,
        });

        Fixture {
            registry,
            app,
            helper,
        }
    }

    /// One anonymous block with the given entry hashes and an execution exit.
    fn subgraph(entry_hashes: &[u64], with_exit: bool, with_return: bool) -> AnonymousGraph {
        let mut graph = AnonymousGraph::new("anonymous#0");
        let block = graph
            .add_node(Node::new(
                NodeKey::BasicBlock {
                    module: ModuleId::ANONYMOUS,
                    relative_tag: 0x100,
                    instance_id: 0,
                },
                0xAB,
                if with_return {
                    MetaNodeType::Return
                } else {
                    MetaNodeType::Normal
                },
            ))
            .unwrap();

        for (ordinal, hash) in entry_hashes.iter().enumerate() {
            let entry = graph
                .add_node(Node::new(
                    NodeKey::Boundary {
                        hash: *hash,
                        side: BoundarySide::Entry,
                    },
                    *hash,
                    MetaNodeType::ModuleEntry,
                ))
                .unwrap();
            graph
                .add_edge(Edge::new(
                    entry,
                    block,
                    EdgeType::Indirect,
                    u8::try_from(ordinal).unwrap(),
                ))
                .unwrap();
        }

        if with_exit {
            let exit = graph
                .add_node(Node::new(
                    NodeKey::Boundary {
                        hash: 0x30,
                        side: BoundarySide::Exit,
                    },
                    0x30,
                    MetaNodeType::ModuleExit,
                ))
                .unwrap();
            graph
                .add_edge(Edge::new(block, exit, EdgeType::Indirect, 0))
                .unwrap();
        }

        graph
    }

    #[test]
    fn test_single_candidate_resolves() {
        let fixture = fixture();
        let resolver = OwnershipResolver::new(&fixture.registry);

        // Gencode entry names app; app also has an execution entry
        let graph = subgraph(&[0x10, 0x20], true, false);
        assert_eq!(resolver.resolve(&graph), Some(fixture.app));
    }

    #[test]
    fn test_gencode_without_execution_entry_is_dropped() {
        let fixture = fixture();
        let resolver = OwnershipResolver::new(&fixture.registry);

        // app generated the code, but only helper executes into it
        let graph = subgraph(&[0x10, 0x21], true, false);
        assert_eq!(resolver.resolve(&graph), None);
        let _ = fixture.helper;
    }

    #[test]
    fn test_foreign_execution_entry_makes_ownership_ambiguous() {
        let fixture = fixture();
        let resolver = OwnershipResolver::new(&fixture.registry);

        // app generated the code and executes into it, but helper executes in too
        let graph = subgraph(&[0x10, 0x20, 0x21], true, false);
        assert_eq!(resolver.resolve(&graph), None);
    }

    #[test]
    fn test_no_gencode_entry_is_dropped() {
        let fixture = fixture();
        let resolver = OwnershipResolver::new(&fixture.registry);

        let graph = subgraph(&[0x20], true, false);
        assert_eq!(resolver.resolve(&graph), None);
    }

    #[test]
    fn test_missing_exit_and_return_is_dropped() {
        let fixture = fixture();
        let resolver = OwnershipResolver::new(&fixture.registry);

        let graph = subgraph(&[0x10, 0x20], false, false);
        assert_eq!(resolver.resolve(&graph), None);
    }

    #[test]
    fn test_return_node_substitutes_for_exit() {
        let fixture = fixture();
        let resolver = OwnershipResolver::new(&fixture.registry);

        let graph = subgraph(&[0x10, 0x20], false, true);
        assert_eq!(resolver.resolve(&graph), Some(fixture.app));
    }

    #[test]
    fn test_resolve_all_keeps_only_attributed() {
        let fixture = fixture();
        let resolver = OwnershipResolver::new(&fixture.registry);

        let graphs = vec![
            subgraph(&[0x10, 0x20], true, false),
            subgraph(&[0x10, 0x21], true, false),
        ];
        let resolved = resolver.resolve_all(graphs);
        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved[0].owner(), Some(fixture.app));
    }
}
