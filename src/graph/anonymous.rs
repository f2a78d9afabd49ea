//! Subgraphs of dynamically generated code.

use crate::{
    graph::{Edge, MetaNodeType, ModuleGraph, Node, NodeId},
    registry::ModuleId,
    Result,
};

/// One maximal subgraph of anonymous (dynamically generated / JIT) code.
///
/// An anonymous graph is either a **JIT singleton** - an opaque black box of
/// exactly one [`MetaNodeType::Singleton`] node, permitted no further executable
/// growth - or a **white-box** multi-node subgraph of observed basic blocks.
/// Mixing the two is a structural error: adding a JIT-singleton node to a
/// non-empty graph, or an executable node to a JIT-singleton graph, is fatal.
/// Boundary nodes may be added to both forms.
#[derive(Debug, Clone)]
pub struct AnonymousGraph {
    graph: ModuleGraph,
    jit_singleton: bool,
    owner: Option<ModuleId>,
}

impl AnonymousGraph {
    /// Creates an empty white-box anonymous graph.
    #[must_use]
    pub fn new(name: &str) -> Self {
        AnonymousGraph {
            graph: ModuleGraph::new(name),
            jit_singleton: false,
            owner: None,
        }
    }

    /// Returns `true` if this graph is an opaque JIT singleton.
    #[must_use]
    pub fn is_jit_singleton(&self) -> bool {
        self.jit_singleton
    }

    /// Returns the owning unit, once resolved.
    #[must_use]
    pub fn owner(&self) -> Option<ModuleId> {
        self.owner
    }

    /// Records the resolved owning unit.
    pub fn set_owner(&mut self, owner: ModuleId) {
        self.owner = Some(owner);
    }

    /// Returns the underlying module graph.
    #[must_use]
    pub fn graph(&self) -> &ModuleGraph {
        &self.graph
    }

    /// Returns mutable access to the underlying module graph.
    pub(crate) fn graph_mut(&mut self) -> &mut ModuleGraph {
        &mut self.graph
    }

    /// Consumes the wrapper, yielding the underlying module graph.
    #[must_use]
    pub fn into_module_graph(self) -> ModuleGraph {
        self.graph
    }

    /// Returns the number of nodes.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    /// Returns the number of executable (non-boundary) nodes.
    #[must_use]
    pub fn executable_node_count(&self) -> usize {
        self.graph
            .data()
            .nodes()
            .filter(|node| node.meta_type().is_executable())
            .count()
    }

    /// Adds a node, enforcing the JIT-singleton/white-box separation.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::InvalidGraph`] when a singleton node is added to a
    /// graph that already holds executable content, when executable content is
    /// added to a JIT-singleton graph, or on a duplicate key.
    pub fn add_node(&mut self, node: Node) -> Result<NodeId> {
        match node.meta_type() {
            MetaNodeType::Singleton => {
                if self.executable_node_count() > 0 {
                    return Err(invalid_graph!(
                        "Cannot add JIT singleton {:?} to non-empty anonymous graph {}",
                        node.key(),
                        self.graph.name()
                    ));
                }
                let id = self.graph.add_node(node)?;
                self.jit_singleton = true;
                Ok(id)
            }
            MetaNodeType::Normal | MetaNodeType::Return => {
                if self.jit_singleton {
                    return Err(invalid_graph!(
                        "Cannot add executable node {:?} to JIT singleton graph {}",
                        node.key(),
                        self.graph.name()
                    ));
                }
                self.graph.add_node(node)
            }
            MetaNodeType::ModuleEntry | MetaNodeType::ModuleExit => self.graph.add_node(node),
        }
    }

    /// Inserts an edge; see [`ModuleGraph::add_edge`].
    ///
    /// # Errors
    ///
    /// See [`ModuleGraph::add_edge`].
    pub fn add_edge(&mut self, edge: Edge) -> Result<bool> {
        self.graph.add_edge(edge)
    }
}
