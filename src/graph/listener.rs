//! Observational hook for graph loading.

use crate::graph::{Edge, ModuleGraph, Node};

/// Receives a callback for every node creation, edge creation and graph addition
/// during trace loading.
///
/// Implementations are purely observational: no return value influences loading,
/// and the loader continues identically whether or not a listener is installed.
/// Typical uses are external instrumentation, auditing and load statistics.
pub trait GraphLoadEventListener: Send + Sync {
    /// Called after a node has been created and indexed.
    fn on_node_created(&self, node: &Node) {
        let _ = node;
    }

    /// Called after an edge has been inserted into both endpoints' adjacency.
    fn on_edge_created(&self, edge: &Edge) {
        let _ = edge;
    }

    /// Called after a completed graph has been added to the load result set.
    fn on_graph_added(&self, graph: &ModuleGraph) {
        let _ = graph;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingListener {
        nodes: AtomicUsize,
        edges: AtomicUsize,
    }

    impl GraphLoadEventListener for CountingListener {
        fn on_node_created(&self, _node: &Node) {
            self.nodes.fetch_add(1, Ordering::Relaxed);
        }

        fn on_edge_created(&self, _edge: &Edge) {
            self.edges.fetch_add(1, Ordering::Relaxed);
        }
    }

    #[test]
    fn test_default_methods_are_no_ops() {
        struct Silent;
        impl GraphLoadEventListener for Silent {}

        use crate::{
            graph::{EdgeType, MetaNodeType, NodeId, NodeKey},
            registry::ModuleId,
        };

        let listener = Silent;
        let node = Node::new(
            NodeKey::BasicBlock {
                module: ModuleId(0),
                relative_tag: 0,
                instance_id: 0,
            },
            0,
            MetaNodeType::Normal,
        );
        listener.on_node_created(&node);
        listener.on_edge_created(&Edge::new(NodeId::new(0), NodeId::new(1), EdgeType::Direct, 0));
    }

    #[test]
    fn test_counting_listener_observes_events() {
        use crate::{
            graph::{EdgeType, MetaNodeType, NodeId, NodeKey},
            registry::ModuleId,
        };

        let listener = CountingListener::default();
        let node = Node::new(
            NodeKey::BasicBlock {
                module: ModuleId(0),
                relative_tag: 0,
                instance_id: 0,
            },
            0,
            MetaNodeType::Normal,
        );
        listener.on_node_created(&node);
        listener.on_edge_created(&Edge::new(NodeId::new(0), NodeId::new(1), EdgeType::Direct, 0));
        listener.on_edge_created(&Edge::new(NodeId::new(1), NodeId::new(0), EdgeType::Direct, 0));

        assert_eq!(listener.nodes.load(Ordering::Relaxed), 1);
        assert_eq!(listener.edges.load(Ordering::Relaxed), 2);
    }
}
