//! Node storage and indexing for one module graph.
//!
//! [`GraphData`] owns the node arena together with two indices over the same node
//! set: a one-to-one key index for structural identity lookups and a one-to-many
//! hash index for content-hash lookups (multiple nodes may legitimately share a
//! content hash, e.g. repeated anonymous-code observations). It also hosts the
//! structural validation walk and the edge-insertion primitive that keeps both
//! endpoints' adjacency consistent.

use std::collections::HashMap;

use rayon::prelude::*;
use tracing::warn;

use crate::{
    graph::{Edge, MetaNodeType, Node, NodeId, NodeKey},
    Result,
};

/// Node count above which validation runs its per-node checks through rayon.
const PARALLEL_VALIDATION_THRESHOLD: usize = 4096;

/// The set of nodes sharing one content hash.
///
/// Starts as a direct single-node reference and is promoted to a list on the first
/// collision; the common case is a singleton and avoids the allocation.
#[derive(Debug, Clone)]
pub enum NodeList {
    /// Exactly one node carries this hash.
    Singleton(NodeId),
    /// Two or more nodes carry this hash.
    Many(Vec<NodeId>),
}

impl NodeList {
    fn push(&mut self, id: NodeId) {
        match self {
            NodeList::Singleton(existing) => {
                *self = NodeList::Many(vec![*existing, id]);
            }
            NodeList::Many(ids) => ids.push(id),
        }
    }

    /// Returns the number of nodes sharing the hash.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            NodeList::Singleton(_) => 1,
            NodeList::Many(ids) => ids.len(),
        }
    }

    /// Returns `true` if the list is empty. A stored list never is.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the node if exactly one carries the hash.
    #[must_use]
    pub fn as_singleton(&self) -> Option<NodeId> {
        match self {
            NodeList::Singleton(id) => Some(*id),
            NodeList::Many(_) => None,
        }
    }

    /// Iterates the node ids in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = NodeId> + '_ {
        match self {
            NodeList::Singleton(id) => std::slice::from_ref(id).iter().copied(),
            NodeList::Many(ids) => ids.as_slice().iter().copied(),
        }
    }
}

/// Hash-indexed and key-indexed node storage for a single module graph.
///
/// Every node present in one index is present in the other; boundary nodes are
/// indexed under their cross-module label hash. Nodes are never removed - they are
/// owned by this container until the graph itself is dropped.
#[derive(Debug, Clone, Default)]
pub struct GraphData {
    nodes: Vec<Node>,
    by_key: HashMap<NodeKey, NodeId>,
    by_hash: HashMap<u64, NodeList>,
}

impl GraphData {
    /// Creates empty node storage.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of stored nodes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns `true` if no nodes are stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Adds a node, indexing it by both key and hash.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::InvalidGraph`] if a node with the same key is
    /// already present - callers are expected to perform dedup lookups before
    /// constructing a duplicate.
    pub fn add(&mut self, node: Node) -> Result<NodeId> {
        if self.by_key.contains_key(node.key()) {
            return Err(invalid_graph!("Duplicate node key {:?}", node.key()));
        }

        let id = NodeId::new(self.nodes.len());
        self.by_key.insert(*node.key(), id);
        self.by_hash
            .entry(node.hash())
            .and_modify(|list| list.push(id))
            .or_insert(NodeList::Singleton(id));
        self.nodes.push(node);
        Ok(id)
    }

    /// Returns the node for `id`, if it exists.
    #[must_use]
    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.index())
    }

    /// Returns mutable access to the node for `id`, if it exists.
    pub(crate) fn node_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(id.index())
    }

    /// Looks up a node id by structural key.
    #[must_use]
    pub fn node_id_by_key(&self, key: &NodeKey) -> Option<NodeId> {
        self.by_key.get(key).copied()
    }

    /// Returns the nodes sharing `hash`, if any.
    #[must_use]
    pub fn nodes_by_hash(&self, hash: u64) -> Option<&NodeList> {
        self.by_hash.get(&hash)
    }

    /// Returns the node carrying `hash` when exactly one does.
    ///
    /// Used for the system-call anchor singletons that seed reachability analysis.
    #[must_use]
    pub fn single_node_by_hash(&self, hash: u64) -> Option<NodeId> {
        self.by_hash.get(&hash).and_then(NodeList::as_singleton)
    }

    /// Iterates all node ids in insertion order.
    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        (0..self.nodes.len()).map(NodeId::new)
    }

    /// Iterates all nodes in insertion order.
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter()
    }

    /// Best-effort check for whether an equivalent node is already stored.
    ///
    /// Anonymous-module nodes are skipped entirely - anonymous code hashes are not
    /// reliable identity signals, so no equivalence claim is made for them. For
    /// non-first-instance keys the check falls back to the zero-instance (or
    /// zero-version) key, since instance numbering is assigned per load and a
    /// later instance of known code should still be recognized.
    #[must_use]
    pub fn contains_equivalent(&self, node: &Node) -> bool {
        if node.module().is_some_and(|module| module.is_anonymous()) {
            return false;
        }

        if self.by_key.contains_key(node.key()) {
            return true;
        }

        let zero_instance = match *node.key() {
            NodeKey::BasicBlock {
                module,
                relative_tag,
                instance_id,
            } if instance_id != 0 => Some(NodeKey::BasicBlock {
                module,
                relative_tag,
                instance_id: 0,
            }),
            NodeKey::Execution {
                module,
                relative_tag,
                version,
            } if version != 0 => Some(NodeKey::Execution {
                module,
                relative_tag,
                version: 0,
            }),
            _ => None,
        };

        zero_instance.is_some_and(|key| self.by_key.contains_key(&key))
    }

    /// Inserts an edge, updating both endpoints' adjacency.
    ///
    /// Duplicate observations of the same (from, to, kind, ordinal) edge are
    /// coalesced: the new occurrence is discarded and `Ok(false)` is returned. A
    /// genuine conflict - an existing edge between the same endpoints with a
    /// different kind or ordinal - is fatal.
    ///
    /// High ordinals are logged as anomalies but accepted.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::InvalidGraph`] if either endpoint does not resolve,
    /// if a conflicting edge between the endpoints exists, or if the edge type
    /// conflicts with the established type of its ordinal group.
    pub fn add_edge(&mut self, edge: Edge) -> Result<bool> {
        let from = edge.from();
        let to = edge.to();
        if from.index() >= self.nodes.len() || to.index() >= self.nodes.len() {
            return Err(invalid_graph!(
                "Edge endpoint does not resolve: {:?} -> {:?} ({} nodes)",
                from,
                to,
                self.nodes.len()
            ));
        }

        if let Some(existing) = self.nodes[from.index()].edges().find_outgoing_to(to) {
            if *existing == edge {
                return Ok(false);
            }
            return Err(invalid_graph!(
                "Multiple edges between {:?} and {:?}: existing {}:{} vs new {}:{}",
                from,
                to,
                existing.kind(),
                existing.ordinal(),
                edge.kind(),
                edge.ordinal()
            ));
        }

        if edge.kind().is_high_ordinal(edge.ordinal()) {
            warn!(
                from = from.index(),
                to = to.index(),
                kind = %edge.kind(),
                ordinal = edge.ordinal(),
                "high ordinal edge"
            );
        }

        self.nodes[from.index()].edges_mut().insert_outgoing(edge)?;
        self.nodes[to.index()].edges_mut().add_incoming(edge);
        Ok(true)
    }

    /// Walks every node and enforces the boundary edge-direction invariant:
    /// module entry nodes must have no incoming edges and module exit nodes must
    /// have no outgoing edges.
    ///
    /// Large graphs are checked in parallel.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::InvalidGraph`] naming the first violating node.
    pub fn validate(&self) -> Result<()> {
        let check = |node: &Node| -> Result<()> {
            match node.meta_type() {
                MetaNodeType::ModuleEntry if node.has_incoming_edges() => Err(invalid_graph!(
                    "Entry node {:?} has {} incoming edges",
                    node.key(),
                    node.edges().incoming_edges().len()
                )),
                MetaNodeType::ModuleExit if node.has_outgoing_edges() => Err(invalid_graph!(
                    "Exit node {:?} has {} outgoing edges",
                    node.key(),
                    node.edges().outgoing_edges().len()
                )),
                _ => Ok(()),
            }
        };

        if self.nodes.len() >= PARALLEL_VALIDATION_THRESHOLD {
            self.nodes.par_iter().try_for_each(check)
        } else {
            self.nodes.iter().try_for_each(check)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        graph::{BoundarySide, EdgeType},
        registry::ModuleId,
    };

    fn block(tag: u32, instance: u8, hash: u64) -> Node {
        Node::new(
            NodeKey::BasicBlock {
                module: ModuleId(0),
                relative_tag: tag,
                instance_id: instance,
            },
            hash,
            MetaNodeType::Normal,
        )
    }

    fn boundary(hash: u64, side: BoundarySide) -> Node {
        let meta = match side {
            BoundarySide::Entry => MetaNodeType::ModuleEntry,
            BoundarySide::Exit => MetaNodeType::ModuleExit,
        };
        Node::new(NodeKey::Boundary { hash, side }, hash, meta)
    }

    #[test]
    fn test_add_indexes_by_key_and_hash() {
        let mut data = GraphData::new();
        let id = data.add(block(0x100, 0, 0xAA)).unwrap();

        assert_eq!(
            data.node_id_by_key(&NodeKey::BasicBlock {
                module: ModuleId(0),
                relative_tag: 0x100,
                instance_id: 0,
            }),
            Some(id)
        );
        assert_eq!(data.nodes_by_hash(0xAA).map(NodeList::len), Some(1));
        assert_eq!(data.single_node_by_hash(0xAA), Some(id));
    }

    #[test]
    fn test_duplicate_key_is_fatal() {
        let mut data = GraphData::new();
        data.add(block(0x100, 0, 0xAA)).unwrap();
        assert!(data.add(block(0x100, 0, 0xBB)).is_err());
    }

    #[test]
    fn test_hash_index_promotes_to_list() {
        let mut data = GraphData::new();
        let a = data.add(block(0x100, 0, 0xAA)).unwrap();
        let b = data.add(block(0x200, 0, 0xAA)).unwrap();

        let list = data.nodes_by_hash(0xAA).unwrap();
        assert_eq!(list.len(), 2);
        assert_eq!(list.as_singleton(), None);
        let ids: Vec<NodeId> = list.iter().collect();
        assert_eq!(ids, vec![a, b]);
        // No longer exactly one carrier, so the anchor lookup misses
        assert_eq!(data.single_node_by_hash(0xAA), None);
    }

    #[test]
    fn test_contains_equivalent_falls_back_to_zero_instance() {
        let mut data = GraphData::new();
        data.add(block(0x100, 0, 0xAA)).unwrap();

        assert!(data.contains_equivalent(&block(0x100, 0, 0xAA)));
        assert!(data.contains_equivalent(&block(0x100, 5, 0xAA)));
        assert!(!data.contains_equivalent(&block(0x200, 5, 0xAA)));
    }

    #[test]
    fn test_contains_equivalent_skips_anonymous_nodes() {
        let mut data = GraphData::new();
        let anonymous = Node::new(
            NodeKey::BasicBlock {
                module: ModuleId::ANONYMOUS,
                relative_tag: 0x100,
                instance_id: 0,
            },
            0xAA,
            MetaNodeType::Normal,
        );
        data.add(anonymous.clone()).unwrap();
        assert!(!data.contains_equivalent(&anonymous));
    }

    #[test]
    fn test_add_edge_updates_both_endpoints() {
        let mut data = GraphData::new();
        let a = data.add(block(0x100, 0, 0xAA)).unwrap();
        let b = data.add(block(0x200, 0, 0xBB)).unwrap();

        let inserted = data
            .add_edge(Edge::new(a, b, EdgeType::Direct, 0))
            .unwrap();
        assert!(inserted);
        assert!(data.node(a).unwrap().has_outgoing_edges());
        assert!(data.node(b).unwrap().has_incoming_edges());
    }

    #[test]
    fn test_add_edge_is_idempotent() {
        let mut data = GraphData::new();
        let a = data.add(block(0x100, 0, 0xAA)).unwrap();
        let b = data.add(block(0x200, 0, 0xBB)).unwrap();

        let edge = Edge::new(a, b, EdgeType::Direct, 0);
        assert!(data.add_edge(edge).unwrap());
        assert!(!data.add_edge(edge).unwrap());
        assert_eq!(data.node(a).unwrap().edges().outgoing_edges().len(), 1);
        assert_eq!(data.node(b).unwrap().edges().incoming_edges().len(), 1);
    }

    #[test]
    fn test_conflicting_duplicate_edge_is_fatal() {
        let mut data = GraphData::new();
        let a = data.add(block(0x100, 0, 0xAA)).unwrap();
        let b = data.add(block(0x200, 0, 0xBB)).unwrap();

        data.add_edge(Edge::new(a, b, EdgeType::Direct, 0)).unwrap();
        assert!(data
            .add_edge(Edge::new(a, b, EdgeType::Indirect, 0))
            .is_err());
        assert!(data
            .add_edge(Edge::new(a, b, EdgeType::Direct, 1))
            .is_err());
    }

    #[test]
    fn test_edge_with_unresolved_endpoint_is_fatal() {
        let mut data = GraphData::new();
        let a = data.add(block(0x100, 0, 0xAA)).unwrap();
        assert!(data
            .add_edge(Edge::new(a, NodeId::new(99), EdgeType::Direct, 0))
            .is_err());
    }

    #[test]
    fn test_validate_rejects_entry_with_incoming() {
        let mut data = GraphData::new();
        let entry = data.add(boundary(0x1000, BoundarySide::Entry)).unwrap();
        let block_id = data.add(block(0x100, 0, 0xAA)).unwrap();

        data.add_edge(Edge::new(block_id, entry, EdgeType::Direct, 0))
            .unwrap();
        assert!(data.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_exit_with_outgoing() {
        let mut data = GraphData::new();
        let exit = data.add(boundary(0x2000, BoundarySide::Exit)).unwrap();
        let block_id = data.add(block(0x100, 0, 0xAA)).unwrap();

        data.add_edge(Edge::new(exit, block_id, EdgeType::Direct, 0))
            .unwrap();
        assert!(data.validate().is_err());
    }

    #[test]
    fn test_validate_passes_well_formed_graph() {
        let mut data = GraphData::new();
        let entry = data.add(boundary(0x1000, BoundarySide::Entry)).unwrap();
        let block_id = data.add(block(0x100, 0, 0xAA)).unwrap();
        let exit = data.add(boundary(0x2000, BoundarySide::Exit)).unwrap();

        data.add_edge(Edge::new(entry, block_id, EdgeType::Direct, 0))
            .unwrap();
        data.add_edge(Edge::new(block_id, exit, EdgeType::Direct, 0))
            .unwrap();
        assert!(data.validate().is_ok());
    }
}
