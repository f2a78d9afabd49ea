//! Maximal-subgraph partitioning of anonymous code.
//!
//! Given one flat graph of anonymous-code nodes plus module-boundary nodes, the
//! partitioner carves out the maximal weakly-connected components of application
//! code, each becoming one [`AnonymousGraph`]. It is a streaming weighted
//! union-find over the edge list:
//!
//! - an edge between two unassigned atoms opens a new subgraph holding both;
//! - an edge between an atom and an assigned node attaches the atom;
//! - an edge between two different subgraphs merges them, always moving the
//!   smaller node set into the larger to bound amortized cost;
//! - an edge touching a boundary node is a *frontier* edge: it never joins
//!   subgraphs. The boundary node is cloned per subgraph - the same external call
//!   site may legitimately appear in several unrelated subgraphs - and the edge
//!   is rewritten to attach to the subgraph-local clone.
//!
//! A boundary node linked directly to another boundary node is a structural
//! error. Within one subgraph a boundary node is merged, never duplicated: all
//! frontier edges sharing a boundary key attach to the single subgraph-local
//! clone, and gencode-typed duplicates collapse through the legacy edge retype.

use std::collections::HashMap;

use tracing::debug;

use crate::{
    graph::{AnonymousGraph, Edge, EdgeType, ModuleGraph, Node, NodeId, NodeKey},
    Result,
};

/// Partitions a flat anonymous-code graph into maximal subgraphs.
pub struct MaximalSubgraphs {
    /// Node sets per subgraph slot; merged-away slots are `None`.
    subgraphs: Vec<Option<Vec<NodeId>>>,
    /// Subgraph slot of every assigned non-boundary node.
    assignments: HashMap<NodeId, usize>,
}

impl MaximalSubgraphs {
    /// Decomposes `source` into its maximal anonymous subgraphs.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::InvalidGraph`] if a boundary node links directly
    /// to another boundary node, or if edge materialization hits a conflicting
    /// duplicate that is not gencode-typed.
    pub fn partition(source: &ModuleGraph) -> Result<Vec<AnonymousGraph>> {
        let mut partitioner = MaximalSubgraphs {
            subgraphs: Vec::new(),
            assignments: HashMap::new(),
        };

        let mut internal_edges: Vec<Edge> = Vec::new();
        let mut frontier_edges: Vec<Edge> = Vec::new();

        for id in source.data().node_ids() {
            let node = match source.node(id) {
                Some(node) => node,
                None => continue,
            };
            for edge in &node.edges().outgoing_edges() {
                let from_boundary = source
                    .node(edge.from())
                    .is_some_and(Node::is_boundary);
                let to_boundary = source.node(edge.to()).is_some_and(Node::is_boundary);

                match (from_boundary, to_boundary) {
                    (true, true) => {
                        return Err(invalid_graph!(
                            "Module entry links directly to module exit: {:?} -> {:?}",
                            edge.from(),
                            edge.to()
                        ));
                    }
                    (false, false) => {
                        partitioner.absorb(edge.from(), edge.to());
                        internal_edges.push(*edge);
                    }
                    (true, false) => {
                        partitioner.ensure_assigned(edge.to());
                        frontier_edges.push(*edge);
                    }
                    (false, true) => {
                        partitioner.ensure_assigned(edge.from());
                        frontier_edges.push(*edge);
                    }
                }
            }
        }

        // Atoms with no edges at all still form their own components
        for id in source.data().node_ids() {
            if source.node(id).is_some_and(|node| !node.is_boundary()) {
                partitioner.ensure_assigned(id);
            }
        }

        partitioner.materialize(source, &internal_edges, &frontier_edges)
    }

    /// Places an unassigned atom into a fresh singleton subgraph.
    fn ensure_assigned(&mut self, id: NodeId) {
        if !self.assignments.contains_key(&id) {
            let slot = self.subgraphs.len();
            self.subgraphs.push(Some(vec![id]));
            self.assignments.insert(id, slot);
        }
    }

    /// Applies one atom-atom edge to the union-find state.
    fn absorb(&mut self, a: NodeId, b: NodeId) {
        match (
            self.assignments.get(&a).copied(),
            self.assignments.get(&b).copied(),
        ) {
            (None, None) => {
                let slot = self.subgraphs.len();
                self.subgraphs.push(Some(vec![a, b]));
                self.assignments.insert(a, slot);
                self.assignments.insert(b, slot);
            }
            (Some(slot), None) => {
                self.attach(slot, b);
            }
            (None, Some(slot)) => {
                self.attach(slot, a);
            }
            (Some(first), Some(second)) if first != second => {
                self.merge(first, second);
            }
            _ => {}
        }
    }

    fn attach(&mut self, slot: usize, id: NodeId) {
        if let Some(Some(nodes)) = self.subgraphs.get_mut(slot) {
            nodes.push(id);
        }
        self.assignments.insert(id, slot);
    }

    /// Merges two subgraphs, moving the smaller node set into the larger and
    /// discarding the emptied slot.
    fn merge(&mut self, first: usize, second: usize) {
        let first_len = self.subgraphs[first].as_ref().map_or(0, Vec::len);
        let second_len = self.subgraphs[second].as_ref().map_or(0, Vec::len);
        let (survivor, absorbed) = if first_len >= second_len {
            (first, second)
        } else {
            (second, first)
        };

        let moved = self.subgraphs[absorbed].take().unwrap_or_default();
        for id in &moved {
            self.assignments.insert(*id, survivor);
        }
        if let Some(Some(nodes)) = self.subgraphs.get_mut(survivor) {
            nodes.extend(moved);
        }
    }

    /// Builds one [`AnonymousGraph`] per surviving slot, cloning boundary nodes
    /// per subgraph and rewriting frontier edges onto the clones.
    fn materialize(
        &self,
        source: &ModuleGraph,
        internal_edges: &[Edge],
        frontier_edges: &[Edge],
    ) -> Result<Vec<AnonymousGraph>> {
        // slot -> result position, assigned in slot order for determinism
        let mut result_index: HashMap<usize, usize> = HashMap::new();
        let mut graphs: Vec<AnonymousGraph> = Vec::new();
        let mut id_maps: Vec<HashMap<NodeId, NodeId>> = Vec::new();
        let mut boundary_clones: Vec<HashMap<NodeKey, NodeId>> = Vec::new();

        for (slot, nodes) in self.subgraphs.iter().enumerate() {
            let Some(nodes) = nodes else { continue };
            let position = graphs.len();
            result_index.insert(slot, position);

            let mut graph = AnonymousGraph::new(&format!("anonymous#{position}"));
            let mut id_map = HashMap::with_capacity(nodes.len());

            let mut ordered = nodes.clone();
            ordered.sort_unstable();
            for old_id in ordered {
                if let Some(node) = source.node(old_id) {
                    let new_id =
                        graph.add_node(Node::new(*node.key(), node.hash(), node.meta_type()))?;
                    id_map.insert(old_id, new_id);
                }
            }

            graphs.push(graph);
            id_maps.push(id_map);
            boundary_clones.push(HashMap::new());
        }

        for edge in internal_edges {
            let Some(&slot) = self.assignments.get(&edge.from()) else {
                continue;
            };
            let Some(&position) = result_index.get(&slot) else {
                continue;
            };
            let from = id_maps[position][&edge.from()];
            let to = id_maps[position][&edge.to()];
            Self::add_subgraph_edge(
                &mut graphs[position],
                Edge::new(from, to, edge.kind(), edge.ordinal()),
            )?;
        }

        for edge in frontier_edges {
            let (boundary_id, real_id) = if self.assignments.contains_key(&edge.from()) {
                (edge.to(), edge.from())
            } else {
                (edge.from(), edge.to())
            };
            let Some(&slot) = self.assignments.get(&real_id) else {
                continue;
            };
            let Some(&position) = result_index.get(&slot) else {
                continue;
            };
            let Some(boundary) = source.node(boundary_id) else {
                continue;
            };

            // One clone per boundary key per subgraph; further frontier edges
            // sharing the key merge onto it
            let clone_id = match boundary_clones[position].get(boundary.key()) {
                Some(existing) => *existing,
                None => {
                    let clone =
                        Node::new(*boundary.key(), boundary.hash(), boundary.meta_type());
                    let id = graphs[position].add_node(clone)?;
                    boundary_clones[position].insert(*boundary.key(), id);
                    id
                }
            };

            let real = id_maps[position][&real_id];
            let rewritten = if boundary_id == edge.from() {
                Edge::new(clone_id, real, edge.kind(), edge.ordinal())
            } else {
                Edge::new(real, clone_id, edge.kind(), edge.ordinal())
            };
            Self::add_subgraph_edge(&mut graphs[position], rewritten)?;
        }

        debug!(
            input_nodes = source.node_count(),
            subgraphs = graphs.len(),
            "anonymous graph partitioned"
        );
        Ok(graphs)
    }

    /// Inserts an edge into a materialized subgraph, collapsing gencode-typed
    /// duplicates through the legacy edge retype instead of failing.
    fn add_subgraph_edge(graph: &mut AnonymousGraph, edge: Edge) -> Result<()> {
        let existing = graph
            .graph()
            .node(edge.from())
            .and_then(|node| node.edges().find_outgoing_to(edge.to()))
            .copied();

        if let Some(existing) = existing {
            if existing.ordinal() == edge.ordinal()
                && existing.kind() != edge.kind()
                && existing.kind().is_gencode()
                && edge.kind().is_gencode()
            {
                // Write supersedes perm when both were observed for one transfer
                let data = graph.graph_mut().data_mut();
                if let Some(node) = data.node_mut(existing.from()) {
                    node.edges_mut().retype_edge(&existing, EdgeType::GencodeWrite);
                }
                if let Some(node) = data.node_mut(existing.to()) {
                    node.edges_mut().retype_edge(&existing, EdgeType::GencodeWrite);
                }
                return Ok(());
            }
        }

        graph.add_edge(edge)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        graph::{BoundarySide, MetaNodeType},
        registry::ModuleId,
    };

    fn anonymous_block(graph: &mut ModuleGraph, tag: u32) -> NodeId {
        graph
            .add_node(Node::new(
                NodeKey::BasicBlock {
                    module: ModuleId::ANONYMOUS,
                    relative_tag: tag,
                    instance_id: 0,
                },
                0xA000 | u64::from(tag),
                MetaNodeType::Normal,
            ))
            .unwrap()
    }

    fn boundary(graph: &mut ModuleGraph, hash: u64, side: BoundarySide) -> NodeId {
        let meta = match side {
            BoundarySide::Entry => MetaNodeType::ModuleEntry,
            BoundarySide::Exit => MetaNodeType::ModuleExit,
        };
        graph
            .add_node(Node::new(NodeKey::Boundary { hash, side }, hash, meta))
            .unwrap()
    }

    #[test]
    fn test_disjoint_components_become_separate_subgraphs() {
        let mut flat = ModuleGraph::new("anonymous");
        // Component one: entry -> a1 -> a2
        let e1 = boundary(&mut flat, 0xE1, BoundarySide::Entry);
        let a1 = anonymous_block(&mut flat, 0x100);
        let a2 = anonymous_block(&mut flat, 0x110);
        flat.add_edge(Edge::new(e1, a1, EdgeType::Indirect, 0)).unwrap();
        flat.add_edge(Edge::new(a1, a2, EdgeType::Direct, 0)).unwrap();

        // Component two: entry -> b1, joined to nothing else
        let e2 = boundary(&mut flat, 0xE2, BoundarySide::Entry);
        let b1 = anonymous_block(&mut flat, 0x200);
        flat.add_edge(Edge::new(e2, b1, EdgeType::Indirect, 0)).unwrap();

        let graphs = MaximalSubgraphs::partition(&flat).unwrap();
        assert_eq!(graphs.len(), 2);

        let sizes: Vec<usize> = graphs.iter().map(AnonymousGraph::executable_node_count).collect();
        assert!(sizes.contains(&2));
        assert!(sizes.contains(&1));

        // Each subgraph carries only its own component's boundary clone
        for graph in &graphs {
            let entries: Vec<u64> = graph.graph().entry_points().map(|(hash, _)| hash).collect();
            assert_eq!(entries.len(), 1);
        }
    }

    #[test]
    fn test_shared_boundary_node_is_cloned_per_subgraph() {
        let mut flat = ModuleGraph::new("anonymous");
        let shared = boundary(&mut flat, 0xE0, BoundarySide::Entry);
        let a = anonymous_block(&mut flat, 0x100);
        let b = anonymous_block(&mut flat, 0x200);
        flat.add_edge(Edge::new(shared, a, EdgeType::Indirect, 0)).unwrap();
        flat.add_edge(Edge::new(shared, b, EdgeType::Indirect, 1)).unwrap();

        let graphs = MaximalSubgraphs::partition(&flat).unwrap();
        // The components stay separate: the shared call site is cloned, not a join
        assert_eq!(graphs.len(), 2);
        for graph in &graphs {
            assert!(graph.graph().entry_point(0xE0).is_some());
            assert_eq!(graph.executable_node_count(), 1);
        }
    }

    #[test]
    fn test_late_atom_edge_merges_subgraphs() {
        let mut flat = ModuleGraph::new("anonymous");
        // Two fragments each seeded through a boundary node
        let e1 = boundary(&mut flat, 0xE1, BoundarySide::Entry);
        let a1 = anonymous_block(&mut flat, 0x100);
        let a2 = anonymous_block(&mut flat, 0x110);
        let b1 = anonymous_block(&mut flat, 0x200);
        flat.add_edge(Edge::new(e1, a1, EdgeType::Indirect, 0)).unwrap();
        flat.add_edge(Edge::new(a1, a2, EdgeType::Direct, 0)).unwrap();
        flat.add_edge(Edge::new(e1, b1, EdgeType::Indirect, 1)).unwrap();
        // The joining atom-atom edge arrives after both fragments exist
        flat.add_edge(Edge::new(a2, b1, EdgeType::Direct, 0)).unwrap();

        let graphs = MaximalSubgraphs::partition(&flat).unwrap();
        assert_eq!(graphs.len(), 1);
        let merged = &graphs[0];
        assert_eq!(merged.executable_node_count(), 3);

        // The shared boundary node was merged, not duplicated
        let entries: Vec<u64> = merged.graph().entry_points().map(|(hash, _)| hash).collect();
        assert_eq!(entries, vec![0xE1]);
        let entry_id = merged.graph().entry_point(0xE1).unwrap();
        assert_eq!(
            merged
                .graph()
                .node(entry_id)
                .unwrap()
                .edges()
                .outgoing_edges()
                .len(),
            2
        );
    }

    #[test]
    fn test_boundary_to_boundary_edge_is_fatal() {
        let mut flat = ModuleGraph::new("anonymous");
        let entry = boundary(&mut flat, 0xE1, BoundarySide::Entry);
        let exit = boundary(&mut flat, 0xE2, BoundarySide::Exit);
        flat.add_edge(Edge::new(entry, exit, EdgeType::Direct, 0)).unwrap();

        assert!(MaximalSubgraphs::partition(&flat).is_err());
    }

    #[test]
    fn test_isolated_atom_forms_own_subgraph() {
        let mut flat = ModuleGraph::new("anonymous");
        anonymous_block(&mut flat, 0x100);

        let graphs = MaximalSubgraphs::partition(&flat).unwrap();
        assert_eq!(graphs.len(), 1);
        assert_eq!(graphs[0].executable_node_count(), 1);
    }

    #[test]
    fn test_gencode_duplicate_collapses_by_retype() {
        let mut graph = AnonymousGraph::new("anonymous#0");
        let entry = graph
            .add_node(Node::new(
                NodeKey::Boundary {
                    hash: 0xE1,
                    side: BoundarySide::Entry,
                },
                0xE1,
                MetaNodeType::ModuleEntry,
            ))
            .unwrap();
        let a = graph
            .add_node(Node::new(
                NodeKey::BasicBlock {
                    module: ModuleId::ANONYMOUS,
                    relative_tag: 0x100,
                    instance_id: 0,
                },
                0xA100,
                MetaNodeType::Normal,
            ))
            .unwrap();

        MaximalSubgraphs::add_subgraph_edge(
            &mut graph,
            Edge::new(entry, a, EdgeType::GencodePerm, 0),
        )
        .unwrap();
        // The same transfer observed as a write collapses onto one edge,
        // retyped to the stronger kind
        MaximalSubgraphs::add_subgraph_edge(
            &mut graph,
            Edge::new(entry, a, EdgeType::GencodeWrite, 0),
        )
        .unwrap();

        let edges = graph.graph().node(entry).unwrap().edges().outgoing_edges();
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].kind(), EdgeType::GencodeWrite);
        let incoming = graph.graph().node(a).unwrap().edges().incoming_edges();
        assert_eq!(incoming.len(), 1);
        assert_eq!(incoming[0].kind(), EdgeType::GencodeWrite);

        // A non-gencode conflict still fails
        assert!(MaximalSubgraphs::add_subgraph_edge(
            &mut graph,
            Edge::new(entry, a, EdgeType::Direct, 0),
        )
        .is_err());
    }
}
