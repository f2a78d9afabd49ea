//! Graph vertex model: node keys, node types and the [`Node`] structure.
//!
//! Nodes are stored in per-graph arenas and referenced by [`NodeId`] indices, so
//! edges stay homogeneous and cheap to copy. Node *identity* is given entirely by
//! the structural [`NodeKey`]: two nodes are equal iff their keys are equal, and a
//! node's hash code is derived solely from its key, regardless of arena position.

use std::hash::{Hash, Hasher};

use crate::{graph::EdgeSet, registry::ModuleId};

/// Index of a node within its owning graph arena.
///
/// Valid only for the graph that issued it. The on-disk edge record format packs
/// node indices into 28 bits, which caps a single graph at 2^28 nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) u32);

impl NodeId {
    /// Creates a node id from a raw index.
    #[must_use]
    pub fn new(index: usize) -> Self {
        NodeId(u32::try_from(index).unwrap_or(u32::MAX))
    }

    /// Returns the raw index value.
    #[must_use]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Distinguishes the two sides of a module boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
pub enum BoundarySide {
    /// Control flow enters the module here.
    Entry,
    /// Control flow leaves the module here.
    Exit,
}

/// The closed set of node types.
///
/// The `u8` discriminants are the on-disk `meta_type` codes of the node record
/// format and must not be reordered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::FromRepr, strum::EnumIter)]
#[repr(u8)]
pub enum MetaNodeType {
    /// An ordinary basic block.
    Normal = 0,
    /// A basic block terminating in a return.
    Return = 1,
    /// An opaque single-node stand-in (system call, process entry, black-box JIT region).
    Singleton = 2,
    /// A module entry boundary node; never has incoming edges.
    ModuleEntry = 3,
    /// A module exit boundary node; never has outgoing edges.
    ModuleExit = 4,
}

impl MetaNodeType {
    /// Returns `true` for the two boundary node types.
    #[must_use]
    pub fn is_boundary(self) -> bool {
        matches!(self, MetaNodeType::ModuleEntry | MetaNodeType::ModuleExit)
    }

    /// Returns `true` for node types representing executable basic blocks.
    #[must_use]
    pub fn is_executable(self) -> bool {
        matches!(
            self,
            MetaNodeType::Normal | MetaNodeType::Return | MetaNodeType::Singleton
        )
    }
}

/// Structural node identity.
///
/// The key is polymorphic over the three node families the engine tracks:
///
/// - **Basic blocks** are identified by their owning module, their tag relative to
///   the module base, and an instance id disambiguating re-emitted blocks at the
///   same tag.
/// - **Boundary nodes** are identified by their cross-module label hash and side;
///   they belong to no module.
/// - **Execution nodes** represent versioned dynamic code observed in raw traces,
///   identified by module, relative tag and version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKey {
    /// A statically mapped basic block.
    BasicBlock {
        /// Owning unit.
        module: ModuleId,
        /// Offset of the block within the owning module.
        relative_tag: u32,
        /// Disambiguates re-emitted blocks at the same tag.
        instance_id: u8,
    },
    /// A module entry or exit boundary node.
    Boundary {
        /// Cross-module label hash.
        hash: u64,
        /// Which side of the boundary.
        side: BoundarySide,
    },
    /// A versioned dynamic-code block from a raw execution trace.
    Execution {
        /// Owning unit instance.
        module: ModuleId,
        /// Offset of the block within the owning module instance.
        relative_tag: u32,
        /// Code version at this tag.
        version: u16,
    },
}

impl NodeKey {
    /// Returns the owning module, if this key family has one.
    #[must_use]
    pub fn module(&self) -> Option<ModuleId> {
        match self {
            NodeKey::BasicBlock { module, .. } | NodeKey::Execution { module, .. } => Some(*module),
            NodeKey::Boundary { .. } => None,
        }
    }

    /// Returns the module-relative tag, if this key family has one.
    #[must_use]
    pub fn relative_tag(&self) -> Option<u32> {
        match self {
            NodeKey::BasicBlock { relative_tag, .. } | NodeKey::Execution { relative_tag, .. } => {
                Some(*relative_tag)
            }
            NodeKey::Boundary { .. } => None,
        }
    }

    /// Returns the instance id for basic-block keys, `None` otherwise.
    #[must_use]
    pub fn instance_id(&self) -> Option<u8> {
        match self {
            NodeKey::BasicBlock { instance_id, .. } => Some(*instance_id),
            _ => None,
        }
    }
}

/// A graph vertex.
///
/// Nodes are immutable after construction except for their [`EdgeSet`], which is
/// populated as trace records stream in. Equality and hashing delegate to the
/// [`NodeKey`]; the 64-bit content `hash` is an attribute, not identity - multiple
/// nodes may legitimately share one (repeated anonymous-code observations).
#[derive(Debug, Clone)]
pub struct Node {
    key: NodeKey,
    hash: u64,
    meta_type: MetaNodeType,
    edges: EdgeSet,
}

impl Node {
    /// Creates a new node with an empty edge set.
    #[must_use]
    pub fn new(key: NodeKey, hash: u64, meta_type: MetaNodeType) -> Self {
        Node {
            key,
            hash,
            meta_type,
            edges: EdgeSet::new(),
        }
    }

    /// Returns the structural identity key.
    #[must_use]
    pub fn key(&self) -> &NodeKey {
        &self.key
    }

    /// Returns the 64-bit content/identity hash.
    #[must_use]
    pub fn hash(&self) -> u64 {
        self.hash
    }

    /// Returns the node type.
    #[must_use]
    pub fn meta_type(&self) -> MetaNodeType {
        self.meta_type
    }

    /// Returns the owning module, if any (boundary nodes have none).
    #[must_use]
    pub fn module(&self) -> Option<ModuleId> {
        self.key.module()
    }

    /// Returns the module-relative tag, if any.
    #[must_use]
    pub fn relative_tag(&self) -> Option<u32> {
        self.key.relative_tag()
    }

    /// Returns the instance id, if this is a basic-block node.
    #[must_use]
    pub fn instance_id(&self) -> Option<u8> {
        self.key.instance_id()
    }

    /// Returns `true` if this is a module entry or exit node.
    #[must_use]
    pub fn is_boundary(&self) -> bool {
        self.meta_type.is_boundary()
    }

    /// Returns `true` if this is a module entry node.
    #[must_use]
    pub fn is_module_entry(&self) -> bool {
        self.meta_type == MetaNodeType::ModuleEntry
    }

    /// Returns `true` if this is a module exit node.
    #[must_use]
    pub fn is_module_exit(&self) -> bool {
        self.meta_type == MetaNodeType::ModuleExit
    }

    /// Compares two nodes ignoring absolute instance and version, requiring the same
    /// relative tag, module-unit equivalence, type and hash.
    ///
    /// This is the recognition test for "the same code" observed in independently
    /// loaded graphs, where instance ids and versions are assigned per load and
    /// carry no cross-run meaning.
    #[must_use]
    pub fn is_module_relative_equivalent(&self, other: &Node) -> bool {
        if self.meta_type != other.meta_type || self.hash != other.hash {
            return false;
        }

        match (&self.key, &other.key) {
            (
                NodeKey::BasicBlock {
                    module: m1,
                    relative_tag: t1,
                    ..
                },
                NodeKey::BasicBlock {
                    module: m2,
                    relative_tag: t2,
                    ..
                },
            )
            | (
                NodeKey::Execution {
                    module: m1,
                    relative_tag: t1,
                    ..
                },
                NodeKey::Execution {
                    module: m2,
                    relative_tag: t2,
                    ..
                },
            ) => m1 == m2 && t1 == t2,
            (
                NodeKey::Boundary { hash: h1, side: s1 },
                NodeKey::Boundary { hash: h2, side: s2 },
            ) => h1 == h2 && s1 == s2,
            _ => false,
        }
    }

    /// Returns `true` if this node has at least one incoming edge.
    #[must_use]
    pub fn has_incoming_edges(&self) -> bool {
        !self.edges.incoming_edges().is_empty()
    }

    /// Returns `true` if this node has at least one outgoing edge.
    #[must_use]
    pub fn has_outgoing_edges(&self) -> bool {
        !self.edges.outgoing_edges().is_empty()
    }

    /// Returns a read-only view of this node's edge set.
    #[must_use]
    pub fn edges(&self) -> &EdgeSet {
        &self.edges
    }

    /// Returns mutable access to this node's edge set.
    ///
    /// Only graph construction and the partitioner mutate edge sets; after a graph
    /// is analyzed it is treated as logically immutable.
    pub(crate) fn edges_mut(&mut self) -> &mut EdgeSet {
        &mut self.edges
    }
}

impl PartialEq for Node {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl Eq for Node {}

impl Hash for Node {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key.hash(state);
    }
}
