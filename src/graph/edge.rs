//! Directed, typed, ordinal-slotted edges.

use crate::graph::NodeId;

/// The closed set of control-transfer kinds.
///
/// The `u8` discriminants are the 4-bit on-disk `edge_type` codes of the edge
/// record format and must not be reordered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::FromRepr, strum::EnumIter)]
#[repr(u8)]
pub enum EdgeType {
    /// An indirect branch or call.
    Indirect = 0,
    /// A direct branch or call.
    Direct = 1,
    /// Fall-through continuation after a call returns.
    CallContinuation = 2,
    /// Continuation after an exception handler completes.
    ExceptionContinuation = 3,
    /// A return that did not match the shadow call stack.
    UnexpectedReturn = 4,
    /// A code generator changed permissions on the target region.
    GencodePerm = 5,
    /// A code generator wrote into the target region.
    GencodeWrite = 6,
    /// Control transfer into a forked child process.
    ProcessFork = 7,
}

impl EdgeType {
    /// Returns `true` when `ordinal` exceeds the largest slot this edge type is
    /// expected to occupy.
    ///
    /// Plain transfers occupy at most ordinal 1, call continuations up to 2, and
    /// process forks up to 5. A high ordinal is a soft anomaly signal for downstream
    /// auditing, not a structural constraint - callers log it and continue.
    #[must_use]
    pub fn is_high_ordinal(self, ordinal: u8) -> bool {
        let max = match self {
            EdgeType::CallContinuation => 2,
            EdgeType::ProcessFork => 5,
            _ => 1,
        };
        ordinal > max
    }

    /// Returns `true` for the gencode (write/perm) transfer kinds.
    #[must_use]
    pub fn is_gencode(self) -> bool {
        matches!(self, EdgeType::GencodePerm | EdgeType::GencodeWrite)
    }
}

/// A directed, typed connection between two nodes of one graph.
///
/// The ordinal identifies the call-site/branch-site slot at the `from` node; all
/// edges sharing an ordinal at one node must share the same [`EdgeType`], which is
/// enforced at insertion into the node's edge set. Equality is structural over
/// (from, to, kind, ordinal).
///
/// Edges are never mutated after creation, with one exception: the partitioner's
/// dedup step may retype an edge in place when merging boundary node edge lists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Edge {
    from: NodeId,
    to: NodeId,
    kind: EdgeType,
    ordinal: u8,
}

impl Edge {
    /// Creates a new edge.
    ///
    /// Endpoint validity (both ids resolving in the owning arena) is enforced by
    /// the graph that inserts the edge.
    #[must_use]
    pub fn new(from: NodeId, to: NodeId, kind: EdgeType, ordinal: u8) -> Self {
        Edge {
            from,
            to,
            kind,
            ordinal,
        }
    }

    /// Returns the source node.
    #[must_use]
    pub fn from(&self) -> NodeId {
        self.from
    }

    /// Returns the target node.
    #[must_use]
    pub fn to(&self) -> NodeId {
        self.to
    }

    /// Returns the transfer kind.
    #[must_use]
    pub fn kind(&self) -> EdgeType {
        self.kind
    }

    /// Returns the call-site/branch-site slot at the source node.
    #[must_use]
    pub fn ordinal(&self) -> u8 {
        self.ordinal
    }

    /// Retypes this edge. Reserved for the partitioner's boundary-merge dedup.
    pub(crate) fn set_kind(&mut self, kind: EdgeType) {
        self.kind = kind;
    }

    /// Returns a copy of this edge with the target rewritten.
    ///
    /// Used when boundary nodes are cloned per subgraph and edges must be
    /// re-attached to the subgraph-local clone.
    #[must_use]
    pub(crate) fn with_to(&self, to: NodeId) -> Edge {
        Edge { to, ..*self }
    }

    /// Returns a copy of this edge with the source rewritten.
    #[must_use]
    pub(crate) fn with_from(&self, from: NodeId) -> Edge {
        Edge { from, ..*self }
    }
}
