//! Summary message structures produced by graph summarization.
//!
//! These are plain data carriers consumed by downstream report generators; the
//! engine builds them in [`crate::graph::ModuleGraph::summarize`] and makes no
//! assumptions about how they are serialized.

use crate::graph::{EdgeType, NodeKey};

/// Per-edge-type traversal tally, split by whether the edge crosses between two
/// member modules.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EdgeTypeTally {
    /// The edge type being tallied.
    pub kind: EdgeType,
    /// Edges within one member module (or touching a boundary node).
    pub intra: usize,
    /// Edges between two different member modules.
    pub inter: usize,
}

/// Node accounting for one member module, as reported in a summary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleSummary {
    /// Unit name.
    pub name: String,
    /// All nodes attributed to the unit.
    pub node_count: usize,
    /// Executable basic blocks attributed to the unit.
    pub executable_block_count: usize,
}

/// Detail for one unreachable node, including its first incoming edge that
/// survives from outside the unreachable set (the likeliest missing link).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnreachableNodeSummary {
    /// The unreachable node's key.
    pub key: NodeKey,
    /// The unreachable node's content hash.
    pub hash: u64,
    /// First incoming edge from a reachable node: (source key, edge type).
    pub surviving_incoming: Option<(NodeKey, EdgeType)>,
}

/// Admission classification axis of the UIB statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UibClass {
    /// All observed UIBs.
    Total = 0,
    /// UIBs admitted by the admission policy.
    Admitted = 1,
    /// UIBs rejected by the admission policy.
    Suspicious = 2,
}

/// Locality axis of the UIB statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UibScope {
    /// All UIBs regardless of locality.
    Total = 0,
    /// UIBs on edges crossing between member modules.
    CrossModule = 1,
    /// UIBs on edges within one member module.
    IntraModule = 2,
}

/// Untrusted-indirect-branch statistics bucketed by admission class and locality.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UibSummary {
    buckets: [[usize; 3]; 3],
}

impl UibSummary {
    /// Records one UIB observation into every bucket it belongs to.
    pub fn record(&mut self, admitted: bool, cross_module: bool) {
        let class = if admitted {
            UibClass::Admitted
        } else {
            UibClass::Suspicious
        };
        let scope = if cross_module {
            UibScope::CrossModule
        } else {
            UibScope::IntraModule
        };

        for c in [UibClass::Total, class] {
            for s in [UibScope::Total, scope] {
                self.buckets[c as usize][s as usize] += 1;
            }
        }
    }

    /// Returns the count in one (class, scope) bucket.
    #[must_use]
    pub fn count(&self, class: UibClass, scope: UibScope) -> usize {
        self.buckets[class as usize][scope as usize]
    }
}

/// The complete summary message for one analyzed graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphSummary {
    /// Name of the summarized graph.
    pub name: String,
    /// Total node count.
    pub node_count: usize,
    /// Nodes reached from the entry points during analysis.
    pub reachable_count: usize,
    /// Nodes not reached from any entry point.
    pub unreachable_count: usize,
    /// Per-edge-type traversal tallies.
    pub edge_tallies: Vec<EdgeTypeTally>,
    /// Member modules, sorted by executable-block count descending.
    pub modules: Vec<ModuleSummary>,
    /// Unreachable-node detail, present when requested at summarization.
    pub unreachable: Vec<UnreachableNodeSummary>,
    /// Untrusted-indirect-branch statistics.
    pub uib: UibSummary,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uib_summary_bucketing() {
        let mut summary = UibSummary::default();
        summary.record(true, true);
        summary.record(true, false);
        summary.record(false, false);

        assert_eq!(summary.count(UibClass::Total, UibScope::Total), 3);
        assert_eq!(summary.count(UibClass::Admitted, UibScope::Total), 2);
        assert_eq!(summary.count(UibClass::Suspicious, UibScope::Total), 1);
        assert_eq!(summary.count(UibClass::Total, UibScope::CrossModule), 1);
        assert_eq!(summary.count(UibClass::Total, UibScope::IntraModule), 2);
        assert_eq!(summary.count(UibClass::Admitted, UibScope::CrossModule), 1);
        assert_eq!(summary.count(UibClass::Suspicious, UibScope::IntraModule), 1);
        assert_eq!(summary.count(UibClass::Suspicious, UibScope::CrossModule), 0);
    }
}
