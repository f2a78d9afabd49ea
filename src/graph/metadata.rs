//! Execution metadata attached to module graphs.
//!
//! Instrumented runs record per-execution observations alongside the graph itself:
//! untrusted indirect branches (UIBs), indirect-branch interval statistics,
//! suspicious system calls and suspicious gencode entries. The trace metadata
//! decoder rebuilds these records and the loader attaches the edge-correlated ones
//! to the graph they describe.

use uguid::Guid;

use crate::graph::Edge;

/// One untrusted-indirect-branch observation.
///
/// `edge_index` refers to the position of the described edge in the raw edge
/// stream of the same trace; the loader resolves it while edges stream through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UibRecord {
    /// Index of the described edge in the trace's edge stream.
    pub edge_index: u32,
    /// Number of distinct instances observed at this branch.
    pub instance_count: u16,
    /// Total traversal count across the execution.
    pub traversal_count: u32,
    /// Whether the branch was admitted by the admission policy.
    pub admitted: bool,
}

/// Indirect-branch interval statistics at one span scale.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IntervalRecord {
    /// Which interval type this record describes.
    pub type_id: u8,
    /// Span scale (log2) of the interval.
    pub span: u8,
    /// Observations within the interval.
    pub count: u32,
    /// Longest consecutive run observed.
    pub max_consecutive: u16,
}

/// A suspicious system call observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SscRecord {
    /// System call number.
    pub sysnum: u16,
    /// Index of the edge on which the call was observed.
    pub edge_index: u32,
}

/// A suspicious gencode entry observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SgeRecord {
    /// Index of the gencode entry edge.
    pub edge_index: u32,
    /// UIBs observed within the entered region.
    pub uib_count: u32,
    /// Suspicious UIBs observed within the entered region.
    pub suib_count: u32,
}

/// All metadata recorded for one execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionMetadata {
    /// Unique id of the recorded execution.
    pub id: Guid,
    /// Untrusted indirect branches.
    pub uibs: Vec<UibRecord>,
    /// Interval statistics.
    pub intervals: Vec<IntervalRecord>,
    /// Suspicious system calls.
    pub suspicious_syscalls: Vec<SscRecord>,
    /// Suspicious gencode entries.
    pub suspicious_gencode_entries: Vec<SgeRecord>,
}

/// One recorded sequence of executions (a process lineage).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataSequence {
    /// Whether this sequence is the root of the recorded lineage.
    pub is_root: bool,
    /// Executions in recording order.
    pub executions: Vec<ExecutionMetadata>,
}

/// The full metadata stream content for one trace.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GraphMetadata {
    /// Whether this trace belongs to the main process of the run.
    pub is_main: bool,
    /// Recorded sequences.
    pub sequences: Vec<MetadataSequence>,
}

impl GraphMetadata {
    /// Iterates every UIB record across all sequences and executions.
    pub fn all_uibs(&self) -> impl Iterator<Item = &UibRecord> {
        self.sequences
            .iter()
            .flat_map(|sequence| sequence.executions.iter())
            .flat_map(|execution| execution.uibs.iter())
    }
}

/// A UIB observation resolved onto a graph edge.
///
/// Produced by the loader once the record's `edge_index` has been matched against
/// the decoded edge stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GraphUib {
    /// The described edge.
    pub edge: Edge,
    /// Whether the branch was admitted (possibly after the asymmetry fix-up).
    pub admitted: bool,
    /// Total traversal count.
    pub traversal_count: u32,
    /// Number of distinct instances observed.
    pub instance_count: u16,
    /// Whether the edge crosses between two member modules.
    pub cross_module: bool,
}
