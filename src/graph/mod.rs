//! In-memory control-flow graph model: nodes, ordinal-grouped edges, indexed
//! storage and the module-graph aggregate.
//!
//! # Architecture
//!
//! The graph model is layered bottom-up:
//!
//! - [`Node`] / [`Edge`] - the vertex and directed-edge abstractions. Node
//!   identity derives solely from the structural [`NodeKey`]; edges are typed by
//!   [`EdgeType`] and slotted by ordinal.
//! - [`EdgeSet`] / [`OrdinalEdgeList`] - per-node adjacency storage, a single flat
//!   sequence partitioned into an ordinal-grouped outgoing region and an unordered
//!   incoming region, exposed through zero-allocation read-only windows.
//! - [`GraphData`] - hash-indexed and key-indexed collections over one node set,
//!   used for dedup lookups and structural validation.
//! - [`ModuleGraph`] - the aggregate for one software unit or a set of
//!   co-distributed units: boundary registries, reachability and edge-type
//!   analysis, and summarization into [`GraphSummary`].
//! - [`AnonymousGraph`] - a module-graph specialization for subgraphs of
//!   dynamically generated code.
//!
//! # State Machine
//!
//! A [`ModuleGraph`] is mutated only during its load phase. After
//! [`ModuleGraph::analyze_graph`] it is treated as logically immutable:
//! summarization and concurrent read-only traversal are then safe from any number
//! of threads.
//!
//! # Examples
//!
//! ```rust
//! use tracegraph::graph::{
//!     BoundarySide, Edge, EdgeType, MetaNodeType, ModuleGraph, Node, NodeKey,
//! };
//! use tracegraph::registry::ModuleId;
//!
//! let mut graph = ModuleGraph::new("app.exe");
//! let entry = graph.add_node(Node::new(
//!     NodeKey::Boundary { hash: 0xAA, side: BoundarySide::Entry },
//!     0xAA,
//!     MetaNodeType::ModuleEntry,
//! ))?;
//! let block = graph.add_node(Node::new(
//!     NodeKey::BasicBlock { module: ModuleId(0), relative_tag: 0x100, instance_id: 0 },
//!     0xBB,
//!     MetaNodeType::Normal,
//! ))?;
//! graph.add_edge(Edge::new(entry, block, EdgeType::Direct, 0))?;
//!
//! graph.analyze_graph(true)?;
//! # Ok::<(), tracegraph::Error>(())
//! ```

mod anonymous;
mod data;
mod edge;
mod edge_set;
mod listener;
mod metadata;
mod module_graph;
mod node;
mod summary;

pub use anonymous::AnonymousGraph;
pub use data::{GraphData, NodeList};
pub use edge::{Edge, EdgeType};
pub use edge_set::{EdgeSet, OrdinalEdgeList};
pub use listener::GraphLoadEventListener;
pub use metadata::{
    ExecutionMetadata, GraphMetadata, GraphUib, IntervalRecord, MetadataSequence, SgeRecord,
    SscRecord, UibRecord,
};
pub use module_graph::{
    ModuleAccounting, ModuleGraph, DEFAULT_MAX_REPORTED_MISSED_ENTRIES, SYSCALL_ANCHOR_HASHES,
};
pub use node::{BoundarySide, MetaNodeType, Node, NodeId, NodeKey};
pub use summary::{
    EdgeTypeTally, GraphSummary, ModuleSummary, UibClass, UibScope, UibSummary,
    UnreachableNodeSummary,
};
