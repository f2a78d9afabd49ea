//! # tracegraph Prelude
//!
//! This module provides a convenient prelude for the most commonly used types
//! and traits from the tracegraph library. Import this module to get quick
//! access to the essential types for trace loading and graph analysis.

// ================================================================================================
// Core Types and Error Handling
// ================================================================================================

/// The main error type for all tracegraph operations
pub use crate::Error;

/// The result type used throughout tracegraph
pub use crate::Result;

// ================================================================================================
// Graph Model
// ================================================================================================

/// The module-graph aggregate and its building blocks
pub use crate::graph::{
    AnonymousGraph, BoundarySide, Edge, EdgeSet, EdgeType, GraphData, GraphSummary,
    MetaNodeType, ModuleGraph, Node, NodeId, NodeKey, OrdinalEdgeList,
};

/// The observational load hook
pub use crate::graph::GraphLoadEventListener;

// ================================================================================================
// Registry
// ================================================================================================

/// Software-unit registry and hash labels
pub use crate::registry::{HashLabel, HashLabelKind, ModuleId, ModuleRegistry};

// ================================================================================================
// Trace Loading
// ================================================================================================

/// The trace loader and storage abstraction
pub use crate::trace::{
    DirectoryTraceSink, DirectoryTraceSource, LoadedGraph, ModuleGraphLoader, ModuleList,
    StreamType, TraceDataSink, TraceDataSource,
};

// ================================================================================================
// Anonymous Code and Batch Transformation
// ================================================================================================

/// The anonymous-code partitioning passes
pub use crate::anonymous::{MaximalSubgraphs, OwnershipResolver};

/// The raw-trace batch transformer
pub use crate::transform::RawGraphTransformer;
