//! Binary trace stream decoding and encoding.
//!
//! This module rebuilds module graphs from the fixed-width, little-endian record
//! streams an instrumented process emits, and writes the same formats back out.
//!
//! # Architecture
//!
//! - [`io`] / [`TraceReader`] - bounds-checked little-endian primitives and the
//!   cursor reader the decoders share.
//! - [`layout`] - the authoritative bit-packed record layouts, with mirrored
//!   readers and writers.
//! - [`NodeFactory`] / [`EdgeFactory`] / [`CrossModuleEdgeFactory`] - streaming
//!   record decoders; each `create_*` call consumes exactly one record and never
//!   looks ahead.
//! - [`read_metadata`] / [`write_metadata`] - the execution metadata stream.
//! - [`ModuleList`] - the ordered module-name list.
//! - [`TraceDataSource`] / [`TraceDataSink`] - the storage abstraction; the
//!   engine never opens files directly.
//! - [`ModuleGraphLoader`] - orchestrates the factories into a loaded
//!   [`crate::graph::ModuleGraph`].
//! - [`UnitTraceWriter`] - accumulates and flushes one unit's output streams.
//!
//! # Degraded-Data Tolerance
//!
//! Captures may be truncated by a process crash. Decoders gate every read on
//! record availability, drop records whose lookups fail (with a warning carrying
//! enough context for offline correlation), and keep everything decoded before a
//! truncation point. Only structural violations abort a load.

pub mod io;
pub mod layout;

mod cross_module;
mod edge_factory;
mod loader;
mod metadata;
mod module_list;
mod node_factory;
mod reader;
mod source;
mod writer;

pub use cross_module::CrossModuleEdgeFactory;
pub use edge_factory::EdgeFactory;
pub use layout::{
    CrossModuleEdgeRecord, EdgeRecord, NodeRecord, CROSS_MODULE_EDGE_RECORD_SIZE,
    EDGE_RECORD_SIZE, MAX_EDGE_ORDINAL, MAX_NODE_INDEX, METADATA_WORD_SIZE, NODE_RECORD_SIZE,
};
pub use loader::{LoadedGraph, ModuleGraphLoader};
pub use metadata::{fix_up_admission, read_metadata, write_metadata};
pub use module_list::{ModuleList, ANONYMOUS_UNIT_NAME};
pub use node_factory::NodeFactory;
pub use reader::TraceReader;
pub use source::{
    DirectoryTraceSink, DirectoryTraceSource, MemoryTraceSink, MemoryTraceSource, StreamType,
    TraceDataSink, TraceDataSource, TraceStream,
};
pub use writer::UnitTraceWriter;
