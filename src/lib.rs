// Copyright 2025 tracegraph contributors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0

#![doc(html_no_source)]
#![deny(missing_docs)]
#![allow(dead_code)]

//! # tracegraph
//!
//! A framework for reconstructing and analyzing binary-level control-flow graphs
//! recorded from instrumented process executions.
//!
//! An instrumented run emits streams of basic-block nodes (address, hash, type)
//! and control-transfer edges, each tagged with a transfer kind and an ordinal
//! call-site slot. `tracegraph` loads these low-level records into an in-memory
//! graph per software module, merges repeated observations across runs,
//! partitions dynamically generated (JIT) code into ownership-attributed
//! subgraphs, and summarizes the result for downstream reporting.
//!
//! ## Features
//!
//! - **Dense binary formats** - version-pinned, bit-packed record codecs with
//!   mirrored readers and writers
//! - **Ordinal-grouped adjacency** - O(1) windowed access to "all outgoing edges
//!   at call site k" without per-access allocation
//! - **Merge-friendly loading** - repeated node and edge observations across
//!   traces deduplicate against the graph being populated
//! - **Anonymous-code attribution** - union-find partitioning of JIT code into
//!   maximal subgraphs, attributed to their generating module
//! - **Degraded-data tolerance** - truncated captures load as far as they reach
//!   instead of failing the run
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use tracegraph::{
//!     registry::ModuleRegistry,
//!     trace::{DirectoryTraceSource, ModuleGraphLoader},
//! };
//!
//! let mut registry = ModuleRegistry::new();
//! registry.register_unit("app.exe");
//!
//! let source = DirectoryTraceSource::new(run_directory.as_ref())?;
//! let loader = ModuleGraphLoader::new(&registry);
//! let mut loaded = loader.load_graph(&source, "app.exe")?;
//!
//! loaded.graph.analyze_graph(true)?;
//! let summary = loaded.graph.summarize(&registry, true)?;
//! println!(
//!     "{}: {} nodes, {} unreachable",
//!     summary.name, summary.node_count, summary.unreachable_count
//! );
//! # Ok::<(), tracegraph::Error>(())
//! ```
//!
//! ## Architecture
//!
//! Components layer bottom-up: the node/edge model and ordinal-grouped
//! [`graph::EdgeSet`] storage, the indexed [`graph::GraphData`] node container,
//! the [`graph::ModuleGraph`] aggregate with its analysis state machine, the
//! streaming binary decoders in [`trace`], and on top the
//! [`anonymous::MaximalSubgraphs`] partitioner, the
//! [`anonymous::OwnershipResolver`] and the batch
//! [`transform::RawGraphTransformer`].
//!
//! Graphs are built single-threaded, then become logically immutable after
//! analysis; read-only traversal and summarization are safe from any number of
//! threads.

#[macro_use]
pub(crate) mod error;

/// Anonymous-code partitioning and ownership attribution.
///
/// Decomposes a flat graph of dynamically generated code into maximal
/// weakly-connected subgraphs bounded by module-boundary nodes, then attributes
/// each subgraph to the unit that both generated it and executes into it.
pub mod anonymous;

/// The in-memory graph model.
///
/// Nodes with key-derived identity, typed ordinal-slotted edges, per-node
/// ordinal-grouped adjacency storage, indexed node collections, the module-graph
/// aggregate with reachability analysis and summarization, and the
/// anonymous-graph specialization.
pub mod graph;

/// Software-unit registry and cross-module hash label tables.
///
/// The engine's read-only view of the monitored software distribution: built
/// once at startup, then shared by reference with loaders, partitioners and
/// transformers.
pub mod registry;

/// Binary trace stream decoding and encoding.
///
/// Bit-packed record layouts, streaming node/edge/metadata factories, the trace
/// data source/sink abstraction and the graph loader.
pub mod trace;

/// Raw-trace batch transformation.
///
/// Converts raw per-process execution traces into the per-unit trace files the
/// loader consumes: synthetic singleton registration, fake-tag allocation for
/// anonymous code, boundary synthesis at unit crossings and positional metadata
/// correlation.
pub mod transform;

/// Shared utilities, including DOT rendering of module graphs.
pub mod utils;

/// Convenient re-exports of the most commonly used types and traits.
///
/// # Example
///
/// ```rust,no_run
/// use tracegraph::prelude::*;
///
/// let mut registry = ModuleRegistry::new();
/// registry.register_unit("app.exe");
/// let loader = ModuleGraphLoader::new(&registry);
/// ```
pub mod prelude;

pub use error::Error;

/// The result type used throughout tracegraph.
pub type Result<T> = std::result::Result<T, Error>;
