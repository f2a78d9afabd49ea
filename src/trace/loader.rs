//! Orchestrates the per-stream factories into a loaded module graph.

use tracing::{debug, warn};

use crate::{
    graph::{GraphLoadEventListener, GraphMetadata, GraphUib, ModuleGraph, NodeId},
    registry::ModuleRegistry,
    trace::{
        cross_module::CrossModuleEdgeFactory,
        edge_factory::EdgeFactory,
        layout::CrossModuleEdgeRecord,
        metadata::{fix_up_admission, read_metadata},
        module_list::ModuleList,
        node_factory::NodeFactory,
        source::{StreamType, TraceDataSource},
    },
    Result,
};

/// The result of loading one unit's trace.
pub struct LoadedGraph {
    /// The reconstructed graph.
    pub graph: ModuleGraph,
    /// Decoded metadata, when the trace carried a metadata stream.
    pub metadata: Option<GraphMetadata>,
    /// Cross-module edge annotations for downstream graph linking.
    pub cross_module_edges: Vec<CrossModuleEdgeRecord>,
}

/// Loads module graphs from trace streams.
///
/// The loader walks the streams in dependency order - module list, nodes, edges,
/// cross-module edges, metadata - resolving each record through the factories in
/// [`crate::trace`]. Node and edge observations repeated across traces are
/// deduplicated against the graph being populated, so loading a second trace into
/// the same graph merges rather than duplicates.
///
/// # Examples
///
/// ```rust,ignore
/// use tracegraph::trace::{DirectoryTraceSource, ModuleGraphLoader};
///
/// let source = DirectoryTraceSource::new(run_directory)?;
/// let loader = ModuleGraphLoader::new(&registry);
/// let loaded = loader.load_graph(&source, "app.exe")?;
/// println!("{} nodes", loaded.graph.node_count());
/// ```
pub struct ModuleGraphLoader<'a> {
    registry: &'a ModuleRegistry,
    listener: Option<&'a dyn GraphLoadEventListener>,
}

impl<'a> ModuleGraphLoader<'a> {
    /// Creates a loader resolving modules through `registry`.
    #[must_use]
    pub fn new(registry: &'a ModuleRegistry) -> Self {
        ModuleGraphLoader {
            registry,
            listener: None,
        }
    }

    /// Installs an observational load listener.
    #[must_use]
    pub fn with_listener(mut self, listener: &'a dyn GraphLoadEventListener) -> Self {
        self.listener = Some(listener);
        self
    }

    /// Loads one unit's trace into a fresh graph.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::MissingStream`] if the node stream is absent,
    /// [`crate::Error::Malformed`] for undecodable records, and
    /// [`crate::Error::InvalidGraph`] for structural violations (conflicting
    /// edges, boundary nodes with wrong-direction edges).
    pub fn load_graph(&self, source: &dyn TraceDataSource, unit: &str) -> Result<LoadedGraph> {
        let mut graph = ModuleGraph::new(unit);
        let (metadata, cross_module_edges) = self.load_into(source, unit, &mut graph)?;

        graph.data().validate()?;
        if let Some(listener) = self.listener {
            listener.on_graph_added(&graph);
        }

        Ok(LoadedGraph {
            graph,
            metadata,
            cross_module_edges,
        })
    }

    /// Loads one unit's trace into an existing graph, merging repeated
    /// observations.
    ///
    /// Any previous analysis is reset, since the graph contents change.
    ///
    /// # Errors
    ///
    /// See [`ModuleGraphLoader::load_graph`].
    pub fn load_into(
        &self,
        source: &dyn TraceDataSource,
        unit: &str,
        graph: &mut ModuleGraph,
    ) -> Result<(Option<GraphMetadata>, Vec<CrossModuleEdgeRecord>)> {
        graph.reset_analysis();

        let modules = if source.has_stream(unit, StreamType::ModuleList) {
            let stream = source.read_stream(unit, StreamType::ModuleList)?;
            ModuleList::parse(stream.data())?.resolve(self.registry)?
        } else {
            Vec::new()
        };

        let node_stream = source.read_stream(unit, StreamType::GraphNode)?;
        let node_table = self.load_nodes(node_stream.data(), &modules, graph)?;

        let edge_table = if source.has_stream(unit, StreamType::GraphEdge) {
            let stream = source.read_stream(unit, StreamType::GraphEdge)?;
            self.load_edges(stream.data(), &node_table, graph)?
        } else {
            Vec::new()
        };

        let cross_module_edges = if source.has_stream(unit, StreamType::CrossModuleEdge) {
            let stream = source.read_stream(unit, StreamType::CrossModuleEdge)?;
            let mut factory = CrossModuleEdgeFactory::new(stream.data());
            let mut records = Vec::new();
            while factory.ready() {
                records.push(factory.create_edge()?);
            }
            records
        } else {
            Vec::new()
        };

        let metadata = if source.has_stream(unit, StreamType::Metadata) {
            let stream = source.read_stream(unit, StreamType::Metadata)?;
            let metadata = read_metadata(stream.data())?;
            self.attach_uibs(&metadata, &edge_table, graph);
            Some(metadata)
        } else {
            None
        };

        debug!(
            unit,
            nodes = graph.node_count(),
            edges = graph.edge_count(),
            cross_module = cross_module_edges.len(),
            "trace loaded"
        );

        Ok((metadata, cross_module_edges))
    }

    /// Streams the node records in, deduplicating against the graph by key.
    ///
    /// Returns the decode-order node table the edge stream resolves against.
    fn load_nodes(
        &self,
        data: &[u8],
        modules: &[crate::registry::ModuleId],
        graph: &mut ModuleGraph,
    ) -> Result<Vec<Option<NodeId>>> {
        let mut factory = NodeFactory::new(data, modules);
        let mut table = Vec::new();

        while factory.ready() {
            let node = factory.create_node()?;
            if let Some(existing) = graph.data().node_id_by_key(node.key()) {
                // Repeated observation of known code, merge onto the existing node
                table.push(Some(existing));
                continue;
            }

            let id = graph.add_node(node)?;
            if let Some(listener) = self.listener {
                if let Some(node) = graph.node(id) {
                    listener.on_node_created(node);
                }
            }
            table.push(Some(id));
        }

        Ok(table)
    }

    /// Streams the edge records in, keeping the raw-index edge table for
    /// metadata correlation.
    fn load_edges(
        &self,
        data: &[u8],
        node_table: &[Option<NodeId>],
        graph: &mut ModuleGraph,
    ) -> Result<Vec<Option<crate::graph::Edge>>> {
        let mut factory = EdgeFactory::new(data, node_table);
        let mut table = Vec::new();

        while factory.ready() {
            let (_, edge) = factory.create_edge()?;
            match edge {
                Some(edge) => {
                    let inserted = graph.add_edge(edge)?;
                    if inserted {
                        if let Some(listener) = self.listener {
                            listener.on_edge_created(&edge);
                        }
                    }
                    // Coalesced duplicates still occupy their raw index slot
                    table.push(Some(edge));
                }
                None => table.push(None),
            }
        }

        Ok(table)
    }

    /// Resolves metadata UIB records onto graph edges by raw edge index.
    fn attach_uibs(
        &self,
        metadata: &GraphMetadata,
        edge_table: &[Option<crate::graph::Edge>],
        graph: &mut ModuleGraph,
    ) {
        let mut attached = 0usize;
        let mut dropped = 0usize;

        for record in metadata.all_uibs() {
            let edge = edge_table.get(record.edge_index as usize).copied().flatten();
            match edge {
                Some(edge) => {
                    let admitted = fix_up_admission(record, graph, &edge);
                    let cross_module = graph.is_cross_module_edge(&edge);
                    graph.attach_uib(GraphUib {
                        edge,
                        admitted,
                        traversal_count: record.traversal_count,
                        instance_count: record.instance_count,
                        cross_module,
                    });
                    attached += 1;
                }
                None => {
                    warn!(
                        edge_index = record.edge_index,
                        "UIB record references a missing edge, dropping"
                    );
                    dropped += 1;
                }
            }
        }

        if attached + dropped > 0 {
            debug!(attached, dropped, "UIB records resolved");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        graph::{
            EdgeType, ExecutionMetadata, MetaNodeType, MetadataSequence, UibRecord,
        },
        trace::{
            layout::{EdgeRecord, NodeRecord},
            metadata::write_metadata,
            source::MemoryTraceSource,
        },
    };

    fn node_record(module_index: u16, tag: u32, meta_type: MetaNodeType, hash: u64) -> NodeRecord {
        NodeRecord {
            module_index,
            relative_tag: tag,
            instance_id: 0,
            meta_type,
            hash,
        }
    }

    fn edge_record(from: u32, to: u32, kind: EdgeType, ordinal: u8) -> EdgeRecord {
        EdgeRecord {
            from_index: from,
            to_index: to,
            kind,
            ordinal,
        }
    }

    fn encode_nodes(records: &[NodeRecord]) -> Vec<u8> {
        let mut out = Vec::new();
        for record in records {
            record.write_to(&mut out);
        }
        out
    }

    fn encode_edges(records: &[EdgeRecord]) -> Vec<u8> {
        let mut out = Vec::new();
        for record in records {
            record.write_to(&mut out).unwrap();
        }
        out
    }

    fn registry() -> ModuleRegistry {
        let mut registry = ModuleRegistry::new();
        registry.register_unit("app.exe");
        registry
    }

    /// Entry 0xAA -> block 0xBB -> exit 0xCC as a memory trace.
    fn linear_source() -> MemoryTraceSource {
        let mut source = MemoryTraceSource::new();
        source.insert("app.exe", StreamType::ModuleList, b"app.exe\n".to_vec());
        source.insert(
            "app.exe",
            StreamType::GraphNode,
            encode_nodes(&[
                node_record(0, 0, MetaNodeType::ModuleEntry, 0xAA),
                node_record(0, 0x100, MetaNodeType::Normal, 0xBB),
                node_record(0, 0, MetaNodeType::ModuleExit, 0xCC),
            ]),
        );
        source.insert(
            "app.exe",
            StreamType::GraphEdge,
            encode_edges(&[
                edge_record(0, 1, EdgeType::Direct, 0),
                edge_record(1, 2, EdgeType::Direct, 0),
            ]),
        );
        source
    }

    #[test]
    fn test_end_to_end_linear_graph() {
        let registry = registry();
        let loader = ModuleGraphLoader::new(&registry);
        let loaded = loader.load_graph(&linear_source(), "app.exe").unwrap();

        let mut graph = loaded.graph;
        assert_eq!(graph.node_count(), 3);
        assert!(graph.entry_point(0xAA).is_some());
        assert!(graph.exit_point(0xCC).is_some());

        graph.analyze_graph(true).unwrap();
        let summary = graph.summarize(&registry, true).unwrap();
        assert_eq!(summary.unreachable_count, 0);

        // Both edges touch a boundary node: inter stays 0 and only the
        // block->exit edge tallies (the entry edge is arrival from outside).
        let direct = summary
            .edge_tallies
            .iter()
            .find(|tally| tally.kind == EdgeType::Direct)
            .unwrap();
        assert_eq!(direct.inter, 0);
        assert_eq!(direct.intra, 1);
    }

    #[test]
    fn test_duplicate_records_merge() {
        let registry = registry();
        let loader = ModuleGraphLoader::new(&registry);

        // The same trace loaded twice must not duplicate nodes or edges
        let mut loaded = loader.load_graph(&linear_source(), "app.exe").unwrap();
        loader
            .load_into(&linear_source(), "app.exe", &mut loaded.graph)
            .unwrap();

        assert_eq!(loaded.graph.node_count(), 3);
        assert_eq!(loaded.graph.edge_count(), 2);
    }

    #[test]
    fn test_edge_to_missing_node_is_dropped() {
        let registry = registry();
        let mut source = linear_source();
        source.insert(
            "app.exe",
            StreamType::GraphEdge,
            encode_edges(&[
                edge_record(0, 1, EdgeType::Direct, 0),
                edge_record(1, 9, EdgeType::Direct, 1),
            ]),
        );

        let loader = ModuleGraphLoader::new(&registry);
        let loaded = loader.load_graph(&source, "app.exe").unwrap();
        assert_eq!(loaded.graph.edge_count(), 1);
    }

    #[test]
    fn test_missing_node_stream_is_fatal() {
        let registry = registry();
        let source = MemoryTraceSource::new();
        let loader = ModuleGraphLoader::new(&registry);
        assert!(matches!(
            loader.load_graph(&source, "app.exe"),
            Err(crate::Error::MissingStream(_))
        ));
    }

    #[test]
    fn test_metadata_uibs_attach_by_edge_index() {
        let registry = registry();
        let mut source = linear_source();

        let metadata = crate::graph::GraphMetadata {
            is_main: true,
            sequences: vec![MetadataSequence {
                is_root: true,
                executions: vec![ExecutionMetadata {
                    id: uguid::guid!("00000000-0000-0000-0000-000000000001"),
                    uibs: vec![
                        UibRecord {
                            edge_index: 1,
                            instance_count: 1,
                            traversal_count: 12,
                            admitted: true,
                        },
                        // References an edge index the trace never produced
                        UibRecord {
                            edge_index: 40,
                            instance_count: 1,
                            traversal_count: 1,
                            admitted: false,
                        },
                    ],
                    intervals: vec![],
                    suspicious_syscalls: vec![],
                    suspicious_gencode_entries: vec![],
                }],
            }],
        };
        source.insert(
            "app.exe",
            StreamType::Metadata,
            write_metadata(&metadata).unwrap(),
        );

        let loader = ModuleGraphLoader::new(&registry);
        let loaded = loader.load_graph(&source, "app.exe").unwrap();
        assert_eq!(loaded.graph.uibs().len(), 1);
        assert!(loaded.graph.uibs()[0].admitted);
        assert_eq!(loaded.graph.uibs()[0].traversal_count, 12);
        assert!(loaded.metadata.is_some());
    }

    #[test]
    fn test_listener_observes_loading() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        #[derive(Default)]
        struct Counter {
            nodes: AtomicUsize,
            edges: AtomicUsize,
            graphs: AtomicUsize,
        }
        impl GraphLoadEventListener for Counter {
            fn on_node_created(&self, _node: &crate::graph::Node) {
                self.nodes.fetch_add(1, Ordering::Relaxed);
            }
            fn on_edge_created(&self, _edge: &crate::graph::Edge) {
                self.edges.fetch_add(1, Ordering::Relaxed);
            }
            fn on_graph_added(&self, _graph: &ModuleGraph) {
                self.graphs.fetch_add(1, Ordering::Relaxed);
            }
        }

        let registry = registry();
        let counter = Counter::default();
        let loader = ModuleGraphLoader::new(&registry).with_listener(&counter);
        loader.load_graph(&linear_source(), "app.exe").unwrap();

        assert_eq!(counter.nodes.load(Ordering::Relaxed), 3);
        assert_eq!(counter.edges.load(Ordering::Relaxed), 2);
        assert_eq!(counter.graphs.load(Ordering::Relaxed), 1);
    }
}
