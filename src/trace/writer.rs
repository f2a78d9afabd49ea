//! Trace stream writers.
//!
//! [`UnitTraceWriter`] accumulates one unit's records in stream order and flushes
//! them through a [`TraceDataSink`], mirroring the formats the decoders consume.
//! The raw graph transformer is the main producer.

use crate::{
    graph::GraphMetadata,
    trace::{
        layout::{CrossModuleEdgeRecord, EdgeRecord, NodeRecord},
        metadata::write_metadata,
        module_list::ModuleList,
        source::{StreamType, TraceDataSink},
    },
    Result,
};

/// Accumulates one unit's trace streams and writes them to a sink.
///
/// Records keep their append order, which downstream decoders depend on: node
/// indices in edge records refer to node append positions, and metadata edge
/// indices refer to edge append positions.
pub struct UnitTraceWriter {
    unit: String,
    modules: ModuleList,
    nodes: Vec<NodeRecord>,
    edges: Vec<EdgeRecord>,
    cross_module: Vec<CrossModuleEdgeRecord>,
    metadata: Option<GraphMetadata>,
}

impl UnitTraceWriter {
    /// Creates a writer for `unit` with its module list.
    #[must_use]
    pub fn new(unit: &str, modules: ModuleList) -> Self {
        UnitTraceWriter {
            unit: unit.to_string(),
            modules,
            nodes: Vec::new(),
            edges: Vec::new(),
            cross_module: Vec::new(),
            metadata: None,
        }
    }

    /// Returns the unit name.
    #[must_use]
    pub fn unit(&self) -> &str {
        &self.unit
    }

    /// Appends a node record, returning its stream index.
    pub fn push_node(&mut self, record: NodeRecord) -> u32 {
        let index = u32::try_from(self.nodes.len()).unwrap_or(u32::MAX);
        self.nodes.push(record);
        index
    }

    /// Appends an edge record, returning its stream index.
    pub fn push_edge(&mut self, record: EdgeRecord) -> u32 {
        let index = u32::try_from(self.edges.len()).unwrap_or(u32::MAX);
        self.edges.push(record);
        index
    }

    /// Appends a cross-module edge record.
    pub fn push_cross_module(&mut self, record: CrossModuleEdgeRecord) {
        self.cross_module.push(record);
    }

    /// Installs the unit's metadata stream content.
    pub fn set_metadata(&mut self, metadata: GraphMetadata) {
        self.metadata = Some(metadata);
    }

    /// Returns mutable access to the metadata being accumulated, creating an
    /// empty one if none was installed yet.
    pub fn metadata_mut(&mut self) -> &mut GraphMetadata {
        self.metadata.get_or_insert_with(GraphMetadata::default)
    }

    /// Returns the number of accumulated node records.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Returns the number of accumulated edge records.
    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Writes every accumulated stream through the sink.
    ///
    /// The module list is always written; node, edge and cross-module streams are
    /// written when non-empty; the metadata stream is written when installed.
    ///
    /// # Errors
    ///
    /// Returns encoding errors from the record codecs and I/O errors from the
    /// sink.
    pub fn flush(&self, sink: &dyn TraceDataSink) -> Result<()> {
        sink.write_stream(&self.unit, StreamType::ModuleList, &self.modules.encode())?;

        if !self.nodes.is_empty() {
            let mut out = Vec::with_capacity(self.nodes.len() * crate::trace::NODE_RECORD_SIZE);
            for record in &self.nodes {
                record.write_to(&mut out);
            }
            sink.write_stream(&self.unit, StreamType::GraphNode, &out)?;
        }

        if !self.edges.is_empty() {
            let mut out = Vec::with_capacity(self.edges.len() * crate::trace::EDGE_RECORD_SIZE);
            for record in &self.edges {
                record.write_to(&mut out)?;
            }
            sink.write_stream(&self.unit, StreamType::GraphEdge, &out)?;
        }

        if !self.cross_module.is_empty() {
            let mut out = Vec::new();
            for record in &self.cross_module {
                record.write_to(&mut out);
            }
            sink.write_stream(&self.unit, StreamType::CrossModuleEdge, &out)?;
        }

        if let Some(metadata) = &self.metadata {
            sink.write_stream(&self.unit, StreamType::Metadata, &write_metadata(metadata)?)?;
        }

        Ok(())
    }
}
