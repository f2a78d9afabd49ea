//! Batch conversion of raw per-process execution traces into per-unit trace files.
//!
//! A raw trace records one process: nodes in observation order, edges in strict
//! raw-file order, and metadata whose records carry the raw edge index they were
//! recorded at. The transformer redistributes this stream per software unit:
//!
//! - node tables are deduplicated per unit (blocks by key, singletons by hash);
//! - anonymous-code tags are remapped through the fake-tag allocator, since raw
//!   anonymous addresses are not stable across runs;
//! - edges crossing between units are split at a synthesized boundary-node pair
//!   and annotated with a cross-module edge record;
//! - metadata queues are merge-joined against the edge stream positionally: each
//!   queue is pre-sorted by raw edge index and drained as the matching edge
//!   streams through, with the index rewritten to the owning unit's local edge
//!   table. Both sides must be monotonically non-decreasing in edge index -
//!   the queues are sorted and verified before the join.
//!
//! Fixed synthetic nodes (process entry, system, child process) are
//! pre-registered per process before streaming begins.

use std::collections::{HashMap, VecDeque};

use tracing::{debug, warn};

use crate::{
    graph::{
        ExecutionMetadata, GraphMetadata, MetaNodeType, MetadataSequence, SgeRecord, SscRecord,
        UibRecord,
    },
    registry::{label_hash, ModuleId, ModuleRegistry},
    trace::{
        read_metadata, CrossModuleEdgeRecord, EdgeRecord, ModuleList, NodeRecord, StreamType,
        TraceDataSink, TraceDataSource, TraceReader, UnitTraceWriter, ANONYMOUS_UNIT_NAME,
        EDGE_RECORD_SIZE, NODE_RECORD_SIZE,
    },
    transform::fake_tags::{
        FakeTagAllocator, CHILD_PROCESS_HASH, CHILD_PROCESS_TAG, FAKE_TAG_BASE,
        PROCESS_ENTRY_HASH, PROCESS_ENTRY_TAG, SYSTEM_SINGLETON_HASH, SYSTEM_SINGLETON_TAG,
    },
    Result,
};

/// Counters reported after one raw trace transformation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransformStats {
    /// Units that received output streams.
    pub units: usize,
    /// Deduplicated node records written across all units.
    pub nodes: usize,
    /// Deduplicated edge records written across all units.
    pub edges: usize,
    /// Unit-crossing raw edges split at synthesized boundaries.
    pub cross_unit_edges: usize,
    /// Metadata records attached to an output edge.
    pub metadata_attached: usize,
    /// Metadata records dropped (missing edge, stale index).
    pub metadata_dropped: usize,
}

/// Dedup key for one unit's node table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum UnitNodeKey {
    /// Executable blocks dedup by structural key.
    Block { relative_tag: u32, instance_id: u8 },
    /// Singletons dedup by content hash.
    Singleton { hash: u64 },
    /// Boundary nodes dedup by label hash and side.
    Boundary { hash: u64, entry: bool },
}

/// One unit's accumulating output tables.
struct UnitOutput {
    writer: UnitTraceWriter,
    node_dedup: HashMap<UnitNodeKey, u32>,
    edge_dedup: HashMap<EdgeRecord, u32>,
    edge_by_pair: HashMap<(u32, u32), u32>,
}

impl UnitOutput {
    fn new(unit: &str, modules: ModuleList) -> Self {
        UnitOutput {
            writer: UnitTraceWriter::new(unit, modules),
            node_dedup: HashMap::new(),
            edge_dedup: HashMap::new(),
            edge_by_pair: HashMap::new(),
        }
    }

    /// Appends a node unless an equivalent one exists; returns the local index.
    fn ensure_node(&mut self, record: NodeRecord) -> u32 {
        let key = match record.meta_type {
            MetaNodeType::Singleton => UnitNodeKey::Singleton { hash: record.hash },
            MetaNodeType::ModuleEntry => UnitNodeKey::Boundary {
                hash: record.hash,
                entry: true,
            },
            MetaNodeType::ModuleExit => UnitNodeKey::Boundary {
                hash: record.hash,
                entry: false,
            },
            _ => UnitNodeKey::Block {
                relative_tag: record.relative_tag,
                instance_id: record.instance_id,
            },
        };

        if let Some(index) = self.node_dedup.get(&key) {
            return *index;
        }
        let index = self.writer.push_node(record);
        self.node_dedup.insert(key, index);
        index
    }

    /// Appends an edge unless a structurally equal one exists; returns the local
    /// index it occupies either way.
    ///
    /// Two nodes of one output unit can hold at most one edge between them - the
    /// graph model rejects a second edge with a different kind or ordinal as
    /// "multiple edges" at load time. A raw observation that would produce such a
    /// conflict (distinct crossings collapsing onto one boundary node) coalesces
    /// onto the existing record with a warning.
    fn ensure_edge(&mut self, record: EdgeRecord) -> u32 {
        if let Some(index) = self.edge_dedup.get(&record) {
            return *index;
        }
        if let Some(index) = self.edge_by_pair.get(&(record.from_index, record.to_index)) {
            warn!(
                unit = self.writer.unit(),
                from = record.from_index,
                to = record.to_index,
                kind = %record.kind,
                ordinal = record.ordinal,
                "conflicting duplicate edge coalesced onto existing record"
            );
            return *index;
        }
        let index = self.writer.push_edge(record);
        self.edge_dedup.insert(record, index);
        self.edge_by_pair
            .insert((record.from_index, record.to_index), index);
        index
    }
}

/// Where one raw node landed in the per-unit output.
#[derive(Debug, Clone, Copy)]
struct RawNodePlacement {
    unit: usize,
    local_index: u32,
    relative_tag: u32,
}

/// A metadata record queued for the positional merge-join, tagged with its
/// sequence/execution of origin.
struct QueueEntry<T> {
    seq: usize,
    exec: usize,
    record: T,
}

/// Converts raw per-process execution traces into per-unit trace files.
pub struct RawGraphTransformer<'a> {
    registry: &'a ModuleRegistry,
}

impl<'a> RawGraphTransformer<'a> {
    /// Creates a transformer resolving units through `registry`.
    #[must_use]
    pub fn new(registry: &'a ModuleRegistry) -> Self {
        RawGraphTransformer { registry }
    }

    /// Transforms the raw trace recorded under `process` into per-unit streams
    /// written through `sink`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::MissingStream`] if the raw node stream is absent,
    /// [`crate::Error::Malformed`] for undecodable records (including boundary
    /// nodes, which raw traces never carry), and I/O errors from source or sink.
    pub fn transform(
        &self,
        source: &dyn TraceDataSource,
        process: &str,
        sink: &dyn TraceDataSink,
    ) -> Result<TransformStats> {
        let modules = if source.has_stream(process, StreamType::ModuleList) {
            let stream = source.read_stream(process, StreamType::ModuleList)?;
            ModuleList::parse(stream.data())?.resolve(self.registry)?
        } else {
            Vec::new()
        };

        let raw_metadata = if source.has_stream(process, StreamType::Metadata) {
            Some(read_metadata(
                source.read_stream(process, StreamType::Metadata)?.data(),
            )?)
        } else {
            None
        };

        let mut run = TransformRun {
            registry: self.registry,
            outputs: Vec::new(),
            unit_index: HashMap::new(),
            fake_tags: FakeTagAllocator::new(),
            raw_metadata,
            stats: TransformStats::default(),
        };

        // Fixed synthetic nodes precede everything the process itself produced
        run.register_synthetic_nodes()?;

        let node_stream = source.read_stream(process, StreamType::GraphNode)?;
        let placements = run.stream_nodes(node_stream.data(), &modules)?;

        let mut queues = run.build_metadata_queues();
        if source.has_stream(process, StreamType::GraphEdge) {
            let edge_stream = source.read_stream(process, StreamType::GraphEdge)?;
            run.stream_edges(edge_stream.data(), &placements, &mut queues)?;
        }
        run.drain_stale_queues(&mut queues);
        run.attach_intervals();

        for output in &run.outputs {
            output.writer.flush(sink)?;
        }

        let mut stats = run.stats;
        stats.units = run.outputs.len();
        stats.nodes = run.outputs.iter().map(|o| o.writer.node_count()).sum();
        stats.edges = run.outputs.iter().map(|o| o.writer.edge_count()).sum();

        debug!(
            process,
            units = stats.units,
            nodes = stats.nodes,
            edges = stats.edges,
            cross_unit = stats.cross_unit_edges,
            "raw trace transformed"
        );
        Ok(stats)
    }
}

/// Mutable state of one transformation run; reset per input trace.
struct TransformRun<'a> {
    registry: &'a ModuleRegistry,
    outputs: Vec<UnitOutput>,
    unit_index: HashMap<ModuleId, usize>,
    fake_tags: FakeTagAllocator,
    raw_metadata: Option<GraphMetadata>,
    stats: TransformStats,
}

/// The three positionally-correlated metadata queues, each sorted by raw edge
/// index.
struct MetadataQueues {
    uibs: VecDeque<QueueEntry<UibRecord>>,
    sscs: VecDeque<QueueEntry<SscRecord>>,
    sges: VecDeque<QueueEntry<SgeRecord>>,
}

impl TransformRun<'_> {
    /// Returns the output slot for `module`, creating it (with its module list
    /// and metadata skeleton) on first sight.
    fn unit_output(&mut self, module: ModuleId) -> Result<usize> {
        if let Some(index) = self.unit_index.get(&module) {
            return Ok(*index);
        }

        let name = if module.is_anonymous() {
            ANONYMOUS_UNIT_NAME.to_string()
        } else {
            self.registry
                .unit(module)
                .map(|unit| unit.name.clone())
                .ok_or_else(|| malformed_error!("Unregistered module id {:?}", module))?
        };

        let modules = ModuleList::from_names([name.clone()])?;
        let mut output = UnitOutput::new(&name, modules);
        if let Some(skeleton) = self.metadata_skeleton() {
            output.writer.set_metadata(skeleton);
        }

        let index = self.outputs.len();
        self.outputs.push(output);
        self.unit_index.insert(module, index);
        Ok(index)
    }

    /// Builds an empty per-unit metadata skeleton mirroring the raw sequence and
    /// execution structure, so attached records keep their execution of origin.
    fn metadata_skeleton(&self) -> Option<GraphMetadata> {
        let raw = self.raw_metadata.as_ref()?;
        Some(GraphMetadata {
            is_main: raw.is_main,
            sequences: raw
                .sequences
                .iter()
                .map(|sequence| MetadataSequence {
                    is_root: sequence.is_root,
                    executions: sequence
                        .executions
                        .iter()
                        .map(|execution| ExecutionMetadata {
                            id: execution.id,
                            uibs: Vec::new(),
                            intervals: Vec::new(),
                            suspicious_syscalls: Vec::new(),
                            suspicious_gencode_entries: Vec::new(),
                        })
                        .collect(),
                })
                .collect(),
        })
    }

    /// Pre-registers the process-entry, system and child-process singletons in
    /// the anonymous unit.
    fn register_synthetic_nodes(&mut self) -> Result<()> {
        let anonymous = self.unit_output(ModuleId::ANONYMOUS)?;
        for (tag, hash) in [
            (PROCESS_ENTRY_TAG, PROCESS_ENTRY_HASH),
            (SYSTEM_SINGLETON_TAG, SYSTEM_SINGLETON_HASH),
            (CHILD_PROCESS_TAG, CHILD_PROCESS_HASH),
        ] {
            self.outputs[anonymous].ensure_node(NodeRecord {
                module_index: 0,
                relative_tag: tag,
                instance_id: 0,
                meta_type: MetaNodeType::Singleton,
                hash,
            });
        }
        Ok(())
    }

    /// Streams the raw node records into per-unit tables.
    fn stream_nodes(
        &mut self,
        data: &[u8],
        modules: &[ModuleId],
    ) -> Result<Vec<Option<RawNodePlacement>>> {
        let mut reader = TraceReader::new(data);
        let mut placements = Vec::new();

        while reader.ready(NODE_RECORD_SIZE) {
            let record = NodeRecord::read_from(&mut reader)?;
            if record.meta_type.is_boundary() {
                return Err(malformed_error!(
                    "Raw trace carries a boundary node at raw index {}",
                    placements.len()
                ));
            }

            let Some(module) = modules.get(record.module_index as usize).copied() else {
                warn!(
                    raw_index = placements.len(),
                    module_index = record.module_index,
                    "raw node references module outside the list, dropping"
                );
                placements.push(None);
                continue;
            };

            // Anonymous raw tags are address-derived and unstable across runs;
            // remap them above the reserved singleton range. Tags already inside
            // the reserved range are synthetic by contract and pass through.
            let relative_tag = if module.is_anonymous() && record.relative_tag >= FAKE_TAG_BASE {
                self.fake_tags.allocate(record.relative_tag)
            } else {
                record.relative_tag
            };

            let unit = self.unit_output(module)?;
            let local_index = self.outputs[unit].ensure_node(NodeRecord {
                module_index: 0,
                relative_tag,
                instance_id: record.instance_id,
                meta_type: record.meta_type,
                hash: record.hash,
            });

            placements.push(Some(RawNodePlacement {
                unit,
                local_index,
                relative_tag,
            }));
        }

        Ok(placements)
    }

    /// Flattens the raw metadata into the three edge-correlated queues, sorted
    /// by raw edge index.
    fn build_metadata_queues(&self) -> MetadataQueues {
        let mut uibs: Vec<QueueEntry<UibRecord>> = Vec::new();
        let mut sscs: Vec<QueueEntry<SscRecord>> = Vec::new();
        let mut sges: Vec<QueueEntry<SgeRecord>> = Vec::new();

        if let Some(metadata) = &self.raw_metadata {
            for (seq, sequence) in metadata.sequences.iter().enumerate() {
                for (exec, execution) in sequence.executions.iter().enumerate() {
                    verify_monotonic(execution.uibs.iter().map(|r| r.edge_index), "uib");
                    verify_monotonic(
                        execution.suspicious_syscalls.iter().map(|r| r.edge_index),
                        "ssc",
                    );
                    verify_monotonic(
                        execution
                            .suspicious_gencode_entries
                            .iter()
                            .map(|r| r.edge_index),
                        "sge",
                    );

                    uibs.extend(execution.uibs.iter().map(|r| QueueEntry {
                        seq,
                        exec,
                        record: *r,
                    }));
                    sscs.extend(execution.suspicious_syscalls.iter().map(|r| QueueEntry {
                        seq,
                        exec,
                        record: *r,
                    }));
                    sges.extend(execution.suspicious_gencode_entries.iter().map(|r| {
                        QueueEntry {
                            seq,
                            exec,
                            record: *r,
                        }
                    }));
                }
            }
        }

        uibs.sort_by_key(|entry| entry.record.edge_index);
        sscs.sort_by_key(|entry| entry.record.edge_index);
        sges.sort_by_key(|entry| entry.record.edge_index);

        MetadataQueues {
            uibs: uibs.into(),
            sscs: sscs.into(),
            sges: sges.into(),
        }
    }

    /// Streams the raw edge records, splitting unit crossings and draining the
    /// metadata queues positionally.
    fn stream_edges(
        &mut self,
        data: &[u8],
        placements: &[Option<RawNodePlacement>],
        queues: &mut MetadataQueues,
    ) -> Result<()> {
        let mut reader = TraceReader::new(data);
        let mut raw_index: u32 = 0;

        while reader.ready(EDGE_RECORD_SIZE) {
            let record = EdgeRecord::read_from(&mut reader)?;

            let from = placements
                .get(record.from_index as usize)
                .copied()
                .flatten();
            let to = placements.get(record.to_index as usize).copied().flatten();

            let attach_point = match (from, to) {
                (Some(from), Some(to)) if from.unit == to.unit => {
                    let local = self.outputs[from.unit].ensure_edge(EdgeRecord {
                        from_index: from.local_index,
                        to_index: to.local_index,
                        kind: record.kind,
                        ordinal: record.ordinal,
                    });
                    Some((from.unit, local))
                }
                (Some(from), Some(to)) => Some(self.split_cross_unit_edge(&record, from, to)),
                _ => {
                    warn!(
                        edge_index = raw_index,
                        from_index = record.from_index,
                        to_index = record.to_index,
                        "raw edge references a dropped node, skipping"
                    );
                    None
                }
            };

            self.drain_queues_at(raw_index, attach_point, queues);
            raw_index += 1;
        }

        Ok(())
    }

    /// Splits one unit-crossing edge at a synthesized exit/entry boundary pair
    /// and records the cross-module annotation. Returns the from-side attach
    /// point for metadata correlation.
    ///
    /// The boundary signature hashes over the unit pair and the transfer family,
    /// so gencode crossings and execution crossings land on distinct boundary
    /// nodes - the distinction ownership resolution depends on.
    fn split_cross_unit_edge(
        &mut self,
        record: &EdgeRecord,
        from: RawNodePlacement,
        to: RawNodePlacement,
    ) -> (usize, u32) {
        let from_name = self.outputs[from.unit].writer.unit().to_string();
        let to_name = self.outputs[to.unit].writer.unit().to_string();
        let family = if record.kind.is_gencode() {
            "gencode"
        } else {
            "execute"
        };
        let signature = label_hash(&format!("{from_name}->{to_name}!{family}"));

        let exit_index = self.outputs[from.unit].ensure_node(NodeRecord {
            module_index: 0,
            relative_tag: 0,
            instance_id: 0,
            meta_type: MetaNodeType::ModuleExit,
            hash: signature,
        });
        let local_edge = self.outputs[from.unit].ensure_edge(EdgeRecord {
            from_index: from.local_index,
            to_index: exit_index,
            kind: record.kind,
            ordinal: record.ordinal,
        });
        self.outputs[from.unit].writer.push_cross_module(CrossModuleEdgeRecord {
            from_tag: u64::from(from.relative_tag),
            to_tag: u64::from(to.relative_tag),
            signature_hash: signature,
        });

        let entry_index = self.outputs[to.unit].ensure_node(NodeRecord {
            module_index: 0,
            relative_tag: 0,
            instance_id: 0,
            meta_type: MetaNodeType::ModuleEntry,
            hash: signature,
        });
        self.outputs[to.unit].ensure_edge(EdgeRecord {
            from_index: entry_index,
            to_index: to.local_index,
            kind: record.kind,
            ordinal: 0,
        });

        self.stats.cross_unit_edges += 1;
        (from.unit, local_edge)
    }

    /// Pops every queued metadata record recorded at `raw_index`, attaching it to
    /// the output edge that index resolved to.
    fn drain_queues_at(
        &mut self,
        raw_index: u32,
        attach_point: Option<(usize, u32)>,
        queues: &mut MetadataQueues,
    ) {
        while queues
            .uibs
            .front()
            .is_some_and(|entry| entry.record.edge_index <= raw_index)
        {
            let entry = queues.uibs.pop_front().unwrap();
            if entry.record.edge_index < raw_index {
                self.drop_record(entry.record.edge_index, "uib");
                continue;
            }
            match attach_point {
                Some((unit, local_edge)) => {
                    let record = UibRecord {
                        edge_index: local_edge,
                        ..entry.record
                    };
                    self.execution_mut(unit, entry.seq, entry.exec).uibs.push(record);
                    self.stats.metadata_attached += 1;
                }
                None => self.drop_record(raw_index, "uib"),
            }
        }

        while queues
            .sscs
            .front()
            .is_some_and(|entry| entry.record.edge_index <= raw_index)
        {
            let entry = queues.sscs.pop_front().unwrap();
            if entry.record.edge_index < raw_index {
                self.drop_record(entry.record.edge_index, "ssc");
                continue;
            }
            match attach_point {
                Some((unit, local_edge)) => {
                    let record = SscRecord {
                        edge_index: local_edge,
                        ..entry.record
                    };
                    self.execution_mut(unit, entry.seq, entry.exec)
                        .suspicious_syscalls
                        .push(record);
                    self.stats.metadata_attached += 1;
                }
                None => self.drop_record(raw_index, "ssc"),
            }
        }

        while queues
            .sges
            .front()
            .is_some_and(|entry| entry.record.edge_index <= raw_index)
        {
            let entry = queues.sges.pop_front().unwrap();
            if entry.record.edge_index < raw_index {
                self.drop_record(entry.record.edge_index, "sge");
                continue;
            }
            match attach_point {
                Some((unit, local_edge)) => {
                    let record = SgeRecord {
                        edge_index: local_edge,
                        ..entry.record
                    };
                    self.execution_mut(unit, entry.seq, entry.exec)
                        .suspicious_gencode_entries
                        .push(record);
                    self.stats.metadata_attached += 1;
                }
                None => self.drop_record(raw_index, "sge"),
            }
        }
    }

    /// Drops queue entries whose edge index lies beyond the end of the stream.
    fn drain_stale_queues(&mut self, queues: &mut MetadataQueues) {
        for entry in queues.uibs.drain(..) {
            self.stats.metadata_dropped += 1;
            warn!(
                edge_index = entry.record.edge_index,
                "uib record beyond edge stream, dropping"
            );
        }
        for entry in queues.sscs.drain(..) {
            self.stats.metadata_dropped += 1;
            warn!(
                edge_index = entry.record.edge_index,
                "ssc record beyond edge stream, dropping"
            );
        }
        for entry in queues.sges.drain(..) {
            self.stats.metadata_dropped += 1;
            warn!(
                edge_index = entry.record.edge_index,
                "sge record beyond edge stream, dropping"
            );
        }
    }

    /// Interval statistics are process-wide rather than edge-correlated; they
    /// stay with the anonymous unit, alongside the process-entry singleton.
    fn attach_intervals(&mut self) {
        let Some(metadata) = self.raw_metadata.take() else {
            return;
        };
        let Some(&anonymous) = self.unit_index.get(&ModuleId::ANONYMOUS) else {
            self.raw_metadata = Some(metadata);
            return;
        };

        for (seq, sequence) in metadata.sequences.iter().enumerate() {
            for (exec, execution) in sequence.executions.iter().enumerate() {
                if !execution.intervals.is_empty() {
                    self.execution_mut(anonymous, seq, exec)
                        .intervals
                        .extend(execution.intervals.iter().copied());
                }
            }
        }
        self.raw_metadata = Some(metadata);
    }

    fn execution_mut(&mut self, unit: usize, seq: usize, exec: usize) -> &mut ExecutionMetadata {
        &mut self.outputs[unit].writer.metadata_mut().sequences[seq].executions[exec]
    }

    fn drop_record(&mut self, edge_index: u32, family: &str) {
        self.stats.metadata_dropped += 1;
        warn!(edge_index, family, "metadata record has no output edge, dropping");
    }
}

/// Warns when a metadata queue violates its monotonic edge-index contract.
fn verify_monotonic(indices: impl Iterator<Item = u32>, family: &str) {
    let mut last = 0u32;
    for index in indices {
        if index < last {
            warn!(
                family,
                index,
                previous = last,
                "metadata queue is not monotonically non-decreasing"
            );
        }
        last = index;
    }
}
