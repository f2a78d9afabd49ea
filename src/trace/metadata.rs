//! Metadata stream decoding and encoding.
//!
//! The metadata stream carries one "main" flag word, then repeated sequence
//! headers, each followed by per-execution headers (entry counts + UUID) and their
//! fixed-width entries. Word-level field layouts live in [`crate::trace::layout`].
//!
//! Streams from crashed captures may end mid-sequence; the reader degrades by
//! keeping everything decoded up to the truncation point.

use tracing::warn;

use crate::{
    graph::{
        EdgeType, ExecutionMetadata, GraphMetadata, MetadataSequence, ModuleGraph, UibRecord,
    },
    trace::{
        io::push_le,
        layout::{
            pack_execution_header, pack_interval, pack_sequence_header, pack_sge, pack_ssc,
            pack_uib, unpack_execution_header, unpack_interval, unpack_sequence_header,
            unpack_sge, unpack_ssc, unpack_uib, EXECUTION_UUID_SIZE, METADATA_WORD_SIZE,
        },
        reader::TraceReader,
    },
    Result,
};

/// Decodes a complete metadata stream.
///
/// # Errors
///
/// Returns [`crate::Error::Empty`] for a zero-length stream. Truncation after the
/// main flag word is tolerated: decoding stops at the last complete record and a
/// warning is logged.
pub fn read_metadata(data: &[u8]) -> Result<GraphMetadata> {
    let mut reader = TraceReader::new(data);
    if reader.is_empty() {
        return Err(crate::Error::Empty);
    }

    let main_word: u64 = reader.read_le()?;
    let mut metadata = GraphMetadata {
        is_main: (main_word & 1) != 0,
        sequences: Vec::new(),
    };

    while reader.ready(METADATA_WORD_SIZE) {
        match read_sequence(&mut reader) {
            Ok(sequence) => metadata.sequences.push(sequence),
            Err(crate::Error::OutOfBounds) => {
                warn!(
                    position = reader.pos(),
                    length = reader.len(),
                    "metadata stream truncated mid-sequence, keeping decoded prefix"
                );
                break;
            }
            Err(error) => return Err(error),
        }
    }

    Ok(metadata)
}

fn read_sequence(reader: &mut TraceReader<'_>) -> Result<MetadataSequence> {
    let header: u64 = reader.read_le()?;
    let (execution_count, is_root) = unpack_sequence_header(header);

    let mut executions = Vec::with_capacity(execution_count as usize);
    for _ in 0..execution_count {
        executions.push(read_execution(reader)?);
    }

    Ok(MetadataSequence {
        is_root,
        executions,
    })
}

fn read_execution(reader: &mut TraceReader<'_>) -> Result<ExecutionMetadata> {
    let header: u64 = reader.read_le()?;
    let (uib_count, interval_count, ssc_count, sge_count) = unpack_execution_header(header);

    let uuid_bytes: [u8; EXECUTION_UUID_SIZE] = reader
        .read_bytes(EXECUTION_UUID_SIZE)?
        .try_into()
        .map_err(|_| crate::Error::OutOfBounds)?;
    let id = uguid::Guid::from_bytes(uuid_bytes);

    let mut uibs = Vec::with_capacity(uib_count as usize);
    for _ in 0..uib_count {
        uibs.push(unpack_uib(reader.read_le()?));
    }
    let mut intervals = Vec::with_capacity(interval_count as usize);
    for _ in 0..interval_count {
        intervals.push(unpack_interval(reader.read_le()?));
    }
    let mut suspicious_syscalls = Vec::with_capacity(ssc_count as usize);
    for _ in 0..ssc_count {
        suspicious_syscalls.push(unpack_ssc(reader.read_le()?));
    }
    let mut suspicious_gencode_entries = Vec::with_capacity(sge_count as usize);
    for _ in 0..sge_count {
        suspicious_gencode_entries.push(unpack_sge(reader.read_le()?));
    }

    Ok(ExecutionMetadata {
        id,
        uibs,
        intervals,
        suspicious_syscalls,
        suspicious_gencode_entries,
    })
}

/// Encodes a metadata stream.
///
/// # Errors
///
/// Returns [`crate::Error::Malformed`] if an entry's field exceeds its on-disk
/// width, or if an execution's entry counts exceed the 16-bit header fields.
pub fn write_metadata(metadata: &GraphMetadata) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    push_le(&mut out, u64::from(metadata.is_main));

    for sequence in &metadata.sequences {
        let execution_count = u32::try_from(sequence.executions.len())
            .map_err(|_| malformed_error!("Sequence execution count exceeds 32 bits"))?;
        push_le(&mut out, pack_sequence_header(execution_count, sequence.is_root));

        for execution in &sequence.executions {
            let counts: [u16; 4] = [
                header_count(execution.uibs.len())?,
                header_count(execution.intervals.len())?,
                header_count(execution.suspicious_syscalls.len())?,
                header_count(execution.suspicious_gencode_entries.len())?,
            ];
            push_le(
                &mut out,
                pack_execution_header(counts[0], counts[1], counts[2], counts[3]),
            );
            out.extend_from_slice(&execution.id.to_bytes());

            for uib in &execution.uibs {
                push_le(&mut out, pack_uib(uib)?);
            }
            for interval in &execution.intervals {
                push_le(&mut out, pack_interval(interval));
            }
            for ssc in &execution.suspicious_syscalls {
                push_le(&mut out, pack_ssc(ssc));
            }
            for sge in &execution.suspicious_gencode_entries {
                push_le(&mut out, pack_sge(sge)?);
            }
        }
    }

    Ok(out)
}

fn header_count(len: usize) -> Result<u16> {
    u16::try_from(len)
        .map_err(|_| malformed_error!("Metadata entry count {} exceeds 16-bit header field", len))
}

/// Applies the UIB admission fix-up to one record.
///
/// A record flagged not-admitted is silently upgraded to admitted when any
/// *other* [`EdgeType::Indirect`] edge into the same target node exists. The
/// admission decision was historically computed from only one side of a
/// bidirectional merge; this compensates so summaries over existing trace
/// corpora stay comparable.
#[must_use]
pub fn fix_up_admission(record: &UibRecord, graph: &ModuleGraph, edge: &crate::graph::Edge) -> bool {
    if record.admitted {
        return true;
    }

    graph
        .node(edge.to())
        .map(|target| {
            target
                .edges()
                .incoming_edges()
                .iter()
                .any(|incoming| incoming.kind() == EdgeType::Indirect && *incoming != *edge)
        })
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{IntervalRecord, SgeRecord, SscRecord};

    fn sample_metadata() -> GraphMetadata {
        GraphMetadata {
            is_main: true,
            sequences: vec![MetadataSequence {
                is_root: true,
                executions: vec![ExecutionMetadata {
                    id: uguid::guid!("d437908e-65e6-487c-9735-7bdff699bea5"),
                    uibs: vec![
                        UibRecord {
                            edge_index: 3,
                            instance_count: 2,
                            traversal_count: 17,
                            admitted: true,
                        },
                        UibRecord {
                            edge_index: 9,
                            instance_count: 1,
                            traversal_count: 4,
                            admitted: false,
                        },
                    ],
                    intervals: vec![IntervalRecord {
                        type_id: 1,
                        span: 4,
                        count: 100,
                        max_consecutive: 12,
                    }],
                    suspicious_syscalls: vec![SscRecord {
                        sysnum: 0x4E,
                        edge_index: 5,
                    }],
                    suspicious_gencode_entries: vec![SgeRecord {
                        edge_index: 7,
                        uib_count: 3,
                        suib_count: 1,
                    }],
                }],
            }],
        }
    }

    #[test]
    fn test_metadata_round_trip() {
        let metadata = sample_metadata();
        let encoded = write_metadata(&metadata).unwrap();
        let decoded = read_metadata(&encoded).unwrap();
        assert_eq!(decoded, metadata);
    }

    #[test]
    fn test_empty_stream_is_rejected() {
        assert!(matches!(read_metadata(&[]), Err(crate::Error::Empty)));
    }

    #[test]
    fn test_truncated_stream_keeps_decoded_prefix() {
        let two_sequences = GraphMetadata {
            is_main: false,
            sequences: vec![
                sample_metadata().sequences[0].clone(),
                sample_metadata().sequences[0].clone(),
            ],
        };
        let encoded = write_metadata(&two_sequences).unwrap();

        // Cut into the middle of the second sequence
        let cut = encoded.len() - 10;
        let decoded = read_metadata(&encoded[..cut]).unwrap();
        assert_eq!(decoded.sequences.len(), 1);
        assert_eq!(decoded.sequences[0], two_sequences.sequences[0]);
    }

    #[test]
    fn test_fix_up_admission() {
        use crate::{
            graph::{Edge, MetaNodeType, ModuleGraph, Node, NodeKey},
            registry::ModuleId,
        };

        let mut graph = ModuleGraph::new("fixup");
        let mut add_block = |tag: u32, hash: u64| {
            graph
                .add_node(Node::new(
                    NodeKey::BasicBlock {
                        module: ModuleId(0),
                        relative_tag: tag,
                        instance_id: 0,
                    },
                    hash,
                    MetaNodeType::Normal,
                ))
                .unwrap()
        };
        let a = add_block(0x100, 1);
        let b = add_block(0x200, 2);
        let target = add_block(0x300, 3);

        let described = Edge::new(a, target, EdgeType::Indirect, 0);
        graph.add_edge(described).unwrap();

        let suspicious = UibRecord {
            edge_index: 0,
            instance_count: 1,
            traversal_count: 1,
            admitted: false,
        };

        // Only the described edge targets the node: stays suspicious
        assert!(!fix_up_admission(&suspicious, &graph, &described));

        // A second indirect edge into the same target upgrades it
        graph
            .add_edge(Edge::new(b, target, EdgeType::Indirect, 0))
            .unwrap();
        assert!(fix_up_admission(&suspicious, &graph, &described));

        // Admitted records pass through untouched
        let admitted = UibRecord {
            admitted: true,
            ..suspicious
        };
        assert!(fix_up_admission(&admitted, &graph, &described));
    }
}
