//! Streaming edge decoder.

use tracing::warn;

use crate::{
    graph::{Edge, NodeId},
    trace::{layout::EdgeRecord, layout::EDGE_RECORD_SIZE, reader::TraceReader},
    Result,
};

/// Decodes edge records from a trace stream into fully linked [`Edge`]s.
///
/// Each [`EdgeFactory::create_edge`] call consumes exactly one 8-byte record.
/// Node indices resolve through the decode-order node table built while the node
/// stream was loaded; a missing endpoint (the node failed to load, e.g. from a
/// truncated capture) drops the edge with a warning rather than failing the load.
///
/// The factory tracks the raw edge index of every record it consumes - dropped
/// ones included - because metadata records correlate to edges positionally.
pub struct EdgeFactory<'a> {
    reader: TraceReader<'a>,
    node_table: &'a [Option<NodeId>],
    next_index: u32,
}

impl<'a> EdgeFactory<'a> {
    /// Creates a factory over an edge stream.
    ///
    /// `node_table` maps the trace's node indices (decode order) to graph node
    /// ids, with `None` for nodes that were dropped during node loading.
    #[must_use]
    pub fn new(data: &'a [u8], node_table: &'a [Option<NodeId>]) -> Self {
        EdgeFactory {
            reader: TraceReader::new(data),
            node_table,
            next_index: 0,
        }
    }

    /// Returns `true` while a complete record remains in the stream.
    #[must_use]
    pub fn ready(&self) -> bool {
        self.reader.ready(EDGE_RECORD_SIZE)
    }

    /// Returns the raw index the next record will be assigned.
    #[must_use]
    pub fn next_index(&self) -> u32 {
        self.next_index
    }

    /// Decodes the next edge.
    ///
    /// Returns the raw edge index paired with the linked edge, or `None` when the
    /// record referenced a node that is not in the table - the record is consumed
    /// and logged either way, keeping the positional index stream intact.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::OutOfBounds`] on truncation mid-record and
    /// [`crate::Error::Malformed`] on an unknown edge type code.
    pub fn create_edge(&mut self) -> Result<(u32, Option<Edge>)> {
        let record = EdgeRecord::read_from(&mut self.reader)?;
        let index = self.next_index;
        self.next_index += 1;

        let from = self
            .node_table
            .get(record.from_index as usize)
            .copied()
            .flatten();
        let to = self
            .node_table
            .get(record.to_index as usize)
            .copied()
            .flatten();

        match (from, to) {
            (Some(from), Some(to)) => Ok((
                index,
                Some(Edge::new(from, to, record.kind, record.ordinal)),
            )),
            _ => {
                warn!(
                    edge_index = index,
                    from_index = record.from_index,
                    to_index = record.to_index,
                    kind = %record.kind,
                    "dropping edge with unresolved endpoint"
                );
                Ok((index, None))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::EdgeType;

    fn encode(records: &[EdgeRecord]) -> Vec<u8> {
        let mut out = Vec::new();
        for record in records {
            record.write_to(&mut out).unwrap();
        }
        out
    }

    #[test]
    fn test_decode_linked_edge() {
        let data = encode(&[EdgeRecord {
            from_index: 0,
            to_index: 1,
            kind: EdgeType::Direct,
            ordinal: 0,
        }]);
        let table = [Some(NodeId::new(10)), Some(NodeId::new(11))];
        let mut factory = EdgeFactory::new(&data, &table);

        let (index, edge) = factory.create_edge().unwrap();
        let edge = edge.unwrap();
        assert_eq!(index, 0);
        assert_eq!(edge.from(), NodeId::new(10));
        assert_eq!(edge.to(), NodeId::new(11));
        assert_eq!(edge.kind(), EdgeType::Direct);
        assert!(!factory.ready());
    }

    #[test]
    fn test_missing_endpoint_drops_edge_but_keeps_index() {
        let data = encode(&[
            EdgeRecord {
                from_index: 0,
                to_index: 7,
                kind: EdgeType::Direct,
                ordinal: 0,
            },
            EdgeRecord {
                from_index: 0,
                to_index: 1,
                kind: EdgeType::Indirect,
                ordinal: 1,
            },
        ]);
        let table = [Some(NodeId::new(10)), Some(NodeId::new(11))];
        let mut factory = EdgeFactory::new(&data, &table);

        let (index, dropped) = factory.create_edge().unwrap();
        assert_eq!(index, 0);
        assert!(dropped.is_none());

        // The dropped record still consumed raw index 0
        let (index, edge) = factory.create_edge().unwrap();
        assert_eq!(index, 1);
        assert!(edge.is_some());
    }

    #[test]
    fn test_dropped_node_slot_drops_edge() {
        let data = encode(&[EdgeRecord {
            from_index: 0,
            to_index: 1,
            kind: EdgeType::Direct,
            ordinal: 0,
        }]);
        let table = [Some(NodeId::new(10)), None];
        let mut factory = EdgeFactory::new(&data, &table);
        let (_, edge) = factory.create_edge().unwrap();
        assert!(edge.is_none());
    }
}
