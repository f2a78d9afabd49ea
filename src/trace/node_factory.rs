//! Streaming node decoder.

use crate::{
    graph::{BoundarySide, MetaNodeType, Node, NodeKey},
    registry::ModuleId,
    trace::{layout::NodeRecord, layout::NODE_RECORD_SIZE, reader::TraceReader},
    Result,
};

/// Decodes node records from a trace stream into fully built [`Node`]s.
///
/// Each [`NodeFactory::create_node`] call consumes exactly one 16-byte record and
/// never looks ahead. Module indices resolve through the trace's module list,
/// which must already be mapped to registry ids in module-index order.
pub struct NodeFactory<'a> {
    reader: TraceReader<'a>,
    modules: &'a [ModuleId],
}

impl<'a> NodeFactory<'a> {
    /// Creates a factory over a node stream.
    ///
    /// `modules` maps the trace's module indices to registry ids, in the order of
    /// the trace's module list.
    #[must_use]
    pub fn new(data: &'a [u8], modules: &'a [ModuleId]) -> Self {
        NodeFactory {
            reader: TraceReader::new(data),
            modules,
        }
    }

    /// Returns `true` while a complete record remains in the stream.
    ///
    /// A partial trailing record (truncated capture) ends the stream quietly.
    #[must_use]
    pub fn ready(&self) -> bool {
        self.reader.ready(NODE_RECORD_SIZE)
    }

    /// Decodes the next node.
    ///
    /// Boundary records become [`NodeKey::Boundary`] nodes keyed by their label
    /// hash; all other records become [`NodeKey::BasicBlock`] nodes keyed by
    /// module, relative tag and instance id.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::OutOfBounds`] on truncation mid-record and
    /// [`crate::Error::Malformed`] on an unknown node type code or a module index
    /// outside the trace's module list.
    pub fn create_node(&mut self) -> Result<Node> {
        let record = NodeRecord::read_from(&mut self.reader)?;

        let key = match record.meta_type {
            MetaNodeType::ModuleEntry => NodeKey::Boundary {
                hash: record.hash,
                side: BoundarySide::Entry,
            },
            MetaNodeType::ModuleExit => NodeKey::Boundary {
                hash: record.hash,
                side: BoundarySide::Exit,
            },
            _ => {
                let module = self
                    .modules
                    .get(record.module_index as usize)
                    .copied()
                    .ok_or_else(|| {
                        malformed_error!(
                            "Node module index {} outside module list of {}",
                            record.module_index,
                            self.modules.len()
                        )
                    })?;
                NodeKey::BasicBlock {
                    module,
                    relative_tag: record.relative_tag,
                    instance_id: record.instance_id,
                }
            }
        };

        Ok(Node::new(key, record.hash, record.meta_type))
    }
}
