//! Fixed-width, bit-packed trace record layouts.
//!
//! Every record format is little-endian and emitted/consumed in strict sequence.
//! The field offsets in this module are authoritative for the on-disk formats;
//! readers and writers mirror each other exactly and are round-trip tested.
//!
//! # Record Formats
//!
//! - **Node record** (16 bytes): word 1 packs `module_index`\[0:16\),
//!   `relative_tag`\[16:48\), `instance_id`\[48:56\), `meta_type`\[56:64\);
//!   word 2 is the content hash.
//! - **Edge record** (8 bytes): `from_index`\[0:28\), `to_index`\[28:56\),
//!   `edge_type`\[56:60\), `ordinal`\[60:64\). The 28-bit indices cap the node
//!   table of one stream at 2^28 entries; the ordinal is capped at 15.
//! - **Cross-module edge record** (24 bytes): annotated from-tag word, annotated
//!   to-tag word, signature hash word.
//! - **Metadata entry words** (8 bytes each): see the `pack_*`/`unpack_*`
//!   functions for the per-entry field widths.

use crate::{
    graph::{EdgeType, IntervalRecord, MetaNodeType, SgeRecord, SscRecord, UibRecord},
    trace::{io::push_le, reader::TraceReader},
    Result,
};

/// Size of one node record in bytes.
pub const NODE_RECORD_SIZE: usize = 16;
/// Size of one edge record in bytes.
pub const EDGE_RECORD_SIZE: usize = 8;
/// Size of one cross-module edge record in bytes.
pub const CROSS_MODULE_EDGE_RECORD_SIZE: usize = 24;
/// Size of one metadata word in bytes.
pub const METADATA_WORD_SIZE: usize = 8;
/// Size of the per-execution UUID in bytes.
pub const EXECUTION_UUID_SIZE: usize = 16;

/// Largest node index representable in an edge record's 28-bit index fields.
pub const MAX_NODE_INDEX: u32 = (1 << 28) - 1;
/// Largest ordinal representable in an edge record's 4-bit ordinal field.
pub const MAX_EDGE_ORDINAL: u8 = 15;

/// A decoded node record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeRecord {
    /// Index of the owning module in the trace's module list.
    pub module_index: u16,
    /// Offset of the block within the owning module.
    pub relative_tag: u32,
    /// Disambiguates re-emitted blocks at the same tag.
    pub instance_id: u8,
    /// Node type code.
    pub meta_type: MetaNodeType,
    /// 64-bit content/identity hash.
    pub hash: u64,
}

impl NodeRecord {
    /// Decodes one node record from the stream.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::OutOfBounds`] on truncation and
    /// [`crate::Error::Malformed`] on an unknown node type code.
    pub fn read_from(reader: &mut TraceReader<'_>) -> Result<Self> {
        let word: u64 = reader.read_le()?;
        let hash: u64 = reader.read_le()?;

        let type_code = u8::try_from(word >> 56).unwrap_or(u8::MAX);
        let meta_type = MetaNodeType::from_repr(type_code)
            .ok_or_else(|| malformed_error!("Unknown node type code {}", type_code))?;

        Ok(NodeRecord {
            module_index: (word & 0xFFFF) as u16,
            relative_tag: ((word >> 16) & 0xFFFF_FFFF) as u32,
            instance_id: ((word >> 48) & 0xFF) as u8,
            meta_type,
            hash,
        })
    }

    /// Encodes this record onto the stream.
    pub fn write_to(&self, out: &mut Vec<u8>) {
        let word = u64::from(self.module_index)
            | (u64::from(self.relative_tag) << 16)
            | (u64::from(self.instance_id) << 48)
            | (u64::from(self.meta_type as u8) << 56);
        push_le(out, word);
        push_le(out, self.hash);
    }
}

/// A decoded edge record.
///
/// Node indices refer to positions in the node stream of the same trace, in
/// decode order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EdgeRecord {
    /// Source node index.
    pub from_index: u32,
    /// Target node index.
    pub to_index: u32,
    /// Transfer kind.
    pub kind: EdgeType,
    /// Call-site/branch-site slot.
    pub ordinal: u8,
}

impl EdgeRecord {
    /// Decodes one edge record from the stream.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::OutOfBounds`] on truncation and
    /// [`crate::Error::Malformed`] on an unknown edge type code.
    pub fn read_from(reader: &mut TraceReader<'_>) -> Result<Self> {
        let word: u64 = reader.read_le()?;

        let kind_code = ((word >> 56) & 0xF) as u8;
        let kind = EdgeType::from_repr(kind_code)
            .ok_or_else(|| malformed_error!("Unknown edge type code {}", kind_code))?;

        Ok(EdgeRecord {
            from_index: (word & u64::from(MAX_NODE_INDEX)) as u32,
            to_index: ((word >> 28) & u64::from(MAX_NODE_INDEX)) as u32,
            kind,
            ordinal: ((word >> 60) & 0xF) as u8,
        })
    }

    /// Encodes this record onto the stream.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Malformed`] if either node index exceeds
    /// [`MAX_NODE_INDEX`] or the ordinal exceeds [`MAX_EDGE_ORDINAL`] - the
    /// format cannot represent them.
    pub fn write_to(&self, out: &mut Vec<u8>) -> Result<()> {
        if self.from_index > MAX_NODE_INDEX || self.to_index > MAX_NODE_INDEX {
            return Err(malformed_error!(
                "Node index {}/{} exceeds the 28-bit edge record limit",
                self.from_index,
                self.to_index
            ));
        }
        if self.ordinal > MAX_EDGE_ORDINAL {
            return Err(malformed_error!(
                "Ordinal {} exceeds the 4-bit edge record limit",
                self.ordinal
            ));
        }

        let word = u64::from(self.from_index)
            | (u64::from(self.to_index) << 28)
            | (u64::from(self.kind as u8) << 56)
            | (u64::from(self.ordinal) << 60);
        push_le(out, word);
        Ok(())
    }
}

/// A decoded cross-module edge record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CrossModuleEdgeRecord {
    /// Annotated tag of the edge source in its own module.
    pub from_tag: u64,
    /// Annotated tag of the edge target in its own module.
    pub to_tag: u64,
    /// Absolute signature hash of the crossed boundary.
    pub signature_hash: u64,
}

impl CrossModuleEdgeRecord {
    /// Decodes one cross-module edge record from the stream.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::OutOfBounds`] on truncation.
    pub fn read_from(reader: &mut TraceReader<'_>) -> Result<Self> {
        Ok(CrossModuleEdgeRecord {
            from_tag: reader.read_le()?,
            to_tag: reader.read_le()?,
            signature_hash: reader.read_le()?,
        })
    }

    /// Encodes this record onto the stream.
    pub fn write_to(&self, out: &mut Vec<u8>) {
        push_le(out, self.from_tag);
        push_le(out, self.to_tag);
        push_le(out, self.signature_hash);
    }
}

/// Packs a UIB entry: `edge_index`\[0:20\), `instance_count`\[20:32\),
/// `traversal_count`\[32:63\), `admitted`\[63:64\).
///
/// # Errors
///
/// Returns [`crate::Error::Malformed`] if a field exceeds its width.
pub fn pack_uib(record: &UibRecord) -> Result<u64> {
    if record.edge_index >= (1 << 20) {
        return Err(malformed_error!(
            "UIB edge index {} exceeds 20 bits",
            record.edge_index
        ));
    }
    if record.instance_count >= (1 << 12) {
        return Err(malformed_error!(
            "UIB instance count {} exceeds 12 bits",
            record.instance_count
        ));
    }
    if record.traversal_count >= (1 << 31) {
        return Err(malformed_error!(
            "UIB traversal count {} exceeds 31 bits",
            record.traversal_count
        ));
    }

    Ok(u64::from(record.edge_index)
        | (u64::from(record.instance_count) << 20)
        | (u64::from(record.traversal_count) << 32)
        | (u64::from(record.admitted) << 63))
}

/// Unpacks a UIB entry word.
#[must_use]
pub fn unpack_uib(word: u64) -> UibRecord {
    UibRecord {
        edge_index: (word & 0xF_FFFF) as u32,
        instance_count: ((word >> 20) & 0xFFF) as u16,
        traversal_count: ((word >> 32) & 0x7FFF_FFFF) as u32,
        admitted: (word >> 63) != 0,
    }
}

/// Packs an interval entry: `type_id`\[0:8\), `span`\[8:16\), `count`\[16:48\),
/// `max_consecutive`\[48:64\).
#[must_use]
pub fn pack_interval(record: &IntervalRecord) -> u64 {
    u64::from(record.type_id)
        | (u64::from(record.span) << 8)
        | (u64::from(record.count) << 16)
        | (u64::from(record.max_consecutive) << 48)
}

/// Unpacks an interval entry word.
#[must_use]
pub fn unpack_interval(word: u64) -> IntervalRecord {
    IntervalRecord {
        type_id: (word & 0xFF) as u8,
        span: ((word >> 8) & 0xFF) as u8,
        count: ((word >> 16) & 0xFFFF_FFFF) as u32,
        max_consecutive: ((word >> 48) & 0xFFFF) as u16,
    }
}

/// Packs a suspicious-syscall entry: `sysnum`\[0:16\), `edge_index`\[16:48\).
#[must_use]
pub fn pack_ssc(record: &SscRecord) -> u64 {
    u64::from(record.sysnum) | (u64::from(record.edge_index) << 16)
}

/// Unpacks a suspicious-syscall entry word.
#[must_use]
pub fn unpack_ssc(word: u64) -> SscRecord {
    SscRecord {
        sysnum: (word & 0xFFFF) as u16,
        edge_index: ((word >> 16) & 0xFFFF_FFFF) as u32,
    }
}

/// Packs a suspicious-gencode-entry record: `edge_index`\[0:20\),
/// `uib_count`\[20:40\), `suib_count`\[40:60\).
///
/// # Errors
///
/// Returns [`crate::Error::Malformed`] if a field exceeds its width.
pub fn pack_sge(record: &SgeRecord) -> Result<u64> {
    if record.edge_index >= (1 << 20) {
        return Err(malformed_error!(
            "SGE edge index {} exceeds 20 bits",
            record.edge_index
        ));
    }
    if record.uib_count >= (1 << 20) || record.suib_count >= (1 << 20) {
        return Err(malformed_error!(
            "SGE counts {}/{} exceed 20 bits",
            record.uib_count,
            record.suib_count
        ));
    }

    Ok(u64::from(record.edge_index)
        | (u64::from(record.uib_count) << 20)
        | (u64::from(record.suib_count) << 40))
}

/// Unpacks a suspicious-gencode-entry word.
#[must_use]
pub fn unpack_sge(word: u64) -> SgeRecord {
    SgeRecord {
        edge_index: (word & 0xF_FFFF) as u32,
        uib_count: ((word >> 20) & 0xF_FFFF) as u32,
        suib_count: ((word >> 40) & 0xF_FFFF) as u32,
    }
}

/// Packs a sequence header: `execution_count`\[0:32\), `is_root`\[32:33\).
#[must_use]
pub fn pack_sequence_header(execution_count: u32, is_root: bool) -> u64 {
    u64::from(execution_count) | (u64::from(is_root) << 32)
}

/// Unpacks a sequence header word.
#[must_use]
pub fn unpack_sequence_header(word: u64) -> (u32, bool) {
    ((word & 0xFFFF_FFFF) as u32, ((word >> 32) & 1) != 0)
}

/// Packs an execution header: `uib_count`\[0:16\), `interval_count`\[16:32\),
/// `ssc_count`\[32:48\), `sge_count`\[48:64\).
#[must_use]
pub fn pack_execution_header(
    uib_count: u16,
    interval_count: u16,
    ssc_count: u16,
    sge_count: u16,
) -> u64 {
    u64::from(uib_count)
        | (u64::from(interval_count) << 16)
        | (u64::from(ssc_count) << 32)
        | (u64::from(sge_count) << 48)
}

/// Unpacks an execution header word.
#[must_use]
pub fn unpack_execution_header(word: u64) -> (u16, u16, u16, u16) {
    (
        (word & 0xFFFF) as u16,
        ((word >> 16) & 0xFFFF) as u16,
        ((word >> 32) & 0xFFFF) as u16,
        ((word >> 48) & 0xFFFF) as u16,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_record_round_trip() {
        let record = NodeRecord {
            module_index: 7,
            relative_tag: 0x00AB_CDEF,
            instance_id: 3,
            meta_type: MetaNodeType::Return,
            hash: 0x1122_3344_5566_7788,
        };

        let mut out = Vec::new();
        record.write_to(&mut out);
        assert_eq!(out.len(), NODE_RECORD_SIZE);

        let mut reader = TraceReader::new(&out);
        let decoded = NodeRecord::read_from(&mut reader).unwrap();
        assert_eq!(decoded, record);
    }

    #[test]
    fn test_node_record_field_extremes() {
        let record = NodeRecord {
            module_index: u16::MAX,
            relative_tag: u32::MAX,
            instance_id: u8::MAX,
            meta_type: MetaNodeType::ModuleExit,
            hash: u64::MAX,
        };
        let mut out = Vec::new();
        record.write_to(&mut out);
        let decoded = NodeRecord::read_from(&mut TraceReader::new(&out)).unwrap();
        assert_eq!(decoded, record);
    }

    #[test]
    fn test_node_record_rejects_unknown_type() {
        let word = 0xFFu64 << 56;
        let mut out = Vec::new();
        push_le(&mut out, word);
        push_le(&mut out, 0u64);
        assert!(NodeRecord::read_from(&mut TraceReader::new(&out)).is_err());
    }

    #[test]
    fn test_edge_record_round_trip() {
        let record = EdgeRecord {
            from_index: 0x0ABC_DEF0,
            to_index: 0x0123_4567,
            kind: EdgeType::CallContinuation,
            ordinal: 11,
        };

        let mut out = Vec::new();
        record.write_to(&mut out).unwrap();
        assert_eq!(out.len(), EDGE_RECORD_SIZE);

        let decoded = EdgeRecord::read_from(&mut TraceReader::new(&out)).unwrap();
        assert_eq!(decoded, record);
    }

    #[test]
    fn test_edge_record_rejects_oversized_fields() {
        let mut out = Vec::new();
        let oversized_index = EdgeRecord {
            from_index: MAX_NODE_INDEX + 1,
            to_index: 0,
            kind: EdgeType::Direct,
            ordinal: 0,
        };
        assert!(oversized_index.write_to(&mut out).is_err());

        let oversized_ordinal = EdgeRecord {
            from_index: 0,
            to_index: 0,
            kind: EdgeType::Direct,
            ordinal: MAX_EDGE_ORDINAL + 1,
        };
        assert!(oversized_ordinal.write_to(&mut out).is_err());
    }

    #[test]
    fn test_cross_module_record_round_trip() {
        let record = CrossModuleEdgeRecord {
            from_tag: 0xAAAA_BBBB_CCCC_DDDD,
            to_tag: 0x1111_2222_3333_4444,
            signature_hash: 0x5555_6666_7777_8888,
        };
        let mut out = Vec::new();
        record.write_to(&mut out);
        assert_eq!(out.len(), CROSS_MODULE_EDGE_RECORD_SIZE);
        let decoded = CrossModuleEdgeRecord::read_from(&mut TraceReader::new(&out)).unwrap();
        assert_eq!(decoded, record);
    }

    #[test]
    fn test_uib_word_round_trip() {
        let record = UibRecord {
            edge_index: 0xF_FFFF,
            instance_count: 0xFFF,
            traversal_count: 0x7FFF_FFFF,
            admitted: true,
        };
        assert_eq!(unpack_uib(pack_uib(&record).unwrap()), record);

        let suspicious = UibRecord {
            edge_index: 42,
            instance_count: 1,
            traversal_count: 7,
            admitted: false,
        };
        assert_eq!(unpack_uib(pack_uib(&suspicious).unwrap()), suspicious);
    }

    #[test]
    fn test_uib_pack_rejects_overflow() {
        let record = UibRecord {
            edge_index: 1 << 20,
            instance_count: 0,
            traversal_count: 0,
            admitted: false,
        };
        assert!(pack_uib(&record).is_err());
    }

    #[test]
    fn test_interval_word_round_trip() {
        let record = IntervalRecord {
            type_id: 2,
            span: 10,
            count: 0xFFFF_FFFF,
            max_consecutive: 0xFFFF,
        };
        assert_eq!(unpack_interval(pack_interval(&record)), record);
    }

    #[test]
    fn test_ssc_word_round_trip() {
        let record = SscRecord {
            sysnum: 0x1A0,
            edge_index: 0xDEAD_BEEF,
        };
        assert_eq!(unpack_ssc(pack_ssc(&record)), record);
    }

    #[test]
    fn test_sge_word_round_trip() {
        let record = SgeRecord {
            edge_index: 0xF_FFFF,
            uib_count: 0xF_FFFF,
            suib_count: 0xF_FFFF,
        };
        assert_eq!(unpack_sge(pack_sge(&record).unwrap()), record);
    }

    #[test]
    fn test_header_words_round_trip() {
        let word = pack_sequence_header(123, true);
        assert_eq!(unpack_sequence_header(word), (123, true));
        let word = pack_sequence_header(0, false);
        assert_eq!(unpack_sequence_header(word), (0, false));

        let word = pack_execution_header(1, 2, 3, 4);
        assert_eq!(unpack_execution_header(word), (1, 2, 3, 4));
    }
}
