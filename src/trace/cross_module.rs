//! Streaming cross-module edge decoder.

use crate::{
    trace::{
        layout::{CrossModuleEdgeRecord, CROSS_MODULE_EDGE_RECORD_SIZE},
        reader::TraceReader,
    },
    Result,
};

/// Decodes cross-module edge records from a trace stream.
///
/// Cross-module edges annotate control transfers that leave one unit's graph and
/// enter another's; they carry the annotated tags of both endpoints and the
/// absolute signature hash of the crossed boundary. The loader collects them for
/// downstream graph linking - they do not resolve against the local node table.
pub struct CrossModuleEdgeFactory<'a> {
    reader: TraceReader<'a>,
}

impl<'a> CrossModuleEdgeFactory<'a> {
    /// Creates a factory over a cross-module edge stream.
    #[must_use]
    pub fn new(data: &'a [u8]) -> Self {
        CrossModuleEdgeFactory {
            reader: TraceReader::new(data),
        }
    }

    /// Returns `true` while a complete record remains in the stream.
    #[must_use]
    pub fn ready(&self) -> bool {
        self.reader.ready(CROSS_MODULE_EDGE_RECORD_SIZE)
    }

    /// Decodes the next cross-module edge record.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::OutOfBounds`] on truncation mid-record.
    pub fn create_edge(&mut self) -> Result<CrossModuleEdgeRecord> {
        CrossModuleEdgeRecord::read_from(&mut self.reader)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_sequence() {
        let records = [
            CrossModuleEdgeRecord {
                from_tag: 1,
                to_tag: 2,
                signature_hash: 3,
            },
            CrossModuleEdgeRecord {
                from_tag: 4,
                to_tag: 5,
                signature_hash: 6,
            },
        ];
        let mut data = Vec::new();
        for record in &records {
            record.write_to(&mut data);
        }

        let mut factory = CrossModuleEdgeFactory::new(&data);
        assert!(factory.ready());
        assert_eq!(factory.create_edge().unwrap(), records[0]);
        assert_eq!(factory.create_edge().unwrap(), records[1]);
        assert!(!factory.ready());
    }

    #[test]
    fn test_partial_trailing_record_is_not_ready() {
        let record = CrossModuleEdgeRecord {
            from_tag: 1,
            to_tag: 2,
            signature_hash: 3,
        };
        let mut data = Vec::new();
        record.write_to(&mut data);
        data.truncate(20);
        let factory = CrossModuleEdgeFactory::new(&data);
        assert!(!factory.ready());
    }
}
