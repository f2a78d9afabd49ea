//! Cursor-based reader for fixed-width trace record streams.
//!
//! [`TraceReader`] maintains a position within a byte slice and provides
//! bounds-checked sequential reads. Record decoders wrap it and consume exactly
//! one fixed-size record per call, never looking ahead; [`TraceReader::ready`]
//! gates each read so truncated streams degrade gracefully instead of failing the
//! whole load.

use crate::{trace::io::read_le_at, trace::io::TraceIO, Result};

/// A sequential little-endian reader over a trace stream.
///
/// # Examples
///
/// ```rust
/// use tracegraph::trace::TraceReader;
///
/// let data = [0x01, 0x00, 0x00, 0x00, 0x02, 0x00, 0x00, 0x00];
/// let mut reader = TraceReader::new(&data);
///
/// assert!(reader.ready(4));
/// let first: u32 = reader.read_le()?;
/// let second: u32 = reader.read_le()?;
/// assert_eq!((first, second), (1, 2));
/// assert!(!reader.ready(1));
/// # Ok::<(), tracegraph::Error>(())
/// ```
pub struct TraceReader<'a> {
    /// The stream data being read
    data: &'a [u8],
    /// Current position within the data buffer
    position: usize,
}

impl<'a> TraceReader<'a> {
    /// Creates a reader over a byte slice.
    #[must_use]
    pub fn new(data: &'a [u8]) -> Self {
        TraceReader { data, position: 0 }
    }

    /// Returns the length of the underlying stream.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns `true` if the stream has no data.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Returns the current position.
    #[must_use]
    pub fn pos(&self) -> usize {
        self.position
    }

    /// Returns `true` if at least `bytes` more bytes are available.
    ///
    /// Decoders call this with their record size before every read; a partial
    /// trailing record (truncated capture) simply ends the stream.
    #[must_use]
    pub fn ready(&self, bytes: usize) -> bool {
        self.position + bytes <= self.data.len()
    }

    /// Moves the cursor to `pos`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::OutOfBounds`] if `pos` is beyond the stream length.
    pub fn seek(&mut self, pos: usize) -> Result<()> {
        if pos > self.data.len() {
            return Err(crate::Error::OutOfBounds);
        }
        self.position = pos;
        Ok(())
    }

    /// Advances the cursor by `bytes`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::OutOfBounds`] if the advance would pass the end.
    pub fn advance_by(&mut self, bytes: usize) -> Result<()> {
        self.seek(self.position + bytes)
    }

    /// Reads a primitive value in little-endian byte order.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::OutOfBounds`] if there are insufficient bytes.
    pub fn read_le<T: TraceIO>(&mut self) -> Result<T> {
        read_le_at(self.data, &mut self.position)
    }

    /// Reads `count` raw bytes.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::OutOfBounds`] if there are insufficient bytes.
    pub fn read_bytes(&mut self, count: usize) -> Result<&'a [u8]> {
        if !self.ready(count) {
            return Err(crate::Error::OutOfBounds);
        }
        let slice = &self.data[self.position..self.position + count];
        self.position += count;
        Ok(slice)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequential_reads() {
        let data = [0xAA, 0xBB, 0x01, 0x00];
        let mut reader = TraceReader::new(&data);
        assert_eq!(reader.read_le::<u8>().unwrap(), 0xAA);
        assert_eq!(reader.read_le::<u8>().unwrap(), 0xBB);
        assert_eq!(reader.read_le::<u16>().unwrap(), 1);
        assert!(reader.read_le::<u8>().is_err());
    }

    #[test]
    fn test_ready_gates_partial_records() {
        let data = [0u8; 10];
        let reader = TraceReader::new(&data);
        assert!(reader.ready(8));
        assert!(reader.ready(10));
        assert!(!reader.ready(11));
    }

    #[test]
    fn test_seek_and_read_bytes() {
        let data = [0, 1, 2, 3, 4, 5];
        let mut reader = TraceReader::new(&data);
        reader.seek(2).unwrap();
        assert_eq!(reader.read_bytes(3).unwrap(), &[2, 3, 4]);
        assert_eq!(reader.pos(), 5);
        assert!(reader.read_bytes(2).is_err());
        assert!(reader.seek(7).is_err());
    }
}
