//! Trace data source and sink abstractions.
//!
//! The core never opens files directly: every trace stream is obtained from a
//! [`TraceDataSource`] and every produced stream is handed to a [`TraceDataSink`],
//! keyed by (unit, [`StreamType`]). This keeps directory layout conventions out of
//! the engine and lets tests feed byte buffers straight in.
//!
//! # Backends
//!
//! - [`DirectoryTraceSource`] / [`DirectoryTraceSink`] - one file per (unit,
//!   stream) in a flat directory, read through memory mapping so large node and
//!   edge streams are paged on demand.
//! - [`MemoryTraceSource`] / [`MemoryTraceSink`] - in-memory buffers, used by
//!   tests and by the raw transformer's intermediate staging.

use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
    sync::Mutex,
};

use memmap2::Mmap;

use crate::{
    Error::{Error, FileError},
    Result,
};

/// The stream families recorded per unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumIter)]
pub enum StreamType {
    /// Node records (16 bytes each).
    GraphNode,
    /// Edge records (8 bytes each).
    GraphEdge,
    /// Cross-module edge records (24 bytes each).
    CrossModuleEdge,
    /// Ordered module-name list, one name per line.
    ModuleList,
    /// Execution metadata stream.
    Metadata,
}

impl StreamType {
    /// Returns the filename suffix for this stream family.
    #[must_use]
    pub fn suffix(self) -> &'static str {
        match self {
            StreamType::GraphNode => "graph-node",
            StreamType::GraphEdge => "graph-edge",
            StreamType::CrossModuleEdge => "cross-module",
            StreamType::ModuleList => "module",
            StreamType::Metadata => "meta",
        }
    }
}

enum StreamBacking {
    Mapped(Mmap),
    Owned(Vec<u8>),
}

/// A readable trace stream.
///
/// Wraps either a memory-mapped file or an owned buffer; decoders only see the
/// byte slice.
pub struct TraceStream {
    backing: StreamBacking,
}

impl TraceStream {
    /// Creates a stream over an owned buffer.
    #[must_use]
    pub fn from_vec(data: Vec<u8>) -> Self {
        TraceStream {
            backing: StreamBacking::Owned(data),
        }
    }

    /// Returns the stream bytes.
    #[must_use]
    pub fn data(&self) -> &[u8] {
        match &self.backing {
            StreamBacking::Mapped(map) => map,
            StreamBacking::Owned(data) => data,
        }
    }

    /// Returns the stream length in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data().len()
    }

    /// Returns `true` if the stream is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data().is_empty()
    }
}

/// Provides readable trace streams per (unit, stream type).
pub trait TraceDataSource {
    /// Returns `true` if a stream exists for the pair.
    fn has_stream(&self, unit: &str, stream: StreamType) -> bool;

    /// Opens the stream for reading.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::MissingStream`] if the pair has no stream, or an
    /// I/O error from the backing storage.
    fn read_stream(&self, unit: &str, stream: StreamType) -> Result<TraceStream>;
}

/// Accepts produced trace streams per (unit, stream type).
pub trait TraceDataSink {
    /// Writes a complete stream for the pair, replacing any previous content.
    ///
    /// # Errors
    ///
    /// Returns an I/O error from the backing storage.
    fn write_stream(&self, unit: &str, stream: StreamType, data: &[u8]) -> Result<()>;
}

/// A directory of trace files, one per (unit, stream type).
///
/// Files are named `<unit>.<suffix>.dat` and read through memory mapping.
pub struct DirectoryTraceSource {
    root: PathBuf,
}

impl DirectoryTraceSource {
    /// Creates a source over `root`.
    ///
    /// # Errors
    ///
    /// Returns an error if `root` is not an existing directory.
    pub fn new(root: &Path) -> Result<Self> {
        if !root.is_dir() {
            return Err(Error(format!(
                "Trace directory does not exist: {}",
                root.display()
            )));
        }
        Ok(DirectoryTraceSource {
            root: root.to_path_buf(),
        })
    }

    fn stream_path(&self, unit: &str, stream: StreamType) -> PathBuf {
        self.root.join(format!("{}.{}.dat", unit, stream.suffix()))
    }
}

impl TraceDataSource for DirectoryTraceSource {
    fn has_stream(&self, unit: &str, stream: StreamType) -> bool {
        self.stream_path(unit, stream).is_file()
    }

    fn read_stream(&self, unit: &str, stream: StreamType) -> Result<TraceStream> {
        let path = self.stream_path(unit, stream);
        if !path.is_file() {
            return Err(crate::Error::MissingStream(format!(
                "{} ({})",
                unit,
                stream.suffix()
            )));
        }

        let file = fs::File::open(&path).map_err(FileError)?;
        let length = file.metadata().map_err(FileError)?.len();
        if length == 0 {
            // Zero-length files cannot be mapped
            return Ok(TraceStream::from_vec(Vec::new()));
        }

        // SAFETY: the mapping is read-only and the file is not expected to be
        // modified while a load is in progress (single-writer batch contract).
        let map = unsafe { Mmap::map(&file) }.map_err(FileError)?;
        Ok(TraceStream {
            backing: StreamBacking::Mapped(map),
        })
    }
}

/// A directory sink writing one file per (unit, stream type).
pub struct DirectoryTraceSink {
    root: PathBuf,
}

impl DirectoryTraceSink {
    /// Creates a sink under `root`, creating the directory if needed.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the directory cannot be created.
    pub fn new(root: &Path) -> Result<Self> {
        fs::create_dir_all(root).map_err(FileError)?;
        Ok(DirectoryTraceSink {
            root: root.to_path_buf(),
        })
    }
}

impl TraceDataSink for DirectoryTraceSink {
    fn write_stream(&self, unit: &str, stream: StreamType, data: &[u8]) -> Result<()> {
        let path = self.root.join(format!("{}.{}.dat", unit, stream.suffix()));
        fs::write(path, data).map_err(FileError)
    }
}

/// An in-memory trace source backed by a map of buffers.
#[derive(Default)]
pub struct MemoryTraceSource {
    streams: HashMap<(String, StreamType), Vec<u8>>,
}

impl MemoryTraceSource {
    /// Creates an empty source.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs a stream buffer.
    pub fn insert(&mut self, unit: &str, stream: StreamType, data: Vec<u8>) {
        self.streams.insert((unit.to_string(), stream), data);
    }
}

impl TraceDataSource for MemoryTraceSource {
    fn has_stream(&self, unit: &str, stream: StreamType) -> bool {
        self.streams.contains_key(&(unit.to_string(), stream))
    }

    fn read_stream(&self, unit: &str, stream: StreamType) -> Result<TraceStream> {
        self.streams
            .get(&(unit.to_string(), stream))
            .map(|data| TraceStream::from_vec(data.clone()))
            .ok_or_else(|| crate::Error::MissingStream(format!("{} ({})", unit, stream.suffix())))
    }
}

/// An in-memory trace sink collecting written streams.
#[derive(Default)]
pub struct MemoryTraceSink {
    streams: Mutex<HashMap<(String, StreamType), Vec<u8>>>,
}

impl MemoryTraceSink {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a written stream, if present.
    #[must_use]
    pub fn stream(&self, unit: &str, stream: StreamType) -> Option<Vec<u8>> {
        self.streams
            .lock()
            .ok()
            .and_then(|streams| streams.get(&(unit.to_string(), stream)).cloned())
    }

    /// Returns the names of all units that received at least one stream.
    #[must_use]
    pub fn unit_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .streams
            .lock()
            .map(|streams| streams.keys().map(|(unit, _)| unit.clone()).collect())
            .unwrap_or_default();
        names.sort();
        names.dedup();
        names
    }
}

impl TraceDataSink for MemoryTraceSink {
    fn write_stream(&self, unit: &str, stream: StreamType, data: &[u8]) -> Result<()> {
        let mut streams = self
            .streams
            .lock()
            .map_err(|_| Error("Trace sink lock poisoned".to_string()))?;
        streams.insert((unit.to_string(), stream), data.to_vec());
        Ok(())
    }
}
