use thiserror::Error;

macro_rules! invalid_graph {
    // Single string version
    ($msg:expr) => {
        crate::Error::InvalidGraph {
            message: $msg.to_string(),
            file: file!(),
            line: line!(),
        }
    };

    // Format string with arguments version
    ($fmt:expr, $($arg:tt)*) => {
        crate::Error::InvalidGraph {
            message: format!($fmt, $($arg)*),
            file: file!(),
            line: line!(),
        }
    };
}

macro_rules! malformed_error {
    // Single string version
    ($msg:expr) => {
        crate::Error::Malformed {
            message: $msg.to_string(),
            file: file!(),
            line: line!(),
        }
    };

    // Format string with arguments version
    ($fmt:expr, $($arg:tt)*) => {
        crate::Error::Malformed {
            message: format!($fmt, $($arg)*),
            file: file!(),
            line: line!(),
        }
    };
}

/// The generic Error type, which provides coverage for all errors this library can potentially
/// return.
///
/// This enum covers all possible error conditions that can occur while decoding execution
/// traces, assembling module graphs, and running the anonymous-code partitioning passes.
/// Each variant provides specific context about the failure mode to enable appropriate
/// error handling.
///
/// # Error Categories
///
/// ## Structural Errors (fatal for the current load)
/// - [`Error::InvalidGraph`] - A graph invariant was violated (entry node with incoming
///   edges, mismatched edge types within an ordinal group, duplicate non-equal edges, ...)
/// - [`Error::UnanalyzedGraph`] - Summarization was requested before analysis ran
///
/// ## Trace Decoding Errors
/// - [`Error::OutOfBounds`] - Attempted to read beyond the end of a trace stream
/// - [`Error::Malformed`] - Corrupted or structurally invalid trace record
/// - [`Error::NotSupported`] - Unsupported stream version or record layout
/// - [`Error::Empty`] - Empty input provided where trace data was expected
///
/// ## I/O and External Errors
/// - [`Error::FileError`] - Filesystem I/O errors from the trace data source
/// - [`Error::MissingStream`] - A required trace stream is absent from the data source
///
/// # Examples
///
/// ```rust,ignore
/// use tracegraph::{Error, trace::ModuleGraphLoader};
///
/// match loader.load_graph(&unit) {
///     Ok(graph) => println!("loaded {} nodes", graph.node_count()),
///     Err(Error::InvalidGraph { message, file, line }) => {
///         eprintln!("invalid graph: {} ({}:{})", message, file, line);
///     }
///     Err(Error::OutOfBounds) => eprintln!("truncated trace stream"),
///     Err(e) => eprintln!("load failed: {}", e),
/// }
/// ```
#[derive(Error, Debug)]
pub enum Error {
    /// A graph structural invariant was violated.
    ///
    /// This is the fatal error class of the engine: entry nodes with incoming edges,
    /// exit nodes with outgoing edges, conflicting edge types within one ordinal group,
    /// duplicate non-equal edges, a boundary node linked directly to another boundary
    /// node, or mixing JIT-singleton and white-box content in one anonymous graph.
    /// The error includes the source location where the violation was detected.
    ///
    /// # Fields
    ///
    /// * `message` - Detailed description of the violated invariant
    /// * `file` - Source file where the error was detected
    /// * `line` - Source line where the error was detected
    #[error("Invalid graph - {file}:{line}: {message}")]
    InvalidGraph {
        /// The message to be printed for the invalid graph error
        message: String,
        /// The source file in which this error occured
        file: &'static str,
        /// The source line in which this error occured
        line: u32,
    },

    /// Summarization was requested before the graph was analyzed.
    ///
    /// [`crate::graph::ModuleGraph::summarize`] requires `analyze_graph` to have completed
    /// on the current graph contents. This is a caller contract violation, not a data error.
    #[error("Graph has not been analyzed - call analyze_graph before summarize")]
    UnanalyzedGraph,

    /// An out of bound access was attempted while reading a trace stream.
    ///
    /// This error occurs when trying to read data beyond the end of a stream.
    /// It's a safety check to prevent buffer overruns, and also how stream
    /// truncation surfaces to the caller.
    #[error("Out of Bound read would have occurred!")]
    OutOfBounds,

    /// A trace record is damaged and could not be decoded.
    ///
    /// This error indicates that a record does not conform to the expected
    /// fixed-width layout, such as an unknown node type code or an edge type
    /// code outside the closed set. The error includes the source location
    /// where the malformation was detected for debugging purposes.
    ///
    /// # Fields
    ///
    /// * `message` - Detailed description of what was malformed
    /// * `file` - Source file where the error was detected
    /// * `line` - Source line where the error was detected
    #[error("Malformed - {file}:{line}: {message}")]
    Malformed {
        /// The message to be printed for the Malformed error
        message: String,
        /// The source file in which this error occured
        file: &'static str,
        /// The source line in which this error occured
        line: u32,
    },

    /// This stream version or record layout is not supported.
    #[error("This stream version is not supported")]
    NotSupported,

    /// Provided input was empty.
    ///
    /// This error occurs when an empty stream is provided where actual
    /// trace data was expected.
    #[error("Provided input was empty")]
    Empty,

    /// File I/O error.
    ///
    /// Wraps standard I/O errors that can occur while the trace data source
    /// reads or writes its backing files.
    #[error("{0}")]
    FileError(#[from] std::io::Error),

    /// A required trace stream is absent from the data source.
    ///
    /// The associated value names the missing (unit, stream) pair.
    #[error("Missing trace stream - {0}")]
    MissingStream(String),

    /// Generic error for miscellaneous failures.
    ///
    /// Used for errors that don't fit into other categories.
    #[error("{0}")]
    Error(String),
}
