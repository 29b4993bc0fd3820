//! Serialization codec consumed by the bulk I/O boundary steps.
//!
//! The boundary steps own the stream (open, buffer, flush, close); a codec only
//! moves elements between an already-open stream and a graph.

use std::io::{BufRead, Write};

use thiserror::Error;

use crate::error::TraversalError;
use crate::structure::Graph;

mod jsonl;

pub use jsonl::JsonLinesCodec;

/// Failures raised by a codec.
#[derive(Debug, Error)]
pub enum CodecError {
    /// Reading or writing the stream failed.
    #[error(transparent)]
    Io(#[from] std::io::Error),
    /// A record could not be decoded or encoded.
    #[error("line {line}: {source}")]
    Json {
        /// One-based line number of the record.
        line: usize,
        /// Underlying cause.
        source: serde_json::Error,
    },
    /// A record was well-formed but inconsistent with earlier records.
    #[error("line {line}: {reason}")]
    Format {
        /// One-based line number of the record.
        line: usize,
        /// What was inconsistent.
        reason: String,
    },
    /// The target graph rejected an element.
    #[error("graph rejected element: {0}")]
    Graph(#[source] Box<TraversalError>),
}

impl From<TraversalError> for CodecError {
    fn from(err: TraversalError) -> Self {
        CodecError::Graph(Box::new(err))
    }
}

/// Populates a graph from a stream.
pub trait GraphReader: Send + Sync {
    /// Reads every element in `input` into `graph`.
    fn read_graph(&self, input: &mut dyn BufRead, graph: &dyn Graph) -> Result<(), CodecError>;
}

/// Persists a graph to a stream.
pub trait GraphWriter: Send + Sync {
    /// Writes every element of `graph` to `output`.
    fn write_graph(&self, output: &mut dyn Write, graph: &dyn Graph) -> Result<(), CodecError>;
}

/// A codec that can both read and write.
pub trait GraphCodec: GraphReader + GraphWriter {
    /// Short name used in logs.
    fn name(&self) -> &'static str;
}
