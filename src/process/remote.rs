//! Remote connection boundary.

use crate::error::{Result, TraversalError};
use crate::process::bytecode::Bytecode;
use crate::process::traverser::Traverser;

/// Result traversers streamed back by another engine.
pub type TraverserStream = Box<dyn Iterator<Item = Result<Traverser>> + Send>;

/// Wraps an already materialized result list.
pub fn stream_of(traversers: Vec<Traverser>) -> TraverserStream {
    Box::new(traversers.into_iter().map(Ok::<Traverser, TraversalError>))
}

/// Connection to a server that executes bytecode and streams traversers back.
///
/// Calls block. The server may return bulked traversers and id-only element
/// references; the client re-admits them through the local graph.
pub trait RemoteConnection: Send + Sync {
    /// Submits bytecode for execution.
    fn submit(&self, bytecode: &Bytecode) -> Result<TraverserStream>;

    /// Releases the connection. Outstanding streams may fail afterwards.
    fn close(&self) -> Result<()>;
}
