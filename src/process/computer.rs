//! Bulk-parallel (OLAP) engine boundary.

use std::fmt;
use std::sync::Arc;

use crate::error::{Result, TraversalError};
use crate::process::bytecode::Bytecode;
use crate::process::traverser::Traverser;
use crate::structure::Graph;

/// Output of a bulk-parallel run.
pub struct ComputerResult {
    /// Result traversers; may be bulked and may hold id-only references.
    pub traversers: Vec<Traverser>,
    /// Graph produced by the run, when the engine materializes one.
    pub graph: Option<Arc<dyn Graph>>,
}

/// An engine that executes a whole traversal over a graph at once.
///
/// The engine rebuilds the traversal from bytecode; execution is opaque to the
/// caller, who only sees the finished [`ComputerResult`].
pub trait GraphComputer: Send + Sync {
    /// Engine name recorded in bytecode and logs.
    fn name(&self) -> &str;

    /// Runs `bytecode` over `graph`.
    fn submit(
        &self,
        bytecode: &Bytecode,
        graph: Arc<dyn Graph>,
        workers: Option<usize>,
    ) -> Result<ComputerResult>;
}

/// Engine selection and settings installed by `with_computer`.
#[derive(Clone)]
pub struct Computer {
    engine: Arc<dyn GraphComputer>,
    workers: Option<usize>,
}

impl Computer {
    /// Uses `engine` with its default parallelism.
    pub fn new(engine: Arc<dyn GraphComputer>) -> Self {
        Self {
            engine,
            workers: None,
        }
    }

    /// Requests a worker count.
    pub fn workers(mut self, workers: usize) -> Result<Self> {
        if workers == 0 {
            return Err(TraversalError::Invalid("a graph computer needs at least one worker"));
        }
        self.workers = Some(workers);
        Ok(self)
    }

    /// Requested worker count.
    pub fn worker_count(&self) -> Option<usize> {
        self.workers
    }

    /// Engine name.
    pub fn engine_name(&self) -> &str {
        self.engine.name()
    }

    pub(crate) fn submit(&self, bytecode: &Bytecode, graph: Arc<dyn Graph>) -> Result<ComputerResult> {
        self.engine.submit(bytecode, graph, self.workers)
    }
}

impl fmt::Debug for Computer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Computer")
            .field("engine", &self.engine.name())
            .field("workers", &self.workers)
            .finish()
    }
}
