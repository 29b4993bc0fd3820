#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use sombra_traverse::{
    process::{
        stream_of, ComputerResult, GraphComputer, RemoteConnection, Strategy, TraverserStream,
    },
    process::strategy::ReferenceElementStrategy,
    structure::{ElementId, Graph, MemoryGraph},
    Bytecode, Result, TraversalError, TraversalSource, Traverser, Value,
};

/// Small social graph:
/// 1 marko -knows-> 2 vadas, 1 marko -knows-> 4 josh, 1 marko -created-> 3 lop,
/// 4 josh -created-> 3 lop.
pub fn modern() -> Arc<MemoryGraph> {
    let graph = MemoryGraph::new();
    let mut ids = Vec::new();
    for (label, name, age) in [
        ("person", "marko", 29),
        ("person", "vadas", 27),
        ("software", "lop", 0),
        ("person", "josh", 32),
    ] {
        let v = graph.add_vertex(label).expect("add vertex");
        graph
            .set_property(ElementId::Vertex(v.id()), "name", Value::from(name))
            .expect("set name");
        if age > 0 {
            graph
                .set_property(ElementId::Vertex(v.id()), "age", Value::from(age))
                .expect("set age");
        }
        ids.push(v.id());
    }
    graph.add_edge("knows", ids[0], ids[1]).expect("edge");
    graph.add_edge("knows", ids[0], ids[3]).expect("edge");
    graph.add_edge("created", ids[0], ids[2]).expect("edge");
    graph.add_edge("created", ids[3], ids[2]).expect("edge");
    Arc::new(graph)
}

/// In-process "server": bytecode and results both cross a JSON wire boundary
/// and the server answers with id-only element references.
pub struct EmbeddedConnection {
    server: TraversalSource,
    submissions: AtomicUsize,
    closes: Arc<AtomicUsize>,
    fail_close: bool,
}

impl EmbeddedConnection {
    pub fn new(graph: Arc<dyn Graph>) -> Self {
        let finalize: Arc<dyn Strategy> = Arc::new(ReferenceElementStrategy);
        Self {
            server: TraversalSource::new(graph)
                .with_strategies([finalize])
                .expect("built-in strategy"),
            submissions: AtomicUsize::new(0),
            closes: Arc::new(AtomicUsize::new(0)),
            fail_close: false,
        }
    }

    pub fn failing_close(mut self) -> Self {
        self.fail_close = true;
        self
    }

    pub fn submissions(&self) -> usize {
        self.submissions.load(Ordering::SeqCst)
    }

    pub fn close_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.closes)
    }
}

impl RemoteConnection for EmbeddedConnection {
    fn submit(&self, bytecode: &Bytecode) -> Result<TraverserStream> {
        self.submissions.fetch_add(1, Ordering::SeqCst);
        let received = Bytecode::from_wire(&bytecode.to_wire()?)?;
        let results = self.server.replay(&received)?.to_traversers()?;
        let wire = serde_json::to_string(&results)?;
        let back: Vec<Traverser> = serde_json::from_str(&wire)?;
        Ok(stream_of(back))
    }

    fn close(&self) -> Result<()> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        if self.fail_close {
            return Err(TraversalError::Remote("connection reset by peer".into()));
        }
        Ok(())
    }
}

/// Bulk-parallel engine double that replays bytecode serially.
#[derive(Default)]
pub struct SerialComputer {
    pub last_workers: Mutex<Option<usize>>,
    pub runs: AtomicUsize,
}

impl GraphComputer for SerialComputer {
    fn name(&self) -> &str {
        "serial"
    }

    fn submit(
        &self,
        bytecode: &Bytecode,
        graph: Arc<dyn Graph>,
        workers: Option<usize>,
    ) -> Result<ComputerResult> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        *self.last_workers.lock() = workers;
        let traversers = TraversalSource::new(Arc::clone(&graph))
            .replay(bytecode)?
            .to_traversers()?;
        Ok(ComputerResult {
            traversers,
            graph: Some(graph),
        })
    }
}

/// Engine double that always fails.
pub struct BrokenComputer;

impl GraphComputer for BrokenComputer {
    fn name(&self) -> &str {
        "broken"
    }

    fn submit(
        &self,
        _bytecode: &Bytecode,
        _graph: Arc<dyn Graph>,
        _workers: Option<usize>,
    ) -> Result<ComputerResult> {
        Err(TraversalError::Computer("worker pool exhausted".into()))
    }
}

pub fn sorted_strings(values: Vec<Value>) -> Vec<String> {
    let mut out: Vec<String> = values.iter().map(ToString::to_string).collect();
    out.sort();
    out
}
