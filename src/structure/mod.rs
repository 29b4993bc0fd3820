//! Graph capability consumed by the traversal machine.
//!
//! The machine never manages storage: start steps, mutation steps, and the
//! dispatch boundary reach the graph only through the [`Graph`] trait. Element
//! values ([`Vertex`], [`Edge`]) are lightweight references that remember which
//! graph instance issued them, so foreign references can be told apart from
//! local handles and re-bound at the dispatch boundary.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::value::Value;

mod memory;

pub use memory::MemoryGraph;

/// Vertex identifier.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Serialize, Deserialize)]
pub struct VertexId(pub u64);

/// Edge identifier.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Serialize, Deserialize)]
pub struct EdgeId(pub u64);

/// Identity of a graph instance within this process.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub struct GraphId(u64);

static NEXT_GRAPH_ID: AtomicU64 = AtomicU64::new(1);

impl GraphId {
    /// Allocates a process-unique graph identity.
    pub fn next() -> Self {
        GraphId(NEXT_GRAPH_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// Distinguishes vertices from edges.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Serialize, Deserialize)]
pub enum ElementKind {
    /// A vertex.
    Vertex,
    /// An edge.
    Edge,
}

impl fmt::Display for ElementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ElementKind::Vertex => f.write_str("vertex"),
            ElementKind::Edge => f.write_str("edge"),
        }
    }
}

/// Identifier of either element kind.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum ElementId {
    /// Vertex identifier.
    Vertex(VertexId),
    /// Edge identifier.
    Edge(EdgeId),
}

/// Edge direction relative to a vertex.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Serialize, Deserialize)]
pub enum Direction {
    /// Edges leaving the vertex.
    Out,
    /// Edges arriving at the vertex.
    In,
    /// Both directions.
    Both,
}

impl Direction {
    /// Instruction name used when recording the direction in bytecode.
    pub fn symbol(self) -> &'static str {
        match self {
            Direction::Out => "out",
            Direction::In => "in",
            Direction::Both => "both",
        }
    }
}

/// Vertex reference.
///
/// Equality considers only the identifier.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Vertex {
    id: VertexId,
    label: String,
    #[serde(skip)]
    graph: Option<GraphId>,
}

impl Vertex {
    /// Creates a vertex reference attached to `graph`.
    pub fn attached(id: VertexId, label: impl Into<String>, graph: GraphId) -> Self {
        Self {
            id,
            label: label.into(),
            graph: Some(graph),
        }
    }

    /// Creates a reference that is not bound to any graph instance.
    pub fn detached(id: VertexId, label: impl Into<String>) -> Self {
        Self {
            id,
            label: label.into(),
            graph: None,
        }
    }

    /// Vertex identifier.
    pub fn id(&self) -> VertexId {
        self.id
    }

    /// Vertex label.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Graph instance that issued this reference, if any.
    pub fn graph(&self) -> Option<GraphId> {
        self.graph
    }

    /// Returns true when this reference is a live handle into `graph`.
    pub fn is_attached_to(&self, graph: GraphId) -> bool {
        self.graph == Some(graph)
    }

    /// Drops the graph binding.
    pub fn detach(mut self) -> Self {
        self.graph = None;
        self
    }
}

impl PartialEq for Vertex {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl fmt::Display for Vertex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v[{}]", self.id.0)
    }
}

/// Edge reference.
///
/// Equality considers only the identifier.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Edge {
    id: EdgeId,
    label: String,
    out_v: VertexId,
    in_v: VertexId,
    #[serde(skip)]
    graph: Option<GraphId>,
}

impl Edge {
    /// Creates an edge reference attached to `graph`.
    pub fn attached(
        id: EdgeId,
        label: impl Into<String>,
        out_v: VertexId,
        in_v: VertexId,
        graph: GraphId,
    ) -> Self {
        Self {
            id,
            label: label.into(),
            out_v,
            in_v,
            graph: Some(graph),
        }
    }

    /// Creates a reference that is not bound to any graph instance.
    pub fn detached(id: EdgeId, label: impl Into<String>, out_v: VertexId, in_v: VertexId) -> Self {
        Self {
            id,
            label: label.into(),
            out_v,
            in_v,
            graph: None,
        }
    }

    /// Edge identifier.
    pub fn id(&self) -> EdgeId {
        self.id
    }

    /// Edge label.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Tail vertex.
    pub fn out_v(&self) -> VertexId {
        self.out_v
    }

    /// Head vertex.
    pub fn in_v(&self) -> VertexId {
        self.in_v
    }

    /// Graph instance that issued this reference, if any.
    pub fn graph(&self) -> Option<GraphId> {
        self.graph
    }

    /// Returns true when this reference is a live handle into `graph`.
    pub fn is_attached_to(&self, graph: GraphId) -> bool {
        self.graph == Some(graph)
    }

    /// Drops the graph binding.
    pub fn detach(mut self) -> Self {
        self.graph = None;
        self
    }
}

impl PartialEq for Edge {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl fmt::Display for Edge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "e[{}][{}-{}->{}]", self.id.0, self.out_v.0, self.label, self.in_v.0)
    }
}

/// Handle to a graph transaction.
pub trait Transaction: Send {
    /// Makes the changes since the transaction opened durable.
    fn commit(&mut self) -> Result<()>;
    /// Discards the changes since the transaction opened.
    fn rollback(&mut self) -> Result<()>;
    /// Returns true until the transaction is committed or rolled back.
    fn is_open(&self) -> bool;
}

/// Capability interface the traversal machine consumes from a graph engine.
pub trait Graph: Send + Sync {
    /// Identity of this graph instance.
    fn id(&self) -> GraphId;
    /// Looks up a vertex by identifier.
    fn vertex(&self, id: VertexId) -> Result<Option<Vertex>>;
    /// Looks up an edge by identifier.
    fn edge(&self, id: EdgeId) -> Result<Option<Edge>>;
    /// Scans every vertex in identifier order.
    fn vertices(&self) -> Result<Vec<Vertex>>;
    /// Scans every edge in identifier order.
    fn edges(&self) -> Result<Vec<Edge>>;
    /// Returns the edges incident to `vertex` in `direction`.
    fn incident_edges(&self, vertex: VertexId, direction: Direction) -> Result<Vec<Edge>>;
    /// Creates a vertex.
    fn add_vertex(&self, label: &str) -> Result<Vertex>;
    /// Creates an edge between two existing vertices.
    fn add_edge(&self, label: &str, out_v: VertexId, in_v: VertexId) -> Result<Edge>;
    /// Returns every property of an element.
    fn properties(&self, element: ElementId) -> Result<BTreeMap<String, Value>>;
    /// Sets a property on an element.
    fn set_property(&self, element: ElementId, key: &str, value: Value) -> Result<()>;
    /// Opens a transaction.
    fn tx(&self) -> Result<Box<dyn Transaction>>;
}

impl ElementId {
    /// Returns the identifier of an element-valued [`Value`].
    pub fn of(value: &Value) -> Option<Self> {
        match value {
            Value::Vertex(v) => Some(ElementId::Vertex(v.id())),
            Value::Edge(e) => Some(ElementId::Edge(e.id())),
            _ => None,
        }
    }
}
