//! In-memory graph used as the reference [`Graph`] implementation.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::RwLock;

use super::{
    Direction, Edge, EdgeId, ElementId, Graph, GraphId, Transaction, Vertex, VertexId,
};
use crate::error::{Result, TraversalError};
use crate::value::Value;

#[derive(Clone, Debug, Default)]
struct VertexRecord {
    label: String,
    props: BTreeMap<String, Value>,
    out_edges: Vec<EdgeId>,
    in_edges: Vec<EdgeId>,
}

#[derive(Clone, Debug)]
struct EdgeRecord {
    label: String,
    out_v: VertexId,
    in_v: VertexId,
    props: BTreeMap<String, Value>,
}

#[derive(Clone, Debug, Default)]
struct GraphState {
    next_vertex: u64,
    next_edge: u64,
    vertices: BTreeMap<VertexId, VertexRecord>,
    edges: BTreeMap<EdgeId, EdgeRecord>,
}

/// Thread-safe in-memory property graph.
///
/// Identifiers are allocated sequentially starting at 1. Transactions are
/// snapshot based: rolling back restores the state captured when the
/// transaction was opened, so overlapping transactions are not isolated from
/// each other.
pub struct MemoryGraph {
    id: GraphId,
    state: Arc<RwLock<GraphState>>,
}

impl MemoryGraph {
    /// Creates an empty graph.
    pub fn new() -> Self {
        Self {
            id: GraphId::next(),
            state: Arc::new(RwLock::new(GraphState::default())),
        }
    }

    /// Number of vertices.
    pub fn vertex_count(&self) -> usize {
        self.state.read().vertices.len()
    }

    /// Number of edges.
    pub fn edge_count(&self) -> usize {
        self.state.read().edges.len()
    }

    fn vertex_ref(&self, id: VertexId, record: &VertexRecord) -> Vertex {
        Vertex::attached(id, record.label.clone(), self.id)
    }

    fn edge_ref(&self, id: EdgeId, record: &EdgeRecord) -> Edge {
        Edge::attached(id, record.label.clone(), record.out_v, record.in_v, self.id)
    }
}

impl Default for MemoryGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl Graph for MemoryGraph {
    fn id(&self) -> GraphId {
        self.id
    }

    fn vertex(&self, id: VertexId) -> Result<Option<Vertex>> {
        let state = self.state.read();
        Ok(state.vertices.get(&id).map(|record| self.vertex_ref(id, record)))
    }

    fn edge(&self, id: EdgeId) -> Result<Option<Edge>> {
        let state = self.state.read();
        Ok(state.edges.get(&id).map(|record| self.edge_ref(id, record)))
    }

    fn vertices(&self) -> Result<Vec<Vertex>> {
        let state = self.state.read();
        Ok(state
            .vertices
            .iter()
            .map(|(id, record)| self.vertex_ref(*id, record))
            .collect())
    }

    fn edges(&self) -> Result<Vec<Edge>> {
        let state = self.state.read();
        Ok(state
            .edges
            .iter()
            .map(|(id, record)| self.edge_ref(*id, record))
            .collect())
    }

    fn incident_edges(&self, vertex: VertexId, direction: Direction) -> Result<Vec<Edge>> {
        let state = self.state.read();
        let Some(record) = state.vertices.get(&vertex) else {
            return Ok(Vec::new());
        };
        let ids: Vec<EdgeId> = match direction {
            Direction::Out => record.out_edges.clone(),
            Direction::In => record.in_edges.clone(),
            Direction::Both => record
                .out_edges
                .iter()
                .chain(record.in_edges.iter())
                .copied()
                .collect(),
        };
        Ok(ids
            .into_iter()
            .filter_map(|id| state.edges.get(&id).map(|record| self.edge_ref(id, record)))
            .collect())
    }

    fn add_vertex(&self, label: &str) -> Result<Vertex> {
        let mut state = self.state.write();
        state.next_vertex += 1;
        let id = VertexId(state.next_vertex);
        let record = VertexRecord {
            label: label.to_owned(),
            ..VertexRecord::default()
        };
        let vertex = self.vertex_ref(id, &record);
        state.vertices.insert(id, record);
        Ok(vertex)
    }

    fn add_edge(&self, label: &str, out_v: VertexId, in_v: VertexId) -> Result<Edge> {
        let mut state = self.state.write();
        if !state.vertices.contains_key(&out_v) || !state.vertices.contains_key(&in_v) {
            return Err(TraversalError::Graph(format!(
                "cannot connect v[{}] to v[{}]: endpoint does not exist",
                out_v.0, in_v.0
            )));
        }
        state.next_edge += 1;
        let id = EdgeId(state.next_edge);
        let record = EdgeRecord {
            label: label.to_owned(),
            out_v,
            in_v,
            props: BTreeMap::new(),
        };
        let edge = self.edge_ref(id, &record);
        state.edges.insert(id, record);
        if let Some(tail) = state.vertices.get_mut(&out_v) {
            tail.out_edges.push(id);
        }
        if let Some(head) = state.vertices.get_mut(&in_v) {
            head.in_edges.push(id);
        }
        Ok(edge)
    }

    fn properties(&self, element: ElementId) -> Result<BTreeMap<String, Value>> {
        let state = self.state.read();
        let props = match element {
            ElementId::Vertex(id) => state.vertices.get(&id).map(|r| r.props.clone()),
            ElementId::Edge(id) => state.edges.get(&id).map(|r| r.props.clone()),
        };
        Ok(props.unwrap_or_default())
    }

    fn set_property(&self, element: ElementId, key: &str, value: Value) -> Result<()> {
        let mut state = self.state.write();
        let props = match element {
            ElementId::Vertex(id) => state.vertices.get_mut(&id).map(|r| &mut r.props),
            ElementId::Edge(id) => state.edges.get_mut(&id).map(|r| &mut r.props),
        };
        match props {
            Some(props) => {
                props.insert(key.to_owned(), value);
                Ok(())
            }
            None => Err(TraversalError::Graph(format!(
                "cannot set '{key}' on missing element {element:?}"
            ))),
        }
    }

    fn tx(&self) -> Result<Box<dyn Transaction>> {
        let snapshot = self.state.read().clone();
        Ok(Box::new(MemoryTransaction {
            state: Arc::clone(&self.state),
            snapshot: Some(snapshot),
        }))
    }
}

struct MemoryTransaction {
    state: Arc<RwLock<GraphState>>,
    snapshot: Option<GraphState>,
}

impl Transaction for MemoryTransaction {
    fn commit(&mut self) -> Result<()> {
        if self.snapshot.take().is_none() {
            return Err(TraversalError::Graph("transaction already closed".into()));
        }
        Ok(())
    }

    fn rollback(&mut self) -> Result<()> {
        let Some(snapshot) = self.snapshot.take() else {
            return Err(TraversalError::Graph("transaction already closed".into()));
        };
        *self.state.write() = snapshot;
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.snapshot.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn adjacency_tracks_both_directions() {
        let graph = MemoryGraph::new();
        let a = graph.add_vertex("person").unwrap();
        let b = graph.add_vertex("person").unwrap();
        let e = graph.add_edge("knows", a.id(), b.id()).unwrap();

        let out = graph.incident_edges(a.id(), Direction::Out).unwrap();
        assert_eq!(out, vec![e.clone()]);
        assert!(graph.incident_edges(a.id(), Direction::In).unwrap().is_empty());
        assert_eq!(graph.incident_edges(b.id(), Direction::Both).unwrap(), vec![e]);
    }

    #[test]
    fn edges_require_existing_endpoints() {
        let graph = MemoryGraph::new();
        let a = graph.add_vertex("person").unwrap();
        let err = graph.add_edge("knows", a.id(), VertexId(99)).unwrap_err();
        assert!(matches!(err, TraversalError::Graph(_)));
    }

    #[test]
    fn rollback_restores_snapshot() {
        let graph = MemoryGraph::new();
        graph.add_vertex("keep").unwrap();
        let mut tx = graph.tx().unwrap();
        graph.add_vertex("drop").unwrap();
        assert_eq!(graph.vertex_count(), 2);
        tx.rollback().unwrap();
        assert!(!tx.is_open());
        assert_eq!(graph.vertex_count(), 1);
        assert!(tx.commit().is_err());
    }

    #[test]
    fn references_are_attached_to_issuing_graph() {
        let graph = MemoryGraph::new();
        let other = MemoryGraph::new();
        let v = graph.add_vertex("person").unwrap();
        assert!(v.is_attached_to(graph.id()));
        assert!(!v.is_attached_to(other.id()));
        assert!(!v.detach().is_attached_to(graph.id()));
    }
}
