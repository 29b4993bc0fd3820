#![allow(missing_docs)]

mod support;

use std::sync::atomic::Ordering;
use std::sync::Arc;

use sombra_traverse::{
    process::strategy::{RequirementsStrategy, SackStrategy},
    process::{Computer, Requirements, Strategy, TraverserRequirement},
    structure::{ElementKind, Graph},
    MemoryGraph, TraversalError, TraversalSource, Value,
};
use support::{modern, sorted_strings, BrokenComputer, EmbeddedConnection, SerialComputer};

fn client_and_server() -> (Arc<dyn Graph>, TraversalSource, Arc<EmbeddedConnection>) {
    let graph: Arc<dyn Graph> = modern();
    let connection = Arc::new(EmbeddedConnection::new(Arc::clone(&graph)));
    let g = TraversalSource::new(Arc::clone(&graph)).with_remote(connection.clone());
    (graph, g, connection)
}

#[test]
fn remote_results_are_rebound_to_the_local_graph() -> Result<(), TraversalError> {
    let (graph, g, _) = client_and_server();
    let friends = g.v([1]).out(["knows"]).to_list()?;
    assert_eq!(friends.len(), 2);
    for value in &friends {
        match value {
            Value::Vertex(v) => assert!(v.is_attached_to(graph.id())),
            other => panic!("expected a vertex, got {other}"),
        }
    }
    assert_eq!(sorted_strings(friends), vec!["v[2]", "v[4]"]);
    Ok(())
}

#[test]
fn rehydration_preserves_element_kind() -> Result<(), TraversalError> {
    let (graph, g, _) = client_and_server();
    let edges = g.e([]).to_list()?;
    assert_eq!(edges.len(), 4);
    assert!(edges
        .iter()
        .all(|e| matches!(e, Value::Edge(e) if e.is_attached_to(graph.id()))));

    let names = g.v([]).has_label(["person"]).values(["name"]).to_list()?;
    assert_eq!(sorted_strings(names), vec!["josh", "marko", "vadas"]);
    Ok(())
}

#[test]
fn submission_is_lazy_and_bytecode_omits_the_connection() -> Result<(), TraversalError> {
    let (_, g, connection) = client_and_server();
    let t = g.v([1]).out(["knows"]);
    assert!(t.bytecode().source_instructions().is_empty());
    assert_eq!(connection.submissions(), 0);
    t.to_list()?;
    assert_eq!(connection.submissions(), 1);
    Ok(())
}

#[test]
fn missing_local_element_names_kind_and_id() {
    let server: Arc<dyn Graph> = modern();
    let client: Arc<dyn Graph> = Arc::new(MemoryGraph::new());
    let g = TraversalSource::new(client)
        .with_remote(Arc::new(EmbeddedConnection::new(server)));
    let err = g.v([1]).to_list().unwrap_err();
    assert!(matches!(
        err,
        TraversalError::ElementNotFound { kind: ElementKind::Vertex, id: 1 }
    ));
    assert!(err.to_string().contains("vertex 1"));
}

#[test]
fn without_a_local_graph_references_pass_through() -> Result<(), TraversalError> {
    let server: Arc<dyn Graph> = modern();
    let g = TraversalSource::empty().with_remote(Arc::new(EmbeddedConnection::new(server)));
    let values = g.v([1]).to_list()?;
    match values.as_slice() {
        [Value::Vertex(v)] => {
            assert_eq!(v.id().0, 1);
            assert!(v.graph().is_none());
        }
        other => panic!("unexpected {other:?}"),
    }
    Ok(())
}

#[test]
fn one_bulk_is_honored_across_the_wire() -> Result<(), TraversalError> {
    let (_, g, _) = client_and_server();
    let mut t = g.with_bulk(false).v([]).out(["created"]);
    let mut multiplicities = Vec::new();
    while let Some(traverser) = t.next_traverser()? {
        multiplicities.push(traverser.bulk());
    }
    assert_eq!(multiplicities, vec![1, 1]);
    Ok(())
}

#[test]
fn configured_strategies_reach_the_server() -> Result<(), TraversalError> {
    let (_, g, _) = client_and_server();
    let sack: Arc<dyn Strategy> = Arc::new(SackStrategy::new(Value::Int(5)));
    let local = TraversalSource::new(modern()).with_strategies([Arc::clone(&sack)])?;
    assert_eq!(local.v([1]).sack().to_list()?, vec![Value::Int(5)]);

    let remote = g.with_strategies([sack])?;
    assert_eq!(remote.v([1]).sack().to_list()?, vec![Value::Int(5)]);

    let one_bulk: Requirements = [TraverserRequirement::OneBulk].into_iter().collect();
    let requirements: Arc<dyn Strategy> = Arc::new(RequirementsStrategy::new(one_bulk));
    let mut t = g.with_strategies([requirements])?.v([]).out(["created"]);
    let mut multiplicities = Vec::new();
    while let Some(traverser) = t.next_traverser()? {
        multiplicities.push(traverser.bulk());
    }
    assert_eq!(multiplicities, vec![1, 1]);
    Ok(())
}

#[test]
fn replacing_a_connection_closes_the_old_one() -> Result<(), TraversalError> {
    let graph: Arc<dyn Graph> = modern();
    let g = TraversalSource::new(Arc::clone(&graph));
    let first = Arc::new(EmbeddedConnection::new(Arc::clone(&graph)));
    let second = Arc::new(EmbeddedConnection::new(Arc::clone(&graph)));
    let first_closes = first.close_counter();
    let second_closes = second.close_counter();

    let _remote = g.with_remote(first);
    assert!(g.has_remote());
    let replaced = g.with_remote(second);
    assert_eq!(first_closes.load(Ordering::SeqCst), 1);
    assert_eq!(second_closes.load(Ordering::SeqCst), 0);
    assert_eq!(replaced.v([1]).count().to_list()?, vec![Value::Int(1)]);

    g.close()?;
    g.close()?;
    assert_eq!(second_closes.load(Ordering::SeqCst), 1);
    assert!(!g.has_remote());
    Ok(())
}

#[test]
fn close_failures_during_replacement_are_swallowed() -> Result<(), TraversalError> {
    let graph: Arc<dyn Graph> = modern();
    let g = TraversalSource::new(Arc::clone(&graph));
    let flaky = Arc::new(EmbeddedConnection::new(Arc::clone(&graph)).failing_close());
    let closes = flaky.close_counter();
    g.with_remote(flaky);

    let healthy = g.with_remote(Arc::new(EmbeddedConnection::new(Arc::clone(&graph))));
    assert_eq!(closes.load(Ordering::SeqCst), 1);
    assert_eq!(healthy.v([]).count().to_list()?, vec![Value::Int(4)]);
    Ok(())
}

#[test]
fn computer_runs_the_bytecode_with_requested_workers() -> Result<(), TraversalError> {
    let graph: Arc<dyn Graph> = modern();
    let engine = Arc::new(SerialComputer::default());
    let g = TraversalSource::new(graph).with_computer(Computer::new(engine.clone()).workers(4)?);

    let t = g.v([]).has_label(["person"]).count();
    assert_eq!(
        t.bytecode().source_instructions()[0].to_string(),
        "withComputer(\"serial\", 4)"
    );
    assert_eq!(t.to_list()?, vec![Value::Int(3)]);
    assert_eq!(engine.runs.load(Ordering::SeqCst), 1);
    assert_eq!(*engine.last_workers.lock(), Some(4));
    Ok(())
}

#[test]
fn computer_needs_a_local_graph() {
    let engine = Arc::new(SerialComputer::default());
    let g = TraversalSource::empty().with_computer(Computer::new(engine.clone()));
    let err = g.inject([1]).to_list().unwrap_err();
    assert_eq!(err.code(), "NoGraph");
    assert_eq!(engine.runs.load(Ordering::SeqCst), 0);
}

#[test]
fn computer_failures_pass_through() {
    let graph: Arc<dyn Graph> = modern();
    let g = TraversalSource::new(graph).with_computer(Computer::new(Arc::new(BrokenComputer)));
    let err = g.v([]).to_list().unwrap_err();
    assert_eq!(err.code(), "Computer");
    assert!(err.to_string().contains("worker pool exhausted"));
}

#[test]
fn zero_workers_is_rejected() {
    let err = Computer::new(Arc::new(SerialComputer::default()))
        .workers(0)
        .unwrap_err();
    assert_eq!(err.code(), "InvalidArgument");
}
