#![allow(missing_docs)]

use std::sync::Arc;

use proptest::prelude::*;
use sombra_traverse::{
    structure::{Graph, VertexId},
    MemoryGraph, TraversalConfig, TraversalSource, Value,
};

fn random_graph(vertices: u64, edges: &[(u64, u64)]) -> Arc<dyn Graph> {
    let graph = MemoryGraph::new();
    for _ in 0..vertices {
        graph.add_vertex("node").unwrap();
    }
    for &(from, to) in edges {
        graph
            .add_edge("link", VertexId(from % vertices + 1), VertexId(to % vertices + 1))
            .unwrap();
    }
    Arc::new(graph)
}

fn sorted(values: Vec<Value>) -> Vec<i64> {
    let mut ints: Vec<i64> = values.iter().filter_map(Value::as_int).collect();
    ints.sort_unstable();
    ints
}

proptest! {
    #[test]
    fn prop_barrier_preserves_multiplicity(input in prop::collection::vec(0i64..5, 0..40)) {
        let g = TraversalSource::empty();
        let mut t = g.inject(input.clone()).barrier();
        let mut total = 0u64;
        while let Some(traverser) = t.next_traverser().unwrap() {
            prop_assert!(traverser.bulk() >= 1);
            total += traverser.bulk();
        }
        prop_assert_eq!(total, input.len() as u64);

        let mut expected = input.clone();
        expected.sort_unstable();
        let values = g.inject(input).barrier().to_list().unwrap();
        prop_assert_eq!(sorted(values), expected);
    }

    #[test]
    fn prop_one_bulk_never_merges(input in prop::collection::vec(0i64..3, 0..30)) {
        let g = TraversalSource::empty().with_bulk(false);
        let mut t = g.inject(input.clone()).barrier();
        let mut seen = 0usize;
        while let Some(traverser) = t.next_traverser().unwrap() {
            prop_assert_eq!(traverser.bulk(), 1);
            seen += 1;
        }
        prop_assert_eq!(seen, input.len());
    }

    #[test]
    fn prop_limit_counts_bulk(input in prop::collection::vec(0i64..4, 0..30), limit in 0u64..40) {
        let g = TraversalSource::empty();
        let values = g.inject(input.clone()).barrier().limit(limit).to_list().unwrap();
        prop_assert_eq!(values.len() as u64, limit.min(input.len() as u64));
    }

    #[test]
    fn prop_lazy_barriers_do_not_change_results(
        vertices in 1u64..8,
        edges in prop::collection::vec((0u64..8, 0u64..8), 0..30),
        barrier_size in 1usize..5,
    ) {
        let graph = random_graph(vertices, &edges);
        let config = TraversalConfig { barrier_size, ..TraversalConfig::default() };
        let bulked = TraversalSource::new(Arc::clone(&graph)).with_config(config);
        let unbulked = TraversalSource::new(graph).with_bulk(false);

        let with_barriers = bulked.v([]).out([] as [&str; 0]).out([] as [&str; 0]).id().to_list().unwrap();
        let without = unbulked.v([]).out([] as [&str; 0]).out([] as [&str; 0]).id().to_list().unwrap();
        prop_assert_eq!(sorted(with_barriers), sorted(without));

        let count = bulked.v([]).out([] as [&str; 0]).count().to_list().unwrap();
        prop_assert_eq!(count, vec![Value::Int(edges.len() as i64)]);
    }
}
