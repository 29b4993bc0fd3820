//! Traversal sources: the immutable spawn point of every traversal.
//!
//! A source holds the graph handle, strategy set, and source-level bytecode.
//! Configuration methods and spawns never change the receiver; they work on a
//! clone whose strategy set and bytecode are shared until first written
//! (`Arc::make_mut`).

use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::warn;

use crate::config::TraversalConfig;
use crate::error::{Result, TraversalError};
use crate::io::{GraphCodec, JsonLinesCodec};
use crate::process::bytecode::{symbols, Argument, Bytecode};
use crate::process::computer::Computer;
use crate::process::remote::RemoteConnection;
use crate::process::step::{
    AddEdgeStartStep, AddVertexStartStep, GraphStep, InjectStep, LabelSource, ReadStep, Step,
    WriteStep,
};
use crate::process::strategy::{
    ComputerStrategy, RemoteStrategy, RequirementsStrategy, SackStrategy, Strategy,
    StrategyRegistry, TraversalStrategies,
};
use crate::process::translator::Translator;
use crate::process::traversal::Traversal;
use crate::process::traverser::TraverserRequirement;
use crate::structure::{ElementKind, Graph, Transaction};
use crate::value::Value;

pub(crate) struct SourceParts {
    pub(crate) graph: Option<Arc<dyn Graph>>,
    pub(crate) strategies: Arc<TraversalStrategies>,
    pub(crate) config: Arc<TraversalConfig>,
    pub(crate) codec: Arc<dyn GraphCodec>,
    pub(crate) bytecode: Bytecode,
}

/// Spawn point for traversals over one graph (or none, for remote-only use).
pub struct TraversalSource {
    graph: Option<Arc<dyn Graph>>,
    strategies: Arc<TraversalStrategies>,
    bytecode: Arc<Bytecode>,
    config: Arc<TraversalConfig>,
    codec: Arc<dyn GraphCodec>,
    registry: Arc<StrategyRegistry>,
    remote: Mutex<Option<Arc<dyn RemoteConnection>>>,
}

impl Clone for TraversalSource {
    fn clone(&self) -> Self {
        Self {
            graph: self.graph.clone(),
            strategies: Arc::clone(&self.strategies),
            bytecode: Arc::clone(&self.bytecode),
            config: Arc::clone(&self.config),
            codec: Arc::clone(&self.codec),
            registry: Arc::clone(&self.registry),
            remote: Mutex::new(self.remote.lock().clone()),
        }
    }
}

impl TraversalSource {
    /// Source over `graph` with the standard strategy set.
    pub fn new(graph: Arc<dyn Graph>) -> Self {
        Self::build(Some(graph))
    }

    /// Source with no local graph. Useful with [`with_remote`](Self::with_remote)
    /// or for traversals that only inject values.
    pub fn empty() -> Self {
        Self::build(None)
    }

    fn build(graph: Option<Arc<dyn Graph>>) -> Self {
        Self {
            graph,
            strategies: Arc::new(TraversalStrategies::standard()),
            bytecode: Arc::new(Bytecode::new()),
            config: Arc::new(TraversalConfig::default()),
            codec: Arc::new(JsonLinesCodec),
            registry: Arc::new(StrategyRegistry::default()),
            remote: Mutex::new(None),
        }
    }

    /// Local graph, when bound.
    pub fn graph(&self) -> Option<&Arc<dyn Graph>> {
        self.graph.as_ref()
    }

    /// Strategy set applied to spawned traversals.
    pub fn strategies(&self) -> &TraversalStrategies {
        &self.strategies
    }

    /// Source-level instruction log.
    pub fn bytecode(&self) -> &Bytecode {
        &self.bytecode
    }

    /// Execution settings.
    pub fn config(&self) -> &TraversalConfig {
        &self.config
    }

    /// Registry that rebuilds recorded strategies on replay.
    pub fn registry(&self) -> &StrategyRegistry {
        &self.registry
    }

    /// Returns true while a remote connection is installed.
    pub fn has_remote(&self) -> bool {
        self.remote.lock().is_some()
    }

    /// Returns true when this source and `other` share one bytecode and
    /// strategy allocation.
    pub fn shares_state_with(&self, other: &TraversalSource) -> bool {
        Arc::ptr_eq(&self.bytecode, &other.bytecode)
            && Arc::ptr_eq(&self.strategies, &other.strategies)
    }

    pub(crate) fn into_parts(self) -> SourceParts {
        SourceParts {
            graph: self.graph,
            strategies: self.strategies,
            config: self.config,
            codec: self.codec,
            bytecode: Arc::try_unwrap(self.bytecode).unwrap_or_else(|shared| (*shared).clone()),
        }
    }

    fn configured(&self, name: &'static str, args: Vec<Argument>) -> Self {
        let mut clone = self.clone();
        Arc::make_mut(&mut clone.bytecode).add_source(name, args);
        clone
    }

    /// Replaces the execution settings. Not recorded.
    pub fn with_config(&self, config: TraversalConfig) -> Self {
        let mut clone = self.clone();
        clone.config = Arc::new(config);
        clone
    }

    /// Replaces the codec used by `read` and `write`. Not recorded.
    pub fn with_io(&self, codec: Arc<dyn GraphCodec>) -> Self {
        let mut clone = self.clone();
        clone.codec = codec;
        clone
    }

    /// Replaces the registry used to rebuild recorded strategies. Not
    /// recorded; a server replaying this source's bytecode needs the same
    /// registrations.
    pub fn with_registry(&self, registry: StrategyRegistry) -> Self {
        let mut clone = self.clone();
        clone.registry = Arc::new(registry);
        clone
    }

    /// Adds strategies, replacing any with the same name.
    ///
    /// Each strategy is recorded with its configuration and must be
    /// rebuildable through [`registry`](Self::registry); otherwise nothing is
    /// added and [`TraversalError::UnknownStrategy`] is returned.
    pub fn with_strategies(
        &self,
        strategies: impl IntoIterator<Item = Arc<dyn Strategy>>,
    ) -> Result<Self> {
        let strategies: Vec<Arc<dyn Strategy>> = strategies.into_iter().collect();
        let mut args = Vec::with_capacity(strategies.len());
        for strategy in &strategies {
            let recorded = StrategyRegistry::record(strategy.as_ref());
            self.registry.resolve_argument(&recorded)?;
            args.push(recorded);
        }
        let mut clone = self.configured(symbols::WITH_STRATEGIES, args);
        let set = Arc::make_mut(&mut clone.strategies);
        for strategy in strategies {
            set.add(strategy);
        }
        Ok(clone)
    }

    /// Removes strategies by name; unknown names are ignored.
    pub fn without_strategies<'a>(&self, names: impl IntoIterator<Item = &'a str>) -> Self {
        let names: Vec<&str> = names.into_iter().collect();
        let args = names.iter().map(|n| Argument::from(*n)).collect();
        let mut clone = self.configured(symbols::WITHOUT_STRATEGIES, args);
        let set = Arc::make_mut(&mut clone.strategies);
        for name in names {
            set.remove(name);
        }
        clone
    }

    /// Runs spawned traversals on a bulk-parallel engine.
    pub fn with_computer(&self, computer: Computer) -> Self {
        let workers = computer
            .worker_count()
            .map_or(Argument::from(Value::Null), |w| {
                Argument::from(i64::try_from(w).unwrap_or(i64::MAX))
            });
        let args = vec![Argument::from(computer.engine_name()), workers];
        let mut clone = self.configured(symbols::WITH_COMPUTER, args);
        Arc::make_mut(&mut clone.strategies).add(Arc::new(ComputerStrategy::new(computer)));
        clone
    }

    /// Gives every traverser a sack seeded with `initial`.
    pub fn with_sack(&self, initial: impl Into<Value>) -> Self {
        let initial = initial.into();
        let mut clone = self.configured(symbols::WITH_SACK, vec![Argument::from(initial.clone())]);
        Arc::make_mut(&mut clone.strategies).add(Arc::new(SackStrategy::new(initial)));
        clone
    }

    /// `false` forbids bulking; `true` is the default and changes nothing.
    pub fn with_bulk(&self, bulk: bool) -> Self {
        if bulk {
            return self.clone();
        }
        let mut clone = self.configured(symbols::WITH_BULK, vec![Argument::from(false)]);
        RequirementsStrategy::add_requirements(
            Arc::make_mut(&mut clone.strategies),
            [TraverserRequirement::OneBulk],
        );
        clone
    }

    /// Tracks the path of every traverser.
    pub fn with_path(&self) -> Self {
        let mut clone = self.configured(symbols::WITH_PATH, vec![]);
        RequirementsStrategy::add_requirements(
            Arc::make_mut(&mut clone.strategies),
            [TraverserRequirement::Path],
        );
        clone
    }

    /// Sends spawned traversals to a remote server.
    ///
    /// The connection replaces any held by this source; the old one is closed
    /// and a failure to close it is logged, not returned. Not recorded: the
    /// server executes the bytecode locally.
    pub fn with_remote(&self, connection: Arc<dyn RemoteConnection>) -> Self {
        let previous = self.remote.lock().replace(Arc::clone(&connection));
        if let Some(previous) = previous.filter(|p| !Arc::ptr_eq(p, &connection)) {
            if let Err(err) = previous.close() {
                warn!(error = %err, "traversal.source.remote_close_failed");
            }
        }
        let mut clone = self.clone();
        Arc::make_mut(&mut clone.strategies).add(Arc::new(RemoteStrategy::new(connection)));
        clone
    }

    /// Releases the remote connection, if any. Closing twice is a no-op.
    pub fn close(&self) -> Result<()> {
        let connection = self.remote.lock().take();
        match connection {
            Some(connection) => connection.close(),
            None => Ok(()),
        }
    }

    /// Opens a transaction on the local graph.
    pub fn tx(&self) -> Result<Box<dyn Transaction>> {
        self.graph
            .as_ref()
            .ok_or(TraversalError::NoGraph { step: "tx" })?
            .tx()
    }

    /// Rebuilds a traversal on this source from recorded bytecode.
    pub fn replay(&self, bytecode: &Bytecode) -> Result<Traversal> {
        Translator::new((*self.registry).clone()).translate(self, bytecode)
    }

    fn spawn(&self, name: &'static str, args: Vec<Argument>, start: Box<dyn Step>) -> Traversal {
        let mut clone = self.clone();
        Arc::make_mut(&mut clone.bytecode).add_step(name, args);
        Traversal::bound(clone, start)
    }

    fn scan(&self, kind: ElementKind, ids: impl IntoIterator<Item = u64>) -> Traversal {
        let ids: Vec<u64> = ids.into_iter().collect();
        let name = match kind {
            ElementKind::Vertex => symbols::V,
            ElementKind::Edge => symbols::E,
        };
        let recorded: Result<Vec<Argument>> = ids.iter().map(|&id| Argument::try_from(id)).collect();
        match recorded {
            Ok(args) => self.spawn(name, args, Box::new(GraphStep::new(kind, ids))),
            Err(err) => self
                .spawn(name, vec![], Box::new(GraphStep::new(kind, vec![])))
                .with_error(err),
        }
    }

    /// Starts at the given vertices; no ids means every vertex.
    pub fn v(&self, ids: impl IntoIterator<Item = u64>) -> Traversal {
        self.scan(ElementKind::Vertex, ids)
    }

    /// Starts at the given edges; no ids means every edge.
    pub fn e(&self, ids: impl IntoIterator<Item = u64>) -> Traversal {
        self.scan(ElementKind::Edge, ids)
    }

    /// Adds a vertex with `label`.
    pub fn add_v(&self, label: impl Into<String>) -> Traversal {
        let label = label.into();
        self.spawn(
            symbols::ADD_V,
            vec![Argument::from(label.as_str())],
            Box::new(AddVertexStartStep::new(LabelSource::Constant(label))),
        )
    }

    /// Adds a vertex with the configured default label.
    pub fn add_v_default(&self) -> Traversal {
        self.spawn(
            symbols::ADD_V,
            vec![],
            Box::new(AddVertexStartStep::new(LabelSource::Default)),
        )
    }

    /// Adds a vertex labelled by the first result of `sub`.
    pub fn add_v_from(&self, sub: Traversal) -> Traversal {
        match sub.into_nested() {
            Ok((bytecode, chain)) => self.spawn(
                symbols::ADD_V,
                vec![Argument::Bytecode(bytecode)],
                Box::new(AddVertexStartStep::new(LabelSource::Traversal(chain))),
            ),
            Err(err) => self.add_v_default().with_error(err),
        }
    }

    /// Adds an edge with `label`; set its endpoints with `from_v` and `to_v`.
    pub fn add_e(&self, label: impl Into<String>) -> Traversal {
        let label = label.into();
        self.spawn(
            symbols::ADD_E,
            vec![Argument::from(label.as_str())],
            Box::new(AddEdgeStartStep::new(LabelSource::Constant(label))),
        )
    }

    /// Adds an edge labelled by the first result of `sub`, falling back to
    /// the configured default edge label.
    pub fn add_e_from(&self, sub: Traversal) -> Traversal {
        match sub.into_nested() {
            Ok((bytecode, chain)) => self.spawn(
                symbols::ADD_E,
                vec![Argument::Bytecode(bytecode)],
                Box::new(AddEdgeStartStep::new(LabelSource::Traversal(chain))),
            ),
            Err(err) => self
                .spawn(
                    symbols::ADD_E,
                    vec![],
                    Box::new(AddEdgeStartStep::new(LabelSource::Default)),
                )
                .with_error(err),
        }
    }

    /// Starts from arbitrary values.
    pub fn inject<V: Into<Value>>(&self, values: impl IntoIterator<Item = V>) -> Traversal {
        let values: Vec<Value> = values.into_iter().map(Into::into).collect();
        let args = values.iter().cloned().map(Argument::from).collect();
        self.spawn(symbols::INJECT, args, Box::new(InjectStep::new(values)))
    }

    /// Loads the file at `path` into the graph. Fails when `path` is empty.
    pub fn read(&self, path: impl AsRef<Path>) -> Result<Traversal> {
        let step = ReadStep::new(path.as_ref())?;
        let arg = Argument::from(path.as_ref().to_string_lossy().into_owned());
        Ok(self.spawn(symbols::READ, vec![arg], Box::new(step)))
    }

    /// Writes the graph to the file at `path`. Fails when `path` is empty.
    pub fn write(&self, path: impl AsRef<Path>) -> Result<Traversal> {
        let step = WriteStep::new(path.as_ref())?;
        let arg = Argument::from(path.as_ref().to_string_lossy().into_owned());
        Ok(self.spawn(symbols::WRITE, vec![arg], Box::new(step)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::structure::MemoryGraph;

    fn source() -> TraversalSource {
        TraversalSource::new(Arc::new(MemoryGraph::new()))
    }

    #[test]
    fn spawning_leaves_the_source_untouched() {
        let g = source().with_bulk(false);
        let before = g.bytecode().clone();
        let t = g.v([1, 2]).out(["knows"]);
        assert_eq!(g.bytecode(), &before);
        assert_eq!(t.bytecode().source_instructions(), before.source_instructions());
        assert_eq!(t.bytecode().step_instructions().len(), 2);
    }

    #[test]
    fn with_bulk_true_shares_state() {
        let g = source();
        let same = g.with_bulk(true);
        assert!(same.shares_state_with(&g));
        assert!(same.bytecode().is_empty());

        let one = g.with_bulk(false);
        assert!(!one.shares_state_with(&g));
        assert_eq!(one.bytecode().source_instructions()[0].to_string(), "withBulk(false)");
        assert!(one.strategies().get("RequirementsStrategy").is_some());
        assert!(g.strategies().get("RequirementsStrategy").is_none());
    }

    #[test]
    fn with_path_and_bulk_merge_requirements() {
        let g = source().with_bulk(false).with_path();
        let strategy = g.strategies().get("RequirementsStrategy").unwrap();
        let reqs = strategy
            .as_any()
            .downcast_ref::<RequirementsStrategy>()
            .unwrap()
            .requirements();
        assert!(reqs.contains(TraverserRequirement::OneBulk));
        assert!(reqs.contains(TraverserRequirement::Path));
    }

    #[test]
    fn empty_locator_is_an_argument_error() {
        let err = source().read("").err().unwrap();
        assert_eq!(err.code(), "InvalidArgument");
        let err = source().write("").err().unwrap();
        assert_eq!(err.code(), "InvalidArgument");
    }

    #[test]
    fn with_strategies_rejects_what_replay_cannot_rebuild() {
        let g = source();
        let custom: Arc<dyn Strategy> = Arc::new(ReferenceOnly);
        let err = g.with_strategies([custom.clone()]).err().unwrap();
        assert_eq!(err.code(), "UnknownStrategy");

        let mut registry = StrategyRegistry::default();
        registry.register_plain(ReferenceOnly);
        let g = g.with_registry(registry).with_strategies([custom]).unwrap();
        assert_eq!(
            g.bytecode().source_instructions()[0].to_string(),
            "withStrategies(\"ReferenceOnly\")"
        );
        assert!(g.strategies().get("ReferenceOnly").is_some());
    }

    #[test]
    fn configured_strategies_are_recorded_with_their_configuration() {
        let sack: Arc<dyn Strategy> = Arc::new(SackStrategy::new(Value::Int(5)));
        let g = source().with_strategies([sack]).unwrap();
        let recorded = &g.bytecode().source_instructions()[0];
        assert_eq!(
            recorded.to_string(),
            "withStrategies({configuration: 5, strategy: SackStrategy})"
        );
        let bytecode = g.inject([1]).sack().bytecode().clone();
        let replayed = source().replay(&bytecode).unwrap();
        assert_eq!(replayed.to_list().unwrap(), vec![Value::Int(5)]);
    }

    #[derive(Clone)]
    struct ReferenceOnly;

    impl Strategy for ReferenceOnly {
        fn name(&self) -> &'static str {
            "ReferenceOnly"
        }

        fn category(&self) -> crate::process::strategy::StrategyCategory {
            crate::process::strategy::StrategyCategory::Finalization
        }

        fn apply(&self, _target: &mut crate::process::strategy::RewriteTarget<'_>) -> Result<()> {
            Ok(())
        }

        fn as_any(&self) -> &dyn std::any::Any {
            self
        }
    }

    #[test]
    fn ids_beyond_the_signed_range_are_rejected() {
        let g = source();
        let err = g.v([u64::MAX]).to_list().unwrap_err();
        assert_eq!(err.code(), "InvalidArgument");
        let err = g.inject([1]).has_id([u64::MAX]).to_list().unwrap_err();
        assert_eq!(err.code(), "InvalidArgument");
        let err = g.inject([1]).limit(u64::MAX).to_list().unwrap_err();
        assert_eq!(err.code(), "InvalidArgument");

        let largest = g.v([i64::MAX as u64]);
        assert_eq!(
            largest.bytecode().step_instructions()[0].to_string(),
            format!("V({})", i64::MAX)
        );
        let replayed = g.replay(&largest.bytecode().clone()).unwrap();
        assert!(replayed.to_list().unwrap().is_empty());
    }

    #[test]
    fn tx_needs_a_graph() {
        let err = TraversalSource::empty().tx().err().unwrap();
        assert_eq!(err.code(), "NoGraph");
    }

    #[test]
    fn add_v_yields_one_vertex_then_exhaustion() {
        let g = source();
        let mut t = g.add_v("person");
        match t.try_next().unwrap() {
            Some(Value::Vertex(v)) => assert_eq!(v.label(), "person"),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(t.try_next().unwrap(), None);
    }
}
