use std::collections::VecDeque;
use std::sync::Arc;

use tracing::debug;

use super::{Step, StepContext, StepKind, Upstream};
use crate::error::{Result, TraversalError};
use crate::process::computer::Computer;
use crate::process::remote::{stream_of, RemoteConnection, TraverserStream};
use crate::process::traverser::Traverser;
use crate::profile::{profile_timer, record_profile_timer, TraversalProfileKind};
use crate::structure::{ElementKind, Graph};
use crate::value::Value;

/// Start step that re-admits traversers produced by another engine.
///
/// Element values are re-resolved by id through the local graph, keeping
/// their kind; other values pass through. Without a local graph every value
/// passes through unchanged. Under `OneBulk` bulked results are unrolled.
///
/// A clone starts with no results.
pub struct ReadmissionStep {
    results: Option<TraverserStream>,
    unrolled: VecDeque<Traverser>,
}

impl ReadmissionStep {
    /// Wraps a result stream.
    pub fn new(results: TraverserStream) -> Self {
        Self {
            results: Some(results),
            unrolled: VecDeque::new(),
        }
    }

    fn empty() -> Self {
        Self {
            results: None,
            unrolled: VecDeque::new(),
        }
    }

    fn rehydrate(traverser: &mut Traverser, graph: &dyn Graph) -> Result<()> {
        let local = match traverser.value() {
            Value::Vertex(v) if !v.is_attached_to(graph.id()) => Value::Vertex(
                graph
                    .vertex(v.id())?
                    .ok_or(TraversalError::ElementNotFound {
                        kind: ElementKind::Vertex,
                        id: v.id().0,
                    })?,
            ),
            Value::Edge(e) if !e.is_attached_to(graph.id()) => Value::Edge(
                graph
                    .edge(e.id())?
                    .ok_or(TraversalError::ElementNotFound {
                        kind: ElementKind::Edge,
                        id: e.id().0,
                    })?,
            ),
            _ => return Ok(()),
        };
        traverser.set_value(local);
        Ok(())
    }
}

impl Clone for ReadmissionStep {
    fn clone(&self) -> Self {
        Self::empty()
    }
}

impl Step for ReadmissionStep {
    fn name(&self) -> &'static str {
        "ReadmissionStep"
    }

    fn kind(&self) -> StepKind {
        StepKind::Start
    }

    fn process_next(
        &mut self,
        _upstream: &mut Upstream<'_>,
        ctx: &StepContext<'_>,
    ) -> Result<Option<Traverser>> {
        if let Some(next) = self.unrolled.pop_front() {
            return Ok(Some(next));
        }
        let Some(results) = self.results.as_mut() else {
            return Ok(None);
        };
        let Some(mut traverser) = results.next().transpose()? else {
            self.results = None;
            return Ok(None);
        };
        if let Some(graph) = ctx.graph {
            Self::rehydrate(&mut traverser, &**graph)?;
        }
        if ctx.one_bulk() && traverser.bulk() > 1 {
            self.unrolled.extend(traverser.unroll());
            return Ok(self.unrolled.pop_front());
        }
        Ok(Some(traverser))
    }
}

/// Submits the traversal's bytecode to a remote server on first pull and
/// streams back the results.
pub struct RemoteStep {
    connection: Arc<dyn RemoteConnection>,
    readmission: Option<ReadmissionStep>,
}

impl RemoteStep {
    /// Creates the step in the not-yet-submitted state.
    pub fn new(connection: Arc<dyn RemoteConnection>) -> Self {
        Self {
            connection,
            readmission: None,
        }
    }

    /// Returns true once the bytecode has been submitted.
    pub fn is_submitted(&self) -> bool {
        self.readmission.is_some()
    }
}

impl Clone for RemoteStep {
    fn clone(&self) -> Self {
        Self::new(Arc::clone(&self.connection))
    }
}

impl Step for RemoteStep {
    fn name(&self) -> &'static str {
        "RemoteStep"
    }

    fn kind(&self) -> StepKind {
        StepKind::Dispatch
    }

    fn process_next(
        &mut self,
        upstream: &mut Upstream<'_>,
        ctx: &StepContext<'_>,
    ) -> Result<Option<Traverser>> {
        if self.readmission.is_none() {
            debug!(
                fingerprint = ctx.bytecode.fingerprint(),
                "traversal.dispatch.submit"
            );
            let start = profile_timer();
            let results = self.connection.submit(ctx.bytecode)?;
            record_profile_timer(TraversalProfileKind::Dispatch, start);
            self.readmission = Some(ReadmissionStep::new(results));
        }
        match self.readmission.as_mut() {
            Some(readmission) => readmission.process_next(upstream, ctx),
            None => Ok(None),
        }
    }
}

/// Runs the traversal on a bulk-parallel engine on first pull and re-admits
/// the result traversers.
pub struct ComputerStep {
    computer: Computer,
    readmission: Option<ReadmissionStep>,
    result_graph: Option<Arc<dyn Graph>>,
}

impl ComputerStep {
    /// Creates the step in the not-yet-submitted state.
    pub fn new(computer: Computer) -> Self {
        Self {
            computer,
            readmission: None,
            result_graph: None,
        }
    }

    /// Graph returned by the engine, once submitted.
    pub fn result_graph(&self) -> Option<&Arc<dyn Graph>> {
        self.result_graph.as_ref()
    }
}

impl Clone for ComputerStep {
    fn clone(&self) -> Self {
        Self::new(self.computer.clone())
    }
}

impl Step for ComputerStep {
    fn name(&self) -> &'static str {
        "ComputerStep"
    }

    fn kind(&self) -> StepKind {
        StepKind::Dispatch
    }

    fn process_next(
        &mut self,
        upstream: &mut Upstream<'_>,
        ctx: &StepContext<'_>,
    ) -> Result<Option<Traverser>> {
        if self.readmission.is_none() {
            let graph = ctx.graph_handle(self.name())?;
            debug!(
                fingerprint = ctx.bytecode.fingerprint(),
                engine = self.computer.engine_name(),
                workers = ?self.computer.worker_count(),
                "traversal.dispatch.submit"
            );
            let start = profile_timer();
            let result = self.computer.submit(ctx.bytecode, graph)?;
            record_profile_timer(TraversalProfileKind::Dispatch, start);
            self.result_graph = result.graph;
            self.readmission = Some(ReadmissionStep::new(stream_of(result.traversers)));
        }
        match self.readmission.as_mut() {
            Some(readmission) => readmission.process_next(upstream, ctx),
            None => Ok(None),
        }
    }

    fn describe(&self) -> String {
        format!("ComputerStep({})", self.computer.engine_name())
    }
}

#[cfg(test)]
mod tests {
    use std::num::NonZeroU64;

    use super::*;
    use crate::config::TraversalConfig;
    use crate::io::JsonLinesCodec;
    use crate::process::bytecode::Bytecode;
    use crate::process::step::StepChain;
    use crate::process::traverser::{Requirements, TraverserRequirement};
    use crate::structure::{MemoryGraph, Vertex, VertexId};

    fn drain(
        step: ReadmissionStep,
        graph: Option<Arc<dyn Graph>>,
        reqs: Requirements,
    ) -> Result<Vec<Traverser>> {
        let bytecode = Bytecode::new();
        let config = TraversalConfig::default();
        let ctx = StepContext {
            graph: graph.as_ref(),
            requirements: &reqs,
            sack: None,
            bytecode: &bytecode,
            config: &config,
            codec: &JsonLinesCodec,
        };
        let mut chain = StepChain::new();
        chain.add_last(Box::new(step));
        let mut out = Vec::new();
        while let Some(t) = chain.next_traverser(&ctx)? {
            out.push(t);
        }
        Ok(out)
    }

    #[test]
    fn rehydrates_foreign_references_preserving_kind() {
        let graph = MemoryGraph::new();
        let v = graph.add_vertex("person").unwrap();
        let w = graph.add_vertex("person").unwrap();
        let e = graph.add_edge("knows", v.id(), w.id()).unwrap();
        let graph: Arc<dyn Graph> = Arc::new(graph);

        let results = vec![
            Traverser::new(Value::Vertex(v.clone().detach())),
            Traverser::new(Value::Edge(e.clone().detach())),
            Traverser::new(Value::from("plain")),
        ];
        let step = ReadmissionStep::new(stream_of(results));
        let out = drain(step, Some(graph.clone()), Requirements::new()).unwrap();
        match out[0].value() {
            Value::Vertex(local) => assert!(local.is_attached_to(graph.id())),
            other => panic!("expected vertex, got {other}"),
        }
        match out[1].value() {
            Value::Edge(local) => assert!(local.is_attached_to(graph.id())),
            other => panic!("expected edge, got {other}"),
        }
        assert_eq!(out[2].value(), &Value::from("plain"));
    }

    #[test]
    fn missing_local_element_is_illegal_state() {
        let graph: Arc<dyn Graph> = Arc::new(MemoryGraph::new());
        let stray = Traverser::new(Value::Vertex(Vertex::detached(VertexId(42), "ghost")));
        let step = ReadmissionStep::new(stream_of(vec![stray]));
        let err = drain(step, Some(graph), Requirements::new()).unwrap_err();
        assert!(matches!(
            err,
            TraversalError::ElementNotFound { kind: ElementKind::Vertex, id: 42 }
        ));
        assert_eq!(err.kind(), crate::error::ErrorKind::IllegalState);
    }

    #[test]
    fn no_local_graph_passes_values_through() {
        let stray = Traverser::new(Value::Vertex(Vertex::detached(VertexId(42), "ghost")));
        let step = ReadmissionStep::new(stream_of(vec![stray.clone()]));
        let out = drain(step, None, Requirements::new()).unwrap();
        assert_eq!(out, vec![stray]);
    }

    struct Fixed(Vec<Traverser>);

    impl RemoteConnection for Fixed {
        fn submit(&self, _bytecode: &Bytecode) -> Result<TraverserStream> {
            Ok(stream_of(self.0.clone()))
        }

        fn close(&self) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn clones_start_unsubmitted() {
        let mut chain = StepChain::new();
        chain.add_last(Box::new(RemoteStep::new(Arc::new(Fixed(vec![Traverser::new(
            Value::Int(7),
        )])))));
        let bytecode = Bytecode::new();
        let config = TraversalConfig::default();
        let reqs = Requirements::new();
        let ctx = StepContext {
            graph: None,
            requirements: &reqs,
            sack: None,
            bytecode: &bytecode,
            config: &config,
            codec: &JsonLinesCodec,
        };
        assert!(chain.next_traverser(&ctx).unwrap().is_some());
        let (_, submitted) = chain.find::<RemoteStep>().unwrap();
        assert!(submitted.is_submitted());
        let copy = chain.clone();
        let (_, fresh) = copy.find::<RemoteStep>().unwrap();
        assert!(!fresh.is_submitted());
    }

    #[test]
    fn one_bulk_unrolls_results() {
        let bulked = Traverser::with_bulk(Value::Int(1), NonZeroU64::new(3).unwrap());
        let step = ReadmissionStep::new(stream_of(vec![bulked]));
        let reqs: Requirements = [TraverserRequirement::OneBulk].into_iter().collect();
        let out = drain(step, None, reqs).unwrap();
        assert_eq!(out.len(), 3);
        assert!(out.iter().all(|t| t.bulk() == 1));
    }
}
