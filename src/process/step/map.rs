use std::collections::VecDeque;

use super::{Step, StepContext, StepKind, Upstream};
use crate::error::{Result, TraversalError};
use crate::process::traverser::{Requirements, Traverser, TraverserRequirement};
use crate::structure::{Direction, ElementId, ElementKind};
use crate::value::Value;

/// Maps an element to its identifier.
#[derive(Clone, Copy, Default)]
pub struct IdStep;

impl Step for IdStep {
    fn name(&self) -> &'static str {
        "IdStep"
    }

    fn kind(&self) -> StepKind {
        StepKind::Map
    }

    fn process_next(
        &mut self,
        upstream: &mut Upstream<'_>,
        ctx: &StepContext<'_>,
    ) -> Result<Option<Traverser>> {
        let Some(traverser) = upstream.next(ctx)? else {
            return Ok(None);
        };
        let id = match traverser.value() {
            Value::Vertex(v) => v.id().0,
            Value::Edge(e) => e.id().0,
            other => {
                return Err(TraversalError::illegal_state(
                    self.name(),
                    format!("id() requires an element, found {other}"),
                ))
            }
        };
        Ok(Some(traverser.split(Value::try_from(id)?)))
    }
}

/// Maps an element to its label.
#[derive(Clone, Copy, Default)]
pub struct LabelStep;

impl Step for LabelStep {
    fn name(&self) -> &'static str {
        "LabelStep"
    }

    fn kind(&self) -> StepKind {
        StepKind::Map
    }

    fn process_next(
        &mut self,
        upstream: &mut Upstream<'_>,
        ctx: &StepContext<'_>,
    ) -> Result<Option<Traverser>> {
        let Some(traverser) = upstream.next(ctx)? else {
            return Ok(None);
        };
        let label = match traverser.value() {
            Value::Vertex(v) => v.label().to_owned(),
            Value::Edge(e) => e.label().to_owned(),
            other => {
                return Err(TraversalError::illegal_state(
                    self.name(),
                    format!("label() requires an element, found {other}"),
                ))
            }
        };
        Ok(Some(traverser.split(Value::String(label))))
    }
}

/// Emits property values of elements, or entries of maps.
///
/// With no keys every property is emitted in key order.
#[derive(Clone)]
pub struct ValuesStep {
    keys: Vec<String>,
    pending: VecDeque<Traverser>,
}

impl ValuesStep {
    /// Creates the step.
    pub fn new(keys: Vec<String>) -> Self {
        Self {
            keys,
            pending: VecDeque::new(),
        }
    }

    fn expand(&self, traverser: &Traverser, ctx: &StepContext<'_>) -> Result<Vec<Traverser>> {
        let properties = match traverser.value() {
            Value::Map(entries) => entries.clone(),
            element => match ElementId::of(element) {
                Some(id) => ctx.graph(self.name())?.properties(id)?,
                None => return Ok(Vec::new()),
            },
        };
        let selected: Vec<Value> = if self.keys.is_empty() {
            properties.into_values().collect()
        } else {
            self.keys
                .iter()
                .filter_map(|key| properties.get(key).cloned())
                .collect()
        };
        Ok(selected
            .into_iter()
            .map(|value| traverser.split(value))
            .collect())
    }
}

impl Step for ValuesStep {
    fn name(&self) -> &'static str {
        "ValuesStep"
    }

    fn kind(&self) -> StepKind {
        StepKind::FlatMap
    }

    fn process_next(
        &mut self,
        upstream: &mut Upstream<'_>,
        ctx: &StepContext<'_>,
    ) -> Result<Option<Traverser>> {
        loop {
            if let Some(next) = self.pending.pop_front() {
                return Ok(Some(next));
            }
            let Some(traverser) = upstream.next(ctx)? else {
                return Ok(None);
            };
            let expanded = self.expand(&traverser, ctx)?;
            self.pending.extend(expanded);
        }
    }

    fn describe(&self) -> String {
        format!("ValuesStep({:?})", self.keys)
    }

    fn reset(&mut self) {
        self.pending.clear();
    }
}

/// Replaces every value with a constant.
#[derive(Clone)]
pub struct ConstantStep {
    value: Value,
}

impl ConstantStep {
    /// Creates the step.
    pub fn new(value: Value) -> Self {
        Self { value }
    }
}

impl Step for ConstantStep {
    fn name(&self) -> &'static str {
        "ConstantStep"
    }

    fn kind(&self) -> StepKind {
        StepKind::Map
    }

    fn process_next(
        &mut self,
        upstream: &mut Upstream<'_>,
        ctx: &StepContext<'_>,
    ) -> Result<Option<Traverser>> {
        Ok(upstream
            .next(ctx)?
            .map(|traverser| traverser.split(self.value.clone())))
    }

    fn describe(&self) -> String {
        format!("ConstantStep({})", self.value)
    }
}

/// Maps a traverser to its sack value.
#[derive(Clone, Copy, Default)]
pub struct SackStep;

impl Step for SackStep {
    fn name(&self) -> &'static str {
        "SackStep"
    }

    fn kind(&self) -> StepKind {
        StepKind::Map
    }

    fn process_next(
        &mut self,
        upstream: &mut Upstream<'_>,
        ctx: &StepContext<'_>,
    ) -> Result<Option<Traverser>> {
        let Some(traverser) = upstream.next(ctx)? else {
            return Ok(None);
        };
        let sack = traverser.sack().cloned().ok_or_else(|| {
            TraversalError::illegal_state(self.name(), "sack() requires with_sack() on the source")
        })?;
        Ok(Some(traverser.split(sack)))
    }

    fn requirements(&self) -> Requirements {
        [TraverserRequirement::Sack].into_iter().collect()
    }
}

/// Walks from a vertex to its adjacent vertices.
#[derive(Clone)]
pub struct VertexStep {
    direction: Direction,
    labels: Vec<String>,
    pending: VecDeque<Traverser>,
}

impl VertexStep {
    /// Creates the step; empty `labels` follows every edge.
    pub fn new(direction: Direction, labels: Vec<String>) -> Self {
        Self {
            direction,
            labels,
            pending: VecDeque::new(),
        }
    }

    /// Direction followed.
    pub fn direction(&self) -> Direction {
        self.direction
    }

    fn expand(&self, traverser: &Traverser, ctx: &StepContext<'_>) -> Result<Vec<Traverser>> {
        let Value::Vertex(vertex) = traverser.value() else {
            return Err(TraversalError::illegal_state(
                self.name(),
                format!("{}() requires a vertex, found {}", self.direction.symbol(), traverser.value()),
            ));
        };
        let graph = ctx.graph(self.name())?;
        let mut out = Vec::new();
        for edge in graph.incident_edges(vertex.id(), self.direction)? {
            if !self.labels.is_empty() && !self.labels.iter().any(|l| l == edge.label()) {
                continue;
            }
            let other = match self.direction {
                Direction::Out => edge.in_v(),
                Direction::In => edge.out_v(),
                Direction::Both if edge.out_v() == vertex.id() => edge.in_v(),
                Direction::Both => edge.out_v(),
            };
            let adjacent = graph
                .vertex(other)?
                .ok_or(TraversalError::ElementNotFound {
                    kind: ElementKind::Vertex,
                    id: other.0,
                })?;
            out.push(traverser.split(Value::Vertex(adjacent)));
        }
        Ok(out)
    }
}

impl Step for VertexStep {
    fn name(&self) -> &'static str {
        "VertexStep"
    }

    fn kind(&self) -> StepKind {
        StepKind::FlatMap
    }

    fn process_next(
        &mut self,
        upstream: &mut Upstream<'_>,
        ctx: &StepContext<'_>,
    ) -> Result<Option<Traverser>> {
        loop {
            if let Some(next) = self.pending.pop_front() {
                return Ok(Some(next));
            }
            let Some(traverser) = upstream.next(ctx)? else {
                return Ok(None);
            };
            let expanded = self.expand(&traverser, ctx)?;
            self.pending.extend(expanded);
        }
    }

    fn describe(&self) -> String {
        format!("VertexStep({},{:?})", self.direction.symbol(), self.labels)
    }

    fn reset(&mut self) {
        self.pending.clear();
    }
}

/// Sets a property on each element it passes.
#[derive(Clone)]
pub struct PropertyStep {
    key: String,
    value: Value,
}

impl PropertyStep {
    /// Creates the step.
    pub fn new(key: impl Into<String>, value: Value) -> Self {
        Self {
            key: key.into(),
            value,
        }
    }
}

impl Step for PropertyStep {
    fn name(&self) -> &'static str {
        "PropertyStep"
    }

    fn kind(&self) -> StepKind {
        StepKind::SideEffect
    }

    fn process_next(
        &mut self,
        upstream: &mut Upstream<'_>,
        ctx: &StepContext<'_>,
    ) -> Result<Option<Traverser>> {
        let Some(traverser) = upstream.next(ctx)? else {
            return Ok(None);
        };
        let Some(id) = ElementId::of(traverser.value()) else {
            return Err(TraversalError::illegal_state(
                self.name(),
                format!("property() requires an element, found {}", traverser.value()),
            ));
        };
        ctx.graph(self.name())?
            .set_property(id, &self.key, self.value.clone())?;
        Ok(Some(traverser))
    }

    fn describe(&self) -> String {
        format!("PropertyStep({}={})", self.key, self.value)
    }

    fn mutates_graph(&self) -> bool {
        true
    }
}

/// Replaces attached elements with detached id-only references.
#[derive(Clone, Copy, Default)]
pub struct DetachStep;

impl Step for DetachStep {
    fn name(&self) -> &'static str {
        "DetachStep"
    }

    fn kind(&self) -> StepKind {
        StepKind::Map
    }

    fn process_next(
        &mut self,
        upstream: &mut Upstream<'_>,
        ctx: &StepContext<'_>,
    ) -> Result<Option<Traverser>> {
        let Some(mut traverser) = upstream.next(ctx)? else {
            return Ok(None);
        };
        let detached = match traverser.value() {
            Value::Vertex(v) => Some(Value::Vertex(v.clone().detach())),
            Value::Edge(e) => Some(Value::Edge(e.clone().detach())),
            _ => None,
        };
        if let Some(detached) = detached {
            traverser.set_value(detached);
        }
        Ok(Some(traverser))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::config::TraversalConfig;
    use crate::io::JsonLinesCodec;
    use crate::process::bytecode::Bytecode;
    use crate::process::step::{InjectStep, StepChain};
    use crate::structure::{Graph, MemoryGraph, Vertex, VertexId};

    fn run(
        graph: Option<&Arc<dyn Graph>>,
        requirements: Requirements,
        input: Vec<Value>,
        step: impl Step + 'static,
    ) -> Result<Vec<Value>> {
        let mut chain = StepChain::new();
        chain.add_last(Box::new(InjectStep::new(input)));
        chain.add_last(Box::new(step));
        let bytecode = Bytecode::new();
        let config = TraversalConfig::default();
        let ctx = StepContext {
            graph,
            requirements: &requirements,
            sack: None,
            bytecode: &bytecode,
            config: &config,
            codec: &JsonLinesCodec,
        };
        let mut values = Vec::new();
        while let Some(traverser) = chain.next_traverser(&ctx)? {
            values.push(traverser.into_value());
        }
        Ok(values)
    }

    #[test]
    fn id_and_label_read_elements() {
        let person = Value::Vertex(Vertex::detached(VertexId(3), "person"));
        let ids = run(None, Requirements::new(), vec![person.clone()], IdStep).unwrap();
        assert_eq!(ids, vec![Value::Int(3)]);
        let labels = run(None, Requirements::new(), vec![person], LabelStep).unwrap();
        assert_eq!(labels, vec![Value::from("person")]);
    }

    #[test]
    fn id_and_label_reject_non_elements() {
        let err = run(None, Requirements::new(), vec![Value::Int(3)], IdStep).unwrap_err();
        assert_eq!(err.code(), "IllegalState");
        assert!(err.to_string().contains("id() requires an element"));

        let err = run(None, Requirements::new(), vec![Value::from("x")], LabelStep).unwrap_err();
        assert_eq!(err.code(), "IllegalState");
        assert!(err.to_string().contains("label() requires an element"));
    }

    #[test]
    fn vertex_step_walks_only_from_vertices() {
        let memory = MemoryGraph::new();
        let a = memory.add_vertex("person").unwrap();
        let b = memory.add_vertex("software").unwrap();
        memory.add_edge("created", a.id(), b.id()).unwrap();
        let graph: Arc<dyn Graph> = Arc::new(memory);

        let walked = run(
            Some(&graph),
            Requirements::new(),
            vec![Value::Vertex(a.clone())],
            VertexStep::new(Direction::Out, vec![]),
        )
        .unwrap();
        assert!(matches!(walked.as_slice(), [Value::Vertex(v)] if v.id() == b.id()));

        let err = run(
            Some(&graph),
            Requirements::new(),
            vec![Value::Int(1)],
            VertexStep::new(Direction::Out, vec![]),
        )
        .unwrap_err();
        assert_eq!(err.code(), "IllegalState");
        assert!(err.to_string().contains("out() requires a vertex"));

        let err = run(
            None,
            Requirements::new(),
            vec![Value::Vertex(a)],
            VertexStep::new(Direction::In, vec![]),
        )
        .unwrap_err();
        assert_eq!(err.code(), "NoGraph");
    }

    #[test]
    fn sack_is_null_until_seeded() {
        let err = run(None, Requirements::new(), vec![Value::Int(1)], SackStep).unwrap_err();
        assert_eq!(err.code(), "IllegalState");

        let sacked: Requirements = SackStep.requirements();
        let sacks = run(None, sacked, vec![Value::Int(1)], SackStep).unwrap();
        assert_eq!(sacks, vec![Value::Null]);
    }
}
