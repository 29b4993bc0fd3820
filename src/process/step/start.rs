use std::collections::VecDeque;

use super::{HasContainer, Step, StepChain, StepContext, StepKind, Upstream};
use crate::error::{Result, TraversalError};
use crate::process::traverser::{Requirements, Traverser};
use crate::structure::{EdgeId, ElementKind, VertexId};
use crate::value::Value;

/// Scans or looks up vertices or edges in the local graph.
///
/// Has-containers folded in by predicate pushdown are evaluated while the
/// buffer is filled, before any traverser is generated.
#[derive(Clone)]
pub struct GraphStep {
    kind: ElementKind,
    ids: Vec<u64>,
    containers: Vec<HasContainer>,
    buffer: Option<VecDeque<Value>>,
}

impl GraphStep {
    /// `ids` empty means a full scan.
    pub fn new(kind: ElementKind, ids: Vec<u64>) -> Self {
        Self {
            kind,
            ids,
            containers: Vec::new(),
            buffer: None,
        }
    }

    /// Element kind emitted.
    pub fn element_kind(&self) -> ElementKind {
        self.kind
    }

    /// Identifiers looked up; empty for a scan.
    pub fn ids(&self) -> &[u64] {
        &self.ids
    }

    /// Folded predicates.
    pub fn containers(&self) -> &[HasContainer] {
        &self.containers
    }

    /// Adds a predicate evaluated against every candidate element.
    pub fn push_container(&mut self, container: HasContainer) {
        self.containers.push(container);
    }

    fn load(&self, ctx: &StepContext<'_>) -> Result<VecDeque<Value>> {
        let graph = ctx.graph(self.name())?;
        let candidates: Vec<Value> = match (self.kind, self.ids.is_empty()) {
            (ElementKind::Vertex, true) => {
                graph.vertices()?.into_iter().map(Value::Vertex).collect()
            }
            (ElementKind::Edge, true) => graph.edges()?.into_iter().map(Value::Edge).collect(),
            (ElementKind::Vertex, false) => {
                let mut out = Vec::with_capacity(self.ids.len());
                for id in &self.ids {
                    if let Some(vertex) = graph.vertex(VertexId(*id))? {
                        out.push(Value::Vertex(vertex));
                    }
                }
                out
            }
            (ElementKind::Edge, false) => {
                let mut out = Vec::with_capacity(self.ids.len());
                for id in &self.ids {
                    if let Some(edge) = graph.edge(EdgeId(*id))? {
                        out.push(Value::Edge(edge));
                    }
                }
                out
            }
        };
        let mut buffer = VecDeque::with_capacity(candidates.len());
        'candidates: for candidate in candidates {
            for container in &self.containers {
                if !container.test(&candidate, Some(graph))? {
                    continue 'candidates;
                }
            }
            buffer.push_back(candidate);
        }
        Ok(buffer)
    }
}

impl Step for GraphStep {
    fn name(&self) -> &'static str {
        "GraphStep"
    }

    fn kind(&self) -> StepKind {
        StepKind::Start
    }

    fn process_next(
        &mut self,
        _upstream: &mut Upstream<'_>,
        ctx: &StepContext<'_>,
    ) -> Result<Option<Traverser>> {
        if self.buffer.is_none() {
            self.buffer = Some(self.load(ctx)?);
        }
        Ok(self
            .buffer
            .as_mut()
            .and_then(VecDeque::pop_front)
            .map(|value| ctx.generate(value)))
    }

    fn describe(&self) -> String {
        let mut out = format!("GraphStep({},{:?})", self.kind, self.ids);
        for container in &self.containers {
            out.push_str(&format!("[{container}]"));
        }
        out
    }

    fn reset(&mut self) {
        self.buffer = None;
    }
}

/// Emits a fixed list of values.
#[derive(Clone)]
pub struct InjectStep {
    initial: Vec<Value>,
    remaining: VecDeque<Value>,
}

impl InjectStep {
    /// Creates the step.
    pub fn new(values: Vec<Value>) -> Self {
        Self {
            remaining: values.iter().cloned().collect(),
            initial: values,
        }
    }
}

impl Step for InjectStep {
    fn name(&self) -> &'static str {
        "InjectStep"
    }

    fn kind(&self) -> StepKind {
        StepKind::Start
    }

    fn process_next(
        &mut self,
        _upstream: &mut Upstream<'_>,
        ctx: &StepContext<'_>,
    ) -> Result<Option<Traverser>> {
        Ok(self.remaining.pop_front().map(|value| ctx.generate(value)))
    }

    fn describe(&self) -> String {
        let values: Vec<String> = self.initial.iter().map(ToString::to_string).collect();
        format!("InjectStep([{}])", values.join(", "))
    }

    fn reset(&mut self) {
        self.remaining = self.initial.iter().cloned().collect();
    }
}

/// Where an added element takes its label from.
#[derive(Clone)]
pub enum LabelSource {
    /// Configured default label.
    Default,
    /// Fixed label.
    Constant(String),
    /// First value of a nested traversal run against a null start.
    Traversal(StepChain),
}

impl LabelSource {
    fn resolve(&mut self, ctx: &StepContext<'_>, fallback: &str) -> Result<String> {
        match self {
            LabelSource::Default => Ok(fallback.to_owned()),
            LabelSource::Constant(label) => Ok(label.clone()),
            LabelSource::Traversal(chain) => {
                let produced = chain.first_for(ctx.generate(Value::Null), ctx)?;
                Ok(match produced.map(Traverser::into_value) {
                    Some(Value::String(label)) => label,
                    Some(other) => other.to_string(),
                    None => fallback.to_owned(),
                })
            }
        }
    }

    fn requirements(&self) -> Requirements {
        match self {
            LabelSource::Traversal(chain) => chain.requirements(),
            _ => Requirements::new(),
        }
    }

    fn describe(&self) -> String {
        match self {
            LabelSource::Default => String::new(),
            LabelSource::Constant(label) => label.clone(),
            LabelSource::Traversal(chain) => chain.explain(),
        }
    }
}

/// Creates one vertex, emits it, then is exhausted.
#[derive(Clone)]
pub struct AddVertexStartStep {
    label: LabelSource,
    done: bool,
}

impl AddVertexStartStep {
    /// Creates the step.
    pub fn new(label: LabelSource) -> Self {
        Self { label, done: false }
    }
}

impl Step for AddVertexStartStep {
    fn name(&self) -> &'static str {
        "AddVertexStartStep"
    }

    fn kind(&self) -> StepKind {
        StepKind::Start
    }

    fn process_next(
        &mut self,
        _upstream: &mut Upstream<'_>,
        ctx: &StepContext<'_>,
    ) -> Result<Option<Traverser>> {
        if self.done {
            return Ok(None);
        }
        self.done = true;
        let graph = ctx.graph(self.name())?;
        let label = self.label.resolve(ctx, &ctx.config.default_vertex_label)?;
        let vertex = graph.add_vertex(&label)?;
        Ok(Some(ctx.generate(Value::Vertex(vertex))))
    }

    fn requirements(&self) -> Requirements {
        self.label.requirements()
    }

    fn describe(&self) -> String {
        format!("AddVertexStartStep({})", self.label.describe())
    }

    fn mutates_graph(&self) -> bool {
        true
    }

    fn reset(&mut self) {
        self.done = false;
    }
}

/// Creates one edge between the endpoints set by `from_v`/`to_v`.
#[derive(Clone)]
pub struct AddEdgeStartStep {
    label: LabelSource,
    from: Option<u64>,
    to: Option<u64>,
    done: bool,
}

impl AddEdgeStartStep {
    /// Creates the step with no endpoints.
    pub fn new(label: LabelSource) -> Self {
        Self {
            label,
            from: None,
            to: None,
            done: false,
        }
    }

    /// Sets the tail vertex.
    pub fn set_from(&mut self, id: u64) {
        self.from = Some(id);
    }

    /// Sets the head vertex.
    pub fn set_to(&mut self, id: u64) {
        self.to = Some(id);
    }
}

impl Step for AddEdgeStartStep {
    fn name(&self) -> &'static str {
        "AddEdgeStartStep"
    }

    fn kind(&self) -> StepKind {
        StepKind::Start
    }

    fn process_next(
        &mut self,
        _upstream: &mut Upstream<'_>,
        ctx: &StepContext<'_>,
    ) -> Result<Option<Traverser>> {
        if self.done {
            return Ok(None);
        }
        self.done = true;
        let (Some(from), Some(to)) = (self.from, self.to) else {
            return Err(TraversalError::illegal_state(
                self.name(),
                "both from() and to() endpoints must be set before the edge is added",
            ));
        };
        let graph = ctx.graph(self.name())?;
        let label = self.label.resolve(ctx, &ctx.config.default_edge_label)?;
        let edge = graph.add_edge(&label, VertexId(from), VertexId(to))?;
        Ok(Some(ctx.generate(Value::Edge(edge))))
    }

    fn requirements(&self) -> Requirements {
        self.label.requirements()
    }

    fn describe(&self) -> String {
        let end = |id: Option<u64>| id.map_or_else(|| "?".to_owned(), |id| id.to_string());
        format!(
            "AddEdgeStartStep({},{}->{})",
            self.label.describe(),
            end(self.from),
            end(self.to)
        )
    }

    fn mutates_graph(&self) -> bool {
        true
    }

    fn reset(&mut self) {
        self.done = false;
    }
}
