//! Step pipeline: lazily pulled stages connected in a chain.
//!
//! Every step answers one question, "what is your next traverser?", by
//! pulling its predecessor through an [`Upstream`] handle. `Ok(None)` means the
//! step is exhausted; it is a control signal, never an error.

use std::any::Any;
use std::collections::VecDeque;
use std::sync::Arc;

use crate::config::TraversalConfig;
use crate::error::{Result, TraversalError};
use crate::io::GraphCodec;
use crate::process::bytecode::Bytecode;
use crate::process::traverser::{Requirements, Traverser, TraverserRequirement};
use crate::structure::Graph;
use crate::value::Value;

mod barrier;
mod dispatch;
mod filter;
mod io;
mod map;
mod start;

pub use barrier::{BarrierStep, CountStep};
pub use dispatch::{ComputerStep, ReadmissionStep, RemoteStep};
pub use filter::{HasContainer, HasStep, IdentityStep, LimitStep, TraversalFilterStep};
pub use io::{ReadStep, WriteStep};
pub use map::{
    ConstantStep, DetachStep, IdStep, LabelStep, PropertyStep, SackStep, ValuesStep, VertexStep,
};
pub use start::{AddEdgeStartStep, AddVertexStartStep, GraphStep, InjectStep, LabelSource};

/// Broad shape of a step, used by strategies to reason about a chain.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum StepKind {
    /// Produces traversers without consuming upstream input.
    Start,
    /// Emits a subset of its input unchanged.
    Filter,
    /// Emits exactly one output per input.
    Map,
    /// Emits zero or more outputs per input.
    FlatMap,
    /// Passes input through after touching external state.
    SideEffect,
    /// Gathers input before emitting.
    Barrier,
    /// Bulk read or write of a whole graph.
    Io,
    /// Hands the traversal to another engine and re-admits its results.
    Dispatch,
}

/// Object-safety helpers implemented for every `Step + Clone`.
pub trait StepClone {
    /// Deep copy of the step, including its local state.
    fn box_clone(&self) -> Box<dyn Step>;
    /// Downcasting support.
    fn as_any(&self) -> &dyn Any;
    /// Mutable downcasting support.
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T> StepClone for T
where
    T: Step + Clone + 'static,
{
    fn box_clone(&self) -> Box<dyn Step> {
        Box::new(self.clone())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// A processing stage in a [`StepChain`].
pub trait Step: StepClone + Send {
    /// Short name used in explanations and errors.
    fn name(&self) -> &'static str;

    /// Shape of the step.
    fn kind(&self) -> StepKind;

    /// Produces the next traverser, or `Ok(None)` once exhausted.
    fn process_next(
        &mut self,
        upstream: &mut Upstream<'_>,
        ctx: &StepContext<'_>,
    ) -> Result<Option<Traverser>>;

    /// Traverser capabilities the step depends on.
    fn requirements(&self) -> Requirements {
        Requirements::new()
    }

    /// Human-readable rendering including arguments.
    fn describe(&self) -> String {
        self.name().to_owned()
    }

    /// Returns true when the step writes to the graph.
    fn mutates_graph(&self) -> bool {
        false
    }

    /// Clears per-evaluation state so a nested chain can be run again.
    fn reset(&mut self) {}
}

impl Clone for Box<dyn Step> {
    fn clone(&self) -> Self {
        self.box_clone()
    }
}

/// Owning traversal's state, lent to every pull.
#[derive(Clone, Copy)]
pub struct StepContext<'a> {
    /// Local graph, when one is bound.
    pub graph: Option<&'a Arc<dyn Graph>>,
    /// Requirements in force for the traversal.
    pub requirements: &'a Requirements,
    /// Initial sack value, when sacks are in use.
    pub sack: Option<&'a Value>,
    /// Instruction log of the traversal.
    pub bytecode: &'a Bytecode,
    /// Execution settings.
    pub config: &'a TraversalConfig,
    /// Codec used by the bulk I/O steps.
    pub codec: &'a dyn GraphCodec,
}

impl<'a> StepContext<'a> {
    /// Returns the local graph or a [`TraversalError::NoGraph`] naming `step`.
    pub fn graph(&self, step: &'static str) -> Result<&'a dyn Graph> {
        self.graph
            .map(|graph| &**graph)
            .ok_or(TraversalError::NoGraph { step })
    }

    /// Returns a shared handle to the local graph.
    pub fn graph_handle(&self, step: &'static str) -> Result<Arc<dyn Graph>> {
        self.graph.cloned().ok_or(TraversalError::NoGraph { step })
    }

    /// Creates a start traverser shaped by the traversal's requirements.
    pub fn generate(&self, value: Value) -> Traverser {
        Traverser::generate(value, self.requirements, self.sack)
    }

    /// Returns true when traversers must not be bulked.
    pub fn one_bulk(&self) -> bool {
        self.requirements.contains(TraverserRequirement::OneBulk)
    }
}

/// Handle through which a step pulls its predecessor.
pub struct Upstream<'a> {
    nodes: &'a mut [StepNode],
    starts: &'a mut VecDeque<Traverser>,
}

impl Upstream<'_> {
    /// Pulls the next traverser from the preceding steps.
    pub fn next(&mut self, ctx: &StepContext<'_>) -> Result<Option<Traverser>> {
        pull(self.nodes, self.starts, ctx)
    }

    /// Pulls until the predecessor is exhausted.
    pub fn drain(&mut self, ctx: &StepContext<'_>) -> Result<Vec<Traverser>> {
        let mut out = Vec::new();
        while let Some(traverser) = self.next(ctx)? {
            out.push(traverser);
        }
        Ok(out)
    }
}

fn pull(
    nodes: &mut [StepNode],
    starts: &mut VecDeque<Traverser>,
    ctx: &StepContext<'_>,
) -> Result<Option<Traverser>> {
    let Some((last, rest)) = nodes.split_last_mut() else {
        return Ok(starts.pop_front());
    };
    let mut upstream = Upstream { nodes: rest, starts };
    let next = last.step.process_next(&mut upstream, ctx)?;
    Ok(next.map(|mut traverser| {
        if !last.labels.is_empty() {
            traverser.add_labels(&last.labels);
        }
        traverser
    }))
}

/// Identifier of a step within its chain, stable across rewrites.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct StepId(pub usize);

#[derive(Clone)]
struct StepNode {
    id: StepId,
    labels: Vec<String>,
    step: Box<dyn Step>,
}

/// Ordered chain of steps, navigable by position.
///
/// The chain owns its steps. Cloning copies every step together with its
/// local state.
#[derive(Clone, Default)]
pub struct StepChain {
    nodes: Vec<StepNode>,
    starts: VecDeque<Traverser>,
    next_id: usize,
}

impl StepChain {
    /// Empty chain.
    pub fn new() -> Self {
        Self::default()
    }

    fn node(&mut self, step: Box<dyn Step>) -> StepNode {
        let id = StepId(self.next_id);
        self.next_id += 1;
        StepNode {
            id,
            labels: Vec::new(),
            step,
        }
    }

    /// Appends a step.
    pub fn add_last(&mut self, step: Box<dyn Step>) -> StepId {
        let node = self.node(step);
        let id = node.id;
        self.nodes.push(node);
        id
    }

    /// Inserts a step at `index`, shifting later steps back.
    pub fn insert(&mut self, index: usize, step: Box<dyn Step>) -> Result<StepId> {
        if index > self.nodes.len() {
            return Err(TraversalError::Invalid("step index out of range"));
        }
        let node = self.node(step);
        let id = node.id;
        self.nodes.insert(index, node);
        Ok(id)
    }

    /// Removes and returns the step at `index` together with its labels.
    pub fn remove(&mut self, index: usize) -> Option<(Box<dyn Step>, Vec<String>)> {
        (index < self.nodes.len()).then(|| {
            let node = self.nodes.remove(index);
            (node.step, node.labels)
        })
    }

    /// Replaces the step at `index`, keeping its labels.
    pub fn replace(&mut self, index: usize, step: Box<dyn Step>) -> Result<Box<dyn Step>> {
        let node = self
            .nodes
            .get_mut(index)
            .ok_or(TraversalError::Invalid("step index out of range"))?;
        Ok(std::mem::replace(&mut node.step, step))
    }

    /// Removes every step.
    pub fn clear(&mut self) {
        self.nodes.clear();
    }

    /// Number of steps.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns true when the chain has no steps.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Step at `index`.
    pub fn get(&self, index: usize) -> Option<&dyn Step> {
        self.nodes.get(index).map(|node| node.step.as_ref())
    }

    /// Mutable step at `index`.
    pub fn get_mut(&mut self, index: usize) -> Option<&mut (dyn Step + 'static)> {
        self.nodes.get_mut(index).map(|node| node.step.as_mut())
    }

    /// Step before `index`.
    pub fn previous(&self, index: usize) -> Option<&dyn Step> {
        index.checked_sub(1).and_then(|prev| self.get(prev))
    }

    /// Step after `index`.
    pub fn next(&self, index: usize) -> Option<&dyn Step> {
        self.get(index + 1)
    }

    /// Identifier of the step at `index`.
    pub fn id(&self, index: usize) -> Option<StepId> {
        self.nodes.get(index).map(|node| node.id)
    }

    /// Position of the step with `id`.
    pub fn position(&self, id: StepId) -> Option<usize> {
        self.nodes.iter().position(|node| node.id == id)
    }

    /// Labels attached to the step at `index`.
    pub fn labels(&self, index: usize) -> &[String] {
        self.nodes
            .get(index)
            .map(|node| node.labels.as_slice())
            .unwrap_or(&[])
    }

    /// Attaches a label to the step at `index`.
    pub fn add_label(&mut self, index: usize, label: impl Into<String>) -> Result<()> {
        let node = self
            .nodes
            .get_mut(index)
            .ok_or(TraversalError::Invalid("as() requires a preceding step"))?;
        let label = label.into();
        if !node.labels.contains(&label) {
            node.labels.push(label);
        }
        Ok(())
    }

    /// Steps in order.
    pub fn iter(&self) -> impl Iterator<Item = &dyn Step> + '_ {
        self.nodes.iter().map(|node| node.step.as_ref())
    }

    /// Last step.
    pub fn last_mut(&mut self) -> Option<&mut (dyn Step + 'static)> {
        self.nodes.last_mut().map(|node| node.step.as_mut())
    }

    /// First step of concrete type `T`, with its position.
    pub fn find<T: Step + 'static>(&self) -> Option<(usize, &T)> {
        self.nodes
            .iter()
            .enumerate()
            .find_map(|(idx, node)| node.step.as_any().downcast_ref::<T>().map(|s| (idx, s)))
    }

    /// Union of every step's requirements.
    pub fn requirements(&self) -> Requirements {
        let mut out = Requirements::new();
        for node in &self.nodes {
            out.extend(&node.step.requirements());
        }
        out
    }

    /// Feeds a traverser to the first step.
    pub fn seed(&mut self, traverser: Traverser) {
        self.starts.push_back(traverser);
    }

    /// Clears seeded input and every step's per-evaluation state.
    pub fn reset(&mut self) {
        self.starts.clear();
        for node in &mut self.nodes {
            node.step.reset();
        }
    }

    /// Pulls the next traverser out of the last step.
    pub fn next_traverser(&mut self, ctx: &StepContext<'_>) -> Result<Option<Traverser>> {
        pull(&mut self.nodes, &mut self.starts, ctx)
    }

    /// Runs the chain against a single input and returns its first output.
    pub fn first_for(
        &mut self,
        input: Traverser,
        ctx: &StepContext<'_>,
    ) -> Result<Option<Traverser>> {
        self.reset();
        self.seed(input);
        let out = self.next_traverser(ctx)?;
        self.reset();
        Ok(out)
    }

    /// One line per step, e.g. `GraphStep(vertex,[])@[a]`.
    pub fn explain(&self) -> String {
        let parts: Vec<String> = self
            .nodes
            .iter()
            .map(|node| {
                if node.labels.is_empty() {
                    node.step.describe()
                } else {
                    format!("{}@[{}]", node.step.describe(), node.labels.join(","))
                }
            })
            .collect();
        format!("[{}]", parts.join(", "))
    }
}
