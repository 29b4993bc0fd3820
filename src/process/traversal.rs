//! Fluent traversal builder and pull-based result iteration.

use std::sync::Arc;

use crate::config::TraversalConfig;
use crate::error::{Result, TraversalError};
use crate::io::{GraphCodec, JsonLinesCodec};
use crate::process::bytecode::{symbols, Argument, Bytecode};
use crate::process::source::TraversalSource;
use crate::process::step::{
    AddEdgeStartStep, BarrierStep, ConstantStep, CountStep, HasContainer, HasStep, IdStep,
    IdentityStep, LabelStep, LimitStep, PropertyStep, SackStep, Step, StepChain, StepContext,
    TraversalFilterStep, ValuesStep, VertexStep,
};
use crate::process::strategy::{RewriteTarget, TraversalStrategies};
use crate::process::traverser::{Requirements, Traverser};
use crate::profile::{profile_timer, record_profile_timer, TraversalProfileKind};
use crate::structure::{Direction, Graph};
use crate::value::Value;

/// A traversal under construction or being iterated.
///
/// Builder methods record an instruction and append a step. The strategy set
/// is applied once, on the first pull; the traversal cannot be extended after
/// that. Builder misuse is deferred and reported by the first pull.
pub struct Traversal {
    graph: Option<Arc<dyn Graph>>,
    strategies: Arc<TraversalStrategies>,
    config: Arc<TraversalConfig>,
    codec: Arc<dyn GraphCodec>,
    bytecode: Bytecode,
    steps: StepChain,
    requirements: Requirements,
    sack: Option<Value>,
    locked: bool,
    error: Option<TraversalError>,
    failed: Option<String>,
    pending: Option<(Value, u64)>,
}

impl Traversal {
    pub(crate) fn bound(source: TraversalSource, start: Box<dyn Step>) -> Self {
        let parts = source.into_parts();
        let mut steps = StepChain::new();
        steps.add_last(start);
        Self {
            graph: parts.graph,
            strategies: parts.strategies,
            config: parts.config,
            codec: parts.codec,
            bytecode: parts.bytecode,
            steps,
            requirements: Requirements::new(),
            sack: None,
            locked: false,
            error: None,
            failed: None,
            pending: None,
        }
    }

    /// A nested traversal with no start step, used as an argument of
    /// `filter`, `add_v_from`, and `add_e_from`.
    pub fn anonymous() -> Self {
        Self {
            graph: None,
            strategies: Arc::new(TraversalStrategies::new()),
            config: Arc::new(TraversalConfig::default()),
            codec: Arc::new(JsonLinesCodec),
            bytecode: Bytecode::new(),
            steps: StepChain::new(),
            requirements: Requirements::new(),
            sack: None,
            locked: false,
            error: None,
            failed: None,
            pending: None,
        }
    }

    /// Instruction log.
    pub fn bytecode(&self) -> &Bytecode {
        &self.bytecode
    }

    /// Executable chain in its current form.
    pub fn steps(&self) -> &StepChain {
        &self.steps
    }

    /// Requirements in force; complete once strategies have been applied.
    pub fn requirements(&self) -> &Requirements {
        &self.requirements
    }

    /// Local graph, when bound.
    pub fn graph(&self) -> Option<&Arc<dyn Graph>> {
        self.graph.as_ref()
    }

    /// Returns true once strategies have been applied.
    pub fn is_locked(&self) -> bool {
        self.locked
    }

    pub(crate) fn into_nested(self) -> Result<(Bytecode, StepChain)> {
        match self.error {
            Some(err) => Err(err),
            None => Ok((self.bytecode, self.steps)),
        }
    }

    fn push(mut self, name: &'static str, args: Vec<Argument>, step: Box<dyn Step>) -> Self {
        if self.guard() {
            self.bytecode.add_step(name, args);
            self.steps.add_last(step);
        }
        self
    }

    fn guard(&mut self) -> bool {
        if self.error.is_some() || self.failed.is_some() {
            return false;
        }
        if self.locked {
            self.error = Some(TraversalError::Invalid(
                "a traversal cannot be modified after iteration has started",
            ));
            return false;
        }
        true
    }

    pub(crate) fn with_error(self, err: TraversalError) -> Self {
        self.fail(err)
    }

    fn fail(mut self, err: TraversalError) -> Self {
        if self.error.is_none() {
            self.error = Some(err);
        }
        self
    }

    /// Passes traversers through unchanged.
    pub fn identity(self) -> Self {
        self.push(symbols::IDENTITY, vec![], Box::new(IdentityStep))
    }

    /// Keeps elements whose label is one of `labels`.
    pub fn has_label<S: Into<String>>(self, labels: impl IntoIterator<Item = S>) -> Self {
        let labels: Vec<String> = labels.into_iter().map(Into::into).collect();
        let args = labels.iter().map(|l| Argument::from(l.as_str())).collect();
        self.push(
            symbols::HAS_LABEL,
            args,
            Box::new(HasStep::new(HasContainer::Label(labels))),
        )
    }

    /// Keeps elements whose id is one of `ids`.
    pub fn has_id(self, ids: impl IntoIterator<Item = u64>) -> Self {
        let ids: Vec<u64> = ids.into_iter().collect();
        let recorded: Result<Vec<Argument>> = ids.iter().map(|&id| Argument::try_from(id)).collect();
        match recorded {
            Ok(args) => self.push(
                symbols::HAS_ID,
                args,
                Box::new(HasStep::new(HasContainer::Id(ids))),
            ),
            Err(err) => self.fail(err),
        }
    }

    /// Keeps elements (or maps) whose `key` equals `value`.
    pub fn has(self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        let key = key.into();
        let value = value.into();
        self.push(
            symbols::HAS,
            vec![Argument::from(key.as_str()), Argument::from(value.clone())],
            Box::new(HasStep::new(HasContainer::Property { key, value })),
        )
    }

    /// Keeps traversers for which `sub` yields at least one result.
    pub fn filter(self, sub: Traversal) -> Self {
        match sub.into_nested() {
            Ok((bytecode, chain)) => self.push(
                symbols::FILTER,
                vec![Argument::Bytecode(bytecode)],
                Box::new(TraversalFilterStep::new(chain)),
            ),
            Err(err) => self.fail(err),
        }
    }

    /// Emits at most `limit` results.
    pub fn limit(self, limit: u64) -> Self {
        match Argument::try_from(limit) {
            Ok(arg) => self.push(symbols::LIMIT, vec![arg], Box::new(LimitStep::new(limit))),
            Err(err) => self.fail(err),
        }
    }

    /// Maps elements to their ids.
    pub fn id(self) -> Self {
        self.push(symbols::ID, vec![], Box::new(IdStep))
    }

    /// Maps elements to their labels.
    pub fn label(self) -> Self {
        self.push(symbols::LABEL, vec![], Box::new(LabelStep))
    }

    /// Emits property values; no keys means every property.
    pub fn values<S: Into<String>>(self, keys: impl IntoIterator<Item = S>) -> Self {
        let keys: Vec<String> = keys.into_iter().map(Into::into).collect();
        let args = keys.iter().map(|k| Argument::from(k.as_str())).collect();
        self.push(symbols::VALUES, args, Box::new(ValuesStep::new(keys)))
    }

    /// Replaces every value with `value`.
    pub fn constant(self, value: impl Into<Value>) -> Self {
        let value = value.into();
        self.push(
            symbols::CONSTANT,
            vec![Argument::from(value.clone())],
            Box::new(ConstantStep::new(value)),
        )
    }

    /// Maps traversers to their sack values.
    pub fn sack(self) -> Self {
        self.push(symbols::SACK, vec![], Box::new(SackStep))
    }

    fn walk<S: Into<String>>(self, direction: Direction, labels: impl IntoIterator<Item = S>) -> Self {
        let labels: Vec<String> = labels.into_iter().map(Into::into).collect();
        let args = labels.iter().map(|l| Argument::from(l.as_str())).collect();
        self.push(
            direction.symbol(),
            args,
            Box::new(VertexStep::new(direction, labels)),
        )
    }

    /// Walks outgoing edges; no labels means every edge.
    pub fn out<S: Into<String>>(self, labels: impl IntoIterator<Item = S>) -> Self {
        self.walk(Direction::Out, labels)
    }

    /// Walks incoming edges; no labels means every edge.
    pub fn in_<S: Into<String>>(self, labels: impl IntoIterator<Item = S>) -> Self {
        self.walk(Direction::In, labels)
    }

    /// Walks edges in both directions; no labels means every edge.
    pub fn both<S: Into<String>>(self, labels: impl IntoIterator<Item = S>) -> Self {
        self.walk(Direction::Both, labels)
    }

    /// Sets a property on each element passing through.
    pub fn property(self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        let key = key.into();
        let value = value.into();
        self.push(
            symbols::PROPERTY,
            vec![Argument::from(key.as_str()), Argument::from(value.clone())],
            Box::new(PropertyStep::new(key, value)),
        )
    }

    /// Gathers every traverser and bulks duplicates.
    pub fn barrier(self) -> Self {
        self.push(symbols::BARRIER, vec![], Box::new(BarrierStep::unbounded()))
    }

    /// Counts results.
    pub fn count(self) -> Self {
        self.push(symbols::COUNT, vec![], Box::new(CountStep::default()))
    }

    /// Labels the previous step; the label is recorded in tracked paths.
    pub fn as_(mut self, label: impl Into<String>) -> Self {
        if !self.guard() {
            return self;
        }
        let label = label.into();
        let last = self.steps.len().checked_sub(1);
        match last.map(|idx| self.steps.add_label(idx, label.clone())) {
            Some(Ok(())) => {
                self.bytecode.add_step(symbols::AS, vec![Argument::from(label)]);
                self
            }
            Some(Err(err)) => self.fail(err),
            None => self.fail(TraversalError::Invalid("as() requires a preceding step")),
        }
    }

    fn endpoint(mut self, name: &'static str, id: u64) -> Self {
        if !self.guard() {
            return self;
        }
        let arg = match Argument::try_from(id) {
            Ok(arg) => arg,
            Err(err) => return self.fail(err),
        };
        let step = self
            .steps
            .last_mut()
            .and_then(|step| step.as_any_mut().downcast_mut::<AddEdgeStartStep>());
        match step {
            Some(step) => {
                if name == symbols::FROM {
                    step.set_from(id);
                } else {
                    step.set_to(id);
                }
                self.bytecode.add_step(name, vec![arg]);
                self
            }
            None => self.fail(TraversalError::Invalid(
                "from_v() and to_v() must directly follow add_e()",
            )),
        }
    }

    /// Sets the tail vertex of the edge added by the preceding `add_e`.
    pub fn from_v(self, id: u64) -> Self {
        self.endpoint(symbols::FROM, id)
    }

    /// Sets the head vertex of the edge added by the preceding `add_e`.
    pub fn to_v(self, id: u64) -> Self {
        self.endpoint(symbols::TO, id)
    }

    /// Applies the strategy set; later calls do nothing.
    ///
    /// A deferred builder error or a rejected rewrite is reported once. The
    /// traversal is then failed: every later pull returns an illegal-state
    /// error and the chain never runs.
    pub fn apply_strategies(&mut self) -> Result<()> {
        if let Some(reason) = &self.failed {
            return Err(TraversalError::illegal_state(
                "traversal",
                format!("traversal already failed: {reason}"),
            ));
        }
        if let Some(err) = self.error.take() {
            self.failed = Some(err.to_string());
            return Err(err);
        }
        if self.locked {
            return Ok(());
        }
        let mut target = RewriteTarget {
            steps: &mut self.steps,
            requirements: &mut self.requirements,
            sack: &mut self.sack,
            config: &self.config,
        };
        if let Err(err) = self.strategies.apply_to(&mut target) {
            self.failed = Some(err.to_string());
            return Err(err);
        }
        self.locked = true;
        Ok(())
    }

    /// Returns true once a pull has reported a builder or rewrite error.
    pub fn is_failed(&self) -> bool {
        self.failed.is_some()
    }

    /// Pulls the next raw traverser, sentinels and bulk included.
    pub fn next_traverser(&mut self) -> Result<Option<Traverser>> {
        self.apply_strategies()?;
        let start = profile_timer();
        let ctx = StepContext {
            graph: self.graph.as_ref(),
            requirements: &self.requirements,
            sack: self.sack.as_ref(),
            bytecode: &self.bytecode,
            config: &self.config,
            codec: self.codec.as_ref(),
        };
        let next = self.steps.next_traverser(&ctx);
        record_profile_timer(TraversalProfileKind::Pull, start);
        next
    }

    /// Pulls the next result value.
    ///
    /// Bulked traversers are expanded into repeated values and sentinels are
    /// skipped.
    pub fn try_next(&mut self) -> Result<Option<Value>> {
        if let Some((value, remaining)) = self.pending.take() {
            if remaining > 1 {
                self.pending = Some((value.clone(), remaining - 1));
            }
            return Ok(Some(value));
        }
        while let Some(traverser) = self.next_traverser()? {
            if traverser.is_sentinel() {
                continue;
            }
            let bulk = traverser.bulk();
            let value = traverser.into_value();
            if bulk > 1 {
                self.pending = Some((value.clone(), bulk - 1));
            }
            return Ok(Some(value));
        }
        Ok(None)
    }

    /// Collects every result value.
    pub fn to_list(mut self) -> Result<Vec<Value>> {
        let mut out = Vec::new();
        while let Some(value) = self.try_next()? {
            out.push(value);
        }
        Ok(out)
    }

    /// Collects every raw traverser.
    pub fn to_traversers(mut self) -> Result<Vec<Traverser>> {
        let mut out = Vec::new();
        while let Some(traverser) = self.next_traverser()? {
            out.push(traverser);
        }
        Ok(out)
    }

    /// Runs the traversal to exhaustion for its side effects.
    pub fn iterate(&mut self) -> Result<()> {
        while self.next_traverser()?.is_some() {}
        Ok(())
    }

    /// Renders the chain before rewriting, after each strategy, and final.
    pub fn explain(&self) -> Result<String> {
        let deferred = self.error.as_ref().map(ToString::to_string);
        if let Some(reason) = deferred.or_else(|| self.failed.clone()) {
            return Err(TraversalError::illegal_state("explain", reason));
        }
        let mut steps = self.steps.clone();
        let mut requirements = self.requirements.clone();
        let mut sack = self.sack.clone();
        let ordered = self.strategies.ordered()?;
        let width = ordered
            .iter()
            .map(|s| s.name().len() + s.category().to_string().len() + 3)
            .max()
            .unwrap_or(0)
            .max("Original Traversal".len());
        let mut out = format!("{:<width$} {}\n", "Original Traversal", steps.explain());
        if !self.locked {
            requirements.extend(&steps.requirements());
            for strategy in &ordered {
                let mut target = RewriteTarget {
                    steps: &mut steps,
                    requirements: &mut requirements,
                    sack: &mut sack,
                    config: &self.config,
                };
                strategy.apply(&mut target)?;
                let title = format!("{} [{}]", strategy.name(), strategy.category());
                out.push_str(&format!("{title:<width$} {}\n", steps.explain()));
            }
        }
        out.push_str(&format!("{:<width$} {}", "Final Traversal", steps.explain()));
        Ok(out)
    }
}

impl Iterator for Traversal {
    type Item = Result<Value>;

    fn next(&mut self) -> Option<Self::Item> {
        self.try_next().transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_send<T: Send>() {}

    #[test]
    fn traversals_are_send() {
        assert_send::<Traversal>();
    }

    #[test]
    fn builder_records_instructions_in_call_order() {
        let t = Traversal::anonymous()
            .has_label(["person"])
            .out(["knows"])
            .values(["name"])
            .limit(2);
        let names: Vec<&str> = t
            .bytecode()
            .step_instructions()
            .iter()
            .map(|i| i.name.as_str())
            .collect();
        assert_eq!(names, vec!["hasLabel", "out", "values", "limit"]);
        assert_eq!(t.steps().len(), 4);
    }

    #[test]
    fn misuse_is_deferred_to_first_pull() {
        let mut t = Traversal::anonymous().from_v(1).count();
        let err = t.try_next().unwrap_err();
        assert_eq!(err.code(), "InvalidArgument");
        assert!(t.bytecode().step_instructions().is_empty());
    }

    #[test]
    fn failure_is_sticky_across_pulls() {
        let mut t = TraversalSource::empty()
            .inject(vec![Value::Int(1)])
            .from_v(1);
        assert_eq!(t.try_next().unwrap_err().code(), "InvalidArgument");
        assert!(t.is_failed());
        let err = t.try_next().unwrap_err();
        assert_eq!(err.code(), "IllegalState");
        assert!(err.to_string().contains("from_v()"));
        assert!(t.next_traverser().is_err());
        assert!(t.explain().is_err());
    }

    #[test]
    fn injected_sub_traversal_filters() {
        let values = TraversalSource::empty()
            .inject(vec![Value::Int(1), Value::Int(2), Value::Int(1)])
            .filter(Traversal::anonymous().has_id([7]))
            .to_list()
            .unwrap();
        assert!(values.is_empty());
    }

    #[test]
    fn bulk_expands_into_repeated_values() {
        let values = TraversalSource::empty()
            .inject(vec![Value::from("a"), Value::from("a"), Value::from("b")])
            .barrier()
            .to_list()
            .unwrap();
        assert_eq!(
            values,
            vec![Value::from("a"), Value::from("a"), Value::from("b")]
        );
    }
}
