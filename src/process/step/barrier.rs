use std::collections::VecDeque;

use rustc_hash::FxHashMap;

use super::{Step, StepContext, StepKind, Upstream};
use crate::error::Result;
use crate::process::traverser::Traverser;
use crate::value::Value;

/// Gathers traversers and merges indistinguishable ones into bulked traversers.
///
/// A bounded barrier releases after `max` upstream traversers have been
/// gathered; an unbounded one drains its input first. Under `OneBulk` nothing
/// is merged.
#[derive(Clone)]
pub struct BarrierStep {
    max: Option<usize>,
    ready: VecDeque<Traverser>,
    exhausted: bool,
}

impl BarrierStep {
    /// Barrier that drains all of its input.
    pub fn unbounded() -> Self {
        Self {
            max: None,
            ready: VecDeque::new(),
            exhausted: false,
        }
    }

    /// Barrier that releases every `max` traversers.
    pub fn bounded(max: usize) -> Self {
        Self {
            max: Some(max.max(1)),
            ..Self::unbounded()
        }
    }

    /// Gathering bound, `None` when unbounded.
    pub fn max(&self) -> Option<usize> {
        self.max
    }

    fn fill(&mut self, upstream: &mut Upstream<'_>, ctx: &StepContext<'_>) -> Result<()> {
        let merge = !ctx.one_bulk();
        let mut gathered: Vec<Traverser> = Vec::new();
        let mut slots: FxHashMap<u64, Vec<usize>> = FxHashMap::default();
        let mut pulled = 0usize;
        while self.max.map_or(true, |max| pulled < max) {
            let Some(traverser) = upstream.next(ctx)? else {
                self.exhausted = true;
                break;
            };
            pulled += 1;
            if !merge || traverser.is_sentinel() {
                gathered.push(traverser);
                continue;
            }
            let candidates = slots.entry(traverser.merge_key()).or_default();
            match candidates
                .iter()
                .copied()
                .find(|&idx| gathered[idx].can_merge(&traverser))
            {
                Some(idx) => gathered[idx].merge(traverser),
                None => {
                    candidates.push(gathered.len());
                    gathered.push(traverser);
                }
            }
        }
        self.ready.extend(gathered);
        Ok(())
    }
}

impl Default for BarrierStep {
    fn default() -> Self {
        Self::unbounded()
    }
}

impl Step for BarrierStep {
    fn name(&self) -> &'static str {
        "BarrierStep"
    }

    fn kind(&self) -> StepKind {
        StepKind::Barrier
    }

    fn process_next(
        &mut self,
        upstream: &mut Upstream<'_>,
        ctx: &StepContext<'_>,
    ) -> Result<Option<Traverser>> {
        if self.ready.is_empty() && !self.exhausted {
            self.fill(upstream, ctx)?;
        }
        Ok(self.ready.pop_front())
    }

    fn describe(&self) -> String {
        match self.max {
            Some(max) => format!("BarrierStep({max})"),
            None => "BarrierStep".to_owned(),
        }
    }

    fn reset(&mut self) {
        self.ready.clear();
        self.exhausted = false;
    }
}

/// Counts its input, bulk included, and emits the total once.
#[derive(Clone, Default)]
pub struct CountStep {
    done: bool,
}

impl Step for CountStep {
    fn name(&self) -> &'static str {
        "CountStep"
    }

    fn kind(&self) -> StepKind {
        StepKind::Barrier
    }

    fn process_next(
        &mut self,
        upstream: &mut Upstream<'_>,
        ctx: &StepContext<'_>,
    ) -> Result<Option<Traverser>> {
        if self.done {
            return Ok(None);
        }
        let mut total = 0u64;
        while let Some(traverser) = upstream.next(ctx)? {
            if !traverser.is_sentinel() {
                total = total.saturating_add(traverser.bulk());
            }
        }
        self.done = true;
        Ok(Some(ctx.generate(Value::try_from(total)?)))
    }

    fn reset(&mut self) {
        self.done = false;
    }
}
