use std::any::Any;

use super::{RewriteTarget, Strategy, StrategyCategory};
use crate::error::Result;
use crate::process::step::{BarrierStep, GraphStep, HasStep, IdentityStep, StepKind};
use crate::process::traverser::TraverserRequirement;

/// Drops identity steps. Labels on a removed step move to its predecessor.
#[derive(Clone, Copy, Debug, Default)]
pub struct IdentityRemovalStrategy;

impl Strategy for IdentityRemovalStrategy {
    fn name(&self) -> &'static str {
        "IdentityRemovalStrategy"
    }

    fn category(&self) -> StrategyCategory {
        StrategyCategory::Optimization
    }

    fn apply(&self, target: &mut RewriteTarget<'_>) -> Result<()> {
        let steps = &mut *target.steps;
        let mut idx = steps.len();
        while idx > 0 {
            idx -= 1;
            let is_identity = steps
                .get(idx)
                .is_some_and(|step| step.as_any().is::<IdentityStep>());
            if !is_identity || steps.len() == 1 {
                continue;
            }
            if idx == 0 && !steps.labels(0).is_empty() {
                continue;
            }
            if let Some((_, labels)) = steps.remove(idx) {
                for label in labels {
                    steps.add_label(idx - 1, label)?;
                }
            }
        }
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Folds `has` filters that directly follow a graph scan into the scan.
#[derive(Clone, Copy, Debug, Default)]
pub struct FilterPushdownStrategy;

impl Strategy for FilterPushdownStrategy {
    fn name(&self) -> &'static str {
        "FilterPushdownStrategy"
    }

    fn category(&self) -> StrategyCategory {
        StrategyCategory::Optimization
    }

    fn run_after(&self) -> &'static [&'static str] {
        &["IdentityRemovalStrategy"]
    }

    fn apply(&self, target: &mut RewriteTarget<'_>) -> Result<()> {
        let steps = &mut *target.steps;
        let scan_is_first = steps
            .get(0)
            .is_some_and(|step| step.as_any().is::<GraphStep>());
        // labelled steps are never folded
        if !scan_is_first || !steps.labels(0).is_empty() {
            return Ok(());
        }
        loop {
            let container = match steps.get(1) {
                Some(step) if steps.labels(1).is_empty() => step
                    .as_any()
                    .downcast_ref::<HasStep>()
                    .map(|has| has.container().clone()),
                _ => None,
            };
            let Some(container) = container else {
                return Ok(());
            };
            steps.remove(1);
            if let Some(scan) = steps
                .get_mut(0)
                .and_then(|step| step.as_any_mut().downcast_mut::<GraphStep>())
            {
                scan.push_container(container);
            }
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Inserts bounded bulking barriers after flat-map steps so that duplicate
/// traversers are merged before they fan out further.
///
/// Does nothing when traversers must stay unbulked or carry a path.
#[derive(Clone, Copy, Debug, Default)]
pub struct LazyBarrierStrategy;

impl Strategy for LazyBarrierStrategy {
    fn name(&self) -> &'static str {
        "LazyBarrierStrategy"
    }

    fn category(&self) -> StrategyCategory {
        StrategyCategory::Optimization
    }

    fn run_after(&self) -> &'static [&'static str] {
        &["FilterPushdownStrategy"]
    }

    fn assumes_absent(&self) -> &'static [TraverserRequirement] {
        &[TraverserRequirement::OneBulk, TraverserRequirement::Path]
    }

    fn apply(&self, target: &mut RewriteTarget<'_>) -> Result<()> {
        if !target.config.lazy_barriers
            || self
                .assumes_absent()
                .iter()
                .any(|req| target.requirements.contains(*req))
        {
            return Ok(());
        }
        let steps = &mut *target.steps;
        let mut idx = 0;
        while idx + 1 < steps.len() {
            let flat_map = steps.get(idx).is_some_and(|s| s.kind() == StepKind::FlatMap);
            let next_is_barrier = steps.next(idx).is_some_and(|s| s.kind() == StepKind::Barrier);
            if flat_map && !next_is_barrier {
                steps.insert(idx + 1, Box::new(BarrierStep::bounded(target.config.barrier_size)))?;
                idx += 1;
            }
            idx += 1;
        }
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
