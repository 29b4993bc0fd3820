use std::any::Any;

use super::{RewriteTarget, Strategy, StrategyCategory};
use crate::error::Result;
use crate::process::step::{DetachStep, StepKind};

/// Appends a detach step so element results leave the process as id-only
/// references. Servers install it before streaming results to clients.
#[derive(Clone, Copy, Debug, Default)]
pub struct ReferenceElementStrategy;

impl Strategy for ReferenceElementStrategy {
    fn name(&self) -> &'static str {
        "ReferenceElementStrategy"
    }

    fn category(&self) -> StrategyCategory {
        StrategyCategory::Finalization
    }

    fn apply(&self, target: &mut RewriteTarget<'_>) -> Result<()> {
        let steps = &mut *target.steps;
        let already_detached = steps
            .get(steps.len().saturating_sub(1))
            .is_some_and(|step| step.as_any().is::<DetachStep>());
        let boundary = steps
            .get(0)
            .is_some_and(|step| matches!(step.kind(), StepKind::Dispatch | StepKind::Io));
        if steps.is_empty() || already_detached || boundary {
            return Ok(());
        }
        steps.add_last(Box::new(DetachStep));
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
