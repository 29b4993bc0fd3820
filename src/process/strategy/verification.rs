use std::any::Any;

use super::{RewriteTarget, Strategy, StrategyCategory};
use crate::error::{Result, TraversalError};
use crate::process::step::StepKind;

/// Rejects chains the machine cannot execute: bulk I/O steps must stand
/// alone and dispatch steps must come first.
#[derive(Clone, Copy, Debug, Default)]
pub struct StandardVerificationStrategy;

impl StandardVerificationStrategy {
    const NAME: &'static str = "StandardVerificationStrategy";
}

impl Strategy for StandardVerificationStrategy {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn category(&self) -> StrategyCategory {
        StrategyCategory::Verification
    }

    fn apply(&self, target: &mut RewriteTarget<'_>) -> Result<()> {
        let steps = &*target.steps;
        for (idx, step) in steps.iter().enumerate() {
            match step.kind() {
                StepKind::Io if steps.len() > 1 => {
                    return Err(TraversalError::Verification {
                        strategy: Self::NAME,
                        reason: format!(
                            "{} must be the only step of its traversal",
                            step.name()
                        ),
                    });
                }
                StepKind::Dispatch if idx > 0 => {
                    return Err(TraversalError::Verification {
                        strategy: Self::NAME,
                        reason: format!("{} must be the first step", step.name()),
                    });
                }
                _ => {}
            }
        }
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Rejects any step that writes to the graph.
#[derive(Clone, Copy, Debug, Default)]
pub struct ReadOnlyStrategy;

impl ReadOnlyStrategy {
    const NAME: &'static str = "ReadOnlyStrategy";
}

impl Strategy for ReadOnlyStrategy {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn category(&self) -> StrategyCategory {
        StrategyCategory::Verification
    }

    fn apply(&self, target: &mut RewriteTarget<'_>) -> Result<()> {
        match target.steps.iter().find(|step| step.mutates_graph()) {
            Some(step) => Err(TraversalError::Verification {
                strategy: Self::NAME,
                reason: format!("{} mutates the graph", step.name()),
            }),
            None => Ok(()),
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
