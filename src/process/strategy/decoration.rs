use std::any::Any;
use std::sync::Arc;

use super::{RewriteTarget, Strategy, StrategyCategory, TraversalStrategies};
use crate::error::Result;
use crate::process::computer::Computer;
use crate::process::remote::RemoteConnection;
use crate::process::step::{ComputerStep, RemoteStep};
use crate::process::traverser::{Requirements, TraverserRequirement};
use crate::value::Value;

/// Adds a fixed set of traverser requirements.
#[derive(Clone, Debug, Default)]
pub struct RequirementsStrategy {
    requirements: Requirements,
}

impl RequirementsStrategy {
    pub(crate) const NAME: &'static str = "RequirementsStrategy";

    /// Strategy adding `requirements`.
    pub fn new(requirements: Requirements) -> Self {
        Self { requirements }
    }

    /// Requirements the strategy adds.
    pub fn requirements(&self) -> &Requirements {
        &self.requirements
    }

    /// Merges `additional` into the set's requirements strategy, creating
    /// one when absent.
    pub fn add_requirements(
        strategies: &mut TraversalStrategies,
        additional: impl IntoIterator<Item = TraverserRequirement>,
    ) {
        let mut merged = strategies
            .get(Self::NAME)
            .and_then(|existing| existing.as_any().downcast_ref::<Self>())
            .map(|existing| existing.requirements.clone())
            .unwrap_or_default();
        for requirement in additional {
            merged.insert(requirement);
        }
        strategies.add(Arc::new(Self::new(merged)));
    }
}

impl Strategy for RequirementsStrategy {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn category(&self) -> StrategyCategory {
        StrategyCategory::Decoration
    }

    fn provides(&self) -> Vec<TraverserRequirement> {
        self.requirements.iter().collect()
    }

    fn configuration(&self) -> Value {
        Value::List(
            self.requirements
                .iter()
                .map(|requirement| Value::from(requirement.to_string()))
                .collect(),
        )
    }

    fn apply(&self, target: &mut RewriteTarget<'_>) -> Result<()> {
        target.requirements.extend(&self.requirements);
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Installs the initial sack value.
#[derive(Clone, Debug)]
pub struct SackStrategy {
    initial: Value,
}

impl SackStrategy {
    pub(crate) const NAME: &'static str = "SackStrategy";

    /// Strategy seeding every traverser's sack with `initial`.
    pub fn new(initial: Value) -> Self {
        Self { initial }
    }
}

impl Strategy for SackStrategy {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn category(&self) -> StrategyCategory {
        StrategyCategory::Decoration
    }

    fn provides(&self) -> Vec<TraverserRequirement> {
        vec![TraverserRequirement::Sack]
    }

    fn configuration(&self) -> Value {
        self.initial.clone()
    }

    fn apply(&self, target: &mut RewriteTarget<'_>) -> Result<()> {
        *target.sack = Some(self.initial.clone());
        target.requirements.insert(TraverserRequirement::Sack);
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Replaces the chain with a single step that ships the bytecode to a
/// remote server.
#[derive(Clone)]
pub struct RemoteStrategy {
    connection: Arc<dyn RemoteConnection>,
}

impl RemoteStrategy {
    /// Strategy dispatching through `connection`.
    pub fn new(connection: Arc<dyn RemoteConnection>) -> Self {
        Self { connection }
    }
}

impl Strategy for RemoteStrategy {
    fn name(&self) -> &'static str {
        "RemoteStrategy"
    }

    fn category(&self) -> StrategyCategory {
        StrategyCategory::Decoration
    }

    fn apply(&self, target: &mut RewriteTarget<'_>) -> Result<()> {
        if target.steps.find::<RemoteStep>().is_some() {
            return Ok(());
        }
        target.steps.clear();
        target
            .steps
            .add_last(Box::new(RemoteStep::new(Arc::clone(&self.connection))));
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Replaces the chain with a single step that runs the traversal on a
/// bulk-parallel engine.
#[derive(Clone)]
pub struct ComputerStrategy {
    computer: Computer,
}

impl ComputerStrategy {
    /// Strategy dispatching to `computer`.
    pub fn new(computer: Computer) -> Self {
        Self { computer }
    }

    /// Configured engine.
    pub fn computer(&self) -> &Computer {
        &self.computer
    }
}

impl Strategy for ComputerStrategy {
    fn name(&self) -> &'static str {
        "ComputerStrategy"
    }

    fn category(&self) -> StrategyCategory {
        StrategyCategory::Decoration
    }

    fn run_after(&self) -> &'static [&'static str] {
        &["RemoteStrategy"]
    }

    fn apply(&self, target: &mut RewriteTarget<'_>) -> Result<()> {
        if target.steps.find::<ComputerStep>().is_some() || target.steps.find::<RemoteStep>().is_some()
        {
            return Ok(());
        }
        target.steps.clear();
        target
            .steps
            .add_last(Box::new(ComputerStep::new(self.computer.clone())));
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
