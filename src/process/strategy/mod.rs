//! Strategy rewriter: pluggable passes over a traversal's step chain.
//!
//! Strategies run once per traversal, before the first pull. They are grouped
//! by [`StrategyCategory`] and, within a category, ordered by their
//! before/after constraints with ties broken by registration order.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use tracing::debug;

use crate::config::TraversalConfig;
use crate::error::{Result, TraversalError};
use crate::process::step::StepChain;
use crate::process::traverser::{Requirements, TraverserRequirement};
use crate::profile::{profile_timer, record_profile_timer, TraversalProfileKind};
use crate::value::Value;

mod decoration;
mod finalization;
mod optimization;
mod registry;
mod verification;

pub use decoration::{ComputerStrategy, RemoteStrategy, RequirementsStrategy, SackStrategy};
pub use finalization::ReferenceElementStrategy;
pub use optimization::{FilterPushdownStrategy, IdentityRemovalStrategy, LazyBarrierStrategy};
pub use registry::StrategyRegistry;
pub use verification::{ReadOnlyStrategy, StandardVerificationStrategy};

/// Fixed execution order of strategy groups.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum StrategyCategory {
    /// Adds application-level behavior (requirements, dispatch).
    Decoration,
    /// Rewrites for efficiency without changing results.
    Optimization,
    /// Final adjustments before execution.
    Finalization,
    /// Rejects illegal chains.
    Verification,
}

impl fmt::Display for StrategyCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StrategyCategory::Decoration => "decoration",
            StrategyCategory::Optimization => "optimization",
            StrategyCategory::Finalization => "finalization",
            StrategyCategory::Verification => "verification",
        };
        f.write_str(name)
    }
}

/// Mutable view of a traversal handed to each strategy.
pub struct RewriteTarget<'a> {
    /// Executable chain.
    pub steps: &'a mut StepChain,
    /// Requirements; strategies may only add to them.
    pub requirements: &'a mut Requirements,
    /// Initial sack value.
    pub sack: &'a mut Option<Value>,
    /// Execution settings.
    pub config: &'a TraversalConfig,
}

/// A named, idempotent rewrite pass.
pub trait Strategy: Send + Sync + 'static {
    /// Unique name; re-adding a strategy with the same name replaces it.
    fn name(&self) -> &'static str;

    /// Group the strategy runs in.
    fn category(&self) -> StrategyCategory;

    /// Strategies that must run before this one.
    fn run_after(&self) -> &'static [&'static str] {
        &[]
    }

    /// Strategies that must run after this one.
    fn run_before(&self) -> &'static [&'static str] {
        &[]
    }

    /// Requirements this strategy may introduce.
    fn provides(&self) -> Vec<TraverserRequirement> {
        Vec::new()
    }

    /// Requirements whose absence this strategy relies on when it rewrites.
    fn assumes_absent(&self) -> &'static [TraverserRequirement] {
        &[]
    }

    /// Parameters recorded in bytecode so a registry can rebuild the
    /// strategy on replay. `Null` for strategies without parameters.
    fn configuration(&self) -> Value {
        Value::Null
    }

    /// Rewrites the target. Applying twice must equal applying once.
    fn apply(&self, target: &mut RewriteTarget<'_>) -> Result<()>;

    /// Downcasting support.
    fn as_any(&self) -> &dyn Any;
}

/// Strategy set of a traversal source, in registration order.
#[derive(Clone, Default)]
pub struct TraversalStrategies {
    strategies: Vec<Arc<dyn Strategy>>,
}

impl TraversalStrategies {
    /// Empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Default set for a graph-backed source.
    pub fn standard() -> Self {
        let mut strategies = Self::new();
        strategies.add(Arc::new(IdentityRemovalStrategy));
        strategies.add(Arc::new(FilterPushdownStrategy));
        strategies.add(Arc::new(LazyBarrierStrategy));
        strategies.add(Arc::new(StandardVerificationStrategy));
        strategies
    }

    /// Adds a strategy; one with the same name is replaced in place.
    pub fn add(&mut self, strategy: Arc<dyn Strategy>) {
        match self
            .strategies
            .iter_mut()
            .find(|existing| existing.name() == strategy.name())
        {
            Some(existing) => *existing = strategy,
            None => self.strategies.push(strategy),
        }
    }

    /// Removes the strategy called `name`, returning true when present.
    pub fn remove(&mut self, name: &str) -> bool {
        let before = self.strategies.len();
        self.strategies.retain(|s| s.name() != name);
        before != self.strategies.len()
    }

    /// Strategy called `name`.
    pub fn get(&self, name: &str) -> Option<&Arc<dyn Strategy>> {
        self.strategies.iter().find(|s| s.name() == name)
    }

    /// Names in registration order.
    pub fn names(&self) -> Vec<&'static str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    /// Number of strategies.
    pub fn len(&self) -> usize {
        self.strategies.len()
    }

    /// Returns true when no strategy is registered.
    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }

    /// Strategies in execution order.
    ///
    /// Fails with [`TraversalError::StrategyConflict`] when constraints form a
    /// cycle, contradict category order, or would run a requirement provider
    /// after a strategy that assumes that requirement is absent.
    pub fn ordered(&self) -> Result<Vec<Arc<dyn Strategy>>> {
        let n = self.strategies.len();
        let index_of = |name: &str| self.strategies.iter().position(|s| s.name() == name);
        // edges[a] holds every b that must run after a
        let mut edges: Vec<Vec<usize>> = vec![Vec::new(); n];
        let mut constrain = |first: usize, second: usize, reason: &str| -> Result<()> {
            let (a, b) = (&self.strategies[first], &self.strategies[second]);
            match a.category().cmp(&b.category()) {
                std::cmp::Ordering::Less => Ok(()),
                std::cmp::Ordering::Greater => Err(TraversalError::conflict(
                    a.name(),
                    b.name(),
                    format!(
                        "{reason}, but {} strategies run after {} strategies",
                        a.category(),
                        b.category()
                    ),
                )),
                std::cmp::Ordering::Equal => {
                    if !edges[first].contains(&second) {
                        edges[first].push(second);
                    }
                    Ok(())
                }
            }
        };

        for (idx, strategy) in self.strategies.iter().enumerate() {
            for name in strategy.run_after() {
                if let Some(prior) = index_of(name) {
                    constrain(prior, idx, "declared run-after")?;
                }
            }
            for name in strategy.run_before() {
                if let Some(later) = index_of(name) {
                    constrain(idx, later, "declared run-before")?;
                }
            }
        }
        for (provider, strategy) in self.strategies.iter().enumerate() {
            let provided = strategy.provides();
            if provided.is_empty() {
                continue;
            }
            for (assumer, other) in self.strategies.iter().enumerate() {
                if provider == assumer {
                    continue;
                }
                if let Some(req) = other
                    .assumes_absent()
                    .iter()
                    .find(|req| provided.contains(req))
                {
                    constrain(
                        provider,
                        assumer,
                        &format!("{} introduces {req} which {} assumes absent", strategy.name(), other.name()),
                    )?;
                }
            }
        }

        let mut order: Vec<usize> = (0..n).collect();
        order.sort_by_key(|&idx| (self.strategies[idx].category(), idx));
        let mut indegree = vec![0usize; n];
        for targets in &edges {
            for &t in targets {
                indegree[t] += 1;
            }
        }
        let mut done = vec![false; n];
        let mut out = Vec::with_capacity(n);
        while out.len() < n {
            let pending: Vec<usize> = order.iter().copied().filter(|&idx| !done[idx]).collect();
            let category = self.strategies[pending[0]].category();
            let stuck: Vec<usize> = pending
                .into_iter()
                .filter(|&idx| self.strategies[idx].category() == category)
                .collect();
            let next = stuck.iter().copied().find(|&idx| indegree[idx] == 0);
            let Some(next) = next else {
                let second = stuck[0];
                let first = stuck
                    .iter()
                    .copied()
                    .find(|&idx| edges[idx].contains(&second))
                    .unwrap_or(second);
                return Err(TraversalError::conflict(
                    self.strategies[first].name(),
                    self.strategies[second].name(),
                    "ordering constraints form a cycle",
                ));
            };
            done[next] = true;
            for &t in &edges[next] {
                indegree[t] -= 1;
            }
            out.push(Arc::clone(&self.strategies[next]));
        }
        Ok(out)
    }

    /// Applies every strategy, in order, to a chain.
    pub fn apply_to(&self, target: &mut RewriteTarget<'_>) -> Result<()> {
        let ordered = self.ordered()?;
        let start = profile_timer();
        target.requirements.extend(&target.steps.requirements());
        for strategy in &ordered {
            strategy.apply(target)?;
            debug!(
                strategy = strategy.name(),
                category = %strategy.category(),
                steps = target.steps.len(),
                "traversal.strategy.apply"
            );
        }
        target.requirements.extend(&target.steps.requirements());
        record_profile_timer(TraversalProfileKind::Strategy, start);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Named {
        name: &'static str,
        category: StrategyCategory,
        after: &'static [&'static str],
        before: &'static [&'static str],
    }

    impl Strategy for Named {
        fn name(&self) -> &'static str {
            self.name
        }
        fn category(&self) -> StrategyCategory {
            self.category
        }
        fn run_after(&self) -> &'static [&'static str] {
            self.after
        }
        fn run_before(&self) -> &'static [&'static str] {
            self.before
        }
        fn apply(&self, _target: &mut RewriteTarget<'_>) -> Result<()> {
            Ok(())
        }
        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    fn named(
        name: &'static str,
        category: StrategyCategory,
        after: &'static [&'static str],
        before: &'static [&'static str],
    ) -> Arc<dyn Strategy> {
        Arc::new(Named {
            name,
            category,
            after,
            before,
        })
    }

    fn names(ordered: &[Arc<dyn Strategy>]) -> Vec<&'static str> {
        ordered.iter().map(|s| s.name()).collect()
    }

    #[test]
    fn categories_then_constraints_then_registration() {
        let mut set = TraversalStrategies::new();
        set.add(named("verify", StrategyCategory::Verification, &[], &[]));
        set.add(named("b", StrategyCategory::Optimization, &["c"], &[]));
        set.add(named("c", StrategyCategory::Optimization, &[], &[]));
        set.add(named("a", StrategyCategory::Optimization, &[], &[]));
        set.add(named("deco", StrategyCategory::Decoration, &[], &["verify"]));
        assert_eq!(
            names(&set.ordered().unwrap()),
            vec!["deco", "c", "b", "a", "verify"]
        );
    }

    #[test]
    fn re_adding_replaces_in_place() {
        let mut set = TraversalStrategies::new();
        set.add(named("x", StrategyCategory::Optimization, &[], &[]));
        set.add(named("y", StrategyCategory::Optimization, &[], &[]));
        set.add(named("x", StrategyCategory::Optimization, &[], &[]));
        assert_eq!(set.names(), vec!["x", "y"]);
        assert!(set.remove("x"));
        assert!(!set.remove("x"));
    }

    #[test]
    fn cycles_are_conflicts() {
        let mut set = TraversalStrategies::new();
        set.add(named("p", StrategyCategory::Optimization, &["q"], &[]));
        set.add(named("q", StrategyCategory::Optimization, &["p"], &[]));
        let err = set.ordered().err().unwrap();
        assert!(matches!(err, TraversalError::StrategyConflict { .. }));
    }

    #[test]
    fn cross_category_contradiction_names_both() {
        let mut set = TraversalStrategies::new();
        set.add(named("late", StrategyCategory::Finalization, &[], &["early"]));
        set.add(named("early", StrategyCategory::Decoration, &[], &[]));
        match set.ordered().err().unwrap() {
            TraversalError::StrategyConflict { first, second, .. } => {
                assert_eq!((first.as_str(), second.as_str()), ("late", "early"));
            }
            other => panic!("unexpected {other}"),
        }
    }
}
