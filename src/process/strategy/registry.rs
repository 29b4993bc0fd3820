use std::collections::BTreeMap;
use std::sync::Arc;

use super::{
    FilterPushdownStrategy, IdentityRemovalStrategy, LazyBarrierStrategy, ReadOnlyStrategy,
    ReferenceElementStrategy, RequirementsStrategy, SackStrategy, StandardVerificationStrategy,
    Strategy,
};
use crate::error::{Result, TraversalError};
use crate::process::bytecode::Argument;
use crate::process::traverser::{Requirements, TraverserRequirement};
use crate::value::Value;

type Constructor = Arc<dyn Fn(&Value) -> Result<Arc<dyn Strategy>> + Send + Sync>;

const STRATEGY_KEY: &str = "strategy";
const CONFIGURATION_KEY: &str = "configuration";

/// Rebuilds strategies recorded in bytecode from their name and
/// [`configuration`](Strategy::configuration).
///
/// Connections and engines cannot be rebuilt this way; they are installed
/// through `with_remote` and `with_computer` instead.
#[derive(Clone)]
pub struct StrategyRegistry {
    constructors: BTreeMap<&'static str, Constructor>,
}

impl StrategyRegistry {
    /// Registry with no entries.
    pub fn empty() -> Self {
        Self {
            constructors: BTreeMap::new(),
        }
    }

    /// Registers a constructor taking the recorded configuration.
    pub fn register<F>(&mut self, name: &'static str, constructor: F)
    where
        F: Fn(&Value) -> Result<Arc<dyn Strategy>> + Send + Sync + 'static,
    {
        self.constructors.insert(name, Arc::new(constructor));
    }

    /// Registers a strategy without parameters; replay hands out copies.
    pub fn register_plain<S>(&mut self, strategy: S)
    where
        S: Strategy + Clone,
    {
        let name = strategy.name();
        self.register(name, move |_| Ok(Arc::new(strategy.clone()) as Arc<dyn Strategy>));
    }

    /// Returns true when `name` can be rebuilt.
    pub fn contains(&self, name: &str) -> bool {
        self.constructors.contains_key(name)
    }

    /// Builds the strategy called `name` from `configuration`.
    pub fn resolve(&self, name: &str, configuration: &Value) -> Result<Arc<dyn Strategy>> {
        let constructor = self
            .constructors
            .get(name)
            .ok_or_else(|| TraversalError::UnknownStrategy(name.to_owned()))?;
        constructor(configuration)
    }

    /// Builds the strategy recorded in a `withStrategies` argument.
    pub fn resolve_argument(&self, argument: &Argument) -> Result<Arc<dyn Strategy>> {
        match argument.as_value() {
            Some(Value::String(name)) => self.resolve(name, &Value::Null),
            Some(Value::Map(entries)) => {
                let name = entries
                    .get(STRATEGY_KEY)
                    .and_then(Value::as_str)
                    .ok_or(TraversalError::Invalid("recorded strategy has no name"))?;
                let configuration = entries.get(CONFIGURATION_KEY).unwrap_or(&Value::Null);
                self.resolve(name, configuration)
            }
            _ => Err(TraversalError::Invalid(
                "withStrategies arguments must be names or configured strategies",
            )),
        }
    }

    /// Bytecode argument recording `strategy`: its bare name when it has no
    /// configuration, otherwise a map of name and configuration.
    pub fn record(strategy: &dyn Strategy) -> Argument {
        match strategy.configuration() {
            Value::Null => Argument::from(strategy.name()),
            configuration => {
                let mut entries = BTreeMap::new();
                entries.insert(STRATEGY_KEY.to_owned(), Value::from(strategy.name()));
                entries.insert(CONFIGURATION_KEY.to_owned(), configuration);
                Argument::from(Value::Map(entries))
            }
        }
    }

    /// Registered names, sorted.
    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.constructors.keys().copied()
    }
}

impl Default for StrategyRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register_plain(IdentityRemovalStrategy);
        registry.register_plain(FilterPushdownStrategy);
        registry.register_plain(LazyBarrierStrategy);
        registry.register_plain(ReferenceElementStrategy);
        registry.register_plain(StandardVerificationStrategy);
        registry.register_plain(ReadOnlyStrategy);
        registry.register(SackStrategy::NAME, |configuration| {
            Ok(Arc::new(SackStrategy::new(configuration.clone())) as Arc<dyn Strategy>)
        });
        registry.register(RequirementsStrategy::NAME, |configuration| {
            let Value::List(names) = configuration else {
                return Err(TraversalError::Invalid(
                    "RequirementsStrategy expects a list of requirement names",
                ));
            };
            let requirements = names
                .iter()
                .map(|name| {
                    name.as_str()
                        .and_then(TraverserRequirement::from_name)
                        .ok_or(TraversalError::Invalid("unknown traverser requirement"))
                })
                .collect::<Result<Requirements>>()?;
            Ok(Arc::new(RequirementsStrategy::new(requirements)) as Arc<dyn Strategy>)
        });
        registry
    }
}
