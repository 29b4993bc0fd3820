use std::fmt;
use std::num::NonZeroU64;

use super::{Step, StepChain, StepContext, StepKind, Upstream};
use crate::error::{Result, TraversalError};
use crate::process::traverser::{Requirements, Traverser};
use crate::structure::{ElementId, Graph};
use crate::value::Value;

/// Passes every traverser through unchanged.
#[derive(Clone, Copy, Default)]
pub struct IdentityStep;

impl Step for IdentityStep {
    fn name(&self) -> &'static str {
        "IdentityStep"
    }

    fn kind(&self) -> StepKind {
        StepKind::Filter
    }

    fn process_next(
        &mut self,
        upstream: &mut Upstream<'_>,
        ctx: &StepContext<'_>,
    ) -> Result<Option<Traverser>> {
        upstream.next(ctx)
    }
}

/// Equality predicate on an element or map value.
#[derive(Clone, Debug, PartialEq)]
pub enum HasContainer {
    /// Element label is one of the listed labels.
    Label(Vec<String>),
    /// Element id is one of the listed ids.
    Id(Vec<u64>),
    /// Property (or map entry) `key` equals `value`.
    Property {
        /// Property key.
        key: String,
        /// Expected value.
        value: Value,
    },
}

impl HasContainer {
    /// Evaluates the predicate. Property tests on elements need the graph.
    pub fn test(&self, value: &Value, graph: Option<&dyn Graph>) -> Result<bool> {
        match self {
            HasContainer::Label(labels) => {
                let label = match value {
                    Value::Vertex(v) => v.label(),
                    Value::Edge(e) => e.label(),
                    _ => return Ok(false),
                };
                Ok(labels.iter().any(|l| l == label))
            }
            HasContainer::Id(ids) => Ok(value.is_element()
                && value
                    .as_element_id()
                    .is_some_and(|id| ids.contains(&id))),
            HasContainer::Property { key, value: expected } => match value {
                Value::Map(entries) => Ok(entries.get(key) == Some(expected)),
                element => {
                    let Some(id) = ElementId::of(element) else {
                        return Ok(false);
                    };
                    let graph = graph.ok_or(TraversalError::NoGraph { step: "HasStep" })?;
                    Ok(graph.properties(id)?.get(key) == Some(expected))
                }
            },
        }
    }
}

impl fmt::Display for HasContainer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HasContainer::Label(labels) => write!(f, "~label={}", labels.join("|")),
            HasContainer::Id(ids) => write!(f, "~id={ids:?}"),
            HasContainer::Property { key, value } => write!(f, "{key}={value}"),
        }
    }
}

/// Keeps traversers whose value satisfies a [`HasContainer`].
#[derive(Clone)]
pub struct HasStep {
    container: HasContainer,
}

impl HasStep {
    /// Creates the step.
    pub fn new(container: HasContainer) -> Self {
        Self { container }
    }

    /// The predicate.
    pub fn container(&self) -> &HasContainer {
        &self.container
    }
}

impl Step for HasStep {
    fn name(&self) -> &'static str {
        "HasStep"
    }

    fn kind(&self) -> StepKind {
        StepKind::Filter
    }

    fn process_next(
        &mut self,
        upstream: &mut Upstream<'_>,
        ctx: &StepContext<'_>,
    ) -> Result<Option<Traverser>> {
        let graph = ctx.graph.map(|g| &**g);
        while let Some(traverser) = upstream.next(ctx)? {
            if self.container.test(traverser.value(), graph)? {
                return Ok(Some(traverser));
            }
        }
        Ok(None)
    }

    fn describe(&self) -> String {
        format!("HasStep([{}])", self.container)
    }
}

/// Keeps traversers for which a nested traversal yields at least one result.
#[derive(Clone)]
pub struct TraversalFilterStep {
    filter: StepChain,
}

impl TraversalFilterStep {
    /// Creates the step around a nested chain.
    pub fn new(filter: StepChain) -> Self {
        Self { filter }
    }
}

impl Step for TraversalFilterStep {
    fn name(&self) -> &'static str {
        "TraversalFilterStep"
    }

    fn kind(&self) -> StepKind {
        StepKind::Filter
    }

    fn process_next(
        &mut self,
        upstream: &mut Upstream<'_>,
        ctx: &StepContext<'_>,
    ) -> Result<Option<Traverser>> {
        while let Some(traverser) = upstream.next(ctx)? {
            if self.filter.first_for(traverser.clone(), ctx)?.is_some() {
                return Ok(Some(traverser));
            }
        }
        Ok(None)
    }

    fn requirements(&self) -> Requirements {
        self.filter.requirements()
    }

    fn describe(&self) -> String {
        format!("TraversalFilterStep({})", self.filter.explain())
    }

    fn reset(&mut self) {
        self.filter.reset();
    }
}

/// Emits at most `limit` traversers, counting bulk.
///
/// A bulked traverser that straddles the limit is trimmed to fit.
#[derive(Clone)]
pub struct LimitStep {
    limit: u64,
    emitted: u64,
}

impl LimitStep {
    /// Creates the step.
    pub fn new(limit: u64) -> Self {
        Self { limit, emitted: 0 }
    }
}

impl Step for LimitStep {
    fn name(&self) -> &'static str {
        "LimitStep"
    }

    fn kind(&self) -> StepKind {
        StepKind::Filter
    }

    fn process_next(
        &mut self,
        upstream: &mut Upstream<'_>,
        ctx: &StepContext<'_>,
    ) -> Result<Option<Traverser>> {
        let Some(remaining) = NonZeroU64::new(self.limit.saturating_sub(self.emitted)) else {
            return Ok(None);
        };
        let Some(mut traverser) = upstream.next(ctx)? else {
            return Ok(None);
        };
        if traverser.bulk() > remaining.get() {
            traverser.set_bulk(remaining);
        }
        self.emitted += traverser.bulk();
        Ok(Some(traverser))
    }

    fn describe(&self) -> String {
        format!("LimitStep({})", self.limit)
    }

    fn reset(&mut self) {
        self.emitted = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::structure::{MemoryGraph, Vertex, VertexId};

    #[test]
    fn label_and_id_containers_ignore_non_elements() {
        let v = Value::Vertex(Vertex::detached(VertexId(3), "person"));
        let label = HasContainer::Label(vec!["software".into(), "person".into()]);
        assert!(label.test(&v, None).unwrap());
        assert!(!label.test(&Value::from("person"), None).unwrap());
        let id = HasContainer::Id(vec![3]);
        assert!(id.test(&v, None).unwrap());
        assert!(!id.test(&Value::Int(3), None).unwrap());
    }

    #[test]
    fn property_container_reads_graph() {
        let graph = MemoryGraph::new();
        let v = graph.add_vertex("person").unwrap();
        graph
            .set_property(ElementId::Vertex(v.id()), "name", Value::from("josh"))
            .unwrap();
        let container = HasContainer::Property {
            key: "name".into(),
            value: Value::from("josh"),
        };
        assert!(container.test(&Value::Vertex(v.clone()), Some(&graph as &dyn Graph)).unwrap());
        let err = container.test(&Value::Vertex(v), None).unwrap_err();
        assert!(matches!(err, TraversalError::NoGraph { .. }));
    }
}
