//! Error taxonomy shared by every layer of the traversal machine.

use std::fmt;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::config::ConfigError;
use crate::io::CodecError;
use crate::structure::ElementKind;

/// Coarse classification of a [`TraversalError`].
///
/// Exhaustion is not represented here: running out of traversers is reported
/// as `Ok(None)` from a pull and never surfaces as an error.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// Invalid construction-time input.
    Argument,
    /// The machine was driven into a state it cannot continue from.
    IllegalState,
    /// A file, codec, wire, or remote endpoint failed.
    ExternalIo,
    /// Strategy constraints could not be satisfied.
    StrategyOrdering,
    /// A verification strategy rejected the step chain.
    Verification,
    /// The graph capability refused an operation.
    Graph,
    /// Configuration could not be loaded.
    Config,
}

/// Errors produced while building, rewriting, or executing a traversal.
#[derive(Debug, Error)]
pub enum TraversalError {
    /// Invalid argument supplied at construction time.
    #[error("invalid argument: {0}")]
    Invalid(&'static str),
    /// A bytecode instruction could not be replayed.
    #[error("instruction '{name}' is invalid: {reason}")]
    InvalidInstruction {
        /// Instruction name.
        name: String,
        /// What was wrong with it.
        reason: String,
    },
    /// A step was pulled in a state that cannot produce a result.
    #[error("illegal state in {step}: {reason}")]
    IllegalState {
        /// Name of the offending step.
        step: &'static str,
        /// Description of the state.
        reason: String,
    },
    /// A step needed the local graph but the traversal has none bound.
    #[error("{step} requires a graph but none is bound to the traversal")]
    NoGraph {
        /// Name of the offending step.
        step: &'static str,
    },
    /// Rehydration could not find an element in the local graph.
    #[error("{kind} {id} does not exist in the local graph")]
    ElementNotFound {
        /// Vertex or edge.
        kind: ElementKind,
        /// Identifier that failed to resolve.
        id: u64,
    },
    /// An external resource does not exist.
    #[error("{} does not exist", resource.display())]
    ResourceMissing {
        /// Locator of the missing resource.
        resource: PathBuf,
    },
    /// I/O failure while transferring a resource.
    #[error("could not {action} {}: {source}", resource.display())]
    Io {
        /// What the step was doing (`read`, `write`).
        action: &'static str,
        /// Locator of the resource.
        resource: PathBuf,
        /// Underlying cause.
        #[source]
        source: std::io::Error,
    },
    /// The graph codec failed while transferring a resource.
    #[error("could not {action} {} with the graph codec: {source}", resource.display())]
    Codec {
        /// What the step was doing (`read`, `write`).
        action: &'static str,
        /// Locator of the resource.
        resource: PathBuf,
        /// Underlying cause.
        #[source]
        source: CodecError,
    },
    /// The remote endpoint failed.
    #[error("remote connection failure: {0}")]
    Remote(String),
    /// The bulk-parallel engine failed.
    #[error("graph computer failure: {0}")]
    Computer(String),
    /// Bytecode or traverser wire encoding failed.
    #[error("wire encoding: {0}")]
    Wire(#[from] serde_json::Error),
    /// Two strategies cannot be ordered consistently.
    #[error("strategy ordering conflict between '{first}' and '{second}': {reason}")]
    StrategyConflict {
        /// Strategy that should run first.
        first: String,
        /// Strategy that should run second.
        second: String,
        /// Why the order cannot be satisfied.
        reason: String,
    },
    /// A verification strategy rejected the chain.
    #[error("{strategy} rejected the traversal: {reason}")]
    Verification {
        /// Name of the rejecting strategy.
        strategy: &'static str,
        /// Why the chain is illegal.
        reason: String,
    },
    /// A strategy name could not be resolved during replay.
    #[error("unknown strategy '{0}'")]
    UnknownStrategy(String),
    /// The graph capability rejected an operation.
    #[error("graph: {0}")]
    Graph(String),
    /// The graph capability does not support an operation.
    #[error("{0} is not supported by this graph")]
    Unsupported(&'static str),
    /// Configuration failure.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, TraversalError>;

impl TraversalError {
    pub(crate) fn illegal_state(step: &'static str, reason: impl Into<String>) -> Self {
        TraversalError::IllegalState {
            step,
            reason: reason.into(),
        }
    }

    pub(crate) fn invalid_instruction(name: impl Into<String>, reason: impl Into<String>) -> Self {
        TraversalError::InvalidInstruction {
            name: name.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn io(action: &'static str, resource: impl AsRef<Path>, source: std::io::Error) -> Self {
        TraversalError::Io {
            action,
            resource: resource.as_ref().to_path_buf(),
            source,
        }
    }

    pub(crate) fn conflict(
        first: impl Into<String>,
        second: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        TraversalError::StrategyConflict {
            first: first.into(),
            second: second.into(),
            reason: reason.into(),
        }
    }

    /// Returns the taxonomy bucket for this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            TraversalError::Invalid(_)
            | TraversalError::InvalidInstruction { .. }
            | TraversalError::UnknownStrategy(_) => ErrorKind::Argument,
            TraversalError::IllegalState { .. }
            | TraversalError::NoGraph { .. }
            | TraversalError::ElementNotFound { .. } => ErrorKind::IllegalState,
            TraversalError::ResourceMissing { .. }
            | TraversalError::Io { .. }
            | TraversalError::Codec { .. }
            | TraversalError::Remote(_)
            | TraversalError::Computer(_)
            | TraversalError::Wire(_) => ErrorKind::ExternalIo,
            TraversalError::StrategyConflict { .. } => ErrorKind::StrategyOrdering,
            TraversalError::Verification { .. } => ErrorKind::Verification,
            TraversalError::Graph(_) | TraversalError::Unsupported(_) => ErrorKind::Graph,
            TraversalError::Config(_) => ErrorKind::Config,
        }
    }

    /// Returns a machine-readable code for the error variant.
    pub fn code(&self) -> &'static str {
        match self {
            TraversalError::Invalid(_) => "InvalidArgument",
            TraversalError::InvalidInstruction { .. } => "InvalidInstruction",
            TraversalError::IllegalState { .. } => "IllegalState",
            TraversalError::NoGraph { .. } => "NoGraph",
            TraversalError::ElementNotFound { .. } => "ElementNotFound",
            TraversalError::ResourceMissing { .. } => "ResourceMissing",
            TraversalError::Io { .. } => "Io",
            TraversalError::Codec { .. } => "Codec",
            TraversalError::Remote(_) => "Remote",
            TraversalError::Computer(_) => "Computer",
            TraversalError::Wire(_) => "Wire",
            TraversalError::StrategyConflict { .. } => "StrategyConflict",
            TraversalError::Verification { .. } => "Verification",
            TraversalError::UnknownStrategy(_) => "UnknownStrategy",
            TraversalError::Graph(_) => "Graph",
            TraversalError::Unsupported(_) => "Unsupported",
            TraversalError::Config(_) => "Config",
        }
    }
}

/// Formats an error prefixed with its code, e.g. `[ResourceMissing] ...`.
pub struct ErrorWithCode<'a>(pub &'a TraversalError);

impl fmt::Display for ErrorWithCode<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.0.code(), self.0)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::Argument => "argument",
            ErrorKind::IllegalState => "illegal state",
            ErrorKind::ExternalIo => "external i/o",
            ErrorKind::StrategyOrdering => "strategy ordering",
            ErrorKind::Verification => "verification",
            ErrorKind::Graph => "graph",
            ErrorKind::Config => "config",
        };
        f.write_str(name)
    }
}
