//! Traversal machine: instruction log, step pipeline, strategies, sources,
//! and the dispatch boundary to remote and bulk-parallel engines.

pub mod bytecode;
pub mod computer;
pub mod remote;
pub mod source;
pub mod step;
pub mod strategy;
pub mod translator;
pub mod traversal;
pub mod traverser;

pub use bytecode::{Argument, Bytecode, Instruction};
pub use computer::{Computer, ComputerResult, GraphComputer};
pub use remote::{stream_of, RemoteConnection, TraverserStream};
pub use source::TraversalSource;
pub use step::{Step, StepChain, StepContext, StepKind};
pub use strategy::{Strategy, StrategyCategory, StrategyRegistry, TraversalStrategies};
pub use translator::Translator;
pub use traversal::Traversal;
pub use traverser::{Path, Requirements, Traverser, TraverserRequirement};
