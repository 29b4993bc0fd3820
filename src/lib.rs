//! Graph traversal execution machine.
//!
//! Traversals are spawned from a [`TraversalSource`], recorded as
//! [`Bytecode`], compiled into a chain of pull-based steps, rewritten by a
//! set of strategies, and either executed locally against a [`Graph`] or
//! shipped to a remote server or bulk-parallel engine whose results are
//! re-admitted through the local graph.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod io;
pub mod process;
pub mod profile;
pub mod structure;
pub mod value;

pub use config::TraversalConfig;
pub use error::{ErrorKind, Result, TraversalError};
pub use process::{Bytecode, Traversal, TraversalSource, Traverser};
pub use structure::{Graph, MemoryGraph};
pub use value::Value;
