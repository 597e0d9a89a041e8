//! Dataflow pipeline model and execution.
//!
//! A [`Pipeline`] is a DAG of [`Node`]s wired together by dataset names. This
//! crate provides free-input/-output analysis, namespace filtering and
//! wrapping ([`Pipeline::namespaced`]), and the [`Runner`] seam with a
//! topological [`SequentialRunner`].

pub mod namespace;
pub mod node;
pub mod pipeline;
pub mod runner;

pub use namespace::NamespaceMapping;
pub use node::{Node, NodeFn};
pub use pipeline::Pipeline;
pub use runner::{Runner, SequentialRunner};
