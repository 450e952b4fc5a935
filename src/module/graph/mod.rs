//! Dynamic module relation graph
//!
//! Per-module edge sets ([`ModuleNode`]) and the graph that owns them
//! ([`AccessGraph`]).

pub mod access_graph;
pub mod node;

pub use access_graph::AccessGraph;
pub use node::{GrantTarget, ModuleNode, NodeSnapshot, PackageSnapshot};
