//! The DAG store (component C4): nodes, dependencies, and aliases, safe
//! under concurrent mutation and read.

mod store;
mod template;
mod tree;
mod types;

pub use store::DagStore;
pub use template::{EmptyPluginTable, PluginTable, WorkflowTemplate};
pub use tree::{DependencyTree, DependencyTreeNode};
pub use types::{Dependency, Node, NodeKind, NodeRef};
