use std::sync::Arc;

use skein_core::{Handle, NodeState};

/// One entry in a [`DependencyTree`] dump.
#[derive(Clone, Debug)]
pub struct DependencyTreeNode {
    pub id: Handle,
    pub name: Arc<str>,
    pub kind: String,
    pub state: NodeState,
    pub explain: Option<String>,
    pub depends_on: Vec<Handle>,
}

/// A read-only, flattened dump of every node reachable from a root,
/// produced by `DagStore::dependency_tree` for `dry_run` and debug output.
#[derive(Clone, Debug)]
pub struct DependencyTree {
    pub root: Handle,
    pub nodes: Vec<DependencyTreeNode>,
}

impl DependencyTree {
    /// Whether every node in the dump is `finished` — the shape dry-run
    /// scenarios check for ("every node prints as built").
    pub fn all_finished(&self) -> bool {
        self.nodes.iter().all(|n| n.state == NodeState::Finished)
    }
}
