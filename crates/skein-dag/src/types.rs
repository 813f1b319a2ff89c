use std::sync::Arc;

use skein_core::{Handle, NodeError, NodeState};

/// What a dependency, or an alias target list entry, actually points at.
#[derive(Clone, Debug)]
pub enum NodeRef {
    /// A single concrete node.
    Node(Handle),
    /// A live indirection through the alias table; resolved at read time,
    /// so later `alias()` calls change what existing dependents see.
    Alias(Arc<str>),
    /// A frozen multi-node resolution produced by `detach_from_alias`.
    /// Concatenated in this order; immune to later mutation of the alias
    /// it was snapshotted from.
    Frozen(Vec<Handle>),
}

/// One entry in a node's ordered dependency list. `param` is `""` for the
/// default/positional input.
#[derive(Clone, Debug)]
pub struct Dependency {
    pub param: Arc<str>,
    pub source: NodeRef,
}

/// The kind of computation a node represents.
#[derive(Clone, Debug)]
pub enum NodeKind {
    /// A fixed byte buffer, already `finished` at creation.
    Value,
    /// An actor workflow, identified by its registered name (e.g.
    /// `gpt.messages_to_query`).
    Actor(Arc<str>),
    /// A node created by `open_write_pipe`: already `running` at creation,
    /// driven directly by whichever actor holds the fd rather than spawned
    /// by the scheduler.
    OpenPipe,
}

/// One vertex of the DAG.
#[derive(Clone, Debug)]
pub struct Node {
    pub id: Handle,
    pub name: Arc<str>,
    pub kind: NodeKind,
    pub dependencies: Vec<Dependency>,
    pub state: NodeState,
    pub error: Option<NodeError>,
    pub explain: Option<String>,
    /// Whether this node's actor can start consuming a dependency as soon
    /// as it is `progressed`, or needs every dependency `finished` first.
    /// Declared by the caller of `add_node`, since the kind-specific
    /// tolerance lives with the actor registration, not the graph.
    pub streaming_ok: bool,
}

impl Node {
    pub fn is_ready_state(&self, required: NodeState) -> bool {
        match required {
            NodeState::Progressed => {
                matches!(
                    self.state,
                    NodeState::Progressed | NodeState::Finished
                )
            }
            NodeState::Finished => self.state == NodeState::Finished,
            _ => false,
        }
    }

    /// Whether this node has a direct dependency on the named alias (not
    /// counting references that only reach it indirectly through another
    /// alias).
    pub fn depends_on_alias(&self, name: &str) -> bool {
        self.dependencies
            .iter()
            .any(|d| matches!(&d.source, NodeRef::Alias(n) if n.as_ref() == name))
    }
}
