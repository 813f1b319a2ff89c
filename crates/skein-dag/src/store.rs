use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::RwLock;
use skein_core::{GraphError, Handle, HandleAllocator, NodeError, NodeState};
use skein_kv::KeyStreamStore;
use skein_notify::NotificationQueue;

use crate::template::PluginTable;
use crate::tree::{DependencyTree, DependencyTreeNode};
use crate::types::{Dependency, Node, NodeKind, NodeRef};

#[derive(Default)]
struct Inner {
    nodes: Vec<Node>,
    index: HashMap<Handle, usize>,
    names: HashSet<Arc<str>>,
    aliases: HashMap<Arc<str>, Vec<NodeRef>>,
}

impl Inner {
    fn node(&self, id: Handle) -> Option<&Node> {
        self.index.get(&id).map(|&i| &self.nodes[i])
    }

    fn node_mut(&mut self, id: Handle) -> Option<&mut Node> {
        let i = *self.index.get(&id)?;
        Some(&mut self.nodes[i])
    }

    fn unique_name(&mut self, hint: &str) -> Arc<str> {
        if !self.names.contains(hint) {
            let name: Arc<str> = Arc::from(hint);
            self.names.insert(name.clone());
            return name;
        }
        let mut n = 2usize;
        loop {
            let candidate = format!("{hint}-{n}");
            if !self.names.contains(candidate.as_str()) {
                let name: Arc<str> = Arc::from(candidate);
                self.names.insert(name.clone());
                return name;
            }
            n += 1;
        }
    }
}

/// The typed DAG of actor nodes, dependencies, and aliases (component C4).
/// A single `RwLock` serializes mutations; readers (chiefly the scheduler's
/// readiness pass) take a read lock. Every mutation notifies the
/// `graph_changed` handle so a suspended scheduler re-evaluates readiness.
pub struct DagStore {
    queue: NotificationQueue,
    graph_changed: Handle,
    kv: Arc<KeyStreamStore>,
    allocator: HandleAllocator,
    plugins: Arc<dyn PluginTable>,
    inner: RwLock<Inner>,
}

impl DagStore {
    pub fn new(queue: NotificationQueue, kv: Arc<KeyStreamStore>, plugins: Arc<dyn PluginTable>) -> Self {
        let graph_changed = queue.register("graph-changed");
        Self {
            queue,
            graph_changed,
            kv,
            allocator: HandleAllocator::new(),
            plugins,
            inner: RwLock::new(Inner::default()),
        }
    }

    /// The handle notified after every graph mutation.
    pub fn graph_changed_handle(&self) -> Handle {
        self.graph_changed
    }

    /// A snapshot of one node's current state, by id.
    pub fn node(&self, id: Handle) -> Option<Node> {
        self.inner.read().node(id).cloned()
    }

    /// A snapshot of every node currently in the store, in no particular
    /// order. Used by callers that need to sweep the whole graph rather than
    /// walk it from a single root (`Environment::snapshot`, dumps, tests).
    pub fn all_nodes(&self) -> Vec<Node> {
        self.inner.read().nodes.clone()
    }

    /// Creates a `value` node, already `finished`, and publishes its bytes
    /// to the key-stream store under the node's generated name.
    pub fn add_value_node(&self, bytes: impl Into<Bytes>, explain: Option<String>) -> Handle {
        let bytes = bytes.into();
        let id = self.allocator.alloc();
        let name = {
            let mut inner = self.inner.write();
            let name = inner.unique_name("value");
            inner.nodes.push(Node {
                id,
                name: name.clone(),
                kind: NodeKind::Value,
                dependencies: Vec::new(),
                state: NodeState::Finished,
                error: None,
                explain,
                streaming_ok: true,
            });
            inner.index.insert(id, inner.nodes.len() - 1);
            name
        };
        self.kv.put_value(name, bytes);
        self.queue.notify(self.graph_changed, 0).ok();
        id
    }

    /// Allocates a node, generates a unique name from `name_hint`, and
    /// registers it `not_started`. Creating a node can never close a cycle
    /// by itself: nothing can depend on a node before it exists, so the
    /// risk only arises later, when an alias it depends on gains a new
    /// target (see `alias`).
    pub fn add_node(
        &self,
        name_hint: &str,
        kind: NodeKind,
        dependencies: Vec<Dependency>,
        explain: Option<String>,
        streaming_ok: bool,
    ) -> Handle {
        let id = self.allocator.alloc();
        {
            let mut inner = self.inner.write();
            let name = inner.unique_name(name_hint);
            inner.nodes.push(Node {
                id,
                name,
                kind,
                dependencies,
                state: NodeState::NotStarted,
                error: None,
                explain,
                streaming_ok,
            });
            inner.index.insert(id, inner.nodes.len() - 1);
        }
        self.queue.notify(self.graph_changed, 0).ok();
        id
    }

    /// Creates a node that starts directly in `running` state, bypassing
    /// `not_started`/`runnable`: the scheduler never spawns it, since the
    /// actor that called `open_write_pipe` drives its lifecycle by writing
    /// (and eventually closing) the fd it got back.
    pub fn add_open_pipe_node(&self, name_hint: &str, explain: Option<String>) -> Handle {
        let id = self.allocator.alloc();
        {
            let mut inner = self.inner.write();
            let name = inner.unique_name(name_hint);
            inner.nodes.push(Node {
                id,
                name,
                kind: NodeKind::OpenPipe,
                dependencies: Vec::new(),
                state: NodeState::Running,
                error: None,
                explain,
                streaming_ok: true,
            });
            inner.index.insert(id, inner.nodes.len() - 1);
        }
        self.queue.notify(self.graph_changed, 0).ok();
        id
    }

    /// Appends `target` to `alias_name`'s resolution list, creating the
    /// alias first if it doesn't yet exist. Rejects the append if it would
    /// close a cycle through any node currently depending on this alias.
    pub fn alias(&self, alias_name: impl Into<Arc<str>>, target: Option<NodeRef>) -> Result<(), GraphError> {
        let name: Arc<str> = alias_name.into();
        let mut inner = self.inner.write();
        inner.aliases.entry(name.clone()).or_default();

        if let Some(target) = target {
            let resolved_targets = self.resolve_locked(&target, &inner)?;
            let dependents: Vec<Handle> = inner
                .nodes
                .iter()
                .filter(|n| n.depends_on_alias(&name))
                .map(|n| n.id)
                .collect();
            for &target_id in &resolved_targets {
                for &dependent in &dependents {
                    if self.reachable_locked(target_id, dependent, &inner) {
                        return Err(GraphError::WouldCreateCycle {
                            from: dependent,
                            to: target_id,
                        });
                    }
                }
            }
            inner.aliases.get_mut(&name).expect("just inserted").push(target);
        }

        drop(inner);
        self.queue.notify(self.graph_changed, 0).ok();
        Ok(())
    }

    /// Freezes every current dependent of `alias_name` onto its present
    /// resolution, so later mutation of the alias no longer affects them.
    pub fn detach_from_alias(&self, alias_name: &str) -> Result<(), GraphError> {
        let mut inner = self.inner.write();
        let snapshot = self.resolve_locked(&NodeRef::Alias(Arc::from(alias_name)), &inner)?;
        for node in inner.nodes.iter_mut() {
            for dep in node.dependencies.iter_mut() {
                if matches!(&dep.source, NodeRef::Alias(n) if n.as_ref() == alias_name) {
                    dep.source = NodeRef::Frozen(snapshot.clone());
                }
            }
        }
        drop(inner);
        self.queue.notify(self.graph_changed, 0).ok();
        Ok(())
    }

    /// Resolves `workflow_name` through the plugin table and grafts its
    /// sub-DAG template into this store, wiring its named inputs to
    /// `deps_map`. Returns the template's sink node.
    pub fn instantiate_with_deps(
        &self,
        workflow_name: &str,
        deps_map: HashMap<Arc<str>, NodeRef>,
    ) -> Result<Handle, GraphError> {
        let template = self
            .plugins
            .resolve(workflow_name)
            .ok_or_else(|| GraphError::UnknownWorkflow(workflow_name.to_string()))?;
        template.graft(self, &deps_map)
    }

    /// Every `not_started` node whose dependencies are all satisfied: at
    /// least `progressed` for streaming-tolerant actors, `finished`
    /// otherwise. A dependency on an alias that was never registered fails
    /// the node at this point rather than leaving it stuck forever.
    pub fn ready_nodes(&self) -> Vec<Handle> {
        let mut inner = self.inner.write();
        let candidates: Vec<Handle> = inner
            .nodes
            .iter()
            .filter(|n| n.state == NodeState::NotStarted)
            .map(|n| n.id)
            .collect();

        let mut ready = Vec::new();
        for id in candidates {
            match self.evaluate_readiness(id, &inner) {
                Ok(true) => ready.push(id),
                Ok(false) => {}
                Err(err) => {
                    let message = err.to_string();
                    if let Some(node) = inner.node_mut(id) {
                        node.state = NodeState::Failed;
                        node.error = Some(NodeError {
                            node: id,
                            kind: "graph".to_string(),
                            message,
                        });
                    }
                }
            }
        }
        ready
    }

    fn evaluate_readiness(&self, id: Handle, inner: &Inner) -> Result<bool, GraphError> {
        let node = match inner.node(id) {
            Some(n) => n,
            None => return Ok(false),
        };
        let required = if node.streaming_ok {
            NodeState::Progressed
        } else {
            NodeState::Finished
        };
        for dep in &node.dependencies {
            if let NodeRef::Alias(name) = &dep.source {
                if !inner.aliases.contains_key(name.as_ref()) {
                    return Err(GraphError::UnknownAlias(name.to_string()));
                }
            }
            let resolved = self.resolve_locked(&dep.source, inner)?;
            for target in resolved {
                let satisfied = inner
                    .node(target)
                    .map(|n| n.is_ready_state(required))
                    .unwrap_or(false);
                if !satisfied {
                    return Ok(false);
                }
            }
        }
        Ok(true)
    }

    /// Follows `r` through aliases, recursively and de-duplicating.
    pub fn resolve(&self, r: &NodeRef) -> Result<Vec<Handle>, GraphError> {
        let inner = self.inner.read();
        self.resolve_locked(r, &inner)
    }

    fn resolve_locked(&self, r: &NodeRef, inner: &Inner) -> Result<Vec<Handle>, GraphError> {
        let mut stack = Vec::new();
        let mut out = self.resolve_rec(r, inner, &mut stack)?;
        let mut seen = HashSet::new();
        out.retain(|id| seen.insert(*id));
        Ok(out)
    }

    fn resolve_rec(
        &self,
        r: &NodeRef,
        inner: &Inner,
        stack: &mut Vec<Arc<str>>,
    ) -> Result<Vec<Handle>, GraphError> {
        match r {
            NodeRef::Node(h) => Ok(vec![*h]),
            NodeRef::Frozen(v) => Ok(v.clone()),
            NodeRef::Alias(name) => {
                if stack.iter().any(|seen| seen.as_ref() == name.as_ref()) {
                    return Err(GraphError::AliasLoop(name.to_string()));
                }
                stack.push(name.clone());
                let targets = inner.aliases.get(name.as_ref()).cloned().unwrap_or_default();
                let mut out = Vec::new();
                for target in &targets {
                    out.extend(self.resolve_rec(target, inner, stack)?);
                }
                stack.pop();
                Ok(out)
            }
        }
    }

    fn reachable_locked(&self, start: Handle, target: Handle, inner: &Inner) -> bool {
        let mut stack = vec![start];
        let mut seen = HashSet::new();
        while let Some(cur) = stack.pop() {
            if cur == target {
                return true;
            }
            if !seen.insert(cur) {
                continue;
            }
            if let Some(node) = inner.node(cur) {
                for dep in &node.dependencies {
                    if let Ok(resolved) = self.resolve_locked(&dep.source, inner) {
                        stack.extend(resolved);
                    }
                }
            }
        }
        false
    }

    /// Validates and applies a forward state transition.
    #[tracing::instrument(level = "debug", skip(self))]
    pub fn transition(&self, id: Handle, next: NodeState) -> Result<(), GraphError> {
        let mut inner = self.inner.write();
        let node = inner
            .node_mut(id)
            .ok_or_else(|| GraphError::UnknownNode(id.to_string()))?;
        if !node.state.can_transition_to(next) {
            tracing::warn!(node = %id, from = %node.state, to = %next, "rejected invalid state transition");
            return Err(GraphError::InvalidTransition {
                node: id,
                from: node.state,
                to: next,
            });
        }
        let from = node.state;
        let name = node.name.clone();
        node.state = next;
        drop(inner);
        skein_otel::node_transitioned(&name, from, next);
        self.queue.notify(self.graph_changed, 0).ok();
        if next.is_terminal() {
            self.mirror_log(&name);
        }
        Ok(())
    }

    /// Transitions `id` to `failed` and attaches `error` in the same
    /// write-lock section, so no reader can observe `failed` with no error.
    #[tracing::instrument(level = "debug", skip(self, error))]
    pub fn fail(&self, id: Handle, error: NodeError) -> Result<(), GraphError> {
        let mut inner = self.inner.write();
        let node = inner
            .node_mut(id)
            .ok_or_else(|| GraphError::UnknownNode(id.to_string()))?;
        if !node.state.can_transition_to(NodeState::Failed) {
            return Err(GraphError::InvalidTransition {
                node: id,
                from: node.state,
                to: NodeState::Failed,
            });
        }
        let from = node.state;
        let name = node.name.clone();
        node.state = NodeState::Failed;
        node.error = Some(error.clone());
        drop(inner);
        skein_otel::node_transitioned(&name, from, NodeState::Failed);
        tracing::warn!(node = %id, message = %error.message, "node failed");
        self.queue.notify(self.graph_changed, 0).ok();
        self.mirror_log(&name);
        Ok(())
    }

    /// Drains `name`'s `log` auxiliary stream (if anything was ever written
    /// to it) into the process's own tracing output, one line at a time.
    /// Called once a node reaches a terminal state, by which point its `log`
    /// writer has already been dropped and closed alongside the rest of its
    /// `NodeRuntime`, so this never blocks waiting for more bytes.
    fn mirror_log(&self, name: &str) {
        let key = format!("{name}.log");
        let Ok(reader) = self.kv.open_read(&key) else {
            return;
        };
        let mut buf = [0u8; 4096];
        let mut out = Vec::new();
        loop {
            match reader.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => out.extend_from_slice(&buf[..n]),
                Err(_) => return,
            }
        }
        for line in String::from_utf8_lossy(&out).lines() {
            skein_otel::mirror_log_line(name, line);
        }
    }

    /// A flattened, read-only dump of every node reachable from `root`,
    /// used for dry-run and dependency-tree debug output.
    pub fn dependency_tree(&self, root: Handle) -> DependencyTree {
        let inner = self.inner.read();
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            if !seen.insert(id) {
                continue;
            }
            if let Some(node) = inner.node(id) {
                let depends_on: Vec<Handle> = node
                    .dependencies
                    .iter()
                    .flat_map(|d| self.resolve_locked(&d.source, &inner).unwrap_or_default())
                    .collect();
                out.push(DependencyTreeNode {
                    id,
                    name: node.name.clone(),
                    kind: match &node.kind {
                        NodeKind::Value => "value".to_string(),
                        NodeKind::Actor(k) => k.to_string(),
                        NodeKind::OpenPipe => "open_pipe".to_string(),
                    },
                    state: node.state,
                    explain: node.explain.clone(),
                    depends_on: depends_on.clone(),
                });
                stack.extend(depends_on);
            }
        }
        DependencyTree { root, nodes: out }
    }
}

impl Drop for DagStore {
    fn drop(&mut self) {
        self.queue.unregister(self.graph_changed);
    }
}
