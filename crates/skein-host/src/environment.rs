use std::sync::Arc;

use bytes::Bytes;
use skein_core::{Cancellation, CoreError, Handle};
use skein_dag::DagStore;
use skein_kv::KeyStreamStore;
use skein_notify::NotificationQueue;
use skein_runtime::{ActorRegistry, Scheduler};

use crate::config::EnvironmentConfig;
use crate::snapshot::SnapshotStore;

/// The conventional aliases every `Environment` seeds empty at construction,
/// so a workflow can depend on them before anything has written to them yet.
/// `.tools.<name>` is deliberately not in this list: tool aliases are
/// created on demand, the first time a workflow registers one, rather than
/// pre-declared here.
pub const SEEDED_ALIASES: [&str; 2] = [".prompt", ".chat_messages"];

/// A fully wired actor-DAG runtime: the notification queue, key-stream
/// store, DAG, scheduler, and actor registry that make up one running graph.
/// Built exclusively through [`crate::EnvironmentBuilder`].
pub struct Environment {
    pub(crate) queue: NotificationQueue,
    pub(crate) kv: Arc<KeyStreamStore>,
    pub(crate) dag: Arc<DagStore>,
    pub(crate) registry: Arc<ActorRegistry>,
    pub(crate) scheduler: Arc<Scheduler>,
    pub(crate) cancel: Cancellation,
    pub(crate) config: EnvironmentConfig,
    pub(crate) end_alias: Arc<str>,
}

impl Environment {
    pub fn dag(&self) -> &Arc<DagStore> {
        &self.dag
    }

    pub fn kv(&self) -> &Arc<KeyStreamStore> {
        &self.kv
    }

    pub fn queue(&self) -> &NotificationQueue {
        &self.queue
    }

    pub fn registry(&self) -> &Arc<ActorRegistry> {
        &self.registry
    }

    pub fn scheduler(&self) -> &Arc<Scheduler> {
        &self.scheduler
    }

    pub fn config(&self) -> &EnvironmentConfig {
        &self.config
    }

    pub fn end_alias(&self) -> &str {
        &self.end_alias
    }

    pub fn cancellation(&self) -> &Cancellation {
        &self.cancel
    }

    /// Runs the scheduler until `.end` (or whichever alias was configured as
    /// the sink) terminates.
    pub fn run(&self) {
        self.scheduler.run();
    }

    /// Cancels every in-flight actor body's cooperative cancellation check
    /// and stops the scheduler from spawning anything new. Does not forcibly
    /// kill worker threads; a body that never checks `cancellation()` keeps
    /// running until it next suspends on a `NodeRuntime` read or write.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    /// Persists every finished node currently in the DAG into `store`, keyed
    /// by node name, regardless of whether anything still depends on it
    /// through a live alias.
    pub fn snapshot(&self, store: &dyn SnapshotStore) -> Result<(), CoreError> {
        for node in self.dag.all_nodes() {
            self.snapshot_node(node.id, store)?;
        }
        Ok(())
    }

    fn snapshot_node(&self, id: Handle, store: &dyn SnapshotStore) -> Result<(), CoreError> {
        let Some(node) = self.dag.node(id) else {
            return Ok(());
        };
        if !node.state.is_terminal() {
            return Ok(());
        }
        let reader = self.kv.open_read(&node.name)?;
        let mut buf = [0u8; 4096];
        let mut out = Vec::new();
        loop {
            let n = reader.read(&mut buf)?;
            if n == 0 {
                break;
            }
            out.extend_from_slice(&buf[..n]);
        }
        store.save(&node.name, Bytes::from(out));
        Ok(())
    }

    /// Recreates every entry in `store` as a fresh, already-`finished` value
    /// node. Returns the new handle for each key so the caller can re-wire
    /// it into whichever alias it used to belong to (the store only knows
    /// byte content by key, not graph position, so restoring the aliasing
    /// itself is the caller's job).
    pub fn restore(&self, store: &dyn SnapshotStore) -> Vec<(String, Handle)> {
        store
            .keys()
            .into_iter()
            .filter_map(|key| {
                let bytes = store.load(&key)?;
                let id = self.dag.add_value_node(bytes, Some(format!("restored from snapshot key {key:?}")));
                Some((key, id))
            })
            .collect()
    }
}
