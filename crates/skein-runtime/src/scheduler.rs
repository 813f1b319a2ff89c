use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use skein_core::{Cancellation, Handle, NodeError, NodeState};
use skein_dag::{DagStore, NodeKind, NodeRef};
use skein_kv::KeyStreamStore;
use skein_notify::{NotificationQueue, Subscription};
use skein_pipe::{Pipe, PipeConfig};

use crate::actor::ActorError;
use crate::node_runtime::NodeRuntime;
use crate::registry::ActorRegistry;

/// Tunables for one scheduler instance.
#[derive(Clone, Copy, Debug)]
pub struct SchedulerConfig {
    /// How long `one_step` may block waiting for something to happen before
    /// returning `StepOutcome::Idle` on its own, so a caller driving the loop
    /// by hand never waits forever on a single call.
    pub idle_poll: Duration,
    /// Caps how many actor bodies run concurrently; nodes that would exceed
    /// it stay `not_started` and are retried on the next readiness pass.
    /// `None` spawns every ready node immediately (the small-workload
    /// default; see `EnvironmentConfig` in `skein-host` for the production
    /// setting).
    pub max_concurrent_actors: Option<usize>,
    /// Backpressure policy applied to every pipe the scheduler or a spawned
    /// `NodeRuntime` creates (stdout, and the `log`/`metrics`/`trace`
    /// auxiliary streams). `spec.md`'s default is unbounded.
    pub pipe_config: PipeConfig,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            idle_poll: Duration::from_millis(20),
            max_concurrent_actors: None,
            pipe_config: PipeConfig::unbounded(),
        }
    }
}

/// What one `one_step` call actually did, for callers (tests, a driver CLI)
/// that want to observe the run without just calling `run` and blocking.
#[derive(Debug, Clone)]
pub enum StepOutcome {
    Spawned(Vec<Handle>),
    Completed(Handle),
    Failed(Handle, String),
    Idle,
    Terminated,
}

struct Completion {
    node: Handle,
    result: Result<(), ActorError>,
}

/// The cooperative scheduler (component C6): computes ready nodes, spawns
/// their actor bodies each onto their own worker thread, and retires them as
/// they finish or fail. Actor bodies themselves are logically single
/// threaded and suspend inside `NodeRuntime` reads/writes; the scheduler's
/// own loop never touches node internals except through `DagStore`.
///
/// A node's `progressed`/`finished` transition for its own stdout is driven
/// by the write side itself (`fd::DagTrack`), and every `DagStore` mutation
/// renotifies `graph_changed`, so the scheduler only has to watch one handle
/// plus its own completion channel to learn about everything happening in
/// the graph.
pub struct Scheduler {
    dag: Arc<DagStore>,
    kv: Arc<KeyStreamStore>,
    queue: NotificationQueue,
    registry: Arc<ActorRegistry>,
    cancel: Cancellation,
    config: SchedulerConfig,
    end_alias: Arc<str>,
    running: Mutex<HashSet<Handle>>,
    done_tx: Sender<Completion>,
    done_rx: Receiver<Completion>,
    graph_changed: Subscription,
    stop_before: Mutex<Option<Arc<str>>>,
    stop_after: Mutex<Option<Arc<str>>>,
    paused: AtomicBool,
}

impl Scheduler {
    pub fn new(
        dag: Arc<DagStore>,
        kv: Arc<KeyStreamStore>,
        queue: NotificationQueue,
        registry: Arc<ActorRegistry>,
        cancel: Cancellation,
        end_alias: impl Into<Arc<str>>,
        config: SchedulerConfig,
    ) -> Self {
        let (done_tx, done_rx) = unbounded();
        let graph_changed = queue
            .subscribe(dag.graph_changed_handle(), 256, "scheduler")
            .expect("graph_changed handle is freshly registered by its DagStore");
        Self {
            dag,
            kv,
            queue,
            registry,
            cancel,
            config,
            end_alias: end_alias.into(),
            running: Mutex::new(HashSet::new()),
            done_tx,
            done_rx,
            graph_changed,
            stop_before: Mutex::new(None),
            stop_after: Mutex::new(None),
            paused: AtomicBool::new(false),
        }
    }

    /// Pauses spawning once the named node is next ready, without failing or
    /// touching any node already running. Intended for a driver inspecting a
    /// run step by step; `resume` lifts it.
    pub fn stop_before(&self, name: Option<impl Into<Arc<str>>>) {
        *self.stop_before.lock() = name.map(Into::into);
    }

    /// Pauses spawning once the named node finishes (successfully or not).
    pub fn stop_after(&self, name: Option<impl Into<Arc<str>>>) {
        *self.stop_after.lock() = name.map(Into::into);
    }

    pub fn resume(&self) {
        self.paused.store(false, Ordering::Release);
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Acquire)
    }

    /// Whether the `.end`-style alias given at construction resolves to a
    /// non-empty set of nodes that are all terminal, with nothing left
    /// running. An alias that resolves to nothing (never written to) never
    /// counts as terminated, so a workflow that forgets to wire its sink
    /// simply runs forever rather than exiting immediately.
    pub fn is_terminated(&self) -> bool {
        let targets = match self.dag.resolve(&NodeRef::Alias(self.end_alias.clone())) {
            Ok(t) => t,
            Err(_) => return false,
        };
        if targets.is_empty() {
            return false;
        }
        let all_terminal = targets
            .iter()
            .all(|&id| self.dag.node(id).map(|n| n.state.is_terminal()).unwrap_or(false));
        all_terminal && self.running.lock().is_empty()
    }

    /// A read-only dump of everything reachable from the `.end` alias's
    /// current resolution, without spawning anything. Useful for a driver
    /// that wants to inspect the graph before committing to a real run.
    pub fn dry_run(&self) -> Vec<skein_dag::DependencyTree> {
        match self.dag.resolve(&NodeRef::Alias(self.end_alias.clone())) {
            Ok(targets) => targets.into_iter().map(|id| self.dag.dependency_tree(id)).collect(),
            Err(_) => Vec::new(),
        }
    }

    /// Runs until `.end` is terminated or the scheduler's cancellation fires.
    pub fn run(&self) {
        loop {
            if self.cancel.is_cancelled() || self.is_terminated() {
                return;
            }
            self.one_step();
        }
    }

    /// Drains any completed actor bodies, spawns whatever is newly ready,
    /// and blocks briefly if neither happened, so a caller driving this by
    /// hand never busy-spins.
    #[tracing::instrument(level = "debug", skip(self))]
    pub fn one_step(&self) -> StepOutcome {
        if let Some(outcome) = self.drain_one_completion() {
            return outcome;
        }
        if self.is_paused() {
            return self.wait_idle();
        }
        let spawned = self.spawn_ready();
        if !spawned.is_empty() {
            return StepOutcome::Spawned(spawned);
        }
        self.wait_idle()
    }

    fn wait_idle(&self) -> StepOutcome {
        match self.done_rx.recv_timeout(self.config.idle_poll) {
            Ok(c) => self.finish(c),
            Err(RecvTimeoutError::Timeout) => {
                let _ = self.graph_changed.try_recv();
                StepOutcome::Idle
            }
            Err(RecvTimeoutError::Disconnected) => StepOutcome::Idle,
        }
    }

    fn drain_one_completion(&self) -> Option<StepOutcome> {
        match self.done_rx.try_recv() {
            Ok(c) => Some(self.finish(c)),
            Err(_) => None,
        }
    }

    fn finish(&self, completion: Completion) -> StepOutcome {
        let Completion { node, result } = completion;
        self.running.lock().remove(&node);
        let node_snapshot = self.dag.node(node);
        let name = node_snapshot.as_ref().map(|n| n.name.to_string());
        let outcome = match result {
            Ok(()) => {
                let _ = self.dag.transition(node, NodeState::Finished);
                tracing::debug!(node = name.as_deref().unwrap_or("?"), "actor finished");
                StepOutcome::Completed(node)
            }
            Err(err) => {
                let _ = self.dag.fail(
                    node,
                    NodeError {
                        node,
                        kind: "actor".to_string(),
                        message: err.to_string(),
                    },
                );
                tracing::warn!(node = name.as_deref().unwrap_or("?"), error = %err, "actor failed");
                StepOutcome::Failed(node, err.to_string())
            }
        };
        if let Some(stop_after) = self.stop_after.lock().as_ref() {
            if name.as_deref() == Some(stop_after.as_ref()) {
                self.paused.store(true, Ordering::Release);
            }
        }
        outcome
    }

    fn spawn_ready(&self) -> Vec<Handle> {
        let ready = self.dag.ready_nodes();
        let mut spawned = Vec::new();
        for id in ready {
            if self.is_paused() {
                break;
            }
            {
                let mut running = self.running.lock();
                if running.contains(&id) {
                    continue;
                }
                if let Some(cap) = self.config.max_concurrent_actors {
                    if running.len() >= cap {
                        break;
                    }
                }
                running.insert(id);
            }
            let Some(node) = self.dag.node(id) else {
                self.running.lock().remove(&id);
                continue;
            };
            if let Some(stop_before) = self.stop_before.lock().as_ref() {
                if node.name.as_ref() == stop_before.as_ref() {
                    self.running.lock().remove(&id);
                    self.paused.store(true, Ordering::Release);
                    break;
                }
            }
            let kind = match &node.kind {
                NodeKind::Actor(kind) => kind.clone(),
                NodeKind::Value | NodeKind::OpenPipe => {
                    // Never returned by `ready_nodes` (both kinds are born
                    // terminal/running, never `not_started`), but handled
                    // rather than assumed away.
                    self.running.lock().remove(&id);
                    continue;
                }
            };
            self.spawn_one(id, &kind);
            spawned.push(id);
        }
        spawned
    }

    #[tracing::instrument(level = "debug", skip(self))]
    fn spawn_one(&self, id: Handle, kind: &str) {
        if self.dag.transition(id, NodeState::Runnable).is_err() {
            self.running.lock().remove(&id);
            return;
        }
        if self.dag.transition(id, NodeState::Running).is_err() {
            self.running.lock().remove(&id);
            return;
        }
        tracing::debug!(node = %id, kind, "actor spawned");

        let Some(node) = self.dag.node(id) else {
            self.running.lock().remove(&id);
            return;
        };

        let (pipe, writer) = Pipe::new(self.queue.clone(), node.name.clone(), self.config.pipe_config);
        let stdout_pipe = pipe.clone();
        self.kv.put_pipe(node.name.clone(), pipe, writer);

        let Some(mut actor) = self.registry.create(kind) else {
            let _ = self.dag.fail(
                id,
                NodeError {
                    node: id,
                    kind: "scheduler".to_string(),
                    message: format!("no actor registered for kind '{kind}'"),
                },
            );
            self.running.lock().remove(&id);
            return;
        };

        let rt = match NodeRuntime::new(
            id,
            self.dag.clone(),
            self.kv.clone(),
            self.queue.clone(),
            self.cancel.clone(),
            self.config.pipe_config,
        ) {
            Ok(rt) => rt,
            Err(e) => {
                let _ = self.dag.fail(
                    id,
                    NodeError {
                        node: id,
                        kind: "scheduler".to_string(),
                        message: format!("failed to build node runtime: {e}"),
                    },
                );
                self.running.lock().remove(&id);
                return;
            }
        };

        let done_tx = self.done_tx.clone();
        let thread_name = format!("actor-{}", node.name);
        let spawned = thread::Builder::new().name(thread_name).spawn(move || {
            let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| actor.run(rt)))
                .unwrap_or_else(|_| Err(ActorError::new("actor body panicked")));
            // The body's own `NodeRuntime` already closed stdout normally by
            // now (dropped on return); a failure still poisons it so a
            // downstream reader that already drained the bytes learns why
            // the stream ended instead of seeing a plain EOF.
            if let Err(err) = &result {
                stdout_pipe.poison(NodeError {
                    node: id,
                    kind: "actor".to_string(),
                    message: err.to_string(),
                });
            }
            let _ = done_tx.send(Completion { node: id, result });
        });
        if spawned.is_err() {
            let _ = self.dag.fail(
                id,
                NodeError {
                    node: id,
                    kind: "scheduler".to_string(),
                    message: "failed to spawn worker thread".to_string(),
                },
            );
            self.running.lock().remove(&id);
        }
    }
}
