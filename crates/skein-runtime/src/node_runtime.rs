use std::collections::HashMap;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;

use skein_core::{Cancellation, Errno, GraphError, Handle, IoError};
use skein_dag::{DagStore, Node, NodeRef};
use skein_kv::KeyStreamStore;
use skein_notify::NotificationQueue;
use skein_pipe::{Pipe, PipeConfig};

use crate::fd::{ConcatReader, FdReader, FdSlot, FdTable, FdWriter, ENV, LOG, METRICS, STDIN, STDOUT, TRACE};

/// The per-actor I/O facade (component C5): POSIX-like file descriptors
/// bound to this node's parameter namespace, plus a DAG-ops sub-facade for
/// actors that extend the graph (tool-call loop unrolling, §9).
///
/// One `NodeRuntime` is constructed per running node and handed to its
/// actor body; it is not `Clone` or `Sync` on purpose, since a body is
/// logically single-threaded (`spec.md` §5).
pub struct NodeRuntime {
    node_id: Handle,
    node_name: Arc<str>,
    dag: Arc<DagStore>,
    kv: Arc<KeyStreamStore>,
    queue: NotificationQueue,
    cancel: Cancellation,
    pipe_config: PipeConfig,
    fds: FdTable,
    errno: AtomicI32,
}

impl NodeRuntime {
    /// Builds a runtime for `node_id`, opening its standard descriptors.
    /// `node_id`'s own stdout pipe must already be registered in `kv` under
    /// its node name (the scheduler does this before spawning the body).
    pub fn new(
        node_id: Handle,
        dag: Arc<DagStore>,
        kv: Arc<KeyStreamStore>,
        queue: NotificationQueue,
        cancel: Cancellation,
        pipe_config: PipeConfig,
    ) -> Result<Self, IoError> {
        let node = dag.node(node_id).ok_or(IoError::Ebadf)?;
        let node_name = node.name.clone();

        let mut fds = FdTable::new();

        if let Some(reader) = Self::open_positional_reader(&dag, &kv, &node)? {
            fds.install(STDIN, FdSlot::Reader(reader));
        } else {
            fds.install(STDIN, FdSlot::Closed);
        }

        let stdout_writer = kv.open_write(&node_name)?;
        fds.install(
            STDOUT,
            FdSlot::Writer(FdWriter {
                writer: stdout_writer,
                node_id: Some(node_id),
                track: Some(crate::fd::DagTrack::Stdout { dag: dag.clone(), node: node_id }),
            }),
        );

        fds.install(LOG, Self::open_auxiliary_writer(&queue, &kv, &node_name, "log", pipe_config));
        if let Ok(env_reader) = kv.open_read("env") {
            fds.install(ENV, FdSlot::Reader(FdReader::Single(env_reader)));
        } else {
            fds.install(ENV, FdSlot::Closed);
        }
        fds.install(METRICS, Self::open_auxiliary_writer(&queue, &kv, &node_name, "metrics", pipe_config));
        fds.install(TRACE, Self::open_auxiliary_writer(&queue, &kv, &node_name, "trace", pipe_config));

        Ok(Self {
            node_id,
            node_name,
            dag,
            kv,
            queue,
            cancel,
            pipe_config,
            fds,
            errno: AtomicI32::new(0),
        })
    }

    fn open_auxiliary_writer(
        queue: &NotificationQueue,
        kv: &KeyStreamStore,
        node_name: &str,
        suffix: &str,
        pipe_config: PipeConfig,
    ) -> FdSlot {
        let key = format!("{node_name}.{suffix}");
        let (pipe, writer) = Pipe::new(queue.clone(), key.clone(), pipe_config);
        kv.put_pipe_reader_only(key, pipe);
        FdSlot::Writer(FdWriter { writer, node_id: None, track: None })
    }

    fn open_positional_reader(dag: &Arc<DagStore>, kv: &Arc<KeyStreamStore>, node: &Node) -> Result<Option<FdReader>, IoError> {
        let Some(dep) = node.dependencies.iter().find(|d| d.param.as_ref().is_empty()) else {
            return Ok(None);
        };
        let targets = dag.resolve(&dep.source).map_err(|_| IoError::Eio)?;
        Self::reader_over(dag, kv, &targets).map(Some)
    }

    fn reader_over(dag: &Arc<DagStore>, kv: &Arc<KeyStreamStore>, targets: &[Handle]) -> Result<FdReader, IoError> {
        let mut readers = Vec::with_capacity(targets.len());
        for &id in targets {
            let node = dag.node(id).ok_or(IoError::Eio)?;
            readers.push(kv.open_read(&node.name)?);
        }
        Ok(match readers.len() {
            1 => FdReader::Single(readers.pop().unwrap()),
            _ => FdReader::Concat(ConcatReader::new(readers)),
        })
    }

    fn set_errno(&self, errno: Errno) {
        self.errno.store(i32::from(errno), Ordering::Release);
    }

    fn fail<T>(&self, err: IoError) -> Result<T, IoError> {
        self.set_errno(err.errno());
        Err(err)
    }

    /// The POSIX-compatible errno left by the last failing call.
    pub fn get_errno(&self) -> i32 {
        self.errno.load(Ordering::Acquire)
    }

    pub fn node_id(&self) -> Handle {
        self.node_id
    }

    pub fn node_name(&self) -> &str {
        &self.node_name
    }

    pub fn cancellation(&self) -> &Cancellation {
        &self.cancel
    }

    /// Opens the `idx`-th dependency declared under `param`, concatenating
    /// its resolution if it names more than one node (the policy decided
    /// in `SPEC_FULL.md` §4.4).
    pub fn open_read(&mut self, param: &str, idx: usize) -> Result<i32, IoError> {
        let node = self.dag.node(self.node_id).ok_or(IoError::Ebadf)?;
        let dep = node
            .dependencies
            .iter()
            .filter(|d| d.param.as_ref() == param)
            .nth(idx);
        let Some(dep) = dep else {
            return self.fail(IoError::Einval);
        };
        let targets = match self.dag.resolve(&dep.source) {
            Ok(t) => t,
            Err(_) => return self.fail(IoError::Eio),
        };
        let reader = match Self::reader_over(&self.dag, &self.kv, &targets) {
            Ok(r) => r,
            Err(e) => return self.fail(e),
        };
        Ok(self.fds.push(FdSlot::Reader(reader)))
    }

    /// Opens a write descriptor for `param`. Only `""`/`"stdout"` resolve
    /// to anything today (`spec.md` §4.5: "`open_write(param)` typically
    /// refers to `stdout` only"); any other name is `EINVAL`.
    pub fn open_write(&mut self, param: &str) -> Result<i32, IoError> {
        if param.is_empty() || param == "stdout" {
            Ok(STDOUT)
        } else {
            self.fail(IoError::Einval)
        }
    }

    #[tracing::instrument(level = "trace", skip(self, out))]
    pub fn read(&mut self, fd: i32, out: &mut [u8]) -> Result<usize, IoError> {
        if self.cancel.is_cancelled() {
            return self.fail(IoError::Eio);
        }
        match self.fds.get_mut(fd) {
            Some(FdSlot::Reader(r)) => match r.read(out) {
                Ok(n) => Ok(n),
                Err(e) => self.fail(e),
            },
            _ => self.fail(IoError::Ebadf),
        }
    }

    #[tracing::instrument(level = "trace", skip(self, buf))]
    pub fn write(&mut self, fd: i32, buf: &[u8]) -> Result<usize, IoError> {
        if self.cancel.is_cancelled() {
            return self.fail(IoError::Epipe);
        }
        match self.fds.get_mut(fd) {
            Some(FdSlot::Writer(w)) => match w.write(buf) {
                Ok(n) => Ok(n),
                Err(e) => self.fail(e),
            },
            _ => self.fail(IoError::Ebadf),
        }
    }

    pub fn close(&mut self, fd: i32) -> Result<(), IoError> {
        match self.fds.close(fd) {
            Ok(()) => Ok(()),
            Err(e) => self.fail(e),
        }
    }

    /// Creates a value node and publishes `bytes` under its generated name.
    pub fn value_node(&self, bytes: impl Into<bytes::Bytes>, explain: Option<String>) -> Handle {
        self.dag.add_value_node(bytes, explain)
    }

    pub fn alias(&self, name: impl Into<Arc<str>>, node: Option<Handle>) -> Result<(), GraphError> {
        self.dag.alias(name, node.map(NodeRef::Node))
    }

    pub fn detach_from_alias(&self, name: &str) -> Result<(), GraphError> {
        self.dag.detach_from_alias(name)
    }

    pub fn instantiate_with_deps(
        &self,
        workflow: &str,
        deps: HashMap<Arc<str>, NodeRef>,
    ) -> Result<Handle, GraphError> {
        self.dag.instantiate_with_deps(workflow, deps)
    }

    /// Creates a node that is immediately `running` and hands back an fd
    /// the caller can write to directly; the resulting node is a plain
    /// stream other nodes may depend on, not an actor the scheduler spawns
    /// ("open_write_pipe (create a value-like node that can be written to
    /// over an fd)", `spec.md` §4.5).
    pub fn open_write_pipe(&mut self, explain: Option<String>) -> Result<i32, IoError> {
        let id = self.dag.add_open_pipe_node("pipe", explain);
        let name = self.dag.node(id).ok_or(IoError::Eio)?.name;
        let (pipe, writer) = Pipe::new(self.queue.clone(), name.clone(), self.pipe_config);
        self.kv.put_pipe_reader_only(name, pipe);
        let track = Some(crate::fd::DagTrack::OpenPipe { dag: self.dag.clone(), node: id });
        Ok(self.fds.push(FdSlot::Writer(FdWriter { writer, node_id: Some(id), track })))
    }

    /// Binds `fd` to `alias_name`. If the fd's pipe is still open, the
    /// alias points at the live node (so later writes still stream through
    /// it); if it has already closed, the remaining bytes are captured into
    /// a fresh value node instead, resolving the open question in
    /// `spec.md` §9 in favor of "immediate value node" (see `DESIGN.md`).
    pub fn alias_fd(&mut self, fd: i32, alias_name: &str) -> Result<(), IoError> {
        let FdSlot::Writer(w) = self.fds.get_mut(fd).ok_or(IoError::Ebadf)? else {
            return self.fail(IoError::Ebadf);
        };
        let Some(node_id) = w.node_id else {
            return self.fail(IoError::Einval);
        };
        let node = self.dag.node(node_id).ok_or(IoError::Eio)?;
        let target = if node.state.is_terminal() {
            let reader = self.kv.open_read(&node.name).map_err(|e| {
                self.set_errno(e.errno());
                e
            })?;
            let mut bytes = Vec::new();
            let mut buf = [0u8; 4096];
            loop {
                let n = reader.read(&mut buf).map_err(|e| {
                    self.set_errno(e.errno());
                    e
                })?;
                if n == 0 {
                    break;
                }
                bytes.extend_from_slice(&buf[..n]);
            }
            self.dag.add_value_node(bytes, Some(format!("captured from fd {fd}")))
        } else {
            node_id
        };
        self.dag
            .alias(alias_name, Some(NodeRef::Node(target)))
            .map_err(|_| {
                self.set_errno(Errno::Einval);
                IoError::Einval
            })
    }
}
