use thiserror::Error;

use crate::handle::Handle;

/// POSIX-compatible errno values surfaced across the stable actor ABI (see
/// `skein-abi`). Values are chosen to match their POSIX namesakes so that an
/// actor body linked against a real libc can reuse its own errno constants
/// for comparison; callers on the other side of the ABI only ever see the
/// `i32` produced by `From<Errno> for i32`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(i32)]
#[non_exhaustive]
pub enum Errno {
    /// Unknown file descriptor.
    Ebadf = 9,
    /// Bad parameter name or dependency index.
    Einval = 22,
    /// Write after the pipe's writer closed it.
    Epipe = 32,
    /// Read that failed because the upstream node failed.
    Eio = 5,
    /// Soft pipe-buffer cap exceeded under a configured policy.
    Enospc = 28,
    /// Non-blocking read would block. Reserved for future use; the core has
    /// no non-blocking read mode today.
    Eagain = 11,
}

impl From<Errno> for i32 {
    fn from(value: Errno) -> Self {
        value as i32
    }
}

/// Errors raised synchronously from a DAG-ops call (`skein-dag`). These never
/// poison a node; they are returned directly to the caller that made the
/// offending call.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum GraphError {
    #[error("unknown alias {0:?}")]
    UnknownAlias(String),

    #[error("unknown workflow {0:?}")]
    UnknownWorkflow(String),

    #[error("edge would close a cycle: {from} -> {to}")]
    WouldCreateCycle { from: Handle, to: Handle },

    #[error("node {0:?} not found")]
    UnknownNode(String),

    #[error("alias resolution loop detected starting at {0:?}")]
    AliasLoop(String),

    #[error("node {node} cannot transition {from} -> {to}")]
    InvalidTransition {
        node: Handle,
        from: crate::state::NodeState,
        to: crate::state::NodeState,
    },
}

/// Errors surfaced by the actor runtime facade (`skein-runtime`'s
/// `NodeRuntime`) on every `open_read`/`open_write`/`read`/`write` call. Each
/// variant corresponds to one canonical [`Errno`].
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum IoError {
    #[error("bad file descriptor")]
    Ebadf,
    #[error("invalid parameter name or dependency index")]
    Einval,
    #[error("write after pipe close")]
    Epipe,
    #[error("upstream node failed")]
    Eio,
    #[error("soft pipe-buffer cap exceeded")]
    Enospc,
}

impl IoError {
    pub fn errno(&self) -> Errno {
        match self {
            IoError::Ebadf => Errno::Ebadf,
            IoError::Einval => Errno::Einval,
            IoError::Epipe => Errno::Epipe,
            IoError::Eio => Errno::Eio,
            IoError::Enospc => Errno::Enospc,
        }
    }
}

/// A structured error attached to a `failed` node's `error` field. Carries
/// enough context to explain the failure in a dependency-tree dump without
/// requiring downstream readers to understand the failing actor's internals.
#[derive(Debug, Error, Clone)]
#[error("actor {node} ({kind}) failed: {message}")]
pub struct NodeError {
    pub node: Handle,
    pub kind: String,
    pub message: String,
}

/// Errors raised by the notification queue (`skein-notify`).
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum QueueError {
    #[error("handle {0} is not registered")]
    Unregistered(Handle),

    #[error("waiter cap exceeded for handle {0}")]
    WaiterCapExceeded(Handle),

    #[error("subscriber cap exceeded for handle {0}")]
    SubscriberCapExceeded(Handle),

    #[error("subscription overflow for handle {0}: receiver fell behind")]
    Overflow(Handle),
}

/// The umbrella `Result` alias used across the workspace's public APIs that
/// can fail in more than one of the above ways (mainly `skein-host`'s
/// `Environment` assembly).
pub type Result<T, E = CoreError> = std::result::Result<T, E>;

/// Top-level error combining the graph, I/O, queue, and actor-failure
/// taxonomies, for call sites (chiefly in `skein-host`) that need to report
/// any of them through one `?`-friendly type.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Graph(#[from] GraphError),
    #[error(transparent)]
    Io(#[from] IoError),
    #[error(transparent)]
    Queue(#[from] QueueError),
    #[error("actor failure: {0}")]
    Actor(#[from] NodeError),
}
