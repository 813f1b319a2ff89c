use thiserror::Error;

use crate::node_runtime::NodeRuntime;

/// An uncaught failure from inside an actor body. The scheduler turns this
/// into a `failed` node and a poisoned stdout pipe (`spec.md` §7,
/// `ActorFailure`).
#[derive(Debug, Error)]
#[error("{message}")]
pub struct ActorError {
    pub message: String,
}

impl ActorError {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into() }
    }
}

impl From<skein_core::IoError> for ActorError {
    fn from(value: skein_core::IoError) -> Self {
        ActorError::new(value.to_string())
    }
}

impl From<skein_core::GraphError> for ActorError {
    fn from(value: skein_core::GraphError) -> Self {
        ActorError::new(value.to_string())
    }
}

/// The capability every actor body conforms to: given a [`NodeRuntime`]
/// bound to its own node, run to completion or fail. Duck-typed bodies from
/// the source system become this one trait (`spec.md` §9, "duck-typed
/// actor bodies").
///
/// Implementors may suspend at any `NodeRuntime` read/write; the scheduler
/// runs each body on its own worker thread (`run` is logically
/// single-threaded per node, never called twice concurrently for the same
/// node).
pub trait Actor: Send {
    fn run(&mut self, rt: NodeRuntime) -> Result<(), ActorError>;
}

impl<F> Actor for F
where
    F: FnMut(NodeRuntime) -> Result<(), ActorError> + Send,
{
    fn run(&mut self, rt: NodeRuntime) -> Result<(), ActorError> {
        self(rt)
    }
}
