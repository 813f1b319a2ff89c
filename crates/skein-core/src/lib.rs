//! Shared kernel for the orchestration workspace: handle identifiers, the
//! error taxonomy, cancellation/deadline primitives, and the node lifecycle
//! state machine. Every other `skein-*` crate depends on this one and none
//! of its types depend back on them.

mod cancel;
mod error;
mod handle;
mod state;

pub use cancel::{Cancellation, Deadline};
pub use error::{CoreError, Errno, GraphError, IoError, NodeError, QueueError, Result};
pub use handle::{Handle, HandleAllocator};
pub use state::NodeState;
