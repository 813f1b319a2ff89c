//! Handle-keyed notification queue (component C1): the bridge between
//! blocking OS-thread I/O and the cooperative scheduler's waiters.

mod queue;
mod subscription;
mod waiter;

pub use queue::{Limits, NotificationQueue};
pub use subscription::Subscription;
pub use waiter::{WaitOutcome, Waiter};
