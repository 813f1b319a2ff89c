use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError};
use skein_core::{Handle, QueueError};

use crate::queue::{Inner, Slot};

/// The outcome of a bounded wait: either a payload arrived, or the deadline
/// passed first.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WaitOutcome {
    Notified(i32),
    TimedOut,
}

/// A single-use registration of interest in the next `notify` on some
/// handle. Produced by `NotificationQueue::register_interest` (and,
/// internally, `wait`/`wait_timeout`); callers that need to check their own
/// state and register interest as one atomic step — a pipe checking its
/// buffer before suspending, for instance — call `register_interest` while
/// still holding their own lock, then block on the returned `Waiter` only
/// after releasing it.
pub struct Waiter {
    pub(crate) inner: Arc<Inner>,
    pub(crate) handle: Handle,
    pub(crate) id: u64,
    pub(crate) receiver: Receiver<i32>,
    pub(crate) fired: bool,
}

impl Waiter {
    pub fn handle(&self) -> Handle {
        self.handle
    }

    /// Blocks until the next `notify(handle, _)`, or until the handle is
    /// unregistered out from under the wait.
    pub fn block(mut self) -> Result<i32, QueueError> {
        let result = self
            .receiver
            .recv()
            .map_err(|_| QueueError::Unregistered(self.handle));
        self.fired = true;
        result
    }

    /// Blocks until the next notify or `timeout`, whichever comes first. On
    /// timeout the registration is consumed; call `register_interest` again
    /// to keep waiting.
    pub fn block_timeout(mut self, timeout: Duration) -> Result<WaitOutcome, QueueError> {
        let outcome = match self.receiver.recv_timeout(timeout) {
            Ok(payload) => Ok(WaitOutcome::Notified(payload)),
            Err(RecvTimeoutError::Timeout) => Ok(WaitOutcome::TimedOut),
            Err(RecvTimeoutError::Disconnected) => Err(QueueError::Unregistered(self.handle)),
        };
        self.fired = true;
        outcome
    }
}

impl Drop for Waiter {
    fn drop(&mut self) {
        if self.fired {
            return;
        }
        if let Some(mut entry) = self.inner.slots.get_mut(&self.handle) {
            if let Slot::Open(open) = entry.value_mut() {
                open.waiters.retain(|(id, _)| *id != self.id);
            }
        }
    }
}
