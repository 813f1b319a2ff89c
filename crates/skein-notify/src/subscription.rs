use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crossbeam_channel::Receiver;
use skein_core::{Handle, QueueError};

use crate::queue::{Inner, Slot};

/// A live, many-notify subscription registered via
/// `NotificationQueue::subscribe`. Unlike `Waiter`, a `Subscription` survives
/// across repeated notifications; dropping it deregisters the subscriber so
/// a long-lived `NotificationQueue` doesn't accumulate dead senders.
pub struct Subscription {
    pub(crate) inner: Arc<Inner>,
    pub(crate) handle: Handle,
    pub(crate) id: u64,
    pub(crate) receiver: Receiver<i32>,
    pub(crate) overflowed: Arc<AtomicBool>,
}

impl Subscription {
    pub fn handle(&self) -> Handle {
        self.handle
    }

    /// Blocks for the next delivered payload. If notifications outran this
    /// subscriber's channel capacity since the last call, the overflow is
    /// reported once as `QueueError::Overflow` before any further payload.
    pub fn recv(&self) -> Result<i32, QueueError> {
        if self.overflowed.swap(false, Ordering::AcqRel) {
            return Err(QueueError::Overflow(self.handle));
        }
        self.receiver
            .recv()
            .map_err(|_| QueueError::Unregistered(self.handle))
    }

    /// Non-blocking poll: `Ok(None)` when nothing is pending.
    pub fn try_recv(&self) -> Result<Option<i32>, QueueError> {
        if self.overflowed.swap(false, Ordering::AcqRel) {
            return Err(QueueError::Overflow(self.handle));
        }
        match self.receiver.try_recv() {
            Ok(payload) => Ok(Some(payload)),
            Err(crossbeam_channel::TryRecvError::Empty) => Ok(None),
            Err(crossbeam_channel::TryRecvError::Disconnected) => {
                Err(QueueError::Unregistered(self.handle))
            }
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(mut entry) = self.inner.slots.get_mut(&self.handle) {
            if let Slot::Open(open) = entry.value_mut() {
                open.subscribers.retain(|s| s.id != self.id);
            }
        }
    }
}
