use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{bounded, Sender, TrySendError};
use dashmap::DashMap;
use skein_core::{Handle, HandleAllocator, QueueError};

use crate::subscription::Subscription;
use crate::waiter::{WaitOutcome, Waiter};

const DEFAULT_MAX_WAITERS: usize = 64;
const DEFAULT_MAX_SUBSCRIBERS: usize = 64;

/// Per-handle caps on the number of concurrent waiters and subscribers.
/// Exceeding either fails the offending call rather than growing storage or
/// blocking the caller.
#[derive(Clone, Copy, Debug)]
pub struct Limits {
    pub max_waiters: usize,
    pub max_subscribers: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_waiters: DEFAULT_MAX_WAITERS,
            max_subscribers: DEFAULT_MAX_SUBSCRIBERS,
        }
    }
}

pub(crate) struct SubscriberSlot {
    pub(crate) id: u64,
    pub(crate) sender: Sender<i32>,
    pub(crate) overflowed: Arc<AtomicBool>,
}

pub(crate) struct OpenSlot {
    #[allow(dead_code)]
    pub(crate) debug_hint: Arc<str>,
    pub(crate) waiters: Vec<(u64, Sender<i32>)>,
    pub(crate) subscribers: Vec<SubscriberSlot>,
}

pub(crate) enum Slot {
    Open(OpenSlot),
    Closed,
}

#[derive(Default)]
pub(crate) struct Inner {
    allocator: HandleAllocator,
    pub(crate) slots: DashMap<Handle, Slot>,
    limits: Limits,
    next_waiter_id: AtomicU64,
}

/// A process-wide event bus keyed on handles, bridging OS threads doing
/// blocking I/O to cooperative waiters on the scheduler's worker pool.
///
/// Cheap to clone: internally an `Arc`, so one queue can be shared across
/// every component of an `Environment` without a wrapper `Arc` at every call
/// site.
#[derive(Clone, Default)]
pub struct NotificationQueue {
    inner: Arc<Inner>,
}

impl NotificationQueue {
    pub fn new() -> Self {
        Self::with_limits(Limits::default())
    }

    pub fn with_limits(limits: Limits) -> Self {
        Self {
            inner: Arc::new(Inner {
                allocator: HandleAllocator::new(),
                slots: DashMap::new(),
                limits,
                next_waiter_id: AtomicU64::new(0),
            }),
        }
    }

    /// Mints a new handle and opens it for `notify`/`wait`/`subscribe`.
    pub fn register(&self, debug_hint: impl Into<Arc<str>>) -> Handle {
        let handle = self.inner.allocator.alloc();
        self.inner.slots.insert(
            handle,
            Slot::Open(OpenSlot {
                debug_hint: debug_hint.into(),
                waiters: Vec::new(),
                subscribers: Vec::new(),
            }),
        );
        tracing::trace!(%handle, "notification handle registered");
        handle
    }

    /// Closes the handle. Further `notify` calls against it succeed as a
    /// no-op; further `wait`/`subscribe` calls fail with `Unregistered`.
    pub fn unregister(&self, handle: Handle) {
        if let Some(mut entry) = self.inner.slots.get_mut(&handle) {
            *entry.value_mut() = Slot::Closed;
        }
        tracing::trace!(%handle, "notification handle unregistered");
    }

    /// Wakes every current waiter and subscriber on `handle` with `payload`,
    /// returning how many were reached. Safe to call from any thread,
    /// including one blocked in a syscall elsewhere in the process; never
    /// blocks on a slow consumer.
    pub fn notify(&self, handle: Handle, payload: i32) -> Result<usize, QueueError> {
        let (waiters, subscribers) = {
            let mut entry = self
                .inner
                .slots
                .get_mut(&handle)
                .ok_or(QueueError::Unregistered(handle))?;
            match entry.value_mut() {
                Slot::Closed => return Ok(0),
                Slot::Open(open) => {
                    let waiters = std::mem::take(&mut open.waiters);
                    let subscribers: Vec<(Sender<i32>, Arc<AtomicBool>)> = open
                        .subscribers
                        .iter()
                        .map(|s| (s.sender.clone(), s.overflowed.clone()))
                        .collect();
                    (waiters, subscribers)
                }
            }
        };

        let mut count = 0;
        for (_, sender) in waiters {
            if sender.send(payload).is_ok() {
                count += 1;
            }
        }
        for (sender, overflowed) in subscribers {
            match sender.try_send(payload) {
                Ok(()) => count += 1,
                Err(TrySendError::Full(_)) => overflowed.store(true, Ordering::Release),
                Err(TrySendError::Disconnected(_)) => {}
            }
        }
        Ok(count)
    }

    /// Registers interest in the next notify on `handle` without blocking.
    /// Callers that must check their own state and register interest as one
    /// atomic step do so while still holding their own lock, releasing it
    /// only once the `Waiter` is in hand.
    pub fn register_interest(&self, handle: Handle) -> Result<Waiter, QueueError> {
        let mut entry = self
            .inner
            .slots
            .get_mut(&handle)
            .ok_or(QueueError::Unregistered(handle))?;
        match entry.value_mut() {
            Slot::Closed => Err(QueueError::Unregistered(handle)),
            Slot::Open(open) => {
                if open.waiters.len() >= self.inner.limits.max_waiters {
                    return Err(QueueError::WaiterCapExceeded(handle));
                }
                let id = self.inner.next_waiter_id.fetch_add(1, Ordering::Relaxed);
                let (sender, receiver) = bounded(1);
                open.waiters.push((id, sender));
                Ok(Waiter {
                    inner: self.inner.clone(),
                    handle,
                    id,
                    receiver,
                    fired: false,
                })
            }
        }
    }

    /// Suspends the caller until the next `notify` on `handle`.
    pub fn wait(&self, handle: Handle) -> Result<i32, QueueError> {
        self.register_interest(handle)?.block()
    }

    /// As `wait`, but returns `WaitOutcome::TimedOut` instead of suspending
    /// forever if `timeout` elapses first.
    pub fn wait_timeout(&self, handle: Handle, timeout: Duration) -> Result<WaitOutcome, QueueError> {
        self.register_interest(handle)?.block_timeout(timeout)
    }

    /// Opens a durable subscription that receives every future notify on
    /// `handle`, up to `capacity` outstanding payloads; beyond that, new
    /// notifies are dropped and reported once as `QueueError::Overflow` on
    /// the subscriber's next `recv`.
    pub fn subscribe(
        &self,
        handle: Handle,
        capacity: usize,
        debug_hint: impl Into<Arc<str>>,
    ) -> Result<Subscription, QueueError> {
        let hint = debug_hint.into();
        let mut entry = self
            .inner
            .slots
            .get_mut(&handle)
            .ok_or(QueueError::Unregistered(handle))?;
        match entry.value_mut() {
            Slot::Closed => Err(QueueError::Unregistered(handle)),
            Slot::Open(open) => {
                if open.subscribers.len() >= self.inner.limits.max_subscribers {
                    return Err(QueueError::SubscriberCapExceeded(handle));
                }
                let id = self.inner.next_waiter_id.fetch_add(1, Ordering::Relaxed);
                let (sender, receiver) = bounded(capacity.max(1));
                let overflowed = Arc::new(AtomicBool::new(false));
                open.subscribers.push(SubscriberSlot {
                    id,
                    sender,
                    overflowed: overflowed.clone(),
                });
                tracing::trace!(%handle, %hint, "subscriber attached");
                Ok(Subscription {
                    inner: self.inner.clone(),
                    handle,
                    id,
                    receiver,
                    overflowed,
                })
            }
        }
    }
}
