// When model-checking under Loom, swap in its atomics so it can explore every
// interleaving of `cancel`/`is_cancelled`; `Arc` stays the std one either way.
#[cfg(not(loom))]
use std::sync::atomic::{AtomicBool, Ordering};
#[cfg(loom)]
use loom::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// A shareable cancellation flag. Environment teardown sets this; actor
/// bodies and the scheduler check it at their suspension points rather than
/// being preempted.
#[derive(Clone, Debug)]
pub struct Cancellation {
    inner: Arc<AtomicBool>,
}

impl Cancellation {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.load(Ordering::Acquire)
    }

    /// Marks this token cancelled. Returns `true` the first time this
    /// succeeds, `false` on every call after (so callers that drive
    /// teardown side effects don't run them twice).
    pub fn cancel(&self) -> bool {
        self.inner
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Returns a clone sharing the same underlying flag, for handing to a
    /// spawned actor body without giving it anything else.
    pub fn child(&self) -> Self {
        self.clone()
    }
}

impl Default for Cancellation {
    fn default() -> Self {
        Self::new()
    }
}

/// An absolute point in time a caller must not run past. Timeouts are not a
/// core concept of the notification queue itself; this exists so that
/// actor-level wrappers can layer them on top of
/// `NotificationQueue::wait_timeout` without each wrapper reinventing
/// "now + duration" arithmetic.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Deadline(Option<Instant>);

impl Deadline {
    pub const fn none() -> Self {
        Self(None)
    }

    pub fn at(instant: Instant) -> Self {
        Self(Some(instant))
    }

    pub fn after(timeout: Duration) -> Self {
        Self(Instant::now().checked_add(timeout))
    }

    pub fn is_expired(&self) -> bool {
        matches!(self.0, Some(instant) if Instant::now() >= instant)
    }

    /// Remaining time until the deadline, or `None` if there is no deadline.
    /// A deadline already in the past yields `Duration::ZERO`.
    pub fn remaining(&self) -> Option<Duration> {
        self.0
            .map(|instant| instant.saturating_duration_since(Instant::now()))
    }
}

impl Default for Deadline {
    fn default() -> Self {
        Self::none()
    }
}
