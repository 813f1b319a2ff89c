use std::fmt;
use std::num::NonZeroU32;
use std::sync::atomic::{AtomicU32, Ordering};

/// An identifier for anything that can be waited on: a pipe writer end, a
/// specific reader end, or a DAG node.
///
/// Handle `0` is reserved and never fires; `NonZeroU32` gets us that for
/// free instead of treating it as a runtime invariant to check everywhere.
/// Handles are monotonically allocated by [`HandleAllocator`] and are never
/// reused within a single orchestration run.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct Handle(NonZeroU32);

impl Handle {
    /// Constructs a handle from a raw value, for callers that already know
    /// it is non-zero (e.g. round-tripping through the stable ABI in `skein-abi`).
    ///
    /// Returns `None` for `0`, which is the reserved "never fires" handle.
    pub fn from_raw(value: u32) -> Option<Self> {
        NonZeroU32::new(value).map(Handle)
    }

    pub fn as_u32(self) -> u32 {
        self.0.get()
    }
}

impl fmt::Debug for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Handle({})", self.0)
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// Mints fresh, monotonically increasing [`Handle`]s for one orchestration run.
///
/// Shared by every component that needs to mint handles (pipes, nodes,
/// notification-queue registrations) so that handle values never collide
/// across components within the same `Environment`.
#[derive(Debug)]
pub struct HandleAllocator {
    next: AtomicU32,
}

impl HandleAllocator {
    pub fn new() -> Self {
        // Start at 1: 0 is reserved.
        Self {
            next: AtomicU32::new(1),
        }
    }

    /// Allocates the next handle. Panics on exhaustion of the 32-bit space,
    /// which is not reachable in practice (it would require ~4 billion
    /// allocations within one run).
    pub fn alloc(&self) -> Handle {
        let raw = self.next.fetch_add(1, Ordering::Relaxed);
        Handle::from_raw(raw).expect("handle space exhausted")
    }
}

impl Default for HandleAllocator {
    fn default() -> Self {
        Self::new()
    }
}
