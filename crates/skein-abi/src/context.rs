use std::cell::Cell;
use std::ptr::NonNull;

use skein_runtime::NodeRuntime;

thread_local! {
    /// The `NodeRuntime` currently bound to this thread's guest call, if
    /// any. Actor bodies run one to a dedicated thread (`spec.md` §5), so a
    /// thread-local slot is enough: no guest call ever nests or crosses
    /// threads.
    static CURRENT: Cell<Option<NonNull<NodeRuntime>>> = const { Cell::new(None) };
}

/// Binds `rt` for the duration of `f`, so the `extern "C"` functions in
/// [`crate::ffi`] can reach it without the guest passing a context pointer
/// on every call. Used by the host adapter that drives an ABI-based actor
/// body (e.g. a WebAssembly instance export).
pub fn scoped<R>(rt: &mut NodeRuntime, f: impl FnOnce() -> R) -> R {
    let ptr = NonNull::from(&mut *rt);
    let previous = CURRENT.with(|cell| cell.replace(Some(ptr)));
    let result = f();
    CURRENT.with(|cell| cell.set(previous));
    result
}

/// Runs `f` against the currently bound runtime, or returns `None` if no
/// guest call is in progress on this thread.
///
/// # Safety
/// Relies on `scoped` never outliving the `&mut NodeRuntime` it was given;
/// since `scoped` holds that borrow for the whole closure call, the pointer
/// is always valid while `CURRENT` is `Some`.
pub(crate) fn with_current<R>(f: impl FnOnce(&mut NodeRuntime) -> R) -> Option<R> {
    CURRENT.with(|cell| {
        let ptr = cell.get()?;
        // SAFETY: see function doc.
        let rt = unsafe { &mut *ptr.as_ptr() };
        Some(f(rt))
    })
}
